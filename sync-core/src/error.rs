//! Error handling for the folder synchronization core.
//!
//! Every error the core can produce is one of the kinds in the taxonomy
//! below. The taxonomy mirrors the policy table: block-level errors rotate to
//! the next peer, file-level errors are recorded in a folder's error map and
//! surfaced on `FolderErrors`, and folder-level errors halt that folder's
//! loop without killing the runner.
//!
//! ## Examples
//!
//! ```rust
//! use foldersync_core::error::{CoreError, Result};
//!
//! fn pull_block() -> Result<()> {
//!     Err(CoreError::NoPeer("testfile".to_string()))
//! }
//!
//! match pull_block() {
//!     Err(CoreError::NoPeer(name)) => assert_eq!(name, "testfile"),
//!     _ => unreachable!(),
//! }
//! ```

use thiserror::Error;

/// Result type used throughout the core.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors the core can produce.
///
/// Variants map directly onto the error taxonomy: `FolderPaused` through
/// `FolderMarkerMissing` are folder-level (they halt a folder's loop but not
/// the runner), `InsufficientDiskSpace` through `NoPeer` are block/file-level
/// (recovered by retry or peer rotation), and `Io`/`Json` are ambient
/// conversions used by the persistence helpers (virtual-mtime store,
/// `tunnels.json`).
#[derive(Error, Debug)]
pub enum CoreError {
    /// Folder is paused in configuration; stat/pull calls are no-ops.
    #[error("folder {0} is paused")]
    FolderPaused(String),

    /// Folder exists in configuration but its runner has not been started.
    #[error("folder {0} is not running")]
    FolderNotRunning(String),

    /// Folder root directory is absent on disk.
    #[error("folder {0} root path is missing")]
    FolderPathMissing(String),

    /// Folder marker file is absent.
    #[error("folder {0} marker is missing")]
    FolderMarkerMissing(String),

    /// Needed bytes exceed free disk space; the whole pull iteration aborts.
    #[error("insufficient disk space for folder {folder}: need {needed} bytes, have {available}")]
    InsufficientDiskSpace {
        folder: String,
        needed: u64,
        available: u64,
    },

    /// Every candidate peer failed to serve a requested block.
    #[error("block request failed for {file} block {block_index}: {reason}")]
    BlockRequestFailed {
        file: String,
        block_index: usize,
        reason: String,
    },

    /// A peer returned bytes that do not match the block's strong hash.
    #[error("hash mismatch for {file} block {block_index}")]
    HashMismatch { file: String, block_index: usize },

    /// The local file changed underneath an in-flight pull; resolved by
    /// archiving the local copy as a conflict file.
    #[error("rename conflict for {0}")]
    RenameConflict(String),

    /// Target name differs from an existing entry only by case on a
    /// case-insensitive filesystem.
    #[error("case conflict: {new} collides with {existing}")]
    CaseConflict { new: String, existing: String },

    /// Local filesystem I/O failure surfaced with enough context to show in
    /// a `FolderErrors` event (path + reason), distinct from the ambient
    /// `Io` conversion used by persistence helpers.
    #[error("local filesystem error at {path}: {reason}")]
    LocalFsError { path: String, reason: String },

    /// No peer currently advertises the version of the file that is needed.
    #[error("no peer advertises {0}")]
    NoPeer(String),

    /// Generic resource exhaustion (pool full, queue full) distinct from
    /// disk-space exhaustion.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// An operation was attempted against a component in the wrong
    /// lifecycle state (e.g. writing to a shared puller state after its
    /// failure latch tripped).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An external collaborator (index store, scanner, versioner, matcher,
    /// connection) returned an error the core does not otherwise model.
    #[error("external collaborator error: {0}")]
    External(String),

    /// I/O error from the standard library, auto-converted with `?`.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error from persistence helpers (`tunnels.json`, event logging),
    /// auto-converted with `?`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// True for errors that are recovered by retrying — at the block level
    /// via peer rotation, at the file level via the next pull iteration.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::BlockRequestFailed { .. }
                | CoreError::HashMismatch { .. }
                | CoreError::NoPeer(_)
                | CoreError::Io(_)
        )
    }

    /// True for errors that halt a folder's loop without terminating the
    /// process (folder-level, per the taxonomy's propagation column).
    pub fn is_folder_level(&self) -> bool {
        matches!(
            self,
            CoreError::FolderPaused(_)
                | CoreError::FolderNotRunning(_)
                | CoreError::FolderPathMissing(_)
                | CoreError::FolderMarkerMissing(_)
        )
    }

    /// Build a [`CoreError::LocalFsError`] carrying both path and reason,
    /// matching the taxonomy's "surface path+reason" propagation note.
    pub fn local_fs(path: impl Into<String>, err: &std::io::Error) -> Self {
        CoreError::LocalFsError {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
