//! `IndexStore`: persisted per-folder index state. The core never opens a
//! database itself (§1 non-goal) — it calls through this trait, which a host
//! implements on top of SQLite, a flat file, or an in-memory map in tests.

use crate::model::{FileInfo, ShortId};
use async_trait::async_trait;

/// Persisted state for one folder: the local index, each remote's last-known
/// index, sequence allocation, and the virtual-mtime overrides used when a
/// host rewrites mtimes on pull (so later scans don't see a false change).
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Fetch one entry by name from the local index, if present.
    async fn get_local(&self, folder: &str, name: &str) -> crate::error::Result<Option<FileInfo>>;

    /// Replace or insert one local entry, allocating the next sequence
    /// number for the folder.
    async fn put_local(&self, folder: &str, file: FileInfo) -> crate::error::Result<()>;

    /// All local entries with `sequence > since`, in ascending sequence
    /// order — used to build incremental index-update messages.
    async fn local_since(&self, folder: &str, since: u64) -> crate::error::Result<Vec<FileInfo>>;

    /// The full remote index most recently received from `device`.
    async fn remote_index(
        &self,
        folder: &str,
        device: ShortId,
    ) -> crate::error::Result<Vec<FileInfo>>;

    /// Merge an index or index-update from `device` into its remote index.
    async fn put_remote(
        &self,
        folder: &str,
        device: ShortId,
        files: Vec<FileInfo>,
    ) -> crate::error::Result<()>;

    /// Current sequence counter for the folder (monotonically increasing,
    /// never reused even across restarts).
    async fn sequence(&self, folder: &str) -> crate::error::Result<u64>;

    /// Record that `path`'s on-disk mtime was rewritten by the finisher to
    /// `virtual_mtime` so later scans treat it as unchanged.
    async fn set_virtual_mtime(
        &self,
        folder: &str,
        path: &str,
        virtual_mtime: chrono::DateTime<chrono::Utc>,
    ) -> crate::error::Result<()>;

    async fn virtual_mtime(
        &self,
        folder: &str,
        path: &str,
    ) -> crate::error::Result<Option<chrono::DateTime<chrono::Utc>>>;
}
