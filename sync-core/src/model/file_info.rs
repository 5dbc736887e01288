use super::{BlockInfo, VersionVector};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

/// File, directory or symlink entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

/// Local-only flags (§3): never sent over the wire, never compared across
/// devices, but consulted by need-list and index computation to decide
/// whether an otherwise-eligible entry should be skipped locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalFlags(u32);

impl LocalFlags {
    /// Matched by the folder's `Matcher`; excluded from scans and never
    /// pulled even if a remote needs it from us.
    pub const IGNORED: LocalFlags = LocalFlags(0b0001);
    /// Folder is `ReceiveOnly`; this entry exists locally only to be served
    /// to peers and must never be offered as a source to pull from, nor
    /// surface as something we'd send (§8 S6).
    pub const RECEIVE_ONLY: LocalFlags = LocalFlags(0b0010);
    /// Entry type or mode this build cannot represent locally (e.g. a device
    /// file); tracked but never scheduled for a pull.
    pub const UNSUPPORTED: LocalFlags = LocalFlags(0b0100);

    pub const fn empty() -> Self {
        LocalFlags(0)
    }

    pub fn contains(self, other: LocalFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LocalFlags {
    type Output = LocalFlags;
    fn bitor(self, rhs: Self) -> Self {
        LocalFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for LocalFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One entry in a folder's index: a file, directory, or symlink, at a
/// particular version. Deleted entries are tombstones — `deleted: true` with
/// an incremented version vector and no blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub modified: chrono::DateTime<chrono::Utc>,
    pub permissions: u32,
    pub version: VersionVector,
    pub sequence: u64,
    pub deleted: bool,
    pub blocks: Vec<BlockInfo>,
    /// Destination path for `FileType::Symlink` entries; empty otherwise.
    pub symlink_target: String,
    /// Local-only disposition bits; always `empty()` on entries received
    /// from a remote (a peer's flags are never ours to inherit).
    #[serde(default)]
    pub local_flags: LocalFlags,
}

impl FileInfo {
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.file_type, FileType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.file_type, FileType::Symlink)
    }

    /// True when this entry should never be scheduled as something to pull
    /// or to serve as a source, per its local flags (§3, §8 S4/S6).
    pub fn is_locally_excluded(&self) -> bool {
        !self.local_flags.is_empty()
    }

    /// Total bytes across all blocks, which may differ from `size` only if
    /// the index entry was constructed incorrectly — used as a cheap
    /// consistency check before scheduling a pull.
    pub fn block_bytes(&self) -> u64 {
        self.blocks.iter().map(|b| b.size as u64).sum()
    }
}
