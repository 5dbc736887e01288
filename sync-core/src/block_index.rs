//! `BlockIndex`: the global map from strong block hash to every local
//! occurrence, used by the copier for same-file and cross-file block reuse
//! before a single byte is requested from a peer (§9 "block reuse via weak
//! hash").

use async_trait::async_trait;
use std::path::PathBuf;

/// One local occurrence of a block: which file it lives in, at what offset,
/// for which folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOccurrence {
    pub folder: String,
    pub path: PathBuf,
    pub offset: u64,
}

#[async_trait]
pub trait BlockIndex: Send + Sync {
    /// Every known local occurrence of a block with this strong hash.
    async fn occurrences(&self, strong_hash: &[u8; 32]) -> crate::error::Result<Vec<BlockOccurrence>>;

    /// Record that `strong_hash` occurs at `occurrence`, called by the
    /// scanner as it walks a folder.
    async fn record(
        &self,
        strong_hash: [u8; 32],
        occurrence: BlockOccurrence,
    ) -> crate::error::Result<()>;

    /// Drop every occurrence pointing at `path` in `folder`, called when a
    /// file is deleted, replaced, or moved.
    async fn forget_path(&self, folder: &str, path: &std::path::Path) -> crate::error::Result<()>;

    /// Evict occurrences that no longer resolve to an existing file —
    /// called periodically so stale entries don't accumulate forever.
    async fn fix(&self) -> crate::error::Result<()>;
}
