//! `Versioner`: archives a file's previous contents before the finisher
//! overwrites it. Versioner storage layout is explicitly out of scope to
//! implement (§1 non-goal) — the core only calls `archive` at the right
//! moment in the finisher pipeline.

use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Versioner: Send + Sync {
    /// Move or copy the current contents of `path` into version storage
    /// before it is overwritten. Must return only once the archive is
    /// durable, since the finisher proceeds to overwrite `path` right after.
    async fn archive(&self, path: &Path) -> crate::error::Result<()>;
}

/// A `Versioner` that discards the previous contents — the finisher simply
/// overwrites in place. Used by hosts that don't want file versioning and by
/// tests.
pub struct NoVersioning;

#[async_trait]
impl Versioner for NoVersioning {
    async fn archive(&self, _path: &Path) -> crate::error::Result<()> {
        Ok(())
    }
}
