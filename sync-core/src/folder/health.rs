//! Folder-health check (§4.1): consulted on every pull-timer tick, separate
//! from the state machine itself so a host can layer richer diagnostics
//! (read-only filesystem, marker file, quota) without the core caring how.

use crate::error::{CoreError, Result};
use crate::model::FolderConfig;
use async_trait::async_trait;

#[async_trait]
pub trait FolderHealth: Send + Sync {
    async fn check(&self, config: &FolderConfig) -> Result<()>;
}

/// Checks only that the folder root still exists — the minimum the core
/// itself can verify without a host-specific marker-file convention.
pub struct PathExistsHealth;

#[async_trait]
impl FolderHealth for PathExistsHealth {
    async fn check(&self, config: &FolderConfig) -> Result<()> {
        if !config.path.exists() {
            return Err(CoreError::FolderPathMissing(config.id.clone()));
        }
        Ok(())
    }
}
