use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Folder replication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FolderType {
    SendReceive,
    SendOnly,
    ReceiveOnly,
}

/// Order in which the queued pull list is drained within one iteration
/// (§3, §4.2 step 3). `Alphabetic` is the list's natural order (a no-op);
/// the others reorder by the named key, with name as a stable tiebreaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PullOrder {
    Random,
    Alphabetic,
    Largest,
    Smallest,
    Oldest,
    Newest,
}

impl Default for PullOrder {
    fn default() -> Self {
        PullOrder::Alphabetic
    }
}

/// Static configuration for one synchronized folder. Mutable runtime state
/// (paused, scan in progress, last error) lives in `folder::state`, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderConfig {
    pub id: String,
    pub label: String,
    pub path: PathBuf,
    pub folder_type: FolderType,
    pub paused: bool,
    /// Interval between directory scans (jittered ¾–⁵⁄₄ at the scan loop);
    /// 0 disables periodic scans (on-demand only).
    pub rescan_interval: Duration,
    /// Pull-timer cadence when the last iteration made progress, or when
    /// nothing changed since the previous tick (§4.1 scheduling policy).
    pub pull_sleep_interval: Duration,
    /// Cooldown after 10 consecutive iterations all report non-zero changed
    /// counts (retries exhausted) before the pull timer resumes ticking at
    /// `pull_sleep_interval` (§4.1).
    pub pull_pause_interval: Duration,
    /// How long a finished-but-orphaned temp file is kept before the
    /// startup sweep deletes it.
    pub keep_temporaries: Duration,
    pub ignore_permissions: bool,
    pub pull_order: PullOrder,
    /// Reorder ownership of new entries to match their parent directory
    /// after a successful finish (§4.5 step 6).
    pub copy_ownership_from_parent: bool,
}

impl FolderConfig {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            path: path.into(),
            folder_type: FolderType::SendReceive,
            paused: false,
            rescan_interval: Duration::from_secs(60),
            pull_sleep_interval: Duration::from_secs(10),
            pull_pause_interval: Duration::from_secs(60),
            keep_temporaries: Duration::from_secs(60 * 60),
            ignore_permissions: false,
            pull_order: PullOrder::default(),
            copy_ownership_from_parent: false,
        }
    }
}

/// Process-wide sizing for the block-pull pipeline's worker pools. Not
/// persisted per folder — every folder runner shares one instance, mirroring
/// the device-activity registry's global-state shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PullerPoolConfig {
    pub copiers: usize,
    pub pullers: usize,
    pub finishers: usize,
}

impl Default for PullerPoolConfig {
    fn default() -> Self {
        Self {
            copiers: 1,
            pullers: 16,
            finishers: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_sizing_matches_spec_defaults() {
        let cfg = PullerPoolConfig::default();
        assert_eq!(cfg.copiers, 1);
        assert_eq!(cfg.pullers, 16);
        assert_eq!(cfg.finishers, 1);
    }

    #[test]
    fn test_new_folder_config_defaults_to_send_receive() {
        let cfg = FolderConfig::new("default", "/tmp/sync");
        assert_eq!(cfg.folder_type, FolderType::SendReceive);
        assert!(!cfg.paused);
    }
}
