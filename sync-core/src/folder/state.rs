//! Folder controller lifecycle state (§4.1).

use crate::error::CoreError;
use crate::events::FolderLifecycleState;
use std::collections::HashMap;
use std::time::Instant;

/// The controller's current phase. Mirrors `events::FolderLifecycleState`
/// but additionally carries the data needed to decide transitions, not just
/// report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderStatus {
    Idle,
    Scanning,
    Syncing,
    Error,
    /// Paused either by configuration or after exhausting retries; `since`
    /// distinguishes an explicit pause from the retry back-off pause.
    Paused { retry_exhausted: bool },
}

impl FolderStatus {
    pub fn as_lifecycle(&self) -> FolderLifecycleState {
        match self {
            FolderStatus::Idle => FolderLifecycleState::Idle,
            FolderStatus::Scanning => FolderLifecycleState::Scanning,
            FolderStatus::Syncing => FolderLifecycleState::Syncing,
            FolderStatus::Error => FolderLifecycleState::Error,
            FolderStatus::Paused { .. } => FolderLifecycleState::Paused,
        }
    }
}

/// Full runtime state for one folder controller: status plus the
/// consecutive-failure counter that drives the retry/pause policy (§4.1: 10
/// retries then a 60s pause) and the per-item error map surfaced on
/// `FolderErrors`.
#[derive(Debug, Clone)]
pub struct FolderRuntimeState {
    pub status: FolderStatus,
    pub consecutive_failures: u32,
    pub errors: HashMap<String, String>,
    /// Cleared once the controller has completed at least one scan; the
    /// pull timer refuses to fire before this is set (§4.1).
    pub initial_scan_done: bool,
    /// The remote watermark observed on the last pull-timer tick that
    /// actually ran an iteration (`prevVer`, §4.1). `None` forces the next
    /// tick to run regardless of whether the watermark changed.
    pub prev_remote_watermark: Option<u64>,
    last_change: Instant,
}

impl FolderRuntimeState {
    pub const MAX_RETRIES: u32 = 10;

    pub fn new() -> Self {
        Self {
            status: FolderStatus::Idle,
            consecutive_failures: 0,
            errors: HashMap::new(),
            initial_scan_done: false,
            prev_remote_watermark: None,
            last_change: Instant::now(),
        }
    }

    /// Record a failed pull iteration. Returns `true` once the retry budget
    /// is exhausted and the controller should pause.
    pub fn record_failure(&mut self, item: &str, error: &CoreError) -> bool {
        self.errors.insert(item.to_string(), error.to_string());
        self.consecutive_failures += 1;
        if self.consecutive_failures >= Self::MAX_RETRIES {
            self.status = FolderStatus::Paused {
                retry_exhausted: true,
            };
            true
        } else {
            false
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn clear_error(&mut self, item: &str) {
        self.errors.remove(item);
    }

    pub fn resume(&mut self) {
        self.consecutive_failures = 0;
        self.status = FolderStatus::Idle;
    }

    /// Transition to `to`, returning the elapsed seconds since the previous
    /// transition so the caller can publish a `StateChanged` event. A no-op
    /// transition (same status) still resets the clock but reports zero
    /// elapsed seconds, matching "duration-since-last-change" semantics.
    pub fn transition(&mut self, to: FolderStatus) -> (FolderStatus, u64) {
        let elapsed = self.last_change.elapsed().as_secs();
        let from = std::mem::replace(&mut self.status, to);
        self.last_change = Instant::now();
        (from, elapsed)
    }
}

impl Default for FolderRuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pauses_after_ten_consecutive_failures() {
        let mut state = FolderRuntimeState::new();
        let err = CoreError::NoPeer("f".to_string());
        for _ in 0..9 {
            assert!(!state.record_failure("f", &err));
        }
        assert!(state.record_failure("f", &err));
        assert_eq!(
            state.status,
            FolderStatus::Paused {
                retry_exhausted: true
            }
        );
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let mut state = FolderRuntimeState::new();
        let err = CoreError::NoPeer("f".to_string());
        state.record_failure("f", &err);
        state.record_failure("f", &err);
        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn test_transition_reports_previous_status() {
        let mut state = FolderRuntimeState::new();
        let (from, _) = state.transition(FolderStatus::Scanning);
        assert_eq!(from, FolderStatus::Idle);
        assert_eq!(state.status, FolderStatus::Scanning);
    }
}
