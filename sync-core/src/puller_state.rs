//! Shared per-file state threaded through the copier → puller → finisher
//! pipeline (§3 "shared puller state"). One instance is created per file at
//! the start of a pull iteration and dropped once the finisher commits or
//! permanently fails it.

use crate::model::BlockInfo;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::{mpsc, Notify};

/// Tracks which blocks of one file still need to be pulled, and whether the
/// file has been permanently failed (in which case every stage still holding
/// a reference should stop touching it).
#[derive(Debug)]
pub struct PullerState {
    folder: String,
    name: String,
    temp_path: std::path::PathBuf,
    needed: Mutex<HashSet<usize>>,
    failed: Mutex<Option<String>>,
    notify: Notify,
    /// Signalled once by the finisher when this file's work is fully
    /// retired, so the folder controller can wait out the current
    /// iteration's stage-close barrier (§4.2 step 5) before starting
    /// deletions.
    done_tx: mpsc::Sender<()>,
}

impl PullerState {
    pub fn new(
        folder: impl Into<String>,
        name: impl Into<String>,
        temp_path: std::path::PathBuf,
        blocks: &[BlockInfo],
        done_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            folder: folder.into(),
            name: name.into(),
            temp_path,
            needed: Mutex::new((0..blocks.len()).collect()),
            failed: Mutex::new(None),
            notify: Notify::new(),
            done_tx,
        }
    }

    pub fn done_tx(&self) -> mpsc::Sender<()> {
        self.done_tx.clone()
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn temp_path(&self) -> &std::path::Path {
        &self.temp_path
    }

    /// Mark one block index as delivered. Returns `true` once every block has
    /// been delivered (the finisher should now commit the file).
    pub fn mark_done(&self, block_index: usize) -> bool {
        let mut needed = self.needed.lock().unwrap();
        needed.remove(&block_index);
        let complete = needed.is_empty();
        drop(needed);
        self.notify.notify_waiters();
        complete
    }

    pub fn remaining(&self) -> usize {
        self.needed.lock().unwrap().len()
    }

    /// Mark this file as permanently failed for the current pull iteration
    /// (the policy table's "all candidate peers exhausted" case). Later
    /// stages must check [`Self::is_failed`] before doing further work.
    pub fn fail(&self, reason: impl Into<String>) {
        *self.failed.lock().unwrap() = Some(reason.into());
        self.notify.notify_waiters();
    }

    pub fn is_failed(&self) -> bool {
        self.failed.lock().unwrap().is_some()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failed.lock().unwrap().clone()
    }

    /// Wait until either the next block completes or a failure is recorded.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(n: usize) -> Vec<BlockInfo> {
        (0..n)
            .map(|i| BlockInfo::new(i as u64 * 1024, 1024, 0, [0u8; 32]))
            .collect()
    }

    #[test]
    fn test_mark_done_reports_completion() {
        let state = PullerState::new("default", "f.bin", "/tmp/f.bin.tmp".into(), &blocks(2), mpsc::channel(1).0);
        assert!(!state.mark_done(0));
        assert!(state.mark_done(1));
        assert_eq!(state.remaining(), 0);
    }

    #[test]
    fn test_fail_is_sticky() {
        let state = PullerState::new("default", "f.bin", "/tmp/f.bin.tmp".into(), &blocks(1), mpsc::channel(1).0);
        assert!(!state.is_failed());
        state.fail("no peer advertises this version");
        assert!(state.is_failed());
        assert_eq!(
            state.failure_reason().as_deref(),
            Some("no peer advertises this version")
        );
    }
}
