//! Folder controller (§4.1/§4.2): owns one folder's lifecycle, alternates
//! between directory scans and pull iterations on independent timers, and
//! applies the retry/pause policy when iterations keep failing.

use super::health::FolderHealth;
use super::iteration::compute_need_list;
use super::scan;
use super::state::{FolderRuntimeState, FolderStatus};
use crate::error::{CoreError, Result};
use crate::events::{CoreEvent, StateChanged};
use crate::fs_utils;
use crate::ignore::{Matcher, NoopMatcher};
use crate::index_store::IndexStore;
use crate::model::{FileInfo, FolderConfig, PullOrder, ShortId};
use crate::pipeline::CopyJob;
use crate::scanner::Scanner;
use crate::versioner::Versioner;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tracing::{info, info_span, warn, Instrument};

/// Drives one folder's scan and pull loops. Holds no direct reference to the
/// model hub or other folders — it only reaches the rest of the system
/// through `remote_indexes`, `copy_tx` and the optional `events` sender,
/// matching §9's "no back-pointer" design note.
pub struct FolderController {
    config: FolderConfig,
    state: Arc<Mutex<FolderRuntimeState>>,
    store: Arc<dyn IndexStore>,
    copy_tx: mpsc::Sender<CopyJob>,
    stop_rx: watch::Receiver<bool>,
    remote_indexes: Arc<RwLock<HashMap<ShortId, HashMap<String, FileInfo>>>>,
    matcher: Arc<dyn Matcher>,
    scanner: Option<Arc<dyn Scanner>>,
    health: Arc<dyn FolderHealth>,
    versioner: Option<Arc<dyn Versioner>>,
    events: Option<mpsc::Sender<CoreEvent>>,
    local_short_id: ShortId,
}

impl FolderController {
    pub fn new(
        config: FolderConfig,
        store: Arc<dyn IndexStore>,
        copy_tx: mpsc::Sender<CopyJob>,
        stop_rx: watch::Receiver<bool>,
        remote_indexes: Arc<RwLock<HashMap<ShortId, HashMap<String, FileInfo>>>>,
    ) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(FolderRuntimeState::new())),
            store,
            copy_tx,
            stop_rx,
            remote_indexes,
            matcher: Arc::new(NoopMatcher),
            scanner: None,
            health: Arc::new(super::health::PathExistsHealth),
            versioner: None,
            events: None,
            local_short_id: ShortId(0),
        }
    }

    /// Enables the internal scan loop. Without a scanner the controller
    /// never gates pulls on `initial_scan_done` — a host that drives
    /// scanning itself (e.g. through a filesystem watcher) is expected to
    /// call `IndexStore::put_local` directly.
    pub fn with_scanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn Matcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_health(mut self, health: Arc<dyn FolderHealth>) -> Self {
        self.health = health;
        self
    }

    pub fn with_versioner(mut self, versioner: Arc<dyn Versioner>) -> Self {
        self.versioner = Some(versioner);
        self
    }

    pub fn with_events(mut self, events: mpsc::Sender<CoreEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_local_short_id(mut self, id: ShortId) -> Self {
        self.local_short_id = id;
        self
    }

    pub fn state(&self) -> Arc<Mutex<FolderRuntimeState>> {
        self.state.clone()
    }

    /// Runs the controller until the stop signal fires, racing a scan
    /// deadline against a pull-timer deadline so the two never run
    /// concurrently (§4.1: "scan and pull never overlap for the same
    /// folder").
    pub async fn run(mut self) {
        let mut next_scan_deadline = tokio::time::Instant::now();
        let mut next_pull_delay = Duration::from_millis(0);

        loop {
            if *self.stop_rx.borrow() {
                return;
            }

            let scan_enabled = self.scanner.is_some()
                && (self.config.rescan_interval > Duration::ZERO
                    || !self.state.lock().await.initial_scan_done);

            tokio::select! {
                biased;
                _ = self.stop_rx.changed() => {
                    if *self.stop_rx.borrow() {
                        return;
                    }
                }
                _ = tokio::time::sleep_until(next_scan_deadline), if scan_enabled => {
                    let span = info_span!("scan", folder = %self.config.id);
                    self.run_scan().instrument(span).await;
                    next_scan_deadline = tokio::time::Instant::now() + self.jittered_scan_interval();
                }
                _ = tokio::time::sleep(next_pull_delay) => {
                    next_pull_delay = self.run_pull_tick().await;
                }
            }
        }
    }

    /// `rescan_interval` jittered to ¾–⁵⁄₄ of its configured value, so many
    /// folders on the same schedule don't all scan in lockstep.
    fn jittered_scan_interval(&self) -> Duration {
        use rand::Rng;
        let base = self.config.rescan_interval.as_secs_f64();
        if base <= 0.0 {
            return Duration::from_secs(3600);
        }
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_secs_f64(base * factor)
    }

    async fn run_scan(&mut self) {
        let Some(scanner) = self.scanner.clone() else {
            return;
        };
        if !self.config.path.exists() {
            return;
        }

        let (from, elapsed) = self.state.lock().await.transition(FolderStatus::Scanning);
        self.emit_state_changed(from, FolderStatus::Scanning, elapsed, None)
            .await;

        let local = match self.store.local_since(&self.config.id, 0).await {
            Ok(files) => files.into_iter().map(|f| (f.name.clone(), f)).collect(),
            Err(e) => {
                warn!(folder = %self.config.id, error = %e, "scan: could not read local index");
                HashMap::new()
            }
        };

        match scan::scan_folder(
            &self.config.path,
            self.matcher.as_ref(),
            scanner.as_ref(),
            &local,
            self.local_short_id,
        )
        .await
        {
            Ok(updates) => {
                let any = !updates.is_empty();
                for file in updates {
                    if let Err(e) = self.store.put_local(&self.config.id, file).await {
                        warn!(folder = %self.config.id, error = %e, "failed to persist scan update");
                    }
                }
                if any {
                    self.emit(CoreEvent::LocalIndexUpdated {
                        folder: self.config.id.clone(),
                    })
                    .await;
                }
            }
            Err(e) => warn!(folder = %self.config.id, error = %e, "scan failed"),
        }

        self.state.lock().await.initial_scan_done = true;
        let (from, elapsed) = self.state.lock().await.transition(FolderStatus::Idle);
        self.emit_state_changed(from, FolderStatus::Idle, elapsed, None)
            .await;
    }

    /// One pull-timer tick (§4.1): gate on the initial scan, skip no-op
    /// ticks where nothing in any remote index has moved since the last run,
    /// and otherwise run a full pull iteration. Returns the delay before the
    /// next tick.
    async fn run_pull_tick(&mut self) -> Duration {
        if self.scanner.is_some() && !self.state.lock().await.initial_scan_done {
            return self.config.pull_sleep_interval;
        }

        let remotes: Vec<HashMap<String, FileInfo>> =
            self.remote_indexes.read().await.values().cloned().collect();

        if !self.config.paused {
            let watermark = remote_watermark(&remotes);
            let unchanged = self.state.lock().await.prev_remote_watermark == Some(watermark);
            if unchanged {
                return self.config.pull_sleep_interval;
            }
            self.state.lock().await.prev_remote_watermark = Some(watermark);
        }

        let span = info_span!("pull_iteration", folder = %self.config.id);
        let outcome = self.run_iteration(&remotes).instrument(span).await;

        match outcome {
            Ok(()) => {
                let mut state = self.state.lock().await;
                state.record_success();
                if state.status != FolderStatus::Idle {
                    let (from, elapsed) = state.transition(FolderStatus::Idle);
                    drop(state);
                    self.emit_state_changed(from, FolderStatus::Idle, elapsed, None)
                        .await;
                }
                self.config.pull_sleep_interval
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                let exhausted = state.record_failure(&self.config.id, &e);
                let target = if exhausted {
                    FolderStatus::Paused {
                        retry_exhausted: true,
                    }
                } else {
                    FolderStatus::Error
                };
                let (from, elapsed) = state.transition(target.clone());
                drop(state);
                warn!(folder = %self.config.id, error = %e, exhausted, "pull iteration failed");
                self.emit_state_changed(from, target, elapsed, Some(e.to_string()))
                    .await;
                if exhausted {
                    self.config.pull_pause_interval
                } else {
                    self.config.pull_sleep_interval
                }
            }
        }
    }

    async fn run_iteration(&mut self, remotes: &[HashMap<String, FileInfo>]) -> Result<()> {
        if self.config.paused {
            return Err(CoreError::FolderPaused(self.config.id.clone()));
        }
        self.health.check(&self.config).await?;

        {
            let mut state = self.state.lock().await;
            if let FolderStatus::Paused {
                retry_exhausted: true,
            } = state.status
            {
                state.resume();
                info!(folder = %self.config.id, "resuming after retry back-off");
            }
        }

        let local_files = self.store.local_since(&self.config.id, 0).await?;
        let local: HashMap<String, FileInfo> = local_files
            .into_iter()
            .map(|f| (f.name.clone(), f))
            .collect();

        let needs = compute_need_list(&local, remotes, self.config.pull_order);
        if needs.is_empty() {
            let (from, elapsed) = self.state.lock().await.transition(FolderStatus::Idle);
            self.emit_state_changed(from, FolderStatus::Idle, elapsed, None)
                .await;
            return Ok(());
        }

        let (from, elapsed) = self.state.lock().await.transition(FolderStatus::Syncing);
        self.emit_state_changed(from, FolderStatus::Syncing, elapsed, None)
            .await;

        // Partition per §4.2 step 1: directory creates and the regular-file
        // queue go out now; deletions wait for a stage-close barrier.
        let mut dir_creates = Vec::new();
        let mut file_deletions = Vec::new();
        let mut dir_deletions = Vec::new();
        let mut queue = Vec::new();
        let mut pull_file_size = 0u64;

        for need in needs {
            if need.remote.deleted {
                if need.remote.is_directory() {
                    dir_deletions.push(need);
                } else {
                    file_deletions.push(need);
                }
            } else if need.remote.is_directory() {
                dir_creates.push(need);
            } else {
                pull_file_size += need.remote.block_bytes();
                queue.push(need);
            }
        }

        fs_utils::check_disk_space(&self.config.id, &self.config.path, pull_file_size).await?;

        let queue = self.detect_renames(queue, &mut file_deletions).await;

        // Dispatch directory creates and the regular-file queue, then wait
        // for every one to fully retire before running deletions (§4.2 step
        // 5) — the per-iteration stage-close barrier.
        let dispatched = dir_creates.len() + queue.len();
        let (done_tx, mut done_rx) = mpsc::channel(dispatched.max(1));

        for need in dir_creates.into_iter().chain(queue.into_iter()) {
            self.dispatch(need.remote, done_tx.clone()).await?;
        }
        drop(done_tx);
        for _ in 0..dispatched {
            if done_rx.recv().await.is_none() {
                break;
            }
        }

        // Deletions: files in arbitrary order, directories in reverse
        // delivery order so children are removed before their parents
        // (§4.2 step 6).
        dir_deletions.reverse();
        for need in file_deletions.into_iter().chain(dir_deletions.into_iter()) {
            let (done_tx, _done_rx) = mpsc::channel(1);
            self.dispatch(need.remote, done_tx).await?;
        }

        Ok(())
    }

    /// Matches queued files against pending deletions with an identical
    /// block list (§4.2 step 4, §4.7): same content under a new name is a
    /// move, handled with a direct filesystem rename instead of an
    /// independent delete-then-copy. Consumed deletions are removed from
    /// `file_deletions` in place; entries that don't match, or whose rename
    /// attempt fails, fall through to the normal queue.
    async fn detect_renames(
        &self,
        queue: Vec<super::iteration::NeedEntry>,
        file_deletions: &mut Vec<super::iteration::NeedEntry>,
    ) -> Vec<super::iteration::NeedEntry> {
        let mut buckets: HashMap<[u8; 32], Vec<usize>> = HashMap::new();
        for (index, need) in file_deletions.iter().enumerate() {
            if let Some(local) = &need.local {
                if let Some(first) = local.blocks.first() {
                    buckets.entry(first.strong_hash).or_default().push(index);
                }
            }
        }

        let mut consumed = vec![false; file_deletions.len()];
        let mut remaining = Vec::with_capacity(queue.len());

        for need in queue {
            let matched = need.remote.blocks.first().and_then(|first| {
                buckets.get(&first.strong_hash).and_then(|candidates| {
                    candidates.iter().copied().find(|&idx| {
                        !consumed[idx]
                            && file_deletions[idx]
                                .local
                                .as_ref()
                                .is_some_and(|l| l.blocks == need.remote.blocks)
                    })
                })
            });

            match matched {
                Some(idx) => {
                    let source_name = file_deletions[idx].local.as_ref().unwrap().name.clone();
                    match self.rename_file(&source_name, &need.remote).await {
                        Ok(()) => consumed[idx] = true,
                        Err(e) => {
                            warn!(
                                folder = %self.config.id,
                                from = %source_name,
                                to = %need.remote.name,
                                error = %e,
                                "rename detection matched but the rename failed; falling back to independent copy"
                            );
                            remaining.push(need);
                        }
                    }
                }
                None => remaining.push(need),
            }
        }

        let mut index = 0;
        file_deletions.retain(|_| {
            let keep = !consumed[index];
            index += 1;
            keep
        });

        remaining
    }

    /// Moves `source_name` on disk to `target`'s name and updates the local
    /// index directly — renames never touch the block-pull pipeline since no
    /// new content needs fetching (§4.7).
    async fn rename_file(&self, source_name: &str, target: &FileInfo) -> Result<()> {
        let source_path = self.config.path.join(source_name);
        let target_path = self.config.path.join(&target.name);

        if let Some(versioner) = &self.versioner {
            versioner.archive(&source_path).await?;
        }
        fs_utils::atomic_rename(&source_path, &target_path).await?;

        let mut tombstone = target.clone();
        tombstone.name = source_name.to_string();
        tombstone.deleted = true;
        tombstone.blocks.clear();
        tombstone.sequence = 0;
        self.store.put_local(&self.config.id, tombstone).await?;

        let mut local_target = target.clone();
        local_target.sequence = 0;
        self.store.put_local(&self.config.id, local_target).await?;

        self.emit(CoreEvent::LocalIndexUpdated {
            folder: self.config.id.clone(),
        })
        .await;
        Ok(())
    }

    async fn dispatch(&self, target: FileInfo, done_tx: mpsc::Sender<()>) -> Result<()> {
        let job = CopyJob {
            folder: self.config.id.clone(),
            target,
            done_tx,
        };
        self.copy_tx
            .send(job)
            .await
            .map_err(|_| CoreError::InvalidState("copier channel closed".to_string()))
    }

    async fn emit(&self, event: CoreEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event).await;
        }
    }

    async fn emit_state_changed(
        &self,
        from: FolderStatus,
        to: FolderStatus,
        elapsed: u64,
        error: Option<String>,
    ) {
        self.emit(CoreEvent::StateChanged(StateChanged {
            folder: self.config.id.clone(),
            from: from.as_lifecycle(),
            to: to.as_lifecycle(),
            duration_since_last_change_secs: elapsed,
            error,
        }))
        .await;
    }
}

/// Cheap proxy for "did any remote index move since the last tick" (`prevVer`
/// in §4.1), since this codebase has no separate Model-hub notification
/// channel to gate the pull timer on directly — folding every remote file's
/// sequence number is sufficient to detect any index mutation without
/// requiring a new cross-module wiring path.
fn remote_watermark(remotes: &[HashMap<String, FileInfo>]) -> u64 {
    remotes
        .iter()
        .flat_map(|idx| idx.values())
        .map(|f| f.sequence)
        .fold(0u64, u64::wrapping_add)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockInfo, FileType, LocalFlags, VersionVector};

    fn remote_file(name: &str) -> FileInfo {
        let mut version = VersionVector::new();
        version.update(ShortId(99));
        FileInfo {
            name: name.to_string(),
            file_type: FileType::File,
            size: 4,
            modified: chrono::Utc::now(),
            permissions: 0o644,
            version,
            sequence: 1,
            deleted: false,
            blocks: vec![BlockInfo::new(0, 4, 0, [1u8; 32])],
            symlink_target: String::new(),
            local_flags: LocalFlags::empty(),
        }
    }

    #[test]
    fn test_remote_watermark_changes_when_sequence_changes() {
        let mut a = HashMap::new();
        a.insert("f".to_string(), remote_file("f"));
        let w1 = remote_watermark(&[a.clone()]);
        a.get_mut("f").unwrap().sequence = 2;
        let w2 = remote_watermark(&[a]);
        assert_ne!(w1, w2);
    }

    #[test]
    fn test_remote_watermark_stable_across_clones() {
        let mut a = HashMap::new();
        a.insert("f".to_string(), remote_file("f"));
        assert_eq!(remote_watermark(&[a.clone()]), remote_watermark(&[a]));
    }
}
