//! End-to-end scenarios for the folder controller's retry/pause policy and
//! its interaction with a populated remote index.

use async_trait::async_trait;
use foldersync_core::error::Result;
use foldersync_core::folder::FolderController;
use foldersync_core::index_store::IndexStore;
use foldersync_core::model::{
    BlockInfo, FileInfo, FileType, FolderConfig, LocalFlags, ShortId, VersionVector,
};
use foldersync_core::pipeline::CopyJob;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};

#[derive(Default)]
struct MemoryStore {
    local: Mutex<HashMap<String, HashMap<String, FileInfo>>>,
}

#[async_trait]
impl IndexStore for MemoryStore {
    async fn get_local(&self, folder: &str, name: &str) -> Result<Option<FileInfo>> {
        Ok(self.local.lock().await.get(folder).and_then(|f| f.get(name)).cloned())
    }
    async fn put_local(&self, folder: &str, file: FileInfo) -> Result<()> {
        self.local
            .lock()
            .await
            .entry(folder.to_string())
            .or_default()
            .insert(file.name.clone(), file);
        Ok(())
    }
    async fn local_since(&self, folder: &str, since: u64) -> Result<Vec<FileInfo>> {
        Ok(self
            .local
            .lock()
            .await
            .get(folder)
            .map(|f| f.values().filter(|x| x.sequence > since).cloned().collect())
            .unwrap_or_default())
    }
    async fn remote_index(&self, _folder: &str, _device: ShortId) -> Result<Vec<FileInfo>> {
        Ok(Vec::new())
    }
    async fn put_remote(&self, _folder: &str, _device: ShortId, _files: Vec<FileInfo>) -> Result<()> {
        Ok(())
    }
    async fn sequence(&self, _folder: &str) -> Result<u64> {
        Ok(0)
    }
    async fn set_virtual_mtime(
        &self,
        _folder: &str,
        _path: &str,
        _virtual_mtime: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        Ok(())
    }
    async fn virtual_mtime(
        &self,
        _folder: &str,
        _path: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        Ok(None)
    }
}

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

/// A folder whose path doesn't exist on disk fails every iteration with
/// `FolderPathMissing` and never dispatches a copy job.
#[tokio::test]
async fn test_missing_folder_path_never_dispatches_copy_jobs() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryStore::default());
    let (copy_tx, mut copy_rx) = mpsc::channel::<CopyJob>(4);
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut remotes = HashMap::new();
    remotes.insert(ShortId(99), HashMap::from([("a.txt".to_string(), remote_file("a.txt"))]));
    let remote_indexes = Arc::new(RwLock::new(remotes));

    let config = FolderConfig::new("default", "/nonexistent/path/for/test");
    let controller = FolderController::new(config, store, copy_tx, stop_rx, remote_indexes);
    let state = controller.state();

    tokio::spawn(controller.run());
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(copy_rx.try_recv().is_err());
    let snapshot = state.lock().await;
    assert!(snapshot.consecutive_failures >= 1);
}

/// A folder with an existing path and a populated remote index dispatches a
/// copy job for the needed file.
#[tokio::test]
async fn test_folder_with_remote_file_dispatches_copy_job() {
    let temp = tempfile::TempDir::new().unwrap();
    let store: Arc<dyn IndexStore> = Arc::new(MemoryStore::default());
    let (copy_tx, mut copy_rx) = mpsc::channel::<CopyJob>(4);
    let (_stop_tx, stop_rx) = watch::channel(false);

    let mut remotes = HashMap::new();
    remotes.insert(ShortId(99), HashMap::from([("a.txt".to_string(), remote_file("a.txt"))]));
    let remote_indexes = Arc::new(RwLock::new(remotes));

    let config = FolderConfig::new("default", temp.path());
    let controller = FolderController::new(config, store, copy_tx, stop_rx, remote_indexes);

    tokio::spawn(controller.run());

    let job = tokio::time::timeout(std::time::Duration::from_secs(2), copy_rx.recv())
        .await
        .expect("copy job should be dispatched")
        .expect("channel should stay open");
    assert_eq!(job.target.name, "a.txt");
}

#[tokio::test]
async fn test_paused_folder_reports_paused_error_without_dispatch() {
    let store: Arc<dyn IndexStore> = Arc::new(MemoryStore::default());
    let (copy_tx, mut copy_rx) = mpsc::channel::<CopyJob>(4);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let remote_indexes = Arc::new(RwLock::new(HashMap::new()));

    let mut config = FolderConfig::new("default", "/tmp");
    config.paused = true;
    config.pull_sleep_interval = std::time::Duration::from_millis(10);

    let controller = FolderController::new(config, store, copy_tx, stop_rx, remote_indexes);
    let state = controller.state();
    tokio::spawn(controller.run());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(copy_rx.try_recv().is_err());
    assert!(state.lock().await.consecutive_failures >= 1);
}
