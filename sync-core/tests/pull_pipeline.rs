//! End-to-end scenarios for the block-pull pipeline and folder controller,
//! driven entirely through in-memory test doubles for `Connection`,
//! `IndexStore` and `BlockIndex` — no real network or database involved.

use async_trait::async_trait;
use foldersync_core::block_index::{BlockIndex, BlockOccurrence};
use foldersync_core::connection::Connection;
use foldersync_core::error::{CoreError, Result};
use foldersync_core::events::{ClusterConfig, IndexMessage};
use foldersync_core::index_store::IndexStore;
use foldersync_core::model::{
    BlockInfo, DeviceId, FileInfo, FileType, LocalFlags, ShortId, VersionVector,
};
use foldersync_core::pipeline::{copier, db_updater, finisher, puller, CopyJob};
use foldersync_core::progress::{ProgressSender, ProgressUpdate};
use foldersync_core::versioner::NoVersioning;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

/// A peer that serves whatever bytes were seeded into it by offset, and can
/// be told to fail the next N requests to exercise candidate rotation.
struct FakePeer {
    device: DeviceId,
    data: Vec<u8>,
    fail_next: AtomicUsize,
}

#[async_trait]
impl Connection for FakePeer {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    async fn send_index(&self, _msg: IndexMessage) -> Result<()> {
        Ok(())
    }

    async fn send_cluster_config(&self, _config: ClusterConfig) -> Result<()> {
        Ok(())
    }

    async fn request_block(
        &self,
        _folder: &str,
        _name: &str,
        offset: u64,
        size: u32,
    ) -> Result<Vec<u8>> {
        if self.fail_next.load(Ordering::SeqCst) > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            return Err(CoreError::BlockRequestFailed {
                file: _name.to_string(),
                block_index: 0,
                reason: "simulated failure".to_string(),
            });
        }
        let start = offset as usize;
        let end = start + size as usize;
        Ok(self.data[start..end].to_vec())
    }

    async fn send_download_progress(&self, _folder: &str, _updates: Vec<ProgressUpdate>) -> Result<()> {
        Ok(())
    }

    fn is_ready(&self) -> bool {
        true
    }
}

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

#[derive(Default)]
struct EmptyBlockIndex;

#[async_trait]
impl BlockIndex for EmptyBlockIndex {
    async fn occurrences(&self, _strong_hash: &[u8; 32]) -> Result<Vec<BlockOccurrence>> {
        Ok(Vec::new())
    }
    async fn record(&self, _strong_hash: [u8; 32], _occurrence: BlockOccurrence) -> Result<()> {
        Ok(())
    }
    async fn forget_path(&self, _folder: &str, _path: &std::path::Path) -> Result<()> {
        Ok(())
    }
    async fn fix(&self) -> Result<()> {
        Ok(())
    }
}

fn target_file(name: &str, contents: &[u8]) -> FileInfo {
    let block_size = 8usize;
    let mut blocks = Vec::new();
    let mut offset = 0u64;
    for chunk in contents.chunks(block_size) {
        let hash = blake3::hash(chunk);
        blocks.push(BlockInfo::new(offset, chunk.len() as u32, 0, *hash.as_bytes()));
        offset += chunk.len() as u64;
    }
    FileInfo {
        name: name.to_string(),
        file_type: FileType::File,
        size: contents.len() as u64,
        modified: chrono::Utc::now(),
        permissions: 0o644,
        version: VersionVector::new(),
        sequence: 0,
        deleted: false,
        blocks,
        symlink_target: String::new(),
        local_flags: LocalFlags::empty(),
    }
}

/// S1: a file fully needed from one peer pulls end-to-end and lands in the
/// index store with matching contents.
#[tokio::test]
async fn test_full_pull_from_single_peer() {
    let temp = tempfile::TempDir::new().unwrap();
    let contents = b"hello world, this is file content".to_vec();
    let file = target_file("greeting.txt", &contents);

    let peer_device = DeviceId([1u8; 32]);
    let peer: Arc<dyn Connection> = Arc::new(FakePeer {
        device: peer_device,
        data: contents.clone(),
        fail_next: AtomicUsize::new(0),
    });
    let peer_short = peer_device.truncate();

    let store: Arc<dyn IndexStore> = Arc::new(MemoryStore::default());
    let block_index: Arc<dyn BlockIndex> = Arc::new(EmptyBlockIndex::default());

    let (copy_tx, copy_rx) = mpsc::channel(8);
    let (block_tx, block_rx) = mpsc::channel(8);
    let (finish_tx, finish_rx) = mpsc::channel(8);
    let (outcome_tx, outcome_rx) = mpsc::channel(8);
    let (event_tx, _event_rx) = mpsc::channel(8);

    let files_by_name = Arc::new(RwLock::new(HashMap::new()));
    let mut connections_map = HashMap::new();
    connections_map.insert(peer_short, peer);
    let connections = Arc::new(RwLock::new(connections_map));
    let activity = Arc::new(foldersync_core::device_activity::DeviceActivity::new());
    let folder_errors = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(copier::run(
        copy_rx,
        block_tx,
        finish_tx.clone(),
        block_index,
        Arc::new(move |_folder: &str, _block_index: usize| vec![peer_short]),
        temp.path().to_path_buf(),
        files_by_name.clone(),
    ));
    let progress = Arc::new(Mutex::new(ProgressSender::new(std::time::Duration::from_secs(2))));
    puller::spawn_pool(2, block_rx, finish_tx, connections, activity, files_by_name, progress);
    tokio::spawn(finisher::run(
        finish_rx,
        outcome_tx,
        store.clone(),
        Arc::new(NoVersioning),
        ShortId(0),
        false,
        false,
    ));
    tokio::spawn(db_updater::run(outcome_rx, store.clone(), event_tx, folder_errors));

    let (done_tx, _done_rx) = mpsc::channel(1);
    copy_tx
        .send(CopyJob {
            folder: "default".to_string(),
            target: file,
            done_tx,
        })
        .await
        .unwrap();
    drop(copy_tx);

    // Give the pipeline a moment to drain.
    for _ in 0..50 {
        if store.get_local("default", "greeting.txt").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let stored = store.get_local("default", "greeting.txt").await.unwrap();
    assert!(stored.is_some(), "file should have been pulled and persisted");

    let final_path = temp.path().join("greeting.txt");
    let on_disk = tokio::fs::read(&final_path).await.unwrap();
    assert_eq!(on_disk, contents);
}

/// S2: a hash mismatch on the first candidate rotates to the second, which
/// succeeds.
#[tokio::test]
async fn test_hash_mismatch_rotates_to_next_candidate() {
    let temp = tempfile::TempDir::new().unwrap();
    let contents = b"abcdefgh".to_vec();
    let file = target_file("small.bin", &contents);

    let bad_device = DeviceId([2u8; 32]);
    let bad_peer: Arc<dyn Connection> = Arc::new(FakePeer {
        device: bad_device,
        data: b"WRONGBYT".to_vec(),
        fail_next: AtomicUsize::new(0),
    });
    let good_device = DeviceId([3u8; 32]);
    let good_peer: Arc<dyn Connection> = Arc::new(FakePeer {
        device: good_device,
        data: contents.clone(),
        fail_next: AtomicUsize::new(0),
    });

    let bad_short = bad_device.truncate();
    let good_short = good_device.truncate();

    let store: Arc<dyn IndexStore> = Arc::new(MemoryStore::default());
    let block_index: Arc<dyn BlockIndex> = Arc::new(EmptyBlockIndex::default());

    let (copy_tx, copy_rx) = mpsc::channel(8);
    let (block_tx, block_rx) = mpsc::channel(8);
    let (finish_tx, finish_rx) = mpsc::channel(8);
    let (outcome_tx, outcome_rx) = mpsc::channel(8);
    let (event_tx, _event_rx) = mpsc::channel(8);

    let files_by_name = Arc::new(RwLock::new(HashMap::new()));
    let mut connections_map = HashMap::new();
    connections_map.insert(bad_short, bad_peer);
    connections_map.insert(good_short, good_peer);
    let connections = Arc::new(RwLock::new(connections_map));
    let activity = Arc::new(foldersync_core::device_activity::DeviceActivity::new());
    let folder_errors = Arc::new(Mutex::new(HashMap::new()));

    tokio::spawn(copier::run(
        copy_rx,
        block_tx,
        finish_tx.clone(),
        block_index,
        Arc::new(move |_folder: &str, _block_index: usize| vec![bad_short, good_short]),
        temp.path().to_path_buf(),
        files_by_name.clone(),
    ));
    let progress = Arc::new(Mutex::new(ProgressSender::new(std::time::Duration::from_secs(2))));
    puller::spawn_pool(1, block_rx, finish_tx, connections, activity, files_by_name, progress);
    tokio::spawn(finisher::run(
        finish_rx,
        outcome_tx,
        store.clone(),
        Arc::new(NoVersioning),
        ShortId(0),
        false,
        false,
    ));
    tokio::spawn(db_updater::run(outcome_rx, store.clone(), event_tx, folder_errors));

    let (done_tx, _done_rx) = mpsc::channel(1);
    copy_tx
        .send(CopyJob {
            folder: "default".to_string(),
            target: file,
            done_tx,
        })
        .await
        .unwrap();
    drop(copy_tx);

    for _ in 0..50 {
        if store.get_local("default", "small.bin").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let on_disk = tokio::fs::read(temp.path().join("small.bin")).await.unwrap();
    assert_eq!(on_disk, contents);
}
