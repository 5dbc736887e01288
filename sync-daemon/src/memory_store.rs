//! In-memory `IndexStore` implementation. Stands in for the SQLite-backed
//! store a real deployment would use — good enough to drive the engine
//! end-to-end from the CLI without provisioning a database.

use async_trait::async_trait;
use foldersync_core::block_index::{BlockIndex, BlockOccurrence};
use foldersync_core::error::Result;
use foldersync_core::index_store::IndexStore;
use foldersync_core::model::{FileInfo, ShortId};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryIndexStore {
    local: Mutex<HashMap<String, HashMap<String, FileInfo>>>,
    remote: Mutex<HashMap<String, HashMap<ShortId, HashMap<String, FileInfo>>>>,
    sequence: Mutex<HashMap<String, u64>>,
    virtual_mtimes: Mutex<HashMap<(String, String), chrono::DateTime<chrono::Utc>>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn get_local(&self, folder: &str, name: &str) -> Result<Option<FileInfo>> {
        Ok(self
            .local
            .lock()
            .unwrap()
            .get(folder)
            .and_then(|files| files.get(name))
            .cloned())
    }

    async fn put_local(&self, folder: &str, mut file: FileInfo) -> Result<()> {
        let mut sequence = self.sequence.lock().unwrap();
        let next = sequence.entry(folder.to_string()).or_insert(0);
        *next += 1;
        file.sequence = *next;
        drop(sequence);

        self.local
            .lock()
            .unwrap()
            .entry(folder.to_string())
            .or_default()
            .insert(file.name.clone(), file);
        Ok(())
    }

    async fn local_since(&self, folder: &str, since: u64) -> Result<Vec<FileInfo>> {
        Ok(self
            .local
            .lock()
            .unwrap()
            .get(folder)
            .map(|files| {
                let mut out: Vec<FileInfo> = files
                    .values()
                    .filter(|f| f.sequence > since)
                    .cloned()
                    .collect();
                out.sort_by_key(|f| f.sequence);
                out
            })
            .unwrap_or_default())
    }

    async fn remote_index(&self, folder: &str, device: ShortId) -> Result<Vec<FileInfo>> {
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(folder)
            .and_then(|devices| devices.get(&device))
            .map(|files| files.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_remote(&self, folder: &str, device: ShortId, files: Vec<FileInfo>) -> Result<()> {
        let mut remote = self.remote.lock().unwrap();
        let entry = remote
            .entry(folder.to_string())
            .or_default()
            .entry(device)
            .or_default();
        for file in files {
            entry.insert(file.name.clone(), file);
        }
        Ok(())
    }

    async fn sequence(&self, folder: &str) -> Result<u64> {
        Ok(self
            .sequence
            .lock()
            .unwrap()
            .get(folder)
            .copied()
            .unwrap_or(0))
    }

    async fn set_virtual_mtime(
        &self,
        folder: &str,
        path: &str,
        virtual_mtime: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        self.virtual_mtimes
            .lock()
            .unwrap()
            .insert((folder.to_string(), path.to_string()), virtual_mtime);
        Ok(())
    }

    async fn virtual_mtime(
        &self,
        folder: &str,
        path: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        Ok(self
            .virtual_mtimes
            .lock()
            .unwrap()
            .get(&(folder.to_string(), path.to_string()))
            .copied())
    }
}

/// In-memory `BlockIndex`. A real deployment indexes every local file's
/// blocks as the scanner walks the folder; this keeps just enough state to
/// exercise the copier's local-reuse path in tests and the CLI demo.
#[derive(Default)]
pub struct MemoryBlockIndex {
    occurrences: Mutex<HashMap<[u8; 32], Vec<BlockOccurrence>>>,
}

impl MemoryBlockIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockIndex for MemoryBlockIndex {
    async fn occurrences(&self, strong_hash: &[u8; 32]) -> Result<Vec<BlockOccurrence>> {
        Ok(self
            .occurrences
            .lock()
            .unwrap()
            .get(strong_hash)
            .cloned()
            .unwrap_or_default())
    }

    async fn record(&self, strong_hash: [u8; 32], occurrence: BlockOccurrence) -> Result<()> {
        self.occurrences
            .lock()
            .unwrap()
            .entry(strong_hash)
            .or_default()
            .push(occurrence);
        Ok(())
    }

    async fn forget_path(&self, folder: &str, path: &std::path::Path) -> Result<()> {
        let mut table = self.occurrences.lock().unwrap();
        for occurrences in table.values_mut() {
            occurrences.retain(|o| !(o.folder == folder && o.path == path));
        }
        Ok(())
    }

    async fn fix(&self) -> Result<()> {
        let mut table = self.occurrences.lock().unwrap();
        for occurrences in table.values_mut() {
            occurrences.retain(|o| o.path.exists());
        }
        table.retain(|_, v| !v.is_empty());
        Ok(())
    }
}
