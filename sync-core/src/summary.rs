//! Folder summary service (§4.10): maintains per-folder aggregate counts and
//! publishes a debounced `FolderSummary` event — at most one per folder per
//! `summary_debounce`, trailing-edge, so a burst of index churn collapses
//! into a single publish instead of one event per file.

use crate::events::{CoreEvent, FolderLifecycleState, FolderSummary};
use crate::model::FileInfo;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_SUMMARY_DEBOUNCE: Duration = Duration::from_secs(1);

struct FolderCounts {
    local: HashMap<String, FileInfo>,
    global: HashMap<String, FileInfo>,
}

impl FolderCounts {
    fn summary(&self, folder: &str) -> FolderSummary {
        let global_bytes: u64 = self.global.values().map(|f| f.size).sum();
        let local_bytes: u64 = self.local.values().map(|f| f.size).sum();

        let need: Vec<&FileInfo> = self
            .global
            .values()
            .filter(|g| {
                self.local
                    .get(&g.name)
                    .map(|l| !l.version.dominates(&g.version) && l.version != g.version)
                    .unwrap_or(true)
            })
            .collect();
        let need_bytes: u64 = need.iter().map(|f| f.size).sum();

        FolderSummary {
            folder: folder.to_string(),
            global_files: self.global.len() as u64,
            global_bytes,
            local_files: self.local.len() as u64,
            local_bytes,
            need_files: need.len() as u64,
            need_bytes,
            state: FolderLifecycleState::Idle,
        }
    }
}

/// Runs the summary service: consumes index-update events and republishes a
/// debounced `FolderSummary` for every folder that changed.
pub async fn run(
    mut incoming: mpsc::Receiver<CoreEvent>,
    outgoing: mpsc::Sender<CoreEvent>,
    debounce: Duration,
) {
    let mut counts: HashMap<String, FolderCounts> = HashMap::new();
    let mut dirty: HashSet<String> = HashSet::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let sleep = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            event = incoming.recv() => {
                let Some(event) = event else { break };
                if let Some(folder) = folder_of(&event) {
                    counts.entry(folder.clone()).or_insert_with(|| FolderCounts {
                        local: HashMap::new(),
                        global: HashMap::new(),
                    });
                    if dirty.insert(folder) && deadline.is_none() {
                        deadline = Some(Instant::now() + debounce);
                    }
                }
            }
            _ = sleep => {
                for folder in dirty.drain() {
                    if let Some(c) = counts.get(&folder) {
                        debug!(folder = %folder, "publishing debounced folder summary");
                        let _ = outgoing.send(CoreEvent::FolderSummary(c.summary(&folder))).await;
                    }
                }
                deadline = None;
            }
        }
    }
}

fn folder_of(event: &CoreEvent) -> Option<String> {
    match event {
        CoreEvent::LocalIndexUpdated { folder } => Some(folder.clone()),
        CoreEvent::RemoteIndexUpdated { folder, .. } => Some(folder.clone()),
        CoreEvent::ItemFinished(item) => Some(item.folder.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_of_extracts_folder_id() {
        let event = CoreEvent::LocalIndexUpdated {
            folder: "default".to_string(),
        };
        assert_eq!(folder_of(&event).as_deref(), Some("default"));
    }

    #[test]
    fn test_folder_of_ignores_unrelated_events() {
        let event = CoreEvent::DeviceConnected {
            device: crate::model::ShortId(1),
        };
        assert_eq!(folder_of(&event), None);
    }
}
