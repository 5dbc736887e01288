//! Download-progress sender: tracks which block indexes have been advertised
//! to each peer for each in-flight file, so the puller can emit only the
//! delta after each successful block (§4.11).

use crate::model::ShortId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

/// One advertisement delta sent over a `Connection`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProgressUpdate {
    Append {
        folder: String,
        name: String,
        block_indexes: Vec<usize>,
    },
    Forget {
        folder: String,
        name: String,
    },
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Hash)]
struct Key {
    peer: ShortId,
    folder: String,
    name: String,
}

/// Coalesces per-block advertisements into flushes at most every
/// `flush_interval`, and guarantees at-most-one outstanding advertisement set
/// per `(peer, folder, name)` (§8 invariant 6).
pub struct ProgressSender {
    advertised: HashMap<Key, HashSet<usize>>,
    pending: HashMap<Key, HashSet<usize>>,
    flush_interval: Duration,
}

impl ProgressSender {
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            advertised: HashMap::new(),
            pending: HashMap::new(),
            flush_interval,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Record that `block_index` of `(folder, name)` finished downloading
    /// from the perspective of advertising it to `peer`.
    pub fn record_block(&mut self, peer: ShortId, folder: &str, name: &str, block_index: usize) {
        let key = Key {
            peer,
            folder: folder.to_string(),
            name: name.to_string(),
        };
        self.pending.entry(key).or_default().insert(block_index);
    }

    /// Drop all advertisement state for `(folder, name)` across every peer —
    /// called when the file's version changes or its shared puller state is
    /// torn down, emitting a `Forget` for any peer that had advertisements.
    pub fn forget(&mut self, folder: &str, name: &str) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        let matches: Vec<Key> = self
            .advertised
            .keys()
            .chain(self.pending.keys())
            .filter(|k| k.folder == folder && k.name == name)
            .cloned()
            .collect();
        let mut seen_peers = HashSet::new();
        for key in matches {
            if seen_peers.insert(key.clone()) {
                self.advertised.remove(&key);
                self.pending.remove(&key);
                updates.push(ProgressUpdate::Forget {
                    folder: folder.to_string(),
                    name: name.to_string(),
                });
            }
        }
        updates
    }

    /// Compute the delta-only `Append` updates due since the last flush and
    /// merge them into the advertised set. Intended to be called on a timer
    /// at `flush_interval` cadence.
    pub fn flush(&mut self) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        for (key, pending_indexes) in self.pending.drain() {
            let advertised = self.advertised.entry(key.clone()).or_default();
            let delta: Vec<usize> = pending_indexes.difference(advertised).copied().collect();
            advertised.extend(&pending_indexes);
            if !delta.is_empty() {
                debug!(peer = %key.peer, folder = %key.folder, name = %key.name, count = delta.len(), "flushing download progress");
                updates.push(ProgressUpdate::Append {
                    folder: key.folder,
                    name: key.name,
                    block_indexes: delta,
                });
            }
        }
        updates
    }
}
