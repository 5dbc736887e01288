//! Event bus types. The core publishes these on a broadcast channel owned by
//! each subsystem that cares (summary service, progress sender, a host's UI
//! bridge); nothing in this module implements delivery itself.

use crate::model::{DeviceId, FileInfo, ShortId};
use serde::{Deserialize, Serialize};

/// A full index for one folder, sent on initial connect or reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMessage {
    pub folder: String,
    pub files: Vec<FileInfo>,
    /// `true` for a full index, `false` for an incremental update.
    pub full: bool,
}

/// Advertises which folders a device has and the devices it shares each
/// folder with, so peers can discover indirect connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub device: DeviceId,
    pub folders: Vec<String>,
}

/// One folder controller lifecycle state, mirrored on `FolderState` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FolderLifecycleState {
    Idle,
    Scanning,
    Syncing,
    Error,
    Paused,
}

/// Per-folder aggregate counts, published (debounced) by the summary service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSummary {
    pub folder: String,
    pub global_files: u64,
    pub global_bytes: u64,
    pub local_files: u64,
    pub local_bytes: u64,
    pub need_files: u64,
    pub need_bytes: u64,
    pub state: FolderLifecycleState,
}

/// Per-device completion percentage for one folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderCompletion {
    pub folder: String,
    pub device: ShortId,
    pub completion_pct: f64,
    pub need_bytes: u64,
}

/// Current folder error map, surfaced whenever it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderErrors {
    pub folder: String,
    pub errors: Vec<String>,
}

/// Fired when the puller begins work on one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemStarted {
    pub folder: String,
    pub name: String,
}

/// Fired when the finisher commits (or gives up on) one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFinished {
    pub folder: String,
    pub name: String,
    pub error: Option<String>,
}

/// Fired by the db-update batcher (§4.6) for the last `handle-file` or
/// `delete-file` job of a committed batch, so the host can fan an outgoing
/// `IndexUpdate` to every device sharing the folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceivedFile {
    pub folder: String,
    pub file: FileInfo,
}

/// One folder controller lifecycle transition (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChanged {
    pub folder: String,
    pub from: FolderLifecycleState,
    pub to: FolderLifecycleState,
    pub duration_since_last_change_secs: u64,
    pub error: Option<String>,
}

/// Umbrella event enum published on the core's internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CoreEvent {
    StateChanged(StateChanged),
    LocalIndexUpdated { folder: String },
    RemoteIndexUpdated { folder: String, device: ShortId },
    DeviceConnected { device: ShortId },
    DeviceDisconnected { device: ShortId },
    ClusterConfigReceived { device: ShortId },
    FolderWatchStateChanged { folder: String, watching: bool },
    FolderSummary(FolderSummary),
    FolderCompletion(FolderCompletion),
    FolderErrors(FolderErrors),
    ItemStarted(ItemStarted),
    ItemFinished(ItemFinished),
    ReceivedFile(ReceivedFile),
}
