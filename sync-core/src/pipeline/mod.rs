//! The three-stage block-pull pipeline: copier → puller → finisher, plus the
//! database-update batcher that trails the finisher. See §4.2–§4.6 for the
//! authoritative algorithm text; this module wires the stages together with
//! bounded `mpsc` channels sized per §5's scheduling/back-pressure policy.

pub mod copier;
pub mod db_updater;
pub mod finisher;
pub mod puller;

use crate::model::{BlockInfo, FileInfo, ShortId};
use crate::puller_state::PullerState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channel capacity between stages. Kept small and equal so back-pressure
/// propagates promptly from a slow finisher all the way back to the scan
/// loop instead of letting one stage race ahead and buffer unboundedly.
pub const STAGE_CHANNEL_CAPACITY: usize = 64;

/// One file the copier has been asked to prepare for pulling.
#[derive(Debug, Clone)]
pub struct CopyJob {
    pub folder: String,
    pub target: FileInfo,
    /// Signalled once this job's work is fully retired by the finisher, so
    /// the folder controller can implement the per-iteration stage-close
    /// barrier (§4.2 step 5) without closing and reopening the pipeline's
    /// long-lived channels on every iteration.
    pub done_tx: mpsc::Sender<()>,
}

/// One block the puller must fetch from a remote peer, after the copier
/// determined it could not be satisfied from local reuse.
#[derive(Debug, Clone)]
pub struct BlockJob {
    pub folder: String,
    pub name: String,
    pub block_index: usize,
    pub block: BlockInfo,
    pub candidates: Vec<ShortId>,
    pub state: Arc<PullerState>,
}

/// A file whose blocks are all present in its temp file and is ready for the
/// finisher to commit.
#[derive(Debug, Clone)]
pub struct FinishJob {
    pub folder: String,
    pub target: FileInfo,
    pub temp_path: PathBuf,
    pub done_tx: mpsc::Sender<()>,
}

/// Outcome the finisher reports for the db-update batcher to persist.
#[derive(Debug, Clone)]
pub struct FinishOutcome {
    pub folder: String,
    pub name: String,
    pub file: FileInfo,
    pub error: Option<String>,
}
