//! Puller stage (§4.4): a pool of workers that fetch blocks from remote
//! peers, verify their strong hash, write them into the file's temp copy,
//! and rotate to the next candidate peer on failure.

use super::{BlockJob, FinishJob};
use crate::connection::Connection;
use crate::device_activity::DeviceActivity;
use crate::error::CoreError;
use crate::model::{FileInfo, ShortId};
use crate::progress::ProgressSender;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info_span, warn, Instrument};

/// Spawns `pool_size` worker tasks pulling from the same `jobs` channel —
/// the bounded-concurrency pool described in §5.
#[allow(clippy::too_many_arguments)]
pub fn spawn_pool(
    pool_size: usize,
    jobs: mpsc::Receiver<BlockJob>,
    finish_tx: mpsc::Sender<FinishJob>,
    connections: Arc<tokio::sync::RwLock<HashMap<ShortId, Arc<dyn Connection>>>>,
    activity: Arc<DeviceActivity>,
    files_by_name: Arc<tokio::sync::RwLock<HashMap<(String, String), FileInfo>>>,
    progress: Arc<tokio::sync::Mutex<ProgressSender>>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let jobs = Arc::new(tokio::sync::Mutex::new(jobs));
    (0..pool_size)
        .map(|worker_id| {
            let jobs = jobs.clone();
            let finish_tx = finish_tx.clone();
            let connections = connections.clone();
            let activity = activity.clone();
            let files_by_name = files_by_name.clone();
            let progress = progress.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut guard = jobs.lock().await;
                        guard.recv().await
                    };
                    let Some(job) = job else { break };
                    let span = info_span!("pull", worker = worker_id, folder = %job.folder, name = %job.name, block = job.block_index);
                    handle_job(job, &finish_tx, &connections, &activity, &files_by_name, &progress)
                        .instrument(span)
                        .await;
                }
            })
        })
        .collect()
}

async fn handle_job(
    job: BlockJob,
    finish_tx: &mpsc::Sender<FinishJob>,
    connections: &tokio::sync::RwLock<HashMap<ShortId, Arc<dyn Connection>>>,
    activity: &DeviceActivity,
    files_by_name: &tokio::sync::RwLock<HashMap<(String, String), FileInfo>>,
    progress: &tokio::sync::Mutex<ProgressSender>,
) {
    let mut last_error = None;

    for candidate in &job.candidates {
        let connection = {
            let table = connections.read().await;
            table.get(candidate).cloned()
        };
        let Some(connection) = connection else { continue };
        if !connection.is_ready() {
            continue;
        }

        activity.begin_request(*candidate);
        let result = connection
            .request_block(&job.folder, &job.name, job.block.offset, job.block.size)
            .await;
        activity.end_request(*candidate);

        match result {
            Ok(bytes) => {
                let hash = blake3::hash(&bytes);
                if hash.as_bytes() != &job.block.strong_hash {
                    last_error = Some(CoreError::HashMismatch {
                        file: job.name.clone(),
                        block_index: job.block_index,
                    });
                    continue;
                }
                if let Err(e) = write_block(job.state.temp_path(), job.block.offset, &bytes).await {
                    last_error = Some(CoreError::local_fs(job.name.clone(), &e));
                    continue;
                }

                advertise_block(*candidate, &job, connections, progress).await;

                let complete = job.state.mark_done(job.block_index);
                if complete {
                    let key = (job.folder.clone(), job.name.clone());
                    let target = files_by_name.read().await.get(&key).cloned();
                    if let Some(target) = target {
                        let _ = finish_tx
                            .send(FinishJob {
                                folder: job.folder.clone(),
                                target,
                                temp_path: job.state.temp_path().to_path_buf(),
                                done_tx: job.state.done_tx(),
                            })
                            .await;
                    }
                }
                return;
            }
            Err(e) => {
                last_error = Some(e);
            }
        }
    }

    let reason = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no peer advertises this block".to_string());
    warn!(reason = %reason, "block request exhausted all candidates");
    job.state.fail(reason);
}

/// §4.11: once a block lands, tell every other ready peer so they can
/// opportunistically start pulling it from us before the whole file
/// finishes. The peer we just pulled the block from already knows it has
/// it, so it's excluded.
async fn advertise_block(
    source: ShortId,
    job: &BlockJob,
    connections: &tokio::sync::RwLock<HashMap<ShortId, Arc<dyn Connection>>>,
    progress: &tokio::sync::Mutex<ProgressSender>,
) {
    let peers: Vec<(ShortId, Arc<dyn Connection>)> = {
        let table = connections.read().await;
        table
            .iter()
            .filter(|(id, conn)| **id != source && conn.is_ready())
            .map(|(id, conn)| (*id, conn.clone()))
            .collect()
    };
    if peers.is_empty() {
        return;
    }

    let updates = {
        let mut sender = progress.lock().await;
        for (peer, _) in &peers {
            sender.record_block(*peer, &job.folder, &job.name, job.block_index);
        }
        sender.flush()
    };
    if updates.is_empty() {
        return;
    }

    for (_, connection) in peers {
        if let Err(e) = connection
            .send_download_progress(&job.folder, updates.clone())
            .await
        {
            warn!(error = %e, "failed to advertise download progress");
        }
    }
}

async fn write_block(
    temp_path: &std::path::Path,
    offset: u64,
    bytes: &[u8],
) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(temp_path)
        .await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    file.write_all(bytes).await?;
    Ok(())
}
