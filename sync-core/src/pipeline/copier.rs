//! Copier stage (§4.3): for each file needing a pull, try to satisfy blocks
//! from local reuse (same file and cross-file, via weak-hash matching
//! through [`crate::block_index::BlockIndex`]) before falling back to a
//! remote block request.

use super::{BlockJob, CopyJob, FinishJob};
use crate::block_index::BlockIndex;
use crate::fs_utils;
use crate::model::{FileInfo, ShortId};
use crate::puller_state::PullerState;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info_span, warn, Instrument};

/// Runs the copier loop: pulls `CopyJob`s off `jobs`, resolves what it can
/// locally, and forwards remaining work to `block_tx` (per-block) or
/// `finish_tx` (whole file already satisfied from local data).
pub async fn run(
    mut jobs: mpsc::Receiver<CopyJob>,
    block_tx: mpsc::Sender<BlockJob>,
    finish_tx: mpsc::Sender<FinishJob>,
    block_index: Arc<dyn BlockIndex>,
    candidates_for: Arc<dyn Fn(&str, usize) -> Vec<ShortId> + Send + Sync>,
    temp_dir: std::path::PathBuf,
    files_by_name: Arc<tokio::sync::RwLock<HashMap<(String, String), FileInfo>>>,
) {
    while let Some(job) = jobs.recv().await {
        let span = info_span!("copy", folder = %job.folder, name = %job.target.name);
        process_job(
            job,
            &block_tx,
            &finish_tx,
            block_index.as_ref(),
            candidates_for.as_ref(),
            &temp_dir,
            &files_by_name,
        )
        .instrument(span)
        .await;
    }
}

async fn process_job(
    job: CopyJob,
    block_tx: &mpsc::Sender<BlockJob>,
    finish_tx: &mpsc::Sender<FinishJob>,
    block_index: &dyn BlockIndex,
    candidates_for: &(dyn Fn(&str, usize) -> Vec<ShortId> + Send + Sync),
    temp_dir: &std::path::Path,
    files_by_name: &tokio::sync::RwLock<HashMap<(String, String), FileInfo>>,
) {
    let CopyJob { folder, target, done_tx } = job;
    files_by_name
        .write()
        .await
        .insert((folder.clone(), target.name.clone()), target.clone());

    // Deletions and directory creation carry no block content — forward
    // them to the finisher directly rather than staging a temp file.
    if target.deleted || target.is_directory() {
        let _ = finish_tx
            .send(FinishJob {
                folder,
                temp_path: temp_dir.join(fs_utils::temp_name(&target.name)),
                target,
                done_tx,
            })
            .await;
        return;
    }

    let temp_path = temp_dir.join(fs_utils::temp_name(&target.name));

    let state = Arc::new(PullerState::new(
        folder.clone(),
        target.name.clone(),
        temp_path.clone(),
        &target.blocks,
        done_tx,
    ));

    if let Err(e) = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&temp_path)
        .await
    {
        warn!(error = %e, "could not create temp file");
        return;
    }

    let mut needs_remote = Vec::new();
    for (index, block) in target.blocks.iter().enumerate() {
        match block_index.occurrences(&block.strong_hash).await {
            Ok(occurrences) if !occurrences.is_empty() => {
                if let Err(e) = reuse_block(&temp_path, block, &occurrences[0].path, occurrences[0].offset).await
                {
                    warn!(error = %e, block_index = index, "local block reuse failed, falling back to remote");
                    needs_remote.push(index);
                } else {
                    state.mark_done(index);
                }
            }
            _ => needs_remote.push(index),
        }
    }

    if needs_remote.is_empty() {
        let _ = finish_tx
            .send(FinishJob {
                folder,
                target,
                temp_path,
                done_tx: state.done_tx(),
            })
            .await;
        return;
    }

    for index in needs_remote {
        let block = target.blocks[index].clone();
        let candidates = candidates_for(&folder, index);
        let _ = block_tx
            .send(BlockJob {
                folder: folder.clone(),
                name: target.name.clone(),
                block_index: index,
                block,
                candidates,
                state: state.clone(),
            })
            .await;
    }
}

async fn reuse_block(
    temp_path: &std::path::Path,
    block: &crate::model::BlockInfo,
    source_path: &std::path::Path,
    source_offset: u64,
) -> std::io::Result<()> {
    let mut source = tokio::fs::File::open(source_path).await?;
    source.seek(std::io::SeekFrom::Start(source_offset)).await?;
    let mut buf = vec![0u8; block.size as usize];
    tokio::io::AsyncReadExt::read_exact(&mut source, &mut buf).await?;

    let mut dest = tokio::fs::OpenOptions::new()
        .write(true)
        .open(temp_path)
        .await?;
    dest.seek(std::io::SeekFrom::Start(block.offset)).await?;
    dest.write_all(&buf).await?;
    Ok(())
}
