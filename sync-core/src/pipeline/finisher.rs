//! Finisher stage (§4.5): commits a completed temp file into place —
//! archiving the previous version on conflict, applying permissions and
//! mtime, and performing the atomic rename (or, for deletions/directories/
//! symlinks, the matching disposition) itself.

use super::{FinishJob, FinishOutcome};
use crate::fs_utils;
use crate::index_store::IndexStore;
use crate::model::{FileInfo, ShortId, VersionVector};
use crate::versioner::Versioner;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info_span, warn, Instrument};

/// Runs the finisher loop: commits each completed temp file (or deletion/
/// directory/symlink disposition) and reports the outcome to the db-update
/// batcher.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    mut jobs: mpsc::Receiver<FinishJob>,
    outcome_tx: mpsc::Sender<FinishOutcome>,
    store: Arc<dyn IndexStore>,
    versioner: Arc<dyn Versioner>,
    local_short_id: ShortId,
    ignore_permissions: bool,
    copy_ownership_from_parent: bool,
) {
    while let Some(job) = jobs.recv().await {
        let span = info_span!("finish", folder = %job.folder, name = %job.target.name);
        let outcome = commit(
            &job,
            store.as_ref(),
            versioner.as_ref(),
            local_short_id,
            ignore_permissions,
            copy_ownership_from_parent,
        )
        .instrument(span)
        .await;
        let _ = outcome_tx.send(outcome).await;
    }
}

fn ok(job: &FinishJob) -> FinishOutcome {
    FinishOutcome {
        folder: job.folder.clone(),
        name: job.target.name.clone(),
        file: job.target.clone(),
        error: None,
    }
}

fn failed(job: &FinishJob, reason: impl ToString) -> FinishOutcome {
    FinishOutcome {
        folder: job.folder.clone(),
        name: job.target.name.clone(),
        file: job.target.clone(),
        error: Some(reason.to_string()),
    }
}

async fn commit(
    job: &FinishJob,
    store: &dyn IndexStore,
    versioner: &dyn Versioner,
    local_short_id: ShortId,
    ignore_permissions: bool,
    copy_ownership_from_parent: bool,
) -> FinishOutcome {
    let final_path = job
        .temp_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&job.target.name);

    // §4.5 step 3: deletions and directory/symlink creation never go
    // through the permission/conflict/rename dance a regular file does.
    if job.target.deleted {
        return finish_delete(job, &final_path).await;
    }
    if job.target.is_directory() {
        return finish_directory(job, &final_path, copy_ownership_from_parent).await;
    }

    let local = match store.get_local(&job.folder, &job.target.name).await {
        Ok(local) => local,
        Err(e) => return failed(job, e),
    };

    let merged_version = match resolve_destination(job, &final_path, &local, versioner, local_short_id).await {
        Ok(merged) => merged,
        Err(e) => return failed(job, e),
    };
    let mut file = job.target.clone();
    if let Some(merged) = merged_version {
        file.version = merged;
    }

    if file.is_symlink() {
        return finish_symlink(job, &final_path, &file, copy_ownership_from_parent).await;
    }

    if !ignore_permissions && file.permissions != 0 {
        if let Err(e) = apply_permissions(&job.temp_path, file.permissions).await {
            return failed(job, e);
        }
    }
    if let Err(e) = apply_mtime(&job.temp_path, file.modified, store, &job.folder, &file.name).await {
        warn!(error = %e, "failed to apply modification time");
    }

    match fs_utils::atomic_rename(&job.temp_path, &final_path).await {
        Ok(()) => {
            if copy_ownership_from_parent {
                copy_ownership(&final_path).await;
            }
            FinishOutcome {
                folder: job.folder.clone(),
                name: job.target.name.clone(),
                file,
                error: None,
            }
        }
        Err(e) => failed(job, e),
    }
}

/// §4.5 step 3: in-place directory/symlink removal, conflict detection via
/// version-vector comparison, then versioner-or-overwrite — for whichever
/// path doesn't short-circuit to a deletion/directory disposition above.
/// Returns the merged version vector when a conflict was archived, so the
/// caller persists the union instead of just the incoming side (§8
/// invariant 7: the conflict copy's version must dominate both originals).
async fn resolve_destination(
    job: &FinishJob,
    final_path: &Path,
    local: &Option<FileInfo>,
    versioner: &dyn Versioner,
    local_short_id: ShortId,
) -> crate::error::Result<Option<VersionVector>> {
    match tokio::fs::symlink_metadata(final_path).await {
        Ok(meta) if meta.is_dir() => {
            tokio::fs::remove_dir(final_path).await?;
            return Ok(None);
        }
        Ok(meta) if meta.file_type().is_symlink() => {
            tokio::fs::remove_file(final_path).await?;
            return Ok(None);
        }
        Ok(_) => {}
        Err(_) => return Ok(None),
    }

    let is_conflict = match local {
        Some(local) => {
            local.version.concurrent_with(&job.target.version)
                || job.target.version.counter(local_short_id) > local.version.counter(local_short_id)
        }
        None => false,
    };

    if is_conflict {
        let conflict_name = fs_utils::conflict_name(
            &job.target.name,
            chrono::Utc::now(),
            local_short_id,
            |candidate| Path::new(candidate).exists(),
        );
        let conflict_path = final_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(Path::new(&conflict_name).file_name().unwrap_or_default());
        tokio::fs::rename(final_path, &conflict_path).await?;

        let mut merged = job.target.version.clone();
        if let Some(local) = local {
            merged.merge(&local.version);
        }
        return Ok(Some(merged));
    }

    if final_path.exists() {
        versioner.archive(final_path).await?;
    }
    Ok(None)
}

async fn finish_delete(job: &FinishJob, final_path: &Path) -> FinishOutcome {
    match tokio::fs::symlink_metadata(final_path).await {
        Ok(meta) if meta.is_dir() => match tokio::fs::remove_dir(final_path).await {
            Ok(()) => ok(job),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ok(job),
            Err(e) => failed(job, e),
        },
        Ok(_) => match tokio::fs::remove_file(final_path).await {
            Ok(()) => ok(job),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ok(job),
            Err(e) => failed(job, e),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ok(job),
        Err(e) => failed(job, e),
    }
}

async fn finish_directory(
    job: &FinishJob,
    final_path: &Path,
    copy_ownership_from_parent: bool,
) -> FinishOutcome {
    match tokio::fs::create_dir_all(final_path).await {
        Ok(()) => {
            if copy_ownership_from_parent {
                copy_ownership(final_path).await;
            }
            ok(job)
        }
        Err(e) => failed(job, e),
    }
}

async fn finish_symlink(
    job: &FinishJob,
    final_path: &Path,
    file: &FileInfo,
    copy_ownership_from_parent: bool,
) -> FinishOutcome {
    // §4.5 step 5: the staged temp file holds the raw link-target bytes;
    // read them back and create the real symlink, replacing anything the
    // destination-resolution step left in place.
    let target_bytes = match tokio::fs::read(&job.temp_path).await {
        Ok(bytes) => bytes,
        Err(_) => file.symlink_target.clone().into_bytes(),
    };
    let link_target = String::from_utf8_lossy(&target_bytes).to_string();
    let link_target = if link_target.is_empty() {
        file.symlink_target.clone()
    } else {
        link_target
    };

    let result = fs_utils::with_writable_dir(final_path.parent().unwrap_or_else(|| Path::new(".")), || async {
        create_symlink(&link_target, final_path).await
    })
    .await;

    let _ = tokio::fs::remove_file(&job.temp_path).await;

    match result {
        Ok(()) => {
            if copy_ownership_from_parent {
                copy_ownership(final_path).await;
            }
            FinishOutcome {
                folder: job.folder.clone(),
                name: job.target.name.clone(),
                file: file.clone(),
                error: None,
            }
        }
        Err(e) => failed(job, e),
    }
}

#[cfg(unix)]
async fn create_symlink(link_target: &str, final_path: &Path) -> crate::error::Result<()> {
    let _ = tokio::fs::remove_file(final_path).await;
    tokio::fs::symlink(link_target, final_path)
        .await
        .map_err(|e| crate::error::CoreError::local_fs(final_path.to_string_lossy(), &e))
}

#[cfg(not(unix))]
async fn create_symlink(_link_target: &str, _final_path: &Path) -> crate::error::Result<()> {
    Err(crate::error::CoreError::External(
        "symlinks unsupported on this platform".to_string(),
    ))
}

#[cfg(unix)]
async fn apply_permissions(path: &Path, mode: u32) -> crate::error::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn apply_permissions(_path: &Path, _mode: u32) -> crate::error::Result<()> {
    Ok(())
}

/// §4.5 step 2: apply the target mtime to the staged temp file before the
/// rename. If the filesystem truncates sub-second precision, record the
/// intended mtime in the virtual-mtime store so the next scan doesn't treat
/// the truncation as a local change.
async fn apply_mtime(
    path: &Path,
    modified: chrono::DateTime<chrono::Utc>,
    store: &dyn IndexStore,
    folder: &str,
    name: &str,
) -> crate::error::Result<()> {
    let path = path.to_path_buf();
    let target = filetime::FileTime::from_unix_time(modified.timestamp(), modified.timestamp_subsec_nanos());
    let set_path = path.clone();
    let set_result = tokio::task::spawn_blocking(move || filetime::set_file_mtime(&set_path, target))
        .await
        .map_err(|e| crate::error::CoreError::External(e.to_string()))?;

    if let Err(e) = set_result {
        warn!(error = %e, "filesystem rejected mtime, recording virtual mtime");
        store.set_virtual_mtime(folder, name, modified).await?;
        return Ok(());
    }

    // Re-read back what actually landed; most filesystems preserve
    // sub-second precision, but some (e.g. FAT) round to 2s.
    if let Ok(meta) = tokio::fs::metadata(&path).await {
        if let Ok(on_disk) = meta.modified() {
            let on_disk: chrono::DateTime<chrono::Utc> = on_disk.into();
            if (on_disk - modified).num_milliseconds().abs() > 1000 {
                store.set_virtual_mtime(folder, name, modified).await?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn copy_ownership(path: &Path) {
    use std::os::unix::fs::MetadataExt;
    let Some(parent) = path.parent() else { return };
    let parent_meta = match tokio::fs::metadata(parent).await {
        Ok(m) => m,
        Err(_) => return,
    };
    let uid = nix::unistd::Uid::from_raw(parent_meta.uid());
    let gid = nix::unistd::Gid::from_raw(parent_meta.gid());
    if let Err(e) = nix::unistd::chown(path, Some(uid), Some(gid)) {
        warn!(error = %e, path = %path.display(), "failed to copy ownership from parent");
    }
}

#[cfg(not(unix))]
async fn copy_ownership(_path: &Path) {}
