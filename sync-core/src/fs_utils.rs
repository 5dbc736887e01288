//! Filesystem helpers shared by the copier and finisher pipeline stages.
//!
//! Covers the three mechanical concerns the pull pipeline leans on: checking
//! free space before an iteration starts, naming temp/conflict files the way
//! the finisher expects, and performing an atomic rename with a
//! same-filesystem guarantee plus writable-directory bracket discipline.

use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Check that `needed_bytes` are available on the filesystem backing
/// `folder_path`. Returns [`CoreError::InsufficientDiskSpace`] when not.
///
/// `folder_id` is carried only for the error message; the check itself
/// operates on whichever ancestor of `folder_path` actually exists.
pub async fn check_disk_space(
    folder_id: &str,
    folder_path: impl AsRef<Path>,
    needed_bytes: u64,
) -> Result<()> {
    let folder_path = folder_path.as_ref();

    #[cfg(unix)]
    {
        use nix::sys::statvfs::statvfs;

        let check_path = existing_ancestor(folder_path);

        match statvfs(&check_path) {
            Ok(stat) => {
                let available = stat.blocks_available() * stat.fragment_size();
                debug!(
                    folder = folder_id,
                    available, needed = needed_bytes, "disk space check"
                );
                if available < needed_bytes {
                    return Err(CoreError::InsufficientDiskSpace {
                        folder: folder_id.to_string(),
                        needed: needed_bytes,
                        available,
                    });
                }
            }
            Err(e) => {
                warn!(folder = folder_id, error = %e, "could not statvfs, proceeding anyway");
            }
        }
    }

    #[cfg(not(unix))]
    {
        debug!(folder = folder_id, needed = needed_bytes, "disk space check skipped on this platform");
    }

    Ok(())
}

fn existing_ancestor(path: &Path) -> PathBuf {
    let mut cur = path.to_path_buf();
    loop {
        if cur.exists() {
            return cur;
        }
        if !cur.pop() {
            return PathBuf::from("/");
        }
    }
}

/// Temp file name for `name` per §6: `.syncthing.<name>.tmp`, falling back to
/// a blake3-prefixed form when the resulting name would exceed 250 bytes (a
/// conservative margin under common filesystem `NAME_MAX` limits).
pub fn temp_name(name: &str) -> String {
    let candidate = format!(".syncthing.{name}.tmp");
    if candidate.len() <= 250 {
        return candidate;
    }
    let hash = blake3::hash(name.as_bytes());
    format!(".syncthing.{}.tmp", hex::encode(&hash.as_bytes()[..16]))
}

/// Conflict copy name per §6: `<stem>.sync-conflict-<YYYYMMDD>-<HHMMSS>-<short-id><ext>`,
/// with a numeric suffix appended on collision against `exists`.
pub fn conflict_name(
    original: &str,
    when: chrono::DateTime<chrono::Utc>,
    short_id: crate::model::ShortId,
    mut exists: impl FnMut(&str) -> bool,
) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let dir = path.parent();
    let stamp = when.format("%Y%m%d-%H%M%S");

    let base = format!("{stem}.sync-conflict-{stamp}-{short_id}");
    let mut candidate_name = format!("{base}{ext}");
    let mut counter = 1u32;
    loop {
        let candidate_path = match dir {
            Some(d) if !d.as_os_str().is_empty() => d.join(&candidate_name),
            _ => PathBuf::from(&candidate_name),
        };
        let candidate_str = candidate_path.to_string_lossy().to_string();
        if !exists(&candidate_str) {
            return candidate_str;
        }
        candidate_name = format!("{base}-{counter}{ext}");
        counter += 1;
    }
}

/// Make `dir` writable for the duration of `f`, restoring its original mode
/// afterwards regardless of whether `f` succeeds. Mirrors the finisher's
/// need to write into directories that are normally read-only.
#[cfg(unix)]
pub async fn with_writable_dir<F, Fut, T>(dir: impl AsRef<Path>, f: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    use std::os::unix::fs::PermissionsExt;

    let dir = dir.as_ref();
    let meta = fs::metadata(dir).await?;
    let original = meta.permissions();
    let mut writable = original.clone();
    writable.set_mode(original.mode() | 0o200);
    fs::set_permissions(dir, writable).await?;

    let result = f().await;

    if let Err(e) = fs::set_permissions(dir, original).await {
        warn!(dir = %dir.display(), error = %e, "failed to restore directory permissions");
    }

    result
}

/// Atomically rename `from` to `to`. Falls back to copy+remove when the two
/// paths live on different filesystems (`rename` returns `EXDEV`), since the
/// same-filesystem guarantee only holds within one folder root.
pub async fn atomic_rename(from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();

    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            fs::copy(from, to).await?;
            fs::remove_file(from).await?;
            Ok(())
        }
        Err(e) => Err(CoreError::local_fs(to.to_string_lossy(), &e)),
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV is stable across all unix targets we build for
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    -1
}
