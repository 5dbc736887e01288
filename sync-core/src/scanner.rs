//! `Scanner`: produces block lists for local files. Content hashing itself is
//! explicitly out of scope to implement (§1 non-goal) — the core depends only
//! on this trait boundary, and ships a `walkdir`-based directory enumerator
//! that callers combine with their own hashing `Scanner`.

use crate::model::BlockInfo;
use async_trait::async_trait;
use std::path::Path;

/// Standard block size used when a host doesn't have a reason to pick a
/// different one; mirrors the glossary's "Block" definition.
pub const DEFAULT_BLOCK_SIZE: u32 = 128 * 1024;

#[async_trait]
pub trait Scanner: Send + Sync {
    /// Split `path` into blocks, computing weak and strong hashes for each.
    async fn scan_file(&self, path: &Path) -> crate::error::Result<Vec<BlockInfo>>;
}

/// Enumerates the files under a folder root, honoring a [`crate::ignore::Matcher`].
/// Does not itself hash anything — paired with a `Scanner` by the folder
/// controller's scan loop.
pub fn walk_folder(
    root: &Path,
    matcher: &dyn crate::ignore::Matcher,
) -> crate::error::Result<Vec<std::path::PathBuf>> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| {
            crate::error::CoreError::LocalFsError {
                path: root.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .to_string();
        if matcher.is_ignored(&relative) {
            continue;
        }
        out.push(entry.path().to_path_buf());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::GlobsetMatcher;
    use tempfile::TempDir;

    #[test]
    fn test_walk_folder_skips_ignored_files() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("keep.txt"), b"a").unwrap();
        std::fs::write(temp.path().join("skip.log"), b"b").unwrap();

        let matcher = GlobsetMatcher::from_patterns(&["*.log"]).unwrap();
        let files = walk_folder(temp.path(), &matcher).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.txt"));
    }
}
