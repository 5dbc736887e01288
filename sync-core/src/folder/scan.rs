//! Local directory scan (§4.1 scan loop, §2 "Scan loop" component):
//! enumerate the folder root through the external [`Matcher`], hash new or
//! changed files through the external [`Scanner`], and diff the result
//! against the current local index to produce the FileInfo updates the
//! controller should persist. Entries that vanished from disk become
//! deletion tombstones; entries the local side has flagged as excluded
//! (ignored, unsupported) are skipped both ways so a scan never fights the
//! user's own exclusion.

use crate::ignore::Matcher;
use crate::model::{FileInfo, FileType, ShortId, VersionVector};
use crate::scanner::{walk_folder, Scanner};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub async fn scan_folder(
    root: &Path,
    matcher: &dyn Matcher,
    scanner: &dyn Scanner,
    local: &HashMap<String, FileInfo>,
    local_short_id: ShortId,
) -> crate::error::Result<Vec<FileInfo>> {
    let mut updates = Vec::new();
    let mut seen = HashSet::new();

    for path in walk_folder(root, matcher)? {
        let relative = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        seen.insert(relative.clone());

        let existing = local.get(&relative);
        if existing.is_some_and(|f| f.is_locally_excluded()) {
            continue;
        }

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified: chrono::DateTime<chrono::Utc> =
            metadata.modified().map(Into::into).unwrap_or_else(|_| chrono::Utc::now());
        let size = metadata.len();

        let unchanged = existing
            .map(|f| !f.deleted && f.size == size && f.modified == modified)
            .unwrap_or(false);
        if unchanged {
            continue;
        }

        let blocks = scanner.scan_file(&path).await?;
        let mut version = existing.map(|f| f.version.clone()).unwrap_or_else(VersionVector::new);
        version.update(local_short_id);

        let permissions = file_permissions(&metadata);

        updates.push(FileInfo {
            name: relative,
            file_type: FileType::File,
            size,
            modified,
            permissions,
            version,
            sequence: 0,
            deleted: false,
            blocks,
            symlink_target: String::new(),
            local_flags: existing.map(|f| f.local_flags).unwrap_or_default(),
        });
    }

    for (name, file) in local {
        if file.deleted || file.is_locally_excluded() || seen.contains(name) {
            continue;
        }
        let mut version = file.version.clone();
        version.update(local_short_id);
        updates.push(FileInfo {
            name: name.clone(),
            file_type: file.file_type,
            size: 0,
            modified: chrono::Utc::now(),
            permissions: file.permissions,
            version,
            sequence: 0,
            deleted: true,
            blocks: Vec::new(),
            symlink_target: String::new(),
            local_flags: file.local_flags,
        });
    }

    Ok(updates)
}

#[cfg(unix)]
fn file_permissions(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_permissions(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ignore::NoopMatcher;
    use crate::model::BlockInfo;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedBlockScanner;

    #[async_trait]
    impl Scanner for FixedBlockScanner {
        async fn scan_file(&self, _path: &Path) -> crate::error::Result<Vec<BlockInfo>> {
            Ok(vec![BlockInfo::new(0, 4, 0, [1u8; 32])])
        }
    }

    #[tokio::test]
    async fn test_new_file_is_reported_with_local_counter_bumped() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("a.txt"), b"data").await.unwrap();

        let local = HashMap::new();
        let updates = scan_folder(temp.path(), &NoopMatcher, &FixedBlockScanner, &local, ShortId(1))
            .await
            .unwrap();

        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].name, "a.txt");
        assert_eq!(updates[0].version.counter(ShortId(1)), 1);
    }

    #[tokio::test]
    async fn test_missing_local_file_becomes_deletion_tombstone() {
        let temp = TempDir::new().unwrap();
        let mut version = VersionVector::new();
        version.update(ShortId(1));
        let gone = FileInfo {
            name: "gone.txt".to_string(),
            file_type: FileType::File,
            size: 4,
            modified: chrono::Utc::now(),
            permissions: 0o644,
            version,
            sequence: 1,
            deleted: false,
            blocks: vec![BlockInfo::new(0, 4, 0, [0u8; 32])],
            symlink_target: String::new(),
            local_flags: Default::default(),
        };
        let local = HashMap::from([("gone.txt".to_string(), gone)]);

        let updates = scan_folder(temp.path(), &NoopMatcher, &FixedBlockScanner, &local, ShortId(1))
            .await
            .unwrap();

        assert_eq!(updates.len(), 1);
        assert!(updates[0].deleted);
        assert_eq!(updates[0].version.counter(ShortId(1)), 2);
    }

    #[tokio::test]
    async fn test_unchanged_file_produces_no_update() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("same.txt");
        tokio::fs::write(&path, b"data").await.unwrap();
        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let modified: chrono::DateTime<chrono::Utc> = metadata.modified().unwrap().into();

        let mut version = VersionVector::new();
        version.update(ShortId(1));
        let existing = FileInfo {
            name: "same.txt".to_string(),
            file_type: FileType::File,
            size: 4,
            modified,
            permissions: 0o644,
            version,
            sequence: 1,
            deleted: false,
            blocks: vec![BlockInfo::new(0, 4, 0, [1u8; 32])],
            symlink_target: String::new(),
            local_flags: Default::default(),
        };
        let local = HashMap::from([("same.txt".to_string(), existing)]);

        let updates = scan_folder(temp.path(), &NoopMatcher, &FixedBlockScanner, &local, ShortId(1))
            .await
            .unwrap();
        assert!(updates.is_empty());
    }
}
