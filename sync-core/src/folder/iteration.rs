//! Pull-iteration algorithm (§4.2): compare the local index against every
//! remote index sharing the folder and produce the set of files that need a
//! pull, in the priority order the algorithm specifies (deletions first,
//! then the folder's configured `pull_order` for everything else).

use crate::model::{FileInfo, PullOrder, VersionVector};
use std::collections::HashMap;

/// One file that needs a pull, and the remote version driving it.
#[derive(Debug, Clone)]
pub struct NeedEntry {
    pub local: Option<FileInfo>,
    pub remote: FileInfo,
}

/// Compute the need-list for one folder: for every name known to any remote,
/// pull if the remote's version vector dominates the local one (or the file
/// doesn't exist locally yet) or the two are concurrent (a genuine conflict,
/// which the finisher resolves by archiving the local copy — §3 invariant),
/// and skip only when local already dominates or the versions are equal.
/// An entry whose local counterpart carries an exclusionary local flag
/// (ignored or unsupported) is never pulled over — the local side owns that
/// decision until the flag is cleared.
pub fn compute_need_list(
    local: &HashMap<String, FileInfo>,
    remotes: &[HashMap<String, FileInfo>],
    pull_order: PullOrder,
) -> Vec<NeedEntry> {
    let mut needs: HashMap<String, NeedEntry> = HashMap::new();

    for remote_index in remotes {
        for (name, remote_file) in remote_index {
            let local_file = local.get(name);
            if local_file.is_some_and(|f| f.is_locally_excluded()) {
                continue;
            }
            let local_version = local_file
                .map(|f| f.version.clone())
                .unwrap_or_else(VersionVector::new);

            let needed = remote_file.version.dominates(&local_version)
                || remote_file.version.concurrent_with(&local_version);

            if needed {
                let better = needs
                    .get(name)
                    .map(|existing| remote_file.version.dominates(&existing.remote.version))
                    .unwrap_or(true);
                if better {
                    needs.insert(
                        name.clone(),
                        NeedEntry {
                            local: local_file.cloned(),
                            remote: remote_file.clone(),
                        },
                    );
                }
            }
        }
    }

    let mut out: Vec<NeedEntry> = needs.into_values().collect();
    sort_needs(&mut out, pull_order);
    out
}

/// Deletions always sort first — they're cheap and free up space/names for
/// the rest of the batch. Everything else follows the configured order.
fn sort_needs(out: &mut [NeedEntry], pull_order: PullOrder) {
    match pull_order {
        PullOrder::Random => {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            out.shuffle(&mut rng);
            out.sort_by_key(|e| !e.remote.deleted);
        }
        PullOrder::Alphabetic => out.sort_by(|a, b| {
            (!a.remote.deleted, &a.remote.name).cmp(&(!b.remote.deleted, &b.remote.name))
        }),
        PullOrder::Largest => out.sort_by(|a, b| {
            (!a.remote.deleted, std::cmp::Reverse(a.remote.size))
                .cmp(&(!b.remote.deleted, std::cmp::Reverse(b.remote.size)))
        }),
        PullOrder::Smallest => out.sort_by(|a, b| {
            (!a.remote.deleted, a.remote.size).cmp(&(!b.remote.deleted, b.remote.size))
        }),
        PullOrder::Oldest => out.sort_by(|a, b| {
            (!a.remote.deleted, a.remote.modified).cmp(&(!b.remote.deleted, b.remote.modified))
        }),
        PullOrder::Newest => out.sort_by(|a, b| {
            (!a.remote.deleted, std::cmp::Reverse(a.remote.modified))
                .cmp(&(!b.remote.deleted, std::cmp::Reverse(b.remote.modified)))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockInfo, FileType, LocalFlags, ShortId};

    fn file(name: &str, size: u64, device: ShortId, counter: u64) -> FileInfo {
        let mut version = VersionVector::new();
        for _ in 0..counter {
            version.update(device);
        }
        FileInfo {
            name: name.to_string(),
            file_type: FileType::File,
            size,
            modified: chrono::Utc::now(),
            permissions: 0o644,
            version,
            sequence: counter,
            deleted: false,
            blocks: vec![BlockInfo::new(0, size as u32, 0, [0u8; 32])],
            symlink_target: String::new(),
            local_flags: LocalFlags::empty(),
        }
    }

    #[test]
    fn test_remote_only_file_is_needed() {
        let local = HashMap::new();
        let remote_file = file("a.txt", 10, ShortId(1), 1);
        let remotes = vec![HashMap::from([("a.txt".to_string(), remote_file.clone())])];

        let need = compute_need_list(&local, &remotes, PullOrder::Alphabetic);
        assert_eq!(need.len(), 1);
        assert_eq!(need[0].remote.name, "a.txt");
    }

    #[test]
    fn test_local_dominant_file_is_not_needed() {
        let local_file = file("a.txt", 10, ShortId(1), 2);
        let local = HashMap::from([("a.txt".to_string(), local_file)]);
        let remote_file = file("a.txt", 10, ShortId(1), 1);
        let remotes = vec![HashMap::from([("a.txt".to_string(), remote_file)])];

        let need = compute_need_list(&local, &remotes, PullOrder::Alphabetic);
        assert!(need.is_empty());
    }

    #[test]
    fn test_concurrent_versions_are_needed_as_conflicts() {
        let local_file = file("a.txt", 10, ShortId(2), 1);
        let local = HashMap::from([("a.txt".to_string(), local_file)]);
        let remote_file = file("a.txt", 10, ShortId(1), 1);
        let remotes = vec![HashMap::from([("a.txt".to_string(), remote_file)])];

        let need = compute_need_list(&local, &remotes, PullOrder::Alphabetic);
        assert_eq!(need.len(), 1);
        assert!(need[0].local.is_some());
    }

    #[test]
    fn test_smallest_files_sort_first() {
        let local = HashMap::new();
        let small = file("small.txt", 1, ShortId(1), 1);
        let big = file("big.txt", 1000, ShortId(1), 1);
        let remotes = vec![HashMap::from([
            ("small.txt".to_string(), small),
            ("big.txt".to_string(), big),
        ])];

        let need = compute_need_list(&local, &remotes, PullOrder::Smallest);
        assert_eq!(need[0].remote.name, "small.txt");
        assert_eq!(need[1].remote.name, "big.txt");
    }

    #[test]
    fn test_largest_files_sort_first() {
        let local = HashMap::new();
        let small = file("small.txt", 1, ShortId(1), 1);
        let big = file("big.txt", 1000, ShortId(1), 1);
        let remotes = vec![HashMap::from([
            ("small.txt".to_string(), small),
            ("big.txt".to_string(), big),
        ])];

        let need = compute_need_list(&local, &remotes, PullOrder::Largest);
        assert_eq!(need[0].remote.name, "big.txt");
    }

    #[test]
    fn test_deletions_sort_before_everything_regardless_of_pull_order() {
        let local = HashMap::new();
        let mut deletion = file("gone.txt", 1, ShortId(1), 1);
        deletion.deleted = true;
        let big = file("big.txt", 1000, ShortId(1), 1);
        let remotes = vec![HashMap::from([
            ("gone.txt".to_string(), deletion),
            ("big.txt".to_string(), big),
        ])];

        let need = compute_need_list(&local, &remotes, PullOrder::Largest);
        assert_eq!(need[0].remote.name, "gone.txt");
    }

    #[test]
    fn test_locally_ignored_entry_is_never_pulled() {
        let mut local_file = file("ignored.txt", 10, ShortId(2), 1);
        local_file.local_flags = LocalFlags::IGNORED;
        let local = HashMap::from([("ignored.txt".to_string(), local_file)]);
        let remote_file = file("ignored.txt", 10, ShortId(1), 5);
        let remotes = vec![HashMap::from([("ignored.txt".to_string(), remote_file)])];

        let need = compute_need_list(&local, &remotes, PullOrder::Alphabetic);
        assert!(need.is_empty());
    }
}
