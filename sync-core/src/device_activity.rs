//! Process-wide device activity registry used for `leastBusy` peer selection
//! when more than one device advertises the needed block (§9 "Global
//! state"). Deliberately shared across every folder runner, the same way the
//! teacher's resource manager tracks transfer counts across every plugin.

use crate::model::ShortId;
use std::collections::HashMap;
use std::sync::RwLock;

/// Tracks how many in-flight block requests are outstanding against each
/// device, so the puller can prefer the least-loaded peer among several that
/// all have the needed block.
#[derive(Default)]
pub struct DeviceActivity {
    outstanding: RwLock<HashMap<ShortId, u32>>,
}

impl DeviceActivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_request(&self, device: ShortId) {
        let mut map = self.outstanding.write().unwrap();
        *map.entry(device).or_insert(0) += 1;
    }

    pub fn end_request(&self, device: ShortId) {
        let mut map = self.outstanding.write().unwrap();
        if let Some(count) = map.get_mut(&device) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                map.remove(&device);
            }
        }
    }

    pub fn outstanding(&self, device: ShortId) -> u32 {
        self.outstanding
            .read()
            .unwrap()
            .get(&device)
            .copied()
            .unwrap_or(0)
    }

    /// Pick the least-busy candidate from `candidates`, breaking ties by
    /// the order they were given (stable, so callers that pass candidates in
    /// a preferred order don't get shuffled unnecessarily).
    pub fn least_busy(&self, candidates: &[ShortId]) -> Option<ShortId> {
        candidates
            .iter()
            .min_by_key(|d| self.outstanding(**d))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_busy_prefers_lower_outstanding_count() {
        let activity = DeviceActivity::new();
        let a = ShortId(1);
        let b = ShortId(2);
        activity.begin_request(a);
        activity.begin_request(a);
        activity.begin_request(b);

        assert_eq!(activity.least_busy(&[a, b]), Some(b));
    }

    #[test]
    fn test_end_request_removes_zeroed_entries() {
        let activity = DeviceActivity::new();
        let a = ShortId(1);
        activity.begin_request(a);
        activity.end_request(a);
        assert_eq!(activity.outstanding(a), 0);
    }
}
