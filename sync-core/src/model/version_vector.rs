use super::ShortId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A version vector: one monotone counter per device that has ever written
/// this file. Comparisons follow the usual partial order — `concurrent`
/// means neither side's counters dominate the other's.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<ShortId, u64>);

/// Result of comparing two version vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOrdering {
    /// Every counter in `self` is >= the other's, and at least one is greater.
    Dominates,
    /// Every counter in `self` is <= the other's, and at least one is less.
    DominatedBy,
    /// The two vectors are identical.
    Equal,
    /// Neither dominates — a genuine conflict.
    Concurrent,
}

impl VersionVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment this device's counter, as happens on every local edit.
    pub fn update(&mut self, device: ShortId) {
        let counter = self.0.entry(device).or_insert(0);
        *counter += 1;
    }

    pub fn counter(&self, device: ShortId) -> u64 {
        self.0.get(&device).copied().unwrap_or(0)
    }

    /// Merge `other` into `self` by taking the pairwise maximum of every
    /// counter, as happens when a conflict is resolved by keeping one side
    /// but recording both devices' contributions.
    pub fn merge(&mut self, other: &VersionVector) {
        for (device, counter) in &other.0 {
            let entry = self.0.entry(*device).or_insert(0);
            *entry = (*entry).max(*counter);
        }
    }

    pub fn compare(&self, other: &VersionVector) -> VersionOrdering {
        if self.0 == other.0 {
            return VersionOrdering::Equal;
        }

        let mut self_has_greater = false;
        let mut other_has_greater = false;

        let mut devices: Vec<&ShortId> = self.0.keys().chain(other.0.keys()).collect();
        devices.sort();
        devices.dedup();

        for device in devices {
            let a = self.counter(*device);
            let b = other.counter(*device);
            match a.cmp(&b) {
                Ordering::Greater => self_has_greater = true,
                Ordering::Less => other_has_greater = true,
                Ordering::Equal => {}
            }
        }

        match (self_has_greater, other_has_greater) {
            (true, false) => VersionOrdering::Dominates,
            (false, true) => VersionOrdering::DominatedBy,
            (false, false) => VersionOrdering::Equal,
            (true, true) => VersionOrdering::Concurrent,
        }
    }

    pub fn dominates(&self, other: &VersionVector) -> bool {
        matches!(self.compare(other), VersionOrdering::Dominates)
    }

    pub fn concurrent_with(&self, other: &VersionVector) -> bool {
        matches!(self.compare(other), VersionOrdering::Concurrent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ShortId {
        ShortId(n)
    }

    #[test]
    fn test_equal_vectors() {
        let mut a = VersionVector::new();
        a.update(id(1));
        let b = a.clone();
        assert_eq!(a.compare(&b), VersionOrdering::Equal);
    }

    #[test]
    fn test_dominates() {
        let mut a = VersionVector::new();
        a.update(id(1));
        let b = VersionVector::new();
        assert_eq!(a.compare(&b), VersionOrdering::Dominates);
        assert_eq!(b.compare(&a), VersionOrdering::DominatedBy);
    }

    #[test]
    fn test_concurrent() {
        let mut a = VersionVector::new();
        a.update(id(1));
        let mut b = VersionVector::new();
        b.update(id(2));
        assert_eq!(a.compare(&b), VersionOrdering::Concurrent);
        assert!(a.concurrent_with(&b));
    }

    #[test]
    fn test_merge_takes_pairwise_max() {
        let mut a = VersionVector::new();
        a.update(id(1));
        a.update(id(1));
        let mut b = VersionVector::new();
        b.update(id(2));

        a.merge(&b);
        assert_eq!(a.counter(id(1)), 2);
        assert_eq!(a.counter(id(2)), 1);
    }
}
