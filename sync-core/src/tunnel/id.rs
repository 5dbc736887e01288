//! 64-bit monotone tunnel id generator, seeded from wall-clock time so ids
//! stay roughly sortable by creation time across process restarts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct TunnelIdGenerator {
    next: AtomicU64,
}

impl TunnelIdGenerator {
    /// The one permitted panic site in this crate (§7): a system clock that
    /// has regressed before the Unix epoch means the process's notion of
    /// time is broken badly enough that continuing would hand out colliding
    /// tunnel ids silently.
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch");
        Self {
            next: AtomicU64::new(now.as_millis() as u64),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for TunnelIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotone() {
        let gen = TunnelIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(b > a);
    }
}
