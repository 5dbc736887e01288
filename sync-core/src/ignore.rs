//! `Matcher`: ignore-pattern evaluation. Pattern *parsing* is explicitly out
//! of scope to implement from scratch (§1 non-goal) — `GlobsetMatcher` just
//! wraps the `globset` crate already in the dependency stack, for hosts that
//! want gitignore-style behavior without bringing their own.

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Decides whether a folder-relative path should be skipped by the scanner
/// and the pull pipeline.
pub trait Matcher: Send + Sync {
    fn is_ignored(&self, relative_path: &str) -> bool;
}

/// Default `Matcher` built from a list of gitignore-style glob patterns.
pub struct GlobsetMatcher {
    set: GlobSet,
}

impl GlobsetMatcher {
    pub fn from_patterns(patterns: &[&str]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }
}

impl Matcher for GlobsetMatcher {
    fn is_ignored(&self, relative_path: &str) -> bool {
        self.set.is_match(relative_path)
    }
}

/// A `Matcher` that never ignores anything, for hosts and tests that don't
/// need pattern filtering.
pub struct NoopMatcher;

impl Matcher for NoopMatcher {
    fn is_ignored(&self, _relative_path: &str) -> bool {
        false
    }
}
