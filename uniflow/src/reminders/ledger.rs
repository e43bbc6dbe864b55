//! In-memory record of reminders that have already fired.
//!
//! The ledger lives as long as the process. It is never written to storage,
//! so restarting the daemon can announce a reminder a second time if its
//! window is still open.

use std::collections::HashSet;

/// Set of dedup keys that have fired during this process.
///
/// There is no eviction: keys are small and the number of classes and tasks
/// is bounded by what one user enters.
#[derive(Debug, Default, Clone)]
pub struct DedupLedger {
    fired: HashSet<String>,
}

impl DedupLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` has already fired.
    #[must_use]
    pub fn has_fired(&self, key: &str) -> bool {
        self.fired.contains(key)
    }

    /// Records `key` as fired.
    ///
    /// Returns `true` when the key was not present before, so callers can
    /// check and mark in one step.
    pub fn mark_fired(&mut self, key: impl Into<String>) -> bool {
        self.fired.insert(key.into())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fired.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}
