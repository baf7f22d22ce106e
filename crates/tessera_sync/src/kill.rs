//! # Kill Record
//!
//! Per-connection memory of entities the viewer has been told are gone.
//! Queued updates for a recorded id are discarded at drain time, so a late
//! update can never make a killed entity reappear.

use std::collections::HashSet;

use parking_lot::RwLock;
use tessera_core::LocalId;

/// Set of killed local ids, shared by producers and the drain scheduler.
#[derive(Debug, Default)]
pub struct KillRecord {
    killed: RwLock<HashSet<LocalId>>,
}

impl KillRecord {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `id` as killed. Returns false if it already was.
    pub fn mark_killed(&self, id: LocalId) -> bool {
        self.killed.write().insert(id)
    }

    /// Returns true if `id` has been killed since the last reset.
    #[must_use]
    pub fn is_killed(&self, id: LocalId) -> bool {
        self.killed.read().contains(&id)
    }

    /// Forgets every kill.
    pub fn reset(&self) {
        self.killed.write().clear();
    }

    /// Returns the number of recorded kills.
    #[must_use]
    pub fn len(&self) -> usize {
        self.killed.read().len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.killed.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_reset() {
        let record = KillRecord::new();
        assert!(!record.is_killed(LocalId(3)));
        assert!(record.mark_killed(LocalId(3)));
        assert!(!record.mark_killed(LocalId(3)));
        assert!(record.is_killed(LocalId(3)));
        assert_eq!(record.len(), 1);

        record.reset();
        assert!(record.is_empty());
        assert!(!record.is_killed(LocalId(3)));
    }
}
