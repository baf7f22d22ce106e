//! # Session Statistics
//!
//! Lock-free counters updated from producer and drain threads, read as a
//! `Copy` snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::protocol::MessageKind;

/// Point-in-time copy of [`SyncStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    /// Updates submitted.
    pub enqueued: u64,
    /// Updates taken off the queue.
    pub drained: u64,
    /// Drain cycles run.
    pub drain_cycles: u64,
    /// Full blocks sent.
    pub full_blocks: u64,
    /// Compressed blocks sent.
    pub compressed_blocks: u64,
    /// Terse blocks sent.
    pub terse_blocks: u64,
    /// Cached blocks sent.
    pub cached_blocks: u64,
    /// Kill blocks sent.
    pub kill_blocks: u64,
    /// Updates discarded because the entity was killed.
    pub killed_drops: u64,
    /// Updates discarded because the entity left the scene.
    pub entities_gone: u64,
    /// Blocks that failed to build.
    pub build_failures: u64,
    /// Updates merged by overflow coalescing.
    pub coalesced: u64,
    /// Updates dropped by overflow shedding.
    pub shed: u64,
    /// Messages accepted by the transport.
    pub messages_sent: u64,
    /// Messages refused by a backlogged transport.
    pub messages_dropped: u64,
}

impl SyncStatsSnapshot {
    /// Returns the total number of blocks sent.
    #[must_use]
    pub const fn blocks_sent(&self) -> u64 {
        self.full_blocks + self.compressed_blocks + self.terse_blocks + self.cached_blocks + self.kill_blocks
    }
}

/// Live counters for one session.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub(crate) enqueued: AtomicU64,
    pub(crate) drained: AtomicU64,
    pub(crate) drain_cycles: AtomicU64,
    full_blocks: AtomicU64,
    compressed_blocks: AtomicU64,
    terse_blocks: AtomicU64,
    cached_blocks: AtomicU64,
    kill_blocks: AtomicU64,
    pub(crate) killed_drops: AtomicU64,
    pub(crate) entities_gone: AtomicU64,
    pub(crate) build_failures: AtomicU64,
    pub(crate) coalesced: AtomicU64,
    pub(crate) shed: AtomicU64,
    pub(crate) messages_sent: AtomicU64,
    pub(crate) messages_dropped: AtomicU64,
}

impl SyncStats {
    /// Adds `n` to a counter.
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts `n` blocks sent in a message of `kind`.
    pub(crate) fn record_blocks(&self, kind: MessageKind, n: u64) {
        let counter = match kind {
            MessageKind::ObjectUpdate => &self.full_blocks,
            MessageKind::ObjectUpdateCompressed => &self.compressed_blocks,
            MessageKind::ImprovedTerseObjectUpdate => &self.terse_blocks,
            MessageKind::ObjectUpdateCached => &self.cached_blocks,
            MessageKind::KillObject => &self.kill_blocks,
        };
        Self::add(counter, n);
    }

    /// Returns a snapshot of every counter.
    #[must_use]
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        SyncStatsSnapshot {
            enqueued: load(&self.enqueued),
            drained: load(&self.drained),
            drain_cycles: load(&self.drain_cycles),
            full_blocks: load(&self.full_blocks),
            compressed_blocks: load(&self.compressed_blocks),
            terse_blocks: load(&self.terse_blocks),
            cached_blocks: load(&self.cached_blocks),
            kill_blocks: load(&self.kill_blocks),
            killed_drops: load(&self.killed_drops),
            entities_gone: load(&self.entities_gone),
            build_failures: load(&self.build_failures),
            coalesced: load(&self.coalesced),
            shed: load(&self.shed),
            messages_sent: load(&self.messages_sent),
            messages_dropped: load(&self.messages_dropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_counters_by_kind() {
        let stats = SyncStats::default();
        stats.record_blocks(MessageKind::ImprovedTerseObjectUpdate, 3);
        stats.record_blocks(MessageKind::ObjectUpdate, 1);
        SyncStats::add(&stats.enqueued, 4);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.terse_blocks, 3);
        assert_eq!(snapshot.full_blocks, 1);
        assert_eq!(snapshot.blocks_sent(), 4);
        assert_eq!(snapshot.enqueued, 4);
    }
}
