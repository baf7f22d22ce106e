//! # Update Queue
//!
//! Per-connection priority queue of pending entity updates.
//!
//! ```text
//!  scene threads ──enqueue──┐
//!  scene threads ──enqueue──┼──► Mutex<BinaryHeap<Slot>> ──drain(max)──► drain scheduler
//!  scene threads ──enqueue──┘
//! ```
//!
//! ## Ordering
//!
//! Most urgent first according to [`PriorityOrder`]; equal priorities drain
//! in submission order. Priorities compare with `f64::total_cmp`, so NaN has
//! a fixed place instead of corrupting the heap.
//!
//! ## Overflow
//!
//! Past `max_len` entries the [`OverflowPolicy`] applies. Both policies end
//! at or below a low-water mark `max_len - max_len / 16`, so the cost of an
//! overflow pass is paid once per chunk of submissions rather than on every
//! one.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};

use parking_lot::Mutex;
use tessera_core::LocalId;

use crate::config::{OverflowPolicy, PriorityOrder, SyncConfig};
use crate::protocol::ChangeFlags;
use crate::scene::EntityHandle;

/// A change to tell the viewer about.
#[derive(Clone, Debug)]
pub struct EntityUpdate {
    /// The changed entity.
    pub entity: EntityHandle,
    /// What changed.
    pub flags: ChangeFlags,
}

impl EntityUpdate {
    /// Creates an update.
    #[must_use]
    pub const fn new(entity: EntityHandle, flags: ChangeFlags) -> Self {
        Self { entity, flags }
    }

    /// Returns the entity's local id.
    #[inline]
    #[must_use]
    pub const fn local_id(&self) -> LocalId {
        self.entity.local_id()
    }
}

/// A queued update and its priority.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// Priority at submission time.
    pub priority: f64,
    /// The update.
    pub update: EntityUpdate,
    sequence: u64,
}

impl QueueEntry {
    /// Submission order; lower was submitted earlier.
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns a copy of this entry with a new priority.
    #[must_use]
    pub fn with_priority(&self, priority: f64) -> Self {
        Self {
            priority,
            update: self.update.clone(),
            sequence: self.sequence,
        }
    }
}

/// Heap element; greater means more urgent.
struct Slot {
    entry: QueueEntry,
    order: PriorityOrder,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_priority = match self.order {
            PriorityOrder::Ascending => other.entry.priority.total_cmp(&self.entry.priority),
            PriorityOrder::Descending => self.entry.priority.total_cmp(&other.entry.priority),
        };
        by_priority.then_with(|| other.entry.sequence.cmp(&self.entry.sequence))
    }
}

/// What an enqueue had to do to stay within bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverflowReport {
    /// Entries merged into another entry for the same entity.
    pub coalesced: usize,
    /// Entries dropped outright.
    pub shed: usize,
}

impl OverflowReport {
    /// Returns true if nothing was merged or dropped.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.coalesced == 0 && self.shed == 0
    }
}

struct QueueInner {
    heap: BinaryHeap<Slot>,
    next_sequence: u64,
}

/// Thread-safe priority queue of entity updates.
pub struct UpdateQueue {
    inner: Mutex<QueueInner>,
    order: PriorityOrder,
    max_len: usize,
    policy: OverflowPolicy,
}

impl UpdateQueue {
    /// Creates a queue.
    #[must_use]
    pub fn new(capacity_hint: usize, order: PriorityOrder, max_len: usize, policy: OverflowPolicy) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                heap: BinaryHeap::with_capacity(capacity_hint),
                next_sequence: 0,
            }),
            order,
            max_len: max_len.max(1),
            policy,
        }
    }

    /// Creates a queue from session configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.queue_capacity_hint,
            config.priority_order,
            config.max_queued_updates,
            config.overflow_policy,
        )
    }

    /// Returns the priority direction.
    #[inline]
    #[must_use]
    pub const fn order(&self) -> PriorityOrder {
        self.order
    }

    /// Returns the number of queued updates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    /// Queues an update.
    pub fn enqueue(&self, priority: f64, update: EntityUpdate) -> OverflowReport {
        let mut inner = self.inner.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(Slot {
            entry: QueueEntry {
                priority,
                update,
                sequence,
            },
            order: self.order,
        });

        if inner.heap.len() > self.max_len {
            self.relieve(&mut inner)
        } else {
            OverflowReport::default()
        }
    }

    /// Puts previously drained entries back, keeping their submission order.
    pub fn requeue(&self, entries: Vec<QueueEntry>) -> OverflowReport {
        let mut inner = self.inner.lock();
        let order = self.order;
        inner.heap.extend(entries.into_iter().map(|entry| Slot { entry, order }));
        if inner.heap.len() > self.max_len {
            self.relieve(&mut inner)
        } else {
            OverflowReport::default()
        }
    }

    /// Removes up to `max` entries (all when `None`), most urgent first.
    #[must_use]
    pub fn drain(&self, max: Option<usize>) -> Vec<QueueEntry> {
        let mut inner = self.inner.lock();
        let count = max.map_or(inner.heap.len(), |m| m.min(inner.heap.len()));
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            match inner.heap.pop() {
                Some(slot) => out.push(slot.entry),
                None => break,
            }
        }
        out
    }

    /// Drops every queued update, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.heap.len();
        inner.heap.clear();
        count
    }

    fn low_water(&self) -> usize {
        self.max_len - self.max_len / 16
    }

    fn relieve(&self, inner: &mut QueueInner) -> OverflowReport {
        let mut report = OverflowReport::default();
        if self.policy == OverflowPolicy::Coalesce {
            report.coalesced = self.coalesce(inner);
        }
        if inner.heap.len() > self.low_water() {
            report.shed = self.shed(inner);
        }
        report
    }

    /// Merges entries per entity: union of flags, most urgent priority,
    /// earliest sequence, newest handle.
    fn coalesce(&self, inner: &mut QueueInner) -> usize {
        let slots = std::mem::take(&mut inner.heap).into_vec();
        let before = slots.len();

        let mut merged: HashMap<LocalId, (QueueEntry, u64)> = HashMap::with_capacity(before);
        for Slot { entry, .. } in slots {
            match merged.entry(entry.update.local_id()) {
                Entry::Vacant(vacant) => {
                    let newest = entry.sequence;
                    vacant.insert((entry, newest));
                }
                Entry::Occupied(mut occupied) => {
                    let (kept, newest) = occupied.get_mut();
                    kept.update.flags |= entry.update.flags;
                    if self.order.more_urgent(entry.priority, kept.priority) {
                        kept.priority = entry.priority;
                    }
                    if entry.sequence > *newest {
                        *newest = entry.sequence;
                        kept.update.entity = entry.update.entity;
                    }
                    kept.sequence = kept.sequence.min(entry.sequence);
                }
            }
        }

        let order = self.order;
        inner.heap = merged
            .into_values()
            .map(|(entry, _)| Slot { entry, order })
            .collect();
        let coalesced = before - inner.heap.len();
        tracing::debug!(before, after = inner.heap.len(), "coalesced update queue");
        coalesced
    }

    /// Drops the least urgent entries down to the low-water mark.
    fn shed(&self, inner: &mut QueueInner) -> usize {
        let target = self.low_water();
        let excess = inner.heap.len().saturating_sub(target);
        if excess == 0 {
            return 0;
        }
        // Ascending by urgency: the least urgent entries come first.
        let mut sorted = std::mem::take(&mut inner.heap).into_sorted_vec();
        sorted.drain(..excess);
        inner.heap = BinaryHeap::from(sorted);
        tracing::warn!(dropped = excess, remaining = target, "update queue overflow, shedding least urgent updates");
        excess
    }
}

impl std::fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("len", &self.len())
            .field("order", &self.order)
            .field("max_len", &self.max_len)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{PrimSnapshot, SceneEntity, SnapshotEntity};
    use std::sync::Arc;

    fn entity(id: u32) -> Arc<dyn SceneEntity> {
        SnapshotEntity::prim(PrimSnapshot {
            local_id: LocalId(id),
            ..PrimSnapshot::default()
        })
        .into_shared()
    }

    fn update(e: &Arc<dyn SceneEntity>, flags: ChangeFlags) -> EntityUpdate {
        EntityUpdate::new(EntityHandle::new(e), flags)
    }

    fn ids(entries: &[QueueEntry]) -> Vec<u32> {
        entries.iter().map(|e| e.update.local_id().0).collect()
    }

    fn queue(order: PriorityOrder, max_len: usize, policy: OverflowPolicy) -> UpdateQueue {
        UpdateQueue::new(16, order, max_len, policy)
    }

    #[test]
    fn test_ascending_drains_lowest_first() {
        let (a, b, c) = (entity(1), entity(2), entity(3));
        let q = queue(PriorityOrder::Ascending, 100, OverflowPolicy::Coalesce);
        q.enqueue(5.0, update(&a, ChangeFlags::POSITION));
        q.enqueue(1.0, update(&b, ChangeFlags::POSITION));
        q.enqueue(9.0, update(&c, ChangeFlags::POSITION));
        assert_eq!(ids(&q.drain(None)), vec![2, 1, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_descending_drains_highest_first() {
        let (a, b, c) = (entity(1), entity(2), entity(3));
        let q = queue(PriorityOrder::Descending, 100, OverflowPolicy::Coalesce);
        q.enqueue(5.0, update(&a, ChangeFlags::POSITION));
        q.enqueue(1.0, update(&b, ChangeFlags::POSITION));
        q.enqueue(9.0, update(&c, ChangeFlags::POSITION));
        assert_eq!(ids(&q.drain(None)), vec![3, 1, 2]);
    }

    #[test]
    fn test_ties_drain_in_submission_order() {
        let entities: Vec<_> = (1..=5).map(entity).collect();
        let q = queue(PriorityOrder::Ascending, 100, OverflowPolicy::Coalesce);
        for e in &entities {
            q.enqueue(0.0, update(e, ChangeFlags::ROTATION));
        }
        assert_eq!(ids(&q.drain(None)), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_bounded_drain() {
        let entities: Vec<_> = (1..=10).map(entity).collect();
        let q = queue(PriorityOrder::Ascending, 100, OverflowPolicy::Coalesce);
        for (i, e) in entities.iter().enumerate() {
            q.enqueue(i as f64, update(e, ChangeFlags::POSITION));
        }
        assert_eq!(ids(&q.drain(Some(3))), vec![1, 2, 3]);
        assert_eq!(q.len(), 7);
        assert_eq!(q.drain(Some(100)).len(), 7);
        assert!(q.drain(Some(5)).is_empty());
    }

    #[test]
    fn test_nan_priority_does_not_break_ordering() {
        let (a, b, c) = (entity(1), entity(2), entity(3));
        let q = queue(PriorityOrder::Ascending, 100, OverflowPolicy::Coalesce);
        q.enqueue(f64::NAN, update(&a, ChangeFlags::POSITION));
        q.enqueue(2.0, update(&b, ChangeFlags::POSITION));
        q.enqueue(1.0, update(&c, ChangeFlags::POSITION));
        assert_eq!(ids(&q.drain(None)), vec![3, 2, 1]);
    }

    #[test]
    fn test_coalesce_merges_per_entity() {
        let (a, b) = (entity(1), entity(2));
        let q = queue(PriorityOrder::Ascending, 3, OverflowPolicy::Coalesce);
        q.enqueue(4.0, update(&a, ChangeFlags::POSITION));
        q.enqueue(6.0, update(&b, ChangeFlags::POSITION));
        q.enqueue(2.0, update(&a, ChangeFlags::TEXT));
        let report = q.enqueue(8.0, update(&a, ChangeFlags::SOUND));
        assert_eq!(report, OverflowReport { coalesced: 2, shed: 0 });

        let drained = q.drain(None);
        assert_eq!(ids(&drained), vec![1, 2]);
        assert_eq!(
            drained[0].update.flags,
            ChangeFlags::POSITION | ChangeFlags::TEXT | ChangeFlags::SOUND
        );
        assert!((drained[0].priority - 2.0).abs() < f64::EPSILON);
        assert_eq!(drained[0].sequence(), 0);
    }

    #[test]
    fn test_coalesce_falls_back_to_shedding() {
        let entities: Vec<_> = (1..=40).map(entity).collect();
        let q = queue(PriorityOrder::Ascending, 32, OverflowPolicy::Coalesce);
        let mut shed = 0;
        for (i, e) in entities.iter().enumerate() {
            shed += q.enqueue(i as f64, update(e, ChangeFlags::POSITION)).shed;
        }
        assert!(shed > 0);
        assert!(q.len() <= 32);
        // The most urgent updates survive.
        assert_eq!(ids(&q.drain(Some(3))), vec![1, 2, 3]);
    }

    #[test]
    fn test_drop_least_urgent_never_merges() {
        let a = entity(1);
        let q = queue(PriorityOrder::Descending, 16, OverflowPolicy::DropLeastUrgent);
        let mut report = OverflowReport::default();
        for i in 0..17 {
            let r = q.enqueue(f64::from(i), update(&a, ChangeFlags::POSITION));
            report.coalesced += r.coalesced;
            report.shed += r.shed;
        }
        assert_eq!(report.coalesced, 0);
        assert_eq!(report.shed, 2);
        let drained = q.drain(None);
        assert_eq!(drained.len(), 15);
        assert!((drained[0].priority - 16.0).abs() < f64::EPSILON);
        assert!((drained[14].priority - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_requeue_keeps_submission_order() {
        let (a, b) = (entity(1), entity(2));
        let q = queue(PriorityOrder::Ascending, 100, OverflowPolicy::Coalesce);
        q.enqueue(1.0, update(&a, ChangeFlags::POSITION));
        q.enqueue(1.0, update(&b, ChangeFlags::POSITION));
        let drained = q.drain(None);
        let rescored: Vec<_> = drained.iter().rev().map(|e| e.with_priority(0.0)).collect();
        q.requeue(rescored);
        assert_eq!(ids(&q.drain(None)), vec![1, 2]);
    }

    #[test]
    fn test_concurrent_enqueue() {
        let q = Arc::new(queue(PriorityOrder::Ascending, 100_000, OverflowPolicy::Coalesce));
        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    let entities: Vec<_> = (0..500).map(|i| entity(t * 1000 + i + 1)).collect();
                    for (i, e) in entities.iter().enumerate() {
                        q.enqueue(i as f64, update(e, ChangeFlags::POSITION));
                    }
                    entities
                })
            })
            .collect();
        let _alive: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let drained = q.drain(None);
        assert_eq!(drained.len(), 4000);
        assert!(drained.windows(2).all(|w| w[0].priority <= w[1].priority));
    }
}
