//! # Sync Session
//!
//! One viewer connection's update pipeline.
//!
//! ```text
//! submit_update ──► UpdateQueue
//!                        │ drain(max)        (one cycle at a time)
//!                        ▼
//!   for each entry: kill check ─► upgrade ─► snapshot ─► facelight strip
//!                   ─► classify ─► build ─► per-kind batch
//!                        │
//!                        ▼
//!   one OutboundMessage per non-empty kind ──► Transport (Task, auto-split)
//! ```
//!
//! ## Failure model
//!
//! - A block that fails to build is logged and skipped; the cycle continues
//! - A backlogged transport drops that message
//! - A closed transport closes the session: queue and kill record are
//!   discarded and every later call returns [`SyncError::SessionClosed`]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_core::LocalId;
use uuid::Uuid;

use crate::classify::classify;
use crate::config::SyncConfig;
use crate::error::{BuildError, SyncError, SyncResult, TransportError};
use crate::kill::KillRecord;
use crate::layout::build_block;
use crate::protocol::quantize::quantize_time_dilation;
use crate::protocol::{
    ChangeFlags, MessageHeader, MessageKind, OutboundMessage, ThrottleCategory, UpdateBlock,
};
use crate::queue::{EntityUpdate, OverflowReport, UpdateQueue};
use crate::scene::{CacheOracle, EntityHandle, EntitySnapshot, PriorityScorer, SceneEntity, UniformPriority};
use crate::stats::{SyncStats, SyncStatsSnapshot};
use crate::transport::Transport;

/// An entity the viewer must forget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KillTarget {
    /// The entity.
    pub local_id: LocalId,
    /// Attachments are not recorded; they come back when re-worn.
    pub is_attachment: bool,
}

impl KillTarget {
    /// Describes `entity` as a kill target.
    #[must_use]
    pub fn of(entity: &dyn SceneEntity) -> Self {
        Self {
            local_id: entity.local_id(),
            is_attachment: entity.is_attachment(),
        }
    }
}

/// Per-connection update pipeline.
pub struct SyncSession {
    agent_id: Uuid,
    region_handle: u64,
    config: SyncConfig,
    queue: UpdateQueue,
    kills: KillRecord,
    scorer: Arc<dyn PriorityScorer>,
    cache: Option<Arc<dyn CacheOracle>>,
    transport: Arc<dyn Transport>,
    time_dilation: AtomicU32,
    stats: SyncStats,
    closed: AtomicBool,
    drain_lock: Mutex<()>,
}

impl SyncSession {
    /// Opens a session for `agent_id` in the region `region_handle`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if `config` does not validate.
    pub fn new(
        agent_id: Uuid,
        region_handle: u64,
        config: SyncConfig,
        transport: Arc<dyn Transport>,
    ) -> SyncResult<Self> {
        config.validate()?;
        tracing::info!(agent = %agent_id, region_handle, "sync session opened");
        Ok(Self {
            agent_id,
            region_handle,
            queue: UpdateQueue::from_config(&config),
            config,
            kills: KillRecord::new(),
            scorer: Arc::new(UniformPriority),
            cache: None,
            transport,
            time_dilation: AtomicU32::new(1.0f32.to_bits()),
            stats: SyncStats::default(),
            closed: AtomicBool::new(false),
            drain_lock: Mutex::new(()),
        })
    }

    /// Uses `scorer` to prioritize [`Self::submit_update`].
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn PriorityScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Consults `cache` before sending prims the viewer may already have.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn CacheOracle>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Returns the recipient agent.
    #[must_use]
    pub const fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// Returns the region handle written into update headers.
    #[must_use]
    pub const fn region_handle(&self) -> u64 {
        self.region_handle
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the number of queued updates.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true once the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns true if `id` is in the kill record.
    #[must_use]
    pub fn is_killed(&self, id: LocalId) -> bool {
        self.kills.is_killed(id)
    }

    /// Returns a snapshot of the session counters.
    #[must_use]
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the current time dilation.
    #[must_use]
    pub fn time_dilation(&self) -> f32 {
        f32::from_bits(self.time_dilation.load(Ordering::Relaxed))
    }

    /// Sets the time dilation reported in subsequent headers.
    pub fn set_time_dilation(&self, dilation: f32) {
        self.time_dilation.store(dilation.to_bits(), Ordering::Relaxed);
    }

    fn ensure_open(&self) -> SyncResult<()> {
        if self.is_closed() {
            Err(SyncError::SessionClosed)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Producer API
    // =========================================================================

    /// Queues an update at the scorer's priority.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SessionClosed`] after [`Self::close`].
    pub fn submit_update(&self, entity: &Arc<dyn SceneEntity>, flags: ChangeFlags) -> SyncResult<()> {
        let priority = self.scorer.score(&self.agent_id, entity.as_ref());
        self.submit_update_with_priority(entity, flags, priority)
    }

    /// Queues an update at an explicit priority.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SessionClosed`] after [`Self::close`].
    pub fn submit_update_with_priority(
        &self,
        entity: &Arc<dyn SceneEntity>,
        flags: ChangeFlags,
        priority: f64,
    ) -> SyncResult<()> {
        self.ensure_open()?;
        let report = self
            .queue
            .enqueue(priority, EntityUpdate::new(EntityHandle::new(entity), flags));
        SyncStats::add(&self.stats.enqueued, 1);
        self.record_overflow(report);
        Ok(())
    }

    fn record_overflow(&self, report: OverflowReport) {
        if !report.is_empty() {
            SyncStats::add(&self.stats.coalesced, report.coalesced as u64);
            SyncStats::add(&self.stats.shed, report.shed as u64);
        }
    }

    /// Records kills for non-attachments and tells the viewer.
    ///
    /// Waits for an in-flight drain cycle, so no update built before the
    /// kill reaches the transport after it.
    ///
    /// # Errors
    ///
    /// Returns error if the session is closed or the transport closes.
    pub fn kill_entities(&self, targets: &[KillTarget]) -> SyncResult<()> {
        self.ensure_open()?;
        if targets.is_empty() {
            return Ok(());
        }
        let _drain = self.drain_lock.lock();
        for target in targets.iter().filter(|t| !t.is_attachment) {
            self.kills.mark_killed(target.local_id);
        }
        let mut message = OutboundMessage::new(MessageKind::KillObject, self.header());
        message.blocks = targets.iter().map(|t| UpdateBlock::Kill(t.local_id)).collect();
        self.send(message)?;
        Ok(())
    }

    /// Forgets every recorded kill.
    pub fn reset_kill_record(&self) {
        self.kills.reset();
    }

    // =========================================================================
    // Drain scheduler
    // =========================================================================

    /// Runs one drain cycle over at most `max` queued updates.
    ///
    /// Returns the number of blocks handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns error if the session is closed or the transport closes.
    pub fn process_entity_updates(&self, max: Option<usize>) -> SyncResult<usize> {
        self.ensure_open()?;
        let _drain = self.drain_lock.lock();

        let entries = self.queue.drain(max);
        if entries.is_empty() {
            return Ok(0);
        }
        SyncStats::add(&self.stats.drained, entries.len() as u64);
        SyncStats::add(&self.stats.drain_cycles, 1);

        let header = self.header();
        let mut batches: [Option<OutboundMessage>; 4] = Default::default();
        let drained = entries.len();

        for entry in entries {
            let local_id = entry.update.local_id();
            if self.kills.is_killed(local_id) {
                tracing::warn!(%local_id, agent = %self.agent_id, "dropping update for killed entity");
                SyncStats::add(&self.stats.killed_drops, 1);
                continue;
            }

            let Some(entity) = entry.update.entity.upgrade() else {
                tracing::debug!(%local_id, "entity left the scene before its update was sent");
                SyncStats::add(&self.stats.entities_gone, 1);
                continue;
            };

            match self.build_update(entity.as_ref(), entry.update.flags) {
                Ok(block) => {
                    let kind = block.kind();
                    let slot = MessageKind::UPDATE_KINDS
                        .iter()
                        .position(|k| *k == kind)
                        .unwrap_or(0);
                    batches[slot]
                        .get_or_insert_with(|| OutboundMessage::new(kind, header))
                        .blocks
                        .push(block);
                }
                Err(error) => {
                    tracing::warn!(%local_id, %error, "failed to build update block, skipping");
                    SyncStats::add(&self.stats.build_failures, 1);
                }
            }
        }

        let mut sent = 0;
        for message in batches.into_iter().flatten() {
            sent += self.send(message)?;
        }
        tracing::debug!(agent = %self.agent_id, drained, sent, "drain cycle complete");
        Ok(sent)
    }

    fn build_update(&self, entity: &dyn SceneEntity, flags: ChangeFlags) -> Result<UpdateBlock, BuildError> {
        let mut snapshot = entity.snapshot()?;

        if self.config.disable_facelights && entity.is_attachment() {
            if let EntitySnapshot::Prim(prim) = &mut snapshot {
                if prim.emits_light() && !prim.attachment_point.is_hand() {
                    tracing::trace!(local_id = %prim.local_id, "stripping facelight");
                    prim.strip_light();
                }
            }
        }

        let encoding = classify(flags, &snapshot, |id, crc| {
            self.cache
                .as_ref()
                .is_some_and(|cache| cache.use_cached(&self.agent_id, id, crc))
        });
        build_block(encoding, entity, &snapshot, &self.agent_id)
    }

    /// Reacts to the transport draining its buffers.
    ///
    /// Only [`ThrottleCategory::Task`] triggers a bounded drain cycle.
    ///
    /// # Errors
    ///
    /// Returns error if the session is closed or the transport closes.
    pub fn handle_queue_empty(&self, categories: &[ThrottleCategory]) -> SyncResult<usize> {
        if categories.contains(&ThrottleCategory::Task) {
            self.process_entity_updates(Some(self.config.updates_per_drain))
        } else {
            Ok(0)
        }
    }

    /// Drains until the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns error if the session is closed or the transport closes.
    pub fn flush_all(&self) -> SyncResult<usize> {
        let mut sent = 0;
        while !self.queue.is_empty() {
            sent += self.process_entity_updates(Some(self.config.updates_per_drain))?;
        }
        Ok(sent)
    }

    /// Rescores every queued update with the session's scorer.
    ///
    /// Updates whose entity left the scene are dropped; their count is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SessionClosed`] after [`Self::close`].
    pub fn reprioritize(&self) -> SyncResult<usize> {
        self.ensure_open()?;
        let _drain = self.drain_lock.lock();

        let entries = self.queue.drain(None);
        let before = entries.len();
        let rescored: Vec<_> = entries
            .iter()
            .filter_map(|entry| {
                let entity = entry.update.entity.upgrade()?;
                Some(entry.with_priority(self.scorer.score(&self.agent_id, entity.as_ref())))
            })
            .collect();
        let dropped = before - rescored.len();
        SyncStats::add(&self.stats.entities_gone, dropped as u64);

        let report = self.queue.requeue(rescored);
        self.record_overflow(report);
        tracing::debug!(agent = %self.agent_id, requeued = before - dropped, dropped, "reprioritized update queue");
        Ok(dropped)
    }

    /// Closes the session, discarding the queue and the kill record.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let discarded = self.queue.clear();
        self.kills.reset();
        tracing::info!(agent = %self.agent_id, discarded, "sync session closed");
    }

    // =========================================================================
    // Transport hand-off
    // =========================================================================

    fn header(&self) -> MessageHeader {
        MessageHeader {
            region_handle: self.region_handle,
            time_dilation: quantize_time_dilation(self.time_dilation()),
        }
    }

    fn send(&self, message: OutboundMessage) -> SyncResult<usize> {
        let kind = message.kind;
        let blocks = message.blocks.len();
        match self.transport.send(message, ThrottleCategory::Task, true) {
            Ok(()) => {
                self.stats.record_blocks(kind, blocks as u64);
                SyncStats::add(&self.stats.messages_sent, 1);
                Ok(blocks)
            }
            Err(TransportError::Backlogged) => {
                tracing::warn!(agent = %self.agent_id, ?kind, dropped = blocks, "transport backlogged, message dropped");
                SyncStats::add(&self.stats.messages_dropped, 1);
                Ok(0)
            }
            Err(TransportError::Closed) => {
                self.close();
                Err(SyncError::Transport(TransportError::Closed))
            }
        }
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("agent_id", &self.agent_id)
            .field("region_handle", &self.region_handle)
            .field("queue", &self.queue)
            .field("killed", &self.kills.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
