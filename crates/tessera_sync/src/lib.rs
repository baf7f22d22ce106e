//! # Tessera Sync - Per-Connection Entity Updates
//!
//! Decides, for every changed world entity, whether, in what binary form and
//! in what order one connected viewer hears about it.
//!
//! ## Architecture
//!
//! - **Protocol**: quantization codec, little-endian writer, message kinds
//! - **Layouts**: Terse, Compressed, Full and Cached block builders
//! - **Classifier**: picks the smallest layout that can carry a change
//! - **Queue**: concurrent priority queue with bounded overflow
//! - **Kill record**: killed entities never reappear
//! - **Session**: the drain scheduler tying it together
//!
//! ## Data Flow
//!
//! ```text
//! scene threads ──submit_update──► UpdateQueue
//!                                      │  transport says "Task drained"
//!                                      ▼
//!                       KillRecord ─► classify ─► build ─► batch
//!                                                            │
//!                                                Transport ◄─┘ (Task)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::LocalId;
//! use tessera_sync::{
//!     ChangeFlags, ChannelTransport, MessageKind, PrimSnapshot, SnapshotEntity, SyncConfig,
//!     SyncSession,
//! };
//! use uuid::Uuid;
//!
//! let (transport, outbound) = ChannelTransport::unbounded();
//! let session = SyncSession::new(Uuid::new_v4(), 0, SyncConfig::default(), Arc::new(transport))?;
//!
//! let prim = SnapshotEntity::prim(PrimSnapshot {
//!     local_id: LocalId(42),
//!     ..PrimSnapshot::default()
//! })
//! .into_shared();
//! session.submit_update(&prim, ChangeFlags::POSITION)?;
//! session.flush_all()?;
//!
//! let delivery = outbound.try_recv().expect("one terse message");
//! assert_eq!(delivery.message.kind, MessageKind::ImprovedTerseObjectUpdate);
//! # Ok::<(), tessera_sync::SyncError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod error;
pub mod kill;
pub mod layout;
pub mod protocol;
pub mod queue;
pub mod scene;
pub mod session;
pub mod stats;
pub mod transport;

// Re-exports for convenience
pub use classify::{classify, Encoding};
pub use config::{OverflowPolicy, PriorityOrder, SyncConfig};
pub use error::{BuildError, SceneError, SyncError, SyncResult, TransportError};
pub use kill::KillRecord;
pub use protocol::{
    ChangeFlags, CompressedFlags, MessageHeader, MessageKind, OutboundMessage, PrimFlags,
    ThrottleCategory, UpdateBlock,
};
pub use queue::{EntityUpdate, OverflowReport, QueueEntry, UpdateQueue};
pub use scene::{
    AvatarSnapshot, CacheOracle, CreateSelectedMarker, EntityHandle, EntitySnapshot, PrimSnapshot,
    PriorityScorer, SceneEntity, SnapshotEntity, UniformPriority,
};
pub use session::{KillTarget, SyncSession};
pub use stats::{SyncStats, SyncStatsSnapshot};
pub use transport::{spawn_drain_worker, ChannelTransport, Delivery, Transport, TransportSignal};

/// Largest datagram the transport should produce.
pub const MAX_PACKET_SIZE: usize = 1200;

/// Minimum (and default) initial queue allocation.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Default number of updates processed per backpressure signal.
pub const DEFAULT_UPDATES_PER_DRAIN: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_PACKET_SIZE, 1200);
        assert!(DEFAULT_UPDATES_PER_DRAIN <= DEFAULT_QUEUE_CAPACITY);
    }
}
