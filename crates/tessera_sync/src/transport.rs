//! # Transport Hand-off
//!
//! The sync layer does not send datagrams itself. It hands finished messages
//! to a [`Transport`], which owns acknowledgement, resend and per-category
//! throttling, and it listens for the transport's backpressure signals.
//!
//! ```text
//! SyncSession ──send(msg, Task, split)──► Transport ──► wire
//!      ▲                                     │
//!      └──── TransportSignal::QueueEmpty ────┘  (drain worker)
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::{SyncError, SyncResult, TransportError};
use crate::protocol::{OutboundMessage, ThrottleCategory};
use crate::session::SyncSession;

/// Outbound side of a viewer connection.
pub trait Transport: Send + Sync {
    /// Queues `message` under `category`.
    ///
    /// With `allow_auto_split` the transport may break the message into
    /// several datagrams (see [`OutboundMessage::encode_packets`]).
    ///
    /// # Errors
    ///
    /// [`TransportError::Closed`] when the connection is gone,
    /// [`TransportError::Backlogged`] when this message was refused.
    fn send(
        &self,
        message: OutboundMessage,
        category: ThrottleCategory,
        allow_auto_split: bool,
    ) -> Result<(), TransportError>;
}

/// A message accepted by a [`ChannelTransport`].
#[derive(Clone, Debug)]
pub struct Delivery {
    /// The message.
    pub message: OutboundMessage,
    /// Throttle category it was sent under.
    pub category: ThrottleCategory,
    /// Whether the sender allowed splitting.
    pub allow_auto_split: bool,
}

/// Transport that forwards messages into a crossbeam channel.
///
/// A bounded channel reports [`TransportError::Backlogged`] when full; a
/// dropped receiver reports [`TransportError::Closed`].
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    sender: Sender<Delivery>,
}

impl ChannelTransport {
    /// Creates a bounded transport and the receiving end.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<Delivery>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender }, receiver)
    }

    /// Creates an unbounded transport and the receiving end.
    #[must_use]
    pub fn unbounded() -> (Self, Receiver<Delivery>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(
        &self,
        message: OutboundMessage,
        category: ThrottleCategory,
        allow_auto_split: bool,
    ) -> Result<(), TransportError> {
        self.sender
            .try_send(Delivery {
                message,
                category,
                allow_auto_split,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => TransportError::Backlogged,
                TrySendError::Disconnected(_) => TransportError::Closed,
            })
    }
}

/// Signals a transport raises toward the sync layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportSignal {
    /// The listed categories have drained their outbound buffers.
    QueueEmpty(Vec<ThrottleCategory>),
    /// The connection is shutting down; flush what is queued.
    Shutdown,
}

/// Runs `session`'s drain scheduler on its own thread, driven by `signals`.
///
/// The worker exits on [`TransportSignal::Shutdown`] (after flushing), when
/// the signal channel disconnects, or when the session fails.
///
/// # Errors
///
/// Returns error if the thread cannot be spawned.
pub fn spawn_drain_worker(
    session: Arc<SyncSession>,
    signals: Receiver<TransportSignal>,
) -> SyncResult<JoinHandle<()>> {
    let name = format!("tessera-drain-{}", session.agent_id());
    let handle = std::thread::Builder::new().name(name).spawn(move || {
        for signal in signals.iter() {
            let result = match signal {
                TransportSignal::QueueEmpty(categories) => {
                    session.handle_queue_empty(&categories).map(|_| ())
                }
                TransportSignal::Shutdown => {
                    if let Err(error) = session.flush_all() {
                        tracing::warn!(agent = %session.agent_id(), %error, "flush on shutdown failed");
                    }
                    break;
                }
            };
            match result {
                Ok(()) => {}
                Err(SyncError::SessionClosed) => break,
                Err(error) => {
                    tracing::warn!(agent = %session.agent_id(), %error, "drain worker stopping");
                    break;
                }
            }
        }
        tracing::debug!(agent = %session.agent_id(), "drain worker exited");
    })?;
    Ok(handle)
}
