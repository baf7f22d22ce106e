//! # Sync Error Types
//!
//! Errors are split by blast radius:
//!
//! - [`SceneError`] and [`BuildError`] are per-block; the drain loop logs them
//!   and moves on to the next entry
//! - [`TransportError::Backlogged`] drops one message
//! - [`TransportError::Closed`] and [`SyncError`] end the connection

use tessera_core::LocalId;
use thiserror::Error;

/// Errors raised by scene accessors while taking a snapshot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The entity is in a state that cannot be described on the wire.
    #[error("entity {local_id} is inconsistent: {reason}")]
    Inconsistent {
        /// The entity.
        local_id: LocalId,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors that can occur while assembling one update block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The snapshot could not be taken.
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// A variable-length field exceeds its length prefix.
    #[error("field {field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        /// Wire name of the field.
        field: &'static str,
        /// Actual length.
        len: usize,
        /// Largest length the prefix can carry.
        max: usize,
    },

    /// The chosen layout cannot describe this kind of entity.
    #[error("{layout} layout cannot encode entity {local_id}")]
    KindMismatch {
        /// Layout that was asked for.
        layout: &'static str,
        /// The entity.
        local_id: LocalId,
    },
}

/// Errors reported by a transport when handed a message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone; nothing more can be sent.
    #[error("transport closed")]
    Closed,

    /// The category's outbound buffer is full; this message was not taken.
    #[error("transport backlogged")]
    Backlogged,
}

/// Connection-level errors.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration file could not be read.
    #[error("configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session has been closed.
    #[error("session closed")]
    SessionClosed,

    /// The transport failed; the session has been torn down.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for session operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_error_converts_into_build_error() {
        let err: BuildError = SceneError::Inconsistent {
            local_id: LocalId(9),
            reason: "mid-link".to_owned(),
        }
        .into();
        assert_eq!(err.to_string(), "entity 9 is inconsistent: mid-link");
    }

    #[test]
    fn test_transport_error_converts_into_sync_error() {
        let err: SyncError = TransportError::Closed.into();
        assert!(matches!(err, SyncError::Transport(TransportError::Closed)));
    }
}
