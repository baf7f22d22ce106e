//! # Session Configuration
//!
//! Per-connection tuning, loadable from TOML:
//!
//! ```toml
//! queue_capacity_hint = 1000
//! max_queued_updates = 20000
//! overflow_policy = "coalesce"
//! updates_per_drain = 100
//! priority_order = "ascending"
//! disable_facelights = false
//! ```
//!
//! Every key is optional; missing keys take the [`Default`] value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};
use crate::{DEFAULT_QUEUE_CAPACITY, DEFAULT_UPDATES_PER_DRAIN};

/// Default bound on queued updates before the overflow policy applies.
pub const DEFAULT_MAX_QUEUED_UPDATES: usize = 20_000;

/// Which end of the priority scale drains first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityOrder {
    /// Lowest value first.
    #[default]
    Ascending,
    /// Highest value first.
    Descending,
}

impl PriorityOrder {
    /// Returns true if priority `a` drains before priority `b`.
    #[inline]
    #[must_use]
    pub fn more_urgent(self, a: f64, b: f64) -> bool {
        match self {
            Self::Ascending => a.total_cmp(&b).is_lt(),
            Self::Descending => a.total_cmp(&b).is_gt(),
        }
    }
}

/// What happens when the queue exceeds `max_queued_updates`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Merge queued updates per entity, then shed if still over.
    #[default]
    Coalesce,
    /// Shed the least urgent updates.
    DropLeastUrgent,
}

/// Per-connection sync configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Initial queue allocation.
    pub queue_capacity_hint: usize,
    /// Queue length that triggers the overflow policy.
    pub max_queued_updates: usize,
    /// Overflow handling.
    pub overflow_policy: OverflowPolicy,
    /// Updates processed per backpressure signal.
    pub updates_per_drain: usize,
    /// Priority direction.
    pub priority_order: PriorityOrder,
    /// Strip light emission from non-hand attachments.
    pub disable_facelights: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            queue_capacity_hint: DEFAULT_QUEUE_CAPACITY,
            max_queued_updates: DEFAULT_MAX_QUEUED_UPDATES,
            overflow_policy: OverflowPolicy::default(),
            updates_per_drain: DEFAULT_UPDATES_PER_DRAIN,
            priority_order: PriorityOrder::default(),
            disable_facelights: false,
        }
    }
}

impl SyncConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or fails [`Self::validate`].
    pub fn from_toml_str(source: &str) -> SyncResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> SyncResult<()> {
        if self.queue_capacity_hint < DEFAULT_QUEUE_CAPACITY {
            return Err(SyncError::InvalidConfig(format!(
                "queue_capacity_hint must be at least {DEFAULT_QUEUE_CAPACITY}, got {}",
                self.queue_capacity_hint
            )));
        }
        if self.max_queued_updates < self.queue_capacity_hint {
            return Err(SyncError::InvalidConfig(format!(
                "max_queued_updates ({}) is below queue_capacity_hint ({})",
                self.max_queued_updates, self.queue_capacity_hint
            )));
        }
        if self.updates_per_drain == 0 {
            return Err(SyncError::InvalidConfig(
                "updates_per_drain must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
