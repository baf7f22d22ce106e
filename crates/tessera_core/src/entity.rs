//! # Entity Vocabulary
//!
//! Region-local identifiers and the coarse classification of scene entities
//! that the update protocol cares about.

use std::fmt;

/// Region-local entity identifier.
///
/// Unique within one region for the lifetime of the entity. Viewers key their
/// object caches on it, so a reused id must always be preceded by a kill.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LocalId(pub u32);

impl LocalId {
    /// Null id, used for "no parent".
    pub const NULL: Self = Self(0);

    /// Returns true if this is the null id.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LocalId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Coarse entity kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A connected user's avatar.
    Avatar,
    /// A scene object part (prim, tree, grass).
    Prim,
}

/// Primitive code carried on the wire as the entity's shape class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PCode {
    /// Regular prim.
    #[default]
    Primitive = 9,
    /// Avatar.
    Avatar = 47,
    /// Grass patch.
    Grass = 95,
    /// Tree (current generation).
    NewTree = 111,
    /// Legacy particle emitter.
    ParticleSystem = 143,
    /// Tree (legacy).
    Tree = 255,
}

impl PCode {
    /// Returns true for the vegetation codes whose species byte is sent.
    #[inline]
    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(self, Self::Grass | Self::NewTree | Self::Tree)
    }

    /// Converts from the wire byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            9 => Some(Self::Primitive),
            47 => Some(Self::Avatar),
            95 => Some(Self::Grass),
            111 => Some(Self::NewTree),
            143 => Some(Self::ParticleSystem),
            255 => Some(Self::Tree),
            _ => None,
        }
    }
}

/// Avatar attachment point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AttachmentPoint(pub u8);

impl AttachmentPoint {
    /// Not attached.
    pub const NONE: Self = Self(0);
    /// Right hand.
    pub const RIGHT_HAND: Self = Self(6);
    /// Left hand.
    pub const LEFT_HAND: Self = Self(5);

    /// Returns true for either hand.
    #[inline]
    #[must_use]
    pub const fn is_hand(self) -> bool {
        self.0 == Self::LEFT_HAND.0 || self.0 == Self::RIGHT_HAND.0
    }

    /// Packs the point into the wire `State` byte.
    ///
    /// The viewer expects the two nibbles swapped.
    #[inline]
    #[must_use]
    pub const fn packed(self) -> u8 {
        self.0.rotate_left(4)
    }
}
