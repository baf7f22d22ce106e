//! # Encoding Classifier
//!
//! Picks the smallest layout that can carry a change.
//!
//! ```text
//! FullUpdate ───────────────────────────────────────────► Full
//! Cached allowed and viewer copy current ───────────────► Cached
//! neither Terse nor Compressed allowed ─────────────────► Full
//! Terse disallowed, Compressed allowed ─────────────────► Compressed
//! otherwise ────────────────────────────────────────────► Terse
//! ```
//!
//! Avatars are never Compressed or Cached.

use tessera_core::{EntityKind, LocalId};

use crate::layout::compressed::compressed_flags;
use crate::protocol::{ChangeFlags, CompressedFlags, MessageKind};
use crate::scene::EntitySnapshot;

/// Layout chosen for one update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Everything, unquantized.
    Full,
    /// Prim state with the given optional fields.
    Compressed(CompressedFlags),
    /// Quantized motion, optionally with the texture entry.
    Terse {
        /// Attach the texture entry.
        send_texture: bool,
    },
    /// Cache check.
    Cached,
}

impl Encoding {
    /// Returns the message kind blocks of this encoding are batched into.
    #[must_use]
    pub const fn message_kind(self) -> MessageKind {
        match self {
            Self::Full => MessageKind::ObjectUpdate,
            Self::Compressed(_) => MessageKind::ObjectUpdateCompressed,
            Self::Terse { .. } => MessageKind::ImprovedTerseObjectUpdate,
            Self::Cached => MessageKind::ObjectUpdateCached,
        }
    }
}

/// Chooses the layout for `flags` on `snapshot`.
///
/// `use_cached` is asked whether the viewer's cached copy of
/// `(local_id, crc)` is current; it is only called when a Cached block would
/// be allowed.
pub fn classify<F>(flags: ChangeFlags, snapshot: &EntitySnapshot, use_cached: F) -> Encoding
where
    F: FnOnce(LocalId, u32) -> bool,
{
    if flags.contains(ChangeFlags::FULL_UPDATE) {
        return Encoding::Full;
    }

    let prim = match snapshot {
        EntitySnapshot::Prim(prim) => Some(prim.as_ref()),
        EntitySnapshot::Avatar(_) => None,
    };
    debug_assert_eq!(prim.is_some(), snapshot.kind() == EntityKind::Prim);

    let can_compress = prim.is_some() && !flags.intersects(ChangeFlags::NOT_COMPRESSIBLE);
    let can_terse = !flags.intersects(ChangeFlags::NOT_TERSE);
    let can_cache = prim.is_some() && !flags.intersects(ChangeFlags::MOTION);

    if can_cache && use_cached(snapshot.local_id(), snapshot.crc()) {
        return Encoding::Cached;
    }

    match (can_terse, prim) {
        (false, Some(prim)) if can_compress => Encoding::Compressed(compressed_flags(prim)),
        (false, _) => Encoding::Full,
        (true, _) => Encoding::Terse {
            send_texture: flags.contains(ChangeFlags::TEXTURES),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{AvatarSnapshot, PrimSnapshot};

    fn prim() -> EntitySnapshot {
        EntitySnapshot::Prim(Box::new(PrimSnapshot {
            local_id: LocalId(1),
            text: "label".to_owned(),
            ..PrimSnapshot::default()
        }))
    }

    fn avatar() -> EntitySnapshot {
        EntitySnapshot::Avatar(AvatarSnapshot::default())
    }

    fn every_single_flag() -> impl Iterator<Item = ChangeFlags> {
        ChangeFlags::all().iter()
    }

    #[test]
    fn test_full_update_always_full() {
        for extra in every_single_flag() {
            let flags = ChangeFlags::FULL_UPDATE | extra;
            assert_eq!(classify(flags, &prim(), |_, _| true), Encoding::Full);
            assert_eq!(classify(flags, &avatar(), |_, _| true), Encoding::Full);
        }
    }

    #[test]
    fn test_avatar_never_compressed_or_cached() {
        for flags in every_single_flag() {
            let encoding = classify(flags, &avatar(), |_, _| true);
            assert!(
                matches!(encoding, Encoding::Full | Encoding::Terse { .. }),
                "{flags:?} gave {encoding:?}"
            );
        }
    }

    #[test]
    fn test_velocity_never_compressed() {
        for extra in every_single_flag() {
            let encoding = classify(ChangeFlags::VELOCITY | extra, &prim(), |_, _| false);
            assert!(!matches!(encoding, Encoding::Compressed(_)), "{extra:?}");
        }
    }

    #[test]
    fn test_text_never_terse() {
        for extra in every_single_flag() {
            let encoding = classify(ChangeFlags::TEXT | extra, &prim(), |_, _| false);
            assert!(!matches!(encoding, Encoding::Terse { .. }), "{extra:?}");
        }
    }

    #[test]
    fn test_motion_never_cached() {
        let encoding = classify(ChangeFlags::POSITION, &prim(), |_, _| true);
        assert_eq!(encoding, Encoding::Terse { send_texture: false });
        let encoding = classify(ChangeFlags::POSITION | ChangeFlags::TEXT, &prim(), |_, _| true);
        assert!(matches!(encoding, Encoding::Compressed(_)));
    }

    #[test]
    fn test_cache_oracle_consulted_only_when_allowed() {
        let mut asked = false;
        let _ = classify(ChangeFlags::ROTATION, &prim(), |_, _| {
            asked = true;
            true
        });
        assert!(!asked);

        let encoding = classify(ChangeFlags::TEXT, &prim(), |id, _| id == LocalId(1));
        assert_eq!(encoding, Encoding::Cached);
    }

    #[test]
    fn test_compressed_carries_prim_flags() {
        let encoding = classify(ChangeFlags::TEXT, &prim(), |_, _| false);
        assert_eq!(encoding, Encoding::Compressed(CompressedFlags::HAS_TEXT));
    }

    #[test]
    fn test_uncompressible_and_not_terse_is_full() {
        let encoding = classify(ChangeFlags::TEXT | ChangeFlags::VELOCITY, &prim(), |_, _| false);
        assert_eq!(encoding, Encoding::Full);
        let encoding = classify(ChangeFlags::SHAPE, &avatar(), |_, _| false);
        assert_eq!(encoding, Encoding::Full);
    }

    #[test]
    fn test_textures_travel_with_terse() {
        let encoding = classify(ChangeFlags::TEXTURES | ChangeFlags::ROTATION, &prim(), |_, _| false);
        assert_eq!(encoding, Encoding::Terse { send_texture: true });
        assert_eq!(
            classify(ChangeFlags::empty(), &prim(), |_, _| false),
            Encoding::Terse { send_texture: false }
        );
    }
}
