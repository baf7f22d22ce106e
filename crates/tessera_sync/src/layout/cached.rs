//! # Cached Layout
//!
//! `ID 4 │ CRC 4 │ UpdateFlags 4`: asks the viewer to load the prim from
//! its object cache if the CRC matches, and to request it otherwise.

use crate::error::BuildError;
use crate::protocol::{CachedBlock, PrimFlags};
use crate::scene::EntitySnapshot;

/// Builds a cache check for a prim.
///
/// Avatars are never cached by the viewer.
pub fn build_cached(snapshot: &EntitySnapshot, update_flags: PrimFlags) -> Result<CachedBlock, BuildError> {
    match snapshot {
        EntitySnapshot::Prim(prim) => Ok(CachedBlock {
            local_id: prim.local_id,
            crc: prim.crc,
            update_flags,
        }),
        EntitySnapshot::Avatar(avatar) => Err(BuildError::KindMismatch {
            layout: "Cached",
            local_id: avatar.local_id,
        }),
    }
}
