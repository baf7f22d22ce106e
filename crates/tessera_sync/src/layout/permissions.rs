//! # Recipient Permissions
//!
//! Every layout that carries an `UpdateFlags` word computes it fresh for the
//! recipient, right before the block is built.

use uuid::Uuid;

use crate::protocol::PrimFlags;
use crate::scene::SceneEntity;

/// Computes the permission mask of `entity` as seen by `recipient`.
///
/// `CreateSelected` is only ever set through the entity's one-shot marker:
/// the first call for the owner after the marker is armed sets it and clears
/// the marker, every other call leaves it unset.
#[must_use]
pub fn recipient_flags(entity: &dyn SceneEntity, owner: &Uuid, recipient: &Uuid) -> PrimFlags {
    let mut flags = entity.object_flags(recipient);
    flags.remove(PrimFlags::CREATE_SELECTED);
    if entity
        .create_selected()
        .is_some_and(|marker| marker.take_if_selected_and_owner(owner, recipient))
    {
        flags.insert(PrimFlags::CREATE_SELECTED);
    }
    flags
}
