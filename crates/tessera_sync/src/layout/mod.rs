//! # Wire Layout Builders
//!
//! Turn an [`EntitySnapshot`] into one update block.
//!
//! | Layout     | Carries                              | Permission mask |
//! |------------|--------------------------------------|-----------------|
//! | Terse      | quantized motion (+ texture entry)   | no              |
//! | Compressed | prim state minus absent optionals    | yes             |
//! | Full       | everything, unquantized              | yes             |
//! | Cached     | id + CRC                             | yes             |
//!
//! The mask is computed only for layouts that carry one, so a terse update
//! never consumes an entity's one-shot `CreateSelected` marker.

pub mod cached;
pub mod compressed;
pub mod full;
pub mod permissions;
pub mod terse;

use uuid::Uuid;

use crate::classify::Encoding;
use crate::error::BuildError;
use crate::protocol::{cstring_payload, UpdateBlock, WireWriter};
use crate::scene::{EntitySnapshot, ExtraParam, PrimShape, SceneEntity};

pub use cached::build_cached;
pub use compressed::{build_compressed, compressed_flags, CompressedWriter};
pub use full::build_full;
pub use permissions::recipient_flags;
pub use terse::{build_terse, TerseAvatarBody, TerseMotion, TersePrimBody};

/// Builds the block `encoding` calls for.
///
/// The permission mask is taken from `entity` for `recipient` immediately
/// before the block is assembled.
pub fn build_block(
    encoding: Encoding,
    entity: &dyn SceneEntity,
    snapshot: &EntitySnapshot,
    recipient: &Uuid,
) -> Result<UpdateBlock, BuildError> {
    let flags = || recipient_flags(entity, &snapshot.owner_id(), recipient);
    match encoding {
        Encoding::Terse { send_texture } => build_terse(snapshot, send_texture).map(UpdateBlock::Terse),
        Encoding::Full => build_full(snapshot, flags()).map(UpdateBlock::Full),
        Encoding::Cached => build_cached(snapshot, flags()).map(UpdateBlock::Cached),
        Encoding::Compressed(optional) => match snapshot {
            EntitySnapshot::Prim(prim) => {
                build_compressed(prim, optional, flags()).map(UpdateBlock::Compressed)
            }
            EntitySnapshot::Avatar(avatar) => Err(BuildError::KindMismatch {
                layout: "Compressed",
                local_id: avatar.local_id,
            }),
        },
    }
}

/// Writes the 23-byte path/profile block.
pub(crate) fn write_shape(writer: &mut WireWriter, shape: &PrimShape) {
    writer.write_u8(shape.path_curve);
    writer.write_u8(shape.profile_curve);
    writer.write_u16(shape.path_begin);
    writer.write_u16(shape.path_end);
    writer.write_u8(shape.path_scale_x);
    writer.write_u8(shape.path_scale_y);
    writer.write_u8(shape.path_shear_x);
    writer.write_u8(shape.path_shear_y);
    writer.write_i8(shape.path_twist);
    writer.write_i8(shape.path_twist_begin);
    writer.write_i8(shape.path_radius_offset);
    writer.write_i8(shape.path_taper_x);
    writer.write_i8(shape.path_taper_y);
    writer.write_u8(shape.path_revolutions);
    writer.write_i8(shape.path_skew);
    writer.write_u16(shape.profile_begin);
    writer.write_u16(shape.profile_end);
    writer.write_u16(shape.profile_hollow);
}

/// Encodes extra parameters as `count u8, (kind u16, len u32, data)*`.
pub(crate) fn encode_extra_params(params: &[ExtraParam]) -> Result<Vec<u8>, BuildError> {
    let count = u8::try_from(params.len()).map_err(|_| BuildError::FieldTooLong {
        field: "ExtraParams",
        len: params.len(),
        max: usize::from(u8::MAX),
    })?;
    let mut writer = WireWriter::with_capacity(1 + params.iter().map(|p| 6 + p.data.len()).sum::<usize>());
    writer.write_u8(count);
    for param in params {
        writer.write_u16(param.kind);
        writer.write_len32("ExtraParams", &param.data)?;
    }
    Ok(writer.into_inner())
}

/// Returns `s` NUL-terminated (cut at any embedded NUL), or nothing for an
/// empty string.
pub(crate) fn cstring_bytes(s: &str) -> Vec<u8> {
    let s = cstring_payload(s);
    if s.is_empty() {
        return Vec::new();
    }
    let mut bytes = Vec::with_capacity(s.len() + 1);
    bytes.extend_from_slice(s.as_bytes());
    bytes.push(0);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{MessageKind, PrimFlags};
    use crate::scene::{AvatarSnapshot, PrimSnapshot, SnapshotEntity};
    use tessera_core::LocalId;

    #[test]
    fn test_shape_is_23_bytes() {
        let mut writer = WireWriter::default();
        write_shape(&mut writer, &PrimShape::AVATAR);
        assert_eq!(writer.len(), PrimShape::SIZE);
    }

    #[test]
    fn test_extra_params_encoding() {
        assert_eq!(encode_extra_params(&[]).unwrap(), vec![0]);
        let encoded = encode_extra_params(&[ExtraParam {
            kind: 0x20,
            data: vec![7, 8],
        }])
        .unwrap();
        assert_eq!(encoded, vec![1, 0x20, 0, 2, 0, 0, 0, 7, 8]);
    }

    #[test]
    fn test_build_block_matches_encoding() {
        let owner = Uuid::from_u128(1);
        let entity = SnapshotEntity::prim(PrimSnapshot {
            local_id: LocalId(4),
            owner_id: owner,
            ..PrimSnapshot::default()
        });
        let snapshot = entity.snapshot().unwrap();

        for encoding in [
            Encoding::Full,
            Encoding::Cached,
            Encoding::Terse { send_texture: false },
            Encoding::Compressed(compressed_flags(&PrimSnapshot::default())),
        ] {
            let block = build_block(encoding, &entity, &snapshot, &owner).unwrap();
            assert_eq!(block.kind(), encoding.message_kind());
            assert_eq!(block.local_id(), LocalId(4));
        }
    }

    #[test]
    fn test_terse_leaves_marker_armed() {
        let owner = Uuid::from_u128(1);
        let entity = SnapshotEntity::prim(PrimSnapshot {
            owner_id: owner,
            ..PrimSnapshot::default()
        })
        .with_create_selected();
        let snapshot = entity.snapshot().unwrap();

        let terse = build_block(Encoding::Terse { send_texture: false }, &entity, &snapshot, &owner).unwrap();
        assert_eq!(terse.update_flags(), None);

        let full = build_block(Encoding::Full, &entity, &snapshot, &owner).unwrap();
        assert_eq!(full.kind(), MessageKind::ObjectUpdate);
        assert!(full.update_flags().unwrap().contains(PrimFlags::CREATE_SELECTED));
    }

    #[test]
    fn test_avatar_compressed_is_kind_mismatch() {
        let entity = SnapshotEntity::avatar(AvatarSnapshot::default());
        let snapshot = entity.snapshot().unwrap();
        let err = build_block(
            Encoding::Compressed(Default::default()),
            &entity,
            &snapshot,
            &Uuid::nil(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::KindMismatch { .. }));
    }
}
