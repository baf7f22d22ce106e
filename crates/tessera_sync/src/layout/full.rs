//! # Full Layout
//!
//! Complete, unquantized `ObjectUpdate` block. Used for entities the viewer
//! may never have seen and for changes no smaller layout can carry.
//!
//! Field order:
//!
//! ```text
//! ID 4 │ State 1 │ FullID 16 │ CRC 4 │ PCode 1 │ Material 1 │ ClickAction 1
//! Scale 12 │ ObjectData var1 │ ParentID 4 │ UpdateFlags 4 │ Shape 23
//! TextureEntry var2 │ TextureAnim var1 │ NameValue var2 │ Data var2
//! Text var1 │ TextColor 4 │ MediaURL var1 │ PSBlock var1 │ ExtraParams var1
//! Sound 16 │ OwnerID 16 │ Gain 4 │ Flags 1 │ Radius 4
//! JointType 1 │ JointPivot 12 │ JointAxisOrAnchor 12
//! ```
//!
//! `ObjectData` is 60 bytes for prims (position, velocity, acceleration,
//! packed rotation, angular velocity) and 76 for avatars, which lead with
//! their collision plane. Floating text and media URL are clipped to
//! [`MAX_STRING_LEN`] bytes on a UTF-8 boundary.

use tessera_core::{PCode, Vector3};
use uuid::Uuid;

use crate::error::BuildError;
use crate::layout::compressed::MAX_STRING_LEN;
use crate::layout::{cstring_bytes, encode_extra_params, write_shape};
use crate::protocol::{truncate_utf8, FullBlock, PrimFlags, WireWriter};
use crate::scene::{AvatarSnapshot, EntitySnapshot, ObjectMotion, PrimShape, PrimSnapshot};

/// Size of the prim `ObjectData` field.
pub const PRIM_OBJECT_DATA_SIZE: usize = 60;

/// Size of the avatar `ObjectData` field.
pub const AVATAR_OBJECT_DATA_SIZE: usize = 76;

/// Material code sent for avatars (flesh).
pub const AVATAR_MATERIAL: u8 = 4;

/// Bounding scale sent for avatars.
pub const AVATAR_SCALE: Vector3 = Vector3::new(0.45, 0.6, 1.9);

fn write_motion(writer: &mut WireWriter, motion: &ObjectMotion) {
    writer.write_vector3(motion.position);
    writer.write_vector3(motion.velocity);
    writer.write_vector3(motion.acceleration);
    writer.write_quaternion_packed(motion.rotation);
    writer.write_vector3(motion.angular_velocity);
}

fn write_joint(writer: &mut WireWriter) {
    writer.write_u8(0);
    writer.write_vector3(Vector3::ZERO);
    writer.write_vector3(Vector3::ZERO);
}

/// Builds the full block for `snapshot` with the given permission mask.
pub fn build_full(snapshot: &EntitySnapshot, update_flags: PrimFlags) -> Result<FullBlock, BuildError> {
    let data = match snapshot {
        EntitySnapshot::Prim(prim) => build_prim(prim, update_flags)?,
        EntitySnapshot::Avatar(avatar) => build_avatar(avatar, update_flags)?,
    };
    Ok(FullBlock {
        local_id: snapshot.local_id(),
        update_flags,
        data,
    })
}

fn build_prim(prim: &PrimSnapshot, update_flags: PrimFlags) -> Result<Vec<u8>, BuildError> {
    let mut writer = WireWriter::with_capacity(256 + prim.texture_entry.len());

    writer.write_local_id(prim.local_id);
    writer.write_u8(prim.attachment_point.packed());
    writer.write_uuid(&prim.full_id);
    writer.write_u32(prim.crc);
    writer.write_u8(prim.pcode as u8);
    writer.write_u8(prim.material);
    writer.write_u8(prim.click_action);
    writer.write_vector3(prim.scale);

    let mut object_data = WireWriter::with_capacity(PRIM_OBJECT_DATA_SIZE);
    write_motion(&mut object_data, &prim.motion);
    writer.write_var1("ObjectData", object_data.as_slice())?;

    writer.write_local_id(prim.parent_id);
    writer.write_u32(update_flags.bits());
    write_shape(&mut writer, &prim.shape);

    writer.write_var2("TextureEntry", &prim.texture_entry)?;
    writer.write_var1("TextureAnim", &prim.texture_anim)?;
    writer.write_var2("NameValue", &cstring_bytes(&prim.effective_name_value()))?;

    let data: &[u8] = if prim.pcode.is_tree() {
        std::slice::from_ref(&prim.tree_species)
    } else {
        &prim.scratch_pad
    };
    writer.write_var2("Data", data)?;

    writer.write_var1("Text", &cstring_bytes(truncate_utf8(&prim.text, MAX_STRING_LEN)))?;
    writer.write_bytes(&prim.text_color);
    writer.write_var1("MediaURL", &cstring_bytes(truncate_utf8(&prim.media_url, MAX_STRING_LEN)))?;
    writer.write_var1("PSBlock", &prim.particle_system)?;
    writer.write_var1("ExtraParams", &encode_extra_params(&prim.extra_params)?)?;

    writer.write_uuid(&prim.sound.sound_id);
    writer.write_uuid(&prim.owner_id);
    writer.write_f32(prim.sound.gain);
    writer.write_u8(prim.sound.flags);
    writer.write_f32(prim.sound.radius);
    write_joint(&mut writer);

    Ok(writer.into_inner())
}

fn build_avatar(avatar: &AvatarSnapshot, update_flags: PrimFlags) -> Result<Vec<u8>, BuildError> {
    let mut writer = WireWriter::with_capacity(256 + avatar.texture_entry.len());

    writer.write_local_id(avatar.local_id);
    writer.write_u8(0);
    writer.write_uuid(&avatar.full_id);
    writer.write_u32(0);
    writer.write_u8(PCode::Avatar as u8);
    writer.write_u8(AVATAR_MATERIAL);
    writer.write_u8(0);
    writer.write_vector3(AVATAR_SCALE);

    let mut object_data = WireWriter::with_capacity(AVATAR_OBJECT_DATA_SIZE);
    object_data.write_vector4(avatar.wire_collision_plane());
    write_motion(&mut object_data, &avatar.motion);
    writer.write_var1("ObjectData", object_data.as_slice())?;

    writer.write_local_id(avatar.parent_id);
    writer.write_u32(update_flags.bits());
    write_shape(&mut writer, &PrimShape::AVATAR);

    writer.write_var2("TextureEntry", &avatar.texture_entry)?;
    writer.write_var1("TextureAnim", &[])?;
    writer.write_var2("NameValue", &cstring_bytes(&avatar.name_value()))?;
    writer.write_var2("Data", &[])?;
    writer.write_var1("Text", &[])?;
    writer.write_bytes(&[0; 4]);
    writer.write_var1("MediaURL", &[])?;
    writer.write_var1("PSBlock", &[])?;
    writer.write_var1("ExtraParams", &encode_extra_params(&[])?)?;

    writer.write_uuid(&Uuid::nil());
    writer.write_uuid(&Uuid::nil());
    writer.write_f32(0.0);
    writer.write_u8(0);
    writer.write_f32(0.0);
    write_joint(&mut writer);

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireReader;
    use tessera_core::{LocalId, Quaternion, Vector4};

    #[test]
    fn test_prim_header_and_object_data() {
        let prim = PrimSnapshot {
            local_id: LocalId(12),
            full_id: Uuid::from_u128(5),
            crc: 99,
            motion: ObjectMotion {
                position: Vector3::new(1.0, 2.0, 3.0),
                velocity: Vector3::new(200.0, 0.0, 0.0),
                rotation: Quaternion::new(0.0, 0.0, 0.6, -0.8),
                ..ObjectMotion::default()
            },
            text: "sign".to_owned(),
            ..PrimSnapshot::default()
        };
        let block = build_full(&EntitySnapshot::Prim(Box::new(prim)), PrimFlags::PHYSICS).unwrap();
        assert_eq!(block.update_flags, PrimFlags::PHYSICS);

        let mut reader = WireReader::new(&block.data);
        assert_eq!(reader.read_u32(), Some(12));
        assert_eq!(reader.read_u8(), Some(0));
        assert_eq!(reader.read_uuid(), Some(Uuid::from_u128(5)));
        assert_eq!(reader.read_u32(), Some(99));
        assert_eq!(reader.read_u8(), Some(PCode::Primitive as u8));
        reader.read_bytes(2 + 12).unwrap();

        let object_data = reader.read_var1().unwrap();
        assert_eq!(object_data.len(), PRIM_OBJECT_DATA_SIZE);
        let mut od = WireReader::new(object_data);
        assert_eq!(od.read_vector3(), Some(Vector3::new(1.0, 2.0, 3.0)));
        // velocity is not quantized, so it is not clamped either
        assert_eq!(od.read_vector3(), Some(Vector3::new(200.0, 0.0, 0.0)));
        od.read_vector3().unwrap();
        let rotation = od.read_quaternion_packed().unwrap();
        assert!(rotation.w > 0.0);
        assert!((rotation.z + 0.6).abs() < 1e-6);

        assert_eq!(reader.read_u32(), Some(0));
        assert_eq!(reader.read_u32(), Some(PrimFlags::PHYSICS.bits()));
    }

    #[test]
    fn test_avatar_defaults() {
        let avatar = AvatarSnapshot {
            local_id: LocalId(3),
            first_name: "Ada".to_owned(),
            last_name: "Lovelace".to_owned(),
            collision_plane: Vector4::new(0.0, 0.0, 1.0, 20.0),
            ..AvatarSnapshot::default()
        };
        let block = build_full(&EntitySnapshot::Avatar(avatar), PrimFlags::empty()).unwrap();

        let mut reader = WireReader::new(&block.data);
        reader.read_bytes(4 + 1 + 16 + 4).unwrap();
        assert_eq!(reader.read_u8(), Some(PCode::Avatar as u8));
        assert_eq!(reader.read_u8(), Some(AVATAR_MATERIAL));
        assert_eq!(reader.read_u8(), Some(0));
        assert_eq!(reader.read_vector3(), Some(AVATAR_SCALE));

        let object_data = reader.read_var1().unwrap();
        assert_eq!(object_data.len(), AVATAR_OBJECT_DATA_SIZE);
        assert_eq!(&object_data[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&object_data[12..16], &20.0f32.to_le_bytes());

        reader.read_bytes(4 + 4).unwrap();
        let shape = reader.read_bytes(PrimShape::SIZE).unwrap();
        assert_eq!(shape[0], 16);
        assert_eq!(shape[1], 1);

        reader.read_var2().unwrap();
        reader.read_var1().unwrap();
        let name_value = reader.read_var2().unwrap();
        let name_value = std::str::from_utf8(&name_value[..name_value.len() - 1]).unwrap();
        assert_eq!(
            name_value,
            "FirstName STRING RW SV Ada\nLastName STRING RW SV Lovelace\nTitle STRING RW SV "
        );
    }

    #[test]
    fn test_oversize_texture_entry_fails() {
        let prim = PrimSnapshot {
            texture_entry: vec![0; 70_000],
            ..PrimSnapshot::default()
        };
        let err = build_full(&EntitySnapshot::Prim(Box::new(prim)), PrimFlags::empty()).unwrap_err();
        assert!(matches!(err, BuildError::FieldTooLong { field: "TextureEntry", .. }));
    }
}
