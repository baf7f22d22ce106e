//! # Terse Layout
//!
//! Motion-only update. Fixed size, no permission mask.
//!
//! ```text
//! Prim (44 bytes)
//! ┌──────────┬───────┬────────┬──────────┬─────┬───────┬─────┬────────┐
//! │LocalID(4)│State 1│Avatar 1│Pos f32x3 │Vel 6│Accel 6│Rot 8│AngVel 6│
//! └──────────┴───────┴────────┴──────────┴─────┴───────┴─────┴────────┘
//!
//! Avatar (60 bytes): CollisionPlane f32x4 (16) follows the Avatar byte.
//! ```
//!
//! Velocity, acceleration, rotation and angular velocity are quantized to
//! 16 bits per component. The texture block is `u32 length + bytes` when
//! requested and empty otherwise.

use bytemuck::{bytes_of, Pod, Zeroable};
use tessera_core::{LocalId, Vector4};

use crate::error::BuildError;
use crate::protocol::quantize::{
    quantize_rotation, quantize_vector3, ACCELERATION_RANGE, ANGULAR_VELOCITY_RANGE, VELOCITY_RANGE,
};
use crate::protocol::{TerseBlock, WireWriter};
use crate::scene::{EntitySnapshot, ObjectMotion};

/// Quantized motion shared by both terse bodies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TerseMotion {
    /// Position, raw little-endian f32 x3.
    pub position: [u8; 12],
    /// Velocity, u16 x3.
    pub velocity: [u8; 6],
    /// Acceleration, u16 x3.
    pub acceleration: [u8; 6],
    /// Rotation, u16 x4.
    pub rotation: [u8; 8],
    /// Angular velocity, u16 x3.
    pub angular_velocity: [u8; 6],
}

impl TerseMotion {
    /// Size in bytes.
    pub const SIZE: usize = 38;

    /// Quantizes a motion state.
    #[must_use]
    pub fn encode(motion: &ObjectMotion) -> Self {
        let mut position = [0u8; 12];
        for (chunk, value) in position
            .chunks_exact_mut(4)
            .zip([motion.position.x, motion.position.y, motion.position.z])
        {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Self {
            position,
            velocity: pack_u16(quantize_vector3(motion.velocity, VELOCITY_RANGE)),
            acceleration: pack_u16(quantize_vector3(motion.acceleration, ACCELERATION_RANGE)),
            rotation: pack_u16(quantize_rotation(motion.rotation)),
            angular_velocity: pack_u16(quantize_vector3(
                motion.angular_velocity,
                ANGULAR_VELOCITY_RANGE,
            )),
        }
    }
}

/// Terse body of a prim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TersePrimBody {
    /// Local id, little-endian.
    pub local_id: [u8; 4],
    /// Packed attachment point.
    pub state: u8,
    /// Always 0.
    pub is_avatar: u8,
    /// Motion.
    pub motion: TerseMotion,
}

impl TersePrimBody {
    /// Size in bytes.
    pub const SIZE: usize = 44;
}

/// Terse body of an avatar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TerseAvatarBody {
    /// Local id, little-endian.
    pub local_id: [u8; 4],
    /// Always 0.
    pub state: u8,
    /// Always 1.
    pub is_avatar: u8,
    /// Collision plane, raw little-endian f32 x4.
    pub collision_plane: [u8; 16],
    /// Motion.
    pub motion: TerseMotion,
}

impl TerseAvatarBody {
    /// Size in bytes.
    pub const SIZE: usize = 60;
}

fn pack_u16<const N: usize, const B: usize>(values: [u16; N]) -> [u8; B] {
    let mut out = [0u8; B];
    for (chunk, value) in out.chunks_exact_mut(2).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    out
}

fn pack_vector4(v: Vector4) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (chunk, value) in out.chunks_exact_mut(4).zip([v.x, v.y, v.z, v.w]) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    out
}

/// Builds the terse block for `snapshot`.
///
/// When `send_texture` is set the entity's texture entry is attached.
pub fn build_terse(snapshot: &EntitySnapshot, send_texture: bool) -> Result<TerseBlock, BuildError> {
    let (local_id, data, texture_entry): (LocalId, Vec<u8>, &[u8]) = match snapshot {
        EntitySnapshot::Prim(prim) => {
            let body = TersePrimBody {
                local_id: prim.local_id.0.to_le_bytes(),
                state: prim.attachment_point.packed(),
                is_avatar: 0,
                motion: TerseMotion::encode(&prim.motion),
            };
            (prim.local_id, bytes_of(&body).to_vec(), prim.texture_entry.as_slice())
        }
        EntitySnapshot::Avatar(avatar) => {
            let body = TerseAvatarBody {
                local_id: avatar.local_id.0.to_le_bytes(),
                state: 0,
                is_avatar: 1,
                collision_plane: pack_vector4(avatar.wire_collision_plane()),
                motion: TerseMotion::encode(&avatar.motion),
            };
            (avatar.local_id, bytes_of(&body).to_vec(), avatar.texture_entry.as_slice())
        }
    };

    let texture_entry = if send_texture {
        let max = usize::from(u16::MAX) - 4;
        if texture_entry.len() > max {
            return Err(BuildError::FieldTooLong {
                field: "TextureEntry",
                len: texture_entry.len(),
                max,
            });
        }
        let mut writer = WireWriter::with_capacity(texture_entry.len() + 4);
        writer.write_len32("TextureEntry", texture_entry)?;
        writer.into_inner()
    } else {
        Vec::new()
    };

    Ok(TerseBlock {
        local_id,
        data,
        texture_entry,
    })
}
