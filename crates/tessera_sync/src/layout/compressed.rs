//! # Compressed Layout
//!
//! Prim update that omits absent optional fields.
//!
//! ```text
//! ┌─────────────────────────────── prefix (84) ───────────────────────────────┐
//! │FullID 16│LocalID 4│PCode 1│State 1│CRC 4│Material 1│Click 1│Scale 12│     │
//! │Position 12│Rotation 12│Flags 4│OwnerID 16                                 │
//! ├─────────────────────────────── body ──────────────────────────────────────┤
//! │[AngVel 12][Parent 4][Tree 1 | ScratchPad len8+N][Text cstr + RGBA 4]      │
//! │[MediaURL cstr][Particles N] ExtraParams [Sound 25][NameValue cstr]        │
//! │Shape 23 │ TextureEntry len32+N │ [TextureAnim len32+N]                    │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The body has no tags; the `Flags` word alone says which bracketed fields
//! are present. [`CompressedWriter`] is a typestate: each stage can only be
//! reached from the previous one, and the flags word is patched in from the
//! fields actually written.
//!
//! Strings end at their first NUL, so a reader never finds a terminator
//! before the one written. The finished body travels in a `var2` field and
//! must fit in [`MAX_BODY_LEN`] bytes; a larger body fails to build instead
//! of failing the whole message later.

use std::marker::PhantomData;

use tessera_core::{LocalId, Vector3};

use crate::error::BuildError;
use crate::layout::{encode_extra_params, write_shape};
use crate::protocol::{cstring_payload, truncate_utf8, CompressedBlock, CompressedFlags, PrimFlags, WireWriter};
use crate::scene::{ExtraParam, PrimShape, PrimSnapshot, SoundParams};

/// Offset of the flags word inside the prefix.
pub const FLAGS_OFFSET: usize = 64;

/// Size of the fixed prefix.
pub const PREFIX_SIZE: usize = 84;

/// Longest text or media URL payload, excluding the terminator.
pub const MAX_STRING_LEN: usize = 254;

/// Longest name-value payload, excluding the terminator.
pub const MAX_NAME_VALUE_LEN: usize = u16::MAX as usize - 1;

/// Largest body the block's two-byte length prefix can carry.
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// Writer stages, in wire order.
pub mod stage {
    /// Optional angular velocity.
    pub struct AngularVelocity;
    /// Optional parent id.
    pub struct Parent;
    /// Optional tree species.
    pub struct Tree;
    /// Optional scratch pad.
    pub struct ScratchPad;
    /// Optional floating text.
    pub struct Text;
    /// Optional media URL.
    pub struct MediaUrl;
    /// Optional particle system.
    pub struct Particles;
    /// Mandatory extra parameters.
    pub struct ExtraParams;
    /// Optional sound.
    pub struct Sound;
    /// Optional name-value string.
    pub struct NameValues;
    /// Mandatory shape.
    pub struct Shape;
    /// Mandatory texture entry.
    pub struct TextureEntry;
    /// Optional texture animation.
    pub struct TextureAnimation;
    /// All fields written.
    pub struct Done;
}

/// Stage-typed compressed body writer.
pub struct CompressedWriter<S> {
    writer: WireWriter,
    flags: CompressedFlags,
    _stage: PhantomData<S>,
}

impl<S> CompressedWriter<S> {
    fn advance<T>(self) -> CompressedWriter<T> {
        CompressedWriter {
            writer: self.writer,
            flags: self.flags,
            _stage: PhantomData,
        }
    }

    fn mark(&mut self, flag: CompressedFlags) {
        self.flags.insert(flag);
    }
}

impl CompressedWriter<stage::AngularVelocity> {
    /// Writes the fixed prefix of `prim`.
    #[must_use]
    pub fn begin(prim: &PrimSnapshot) -> Self {
        let mut writer = WireWriter::with_capacity(PREFIX_SIZE + 64 + prim.texture_entry.len());
        writer.write_uuid(&prim.full_id);
        writer.write_local_id(prim.local_id);
        writer.write_u8(prim.pcode as u8);
        writer.write_u8(prim.attachment_point.packed());
        writer.write_u32(prim.crc);
        writer.write_u8(prim.material);
        writer.write_u8(prim.click_action);
        writer.write_vector3(prim.scale);
        writer.write_vector3(prim.motion.position);
        writer.write_quaternion_packed(prim.motion.rotation);
        writer.write_u32(0);
        writer.write_uuid(&prim.owner_id);
        Self {
            writer,
            flags: CompressedFlags::empty(),
            _stage: PhantomData,
        }
    }

    /// Writes the angular velocity if present.
    #[must_use]
    pub fn angular_velocity(mut self, value: Option<Vector3>) -> CompressedWriter<stage::Parent> {
        if let Some(v) = value {
            self.writer.write_vector3(v);
            self.mark(CompressedFlags::HAS_ANGULAR_VELOCITY);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::Parent> {
    /// Writes the parent id if present.
    #[must_use]
    pub fn parent(mut self, parent: Option<LocalId>) -> CompressedWriter<stage::Tree> {
        if let Some(id) = parent {
            self.writer.write_local_id(id);
            self.mark(CompressedFlags::HAS_PARENT);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::Tree> {
    /// Writes the vegetation species if present.
    #[must_use]
    pub fn tree(mut self, species: Option<u8>) -> CompressedWriter<stage::ScratchPad> {
        if let Some(species) = species {
            self.writer.write_u8(species);
            self.mark(CompressedFlags::TREE);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::ScratchPad> {
    /// Writes the scratch pad if present. Ignored after a tree species.
    pub fn scratch_pad(mut self, pad: Option<&[u8]>) -> Result<CompressedWriter<stage::Text>, BuildError> {
        if let Some(pad) = pad {
            if !self.flags.contains(CompressedFlags::TREE) {
                self.writer.write_var1("ScratchPad", pad)?;
                self.mark(CompressedFlags::SCRATCH_PAD);
            }
        }
        Ok(self.advance())
    }
}

impl CompressedWriter<stage::Text> {
    /// Writes floating text and its color if present.
    #[must_use]
    pub fn text(mut self, text: Option<(&str, [u8; 4])>) -> CompressedWriter<stage::MediaUrl> {
        if let Some((text, color)) = text {
            self.writer.write_cstring(truncate_utf8(text, MAX_STRING_LEN));
            self.writer.write_bytes(&color);
            self.mark(CompressedFlags::HAS_TEXT);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::MediaUrl> {
    /// Writes the media URL if present.
    #[must_use]
    pub fn media_url(mut self, url: Option<&str>) -> CompressedWriter<stage::Particles> {
        if let Some(url) = url {
            self.writer.write_cstring(truncate_utf8(url, MAX_STRING_LEN));
            self.mark(CompressedFlags::MEDIA_URL);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::Particles> {
    /// Writes the particle system if present.
    #[must_use]
    pub fn particles(mut self, system: Option<&[u8]>) -> CompressedWriter<stage::ExtraParams> {
        if let Some(system) = system {
            self.writer.write_bytes(system);
            self.mark(CompressedFlags::HAS_PARTICLES);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::ExtraParams> {
    /// Writes the extra parameter list; an empty list is a single zero byte.
    pub fn extra_params(mut self, params: &[ExtraParam]) -> Result<CompressedWriter<stage::Sound>, BuildError> {
        let encoded = encode_extra_params(params)?;
        self.writer.write_bytes(&encoded);
        Ok(self.advance())
    }
}

impl CompressedWriter<stage::Sound> {
    /// Writes the attached sound if present.
    #[must_use]
    pub fn sound(mut self, sound: Option<&SoundParams>) -> CompressedWriter<stage::NameValues> {
        if let Some(sound) = sound {
            self.writer.write_uuid(&sound.sound_id);
            self.writer.write_f32(sound.gain);
            self.writer.write_u8(sound.flags);
            self.writer.write_f32(sound.radius);
            self.mark(CompressedFlags::HAS_SOUND);
        }
        self.advance()
    }
}

impl CompressedWriter<stage::NameValues> {
    /// Writes the name-value string if present.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::FieldTooLong`] past [`MAX_NAME_VALUE_LEN`] bytes.
    pub fn name_values(mut self, name_values: Option<&str>) -> Result<CompressedWriter<stage::Shape>, BuildError> {
        if let Some(nv) = name_values.map(cstring_payload) {
            if nv.len() > MAX_NAME_VALUE_LEN {
                return Err(BuildError::FieldTooLong {
                    field: "NameValue",
                    len: nv.len(),
                    max: MAX_NAME_VALUE_LEN,
                });
            }
            self.writer.write_cstring(nv);
            self.mark(CompressedFlags::HAS_NAME_VALUES);
        }
        Ok(self.advance())
    }
}

impl CompressedWriter<stage::Shape> {
    /// Writes the path and profile parameters.
    #[must_use]
    pub fn shape(mut self, shape: &PrimShape) -> CompressedWriter<stage::TextureEntry> {
        write_shape(&mut self.writer, shape);
        self.advance()
    }
}

impl CompressedWriter<stage::TextureEntry> {
    /// Writes the texture entry.
    pub fn texture_entry(
        mut self,
        texture_entry: &[u8],
    ) -> Result<CompressedWriter<stage::TextureAnimation>, BuildError> {
        self.writer.write_len32("TextureEntry", texture_entry)?;
        Ok(self.advance())
    }
}

impl CompressedWriter<stage::TextureAnimation> {
    /// Writes the texture animation if present.
    pub fn texture_animation(
        mut self,
        anim: Option<&[u8]>,
    ) -> Result<CompressedWriter<stage::Done>, BuildError> {
        if let Some(anim) = anim {
            self.writer.write_len32("TextureAnim", anim)?;
            self.mark(CompressedFlags::TEXTURE_ANIMATION);
        }
        Ok(self.advance())
    }
}

impl CompressedWriter<stage::Done> {
    /// Patches the flags word and returns the body with the flags written.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::FieldTooLong`] if the body exceeds
    /// [`MAX_BODY_LEN`].
    pub fn finish(mut self) -> Result<(Vec<u8>, CompressedFlags), BuildError> {
        if self.writer.len() > MAX_BODY_LEN {
            return Err(BuildError::FieldTooLong {
                field: "Data",
                len: self.writer.len(),
                max: MAX_BODY_LEN,
            });
        }
        self.writer.patch_u32(FLAGS_OFFSET, self.flags.bits());
        Ok((self.writer.into_inner(), self.flags))
    }
}

/// Computes which optional fields `prim` needs.
#[must_use]
pub fn compressed_flags(prim: &PrimSnapshot) -> CompressedFlags {
    let mut flags = CompressedFlags::empty();
    flags.set(
        CompressedFlags::HAS_ANGULAR_VELOCITY,
        !prim.motion.angular_velocity.is_zero(),
    );
    flags.set(CompressedFlags::HAS_PARENT, !prim.parent_id.is_null());
    flags.set(CompressedFlags::TREE, prim.pcode.is_tree());
    flags.set(
        CompressedFlags::SCRATCH_PAD,
        !prim.pcode.is_tree() && !prim.scratch_pad.is_empty(),
    );
    flags.set(CompressedFlags::HAS_TEXT, !prim.text.is_empty());
    flags.set(CompressedFlags::MEDIA_URL, !prim.media_url.is_empty());
    flags.set(CompressedFlags::HAS_PARTICLES, !prim.particle_system.is_empty());
    flags.set(CompressedFlags::HAS_SOUND, !prim.sound.sound_id.is_nil());
    flags.set(
        CompressedFlags::HAS_NAME_VALUES,
        prim.is_attachment() || !prim.name_value.is_empty(),
    );
    flags.set(CompressedFlags::TEXTURE_ANIMATION, !prim.texture_anim.is_empty());
    flags
}

/// Builds a compressed block carrying exactly the fields named in `flags`.
pub fn build_compressed(
    prim: &PrimSnapshot,
    flags: CompressedFlags,
    update_flags: PrimFlags,
) -> Result<CompressedBlock, BuildError> {
    let name_value = flags
        .contains(CompressedFlags::HAS_NAME_VALUES)
        .then(|| prim.effective_name_value());

    let (data, _) = CompressedWriter::begin(prim)
        .angular_velocity(
            flags
                .contains(CompressedFlags::HAS_ANGULAR_VELOCITY)
                .then_some(prim.motion.angular_velocity),
        )
        .parent(flags.contains(CompressedFlags::HAS_PARENT).then_some(prim.parent_id))
        .tree(flags.contains(CompressedFlags::TREE).then_some(prim.tree_species))
        .scratch_pad(
            flags
                .contains(CompressedFlags::SCRATCH_PAD)
                .then_some(prim.scratch_pad.as_slice()),
        )?
        .text(
            flags
                .contains(CompressedFlags::HAS_TEXT)
                .then_some((prim.text.as_str(), prim.text_color)),
        )
        .media_url(flags.contains(CompressedFlags::MEDIA_URL).then_some(prim.media_url.as_str()))
        .particles(
            flags
                .contains(CompressedFlags::HAS_PARTICLES)
                .then_some(prim.particle_system.as_slice()),
        )
        .extra_params(&prim.extra_params)?
        .sound(flags.contains(CompressedFlags::HAS_SOUND).then_some(&prim.sound))
        .name_values(name_value.as_deref())?
        .shape(&prim.shape)
        .texture_entry(&prim.texture_entry)?
        .texture_animation(
            flags
                .contains(CompressedFlags::TEXTURE_ANIMATION)
                .then_some(prim.texture_anim.as_slice()),
        )?
        .finish()?;

    Ok(CompressedBlock {
        local_id: prim.local_id,
        update_flags,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireReader;
    use crate::scene::ObjectMotion;
    use tessera_core::{AttachmentPoint, PCode, Quaternion};
    use uuid::Uuid;

    fn plain_prim() -> PrimSnapshot {
        PrimSnapshot {
            local_id: LocalId(42),
            full_id: Uuid::from_u128(0xabc),
            owner_id: Uuid::from_u128(0xdef),
            crc: 3,
            scale: Vector3::new(1.0, 2.0, 3.0),
            motion: ObjectMotion {
                position: Vector3::new(10.0, 20.0, 30.0),
                rotation: Quaternion::IDENTITY,
                ..ObjectMotion::default()
            },
            texture_entry: vec![1, 2, 3],
            ..PrimSnapshot::default()
        }
    }

    fn flags_word(data: &[u8]) -> u32 {
        u32::from_le_bytes([
            data[FLAGS_OFFSET],
            data[FLAGS_OFFSET + 1],
            data[FLAGS_OFFSET + 2],
            data[FLAGS_OFFSET + 3],
        ])
    }

    #[test]
    fn test_plain_prim_has_only_mandatory_fields() {
        let prim = plain_prim();
        let flags = compressed_flags(&prim);
        assert!(flags.is_empty());

        let block = build_compressed(&prim, flags, PrimFlags::OBJECT_MOVE).unwrap();
        // prefix + extra params count + shape + len32 texture entry
        assert_eq!(block.data.len(), PREFIX_SIZE + 1 + PrimShape::SIZE + 4 + 3);
        assert_eq!(flags_word(&block.data), 0);

        let mut reader = WireReader::new(&block.data);
        assert_eq!(reader.read_uuid(), Some(prim.full_id));
        assert_eq!(reader.read_u32(), Some(42));
        assert_eq!(reader.read_u8(), Some(PCode::Primitive as u8));
    }

    #[test]
    fn test_optional_fields_follow_fixed_order() {
        let mut prim = plain_prim();
        prim.motion.angular_velocity = Vector3::new(0.0, 0.0, 1.0);
        prim.parent_id = LocalId(7);
        prim.text = "hello".to_owned();
        prim.text_color = [1, 2, 3, 4];

        let flags = compressed_flags(&prim);
        let block = build_compressed(&prim, flags, PrimFlags::empty()).unwrap();
        assert_eq!(
            flags_word(&block.data),
            (CompressedFlags::HAS_ANGULAR_VELOCITY
                | CompressedFlags::HAS_PARENT
                | CompressedFlags::HAS_TEXT)
                .bits()
        );

        let mut reader = WireReader::new(&block.data[PREFIX_SIZE..]);
        assert_eq!(reader.read_vector3(), Some(Vector3::new(0.0, 0.0, 1.0)));
        assert_eq!(reader.read_u32(), Some(7));
        assert_eq!(reader.read_cstring(), Some("hello"));
        assert_eq!(reader.read_array::<4>(), Some([1, 2, 3, 4]));
        assert_eq!(reader.read_u8(), Some(0));
    }

    #[test]
    fn test_flags_word_reflects_fields_written() {
        let mut prim = plain_prim();
        prim.pcode = PCode::Tree;
        prim.tree_species = 4;
        prim.scratch_pad = vec![9, 9];

        // Scratch pad requested on a tree: only the species goes out.
        let requested = CompressedFlags::TREE | CompressedFlags::SCRATCH_PAD;
        let block = build_compressed(&prim, requested, PrimFlags::empty()).unwrap();
        assert_eq!(flags_word(&block.data), CompressedFlags::TREE.bits());
        assert_eq!(block.data[PREFIX_SIZE], 4);
        assert_eq!(block.data[PREFIX_SIZE + 1], 0);
    }

    #[test]
    fn test_long_text_truncated() {
        let mut prim = plain_prim();
        prim.text = "x".repeat(400);
        let flags = compressed_flags(&prim);
        let block = build_compressed(&prim, flags, PrimFlags::empty()).unwrap();
        let mut reader = WireReader::new(&block.data[PREFIX_SIZE..]);
        assert_eq!(reader.read_cstring().map(str::len), Some(MAX_STRING_LEN));
    }

    #[test]
    fn test_attachment_always_sends_name_values() {
        let mut prim = plain_prim();
        prim.attachment_point = AttachmentPoint::RIGHT_HAND;
        let flags = compressed_flags(&prim);
        assert!(flags.contains(CompressedFlags::HAS_NAME_VALUES));

        let block = build_compressed(&prim, flags, PrimFlags::empty()).unwrap();
        let mut reader = WireReader::new(&block.data[PREFIX_SIZE..]);
        assert_eq!(reader.read_u8(), Some(0));
        let nv = reader.read_cstring().unwrap();
        assert!(nv.starts_with("AttachItemID STRING RW SV "));
    }

    #[test]
    fn test_embedded_nul_keeps_later_fields_aligned() {
        let mut prim = plain_prim();
        prim.text = "ab\0cd".to_owned();
        prim.text_color = [1, 2, 3, 4];
        prim.media_url = "http://x\0y".to_owned();
        prim.name_value = "Key STRING RW SV v\0junk".to_owned();

        let flags = compressed_flags(&prim);
        let block = build_compressed(&prim, flags, PrimFlags::empty()).unwrap();
        let mut reader = WireReader::new(&block.data[PREFIX_SIZE..]);
        assert_eq!(reader.read_cstring(), Some("ab"));
        assert_eq!(reader.read_array::<4>(), Some([1, 2, 3, 4]));
        assert_eq!(reader.read_cstring(), Some("http://x"));
        assert_eq!(reader.read_u8(), Some(0));
        assert_eq!(reader.read_cstring(), Some("Key STRING RW SV v"));
        assert_eq!(reader.read_bytes(PrimShape::SIZE).map(<[u8]>::len), Some(PrimShape::SIZE));
        assert_eq!(reader.read_len32(), Some(&[1u8, 2, 3][..]));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_oversize_body_rejected() {
        let mut prim = plain_prim();
        prim.texture_entry = vec![0; 70_000];
        let err = build_compressed(&prim, compressed_flags(&prim), PrimFlags::empty()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::FieldTooLong { field: "Data", max: MAX_BODY_LEN, .. }
        ));
    }

    #[test]
    fn test_body_at_limit_accepted() {
        let mut prim = plain_prim();
        let fixed = PREFIX_SIZE + 1 + PrimShape::SIZE + 4;
        prim.texture_entry = vec![0; MAX_BODY_LEN - fixed];
        let block = build_compressed(&prim, compressed_flags(&prim), PrimFlags::empty()).unwrap();
        assert_eq!(block.data.len(), MAX_BODY_LEN);
    }

    #[test]
    fn test_oversize_name_values_rejected() {
        let mut prim = plain_prim();
        prim.name_value = "n".repeat(MAX_NAME_VALUE_LEN + 1);
        let err = build_compressed(&prim, compressed_flags(&prim), PrimFlags::empty()).unwrap_err();
        assert!(matches!(err, BuildError::FieldTooLong { field: "NameValue", .. }));
    }
}
