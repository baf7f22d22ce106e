//! # Wire Serialization
//!
//! Little-endian writer and reader for update block bodies.
//!
//! ## Design
//!
//! - Writers grow a `Vec<u8>`; a block's final size is only known once its
//!   optional fields are decided
//! - Length-prefixed fields come in two widths, `var1` (u8 length) and
//!   `var2` (u16 length); a field that overflows its prefix is a
//!   [`BuildError`]. Display strings (floating text, media URL) are clipped
//!   by the layouts before they get here
//! - C strings end at their first NUL; anything after an embedded NUL is
//!   dropped so the terminator the reader finds is the one written
//! - Quaternions are written packed: canonical `x, y, z` only

use tessera_core::{LocalId, Quaternion, Vector3, Vector4};
use uuid::Uuid;

use crate::error::BuildError;

/// Growable little-endian writer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Creates a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning its buffer.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a signed byte.
    #[inline]
    pub fn write_i8(&mut self, value: i8) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u16.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes an f32.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes with no length prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Writes a local id.
    #[inline]
    pub fn write_local_id(&mut self, id: LocalId) {
        self.write_u32(id.0);
    }

    /// Writes a UUID in network (big-endian byte) order.
    #[inline]
    pub fn write_uuid(&mut self, id: &Uuid) {
        self.buffer.extend_from_slice(id.as_bytes());
    }

    /// Writes a vector as three f32.
    #[inline]
    pub fn write_vector3(&mut self, v: Vector3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    /// Writes a vector as four f32.
    #[inline]
    pub fn write_vector4(&mut self, v: Vector4) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
        self.write_f32(v.w);
    }

    /// Writes a rotation packed into 12 bytes.
    #[inline]
    pub fn write_quaternion_packed(&mut self, q: Quaternion) {
        let q = q.canonical();
        self.write_f32(q.x);
        self.write_f32(q.y);
        self.write_f32(q.z);
    }

    /// Writes a NUL-terminated string, cut at any embedded NUL.
    #[inline]
    pub fn write_cstring(&mut self, s: &str) {
        self.buffer.extend_from_slice(cstring_payload(s).as_bytes());
        self.buffer.push(0);
    }

    /// Writes a u32 at an already written offset.
    ///
    /// Used to back-patch header words whose value depends on what followed.
    #[inline]
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes a field with a one-byte length prefix.
    pub fn write_var1(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), BuildError> {
        let len = u8::try_from(bytes.len()).map_err(|_| BuildError::FieldTooLong {
            field,
            len: bytes.len(),
            max: usize::from(u8::MAX),
        })?;
        self.write_u8(len);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Writes a field with a two-byte length prefix.
    pub fn write_var2(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), BuildError> {
        let len = u16::try_from(bytes.len()).map_err(|_| BuildError::FieldTooLong {
            field,
            len: bytes.len(),
            max: usize::from(u16::MAX),
        })?;
        self.write_u16(len);
        self.write_bytes(bytes);
        Ok(())
    }

    /// Writes a field with a four-byte length prefix.
    pub fn write_len32(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), BuildError> {
        let len = u32::try_from(bytes.len()).map_err(|_| BuildError::FieldTooLong {
            field,
            len: bytes.len(),
            max: u32::MAX as usize,
        })?;
        self.write_u32(len);
        self.write_bytes(bytes);
        Ok(())
    }
}

/// Little-endian reader over a received or built block.
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a new reader.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns the current offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Reads `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.position + n > self.buffer.len() {
            return None;
        }
        let slice = &self.buffer[self.position..self.position + n];
        self.position += n;
        Some(slice)
    }

    /// Reads a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Some(out)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    /// Reads a u16.
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32.
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a u64.
    pub fn read_u64(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads an f32.
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a UUID.
    pub fn read_uuid(&mut self) -> Option<Uuid> {
        self.read_array().map(Uuid::from_bytes)
    }

    /// Reads three f32.
    pub fn read_vector3(&mut self) -> Option<Vector3> {
        Some(Vector3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Reads a packed rotation.
    pub fn read_quaternion_packed(&mut self) -> Option<Quaternion> {
        let v = self.read_vector3()?;
        Some(Quaternion::from_xyz(v.x, v.y, v.z))
    }

    /// Reads a NUL-terminated string.
    pub fn read_cstring(&mut self) -> Option<&'a str> {
        let rest = &self.buffer[self.position.min(self.buffer.len())..];
        let end = rest.iter().position(|&b| b == 0)?;
        let s = std::str::from_utf8(&rest[..end]).ok()?;
        self.position += end + 1;
        Some(s)
    }

    /// Reads a one-byte length-prefixed field.
    pub fn read_var1(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u8()?;
        self.read_bytes(usize::from(len))
    }

    /// Reads a two-byte length-prefixed field.
    pub fn read_var2(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u16()?;
        self.read_bytes(usize::from(len))
    }

    /// Reads a four-byte length-prefixed field.
    pub fn read_len32(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u32()?;
        self.read_bytes(usize::try_from(len).ok()?)
    }
}

/// Returns the part of `s` before its first NUL.
#[inline]
#[must_use]
pub fn cstring_payload(s: &str) -> &str {
    s.find('\0').map_or(s, |end| &s[..end])
}

/// Truncates `s` to at most `max` bytes without splitting a character.
#[must_use]
pub fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_layout() {
        let mut writer = WireWriter::default();
        writer.write_u16(0x0102);
        writer.write_u32(0x0304_0506);
        assert_eq!(writer.as_slice(), &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn test_var_fields_reject_oversize() {
        let mut writer = WireWriter::default();
        assert!(writer.write_var1("Text", &[0u8; 255]).is_ok());
        let err = writer.write_var1("Text", &[0u8; 256]).unwrap_err();
        assert_eq!(
            err,
            BuildError::FieldTooLong { field: "Text", len: 256, max: 255 }
        );
        assert!(writer.write_var2("TextureEntry", &vec![0u8; 70_000]).is_err());
    }

    #[test]
    fn test_reader_follows_writer() {
        let id = Uuid::from_u128(0x1234_5678_9abc_def0_1122_3344_5566_7788);
        let mut writer = WireWriter::default();
        writer.write_uuid(&id);
        writer.write_cstring("hello");
        writer.write_var2("Data", b"abc").unwrap();
        writer.write_quaternion_packed(Quaternion::new(0.0, 0.0, 0.6, -0.8));

        let mut reader = WireReader::new(writer.as_slice());
        assert_eq!(reader.read_uuid(), Some(id));
        assert_eq!(reader.read_cstring(), Some("hello"));
        assert_eq!(reader.read_var2(), Some(&b"abc"[..]));
        let q = reader.read_quaternion_packed().unwrap();
        assert!((q.z + 0.6).abs() < 1e-6);
        assert!((q.w - 0.8).abs() < 1e-5);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u8().is_none());
    }

    #[test]
    fn test_patch_u32() {
        let mut writer = WireWriter::default();
        writer.write_u32(0);
        writer.write_u8(9);
        writer.patch_u32(0, 0xdead_beef);
        assert_eq!(WireReader::new(writer.as_slice()).read_u32(), Some(0xdead_beef));
    }

    #[test]
    fn test_cstring_stops_at_embedded_nul() {
        let mut writer = WireWriter::default();
        writer.write_cstring("ab\0cd");
        writer.write_u8(7);
        assert_eq!(writer.as_slice(), b"ab\0\x07");

        let mut reader = WireReader::new(writer.as_slice());
        assert_eq!(reader.read_cstring(), Some("ab"));
        assert_eq!(reader.read_u8(), Some(7));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncate_utf8_respects_char_boundary() {
        assert_eq!(truncate_utf8("abc", 10), "abc");
        assert_eq!(truncate_utf8("héllo", 2), "h");
        assert_eq!(truncate_utf8("héllo", 3), "hé");
    }
}
