//! # Update Protocol
//!
//! Everything that touches bytes: the quantization codec, the little-endian
//! writer, the bitsets carried on the wire, and the message/block types.
//!
//! ## Design Philosophy
//!
//! - Every byte counts; motion is quantized to 16 bits per component
//! - No self-describing tags; encoder and decoder agree on field order
//! - Length-prefixed fields that overflow are errors; display strings are
//!   clipped to their wire maximum

pub mod quantize;
mod flags;
mod messages;
mod writer;

pub use flags::{ChangeFlags, CompressedFlags, PrimFlags};
pub use messages::{
    CachedBlock, CompressedBlock, FullBlock, MessageHeader, MessageKind, OutboundMessage,
    TerseBlock, ThrottleCategory, UpdateBlock, MAX_BLOCKS_PER_PACKET,
};
pub use writer::{cstring_payload, truncate_utf8, WireReader, WireWriter};
