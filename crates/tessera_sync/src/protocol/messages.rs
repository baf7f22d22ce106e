//! # Outbound Messages
//!
//! Update blocks, the message kinds that batch them, and datagram packing.
//!
//! ## Datagram Structure
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │ Kind (1) │ RegionHandle (8) │ TimeDilation (2) │ BlockCount (1)│
//! ├────────────────────────────────────────────────────────────────┤
//! │ Block 0 │ Block 1 │ ... │ Block N-1            (N <= 255)      │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `KillObject` carries no region fields: `Kind (1) │ BlockCount (1)`.

use tessera_core::LocalId;

use crate::error::BuildError;
use crate::protocol::flags::PrimFlags;
use crate::protocol::writer::WireWriter;

/// Most blocks a single datagram can announce.
pub const MAX_BLOCKS_PER_PACKET: usize = u8::MAX as usize;

/// Bandwidth class a message is throttled under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThrottleCategory {
    /// Object updates and kills.
    Task = 0,
    /// Texture downloads.
    Texture = 1,
    /// Terrain patches.
    Land = 2,
    /// Wind layer.
    Wind = 3,
    /// Cloud layer.
    Cloud = 4,
    /// Asset transfers.
    Asset = 5,
    /// Avatar appearance and profile.
    AvatarInfo = 6,
    /// Control messages.
    State = 7,
    /// Unclassified traffic.
    Unknown = 8,
}

/// Message kinds produced by the drain scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Full object updates.
    ObjectUpdate = 12,
    /// Compressed object updates.
    ObjectUpdateCompressed = 13,
    /// Cache checks.
    ObjectUpdateCached = 14,
    /// Terse motion updates.
    ImprovedTerseObjectUpdate = 15,
    /// Entity removals.
    KillObject = 16,
}

impl MessageKind {
    /// Kinds in the order the drain scheduler emits its batches.
    pub const UPDATE_KINDS: [Self; 4] = [
        Self::ObjectUpdate,
        Self::ObjectUpdateCompressed,
        Self::ObjectUpdateCached,
        Self::ImprovedTerseObjectUpdate,
    ];

    /// Returns true if the header carries region handle and time dilation.
    #[inline]
    #[must_use]
    pub const fn has_region_header(self) -> bool {
        !matches!(self, Self::KillObject)
    }

    /// Returns the header size in bytes.
    #[inline]
    #[must_use]
    pub const fn header_len(self) -> usize {
        if self.has_region_header() {
            MessageHeader::SIZE
        } else {
            2
        }
    }
}

/// Header shared by every block of one message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Handle of the region the entities live in.
    pub region_handle: u64,
    /// Quantized time dilation.
    pub time_dilation: u16,
}

impl MessageHeader {
    /// Size of a full update header in bytes.
    pub const SIZE: usize = 12;
}

/// One `ObjectUpdate` block: every field of the entity.
#[derive(Clone, Debug, PartialEq)]
pub struct FullBlock {
    /// Entity the block describes.
    pub local_id: LocalId,
    /// Permission mask written into the block.
    pub update_flags: PrimFlags,
    /// Serialized block.
    pub data: Vec<u8>,
}

/// One `ObjectUpdateCompressed` block.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressedBlock {
    /// Entity the block describes.
    pub local_id: LocalId,
    /// Permission mask, sent beside the body.
    pub update_flags: PrimFlags,
    /// Compressed body.
    pub data: Vec<u8>,
}

/// One `ImprovedTerseObjectUpdate` block.
#[derive(Clone, Debug, PartialEq)]
pub struct TerseBlock {
    /// Entity the block describes.
    pub local_id: LocalId,
    /// Fixed-size motion body (44 bytes for prims, 60 for avatars).
    pub data: Vec<u8>,
    /// Length-prefixed texture entry, or empty.
    pub texture_entry: Vec<u8>,
}

/// One `ObjectUpdateCached` block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedBlock {
    /// Entity the viewer should load from cache.
    pub local_id: LocalId,
    /// Version token the viewer compares against its cached copy.
    pub crc: u32,
    /// Permission mask.
    pub update_flags: PrimFlags,
}

/// A single block of an outbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateBlock {
    /// Full update.
    Full(FullBlock),
    /// Compressed update.
    Compressed(CompressedBlock),
    /// Terse update.
    Terse(TerseBlock),
    /// Cache check.
    Cached(CachedBlock),
    /// Removal.
    Kill(LocalId),
}

impl UpdateBlock {
    /// Returns the entity this block is about.
    #[must_use]
    pub const fn local_id(&self) -> LocalId {
        match self {
            Self::Full(b) => b.local_id,
            Self::Compressed(b) => b.local_id,
            Self::Terse(b) => b.local_id,
            Self::Cached(b) => b.local_id,
            Self::Kill(id) => *id,
        }
    }

    /// Returns the message kind this block belongs in.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Full(_) => MessageKind::ObjectUpdate,
            Self::Compressed(_) => MessageKind::ObjectUpdateCompressed,
            Self::Terse(_) => MessageKind::ImprovedTerseObjectUpdate,
            Self::Cached(_) => MessageKind::ObjectUpdateCached,
            Self::Kill(_) => MessageKind::KillObject,
        }
    }

    /// Returns the permission mask carried by the block, if its layout has one.
    #[must_use]
    pub const fn update_flags(&self) -> Option<PrimFlags> {
        match self {
            Self::Full(b) => Some(b.update_flags),
            Self::Compressed(b) => Some(b.update_flags),
            Self::Cached(b) => Some(b.update_flags),
            Self::Terse(_) | Self::Kill(_) => None,
        }
    }

    /// Returns the encoded size of the block in bytes.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        match self {
            Self::Full(b) => b.data.len(),
            Self::Compressed(b) => 4 + 2 + b.data.len(),
            Self::Terse(b) => 1 + b.data.len() + 2 + b.texture_entry.len(),
            Self::Cached(_) => 12,
            Self::Kill(_) => 4,
        }
    }

    /// Appends the block to a datagram.
    pub fn write_to(&self, writer: &mut WireWriter) -> Result<(), BuildError> {
        match self {
            Self::Full(b) => writer.write_bytes(&b.data),
            Self::Compressed(b) => {
                writer.write_u32(b.update_flags.bits());
                writer.write_var2("Data", &b.data)?;
            }
            Self::Terse(b) => {
                writer.write_var1("Data", &b.data)?;
                writer.write_var2("TextureEntry", &b.texture_entry)?;
            }
            Self::Cached(b) => {
                writer.write_local_id(b.local_id);
                writer.write_u32(b.crc);
                writer.write_u32(b.update_flags.bits());
            }
            Self::Kill(id) => writer.write_local_id(*id),
        }
        Ok(())
    }
}

/// A batch of blocks of one kind, ready for the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundMessage {
    /// Message kind; every block has this kind.
    pub kind: MessageKind,
    /// Shared header.
    pub header: MessageHeader,
    /// Blocks in priority order.
    pub blocks: Vec<UpdateBlock>,
}

impl OutboundMessage {
    /// Creates an empty message.
    #[must_use]
    pub fn new(kind: MessageKind, header: MessageHeader) -> Self {
        Self {
            kind,
            header,
            blocks: Vec::new(),
        }
    }

    /// Returns true if any block refers to `id`.
    #[must_use]
    pub fn references(&self, id: LocalId) -> bool {
        self.blocks.iter().any(|b| b.local_id() == id)
    }

    /// Splits the message into datagrams of at most `mtu` bytes.
    ///
    /// Each datagram repeats the header and holds at most
    /// [`MAX_BLOCKS_PER_PACKET`] blocks. A block too large to share a
    /// datagram is sent alone and may exceed `mtu`.
    pub fn encode_packets(&self, mtu: usize) -> Result<Vec<Vec<u8>>, BuildError> {
        let header_len = self.kind.header_len();
        let mut packets = Vec::new();
        let mut index = 0;

        while index < self.blocks.len() {
            let mut size = header_len;
            let mut end = index;
            while end < self.blocks.len() && end - index < MAX_BLOCKS_PER_PACKET {
                let len = self.blocks[end].wire_len();
                if end > index && size + len > mtu {
                    break;
                }
                size += len;
                end += 1;
            }

            let mut writer = WireWriter::with_capacity(size);
            writer.write_u8(self.kind as u8);
            if self.kind.has_region_header() {
                writer.write_u64(self.header.region_handle);
                writer.write_u16(self.header.time_dilation);
            }
            writer.write_u8(u8::try_from(end - index).unwrap_or(u8::MAX));
            for block in &self.blocks[index..end] {
                block.write_to(&mut writer)?;
            }
            packets.push(writer.into_inner());
            index = end;
        }

        Ok(packets)
    }
}
