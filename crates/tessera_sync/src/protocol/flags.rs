//! # Protocol Bitsets
//!
//! - [`ChangeFlags`]: what changed on an entity (producer side)
//! - [`CompressedFlags`]: which optional fields a compressed block carries
//! - [`PrimFlags`]: the recipient-relative object/permission mask on the wire

use bitflags::bitflags;

bitflags! {
    /// Independent kinds of entity change a producer can report.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u32 {
        /// Everything; the viewer may not know the entity yet.
        const FULL_UPDATE = 1 << 0;
        /// Position.
        const POSITION = 1 << 1;
        /// Rotation.
        const ROTATION = 1 << 2;
        /// Linear velocity.
        const VELOCITY = 1 << 3;
        /// Linear acceleration.
        const ACCELERATION = 1 << 4;
        /// Angular velocity.
        const ANGULAR_VELOCITY = 1 << 5;
        /// Avatar collision plane.
        const COLLISION_PLANE = 1 << 6;
        /// Object flags (physics, phantom, temporary, ...).
        const PRIM_FLAGS = 1 << 7;
        /// Link parent.
        const PARENT_ID = 1 << 8;
        /// Path/profile shape parameters.
        const SHAPE = 1 << 9;
        /// Generic prim data (scale, code).
        const PRIM_DATA = 1 << 10;
        /// Floating text.
        const TEXT = 1 << 11;
        /// Name-value pairs.
        const NAME_VALUE = 1 << 12;
        /// Extra parameters (flexi, light, sculpt).
        const EXTRA_DATA = 1 << 13;
        /// Texture animation.
        const TEXTURE_ANIM = 1 << 14;
        /// Attached sound.
        const SOUND = 1 << 15;
        /// Particle system.
        const PARTICLES = 1 << 16;
        /// Material.
        const MATERIAL = 1 << 17;
        /// Click action.
        const CLICK_ACTION = 1 << 18;
        /// Media URL.
        const MEDIA_URL = 1 << 19;
        /// Legacy joint data.
        const JOINT = 1 << 20;
        /// Texture entry.
        const TEXTURES = 1 << 21;
    }
}

impl ChangeFlags {
    /// Pure motion; a cached copy can never be current after any of these.
    pub const MOTION: Self = Self::POSITION
        .union(Self::ROTATION)
        .union(Self::VELOCITY)
        .union(Self::ACCELERATION)
        .union(Self::ANGULAR_VELOCITY);

    /// Changes the compressed layout has no room for.
    pub const NOT_COMPRESSIBLE: Self = Self::VELOCITY
        .union(Self::ACCELERATION)
        .union(Self::COLLISION_PLANE)
        .union(Self::JOINT);

    /// Changes the terse layout has no room for.
    pub const NOT_TERSE: Self = Self::PRIM_FLAGS
        .union(Self::PARENT_ID)
        .union(Self::SHAPE)
        .union(Self::PRIM_DATA)
        .union(Self::TEXT)
        .union(Self::NAME_VALUE)
        .union(Self::EXTRA_DATA)
        .union(Self::TEXTURE_ANIM)
        .union(Self::SOUND)
        .union(Self::PARTICLES)
        .union(Self::MATERIAL)
        .union(Self::CLICK_ACTION)
        .union(Self::MEDIA_URL)
        .union(Self::JOINT);
}

bitflags! {
    /// Optional-field presence word of a compressed update block.
    ///
    /// Bit values are fixed by the viewer; field order on the wire follows
    /// `layout::compressed`, not bit order.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompressedFlags: u32 {
        /// Scratch pad bytes follow the tree species.
        const SCRATCH_PAD = 0x01;
        /// Tree species byte present.
        const TREE = 0x02;
        /// Floating text and color present.
        const HAS_TEXT = 0x04;
        /// Particle system present.
        const HAS_PARTICLES = 0x08;
        /// Sound block present.
        const HAS_SOUND = 0x10;
        /// Parent id present.
        const HAS_PARENT = 0x20;
        /// Texture animation present.
        const TEXTURE_ANIMATION = 0x40;
        /// Angular velocity present.
        const HAS_ANGULAR_VELOCITY = 0x80;
        /// Name-value string present.
        const HAS_NAME_VALUES = 0x100;
        /// Media URL present.
        const MEDIA_URL = 0x200;
    }
}

bitflags! {
    /// Object flags as seen by one recipient.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PrimFlags: u32 {
        /// Physical object.
        const PHYSICS = 0x0000_0001;
        /// Freshly rezzed by the recipient and still selected; sent once.
        const CREATE_SELECTED = 0x0000_0002;
        /// Recipient may modify.
        const OBJECT_MODIFY = 0x0000_0004;
        /// Recipient may copy.
        const OBJECT_COPY = 0x0000_0008;
        /// Object has an owner.
        const OBJECT_ANY_OWNER = 0x0000_0010;
        /// Recipient owns the object.
        const OBJECT_YOU_OWNER = 0x0000_0020;
        /// Object contains scripts.
        const SCRIPTED = 0x0000_0040;
        /// Object has a touch handler.
        const TOUCH = 0x0000_0080;
        /// Recipient may move.
        const OBJECT_MOVE = 0x0000_0100;
        /// Object has a money handler.
        const MONEY = 0x0000_0200;
        /// Phantom.
        const PHANTOM = 0x0000_0400;
        /// Inventory is empty.
        const INVENTORY_EMPTY = 0x0000_0800;
        /// Anyone may drop inventory in.
        const ALLOW_INVENTORY_DROP = 0x0001_0000;
        /// Recipient may transfer.
        const OBJECT_TRANSFER = 0x0002_0000;
        /// Group owned.
        const OBJECT_GROUP_OWNED = 0x0004_0000;
        /// Casts shadows.
        const CAST_SHADOWS = 0x0080_0000;
        /// Avatar is flying.
        const FLYING = 0x0800_0000;
        /// Owner may modify.
        const OBJECT_OWNER_MODIFY = 0x1000_0000;
        /// Temporary on rez.
        const TEMPORARY_ON_REZ = 0x2000_0000;
        /// Temporary.
        const TEMPORARY = 0x4000_0000;
    }
}
