//! # Scene Interface
//!
//! The sync layer never owns entities. It sees the scene through
//! [`SceneEntity`], holds queued references as [`EntityHandle`]s, and works
//! on immutable [`EntitySnapshot`]s taken at drain time.
//!
//! ```text
//! scene thread ──Arc<dyn SceneEntity>──► submit ──Weak──► queue
//!                                                          │
//!                          drain: upgrade ─► snapshot ─► classify/build
//! ```
//!
//! Collaborators injected per connection live here too: the priority scorer
//! and the viewer cache oracle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tessera_core::{AttachmentPoint, EntityKind, LocalId, PCode, Quaternion, Vector3, Vector4};
use uuid::Uuid;

use crate::error::SceneError;
use crate::protocol::PrimFlags;

/// Extra parameter kind of a light source.
pub const EXTRA_PARAM_LIGHT: u16 = 0x20;

// =============================================================================
// Snapshot data
// =============================================================================

/// Kinematic state shared by prims and avatars.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ObjectMotion {
    /// Region-relative position (parent-relative when linked or attached).
    pub position: Vector3,
    /// Linear velocity.
    pub velocity: Vector3,
    /// Linear acceleration.
    pub acceleration: Vector3,
    /// Rotation.
    pub rotation: Quaternion,
    /// Angular velocity.
    pub angular_velocity: Vector3,
}

/// Path and profile parameters of a prim shape.
///
/// Serialized as 23 bytes in declaration order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct PrimShape {
    pub path_curve: u8,
    pub profile_curve: u8,
    pub path_begin: u16,
    pub path_end: u16,
    pub path_scale_x: u8,
    pub path_scale_y: u8,
    pub path_shear_x: u8,
    pub path_shear_y: u8,
    pub path_twist: i8,
    pub path_twist_begin: i8,
    pub path_radius_offset: i8,
    pub path_taper_x: i8,
    pub path_taper_y: i8,
    pub path_revolutions: u8,
    pub path_skew: i8,
    pub profile_begin: u16,
    pub profile_end: u16,
    pub profile_hollow: u16,
}

impl PrimShape {
    /// Encoded size in bytes.
    pub const SIZE: usize = 23;

    /// Shape parameters the viewer expects for an avatar.
    pub const AVATAR: Self = Self {
        path_curve: 16,
        profile_curve: 1,
        path_begin: 0,
        path_end: 0,
        path_scale_x: 100,
        path_scale_y: 100,
        path_shear_x: 0,
        path_shear_y: 0,
        path_twist: 0,
        path_twist_begin: 0,
        path_radius_offset: 0,
        path_taper_x: 0,
        path_taper_y: 0,
        path_revolutions: 0,
        path_skew: 0,
        profile_begin: 0,
        profile_end: 0,
        profile_hollow: 0,
    };
}

/// One extra parameter (flexible, light, sculpt, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtraParam {
    /// Parameter kind.
    pub kind: u16,
    /// Opaque parameter data.
    pub data: Vec<u8>,
}

/// Looped or triggered sound attached to a prim.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SoundParams {
    /// Sound asset; nil when the prim plays nothing.
    pub sound_id: Uuid,
    /// Volume.
    pub gain: f32,
    /// Loop/sync flags.
    pub flags: u8,
    /// Audible radius.
    pub radius: f32,
}

/// Point-in-time view of a scene object part.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrimSnapshot {
    /// Region-local id.
    pub local_id: LocalId,
    /// Global id.
    pub full_id: Uuid,
    /// Owning agent.
    pub owner_id: Uuid,
    /// Link or attachment parent; null for root prims.
    pub parent_id: LocalId,
    /// Shape class.
    pub pcode: PCode,
    /// Attachment point; [`AttachmentPoint::NONE`] for in-world prims.
    pub attachment_point: AttachmentPoint,
    /// Change cursor the viewer caches against.
    pub crc: u32,
    /// Material code.
    pub material: u8,
    /// Default click action.
    pub click_action: u8,
    /// Scale.
    pub scale: Vector3,
    /// Kinematic state.
    pub motion: ObjectMotion,
    /// Path/profile parameters.
    pub shape: PrimShape,
    /// Serialized texture entry.
    pub texture_entry: Vec<u8>,
    /// Serialized texture animation; empty when not animated.
    pub texture_anim: Vec<u8>,
    /// Floating text.
    pub text: String,
    /// Floating text color (RGBA).
    pub text_color: [u8; 4],
    /// Media URL.
    pub media_url: String,
    /// Serialized particle system; empty when none.
    pub particle_system: Vec<u8>,
    /// Extra parameters.
    pub extra_params: Vec<ExtraParam>,
    /// Attached sound.
    pub sound: SoundParams,
    /// Name-value pairs, newline separated.
    pub name_value: String,
    /// Tree or grass species; only meaningful for vegetation codes.
    pub tree_species: u8,
    /// Scratch pad bytes; only sent for non-vegetation codes.
    pub scratch_pad: Vec<u8>,
}

impl PrimSnapshot {
    /// Returns true if the prim is worn by an avatar.
    #[inline]
    #[must_use]
    pub const fn is_attachment(&self) -> bool {
        self.attachment_point.0 != AttachmentPoint::NONE.0
    }

    /// Returns true if a light extra parameter is present.
    #[must_use]
    pub fn emits_light(&self) -> bool {
        self.extra_params.iter().any(|p| p.kind == EXTRA_PARAM_LIGHT)
    }

    /// Removes the light extra parameter, if any.
    pub fn strip_light(&mut self) {
        self.extra_params.retain(|p| p.kind != EXTRA_PARAM_LIGHT);
    }

    /// Returns the name-value string the viewer should receive.
    ///
    /// Attachments always carry their item id so the viewer can match them
    /// to inventory.
    #[must_use]
    pub fn effective_name_value(&self) -> String {
        if self.is_attachment() && self.name_value.is_empty() {
            format!("AttachItemID STRING RW SV {}", self.full_id)
        } else {
            self.name_value.clone()
        }
    }
}

/// Point-in-time view of an avatar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AvatarSnapshot {
    /// Region-local id.
    pub local_id: LocalId,
    /// Agent id.
    pub full_id: Uuid,
    /// Seat; null when standing.
    pub parent_id: LocalId,
    /// Kinematic state.
    pub motion: ObjectMotion,
    /// Plane the avatar is standing on; zero means none.
    pub collision_plane: Vector4,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Active group title.
    pub group_title: String,
    /// Serialized appearance texture entry.
    pub texture_entry: Vec<u8>,
}

impl AvatarSnapshot {
    /// Returns the collision plane to put on the wire.
    #[inline]
    #[must_use]
    pub fn wire_collision_plane(&self) -> Vector4 {
        if self.collision_plane == Vector4::ZERO {
            Vector4::UNIT_W
        } else {
            self.collision_plane
        }
    }

    /// Returns the name-value string announcing the avatar's names.
    #[must_use]
    pub fn name_value(&self) -> String {
        format!(
            "FirstName STRING RW SV {}\nLastName STRING RW SV {}\nTitle STRING RW SV {}",
            self.first_name, self.last_name, self.group_title
        )
    }
}

/// Snapshot of either entity kind.
#[derive(Clone, Debug, PartialEq)]
pub enum EntitySnapshot {
    /// Avatar.
    Avatar(AvatarSnapshot),
    /// Scene object part.
    Prim(Box<PrimSnapshot>),
}

impl EntitySnapshot {
    /// Returns the entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Avatar(_) => EntityKind::Avatar,
            Self::Prim(_) => EntityKind::Prim,
        }
    }

    /// Returns the region-local id.
    #[must_use]
    pub fn local_id(&self) -> LocalId {
        match self {
            Self::Avatar(a) => a.local_id,
            Self::Prim(p) => p.local_id,
        }
    }

    /// Returns the global id.
    #[must_use]
    pub fn full_id(&self) -> Uuid {
        match self {
            Self::Avatar(a) => a.full_id,
            Self::Prim(p) => p.full_id,
        }
    }

    /// Returns the owning agent; an avatar owns itself.
    #[must_use]
    pub fn owner_id(&self) -> Uuid {
        match self {
            Self::Avatar(a) => a.full_id,
            Self::Prim(p) => p.owner_id,
        }
    }

    /// Returns the change cursor; avatars are never cached and report 0.
    #[must_use]
    pub fn crc(&self) -> u32 {
        match self {
            Self::Avatar(_) => 0,
            Self::Prim(p) => p.crc,
        }
    }

    /// Returns the kinematic state.
    #[must_use]
    pub fn motion(&self) -> &ObjectMotion {
        match self {
            Self::Avatar(a) => &a.motion,
            Self::Prim(p) => &p.motion,
        }
    }
}

// =============================================================================
// Entity trait and handles
// =============================================================================

/// One-shot "newly created and still selected" marker.
///
/// Set when a prim is rezzed; the first update built for the owner carries
/// `CreateSelected` and clears it.
#[derive(Debug, Default)]
pub struct CreateSelectedMarker(AtomicBool);

impl CreateSelectedMarker {
    /// Creates a marker in the given state.
    #[must_use]
    pub const fn new(selected: bool) -> Self {
        Self(AtomicBool::new(selected))
    }

    /// Arms the marker again.
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true if the marker is armed.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clears the marker if armed and `recipient` is the owner.
    ///
    /// Returns true for exactly one caller per arming.
    pub fn take_if_selected_and_owner(&self, owner: &Uuid, recipient: &Uuid) -> bool {
        owner == recipient
            && self
                .0
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

/// A world entity as seen by the sync layer.
pub trait SceneEntity: Send + Sync {
    /// Region-local id.
    fn local_id(&self) -> LocalId;

    /// Entity kind.
    fn kind(&self) -> EntityKind;

    /// Returns true if the entity is worn by an avatar.
    fn is_attachment(&self) -> bool {
        false
    }

    /// Takes a consistent snapshot of the entity.
    fn snapshot(&self) -> Result<EntitySnapshot, SceneError>;

    /// Object flags as seen by `recipient`.
    ///
    /// Any `CreateSelected` bit in the result is ignored; that bit comes from
    /// [`SceneEntity::create_selected`].
    fn object_flags(&self, recipient: &Uuid) -> PrimFlags;

    /// One-shot creation marker, for entities that have one.
    fn create_selected(&self) -> Option<&CreateSelectedMarker> {
        None
    }
}

/// Non-owning reference to a queued entity.
#[derive(Clone)]
pub struct EntityHandle {
    local_id: LocalId,
    entity: Weak<dyn SceneEntity>,
}

impl EntityHandle {
    /// Creates a handle to `entity`.
    #[must_use]
    pub fn new(entity: &Arc<dyn SceneEntity>) -> Self {
        Self {
            local_id: entity.local_id(),
            entity: Arc::downgrade(entity),
        }
    }

    /// Returns the id captured when the handle was made.
    #[inline]
    #[must_use]
    pub const fn local_id(&self) -> LocalId {
        self.local_id
    }

    /// Returns the entity if the scene still holds it.
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<dyn SceneEntity>> {
        self.entity.upgrade()
    }
}

impl std::fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHandle")
            .field("local_id", &self.local_id)
            .field("alive", &(self.entity.strong_count() > 0))
            .finish()
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Computes the priority of an entity for one viewer.
pub trait PriorityScorer: Send + Sync {
    /// Returns the priority of `entity` for `recipient`.
    fn score(&self, recipient: &Uuid, entity: &dyn SceneEntity) -> f64;
}

impl<F> PriorityScorer for F
where
    F: Fn(&Uuid, &dyn SceneEntity) -> f64 + Send + Sync,
{
    fn score(&self, recipient: &Uuid, entity: &dyn SceneEntity) -> f64 {
        self(recipient, entity)
    }
}

/// Scores every entity the same; updates drain in submission order.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformPriority;

impl PriorityScorer for UniformPriority {
    fn score(&self, _recipient: &Uuid, _entity: &dyn SceneEntity) -> f64 {
        0.0
    }
}

/// Knows which entity versions the viewer already has cached.
pub trait CacheOracle: Send + Sync {
    /// Returns true if the viewer's cached copy of `local_id` at `crc` is
    /// current.
    fn use_cached(&self, recipient: &Uuid, local_id: LocalId, crc: u32) -> bool;
}

impl<F> CacheOracle for F
where
    F: Fn(&Uuid, LocalId, u32) -> bool + Send + Sync,
{
    fn use_cached(&self, recipient: &Uuid, local_id: LocalId, crc: u32) -> bool {
        self(recipient, local_id, crc)
    }
}

// =============================================================================
// In-memory entity
// =============================================================================

/// Scene entity backed by a stored snapshot.
///
/// Used by the soak binary and benchmarks, and by hosts whose scene already
/// keeps a serializable copy of each entity.
#[derive(Debug)]
pub struct SnapshotEntity {
    local_id: LocalId,
    kind: EntityKind,
    is_attachment: bool,
    state: RwLock<EntitySnapshot>,
    flags: RwLock<PrimFlags>,
    broken: RwLock<Option<String>>,
    create_selected: Option<CreateSelectedMarker>,
}

impl SnapshotEntity {
    /// Creates a prim entity.
    #[must_use]
    pub fn prim(snapshot: PrimSnapshot) -> Self {
        Self {
            local_id: snapshot.local_id,
            kind: EntityKind::Prim,
            is_attachment: snapshot.is_attachment(),
            state: RwLock::new(EntitySnapshot::Prim(Box::new(snapshot))),
            flags: RwLock::new(PrimFlags::OBJECT_ANY_OWNER),
            broken: RwLock::new(None),
            create_selected: None,
        }
    }

    /// Creates an avatar entity.
    #[must_use]
    pub fn avatar(snapshot: AvatarSnapshot) -> Self {
        Self {
            local_id: snapshot.local_id,
            kind: EntityKind::Avatar,
            is_attachment: false,
            state: RwLock::new(EntitySnapshot::Avatar(snapshot)),
            flags: RwLock::new(PrimFlags::PHYSICS),
            broken: RwLock::new(None),
            create_selected: None,
        }
    }

    /// Gives the entity an armed creation marker.
    #[must_use]
    pub fn with_create_selected(mut self) -> Self {
        self.create_selected = Some(CreateSelectedMarker::new(true));
        self
    }

    /// Replaces the base object flags.
    #[must_use]
    pub fn with_flags(self, flags: PrimFlags) -> Self {
        *self.flags.write() = flags;
        self
    }

    /// Wraps the entity for submission.
    #[must_use]
    pub fn into_shared(self) -> Arc<dyn SceneEntity> {
        Arc::new(self)
    }

    /// Mutates the stored snapshot.
    pub fn update(&self, f: impl FnOnce(&mut EntitySnapshot)) {
        f(&mut self.state.write());
    }

    /// Moves the entity.
    pub fn set_position(&self, position: Vector3) {
        self.update(|snapshot| match snapshot {
            EntitySnapshot::Avatar(a) => a.motion.position = position,
            EntitySnapshot::Prim(p) => p.motion.position = position,
        });
    }

    /// Makes every later snapshot fail with [`SceneError::Inconsistent`].
    pub fn mark_inconsistent(&self, reason: impl Into<String>) {
        *self.broken.write() = Some(reason.into());
    }
}

impl SceneEntity for SnapshotEntity {
    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn is_attachment(&self) -> bool {
        self.is_attachment
    }

    fn snapshot(&self) -> Result<EntitySnapshot, SceneError> {
        if let Some(reason) = self.broken.read().as_ref() {
            return Err(SceneError::Inconsistent {
                local_id: self.local_id,
                reason: reason.clone(),
            });
        }
        Ok(self.state.read().clone())
    }

    fn object_flags(&self, recipient: &Uuid) -> PrimFlags {
        let mut flags = *self.flags.read();
        if self.state.read().owner_id() == *recipient {
            flags |= PrimFlags::OBJECT_YOU_OWNER
                | PrimFlags::OBJECT_MODIFY
                | PrimFlags::OBJECT_MOVE
                | PrimFlags::OBJECT_COPY
                | PrimFlags::OBJECT_TRANSFER
                | PrimFlags::OBJECT_OWNER_MODIFY;
        }
        flags
    }

    fn create_selected(&self) -> Option<&CreateSelectedMarker> {
        self.create_selected.as_ref()
    }
}
