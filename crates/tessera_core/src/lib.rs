//! # Tessera Core
//!
//! Shared vocabulary for the Tessera protocol crates:
//! - Fixed-layout math primitives (`Vector3`, `Vector4`, `Quaternion`)
//! - Region-local entity identifiers and entity kinds
//!
//! ## Architecture Rules
//!
//! 1. **Plain old data** - every math type is `Pod` so it can be copied freely
//! 2. **No protocol knowledge** - wire layouts live in `tessera_sync`
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{LocalId, Quaternion, Vector3};
//!
//! let id = LocalId(42);
//! let pos = Vector3::new(128.0, 128.0, 25.0);
//! let rot = Quaternion::IDENTITY;
//! assert!(!id.is_null());
//! assert_eq!(pos.z, 25.0);
//! assert_eq!(rot.w, 1.0);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod entity;
pub mod math;

pub use entity::{AttachmentPoint, EntityKind, LocalId, PCode};
pub use math::{Quaternion, Vector3, Vector4};
