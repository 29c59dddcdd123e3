//! nullsafe core - null-safe collections for IDL-generated records
//!
//! Generated records leave unset collection fields absent, so application
//! code has to guard every list, set, and map before touching it. This crate
//! replaces absent collections with empty ones, and puts them back to absent
//! right before the record is serialized, so the wire bytes never change.
//!
//! # Architecture
//!
//! ```text
//! Record → normalize → NormalizedRecord ── reads/writes ──→ Record
//!                            │
//!                        serialize → revert empty → write → refill
//! ```
//!
//! # Guarantees
//!
//! - **Non-absent**: every container field absent at normalization reads as
//!   an empty container afterwards, nested records included
//! - **Wire-faithful**: `serialize(normalize(r))` emits what `serialize(r)`
//!   would have, unless elements were added in between
//! - **Identity**: records with nothing to substitute come back unwrapped
//!
//! # Example
//!
//! ```
//! use nullsafe_core::{normalize, wire, Schema};
//!
//! let schema = Schema::from_json(r#"{
//!   "records": { "Note": { "fields": [
//!     { "id": 1, "name": "tags", "type": { "list": "string" } }
//!   ] } }
//! }"#)?;
//! let note = schema.instantiate("Note")?;
//! let before = wire::to_bytes(&mut note.clone())?;
//!
//! let mut note = normalize(note)?;
//! assert_eq!(note.get("tags").and_then(|v| v.element_count()), Some(0));
//! assert_eq!(wire::to_bytes(&mut note)?, before);
//! # Ok::<(), nullsafe_core::Error>(())
//! ```

pub mod dynamic;
pub mod error;
pub mod normalizer;
pub mod record;
pub mod shape;
pub mod wire;
pub mod wrapper;

pub use dynamic::{DynamicRecord, FieldType, Schema, Value};
pub use error::{Error, Result};
pub use normalizer::{normalize, normalize_in_place, RevertEntry, RevertPlan};
pub use record::{unknown_field, FieldPath, Record, Slot};
pub use shape::{classify, Container, ContainerKind, DeclaredShape, FieldDescriptor, Shape};
pub use wrapper::{Normalized, NormalizedRecord, NormalizedRef};
