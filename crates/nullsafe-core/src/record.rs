//! The record contract every IDL-generated type implements
//!
//! A generated record exposes three things to the normalizer:
//!
//! 1. an accessor table of its instance fields ([`Record::fields`]),
//! 2. mutable access to each field's current value ([`Record::slot_mut`]),
//! 3. a write operation driving an [`OutputProtocol`] ([`Record::write`]).
//!
//! [`Record::serialize`] is the single distinguished trigger that transports
//! call. Plain records forward it to `write`; the interception layer
//! overrides it.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::shape::{Container, FieldDescriptor};
use crate::wire::OutputProtocol;
use crate::{Error, Result};

/// Mutable handle on the current value of one field
pub enum Slot<'a> {
    Scalar,
    /// Nested record; `None` while the field is absent
    Record(Option<&'a mut dyn Record>),
    Container(Box<dyn Container + 'a>),
}

impl<'a> Slot<'a> {
    pub fn container<C: Container + 'a>(container: C) -> Self {
        Slot::Container(Box::new(container))
    }

    pub fn record<R: Record + 'a>(record: Option<&'a mut R>) -> Self {
        Slot::Record(record.map(|r| r as &mut dyn Record))
    }

    /// Name of the shape this slot actually has, for diagnostics
    pub fn describe(&self) -> String {
        match self {
            Slot::Scalar => "scalar".to_string(),
            Slot::Record(_) => "record".to_string(),
            Slot::Container(c) => c.kind().to_string(),
        }
    }
}

impl fmt::Debug for Slot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Scalar => write!(f, "Slot::Scalar"),
            Slot::Record(r) => write!(
                f,
                "Slot::Record({})",
                r.as_ref().map_or("absent", |r| r.type_name())
            ),
            Slot::Container(c) => write!(f, "Slot::Container({}, len={:?})", c.kind(), c.len()),
        }
    }
}

/// Contract of a generator-produced structured type
pub trait Record {
    /// Generated type name, used in diagnostics and struct headers
    fn type_name(&self) -> &str;

    /// Instance fields in declaration order
    fn fields(&self) -> &[FieldDescriptor];

    /// Mutable access to the current value of the named field
    ///
    /// Unknown names must fail with [`Error::FieldAccess`].
    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>>;

    /// Generated serializer: emit the record's current state as-is
    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()>;

    /// Serialize trigger called by transports
    fn serialize(&mut self, out: &mut dyn OutputProtocol) -> Result<()> {
        self.write(out)
    }
}

impl<R: Record + ?Sized> Record for Box<R> {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn fields(&self) -> &[FieldDescriptor] {
        (**self).fields()
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        (**self).slot_mut(field)
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        (**self).write(out)
    }

    fn serialize(&mut self, out: &mut dyn OutputProtocol) -> Result<()> {
        (**self).serialize(out)
    }
}

/// Error for a field name that the record does not declare
pub fn unknown_field(record: &dyn Record, field: &str) -> Error {
    Error::field_access(record.type_name(), field, "no such field")
}

// ── Field paths ────────────────────────────────────────────

/// Dotted path from a root record to a field, e.g. `attributes.classifications`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, field: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(field.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        write!(f, "{}", self.0.join("."))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
