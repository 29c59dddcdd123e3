//! Interception layer — a delegating wrapper around a normalized record
//!
//! [`NormalizedRecord`] forwards every read and write to the record it owns
//! (through `Deref`/`DerefMut` and the [`Record`] methods) and intercepts only
//! [`Record::serialize`]:
//!
//! 1. every tracked container that is still empty is made absent again,
//! 2. the generated writer runs against that state,
//! 3. the containers made absent in step 1 are refilled.
//!
//! Step 3 runs even when step 1 or 2 fails, so the wrapper never leaves an
//! absent container behind for application code to trip over.
//!
//! Nested records are normalized in place inside the root. A transport that
//! writes a nested record on its own borrows it through
//! [`NormalizedRecord::nested_mut`], which carries the nested part of the
//! plan and runs the same protocol.

use std::ops::{Deref, DerefMut};

use tracing::trace;

use crate::normalizer::RevertPlan;
use crate::record::{Record, Slot};
use crate::shape::{FieldDescriptor, Shape};
use crate::wire::OutputProtocol;
use crate::{Error, Result};

/// A record whose absent containers were replaced by empty ones
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord<R> {
    inner: R,
    plan: RevertPlan,
}

impl<R: Record> NormalizedRecord<R> {
    pub(crate) fn new(inner: R, plan: RevertPlan) -> Self {
        Self { inner, plan }
    }

    pub fn plan(&self) -> &RevertPlan {
        &self.plan
    }

    /// Borrow a present nested record together with its part of the plan
    ///
    /// # Errors
    /// `FieldAccess` if the field is unknown or the nested record is absent,
    /// `InternalConsistency` if the field does not hold a record.
    pub fn nested_mut(&mut self, field: &str) -> Result<NormalizedRef<'_>> {
        nested_handle(&mut self.inner, Some(&self.plan), field)
    }

    /// Run the revert protocol and hand back the bare record
    ///
    /// The result is exactly what the generated writer would observe during
    /// `serialize`.
    pub fn into_inner(mut self) -> Result<R> {
        self.plan.revert(&mut self.inner)?;
        Ok(self.inner)
    }
}

impl<R> Deref for NormalizedRecord<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.inner
    }
}

impl<R> DerefMut for NormalizedRecord<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

impl<R: Record> Record for NormalizedRecord<R> {
    fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    fn fields(&self) -> &[FieldDescriptor] {
        self.inner.fields()
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        self.inner.slot_mut(field)
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        self.inner.write(out)
    }

    fn serialize(&mut self, out: &mut dyn OutputProtocol) -> Result<()> {
        serialize_reverted(&mut self.inner, &self.plan, out)
    }
}

/// Revert, write, refill
fn serialize_reverted(
    record: &mut dyn Record,
    plan: &RevertPlan,
    out: &mut dyn OutputProtocol,
) -> Result<()> {
    let reverted = plan.revert(record)?;
    let written = record.write(out);
    trace!(
        record = record.type_name(),
        reverted = reverted.len(),
        "serialized through revert protocol"
    );
    let restored = RevertPlan::restore(record, &reverted);
    written.and(restored)
}

fn nested_handle<'a>(
    record: &'a mut dyn Record,
    plan: Option<&'a RevertPlan>,
    field: &str,
) -> Result<NormalizedRef<'a>> {
    let type_name = record.type_name().to_string();
    let plan = plan.and_then(|p| p.nested_plan(field));
    match record.slot_mut(field)? {
        Slot::Record(Some(nested)) => Ok(NormalizedRef {
            record: nested,
            plan,
        }),
        Slot::Record(None) => Err(Error::field_access(
            type_name,
            field,
            "nested record is absent",
        )),
        other => Err(Error::inconsistent(
            type_name,
            field,
            Shape::Record,
            other.describe(),
        )),
    }
}

// ── Nested handle ──────────────────────────────────────────

/// A nested record borrowed out of a normalized root
///
/// Serializing it applies only the nested part of the root's plan, so the
/// record goes out exactly as it was before normalization. The root's own
/// serialize is unaffected.
pub struct NormalizedRef<'a> {
    record: &'a mut dyn Record,
    plan: Option<&'a RevertPlan>,
}

impl<'a> NormalizedRef<'a> {
    /// Plan for this record, `None` when nothing below it was substituted
    pub fn plan(&self) -> Option<&RevertPlan> {
        self.plan
    }

    pub fn nested_mut(&mut self, field: &str) -> Result<NormalizedRef<'_>> {
        nested_handle(&mut *self.record, self.plan, field)
    }
}

impl Record for NormalizedRef<'_> {
    fn type_name(&self) -> &str {
        self.record.type_name()
    }

    fn fields(&self) -> &[FieldDescriptor] {
        self.record.fields()
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        self.record.slot_mut(field)
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        self.record.write(out)
    }

    fn serialize(&mut self, out: &mut dyn OutputProtocol) -> Result<()> {
        match self.plan {
            Some(plan) => serialize_reverted(&mut *self.record, plan, out),
            None => self.record.serialize(out),
        }
    }
}

// ── Normalization outcome ──────────────────────────────────

/// Result of [`normalize`](crate::normalize): the record itself when there
/// was nothing to substitute, otherwise the wrapper
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized<R> {
    Unchanged(R),
    Wrapped(NormalizedRecord<R>),
}

impl<R: Record> Normalized<R> {
    pub fn is_wrapped(&self) -> bool {
        matches!(self, Normalized::Wrapped(_))
    }

    pub fn plan(&self) -> Option<&RevertPlan> {
        match self {
            Normalized::Unchanged(_) => None,
            Normalized::Wrapped(w) => Some(w.plan()),
        }
    }

    /// Borrow a present nested record; see [`NormalizedRecord::nested_mut`]
    pub fn nested_mut(&mut self, field: &str) -> Result<NormalizedRef<'_>> {
        match self {
            Normalized::Unchanged(r) => nested_handle(r, None, field),
            Normalized::Wrapped(w) => w.nested_mut(field),
        }
    }

    pub fn wrapped(self) -> Option<NormalizedRecord<R>> {
        match self {
            Normalized::Unchanged(_) => None,
            Normalized::Wrapped(w) => Some(w),
        }
    }

    /// The bare record as the generated writer would see it
    pub fn into_inner(self) -> Result<R> {
        match self {
            Normalized::Unchanged(r) => Ok(r),
            Normalized::Wrapped(w) => w.into_inner(),
        }
    }
}

impl<R> Deref for Normalized<R> {
    type Target = R;

    fn deref(&self) -> &R {
        match self {
            Normalized::Unchanged(r) => r,
            Normalized::Wrapped(w) => &w.inner,
        }
    }
}

impl<R> DerefMut for Normalized<R> {
    fn deref_mut(&mut self) -> &mut R {
        match self {
            Normalized::Unchanged(r) => r,
            Normalized::Wrapped(w) => &mut w.inner,
        }
    }
}

impl<R: Record> Record for Normalized<R> {
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
        match self {
            Normalized::Unchanged(r) => r.serialize(out),
            Normalized::Wrapped(w) => w.serialize(out),
        }
    }
}
