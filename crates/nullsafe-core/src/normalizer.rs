//! Normalizer — substitutes empty containers for absent collection fields
//!
//! Traversal is depth-first over the record's declared instance fields:
//!
//! - absent container field → empty container of the same category, and a
//!   [`RevertEntry`] so the field can be re-absented at serialize time
//! - present container field (even an empty one) → untouched
//! - present nested record → normalized in place, its plan attached under the
//!   field name
//! - absent nested record, scalar → untouched
//!
//! The revert protocol is the inverse, run by the interception layer right
//! before the generated writer sees the record.
//!
//! # Guarantees
//!
//! - **Identity**: a record with nothing to substitute is returned unwrapped
//! - **Fidelity**: serializing the wrapper emits the same events as
//!   serializing the untouched record, unless elements were added since
//! - **Repeatable**: serializing twice without mutation emits identical output

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::record::{FieldPath, Record, Slot};
use crate::shape::{ContainerKind, FieldDescriptor, Shape};
use crate::wrapper::{Normalized, NormalizedRecord};
use crate::{Error, Result};

// ── Revert plan ────────────────────────────────────────────

/// A container field that was absent before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevertEntry {
    pub field: FieldDescriptor,
    pub kind: ContainerKind,
}

/// Revert entries for one record, plus the plans of its nested records
///
/// Nested plans are only kept when non-empty, so an empty plan means nothing
/// anywhere below this record was substituted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevertPlan {
    entries: Vec<RevertEntry>,
    nested: Vec<(FieldDescriptor, RevertPlan)>,
}

impl RevertPlan {
    /// Entries for the record's direct fields
    pub fn entries(&self) -> &[RevertEntry] {
        &self.entries
    }

    pub fn nested_plan(&self, field: &str) -> Option<&RevertPlan> {
        self.nested
            .iter()
            .find(|(f, _)| f.name() == field)
            .map(|(_, plan)| plan)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.nested.is_empty()
    }

    /// Total number of tracked fields, nested ones included
    pub fn len(&self) -> usize {
        self.entries.len() + self.nested.iter().map(|(_, p)| p.len()).sum::<usize>()
    }

    /// Dotted paths of every tracked field, depth-first in declaration order
    pub fn paths(&self) -> Vec<FieldPath> {
        let mut out = Vec::with_capacity(self.len());
        self.collect_paths(&FieldPath::root(), &mut out);
        out
    }

    fn collect_paths(&self, base: &FieldPath, out: &mut Vec<FieldPath>) {
        for entry in &self.entries {
            out.push(base.child(entry.field.name()));
        }
        for (field, plan) in &self.nested {
            plan.collect_paths(&base.child(field.name()), out);
        }
    }

    /// Re-absent every tracked container of `record` that is still empty
    ///
    /// Returns the paths actually made absent, to be handed to
    /// [`RevertPlan::restore`] once the record has been written. If the pass
    /// fails halfway, the fields reverted so far are refilled before the
    /// error is returned.
    pub fn revert(&self, record: &mut dyn Record) -> Result<Vec<FieldPath>> {
        let mut reverted = Vec::new();
        match revert_tree(record, self, &FieldPath::root(), &mut reverted) {
            Ok(()) => Ok(reverted),
            Err(err) => {
                if let Err(undo) = restore_paths(record, &reverted) {
                    warn!(error = %undo, "could not refill after a failed revert");
                }
                Err(err)
            }
        }
    }

    /// Refill the fields a [`RevertPlan::revert`] pass made absent
    pub fn restore(record: &mut dyn Record, reverted: &[FieldPath]) -> Result<()> {
        restore_paths(record, reverted)
    }
}

// ── Public API ─────────────────────────────────────────────

/// Normalize a record, wrapping it only if something was substituted
///
/// # Errors
/// Returns `FieldAccess` if a declared field cannot be reached, or
/// `InternalConsistency` if a field's live value contradicts its declared
/// shape.
pub fn normalize<R: Record>(mut record: R) -> Result<Normalized<R>> {
    let plan = normalize_in_place(&mut record)?;
    if plan.is_empty() {
        debug!(record = record.type_name(), "no absent containers, passing through");
        return Ok(Normalized::Unchanged(record));
    }
    debug!(
        record = record.type_name(),
        tracked = plan.len(),
        "wrapping normalized record"
    );
    Ok(Normalized::Wrapped(NormalizedRecord::new(record, plan)))
}

/// Substitute empty containers in place and return the revert plan
///
/// This is the traversal without the wrapping step. Callers that serialize
/// the record themselves run [`RevertPlan::revert`] before the write and
/// [`RevertPlan::restore`] after it.
pub fn normalize_in_place(record: &mut dyn Record) -> Result<RevertPlan> {
    let type_name = record.type_name().to_string();
    let fields = record.fields().to_vec();
    let mut plan = RevertPlan::default();

    for field in fields {
        match field.shape {
            Shape::Scalar => {}
            Shape::Record => match record.slot_mut(field.name())? {
                Slot::Record(Some(nested)) => {
                    let nested_plan = normalize_in_place(nested)?;
                    if !nested_plan.is_empty() {
                        plan.nested.push((field, nested_plan));
                    }
                }
                Slot::Record(None) => {}
                other => {
                    return Err(Error::inconsistent(
                        type_name,
                        field.name(),
                        Shape::Record,
                        other.describe(),
                    ))
                }
            },
            Shape::Container(kind) => match record.slot_mut(field.name())? {
                Slot::Container(mut container) => {
                    if container.kind() != kind {
                        return Err(Error::inconsistent(
                            type_name,
                            field.name(),
                            kind,
                            container.kind(),
                        ));
                    }
                    if container.is_absent() {
                        container.fill_empty();
                        trace!(
                            record = %type_name,
                            field = field.name(),
                            %kind,
                            "substituted empty container"
                        );
                        plan.entries.push(RevertEntry { field, kind });
                    }
                }
                other => {
                    return Err(Error::inconsistent(
                        type_name,
                        field.name(),
                        kind,
                        other.describe(),
                    ))
                }
            },
        }
    }

    Ok(plan)
}

// ── Revert protocol ────────────────────────────────────────

/// Re-absent tracked containers that are still empty, depth-first
///
/// Paths of the fields actually made absent are appended to `reverted`, also
/// when an error cuts the pass short, so the caller can undo them.
fn revert_tree(
    record: &mut dyn Record,
    plan: &RevertPlan,
    base: &FieldPath,
    reverted: &mut Vec<FieldPath>,
) -> Result<()> {
    let type_name = record.type_name().to_string();

    for entry in &plan.entries {
        let name = entry.field.name();
        match record.slot_mut(name)? {
            Slot::Container(mut container) => {
                if container.kind() != entry.kind {
                    return Err(Error::inconsistent(
                        type_name,
                        name,
                        entry.kind,
                        container.kind(),
                    ));
                }
                // Absent already: the caller cleared it, nothing to undo later.
                if container.len() == Some(0) {
                    container.make_absent();
                    trace!(record = %type_name, field = name, "reverted empty container");
                    reverted.push(base.child(name));
                }
            }
            other => {
                return Err(Error::inconsistent(
                    type_name,
                    name,
                    entry.kind,
                    other.describe(),
                ))
            }
        }
    }

    for (field, nested_plan) in &plan.nested {
        let name = field.name();
        match record.slot_mut(name)? {
            Slot::Record(Some(nested)) => {
                revert_tree(nested, nested_plan, &base.child(name), reverted)?;
            }
            Slot::Record(None) => {
                trace!(record = %type_name, field = name, "nested record removed since normalization");
            }
            other => {
                return Err(Error::inconsistent(
                    type_name,
                    name,
                    Shape::Record,
                    other.describe(),
                ))
            }
        }
    }

    Ok(())
}

fn restore_paths(record: &mut dyn Record, reverted: &[FieldPath]) -> Result<()> {
    for path in reverted {
        refill(record, path.segments())?;
    }
    Ok(())
}

fn refill(record: &mut dyn Record, segments: &[String]) -> Result<()> {
    let type_name = record.type_name().to_string();
    match segments {
        [] => Ok(()),
        [last] => match record.slot_mut(last)? {
            Slot::Container(mut container) => {
                container.fill_empty();
                Ok(())
            }
            other => Err(Error::inconsistent(
                type_name,
                last.as_str(),
                "container",
                other.describe(),
            )),
        },
        [head, rest @ ..] => match record.slot_mut(head)? {
            Slot::Record(Some(nested)) => refill(nested, rest),
            other => Err(Error::inconsistent(
                type_name,
                head.as_str(),
                Shape::Record,
                other.describe(),
            )),
        },
    }
}
