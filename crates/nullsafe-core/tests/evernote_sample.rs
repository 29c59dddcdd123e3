//! Integration tests against hand-written records shaped like generator output
//!
//! `Note`, `NoteAttributes`, and `Resource` mirror what an IDL compiler emits
//! for a small note-taking schema: every field optional, collections as
//! `Option<container>`, nested structs as `Option<Box<_>>`.

use std::collections::{BTreeMap, BTreeSet};

use nullsafe_core::wire::{self, OutputProtocol, WireElement, WireType};
use nullsafe_core::{
    normalize, normalize_in_place, unknown_field, ContainerKind, DeclaredShape, Error,
    FieldDescriptor, Record, Result, RevertPlan, Shape, Slot,
};

// ── Sample generated records ──────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
struct Resource {
    guid: Option<String>,
    width: Option<i16>,
}

const RESOURCE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::of::<Option<String>>(1, "guid"),
    FieldDescriptor::of::<Option<i16>>(2, "width"),
];

impl DeclaredShape for Resource {
    const SHAPE: Shape = Shape::Record;
}

impl Record for Resource {
    fn type_name(&self) -> &str {
        "Resource"
    }

    fn fields(&self) -> &[FieldDescriptor] {
        RESOURCE_FIELDS
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        match field {
            "guid" | "width" => Ok(Slot::Scalar),
            _ => Err(unknown_field(self, field)),
        }
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin("Resource")?;
        if let Some(guid) = &self.guid {
            out.write_field_begin("guid", WireType::String, 1)?;
            out.write_string(guid)?;
            out.write_field_end()?;
        }
        if let Some(width) = self.width {
            out.write_field_begin("width", WireType::I16, 2)?;
            out.write_i16(width)?;
            out.write_field_end()?;
        }
        out.write_field_stop()?;
        out.write_struct_end()
    }
}

impl WireElement for Resource {
    const WIRE_TYPE: WireType = WireType::Struct;

    fn write_element(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        self.write(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct NoteAttributes {
    author: Option<String>,
    classifications: Option<BTreeMap<String, String>>,
    reminder_order: Option<i64>,
}

const NOTE_ATTRIBUTES_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::of::<Option<String>>(1, "author"),
    FieldDescriptor::of::<Option<BTreeMap<String, String>>>(2, "classifications"),
    FieldDescriptor::of::<Option<i64>>(3, "reminder_order"),
];

impl DeclaredShape for NoteAttributes {
    const SHAPE: Shape = Shape::Record;
}

impl Record for NoteAttributes {
    fn type_name(&self) -> &str {
        "NoteAttributes"
    }

    fn fields(&self) -> &[FieldDescriptor] {
        NOTE_ATTRIBUTES_FIELDS
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        match field {
            "author" | "reminder_order" => Ok(Slot::Scalar),
            "classifications" => Ok(Slot::container(&mut self.classifications)),
            _ => Err(unknown_field(self, field)),
        }
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin("NoteAttributes")?;
        if let Some(author) = &self.author {
            out.write_field_begin("author", WireType::String, 1)?;
            out.write_string(author)?;
            out.write_field_end()?;
        }
        if let Some(classifications) = &self.classifications {
            out.write_field_begin("classifications", WireType::Map, 2)?;
            wire::write_map(out, classifications)?;
            out.write_field_end()?;
        }
        if let Some(order) = self.reminder_order {
            out.write_field_begin("reminder_order", WireType::I64, 3)?;
            out.write_i64(order)?;
            out.write_field_end()?;
        }
        out.write_field_stop()?;
        out.write_struct_end()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Note {
    guid: Option<String>,
    tag_guids: Option<Vec<String>>,
    tag_names: Option<BTreeSet<String>>,
    resources: Option<Vec<Resource>>,
    attributes: Option<Box<NoteAttributes>>,
}

const NOTE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::of::<Option<String>>(1, "guid"),
    FieldDescriptor::of::<Option<Vec<String>>>(2, "tag_guids"),
    FieldDescriptor::of::<Option<BTreeSet<String>>>(3, "tag_names"),
    FieldDescriptor::of::<Option<Vec<Resource>>>(4, "resources"),
    FieldDescriptor::of::<Option<Box<NoteAttributes>>>(5, "attributes"),
];

impl Record for Note {
    fn type_name(&self) -> &str {
        "Note"
    }

    fn fields(&self) -> &[FieldDescriptor] {
        NOTE_FIELDS
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        match field {
            "guid" => Ok(Slot::Scalar),
            "tag_guids" => Ok(Slot::container(&mut self.tag_guids)),
            "tag_names" => Ok(Slot::container(&mut self.tag_names)),
            "resources" => Ok(Slot::container(&mut self.resources)),
            "attributes" => Ok(Slot::record(self.attributes.as_deref_mut())),
            _ => Err(unknown_field(self, field)),
        }
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin("Note")?;
        if let Some(guid) = &self.guid {
            out.write_field_begin("guid", WireType::String, 1)?;
            out.write_string(guid)?;
            out.write_field_end()?;
        }
        if let Some(tags) = &self.tag_guids {
            out.write_field_begin("tag_guids", WireType::List, 2)?;
            wire::write_list(out, tags)?;
            out.write_field_end()?;
        }
        if let Some(names) = &self.tag_names {
            out.write_field_begin("tag_names", WireType::Set, 3)?;
            wire::write_set(out, names)?;
            out.write_field_end()?;
        }
        if let Some(resources) = &self.resources {
            out.write_field_begin("resources", WireType::List, 4)?;
            wire::write_list(out, resources)?;
            out.write_field_end()?;
        }
        if let Some(attributes) = &self.attributes {
            out.write_field_begin("attributes", WireType::Struct, 5)?;
            attributes.write(out)?;
            out.write_field_end()?;
        }
        out.write_field_stop()?;
        out.write_struct_end()
    }
}

fn note_with_attributes() -> Note {
    Note {
        guid: Some("note-1".into()),
        attributes: Some(Box::new(NoteAttributes::default())),
        ..Default::default()
    }
}

fn bytes_of(record: &mut dyn Record) -> Vec<u8> {
    wire::to_bytes(record).unwrap()
}

// ── Substitution ──────────────────────────────────────────

#[test]
fn test_wrap_fills_absent_collections() {
    let note = note_with_attributes();
    assert!(note.tag_guids.is_none());
    assert!(note.attributes.as_ref().unwrap().classifications.is_none());

    let wrapped = normalize(note).unwrap();
    assert!(wrapped.is_wrapped());
    assert_eq!(wrapped.tag_guids, Some(vec![]));
    assert_eq!(wrapped.tag_names, Some(BTreeSet::new()));
    let classifications = wrapped
        .attributes
        .as_ref()
        .unwrap()
        .classifications
        .as_ref()
        .unwrap();
    assert!(classifications.is_empty());
}

#[test]
fn test_safe_loop_over_resources() {
    let wrapped = normalize(Note::default()).unwrap();
    let mut seen = 0;
    for _resource in wrapped.resources.iter().flatten() {
        seen += 1;
    }
    assert_eq!(seen, 0);
    assert!(wrapped.resources.is_some());
}

#[test]
fn test_scalars_and_absent_nested_untouched() {
    let wrapped = normalize(Note::default()).unwrap();
    assert!(wrapped.guid.is_none());
    assert!(wrapped.attributes.is_none());
}

#[test]
fn test_plan_lists_every_tracked_field() {
    let wrapped = normalize(note_with_attributes()).unwrap();
    let paths: Vec<String> = wrapped
        .plan()
        .unwrap()
        .paths()
        .iter()
        .map(|p| p.to_string())
        .collect();
    assert_eq!(
        paths,
        vec![
            "tag_guids",
            "tag_names",
            "resources",
            "attributes.classifications"
        ]
    );
    let kinds: Vec<ContainerKind> = wrapped
        .plan()
        .unwrap()
        .entries()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            ContainerKind::Sequence,
            ContainerKind::Set,
            ContainerKind::Sequence
        ]
    );
}

// ── Identity ──────────────────────────────────────────────

#[test]
fn test_identity_when_nothing_absent() {
    let note = Note {
        guid: Some("n".into()),
        tag_guids: Some(vec![]),
        tag_names: Some(BTreeSet::from(["x".to_string()])),
        resources: Some(vec![Resource::default()]),
        attributes: None,
    };
    let normalized = normalize(note.clone()).unwrap();
    assert!(!normalized.is_wrapped());
    assert!(normalized.plan().is_none());
    assert_eq!(normalized.into_inner().unwrap(), note);
}

#[test]
fn test_nested_absence_alone_forces_wrapping() {
    let note = Note {
        tag_guids: Some(vec![]),
        tag_names: Some(BTreeSet::new()),
        resources: Some(vec![]),
        attributes: Some(Box::new(NoteAttributes::default())),
        ..Default::default()
    };
    let normalized = normalize(note).unwrap();
    assert!(normalized.is_wrapped());
    let plan = normalized.plan().unwrap();
    assert!(plan.entries().is_empty());
    assert_eq!(plan.len(), 1);
}

// ── Wire fidelity ─────────────────────────────────────────

#[test]
fn test_round_trip_bytes_equal() {
    let note = note_with_attributes();
    let expected = bytes_of(&mut note.clone());
    let mut wrapped = normalize(note).unwrap();
    assert_eq!(bytes_of(&mut wrapped), expected);
}

#[test]
fn test_scenario_tags_and_nested_flags() {
    // {tags: absent, attrs: {flags: absent}}
    let original = note_with_attributes();
    let expected = bytes_of(&mut original.clone());

    let mut wrapped = normalize(original).unwrap();
    assert_eq!(wrapped.tag_guids, Some(Vec::<String>::new()));
    assert_eq!(
        wrapped.attributes.as_ref().unwrap().classifications,
        Some(BTreeMap::new())
    );
    assert_eq!(bytes_of(&mut wrapped), expected);
}

#[test]
fn test_serialize_twice_identical() {
    let mut wrapped = normalize(note_with_attributes()).unwrap();
    let first = bytes_of(&mut wrapped);
    let second = bytes_of(&mut wrapped);
    assert_eq!(first, second);
    // Reads stay non-absent after serializing
    assert_eq!(wrapped.tag_guids, Some(vec![]));
    assert_eq!(
        wrapped.attributes.as_ref().unwrap().classifications,
        Some(BTreeMap::new())
    );
}

#[test]
fn test_populated_field_is_transmitted() {
    let mut wrapped = normalize(note_with_attributes()).unwrap();
    wrapped.tag_guids.as_mut().unwrap().push("tag-1".into());

    let mut expected = note_with_attributes();
    expected.tag_guids = Some(vec!["tag-1".into()]);

    assert_eq!(bytes_of(&mut wrapped), bytes_of(&mut expected));
    assert_eq!(wrapped.tag_guids.as_ref().unwrap().len(), 1);
}

#[test]
fn test_populated_nested_field_is_transmitted() {
    let mut wrapped = normalize(note_with_attributes()).unwrap();
    wrapped
        .attributes
        .as_mut()
        .unwrap()
        .classifications
        .as_mut()
        .unwrap()
        .insert("kind".into(), "todo".into());

    let mut expected = note_with_attributes();
    expected.attributes.as_mut().unwrap().classifications =
        Some(BTreeMap::from([("kind".to_string(), "todo".to_string())]));

    assert_eq!(bytes_of(&mut wrapped), bytes_of(&mut expected));
}

#[test]
fn test_element_added_then_removed_reverts() {
    let original = note_with_attributes();
    let expected = bytes_of(&mut original.clone());
    let mut wrapped = normalize(original).unwrap();
    wrapped.tag_guids.as_mut().unwrap().push("t".into());
    wrapped.tag_guids.as_mut().unwrap().clear();
    assert_eq!(bytes_of(&mut wrapped), expected);
}

#[test]
fn test_present_empty_container_still_emitted() {
    let note = Note {
        tag_guids: Some(vec![]),
        ..Default::default()
    };
    let expected = bytes_of(&mut note.clone());
    let mut wrapped = normalize(note).unwrap();
    let bytes = bytes_of(&mut wrapped);
    assert_eq!(bytes, expected);
    // The empty list header for field 2 is on the wire
    assert!(bytes.windows(3).any(|w| w == [WireType::List.tag(), 0, 2]));
}

#[test]
fn test_transport_sees_wrapper_as_record() {
    fn transmit(record: &mut dyn Record) -> Vec<u8> {
        let mut writer = wire::BinaryWriter::new();
        record.serialize(&mut writer).unwrap();
        writer.into_bytes().unwrap()
    }

    let original = note_with_attributes();
    let expected = transmit(&mut original.clone());
    let mut wrapped = normalize(original).unwrap();
    assert_eq!(wrapped.type_name(), "Note");
    assert_eq!(wrapped.fields().len(), 5);
    assert_eq!(transmit(&mut wrapped), expected);
}

#[test]
fn test_plain_write_skips_revert() {
    // `write` is the generated serializer; only `serialize` intercepts.
    let mut plain = note_with_attributes();
    let expected = bytes_of(&mut plain);
    let wrapped = normalize(note_with_attributes()).unwrap();
    let mut writer = wire::BinaryWriter::new();
    wrapped.write(&mut writer).unwrap();
    assert_ne!(writer.into_bytes().unwrap(), expected);
}

#[test]
fn test_into_inner_reverts() {
    let original = note_with_attributes();
    let wrapped = normalize(original.clone()).unwrap();
    assert_eq!(wrapped.into_inner().unwrap(), original);
}

#[test]
fn test_into_inner_keeps_populated() {
    let mut wrapped = normalize(Note::default()).unwrap();
    wrapped.resources.as_mut().unwrap().push(Resource {
        guid: Some("r".into()),
        width: Some(10),
    });
    let bare = wrapped.into_inner().unwrap();
    assert_eq!(bare.resources.as_ref().unwrap().len(), 1);
    assert!(bare.tag_guids.is_none());
}

// ── Nested handles ────────────────────────────────────────

#[test]
fn test_nested_record_serialized_alone_matches_original() {
    let original = note_with_attributes();
    let expected = bytes_of(&mut original.attributes.clone().unwrap());
    assert_eq!(expected, vec![0]);

    let mut wrapped = normalize(original).unwrap().wrapped().unwrap();
    let mut attributes = wrapped.nested_mut("attributes").unwrap();
    assert_eq!(attributes.type_name(), "NoteAttributes");
    assert_eq!(attributes.plan().map(RevertPlan::len), Some(1));
    assert_eq!(bytes_of(&mut attributes), expected);
    assert_eq!(bytes_of(&mut attributes), expected);

    // refilled after the write, root still faithful
    assert_eq!(
        wrapped.attributes.as_ref().unwrap().classifications,
        Some(BTreeMap::new())
    );
    assert_eq!(bytes_of(&mut wrapped), bytes_of(&mut note_with_attributes()));
}

#[test]
fn test_nested_handle_transmits_added_entries() {
    let mut wrapped = normalize(note_with_attributes()).unwrap();
    wrapped
        .attributes
        .as_mut()
        .unwrap()
        .classifications
        .as_mut()
        .unwrap()
        .insert("color".into(), "red".into());

    let mut expected = NoteAttributes {
        classifications: Some(BTreeMap::from([("color".to_string(), "red".to_string())])),
        ..Default::default()
    };
    let mut attributes = wrapped.nested_mut("attributes").unwrap();
    assert_eq!(bytes_of(&mut attributes), bytes_of(&mut expected));
}

#[test]
fn test_nested_handle_without_substitution_writes_as_is() {
    let mut attributes = NoteAttributes {
        author: Some("kim".into()),
        classifications: Some(BTreeMap::new()),
        reminder_order: None,
    };
    let expected = bytes_of(&mut attributes);
    let note = Note {
        attributes: Some(Box::new(attributes)),
        ..Default::default()
    };

    let mut normalized = normalize(note).unwrap();
    assert!(normalized.is_wrapped());
    let mut nested = normalized.nested_mut("attributes").unwrap();
    assert!(nested.plan().is_none());
    assert_eq!(bytes_of(&mut nested), expected);
}

#[test]
fn test_nested_handle_on_unchanged_record() {
    let note = Note {
        tag_guids: Some(vec![]),
        tag_names: Some(BTreeSet::new()),
        resources: Some(vec![]),
        attributes: Some(Box::new(NoteAttributes {
            classifications: Some(BTreeMap::new()),
            ..Default::default()
        })),
        ..Default::default()
    };
    let mut normalized = normalize(note).unwrap();
    assert!(!normalized.is_wrapped());
    assert!(normalized.clone().wrapped().is_none());
    let nested = normalized.nested_mut("attributes").unwrap();
    assert!(nested.plan().is_none());
}

#[test]
fn test_nested_handle_errors() {
    let mut wrapped = normalize(Note::default()).unwrap();
    assert!(matches!(
        wrapped.nested_mut("attributes"),
        Err(Error::FieldAccess { .. })
    ));
    assert!(matches!(
        wrapped.nested_mut("tag_guids"),
        Err(Error::InternalConsistency { .. })
    ));
    assert!(matches!(
        wrapped.nested_mut("nope"),
        Err(Error::FieldAccess { .. })
    ));
}

// ── In-place normalization ────────────────────────────────

#[test]
fn test_in_place_with_manual_revert_protocol() {
    let mut note = note_with_attributes();
    let expected = bytes_of(&mut note.clone());

    let plan = normalize_in_place(&mut note).unwrap();
    assert_eq!(note.tag_guids, Some(vec![]));
    assert_ne!(bytes_of(&mut note), expected);

    let reverted = plan.revert(&mut note).unwrap();
    assert_eq!(reverted.len(), 4);
    assert!(note.tag_guids.is_none());
    assert_eq!(bytes_of(&mut note), expected);

    RevertPlan::restore(&mut note, &reverted).unwrap();
    assert_eq!(note.tag_guids, Some(vec![]));
    assert_eq!(
        note.attributes.as_ref().unwrap().classifications,
        Some(BTreeMap::new())
    );
}

// ── Failure semantics ─────────────────────────────────────

/// A record whose live slots can be made to contradict its declarations
#[derive(Debug, Default)]
struct Shifty {
    tags: Option<Vec<String>>,
    flags: Option<BTreeMap<String, String>>,
    swapped: bool,
    locked: bool,
    lock_flags: bool,
}

const SHIFTY_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::of::<Option<Vec<String>>>(1, "tags"),
    FieldDescriptor::of::<Option<BTreeMap<String, String>>>(2, "flags"),
];

impl Record for Shifty {
    fn type_name(&self) -> &str {
        "Shifty"
    }

    fn fields(&self) -> &[FieldDescriptor] {
        SHIFTY_FIELDS
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        if self.locked || (self.lock_flags && field == "flags") {
            return Err(Error::field_access("Shifty", field, "locked"));
        }
        match (field, self.swapped) {
            ("tags", false) | ("flags", true) => Ok(Slot::container(&mut self.tags)),
            ("flags", false) | ("tags", true) => Ok(Slot::container(&mut self.flags)),
            _ => Err(unknown_field(self, field)),
        }
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin("Shifty")?;
        out.write_field_stop()?;
        out.write_struct_end()
    }
}

#[test]
fn test_shape_drift_is_internal_consistency_error() {
    let mut wrapped = normalize(Shifty::default()).unwrap();
    wrapped.swapped = true;
    let err = wire::to_bytes(&mut wrapped).unwrap_err();
    assert!(matches!(err, Error::InternalConsistency { .. }));
}

#[test]
fn test_inconsistent_declaration_rejected_at_normalize() {
    let err = normalize(Shifty {
        swapped: true,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, Error::InternalConsistency { .. }));
}

#[test]
fn test_field_access_failure_propagates() {
    let err = normalize(Shifty {
        locked: true,
        ..Default::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("locked"));

    let mut wrapped = normalize(Shifty::default()).unwrap();
    wrapped.locked = true;
    assert!(matches!(
        wire::to_bytes(&mut wrapped),
        Err(Error::FieldAccess { .. })
    ));
}

#[test]
fn test_failed_revert_refills_fields_already_reverted() {
    let mut shifty = Shifty::default();
    let plan = normalize_in_place(&mut shifty).unwrap();
    shifty.lock_flags = true;
    let err = plan.revert(&mut shifty).unwrap_err();
    assert!(matches!(err, Error::FieldAccess { .. }));
    assert_eq!(shifty.tags, Some(vec![]));

    let mut wrapped = normalize(Shifty::default()).unwrap();
    wrapped.lock_flags = true;
    assert!(wire::to_bytes(&mut wrapped).is_err());
    assert_eq!(wrapped.tags, Some(vec![]));
}

/// Declares a field its slot table does not know about
#[derive(Debug, Default)]
struct Undeclared;

const UNDECLARED_FIELDS: &[FieldDescriptor] =
    &[FieldDescriptor::new(1, "ghost", Shape::Container(ContainerKind::Set))];

impl Record for Undeclared {
    fn type_name(&self) -> &str {
        "Undeclared"
    }

    fn fields(&self) -> &[FieldDescriptor] {
        UNDECLARED_FIELDS
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        Err(unknown_field(self, field))
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin("Undeclared")?;
        out.write_field_stop()?;
        out.write_struct_end()
    }
}

#[test]
fn test_unreachable_field_is_field_access_error() {
    let err = normalize(Undeclared).unwrap_err();
    assert!(matches!(err, Error::FieldAccess { .. }));
    assert!(err.to_string().contains("Undeclared.ghost"));
}

/// No instance fields at all
#[derive(Debug, Default, PartialEq)]
struct Empty;

impl Record for Empty {
    fn type_name(&self) -> &str {
        "Empty"
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &[]
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        Err(unknown_field(self, field))
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin("Empty")?;
        out.write_field_stop()?;
        out.write_struct_end()
    }
}

#[test]
fn test_zero_field_record_is_identity() {
    let normalized = normalize(Empty).unwrap();
    assert!(!normalized.is_wrapped());
    assert_eq!(*normalized, Empty);
}
