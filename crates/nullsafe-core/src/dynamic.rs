//! Dynamic records — schema-driven records known only at runtime
//!
//! A [`Schema`] is the JSON form of an IDL document's struct definitions:
//!
//! ```json
//! {
//!   "root": "Note",
//!   "records": {
//!     "Note": { "fields": [
//!       { "id": 1, "name": "guid", "type": "string" },
//!       { "id": 2, "name": "tag_guids", "type": { "list": "string" } },
//!       { "id": 3, "name": "attributes", "type": { "record": "NoteAttributes" } }
//!     ] },
//!     "NoteAttributes": { "fields": [
//!       { "id": 1, "name": "classifications", "type": { "map": ["string", "string"] } }
//!     ] }
//!   }
//! }
//! ```
//!
//! [`DynamicRecord`] implements [`Record`] over [`Value`]s, so the normalizer
//! and the wire writer treat it exactly like generated code. Values are
//! type-checked on every write through the public API; a field's value
//! always conforms to its declared type.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::record::{unknown_field, Record, Slot};
use crate::shape::{Container, ContainerKind, FieldDescriptor, Shape};
use crate::wire::{OutputProtocol, WireType};
use crate::{Error, Result};

// ── Schema ─────────────────────────────────────────────────

/// Declared type of a schema field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    String,
    List(Box<FieldType>),
    Set(Box<FieldType>),
    Map(Box<FieldType>, Box<FieldType>),
    Record(std::string::String),
}

impl FieldType {
    pub fn shape(&self) -> Shape {
        match self {
            FieldType::List(_) => Shape::Container(ContainerKind::Sequence),
            FieldType::Set(_) => Shape::Container(ContainerKind::Set),
            FieldType::Map(_, _) => Shape::Container(ContainerKind::Mapping),
            FieldType::Record(_) => Shape::Record,
            _ => Shape::Scalar,
        }
    }

    pub fn wire_type(&self) -> WireType {
        match self {
            FieldType::Bool => WireType::Bool,
            FieldType::Byte => WireType::Byte,
            FieldType::I16 => WireType::I16,
            FieldType::I32 => WireType::I32,
            FieldType::I64 => WireType::I64,
            FieldType::Double => WireType::Double,
            FieldType::String => WireType::String,
            FieldType::List(_) => WireType::List,
            FieldType::Set(_) => WireType::Set,
            FieldType::Map(_, _) => WireType::Map,
            FieldType::Record(_) => WireType::Struct,
        }
    }

    fn record_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FieldType::List(inner) | FieldType::Set(inner) => inner.record_names(out),
            FieldType::Map(k, v) => {
                k.record_names(out);
                v.record_names(out);
            }
            FieldType::Record(name) => out.push(name),
            _ => {}
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Byte => write!(f, "byte"),
            FieldType::I16 => write!(f, "i16"),
            FieldType::I32 => write!(f, "i32"),
            FieldType::I64 => write!(f, "i64"),
            FieldType::Double => write!(f, "double"),
            FieldType::String => write!(f, "string"),
            FieldType::List(inner) => write!(f, "list<{}>", inner),
            FieldType::Set(inner) => write!(f, "set<{}>", inner),
            FieldType::Map(k, v) => write!(f, "map<{}, {}>", k, v),
            FieldType::Record(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: i16,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordDef {
    fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct SchemaDoc {
    #[serde(default)]
    root: Option<String>,
    records: BTreeMap<String, RecordDef>,
}

/// One record type of a schema, with its precomputed accessor table
#[derive(Debug, PartialEq)]
pub struct RecordType {
    name: String,
    fields: Vec<FieldDef>,
    descriptors: Vec<FieldDescriptor>,
}

impl RecordType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }
}

/// Validated set of record types
#[derive(Debug, Clone)]
pub struct Schema {
    root: Option<String>,
    records: BTreeMap<String, Arc<RecordType>>,
}

impl Schema {
    /// Parse and validate a schema document
    ///
    /// # Errors
    /// `Json` for malformed JSON, `Schema` for duplicate field ids or names,
    /// references to undeclared record types, or an unknown root.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: SchemaDoc = serde_json::from_str(text)?;
        Self::from_doc(doc)
    }

    fn from_doc(doc: SchemaDoc) -> Result<Self> {
        if let Some(root) = &doc.root {
            if !doc.records.contains_key(root) {
                return Err(Error::Schema(format!("root record '{}' is not declared", root)));
            }
        }

        let mut records = BTreeMap::new();
        for (name, def) in &doc.records {
            let mut ids = BTreeSet::new();
            let mut names = BTreeSet::new();
            for field in &def.fields {
                if !ids.insert(field.id) {
                    return Err(Error::Schema(format!(
                        "duplicate field id {} in record '{}'",
                        field.id, name
                    )));
                }
                if !names.insert(field.name.as_str()) {
                    return Err(Error::Schema(format!(
                        "duplicate field name '{}' in record '{}'",
                        field.name, name
                    )));
                }
                let mut referenced = Vec::new();
                field.ty.record_names(&mut referenced);
                if let Some(missing) = referenced.iter().find(|r| !doc.records.contains_key(**r)) {
                    return Err(Error::Schema(format!(
                        "field '{}.{}' references undeclared record '{}'",
                        name, field.name, missing
                    )));
                }
            }

            let descriptors = def
                .fields
                .iter()
                .map(|f| FieldDescriptor::owned(f.id, f.name.clone(), f.ty.shape()))
                .collect();
            records.insert(
                name.clone(),
                Arc::new(RecordType {
                    name: name.clone(),
                    fields: def.fields.clone(),
                    descriptors,
                }),
            );
        }

        Ok(Self {
            root: doc.root,
            records,
        })
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn record_names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn record_type(&self, name: &str) -> Result<Arc<RecordType>> {
        self.records
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Schema(format!("unknown record type '{}'", name)))
    }

    /// A record of type `name` with every field absent
    pub fn instantiate(&self, name: &str) -> Result<DynamicRecord> {
        Ok(DynamicRecord::new(self.record_type(name)?))
    }

    /// Build a record of type `name` from a JSON object; `null` or a missing
    /// key means absent
    pub fn record_from_json(&self, name: &str, json: &serde_json::Value) -> Result<DynamicRecord> {
        let ty = self.record_type(name)?;
        let object = json.as_object().ok_or_else(|| Error::TypeMismatch {
            field: name.to_string(),
            expected: "object".to_string(),
            found: json_kind(json).to_string(),
        })?;

        if let Some(key) = object.keys().find(|k| ty.index_of(k).is_none()) {
            return Err(Error::field_access(name, key.as_str(), "no such field"));
        }

        let mut values = Vec::with_capacity(ty.fields.len());
        for field in &ty.fields {
            let value = match object.get(&field.name) {
                None | Some(serde_json::Value::Null) => None,
                Some(v) => Some(self.value_from_json(&field.ty, v, &field.name)?),
            };
            values.push(value);
        }
        Ok(DynamicRecord { ty, values })
    }

    fn value_from_json(&self, ty: &FieldType, json: &serde_json::Value, field: &str) -> Result<Value> {
        let mismatch = || Error::TypeMismatch {
            field: field.to_string(),
            expected: ty.to_string(),
            found: json_kind(json).to_string(),
        };

        let value = match ty {
            FieldType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            FieldType::Byte => Value::Byte(int_in_range(json).ok_or_else(mismatch)?),
            FieldType::I16 => Value::I16(int_in_range(json).ok_or_else(mismatch)?),
            FieldType::I32 => Value::I32(int_in_range(json).ok_or_else(mismatch)?),
            FieldType::I64 => Value::I64(json.as_i64().ok_or_else(mismatch)?),
            FieldType::Double => Value::Double(json.as_f64().ok_or_else(mismatch)?),
            FieldType::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
            FieldType::List(elem) => {
                let items = json.as_array().ok_or_else(mismatch)?;
                Value::List(
                    items
                        .iter()
                        .map(|item| self.value_from_json(elem, item, field))
                        .collect::<Result<_>>()?,
                )
            }
            FieldType::Set(elem) => {
                let items = json.as_array().ok_or_else(mismatch)?;
                let mut unique: Vec<Value> = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.value_from_json(elem, item, field)?;
                    if unique.contains(&value) {
                        return Err(Error::TypeMismatch {
                            field: field.to_string(),
                            expected: "unique set elements".to_string(),
                            found: format!("duplicate {}", value),
                        });
                    }
                    unique.push(value);
                }
                Value::Set(unique)
            }
            FieldType::Map(key_ty, value_ty) => match json {
                serde_json::Value::Object(object) if **key_ty == FieldType::String => Value::Map(
                    object
                        .iter()
                        .map(|(k, v)| -> Result<(Value, Value)> {
                            Ok((
                                Value::String(k.clone()),
                                self.value_from_json(value_ty, v, field)?,
                            ))
                        })
                        .collect::<Result<_>>()?,
                ),
                serde_json::Value::Array(pairs) => {
                    let mut entries = Vec::with_capacity(pairs.len());
                    for pair in pairs {
                        let Some([k, v]) = pair.as_array().map(Vec::as_slice) else {
                            return Err(mismatch());
                        };
                        let key = self.value_from_json(key_ty, k, field)?;
                        if entries.iter().any(|(existing, _)| *existing == key) {
                            return Err(duplicate_key(field, &key));
                        }
                        entries.push((key, self.value_from_json(value_ty, v, field)?));
                    }
                    Value::Map(entries)
                }
                _ => return Err(mismatch()),
            },
            FieldType::Record(name) => Value::Record(self.record_from_json(name, json)?),
        };
        Ok(value)
    }
}

fn duplicate_key(field: &str, key: &Value) -> Error {
    Error::TypeMismatch {
        field: field.to_string(),
        expected: "unique map keys".to_string(),
        found: format!("duplicate key {}", key),
    }
}

fn int_in_range<T: TryFrom<i64>>(json: &serde_json::Value) -> Option<T> {
    json.as_i64().and_then(|n| T::try_from(n).ok())
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ── Values ─────────────────────────────────────────────────

/// Current value of a dynamic field
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    List(Vec<Value>),
    /// Unique elements in insertion order
    Set(Vec<Value>),
    /// Entries in insertion order
    Map(Vec<(Value, Value)>),
    Record(DynamicRecord),
}

impl Value {
    /// Element count for container values
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Value::List(items) | Value::Set(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&DynamicRecord> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::Sequence => Value::List(Vec::new()),
            ContainerKind::Set => Value::Set(Vec::new()),
            ContainerKind::Mapping => Value::Map(Vec::new()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Record(_) => "record",
        }
    }

    /// Check that this value conforms to `ty`
    pub fn check(&self, ty: &FieldType, field: &str) -> Result<()> {
        let ok = match (ty, self) {
            (FieldType::Bool, Value::Bool(_))
            | (FieldType::Byte, Value::Byte(_))
            | (FieldType::I16, Value::I16(_))
            | (FieldType::I32, Value::I32(_))
            | (FieldType::I64, Value::I64(_))
            | (FieldType::Double, Value::Double(_))
            | (FieldType::String, Value::String(_)) => true,
            (FieldType::List(elem), Value::List(items)) => {
                for item in items {
                    item.check(elem, field)?;
                }
                true
            }
            (FieldType::Set(elem), Value::Set(items)) => {
                for (i, item) in items.iter().enumerate() {
                    item.check(elem, field)?;
                    if items[..i].contains(item) {
                        return Err(Error::TypeMismatch {
                            field: field.to_string(),
                            expected: "unique set elements".to_string(),
                            found: format!("duplicate {}", item),
                        });
                    }
                }
                true
            }
            (FieldType::Map(k, v), Value::Map(entries)) => {
                for (i, (key, value)) in entries.iter().enumerate() {
                    key.check(k, field)?;
                    value.check(v, field)?;
                    if entries[..i].iter().any(|(existing, _)| existing == key) {
                        return Err(duplicate_key(field, key));
                    }
                }
                true
            }
            (FieldType::Record(name), Value::Record(r)) => r.ty.name == *name,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: ty.to_string(),
                found: match self {
                    Value::Record(r) => r.ty.name.clone(),
                    other => other.kind_name().to_string(),
                },
            })
        }
    }

    fn write(&self, ty: &FieldType, out: &mut dyn OutputProtocol) -> Result<()> {
        match (ty, self) {
            (FieldType::Bool, Value::Bool(v)) => out.write_bool(*v),
            (FieldType::Byte, Value::Byte(v)) => out.write_byte(*v),
            (FieldType::I16, Value::I16(v)) => out.write_i16(*v),
            (FieldType::I32, Value::I32(v)) => out.write_i32(*v),
            (FieldType::I64, Value::I64(v)) => out.write_i64(*v),
            (FieldType::Double, Value::Double(v)) => out.write_double(*v),
            (FieldType::String, Value::String(v)) => out.write_string(v),
            (FieldType::List(elem), Value::List(items)) => {
                out.write_list_begin(elem.wire_type(), items.len())?;
                for item in items {
                    item.write(elem, out)?;
                }
                out.write_list_end()
            }
            (FieldType::Set(elem), Value::Set(items)) => {
                out.write_set_begin(elem.wire_type(), items.len())?;
                for item in items {
                    item.write(elem, out)?;
                }
                out.write_set_end()
            }
            (FieldType::Map(k, v), Value::Map(entries)) => {
                out.write_map_begin(k.wire_type(), v.wire_type(), entries.len())?;
                for (key, value) in entries {
                    key.write(k, out)?;
                    value.write(v, out)?;
                }
                out.write_map_end()
            }
            (FieldType::Record(_), Value::Record(r)) => r.write(out),
            (ty, other) => Err(Error::Wire(format!(
                "cannot write {} as {}",
                other.kind_name(),
                ty
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Bool(v) => Json::from(*v),
            Value::Byte(v) => Json::from(*v),
            Value::I16(v) => Json::from(*v),
            Value::I32(v) => Json::from(*v),
            Value::I64(v) => Json::from(*v),
            Value::Double(v) => Json::from(*v),
            Value::String(v) => Json::from(v.as_str()),
            Value::List(items) | Value::Set(items) => {
                Json::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => {
                if entries.iter().all(|(k, _)| matches!(k, Value::String(_))) {
                    Json::Object(
                        entries
                            .iter()
                            .filter_map(|(k, v)| match k {
                                Value::String(s) => Some((s.clone(), v.to_json())),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Json::Array(
                        entries
                            .iter()
                            .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                            .collect(),
                    )
                }
            }
            Value::Record(r) => r.to_json(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ── Dynamic record ─────────────────────────────────────────

/// A record instance of a schema-declared type
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicRecord {
    ty: Arc<RecordType>,
    values: Vec<Option<Value>>,
}

impl DynamicRecord {
    pub fn new(ty: Arc<RecordType>) -> Self {
        let values = vec![None; ty.fields.len()];
        Self { ty, values }
    }

    pub fn record_type(&self) -> &RecordType {
        &self.ty
    }

    fn def(&self, field: &str) -> Result<(usize, &FieldDef)> {
        self.ty
            .index_of(field)
            .map(|i| (i, &self.ty.fields[i]))
            .ok_or_else(|| unknown_field(self, field))
    }

    /// Current value; `None` when absent or undeclared
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.ty
            .index_of(field)
            .and_then(|i| self.values[i].as_ref())
    }

    pub fn is_absent(&self, field: &str) -> bool {
        self.get(field).is_none()
    }

    /// Nested record stored in `field`, for in-place edits
    pub fn record_mut(&mut self, field: &str) -> Option<&mut DynamicRecord> {
        let i = self.ty.index_of(field)?;
        match self.values[i].as_mut() {
            Some(Value::Record(r)) => Some(r),
            _ => None,
        }
    }

    /// Replace the value of `field`; `None` makes it absent
    pub fn set(&mut self, field: &str, value: Option<Value>) -> Result<()> {
        let (i, def) = self.def(field)?;
        if let Some(v) = &value {
            v.check(&def.ty, field)?;
        }
        self.values[i] = value;
        Ok(())
    }

    /// Add an element to a list or set field, creating the container if absent
    ///
    /// Adding an element already present in a set is a no-op.
    pub fn append(&mut self, field: &str, element: Value) -> Result<()> {
        let (i, def) = self.def(field)?;
        match &def.ty {
            FieldType::List(elem) | FieldType::Set(elem) => element.check(elem, field)?,
            other => {
                return Err(Error::TypeMismatch {
                    field: field.to_string(),
                    expected: "list or set".to_string(),
                    found: other.to_string(),
                })
            }
        }
        let kind = def
            .ty
            .shape()
            .container_kind()
            .unwrap_or(ContainerKind::Sequence);
        match self.values[i].get_or_insert_with(|| Value::empty(kind)) {
            Value::List(items) => items.push(element),
            Value::Set(items) => {
                if !items.contains(&element) {
                    items.push(element);
                }
            }
            other => {
                return Err(Error::TypeMismatch {
                    field: field.to_string(),
                    expected: "list or set".to_string(),
                    found: other.kind_name().to_string(),
                })
            }
        }
        Ok(())
    }

    /// Insert or replace a map entry, creating the map if absent
    pub fn insert(&mut self, field: &str, key: Value, value: Value) -> Result<()> {
        let (i, def) = self.def(field)?;
        match &def.ty {
            FieldType::Map(k, v) => {
                key.check(k, field)?;
                value.check(v, field)?;
            }
            other => {
                return Err(Error::TypeMismatch {
                    field: field.to_string(),
                    expected: "map".to_string(),
                    found: other.to_string(),
                })
            }
        }
        match self.values[i].get_or_insert_with(|| Value::Map(Vec::new())) {
            Value::Map(entries) => {
                match entries.iter_mut().find(|(k, _)| *k == key) {
                    Some(entry) => entry.1 = value,
                    None => entries.push((key, value)),
                }
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                field: field.to_string(),
                expected: "map".to_string(),
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// JSON object with every declared field; absent fields are `null`
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .ty
            .fields
            .iter()
            .zip(&self.values)
            .map(|(def, value)| {
                (
                    def.name.clone(),
                    value.as_ref().map_or(serde_json::Value::Null, Value::to_json),
                )
            })
            .collect();
        serde_json::Value::Object(object)
    }
}

/// Handle on a dynamic container field; the category comes from the schema
struct DynamicContainer<'a> {
    kind: ContainerKind,
    value: &'a mut Option<Value>,
}

impl Container for DynamicContainer<'_> {
    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn len(&self) -> Option<usize> {
        self.value.as_ref().and_then(Value::element_count)
    }

    fn fill_empty(&mut self) {
        *self.value = Some(Value::empty(self.kind));
    }

    fn make_absent(&mut self) {
        *self.value = None;
    }
}

impl Record for DynamicRecord {
    fn type_name(&self) -> &str {
        &self.ty.name
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.ty.descriptors
    }

    fn slot_mut(&mut self, field: &str) -> Result<Slot<'_>> {
        let (i, def) = self.def(field)?;
        match def.ty.shape() {
            Shape::Scalar => Ok(Slot::Scalar),
            Shape::Record => Ok(Slot::Record(match self.values[i].as_mut() {
                Some(Value::Record(r)) => Some(r as &mut dyn Record),
                _ => None,
            })),
            Shape::Container(kind) => Ok(Slot::container(DynamicContainer {
                kind,
                value: &mut self.values[i],
            })),
        }
    }

    fn write(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_struct_begin(&self.ty.name)?;
        for (def, value) in self.ty.fields.iter().zip(&self.values) {
            if let Some(value) = value {
                out.write_field_begin(&def.name, def.ty.wire_type(), def.id)?;
                value.write(&def.ty, out)?;
                out.write_field_end()?;
            }
        }
        out.write_field_stop()?;
        out.write_struct_end()
    }
}
