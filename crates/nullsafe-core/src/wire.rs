//! Reference wire writer — the serializer side of a generated record
//!
//! Generated records describe themselves to an [`OutputProtocol`] as a
//! sequence of struct/field/collection events. The normalizer never looks at
//! the bytes; it only guarantees that the protocol observes the same events
//! it would have observed for the untouched record.
//!
//! [`BinaryWriter`] is a deterministic big-endian encoding of those events:
//!
//! ```text
//! field  := type:u8 id:i16
//! stop   := 0x00
//! string := len:i32 utf8-bytes
//! list   := elem-type:u8 size:i32 elems...
//! set    := elem-type:u8 size:i32 elems...
//! map    := key-type:u8 value-type:u8 size:i32 (key value)...
//! ```
//!
//! Absent fields are simply not written, so an absent container and an
//! empty one produce different bytes.

use sha2::{Digest, Sha256};

use crate::record::Record;
use crate::{Error, Result};

// ── Wire types ─────────────────────────────────────────────

/// Type tag written in front of every field and collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Stop = 0,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl WireType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

// ── Output protocol ────────────────────────────────────────

/// Sink for the write events of a generated record
pub trait OutputProtocol {
    fn write_struct_begin(&mut self, name: &str) -> Result<()>;
    fn write_struct_end(&mut self) -> Result<()>;
    fn write_field_begin(&mut self, name: &str, ty: WireType, id: i16) -> Result<()>;
    fn write_field_end(&mut self) -> Result<()>;
    fn write_field_stop(&mut self) -> Result<()>;

    fn write_bool(&mut self, value: bool) -> Result<()>;
    fn write_byte(&mut self, value: i8) -> Result<()>;
    fn write_i16(&mut self, value: i16) -> Result<()>;
    fn write_i32(&mut self, value: i32) -> Result<()>;
    fn write_i64(&mut self, value: i64) -> Result<()>;
    fn write_double(&mut self, value: f64) -> Result<()>;
    fn write_string(&mut self, value: &str) -> Result<()>;
    fn write_binary(&mut self, value: &[u8]) -> Result<()>;

    fn write_list_begin(&mut self, elem: WireType, size: usize) -> Result<()>;
    fn write_list_end(&mut self) -> Result<()>;
    fn write_set_begin(&mut self, elem: WireType, size: usize) -> Result<()>;
    fn write_set_end(&mut self) -> Result<()>;
    fn write_map_begin(&mut self, key: WireType, value: WireType, size: usize) -> Result<()>;
    fn write_map_end(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Struct,
    Field,
    List,
    Set,
    Map,
}

/// Deterministic big-endian writer with begin/end balance checks
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: Vec<u8>,
    frames: Vec<Frame>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far, regardless of balance
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish writing; fails if a struct, field, or collection is still open
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        if let Some(frame) = self.frames.last() {
            return Err(Error::Wire(format!("unterminated {:?} at end of output", frame)));
        }
        Ok(self.buf)
    }

    fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    fn pop(&mut self, expected: Frame) -> Result<()> {
        match self.frames.pop() {
            Some(frame) if frame == expected => Ok(()),
            Some(frame) => Err(Error::Wire(format!(
                "cannot close {:?} while {:?} is open",
                expected, frame
            ))),
            None => Err(Error::Wire(format!("cannot close {:?}: nothing open", expected))),
        }
    }

    fn require_struct(&self, what: &str) -> Result<()> {
        match self.frames.last() {
            Some(Frame::Struct) => Ok(()),
            other => Err(Error::Wire(format!(
                "{} outside of a struct (open: {:?})",
                what, other
            ))),
        }
    }

    fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len)
            .map_err(|_| Error::Wire(format!("length {} exceeds i32 range", len)))?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        Ok(())
    }
}

impl OutputProtocol for BinaryWriter {
    fn write_struct_begin(&mut self, _name: &str) -> Result<()> {
        self.push(Frame::Struct);
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<()> {
        self.pop(Frame::Struct)
    }

    fn write_field_begin(&mut self, _name: &str, ty: WireType, id: i16) -> Result<()> {
        self.require_struct("field")?;
        self.buf.push(ty.tag());
        self.buf.extend_from_slice(&id.to_be_bytes());
        self.push(Frame::Field);
        Ok(())
    }

    fn write_field_end(&mut self) -> Result<()> {
        self.pop(Frame::Field)
    }

    fn write_field_stop(&mut self) -> Result<()> {
        self.require_struct("field stop")?;
        self.buf.push(WireType::Stop.tag());
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.buf.push(u8::from(value));
        Ok(())
    }

    fn write_byte(&mut self, value: i8) -> Result<()> {
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_i16(&mut self, value: i16) -> Result<()> {
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.buf.extend_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
        Ok(())
    }

    fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_binary(value.as_bytes())
    }

    fn write_binary(&mut self, value: &[u8]) -> Result<()> {
        self.write_len(value.len())?;
        self.buf.extend_from_slice(value);
        Ok(())
    }

    fn write_list_begin(&mut self, elem: WireType, size: usize) -> Result<()> {
        self.buf.push(elem.tag());
        self.write_len(size)?;
        self.push(Frame::List);
        Ok(())
    }

    fn write_list_end(&mut self) -> Result<()> {
        self.pop(Frame::List)
    }

    fn write_set_begin(&mut self, elem: WireType, size: usize) -> Result<()> {
        self.buf.push(elem.tag());
        self.write_len(size)?;
        self.push(Frame::Set);
        Ok(())
    }

    fn write_set_end(&mut self) -> Result<()> {
        self.pop(Frame::Set)
    }

    fn write_map_begin(&mut self, key: WireType, value: WireType, size: usize) -> Result<()> {
        self.buf.push(key.tag());
        self.buf.push(value.tag());
        self.write_len(size)?;
        self.push(Frame::Map);
        Ok(())
    }

    fn write_map_end(&mut self) -> Result<()> {
        self.pop(Frame::Map)
    }
}

// ── Element helpers for generated write bodies ─────────────

/// A value that can appear as a collection element or map key/value
pub trait WireElement {
    const WIRE_TYPE: WireType;

    fn write_element(&self, out: &mut dyn OutputProtocol) -> Result<()>;
}

macro_rules! wire_element {
    ($ty:ty, $wire:expr, $method:ident) => {
        impl WireElement for $ty {
            const WIRE_TYPE: WireType = $wire;

            fn write_element(&self, out: &mut dyn OutputProtocol) -> Result<()> {
                out.$method(*self)
            }
        }
    };
}

wire_element!(bool, WireType::Bool, write_bool);
wire_element!(i8, WireType::Byte, write_byte);
wire_element!(i16, WireType::I16, write_i16);
wire_element!(i32, WireType::I32, write_i32);
wire_element!(i64, WireType::I64, write_i64);
wire_element!(f64, WireType::Double, write_double);

impl WireElement for String {
    const WIRE_TYPE: WireType = WireType::String;

    fn write_element(&self, out: &mut dyn OutputProtocol) -> Result<()> {
        out.write_string(self)
    }
}

pub fn write_list<'a, T, I>(out: &mut dyn OutputProtocol, items: I) -> Result<()>
where
    T: WireElement + 'a,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: ExactSizeIterator,
{
    let items = items.into_iter();
    out.write_list_begin(T::WIRE_TYPE, items.len())?;
    for item in items {
        item.write_element(out)?;
    }
    out.write_list_end()
}

pub fn write_set<'a, T, I>(out: &mut dyn OutputProtocol, items: I) -> Result<()>
where
    T: WireElement + 'a,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: ExactSizeIterator,
{
    let items = items.into_iter();
    out.write_set_begin(T::WIRE_TYPE, items.len())?;
    for item in items {
        item.write_element(out)?;
    }
    out.write_set_end()
}

pub fn write_map<'a, K, V, I>(out: &mut dyn OutputProtocol, entries: I) -> Result<()>
where
    K: WireElement + 'a,
    V: WireElement + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
    I::IntoIter: ExactSizeIterator,
{
    let entries = entries.into_iter();
    out.write_map_begin(K::WIRE_TYPE, V::WIRE_TYPE, entries.len())?;
    for (key, value) in entries {
        key.write_element(out)?;
        value.write_element(out)?;
    }
    out.write_map_end()
}

// ── Entry points ───────────────────────────────────────────

/// Run the serialize trigger of `record` into a fresh [`BinaryWriter`]
pub fn to_bytes(record: &mut dyn Record) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    record.serialize(&mut writer)?;
    writer.into_bytes()
}

/// SHA-256 of encoded bytes, lowercase hex
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
