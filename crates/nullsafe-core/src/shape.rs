//! Shape classification — declared field shapes and container handles
//!
//! Classification always works on the *declared* type of a field, never on
//! its current value, because the value of a container field may be absent.
//!
//! Every declared type has exactly one shape:
//!
//! | Declared type                      | Shape                     |
//! |------------------------------------|---------------------------|
//! | `Vec<T>`, `VecDeque<T>`            | `Container(Sequence)`     |
//! | `HashSet<T>`, `BTreeSet<T>`        | `Container(Set)`          |
//! | `HashMap<K, V>`, `BTreeMap<K, V>`  | `Container(Mapping)`      |
//! | generated record types             | `Record`                  |
//! | everything else                    | `Scalar`                  |

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::{BuildHasher, Hash};

use serde::Serialize;

// ── Shapes ─────────────────────────────────────────────────

/// Category of a collection-typed field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    /// Ordered iteration with positional access
    Sequence,
    /// Unique-element iteration
    Set,
    /// Key-to-value lookup
    Mapping,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Sequence => write!(f, "sequence"),
            ContainerKind::Set => write!(f, "set"),
            ContainerKind::Mapping => write!(f, "mapping"),
        }
    }
}

/// Declared shape of a record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Scalar,
    /// Nested IDL-generated record
    Record,
    Container(ContainerKind),
}

impl Shape {
    pub fn container_kind(&self) -> Option<ContainerKind> {
        match self {
            Shape::Container(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Record => write!(f, "record"),
            Shape::Container(kind) => write!(f, "{}", kind),
        }
    }
}

// ── Declared-type classification ───────────────────────────

/// Static shape of a declared field type
///
/// Generated record types implement this with `SHAPE = Shape::Record`.
pub trait DeclaredShape {
    const SHAPE: Shape;
}

/// Classify a declared type without needing a value of it
pub const fn classify<T: DeclaredShape + ?Sized>() -> Shape {
    T::SHAPE
}

macro_rules! scalar_shapes {
    ($($ty:ty),* $(,)?) => {
        $(impl DeclaredShape for $ty {
            const SHAPE: Shape = Shape::Scalar;
        })*
    };
}

scalar_shapes!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, str);

impl<T: DeclaredShape + ?Sized> DeclaredShape for Box<T> {
    const SHAPE: Shape = T::SHAPE;
}

// Absence is a property of the value, not the declaration.
impl<T: DeclaredShape> DeclaredShape for Option<T> {
    const SHAPE: Shape = T::SHAPE;
}

impl<T> DeclaredShape for Vec<T> {
    const SHAPE: Shape = Shape::Container(ContainerKind::Sequence);
}

impl<T> DeclaredShape for VecDeque<T> {
    const SHAPE: Shape = Shape::Container(ContainerKind::Sequence);
}

impl<T, S> DeclaredShape for HashSet<T, S> {
    const SHAPE: Shape = Shape::Container(ContainerKind::Set);
}

impl<T> DeclaredShape for BTreeSet<T> {
    const SHAPE: Shape = Shape::Container(ContainerKind::Set);
}

impl<K, V, S> DeclaredShape for HashMap<K, V, S> {
    const SHAPE: Shape = Shape::Container(ContainerKind::Mapping);
}

impl<K, V> DeclaredShape for BTreeMap<K, V> {
    const SHAPE: Shape = Shape::Container(ContainerKind::Mapping);
}

// ── Field descriptors ──────────────────────────────────────

/// Declaration of one instance field: wire id, name, and declared shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FieldDescriptor {
    pub id: i16,
    pub name: Cow<'static, str>,
    pub shape: Shape,
}

impl FieldDescriptor {
    pub const fn new(id: i16, name: &'static str, shape: Shape) -> Self {
        Self {
            id,
            name: Cow::Borrowed(name),
            shape,
        }
    }

    /// Descriptor whose shape is classified from the declared type `T`
    ///
    /// ```
    /// use nullsafe_core::{ContainerKind, FieldDescriptor, Shape};
    ///
    /// const TAGS: FieldDescriptor = FieldDescriptor::of::<Option<Vec<String>>>(1, "tags");
    /// assert_eq!(TAGS.shape, Shape::Container(ContainerKind::Sequence));
    /// ```
    pub const fn of<T: DeclaredShape + ?Sized>(id: i16, name: &'static str) -> Self {
        Self::new(id, name, T::SHAPE)
    }

    /// Descriptor with a runtime-provided name (schema-driven records)
    pub fn owned(id: i16, name: String, shape: Shape) -> Self {
        Self {
            id,
            name: Cow::Owned(name),
            shape,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// ── Container handles ──────────────────────────────────────

/// Type-erased handle on a container-shaped field value
///
/// This is everything the normalizer needs to know about a collection:
/// its category, whether it is present, how many elements it holds, and how
/// to flip it between absent and present-but-empty.
pub trait Container {
    fn kind(&self) -> ContainerKind;

    /// Element count, or `None` while the value is absent
    fn len(&self) -> Option<usize>;

    fn is_absent(&self) -> bool {
        self.len().is_none()
    }

    /// Replace the value with an empty container of the same category
    fn fill_empty(&mut self);

    /// Make the value absent
    fn make_absent(&mut self);
}

impl<C: Container + ?Sized> Container for &mut C {
    fn kind(&self) -> ContainerKind {
        (**self).kind()
    }

    fn len(&self) -> Option<usize> {
        (**self).len()
    }

    fn fill_empty(&mut self) {
        (**self).fill_empty()
    }

    fn make_absent(&mut self) {
        (**self).make_absent()
    }
}

macro_rules! option_container {
    ($kind:expr, [$($gen:tt)*], $ty:ty) => {
        impl<$($gen)*> Container for Option<$ty> {
            fn kind(&self) -> ContainerKind {
                $kind
            }

            fn len(&self) -> Option<usize> {
                self.as_ref().map(|c| c.len())
            }

            fn fill_empty(&mut self) {
                *self = Some(Default::default());
            }

            fn make_absent(&mut self) {
                *self = None;
            }
        }
    };
}

option_container!(ContainerKind::Sequence, [T], Vec<T>);
option_container!(ContainerKind::Sequence, [T], VecDeque<T>);
option_container!(ContainerKind::Set, [T: Eq + Hash, S: BuildHasher + Default], HashSet<T, S>);
option_container!(ContainerKind::Set, [T: Ord], BTreeSet<T>);
option_container!(ContainerKind::Mapping, [K: Eq + Hash, V, S: BuildHasher + Default], HashMap<K, V, S>);
option_container!(ContainerKind::Mapping, [K: Ord, V], BTreeMap<K, V>);
