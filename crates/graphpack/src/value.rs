// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The dynamic value model.
//!
//! Every node in a serializable graph is a [`Value`]. Inline kinds
//! (primitives, strings, stamps, enum values, type names) are copied by
//! value; `Bytes`, `Array`, `List`, `Map` and `Object` are identity-bearing:
//! they sit behind an `Rc` and two fields holding the same `Rc` encode as the
//! same object index. This arena-friendly split is what lets the format
//! represent shared references and cycles without duplication.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::object::ObjHandle;
use crate::wire::{Reader, Writer};

/// Fixed-width primitive kinds, in wire-tag order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Char,
}

impl PrimKind {
    pub(crate) fn wire_tag(self) -> u8 {
        match self {
            PrimKind::Bool => 0,
            PrimKind::I8 => 1,
            PrimKind::U8 => 2,
            PrimKind::I16 => 3,
            PrimKind::U16 => 4,
            PrimKind::I32 => 5,
            PrimKind::U32 => 6,
            PrimKind::I64 => 7,
            PrimKind::U64 => 8,
            PrimKind::F32 => 9,
            PrimKind::F64 => 10,
            PrimKind::Char => 11,
        }
    }

    pub(crate) fn from_wire_tag(tag: u8) -> Option<PrimKind> {
        Some(match tag {
            0 => PrimKind::Bool,
            1 => PrimKind::I8,
            2 => PrimKind::U8,
            3 => PrimKind::I16,
            4 => PrimKind::U16,
            5 => PrimKind::I32,
            6 => PrimKind::U32,
            7 => PrimKind::I64,
            8 => PrimKind::U64,
            9 => PrimKind::F32,
            10 => PrimKind::F64,
            11 => PrimKind::Char,
            _ => return None,
        })
    }

    /// Encoded size of one value of this kind.
    pub fn byte_len(self) -> usize {
        match self {
            PrimKind::Bool | PrimKind::I8 | PrimKind::U8 => 1,
            PrimKind::I16 | PrimKind::U16 => 2,
            PrimKind::I32 | PrimKind::U32 | PrimKind::F32 | PrimKind::Char => 4,
            PrimKind::I64 | PrimKind::U64 | PrimKind::F64 => 8,
        }
    }

    /// Stable textual name, used in wire type identities like `#array:i32`.
    pub fn name(self) -> &'static str {
        match self {
            PrimKind::Bool => "bool",
            PrimKind::I8 => "i8",
            PrimKind::U8 => "u8",
            PrimKind::I16 => "i16",
            PrimKind::U16 => "u16",
            PrimKind::I32 => "i32",
            PrimKind::U32 => "u32",
            PrimKind::I64 => "i64",
            PrimKind::U64 => "u64",
            PrimKind::F32 => "f32",
            PrimKind::F64 => "f64",
            PrimKind::Char => "char",
        }
    }

    pub(crate) fn from_name(name: &str) -> Option<PrimKind> {
        Some(match name {
            "bool" => PrimKind::Bool,
            "i8" => PrimKind::I8,
            "u8" => PrimKind::U8,
            "i16" => PrimKind::I16,
            "u16" => PrimKind::U16,
            "i32" => PrimKind::I32,
            "u32" => PrimKind::U32,
            "i64" => PrimKind::I64,
            "u64" => PrimKind::U64,
            "f32" => PrimKind::F32,
            "f64" => PrimKind::F64,
            "char" => PrimKind::Char,
            _ => return None,
        })
    }
}

/// One primitive value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prim {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Char(char),
}

impl Prim {
    /// Zero value of a kind. Nulls stored in declared primitive slots decode
    /// as this.
    pub(crate) fn default_of(kind: PrimKind) -> Prim {
        match kind {
            PrimKind::Bool => Prim::Bool(false),
            PrimKind::I8 => Prim::I8(0),
            PrimKind::U8 => Prim::U8(0),
            PrimKind::I16 => Prim::I16(0),
            PrimKind::U16 => Prim::U16(0),
            PrimKind::I32 => Prim::I32(0),
            PrimKind::U32 => Prim::U32(0),
            PrimKind::I64 => Prim::I64(0),
            PrimKind::U64 => Prim::U64(0),
            PrimKind::F32 => Prim::F32(0.0),
            PrimKind::F64 => Prim::F64(0.0),
            PrimKind::Char => Prim::Char('\0'),
        }
    }

    pub fn kind(&self) -> PrimKind {
        match self {
            Prim::Bool(_) => PrimKind::Bool,
            Prim::I8(_) => PrimKind::I8,
            Prim::U8(_) => PrimKind::U8,
            Prim::I16(_) => PrimKind::I16,
            Prim::U16(_) => PrimKind::U16,
            Prim::I32(_) => PrimKind::I32,
            Prim::U32(_) => PrimKind::U32,
            Prim::I64(_) => PrimKind::I64,
            Prim::U64(_) => PrimKind::U64,
            Prim::F32(_) => PrimKind::F32,
            Prim::F64(_) => PrimKind::F64,
            Prim::Char(_) => PrimKind::Char,
        }
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        match *self {
            Prim::Bool(v) => w.write_u8(u8::from(v)),
            Prim::I8(v) => w.write_u8(v as u8),
            Prim::U8(v) => w.write_u8(v),
            Prim::I16(v) => w.write_u16(v as u16),
            Prim::U16(v) => w.write_u16(v),
            Prim::I32(v) => w.write_u32(v as u32),
            Prim::U32(v) => w.write_u32(v),
            Prim::I64(v) => w.write_u64(v as u64),
            Prim::U64(v) => w.write_u64(v),
            Prim::F32(v) => w.write_u32(v.to_bits()),
            Prim::F64(v) => w.write_u64(v.to_bits()),
            Prim::Char(v) => w.write_u32(v as u32),
        }
    }

    pub(crate) fn read(r: &mut Reader<'_>, kind: PrimKind) -> Result<Prim> {
        Ok(match kind {
            PrimKind::Bool => Prim::Bool(r.read_u8()? != 0),
            PrimKind::I8 => Prim::I8(r.read_u8()? as i8),
            PrimKind::U8 => Prim::U8(r.read_u8()?),
            PrimKind::I16 => Prim::I16(r.read_u16()? as i16),
            PrimKind::U16 => Prim::U16(r.read_u16()?),
            PrimKind::I32 => Prim::I32(r.read_u32()? as i32),
            PrimKind::U32 => Prim::U32(r.read_u32()?),
            PrimKind::I64 => Prim::I64(r.read_u64()? as i64),
            PrimKind::U64 => Prim::U64(r.read_u64()?),
            PrimKind::F32 => Prim::F32(f32::from_bits(r.read_u32()?)),
            PrimKind::F64 => Prim::F64(f64::from_bits(r.read_u64()?)),
            PrimKind::Char => {
                let raw = r.read_u32()?;
                let offset = r.offset();
                Prim::Char(
                    char::from_u32(raw)
                        .ok_or_else(|| Error::read_failed(offset, "invalid char scalar"))?,
                )
            }
        })
    }
}

/// Time-zone designation of a [`Stamp`], preserved across round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampZone {
    Utc,
    Local,
    Unspecified,
}

impl StampZone {
    pub(crate) fn wire_tag(self) -> u8 {
        match self {
            StampZone::Utc => 0,
            StampZone::Local => 1,
            StampZone::Unspecified => 2,
        }
    }

    pub(crate) fn from_wire_tag(tag: u8) -> Option<StampZone> {
        Some(match tag {
            0 => StampZone::Utc,
            1 => StampZone::Local,
            2 => StampZone::Unspecified,
            _ => return None,
        })
    }
}

/// Point in time: nanoseconds since the Unix epoch plus a zone kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub unix_nanos: i64,
    pub zone: StampZone,
}

impl Stamp {
    pub fn utc(unix_nanos: i64) -> Stamp {
        Stamp {
            unix_nanos,
            zone: StampZone::Utc,
        }
    }
}

/// Enum value: the registered enum's name plus the variant tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumVal {
    pub type_name: Rc<str>,
    pub tag: i32,
}

/// Uniform primitive-element array (the fast path between `Bytes` and
/// `List`). Element kind is fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimArray {
    elem: PrimKind,
    items: Vec<Prim>,
}

impl PrimArray {
    pub fn new(elem: PrimKind) -> PrimArray {
        PrimArray {
            elem,
            items: Vec::new(),
        }
    }

    pub fn elem_kind(&self) -> PrimKind {
        self.elem
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Prim] {
        &self.items
    }

    pub fn push(&mut self, v: Prim) -> Result<()> {
        if v.kind() != self.elem {
            return Err(Error::KindMismatch {
                expected: self.elem.name(),
                found: v.kind().name(),
            });
        }
        self.items.push(v);
        Ok(())
    }

    pub(crate) fn push_unchecked(&mut self, v: Prim) {
        debug_assert_eq!(v.kind(), self.elem);
        self.items.push(v);
    }
}

/// `Vec<prim>` conversions for every fixed-width element kind. `u8` is
/// deliberately absent: byte buffers belong in `Value::Bytes`.
macro_rules! impl_prim_array_from {
    ($($rust:ty => $kind:ident),* $(,)?) => {
        $(impl From<Vec<$rust>> for PrimArray {
            fn from(v: Vec<$rust>) -> PrimArray {
                PrimArray {
                    elem: PrimKind::$kind,
                    items: v.into_iter().map(Prim::$kind).collect(),
                }
            }
        })*
    };
}

impl_prim_array_from!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
);

/// Shared handle types. Two `Value`s holding clones of the same `Rc` are the
/// same object for serialization purposes.
pub type BytesRef = Rc<RefCell<Vec<u8>>>;
pub type ArrayRef = Rc<RefCell<PrimArray>>;
pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type MapRef = Rc<RefCell<Vec<(Value, Value)>>>;

/// Opaque object identity (pointer-derived). Only valid while the underlying
/// allocation is alive; used as a key inside a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(usize);

impl ObjId {
    pub(crate) fn of<T: ?Sized>(rc: &Rc<T>) -> ObjId {
        ObjId(Rc::as_ptr(rc) as *const u8 as usize)
    }
}

/// A node in a serializable object graph.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Prim(Prim),
    Str(Rc<str>),
    Stamp(Stamp),
    /// Duration in nanoseconds.
    Span(i64),
    EnumVal(EnumVal),
    /// A type identity captured as a value (the `Type` instance analog).
    TypeName(Rc<str>),
    Bytes(BytesRef),
    Array(ArrayRef),
    List(ListRef),
    Map(MapRef),
    Object(ObjHandle),
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn bytes(data: Vec<u8>) -> Value {
        Value::Bytes(Rc::new(RefCell::new(data)))
    }

    pub fn array(a: PrimArray) -> Value {
        Value::Array(Rc::new(RefCell::new(a)))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Identity key for identity-bearing values; `None` for inline kinds.
    pub fn identity(&self) -> Option<ObjId> {
        match self {
            Value::Bytes(rc) => Some(ObjId::of(rc)),
            Value::Array(rc) => Some(ObjId::of(rc)),
            Value::List(rc) => Some(ObjId::of(rc)),
            Value::Map(rc) => Some(ObjId::of(rc)),
            Value::Object(h) => Some(h.id()),
            _ => None,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Prim(p) => p.kind().name(),
            Value::Str(_) => "str",
            Value::Stamp(_) => "stamp",
            Value::Span(_) => "span",
            Value::EnumVal(_) => "enum",
            Value::TypeName(_) => "type-name",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(_) => "object",
        }
    }

    pub fn as_prim(&self) -> Option<Prim> {
        match self {
            Value::Prim(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Prim(Prim::I32(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjHandle> {
        match self {
            Value::Object(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&BytesRef> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Shallow equality: inline kinds by value, identity-bearing kinds by
    /// identity. For graph-shape comparison use [`crate::structural_eq`].
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Prim(a), Value::Prim(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Stamp(a), Value::Stamp(b)) => a == b,
            (Value::Span(a), Value::Span(b)) => a == b,
            (Value::EnumVal(a), Value::EnumVal(b)) => a == b,
            (Value::TypeName(a), Value::TypeName(b)) => a == b,
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Prim(Prim::Bool(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Prim(Prim::I32(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Prim(Prim::I64(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Value {
        Value::Prim(Prim::U32(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Prim(Prim::U64(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Prim(Prim::F64(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::str(v)
    }
}

impl From<Prim> for Value {
    fn from(v: Prim) -> Value {
        Value::Prim(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prim_roundtrip_through_cursor() {
        let prims = [
            Prim::Bool(true),
            Prim::I8(-3),
            Prim::U8(200),
            Prim::I16(-1234),
            Prim::U16(40000),
            Prim::I32(-7),
            Prim::U32(0xDEAD_BEEF),
            Prim::I64(i64::MIN),
            Prim::U64(u64::MAX),
            Prim::F32(1.5),
            Prim::F64(-2.25),
            Prim::Char('\u{1F980}'),
        ];
        let mut w = Writer::new();
        for p in &prims {
            p.write(&mut w);
        }
        let buf = w.into_bytes();
        let mut r = Reader::new(&buf);
        for p in &prims {
            let back = Prim::read(&mut r, p.kind()).expect("read prim");
            assert_eq!(back, *p);
        }
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn identity_distinguishes_allocations() {
        let a = Value::list(vec![Value::from(1)]);
        let b = Value::list(vec![Value::from(1)]);
        let a2 = a.clone();
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity(), a2.identity());
        assert!(a.same(&a2));
        assert!(!a.same(&b));
    }

    #[test]
    fn prim_array_rejects_foreign_kind() {
        let mut arr = PrimArray::from(vec![1i32, 2, 3]);
        assert_eq!(arr.len(), 3);
        assert!(arr.push(Prim::I32(4)).is_ok());
        assert!(arr.push(Prim::F64(1.0)).is_err());
    }
}
