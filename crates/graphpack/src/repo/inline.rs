// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inline repositories: primitives, enum values, stamps, spans and type
//! names. These are embedded directly at the reference site, so the only
//! thing a repository contributes is the payload codec and a type identity
//! for self-describing (`Any`) slots.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::load::LoadSession;
use crate::repo::{TypeDesc, TypeRepo};
use crate::schema::MemberSchema;
use crate::value::{EnumVal, Prim, PrimKind, Stamp, StampZone, Value};
use crate::wire::{Reader, Writer};

pub(super) fn create_primitive(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Prim(kind) => Some(Rc::new(PrimRepo {
            desc: desc.clone(),
            kind: *kind,
        })),
        _ => None,
    }
}

pub(super) fn create_enum(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Enum(name) => Some(Rc::new(EnumRepo {
            desc: desc.clone(),
            name: name.clone(),
        })),
        _ => None,
    }
}

pub(super) fn create_stamp(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Stamp => Some(Rc::new(StampRepo { desc: desc.clone() })),
        _ => None,
    }
}

pub(super) fn create_span(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Span => Some(Rc::new(SpanRepo { desc: desc.clone() })),
        _ => None,
    }
}

pub(super) fn create_type_name(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::TypeName => Some(Rc::new(TypeNameRepo { desc: desc.clone() })),
        _ => None,
    }
}

struct PrimRepo {
    desc: TypeDesc,
    kind: PrimKind,
}

impl TypeRepo for PrimRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn write_inline(&self, v: &Value, w: &mut Writer) -> Result<()> {
        match v {
            Value::Prim(p) if p.kind() == self.kind => {
                p.write(w);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: self.kind.name(),
                found: other.kind_name(),
            }),
        }
    }

    fn read_inline(&self, r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<Value> {
        Ok(Value::Prim(Prim::read(r, self.kind)?))
    }
}

struct EnumRepo {
    desc: TypeDesc,
    name: Rc<str>,
}

impl TypeRepo for EnumRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn write_inline(&self, v: &Value, w: &mut Writer) -> Result<()> {
        match v {
            Value::EnumVal(e) => {
                w.write_i32(e.tag);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "enum",
                found: other.kind_name(),
            }),
        }
    }

    fn read_inline(&self, r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<Value> {
        let tag = r.read_i32()?;
        Ok(Value::EnumVal(EnumVal {
            type_name: self.name.clone(),
            tag,
        }))
    }
}

pub(crate) fn write_stamp(stamp: Stamp, w: &mut Writer) {
    w.write_i64(stamp.unix_nanos);
    w.write_u8(stamp.zone.wire_tag());
}

pub(crate) fn read_stamp(r: &mut Reader<'_>) -> Result<Stamp> {
    let unix_nanos = r.read_i64()?;
    let offset = r.offset();
    let tag = r.read_u8()?;
    let zone = StampZone::from_wire_tag(tag)
        .ok_or_else(|| Error::read_failed(offset, "bad stamp zone tag"))?;
    Ok(Stamp { unix_nanos, zone })
}

struct StampRepo {
    desc: TypeDesc,
}

impl TypeRepo for StampRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn write_inline(&self, v: &Value, w: &mut Writer) -> Result<()> {
        match v {
            Value::Stamp(s) => {
                write_stamp(*s, w);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "stamp",
                found: other.kind_name(),
            }),
        }
    }

    fn read_inline(&self, r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<Value> {
        Ok(Value::Stamp(read_stamp(r)?))
    }
}

struct SpanRepo {
    desc: TypeDesc,
}

impl TypeRepo for SpanRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn write_inline(&self, v: &Value, w: &mut Writer) -> Result<()> {
        match v {
            Value::Span(nanos) => {
                w.write_i64(*nanos);
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "span",
                found: other.kind_name(),
            }),
        }
    }

    fn read_inline(&self, r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<Value> {
        Ok(Value::Span(r.read_i64()?))
    }
}

struct TypeNameRepo {
    desc: TypeDesc,
}

impl TypeRepo for TypeNameRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn write_inline(&self, v: &Value, w: &mut Writer) -> Result<()> {
        match v {
            Value::TypeName(name) => w.write_str(name),
            other => Err(Error::KindMismatch {
                expected: "type-name",
                found: other.kind_name(),
            }),
        }
    }

    fn read_inline(&self, r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<Value> {
        Ok(Value::TypeName(Rc::from(r.read_str()?.as_str())))
    }
}
