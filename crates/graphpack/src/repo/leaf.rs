// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Leaf repositories: strings, byte buffers and uniform primitive arrays.
//!
//! Leaves are referenceable (shared references keep identity) but have no
//! child references, so they materialize completely when their shell is
//! created and never enter the body-decode queue. Strings additionally
//! deduplicate by content on save: two equal strings encode as one index.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::load::LoadSession;
use crate::repo::{Shell, TypeDesc, TypeRepo};
use crate::save::SaveSession;
use crate::schema::MemberSchema;
use crate::value::{Prim, PrimArray, PrimKind, Value};
use crate::wire::{Reader, Writer};

pub(super) fn create_string(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Str => Some(Rc::new(StringRepo { desc: desc.clone() })),
        _ => None,
    }
}

pub(super) fn create_bytes(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Bytes => Some(Rc::new(BytesRepo { desc: desc.clone() })),
        _ => None,
    }
}

pub(super) fn create_array(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Array(elem) => Some(Rc::new(ArrayRepo {
            desc: desc.clone(),
            elem: *elem,
        })),
        _ => None,
    }
}

struct StringRepo {
    desc: TypeDesc,
}

impl TypeRepo for StringRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn save_body(&self, v: &Value, w: &mut Writer, _sess: &SaveSession) -> Result<()> {
        match v {
            Value::Str(s) => {
                w.write_bytes(s.as_bytes());
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "str",
                found: other.kind_name(),
            }),
        }
    }

    fn create_shell(&self, t: u16, i: u32, sess: &mut LoadSession) -> Result<Shell> {
        let bytes = sess.bytes_rc();
        let (offset, len) = sess.body_span(t, i)?;
        let text = std::str::from_utf8(&bytes[offset..offset + len])?;
        Ok(Shell::done(Value::Str(sess.intern(text))))
    }
}

struct BytesRepo {
    desc: TypeDesc,
}

impl TypeRepo for BytesRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn save_body(&self, v: &Value, w: &mut Writer, _sess: &SaveSession) -> Result<()> {
        match v {
            Value::Bytes(b) => {
                w.write_bytes(&b.borrow());
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "bytes",
                found: other.kind_name(),
            }),
        }
    }

    fn create_shell(&self, t: u16, i: u32, sess: &mut LoadSession) -> Result<Shell> {
        let bytes = sess.bytes_rc();
        let (offset, len) = sess.body_span(t, i)?;
        Ok(Shell::done(Value::bytes(
            bytes[offset..offset + len].to_vec(),
        )))
    }
}

struct ArrayRepo {
    desc: TypeDesc,
    elem: PrimKind,
}

impl TypeRepo for ArrayRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    /// One element count per instance. The body carries raw elements only,
    /// so the count cannot be recovered from the size table alone once
    /// variable-width kinds exist.
    fn write_custom_header(&self, objects: &[Value], w: &mut Writer) -> Result<()> {
        for v in objects {
            match v {
                Value::Array(a) => w.write_u32(a.borrow().len() as u32),
                other => {
                    return Err(Error::KindMismatch {
                        expected: "array",
                        found: other.kind_name(),
                    })
                }
            }
        }
        Ok(())
    }

    fn read_custom_header(&self, r: &mut Reader<'_>, num_objects: u32) -> Result<Vec<u32>> {
        let mut counts = Vec::with_capacity(num_objects as usize);
        for _ in 0..num_objects {
            counts.push(r.read_u32()?);
        }
        Ok(counts)
    }

    fn save_body(&self, v: &Value, w: &mut Writer, _sess: &SaveSession) -> Result<()> {
        match v {
            Value::Array(a) => {
                let a = a.borrow();
                if a.elem_kind() != self.elem {
                    return Err(Error::KindMismatch {
                        expected: self.elem.name(),
                        found: a.elem_kind().name(),
                    });
                }
                for item in a.items() {
                    item.write(w);
                }
                Ok(())
            }
            other => Err(Error::KindMismatch {
                expected: "array",
                found: other.kind_name(),
            }),
        }
    }

    fn create_shell(&self, t: u16, i: u32, sess: &mut LoadSession) -> Result<Shell> {
        let bytes = sess.bytes_rc();
        let count = sess.count(t, i)?;
        let (offset, len) = sess.body_span(t, i)?;
        let mut r = Reader::new(&bytes[offset..offset + len]);
        let mut array = PrimArray::new(self.elem);
        for _ in 0..count {
            array.push_unchecked(Prim::read(&mut r, self.elem)?);
        }
        Ok(Shell::done(Value::array(array)))
    }
}
