// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collection repositories: lists and maps. Children are arbitrary values,
//! encoded as self-describing references. Shells are pre-sized from the
//! block header so a collection containing itself resolves to the memoized
//! shell instead of recursing.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::load::LoadSession;
use crate::repo::{Shell, TypeDesc, TypeRepo};
use crate::save::SaveSession;
use crate::schema::MemberSchema;
use crate::value::Value;
use crate::wire::{Reader, Writer};

pub(super) fn create_list(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::List => Some(Rc::new(ListRepo { desc: desc.clone() })),
        _ => None,
    }
}

pub(super) fn create_map(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Map => Some(Rc::new(MapRepo { desc: desc.clone() })),
        _ => None,
    }
}

struct ListRepo {
    desc: TypeDesc,
}

impl TypeRepo for ListRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn add_children(&self, v: &Value, sess: &mut SaveSession) -> Result<()> {
        let items = match v {
            Value::List(l) => l.borrow().clone(),
            other => {
                return Err(Error::KindMismatch {
                    expected: "list",
                    found: other.kind_name(),
                })
            }
        };
        for item in &items {
            sess.register_value(item)?;
        }
        Ok(())
    }

    fn write_custom_header(&self, objects: &[Value], w: &mut Writer) -> Result<()> {
        for v in objects {
            match v {
                Value::List(l) => w.write_u32(l.borrow().len() as u32),
                other => {
                    return Err(Error::KindMismatch {
                        expected: "list",
                        found: other.kind_name(),
                    })
                }
            }
        }
        Ok(())
    }

    fn read_custom_header(&self, r: &mut Reader<'_>, num_objects: u32) -> Result<Vec<u32>> {
        read_counts(r, num_objects)
    }

    fn save_body(&self, v: &Value, w: &mut Writer, sess: &SaveSession) -> Result<()> {
        let items = match v {
            Value::List(l) => l.borrow().clone(),
            other => {
                return Err(Error::KindMismatch {
                    expected: "list",
                    found: other.kind_name(),
                })
            }
        };
        for item in &items {
            sess.write_any(item, w)?;
        }
        Ok(())
    }

    fn create_shell(&self, t: u16, i: u32, sess: &mut LoadSession) -> Result<Shell> {
        let count = sess.count(t, i)? as usize;
        let (offset, len) = sess.body_span(t, i)?;
        // Every element occupies at least its flag byte.
        if count > len {
            return Err(Error::read_failed(offset, "element count exceeds body size"));
        }
        Ok(Shell::pending(Value::list(vec![Value::Null; count])))
    }

    fn load_body(&self, v: &Value, r: &mut Reader<'_>, sess: &mut LoadSession) -> Result<()> {
        let list = v
            .as_list()
            .ok_or(Error::Internal("list shell is not a list"))?
            .clone();
        let count = list.borrow().len();
        for idx in 0..count {
            let site = sess.read_any(r)?;
            let item = sess.materialize(site)?;
            list.borrow_mut()[idx] = item;
        }
        Ok(())
    }
}

struct MapRepo {
    desc: TypeDesc,
}

impl TypeRepo for MapRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn add_children(&self, v: &Value, sess: &mut SaveSession) -> Result<()> {
        let entries = match v {
            Value::Map(m) => m.borrow().clone(),
            other => {
                return Err(Error::KindMismatch {
                    expected: "map",
                    found: other.kind_name(),
                })
            }
        };
        for (key, value) in &entries {
            sess.register_value(key)?;
            sess.register_value(value)?;
        }
        Ok(())
    }

    fn write_custom_header(&self, objects: &[Value], w: &mut Writer) -> Result<()> {
        for v in objects {
            match v {
                Value::Map(m) => w.write_u32(m.borrow().len() as u32),
                other => {
                    return Err(Error::KindMismatch {
                        expected: "map",
                        found: other.kind_name(),
                    })
                }
            }
        }
        Ok(())
    }

    fn read_custom_header(&self, r: &mut Reader<'_>, num_objects: u32) -> Result<Vec<u32>> {
        read_counts(r, num_objects)
    }

    fn save_body(&self, v: &Value, w: &mut Writer, sess: &SaveSession) -> Result<()> {
        let entries = match v {
            Value::Map(m) => m.borrow().clone(),
            other => {
                return Err(Error::KindMismatch {
                    expected: "map",
                    found: other.kind_name(),
                })
            }
        };
        for (key, value) in &entries {
            sess.write_any(key, w)?;
            sess.write_any(value, w)?;
        }
        Ok(())
    }

    fn create_shell(&self, t: u16, i: u32, sess: &mut LoadSession) -> Result<Shell> {
        let count = sess.count(t, i)? as usize;
        let (offset, len) = sess.body_span(t, i)?;
        // Each entry is a key and a value, one flag byte apiece.
        if count > len / 2 {
            return Err(Error::read_failed(offset, "entry count exceeds body size"));
        }
        Ok(Shell::pending(Value::map(vec![
            (Value::Null, Value::Null);
            count
        ])))
    }

    fn load_body(&self, v: &Value, r: &mut Reader<'_>, sess: &mut LoadSession) -> Result<()> {
        let map = v
            .as_map()
            .ok_or(Error::Internal("map shell is not a map"))?
            .clone();
        let count = map.borrow().len();
        for idx in 0..count {
            let key_site = sess.read_any(r)?;
            let key = sess.materialize(key_site)?;
            let value_site = sess.read_any(r)?;
            let value = sess.materialize(value_site)?;
            map.borrow_mut()[idx] = (key, value);
        }
        Ok(())
    }
}

fn read_counts(r: &mut Reader<'_>, num_objects: u32) -> Result<Vec<u32>> {
    let mut counts = Vec::with_capacity(num_objects as usize);
    for _ in 0..num_objects {
        counts.push(r.read_u32()?);
    }
    Ok(counts)
}
