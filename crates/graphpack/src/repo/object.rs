// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed-object repositories, plus the placeholder repository for wire types
//! the current registry does not know.
//!
//! Bodies are encoded member-by-member using each member's declared kind. On
//! load the schema's member list drives decoding, and members map onto the
//! registered type's fields by name: a member the type no longer has is
//! decoded and dropped, a field the file does not carry stays null. Schema
//! drift is tolerated, never an error.

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::lazy::TypeRef;
use crate::load::{LoadSession, RawSite};
use crate::object::ObjHandle;
use crate::repo::{Shell, TypeDesc, TypeRepo};
use crate::save::SaveSession;
use crate::schema::MemberSchema;
use crate::value::Value;
use crate::wire::{Reader, Writer};

pub(super) fn create_unknown(
    desc: &TypeDesc,
    _members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    match desc {
        TypeDesc::Unresolved(name) => Some(Rc::new(UnknownRepo {
            desc: desc.clone(),
            name: name.clone(),
        })),
        _ => None,
    }
}

pub(super) fn create_object(
    desc: &TypeDesc,
    members: Option<&[MemberSchema]>,
) -> Option<Rc<dyn TypeRepo>> {
    let def = match desc {
        TypeDesc::Object(def) => def.clone(),
        _ => return None,
    };
    let wire_members: Vec<MemberSchema> = match members {
        Some(m) => m.to_vec(),
        None => def
            .fields()
            .iter()
            .map(|f| MemberSchema {
                name: f.name().to_string(),
                kind: f.kind().clone(),
            })
            .collect(),
    };
    let field_map = wire_members
        .iter()
        .map(|m| def.field_index(&m.name))
        .collect();
    Some(Rc::new(ObjectRepo {
        desc: desc.clone(),
        def,
        wire_members,
        field_map,
    }))
}

struct ObjectRepo {
    desc: TypeDesc,
    def: Rc<crate::registry::TypeDef>,
    /// Member list driving body decode. On save this mirrors the type's
    /// fields; on load it comes from the file's schema table.
    wire_members: Vec<MemberSchema>,
    /// Wire member index to local field slot, by name.
    field_map: Vec<Option<usize>>,
}

impl TypeRepo for ObjectRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn members(&self) -> Vec<MemberSchema> {
        self.wire_members.clone()
    }

    fn add_children(&self, v: &Value, sess: &mut SaveSession) -> Result<()> {
        let handle = expect_object(v)?;
        for idx in 0..handle.slot_count() {
            let child = handle.get_at(idx)?;
            sess.register_value(&child)?;
        }
        Ok(())
    }

    fn save_body(&self, v: &Value, w: &mut Writer, sess: &SaveSession) -> Result<()> {
        let handle = expect_object(v)?;
        for (idx, field) in self.def.fields().iter().enumerate() {
            let child = handle.get_at(idx)?;
            sess.write_declared(field.kind(), &child, w)?;
        }
        Ok(())
    }

    fn create_shell(&self, _t: u16, _i: u32, _sess: &mut LoadSession) -> Result<Shell> {
        Ok(Shell::pending(Value::Object(ObjHandle::fresh(
            self.def.clone(),
        ))))
    }

    fn load_body(&self, v: &Value, r: &mut Reader<'_>, sess: &mut LoadSession) -> Result<()> {
        let handle = expect_object(v)?;
        for (wire_idx, member) in self.wire_members.iter().enumerate() {
            let site = sess.read_declared(&member.kind, r)?;
            let slot = match self.field_map[wire_idx] {
                Some(slot) => slot,
                // Member dropped from the type; bytes consumed, value gone.
                None => continue,
            };
            let lazy = sess.lazy() && self.def.fields()[slot].is_lazy();
            match site {
                RawSite::Indexed(t, i) if lazy => handle.set_deferred_at(
                    slot,
                    TypeRef {
                        session: sess.weak(),
                        type_index: t,
                        object_index: i,
                    },
                ),
                site => {
                    let value = sess.materialize(site)?;
                    handle.set_at(slot, value);
                }
            }
        }
        Ok(())
    }
}

fn expect_object(v: &Value) -> Result<&ObjHandle> {
    v.as_object().ok_or(Error::KindMismatch {
        expected: "object",
        found: "non-object in object repository",
    })
}

/// Stands in for a wire type with no registered counterpart. Every instance
/// loads as null; the type name is reported through
/// [`crate::LoadedGraph::unresolved_types`].
struct UnknownRepo {
    desc: TypeDesc,
    name: String,
}

impl TypeRepo for UnknownRepo {
    fn desc(&self) -> &TypeDesc {
        &self.desc
    }

    fn create_shell(&self, _t: u16, _i: u32, sess: &mut LoadSession) -> Result<Shell> {
        sess.note_unresolved(&self.name);
        Ok(Shell::done(Value::Null))
    }
}
