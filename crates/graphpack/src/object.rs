// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic object records.
//!
//! A [`GObject`] is one instance of a registered type: its `TypeDef` plus
//! one slot per field. Each slot is a lazy cell: either a materialized
//! [`Value`] or a deferred [`TypeRef`] left behind by a lazy load. The cell
//! contract: resolve on first read, write the result back, and never let a
//! later resolution clobber a value the caller assigned with `set`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::lazy::TypeRef;
use crate::registry::TypeDef;
use crate::value::{ObjId, Value};

pub(crate) enum Slot {
    Value(Value),
    Deferred(TypeRef),
}

pub(crate) struct GObject {
    def: Rc<TypeDef>,
    slots: Vec<Slot>,
}

/// Shared handle to one object instance. Cloning the handle does not clone
/// the object; two handles over the same allocation are the same object for
/// serialization and identity purposes.
#[derive(Clone)]
pub struct ObjHandle(Rc<RefCell<GObject>>);

impl ObjHandle {
    /// Fresh instance with every field null.
    pub(crate) fn fresh(def: Rc<TypeDef>) -> ObjHandle {
        let slots = (0..def.fields().len())
            .map(|_| Slot::Value(Value::Null))
            .collect();
        ObjHandle(Rc::new(RefCell::new(GObject { def, slots })))
    }

    pub fn def(&self) -> Rc<TypeDef> {
        self.0.borrow().def.clone()
    }

    pub fn type_name(&self) -> Rc<str> {
        self.0.borrow().def.name().clone()
    }

    pub fn id(&self) -> ObjId {
        ObjId::of(&self.0)
    }

    fn index_of(&self, field: &str) -> Result<usize> {
        let inner = self.0.borrow();
        inner
            .def
            .field_index(field)
            .ok_or_else(|| Error::UnknownField {
                type_name: inner.def.name().to_string(),
                field: field.to_string(),
            })
    }

    /// Read a field by name, resolving a deferred slot on first access.
    pub fn get(&self, field: &str) -> Result<Value> {
        let idx = self.index_of(field)?;
        self.get_at(idx)
    }

    /// Assign a field by name. Marks the slot loaded: a pending lazy
    /// resolution for this slot is discarded, never applied over this value.
    pub fn set(&self, field: &str, value: Value) -> Result<()> {
        let idx = self.index_of(field)?;
        self.set_at(idx, value);
        Ok(())
    }

    /// Whether the field has been materialized (or assigned). A deferred
    /// slot reports `false` without resolving it.
    pub fn is_loaded(&self, field: &str) -> Result<bool> {
        let idx = self.index_of(field)?;
        Ok(matches!(self.0.borrow().slots[idx], Slot::Value(_)))
    }

    pub(crate) fn get_at(&self, idx: usize) -> Result<Value> {
        let pending = {
            let inner = self.0.borrow();
            match &inner.slots[idx] {
                Slot::Value(v) => return Ok(v.clone()),
                Slot::Deferred(r) => r.clone(),
            }
        };
        // Resolution drains the load queue and may touch other objects, so
        // the borrow must not be held across it.
        let value = pending.resolve()?;
        let mut inner = self.0.borrow_mut();
        // A set() that landed while the resolution ran wins; the caller gets
        // what the slot holds now, not the superseded resolution.
        if let Slot::Value(v) = &inner.slots[idx] {
            return Ok(v.clone());
        }
        inner.slots[idx] = Slot::Value(value.clone());
        Ok(value)
    }

    pub(crate) fn set_at(&self, idx: usize, value: Value) {
        self.0.borrow_mut().slots[idx] = Slot::Value(value);
    }

    pub(crate) fn set_deferred_at(&self, idx: usize, r: TypeRef) {
        self.0.borrow_mut().slots[idx] = Slot::Deferred(r);
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.0.borrow().slots.len()
    }
}

// Shallow on purpose: object graphs may be cyclic.
impl fmt::Debug for ObjHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ObjHandle({} @ {:p})",
            self.0.borrow().def.name(),
            Rc::as_ptr(&self.0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Kind, TypeDef, TypeRegistry};
    use crate::value::PrimKind;

    fn person_registry() -> std::sync::Arc<TypeRegistry> {
        let mut b = TypeRegistry::builder();
        b.object(
            TypeDef::new("person")
                .field("name", Kind::Str)
                .field("age", Kind::Prim(PrimKind::I32))
                .field("best", Kind::Ref("person".into())),
        );
        b.build().unwrap()
    }

    #[test]
    fn fresh_object_is_all_null() {
        let reg = person_registry();
        let p = reg.new_object("person").unwrap();
        assert!(p.get("name").unwrap().is_null());
        assert!(p.is_loaded("best").unwrap());
    }

    #[test]
    fn set_then_get() {
        let reg = person_registry();
        let p = reg.new_object("person").unwrap();
        p.set("age", Value::from(41)).unwrap();
        assert_eq!(p.get("age").unwrap().as_i32(), Some(41));
        assert!(matches!(
            p.set("height", Value::Null),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn self_reference_keeps_identity() {
        let reg = person_registry();
        let p = reg.new_object("person").unwrap();
        p.set("best", Value::Object(p.clone())).unwrap();
        let best = p.get("best").unwrap();
        assert_eq!(best.as_object().unwrap().id(), p.id());
    }
}
