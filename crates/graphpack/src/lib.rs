// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Identity-preserving binary object-graph serialization.
//!
//! graphpack encodes arbitrary object graphs, shared references and cycles
//! included, into a compact versioned binary format. Object identity is the
//! core contract: two fields holding the same allocation before a save hold
//! the same allocation after the matching load. The engine is built from a
//! dynamic value model ([`Value`]), an immutable type registry
//! ([`TypeRegistry`]), per-type object repositories addressed by
//! `(type index, object index)`, and explicit work queues everywhere a
//! graph is walked, so deep or cyclic graphs never exhaust the call stack.
//!
//! ```
//! use graphpack::{Kind, LoadMode, Serializer, TypeDef, TypeRegistry, Value};
//!
//! let mut builder = TypeRegistry::builder();
//! builder.object(
//!     TypeDef::new("person")
//!         .field("name", Kind::Str)
//!         .field("best", Kind::Ref("person".into())),
//! );
//! let registry = builder.build()?;
//!
//! let alice = registry.new_object("person")?;
//! alice.set("name", Value::str("alice"))?;
//! // A cycle: alice is her own best friend.
//! alice.set("best", Value::Object(alice.clone()))?;
//!
//! let serializer = Serializer::new(registry);
//! let bytes = serializer.save("people", &Value::Object(alice))?;
//!
//! let loaded = serializer.load(bytes, LoadMode::Eager)?;
//! let root = loaded.root().as_object().unwrap();
//! assert_eq!(root.get("name")?.as_str(), Some("alice"));
//! let best = root.get("best")?;
//! assert_eq!(best.as_object().unwrap().id(), root.id());
//! # Ok::<(), graphpack::Error>(())
//! ```
//!
//! Plain tree-shaped Rust types can skip the dynamic API entirely with
//! `#[derive(GraphType)]` plus [`Serializer::save_as`] /
//! [`Serializer::load_as`].

mod clone;
mod error;
mod lazy;
mod load;
mod object;
mod registry;
mod repo;
mod save;
mod schema;
mod store;
mod typed;
mod value;
mod wire;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

pub use clone::{deep_clone, try_deep_clone};
pub use error::{Error, Result};
pub use load::{FileInfo, LoadMode, LoadedGraph, TypeInfo};
pub use object::ObjHandle;
pub use registry::{EnumDef, FieldDef, Kind, TypeDef, TypeRegistry, TypeRegistryBuilder};
pub use repo::RepoChain;
pub use store::{FileStore, MemoryStore};
pub use typed::GraphType;
pub use value::{
    ArrayRef, BytesRef, EnumVal, ListRef, MapRef, ObjId, Prim, PrimArray, PrimKind, Stamp,
    StampZone, Value,
};

pub use graphpack_codegen::GraphType;

/// Shared string pool. Optional: attach one with
/// [`Serializer::with_interner`] and equal strings loaded across files share
/// one allocation.
#[derive(Debug, Clone, Default)]
pub struct Interner(Rc<RefCell<HashMap<String, Rc<str>>>>);

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    pub fn intern(&self, s: &str) -> Rc<str> {
        let mut pool = self.0.borrow_mut();
        if let Some(rc) = pool.get(s) {
            return rc.clone();
        }
        let rc: Rc<str> = Rc::from(s);
        pool.insert(s.to_string(), rc.clone());
        rc
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// The engine façade: a type registry plus a repository creator chain.
///
/// Cheap to clone; clones share the registry and chain.
#[derive(Debug, Clone)]
pub struct Serializer {
    registry: Arc<TypeRegistry>,
    chain: Arc<RepoChain>,
    interner: Option<Interner>,
}

impl Serializer {
    pub fn new(registry: Arc<TypeRegistry>) -> Serializer {
        Serializer::with_chain(registry, RepoChain::default())
    }

    /// Use a custom repository creator chain. The chain is fixed for the
    /// serializer's lifetime.
    pub fn with_chain(registry: Arc<TypeRegistry>, chain: RepoChain) -> Serializer {
        Serializer {
            registry,
            chain: Arc::new(chain),
            interner: None,
        }
    }

    /// Attach a shared string pool used by subsequent loads.
    pub fn with_interner(mut self, interner: Interner) -> Serializer {
        self.interner = Some(interner);
        self
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Encode `root` and everything reachable from it.
    pub fn save(&self, name: &str, root: &Value) -> Result<Vec<u8>> {
        save::save_bytes(self.registry.clone(), self.chain.clone(), name, root)
    }

    /// Decode a file produced by [`Serializer::save`].
    pub fn load(&self, bytes: Vec<u8>, mode: LoadMode) -> Result<LoadedGraph> {
        load::load_bytes(
            self.registry.clone(),
            self.chain.clone(),
            self.interner.clone(),
            bytes,
            mode,
        )
    }

    /// Check preamble, schema table and block bounds without materializing
    /// any objects.
    pub fn validate(&self, bytes: &[u8]) -> Result<FileInfo> {
        load::validate_bytes(bytes)
    }

    /// Encode a `#[derive(GraphType)]` value.
    pub fn save_as<T: GraphType>(&self, name: &str, value: &T) -> Result<Vec<u8>> {
        let root = value.to_value(&self.registry)?;
        self.save(name, &root)
    }

    /// Decode into a `#[derive(GraphType)]` value.
    pub fn load_as<T: GraphType>(&self, bytes: Vec<u8>) -> Result<T> {
        let loaded = self.load(bytes, LoadMode::Eager)?;
        T::from_value(loaded.root(), &self.registry)
    }
}

/// Structural graph equality: inline values by content, objects and
/// collections recursively, cycles handled by memoizing visited pairs.
/// Resolves lazy fields along the way, hence the `Result`.
pub fn structural_eq(a: &Value, b: &Value) -> Result<bool> {
    let mut seen: HashSet<(ObjId, ObjId)> = HashSet::new();
    let mut stack = vec![(a.clone(), b.clone())];
    while let Some((a, b)) = stack.pop() {
        match (&a, &b) {
            (Value::Null, Value::Null) => {}
            (Value::Prim(x), Value::Prim(y)) => {
                if x != y {
                    return Ok(false);
                }
            }
            (Value::Str(x), Value::Str(y)) => {
                if x != y {
                    return Ok(false);
                }
            }
            (Value::Stamp(x), Value::Stamp(y)) => {
                if x != y {
                    return Ok(false);
                }
            }
            (Value::Span(x), Value::Span(y)) => {
                if x != y {
                    return Ok(false);
                }
            }
            (Value::EnumVal(x), Value::EnumVal(y)) => {
                if x != y {
                    return Ok(false);
                }
            }
            (Value::TypeName(x), Value::TypeName(y)) => {
                if x != y {
                    return Ok(false);
                }
            }
            (Value::Bytes(x), Value::Bytes(y)) => {
                if !Rc::ptr_eq(x, y) && *x.borrow() != *y.borrow() {
                    return Ok(false);
                }
            }
            (Value::Array(x), Value::Array(y)) => {
                if !Rc::ptr_eq(x, y) && *x.borrow() != *y.borrow() {
                    return Ok(false);
                }
            }
            (Value::List(x), Value::List(y)) => {
                if !seen.insert((ObjId::of(x), ObjId::of(y))) {
                    continue;
                }
                let (x, y) = (x.borrow().clone(), y.borrow().clone());
                if x.len() != y.len() {
                    return Ok(false);
                }
                stack.extend(x.into_iter().zip(y));
            }
            (Value::Map(x), Value::Map(y)) => {
                if !seen.insert((ObjId::of(x), ObjId::of(y))) {
                    continue;
                }
                let (x, y) = (x.borrow().clone(), y.borrow().clone());
                if x.len() != y.len() {
                    return Ok(false);
                }
                for ((xk, xv), (yk, yv)) in x.into_iter().zip(y) {
                    stack.push((xk, yk));
                    stack.push((xv, yv));
                }
            }
            (Value::Object(x), Value::Object(y)) => {
                if !seen.insert((x.id(), y.id())) {
                    continue;
                }
                if x.type_name() != y.type_name() || x.slot_count() != y.slot_count() {
                    return Ok(false);
                }
                for idx in 0..x.slot_count() {
                    stack.push((x.get_at(idx)?, y.get_at(idx)?));
                }
            }
            _ => return Ok(false),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_eq_handles_cycles() {
        let a = Value::list(vec![Value::Null]);
        a.as_list().unwrap().borrow_mut()[0] = a.clone();
        let b = Value::list(vec![Value::Null]);
        b.as_list().unwrap().borrow_mut()[0] = b.clone();

        assert!(structural_eq(&a, &b).unwrap());
        assert!(structural_eq(&a, &a).unwrap());
    }

    #[test]
    fn structural_eq_sees_content_differences() {
        let a = Value::list(vec![Value::from(1), Value::str("x")]);
        let b = Value::list(vec![Value::from(1), Value::str("y")]);
        assert!(!structural_eq(&a, &b).unwrap());
    }

    #[test]
    fn interner_shares_storage() {
        let interner = Interner::new();
        let a = interner.intern("hello");
        let b = interner.intern("hello");
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }
}
