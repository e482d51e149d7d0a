// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-type object repositories.
//!
//! Every type that appears in a file owns one repository: the repository
//! knows the type's wire identity, how to discover an instance's children,
//! and how to encode/decode instance bodies. Repositories are created by an
//! ordered chain of creator functions; the first creator that accepts a
//! [`TypeDesc`] wins. The chain is built once, owned by the
//! [`crate::Serializer`], and never mutated afterwards.
//!
//! Tiers decide the layout of the object-data section (leaves before objects
//! before collections) and whether a repository is referenceable at all:
//! `Inline` values are embedded at the reference site and never indexed.

mod collection;
mod inline;
mod leaf;
mod object;

pub(crate) use inline::{read_stamp, write_stamp};

use std::rc::Rc;

use crate::error::{Error, Result};
use crate::load::LoadSession;
use crate::registry::{TypeDef, TypeRegistry};
use crate::save::SaveSession;
use crate::schema::MemberSchema;
use crate::value::{PrimKind, Value};
use crate::wire::{Reader, Writer};

/// Runtime type descriptor of a repository: what family of values it holds.
#[derive(Debug, Clone)]
pub(crate) enum TypeDesc {
    /// Wire type name with no registered counterpart. Load-only; instances
    /// degrade to null.
    Unresolved(String),
    Prim(PrimKind),
    Enum(Rc<str>),
    Str,
    Stamp,
    Span,
    TypeName,
    Bytes,
    Array(PrimKind),
    List,
    Map,
    Object(Rc<TypeDef>),
}

impl TypeDesc {
    /// Descriptor of a live value. `Null` carries no type and never reaches
    /// a repository.
    pub(crate) fn of(v: &Value) -> Result<TypeDesc> {
        Ok(match v {
            Value::Null => return Err(Error::Internal("null value has no type descriptor")),
            Value::Prim(p) => TypeDesc::Prim(p.kind()),
            Value::Str(_) => TypeDesc::Str,
            Value::Stamp(_) => TypeDesc::Stamp,
            Value::Span(_) => TypeDesc::Span,
            Value::EnumVal(e) => TypeDesc::Enum(e.type_name.clone()),
            Value::TypeName(_) => TypeDesc::TypeName,
            Value::Bytes(_) => TypeDesc::Bytes,
            Value::Array(a) => TypeDesc::Array(a.borrow().elem_kind()),
            Value::List(_) => TypeDesc::List,
            Value::Map(_) => TypeDesc::Map,
            Value::Object(h) => TypeDesc::Object(h.def()),
        })
    }

    /// Descriptor for a wire type name read from the schema table. Names the
    /// registry does not know resolve to `Unresolved`, never to an error.
    pub(crate) fn parse(name: &str, reg: &TypeRegistry) -> TypeDesc {
        if let Some(rest) = name.strip_prefix('#') {
            if let Some(elem) = rest.strip_prefix("array:") {
                return match PrimKind::from_name(elem) {
                    Some(k) => TypeDesc::Array(k),
                    None => TypeDesc::Unresolved(name.to_string()),
                };
            }
            if let Some(enum_name) = rest.strip_prefix("enum:") {
                return TypeDesc::Enum(Rc::from(enum_name));
            }
            if let Some(k) = PrimKind::from_name(rest) {
                return TypeDesc::Prim(k);
            }
            return match rest {
                "str" => TypeDesc::Str,
                "stamp" => TypeDesc::Stamp,
                "span" => TypeDesc::Span,
                "type" => TypeDesc::TypeName,
                "bytes" => TypeDesc::Bytes,
                "list" => TypeDesc::List,
                "map" => TypeDesc::Map,
                _ => TypeDesc::Unresolved(name.to_string()),
            };
        }
        match reg.object_def(name) {
            Some(def) => TypeDesc::Object(def),
            None => TypeDesc::Unresolved(name.to_string()),
        }
    }

    /// Stable wire identity. Builtins are `#`-prefixed, which the registry
    /// reserves, so they can never collide with user type names.
    pub(crate) fn wire_name(&self) -> String {
        match self {
            TypeDesc::Unresolved(name) => name.clone(),
            TypeDesc::Prim(k) => format!("#{}", k.name()),
            TypeDesc::Enum(name) => format!("#enum:{name}"),
            TypeDesc::Str => "#str".to_string(),
            TypeDesc::Stamp => "#stamp".to_string(),
            TypeDesc::Span => "#span".to_string(),
            TypeDesc::TypeName => "#type".to_string(),
            TypeDesc::Bytes => "#bytes".to_string(),
            TypeDesc::Array(k) => format!("#array:{}", k.name()),
            TypeDesc::List => "#list".to_string(),
            TypeDesc::Map => "#map".to_string(),
            TypeDesc::Object(def) => def.name().to_string(),
        }
    }

    pub(crate) fn tier(&self) -> Tier {
        match self {
            TypeDesc::Prim(_)
            | TypeDesc::Enum(_)
            | TypeDesc::Stamp
            | TypeDesc::Span
            | TypeDesc::TypeName => Tier::Inline,
            TypeDesc::Str | TypeDesc::Bytes | TypeDesc::Array(_) => Tier::Leaf,
            TypeDesc::Unresolved(_) | TypeDesc::Object(_) => Tier::Object,
            TypeDesc::List | TypeDesc::Map => Tier::Collection,
        }
    }
}

/// Object-data layout tier, in block order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Tier {
    /// Embedded at the reference site; no data block, no indices.
    Inline = 0,
    /// Referenceable values without children (strings, bytes, arrays).
    /// Fully materialized when their shell is created.
    Leaf = 1,
    /// Typed objects, including unresolved placeholders.
    Object = 2,
    /// Lists and maps; children are arbitrary references.
    Collection = 3,
}

/// Freshly created instance shell. `needs_body` enqueues a body-decode pass;
/// leaves and placeholders come back complete.
pub(crate) struct Shell {
    pub value: Value,
    pub needs_body: bool,
}

impl Shell {
    pub(crate) fn done(value: Value) -> Shell {
        Shell {
            value,
            needs_body: false,
        }
    }

    pub(crate) fn pending(value: Value) -> Shell {
        Shell {
            value,
            needs_body: true,
        }
    }
}

/// One per-type repository. Stateless: all per-operation state lives in the
/// save/load sessions, so a repository can be shared by reference.
pub(crate) trait TypeRepo {
    fn desc(&self) -> &TypeDesc;

    fn wire_name(&self) -> String {
        self.desc().wire_name()
    }

    fn tier(&self) -> Tier {
        self.desc().tier()
    }

    /// Whether instances are stored in a data block and referenced by index.
    fn referenceable(&self) -> bool {
        self.tier() != Tier::Inline
    }

    /// Schema members describing instance bodies. Empty for builtins.
    fn members(&self) -> Vec<MemberSchema> {
        Vec::new()
    }

    /// Register the children of `v` with the save session (discovery pass).
    fn add_children(&self, _v: &Value, _sess: &mut SaveSession) -> Result<()> {
        Ok(())
    }

    /// Repository-specific block header, written before the size table.
    /// Arrays, lists and maps record per-instance element counts here.
    fn write_custom_header(&self, _objects: &[Value], _w: &mut Writer) -> Result<()> {
        Ok(())
    }

    /// Encode one instance body. Indices for every reachable value were
    /// assigned during discovery, so the session is read-only here.
    fn save_body(&self, _v: &Value, _w: &mut Writer, _sess: &SaveSession) -> Result<()> {
        Ok(())
    }

    /// Encode an inline value at its reference site.
    fn write_inline(&self, _v: &Value, _w: &mut Writer) -> Result<()> {
        Err(Error::Internal("repository has no inline encoding"))
    }

    /// Decode an inline value at its reference site.
    fn read_inline(&self, _r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<Value> {
        Err(Error::Internal("repository has no inline encoding"))
    }

    /// Decode the block header into per-instance counts.
    fn read_custom_header(&self, _r: &mut Reader<'_>, _num_objects: u32) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }

    /// Create the instance shell for `(type_index, object_index)`. The shell
    /// is memoized by the session before any body decoding, which is what
    /// makes cyclic references terminate.
    fn create_shell(&self, _type_index: u16, _object_index: u32, _sess: &mut LoadSession) -> Result<Shell> {
        Err(Error::Internal("inline repository is not indexed"))
    }

    /// Decode one instance body into its shell.
    fn load_body(&self, _v: &Value, _r: &mut Reader<'_>, _sess: &mut LoadSession) -> Result<()> {
        Ok(())
    }
}

type Creator = fn(&TypeDesc, Option<&[MemberSchema]>) -> Option<Rc<dyn TypeRepo>>;

/// Ordered, immutable chain of repository creators. First match wins; order
/// is part of the format contract (the bytes fast path must run before the
/// generic collection creators).
pub struct RepoChain {
    creators: Vec<Creator>,
}

impl Default for RepoChain {
    fn default() -> RepoChain {
        RepoChain {
            creators: vec![
                object::create_unknown,
                inline::create_primitive,
                inline::create_enum,
                leaf::create_string,
                inline::create_stamp,
                inline::create_span,
                inline::create_type_name,
                leaf::create_bytes,
                leaf::create_array,
                collection::create_list,
                collection::create_map,
                object::create_object,
            ],
        }
    }
}

impl RepoChain {
    pub fn new() -> RepoChain {
        RepoChain::default()
    }

    pub(crate) fn create(
        &self,
        desc: &TypeDesc,
        members: Option<&[MemberSchema]>,
    ) -> Result<Rc<dyn TypeRepo>> {
        for creator in &self.creators {
            if let Some(repo) = creator(desc, members) {
                return Ok(repo);
            }
        }
        Err(Error::Internal("no repository creator matched"))
    }
}

impl std::fmt::Debug for RepoChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RepoChain({} creators)", self.creators.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    #[test]
    fn wire_names_roundtrip_through_parse() {
        let reg = TypeRegistry::empty();
        for desc in [
            TypeDesc::Prim(PrimKind::I32),
            TypeDesc::Str,
            TypeDesc::Stamp,
            TypeDesc::Span,
            TypeDesc::TypeName,
            TypeDesc::Bytes,
            TypeDesc::Array(PrimKind::F64),
            TypeDesc::List,
            TypeDesc::Map,
            TypeDesc::Enum(Rc::from("color")),
        ] {
            let name = desc.wire_name();
            let back = TypeDesc::parse(&name, &reg);
            assert_eq!(back.wire_name(), name);
            assert_eq!(back.tier(), desc.tier());
        }
    }

    #[test]
    fn unregistered_name_parses_as_unresolved() {
        let reg = TypeRegistry::empty();
        let desc = TypeDesc::parse("vanished", &reg);
        assert!(matches!(desc, TypeDesc::Unresolved(_)));
        assert_eq!(desc.tier(), Tier::Object);
    }

    #[test]
    fn chain_creates_repo_for_every_builtin() {
        let chain = RepoChain::default();
        for desc in [
            TypeDesc::Prim(PrimKind::Bool),
            TypeDesc::Str,
            TypeDesc::Bytes,
            TypeDesc::Array(PrimKind::I32),
            TypeDesc::List,
            TypeDesc::Map,
            TypeDesc::Unresolved("gone".to_string()),
        ] {
            let repo = chain.create(&desc, None).unwrap();
            assert_eq!(repo.wire_name(), desc.wire_name());
        }
    }
}
