// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Save pipeline.
//!
//! Two passes. Discovery walks the graph through an explicit queue, assigns
//! every reachable value a `(type index, object index)` slot in its
//! repository's arena, and creates repositories on first encounter. Encoding
//! then writes the file: header, schema table, root section, and one data
//! block per referenceable repository. Offsets and the total length are
//! patched in once the blocks are written.
//!
//! Because discovery finishes before encoding starts, encoding is pure
//! lookup: a value that was reachable has an index, and a shared value has
//! exactly one.

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::{Kind, TypeRegistry};
use crate::repo::{RepoChain, TypeDesc, TypeRepo};
use crate::schema::{TypeSchema, DATA_MAGIC, FILE_MAGIC, FORMAT_VERSION};
use crate::value::{ObjId, Prim, PrimKind, Stamp, StampZone, Value};
use crate::wire::{RefFlag, Writer};

pub(crate) struct SaveSession {
    registry: Arc<TypeRegistry>,
    chain: Arc<RepoChain>,
    repos: Vec<Rc<dyn TypeRepo>>,
    type_by_name: HashMap<String, u16>,
    /// Per-repository instance arena, in index order.
    objects: Vec<Vec<Value>>,
    ids: HashMap<ObjId, (u16, u32)>,
    /// Content-deduplicated string indices.
    string_ids: HashMap<Rc<str>, u32>,
    queue: VecDeque<Value>,
}

impl SaveSession {
    fn new(registry: Arc<TypeRegistry>, chain: Arc<RepoChain>) -> Result<SaveSession> {
        let mut sess = SaveSession {
            registry,
            chain,
            repos: Vec::new(),
            type_by_name: HashMap::new(),
            objects: Vec::new(),
            ids: HashMap::new(),
            string_ids: HashMap::new(),
            queue: VecDeque::new(),
        };
        // Guarantees a non-empty schema table even for a null root.
        sess.type_index_for(&TypeDesc::Str)?;
        Ok(sess)
    }

    fn type_index_for(&mut self, desc: &TypeDesc) -> Result<u16> {
        let name = desc.wire_name();
        if let Some(&t) = self.type_by_name.get(&name) {
            return Ok(t);
        }
        let t = u16::try_from(self.repos.len())
            .map_err(|_| Error::Internal("more than 65535 types in one graph"))?;
        let repo = self.chain.create(desc, None)?;
        self.repos.push(repo);
        self.objects.push(Vec::new());
        self.type_by_name.insert(name, t);
        Ok(t)
    }

    fn index_of(&self, desc: &TypeDesc) -> Result<u16> {
        self.type_by_name
            .get(&desc.wire_name())
            .copied()
            .ok_or(Error::Internal("value was not discovered before encoding"))
    }

    /// Register a value reached during discovery. Identity-bearing values
    /// get an arena slot on first sight and are queued for child discovery;
    /// strings deduplicate by content; inline values only pin their type.
    pub(crate) fn register_value(&mut self, v: &Value) -> Result<()> {
        match v {
            Value::Null => Ok(()),
            Value::Prim(_)
            | Value::Stamp(_)
            | Value::Span(_)
            | Value::EnumVal(_)
            | Value::TypeName(_) => {
                self.type_index_for(&TypeDesc::of(v)?)?;
                Ok(())
            }
            Value::Str(s) => {
                let t = self.type_index_for(&TypeDesc::Str)?;
                if !self.string_ids.contains_key(s) {
                    let i = self.objects[t as usize].len() as u32;
                    self.string_ids.insert(s.clone(), i);
                    self.objects[t as usize].push(v.clone());
                }
                Ok(())
            }
            _ => {
                let id = v
                    .identity()
                    .ok_or(Error::Internal("identity kind without identity"))?;
                if self.ids.contains_key(&id) {
                    return Ok(());
                }
                let desc = TypeDesc::of(v)?;
                if let TypeDesc::Object(def) = &desc {
                    if self.registry.object_def(def.name()).is_none() {
                        return Err(Error::UnknownType {
                            name: def.name().to_string(),
                        });
                    }
                }
                let t = self.type_index_for(&desc)?;
                let i = self.objects[t as usize].len() as u32;
                self.ids.insert(id, (t, i));
                self.objects[t as usize].push(v.clone());
                self.queue.push_back(v.clone());
                Ok(())
            }
        }
    }

    fn discover(&mut self, root: &Value) -> Result<()> {
        self.register_value(root)?;
        while let Some(v) = self.queue.pop_front() {
            let t = self.index_of(&TypeDesc::of(&v)?)?;
            let repo = self.repos[t as usize].clone();
            repo.add_children(&v, self)?;
        }
        Ok(())
    }

    fn instance_index(&self, v: &Value, t: u16) -> Result<u32> {
        if let Value::Str(s) = v {
            return self
                .string_ids
                .get(s)
                .copied()
                .ok_or(Error::Internal("string was not discovered"));
        }
        let id = v
            .identity()
            .ok_or(Error::Internal("identity kind without identity"))?;
        match self.ids.get(&id) {
            Some(&(stored_t, i)) if stored_t == t => Ok(i),
            Some(_) => Err(Error::Internal("value registered under another type")),
            None => Err(Error::Internal("value was not discovered before encoding")),
        }
    }

    /// Self-describing reference: flag, type index, then either the inline
    /// payload or the object index.
    pub(crate) fn write_any(&self, v: &Value, w: &mut Writer) -> Result<()> {
        if v.is_null() {
            w.write_u8(RefFlag::Null.wire_tag());
            return Ok(());
        }
        let desc = TypeDesc::of(v)?;
        let t = self.index_of(&desc)?;
        w.write_u8(RefFlag::Derived.wire_tag());
        w.write_u16(t);
        let repo = &self.repos[t as usize];
        if repo.referenceable() {
            w.write_u32(self.instance_index(v, t)?);
        } else {
            repo.write_inline(v, w)?;
        }
        Ok(())
    }

    /// Contextual reference: the declared kind fixes the layout, so
    /// fixed-width kinds are raw and single-repository kinds omit the type
    /// index. A null in a fixed-width slot encodes as the kind's zero value.
    pub(crate) fn write_declared(&self, kind: &Kind, v: &Value, w: &mut Writer) -> Result<()> {
        match kind {
            Kind::Any => self.write_any(v, w),
            Kind::Prim(k) => match v {
                Value::Null => {
                    Prim::default_of(*k).write(w);
                    Ok(())
                }
                Value::Prim(p) if p.kind() == *k => {
                    p.write(w);
                    Ok(())
                }
                other => Err(mismatch(k.name(), other)),
            },
            Kind::Stamp => match v {
                Value::Null => {
                    crate::repo::write_stamp(
                        Stamp {
                            unix_nanos: 0,
                            zone: StampZone::Unspecified,
                        },
                        w,
                    );
                    Ok(())
                }
                Value::Stamp(s) => {
                    crate::repo::write_stamp(*s, w);
                    Ok(())
                }
                other => Err(mismatch("stamp", other)),
            },
            Kind::Span => match v {
                Value::Null => {
                    w.write_i64(0);
                    Ok(())
                }
                Value::Span(n) => {
                    w.write_i64(*n);
                    Ok(())
                }
                other => Err(mismatch("span", other)),
            },
            Kind::Enum(_) => match v {
                Value::Null => {
                    w.write_i32(0);
                    Ok(())
                }
                Value::EnumVal(e) => {
                    w.write_i32(e.tag);
                    Ok(())
                }
                other => Err(mismatch("enum", other)),
            },
            Kind::TypeName => match v {
                Value::Null => {
                    w.write_u8(RefFlag::Null.wire_tag());
                    Ok(())
                }
                Value::TypeName(name) => {
                    w.write_u8(RefFlag::Base.wire_tag());
                    w.write_str(name)
                }
                other => Err(mismatch("type-name", other)),
            },
            Kind::Str => match v {
                Value::Null => {
                    w.write_u8(RefFlag::Null.wire_tag());
                    Ok(())
                }
                Value::Str(_) => {
                    let t = self.index_of(&TypeDesc::Str)?;
                    w.write_u8(RefFlag::Base.wire_tag());
                    w.write_u32(self.instance_index(v, t)?);
                    Ok(())
                }
                other => Err(mismatch("str", other)),
            },
            Kind::Bytes => self.write_single_repo(&TypeDesc::Bytes, "bytes", v, w),
            Kind::Array(k) => {
                if let Value::Array(a) = v {
                    let found = a.borrow().elem_kind();
                    if found != *k {
                        return Err(Error::KindMismatch {
                            expected: k.name(),
                            found: found.name(),
                        });
                    }
                }
                self.write_single_repo(&TypeDesc::Array(*k), "array", v, w)
            }
            Kind::List => self.write_single_repo(&TypeDesc::List, "list", v, w),
            Kind::Map => self.write_single_repo(&TypeDesc::Map, "map", v, w),
            Kind::Ref(declared) => match v {
                Value::Null => {
                    w.write_u8(RefFlag::Null.wire_tag());
                    Ok(())
                }
                Value::Object(h) => {
                    let t = self.index_of(&TypeDesc::Object(h.def()))?;
                    let i = self.instance_index(v, t)?;
                    let sealed = self
                        .registry
                        .object_def(declared)
                        .map(|d| d.is_sealed())
                        .unwrap_or(false);
                    if sealed && &*h.type_name() == declared.as_str() {
                        w.write_u8(RefFlag::Base.wire_tag());
                        w.write_u32(i);
                    } else {
                        w.write_u8(RefFlag::Derived.wire_tag());
                        w.write_u16(t);
                        w.write_u32(i);
                    }
                    Ok(())
                }
                other => Err(mismatch("object", other)),
            },
        }
    }

    fn write_single_repo(
        &self,
        desc: &TypeDesc,
        expected: &'static str,
        v: &Value,
        w: &mut Writer,
    ) -> Result<()> {
        match v {
            Value::Null => {
                w.write_u8(RefFlag::Null.wire_tag());
                Ok(())
            }
            _ if matches_desc(desc, v) => {
                let t = self.index_of(desc)?;
                w.write_u8(RefFlag::Base.wire_tag());
                w.write_u32(self.instance_index(v, t)?);
                Ok(())
            }
            other => Err(mismatch(expected, other)),
        }
    }
}

fn matches_desc(desc: &TypeDesc, v: &Value) -> bool {
    matches!(
        (desc, v),
        (TypeDesc::Bytes, Value::Bytes(_))
            | (TypeDesc::Array(_), Value::Array(_))
            | (TypeDesc::List, Value::List(_))
            | (TypeDesc::Map, Value::Map(_))
    )
}

fn mismatch(expected: &'static str, found: &Value) -> Error {
    Error::KindMismatch {
        expected,
        found: found.kind_name(),
    }
}

/// Encode a complete file for `root` under the given graph name.
pub(crate) fn save_bytes(
    registry: Arc<TypeRegistry>,
    chain: Arc<RepoChain>,
    name: &str,
    root: &Value,
) -> Result<Vec<u8>> {
    let mut sess = SaveSession::new(registry, chain)?;
    sess.discover(root)?;

    let mut w = Writer::with_capacity(256);
    w.write_u32(FILE_MAGIC);
    w.write_u16(FORMAT_VERSION);
    let len_pos = w.pos();
    w.write_i64(0); // total length, patched last
    w.write_str(name)?;

    w.write_i32(sess.repos.len() as i32);
    let mut patches = Vec::with_capacity(sess.repos.len());
    for (t, repo) in sess.repos.iter().enumerate() {
        let has_subtype = match repo.desc() {
            TypeDesc::Object(def) => sess.registry.has_subtype(def.name()),
            _ => false,
        };
        let schema = TypeSchema {
            name: repo.wire_name(),
            members: repo.members(),
            num_objects: if repo.referenceable() {
                sess.objects[t].len() as u32
            } else {
                0
            },
            has_subtype,
            data_offset: 0,
            data_size: 0,
        };
        patches.push(schema.write(&mut w)?);
    }

    // Root section. Exactly one entry today; the count keeps room for
    // multi-root archives.
    w.write_i32(1);
    sess.write_any(root, &mut w)?;

    w.write_u32(DATA_MAGIC);
    let mut order: Vec<usize> = (0..sess.repos.len()).collect();
    order.sort_by_key(|&t| (sess.repos[t].tier(), t));
    for t in order {
        let repo = sess.repos[t].clone();
        if !repo.referenceable() || sess.objects[t].is_empty() {
            continue;
        }
        let offset = w.pos() as u64;
        repo.write_custom_header(&sess.objects[t], &mut w)?;
        let mut scratch = Writer::new();
        let mut sizes = Vec::with_capacity(sess.objects[t].len());
        for v in &sess.objects[t] {
            let start = scratch.pos();
            repo.save_body(v, &mut scratch, &sess)?;
            let size = u32::try_from(scratch.pos() - start)
                .map_err(|_| Error::Internal("object body exceeds 4 GiB"))?;
            sizes.push(size);
        }
        for size in &sizes {
            w.write_u32(*size);
        }
        w.write_bytes(scratch.as_slice());
        w.patch_u64(patches[t].offset_pos, offset);
        w.patch_u64(patches[t].size_pos, w.pos() as u64 - offset);
        log::debug!(
            "encoded {} instances of {} ({} bytes)",
            sizes.len(),
            repo.wire_name(),
            w.pos() as u64 - offset
        );
    }

    w.patch_i64(len_pos, w.pos() as i64);
    Ok(w.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PrimArray;
    use crate::wire::Reader;

    #[test]
    fn file_starts_with_magic_and_patched_length() {
        let reg = TypeRegistry::empty();
        let root = Value::list(vec![Value::from(1), Value::str("x")]);
        let bytes = save_bytes(reg, Arc::new(RepoChain::default()), "g", &root).unwrap();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), FILE_MAGIC);
        assert_eq!(r.read_u16().unwrap(), FORMAT_VERSION);
        assert_eq!(r.read_i64().unwrap(), bytes.len() as i64);
        assert_eq!(r.read_str().unwrap(), "g");
    }

    #[test]
    fn shared_value_discovered_once() {
        let reg = TypeRegistry::empty();
        let chain = Arc::new(RepoChain::default());
        let mut sess = SaveSession::new(reg, chain).unwrap();
        let shared = Value::array(PrimArray::from(vec![1i32, 2, 3]));
        let root = Value::list(vec![shared.clone(), shared.clone()]);
        sess.discover(&root).unwrap();

        let t = sess.index_of(&TypeDesc::Array(PrimKind::I32)).unwrap();
        assert_eq!(sess.objects[t as usize].len(), 1);
    }

    #[test]
    fn strings_dedup_by_content() {
        let reg = TypeRegistry::empty();
        let chain = Arc::new(RepoChain::default());
        let mut sess = SaveSession::new(reg, chain).unwrap();
        let root = Value::list(vec![Value::str("dup"), Value::str("dup"), Value::str("x")]);
        sess.discover(&root).unwrap();

        let t = sess.index_of(&TypeDesc::Str).unwrap();
        assert_eq!(sess.objects[t as usize].len(), 2);
    }

    #[test]
    fn unregistered_object_type_is_an_error() {
        let mut b = TypeRegistry::builder();
        b.object(crate::registry::TypeDef::new("known"));
        let reg = b.build().unwrap();
        let obj = reg.new_object("known").unwrap();

        // A handle minted from a different registry is not saveable here.
        let empty = TypeRegistry::empty();
        let err = save_bytes(
            empty,
            Arc::new(RepoChain::default()),
            "g",
            &Value::Object(obj),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownType { .. }));
    }
}
