// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Load pipeline.
//!
//! Three phases. The preamble pass validates magic, version and recorded
//! length, then reads the schema table. The arena pass walks every data
//! block header: per-instance counts, the size table, and absolute body
//! offsets, all bounds-checked before any body is touched. Materialization
//! then runs through a memo table and an explicit queue: an instance's shell
//! is recorded before its body decodes, so reference cycles terminate.
//!
//! In lazy mode, fields flagged lazy keep a deferred pointer into the
//! session instead of materializing; the [`LoadedGraph`] guard owns the
//! session, and dropping it turns late resolution into a typed error.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::registry::{Kind, TypeRegistry};
use crate::repo::{read_stamp, RepoChain, TypeDesc, TypeRepo};
use crate::schema::{TypeSchema, DATA_MAGIC, FILE_MAGIC, FORMAT_VERSION};
use crate::value::{EnumVal, Prim, Value};
use crate::wire::{Reader, RefFlag};
use crate::Interner;

/// Field materialization policy for [`crate::Serializer::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Materialize the whole graph before returning.
    Eager,
    /// Defer fields flagged lazy until first access.
    Lazy,
}

/// A reference site before materialization: either a value decoded in place
/// or an arena coordinate.
pub(crate) enum RawSite {
    Value(Value),
    Indexed(u16, u32),
}

#[derive(Debug)]
struct Preamble {
    name: String,
    version: u16,
    schemas: Vec<TypeSchema>,
    /// Offset of the root section, right after the schema table.
    root_offset: usize,
}

fn parse_preamble(bytes: &[u8]) -> Result<Preamble> {
    let mut r = Reader::new(bytes);
    let magic = r.read_u32()?;
    if magic != FILE_MAGIC {
        return Err(Error::BadMagic {
            section: "file",
            expected: FILE_MAGIC,
            found: magic,
        });
    }
    let version = r.read_u16()?;
    if version > FORMAT_VERSION {
        return Err(Error::BadVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    let recorded = r.read_i64()?;
    if recorded < 0 || recorded as u64 != bytes.len() as u64 {
        return Err(Error::LengthMismatch {
            header: recorded.max(0) as u64,
            actual: bytes.len() as u64,
        });
    }
    let name = r.read_str()?;
    let count = r.read_i32()?;
    if count <= 0 {
        return Err(Error::EmptySchema);
    }
    // Capacity grows with successful reads; the recorded count alone must
    // not drive an allocation.
    let mut schemas = Vec::new();
    for _ in 0..count {
        schemas.push(TypeSchema::read(&mut r)?);
    }
    Ok(Preamble {
        name,
        version,
        schemas,
        root_offset: r.offset(),
    })
}

/// Per-repository arena: block metadata plus the memo table of materialized
/// instances.
struct RepoArena {
    num_objects: u32,
    /// Custom-header counts (element counts for arrays, lists, maps).
    counts: Vec<u32>,
    /// Absolute body offsets into the input.
    offsets: Vec<usize>,
    sizes: Vec<u32>,
    loaded: Vec<Option<Value>>,
}

impl RepoArena {
    fn empty(num_objects: u32) -> RepoArena {
        RepoArena {
            num_objects,
            counts: Vec::new(),
            offsets: Vec::new(),
            sizes: Vec::new(),
            loaded: vec![None; num_objects as usize],
        }
    }
}

fn build_arenas(
    bytes: &[u8],
    schemas: &[TypeSchema],
    repos: &[Rc<dyn TypeRepo>],
) -> Result<Vec<RepoArena>> {
    let mut arenas = Vec::with_capacity(schemas.len());
    for (t, schema) in schemas.iter().enumerate() {
        let repo = &repos[t];
        let n = schema.num_objects;
        if !repo.referenceable() || n == 0 {
            // Inline repos write no data block; a nonzero recorded count for
            // one is meaningless and must not size any allocation.
            arenas.push(RepoArena::empty(0));
            continue;
        }
        let start = usize::try_from(schema.data_offset)
            .map_err(|_| Error::read_failed(0, "data offset exceeds address space"))?;
        let end = start
            .checked_add(schema.data_size as usize)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| Error::read_failed(start, "type data block out of bounds"))?;
        // Every instance occupies at least its 4-byte size-table entry, so a
        // count the block cannot hold is rejected before anything is sized
        // from it.
        if (n as u64).saturating_mul(4) > schema.data_size {
            return Err(Error::read_failed(start, "object count exceeds data block"));
        }
        let mut r = Reader::at(bytes, start)?;
        let counts = repo.read_custom_header(&mut r, n)?;
        let mut sizes = Vec::with_capacity(n as usize);
        for _ in 0..n {
            sizes.push(r.read_u32()?);
        }
        let mut offsets = Vec::with_capacity(n as usize);
        let mut cursor = r.offset();
        for size in &sizes {
            offsets.push(cursor);
            cursor = cursor
                .checked_add(*size as usize)
                .ok_or_else(|| Error::read_failed(cursor, "object body overflows"))?;
        }
        if cursor > end {
            return Err(Error::read_failed(cursor, "object bodies exceed data block"));
        }
        arenas.push(RepoArena {
            num_objects: n,
            counts,
            offsets,
            sizes,
            loaded: vec![None; n as usize],
        });
    }
    Ok(arenas)
}

struct LoadItem {
    type_index: u16,
    object_index: u32,
}

pub(crate) struct LoadSession {
    bytes: Rc<Vec<u8>>,
    this: Weak<RefCell<LoadSession>>,
    repos: Vec<Rc<dyn TypeRepo>>,
    type_by_name: HashMap<String, u16>,
    arenas: Vec<RepoArena>,
    queue: VecDeque<LoadItem>,
    lazy: bool,
    interner: Option<Interner>,
    unresolved: Vec<String>,
}

impl LoadSession {
    pub(crate) fn bytes_rc(&self) -> Rc<Vec<u8>> {
        self.bytes.clone()
    }

    pub(crate) fn weak(&self) -> Weak<RefCell<LoadSession>> {
        self.this.clone()
    }

    pub(crate) fn lazy(&self) -> bool {
        self.lazy
    }

    pub(crate) fn intern(&mut self, s: &str) -> Rc<str> {
        match &self.interner {
            Some(interner) => interner.intern(s),
            None => Rc::from(s),
        }
    }

    pub(crate) fn note_unresolved(&mut self, name: &str) {
        if !self.unresolved.iter().any(|n| n == name) {
            log::warn!("type {name:?} is not registered; its instances load as null");
            self.unresolved.push(name.to_string());
        }
    }

    fn arena(&self, t: u16, i: u32) -> Result<&RepoArena> {
        let arena = self.arenas.get(t as usize).ok_or(Error::BadIndex {
            type_index: t,
            object_index: i,
        })?;
        if i >= arena.num_objects {
            return Err(Error::BadIndex {
                type_index: t,
                object_index: i,
            });
        }
        Ok(arena)
    }

    pub(crate) fn count(&self, t: u16, i: u32) -> Result<u32> {
        let arena = self.arena(t, i)?;
        arena.counts.get(i as usize).copied().ok_or(Error::BadIndex {
            type_index: t,
            object_index: i,
        })
    }

    pub(crate) fn body_span(&self, t: u16, i: u32) -> Result<(usize, usize)> {
        let arena = self.arena(t, i)?;
        match (arena.offsets.get(i as usize), arena.sizes.get(i as usize)) {
            (Some(&offset), Some(&size)) => Ok((offset, size as usize)),
            _ => Err(Error::BadIndex {
                type_index: t,
                object_index: i,
            }),
        }
    }

    /// Return the memoized instance or create its shell, queueing the body
    /// decode if one is needed.
    pub(crate) fn get_or_create(&mut self, t: u16, i: u32) -> Result<Value> {
        if let Some(v) = &self.arena(t, i)?.loaded[i as usize] {
            return Ok(v.clone());
        }
        let repo = self.repos[t as usize].clone();
        let shell = repo.create_shell(t, i, self)?;
        self.arenas[t as usize].loaded[i as usize] = Some(shell.value.clone());
        if shell.needs_body {
            self.queue.push_back(LoadItem {
                type_index: t,
                object_index: i,
            });
        }
        Ok(shell.value)
    }

    /// Decode queued bodies until the queue is empty. A single bad instance
    /// is logged and skipped; the rest of the graph still loads.
    pub(crate) fn drain(&mut self) -> Result<()> {
        while let Some(item) = self.queue.pop_front() {
            if let Err(e) = self.load_one(item.type_index, item.object_index) {
                let name = self.repos[item.type_index as usize].wire_name();
                log::warn!("{}#{} failed to load: {e}", name, item.object_index);
            }
        }
        Ok(())
    }

    fn load_one(&mut self, t: u16, i: u32) -> Result<()> {
        let repo = self.repos[t as usize].clone();
        let bytes = self.bytes.clone();
        let (offset, len) = self.body_span(t, i)?;
        let value = self.arenas[t as usize].loaded[i as usize]
            .clone()
            .ok_or(Error::Internal("queued instance has no shell"))?;
        let mut r = Reader::new(&bytes[offset..offset + len]);
        repo.load_body(&value, &mut r, self)
    }

    /// Decode a self-describing reference site.
    pub(crate) fn read_any(&mut self, r: &mut Reader<'_>) -> Result<RawSite> {
        match RefFlag::read(r)? {
            RefFlag::Null => Ok(RawSite::Value(Value::Null)),
            RefFlag::Base => Err(Error::read_failed(
                r.offset(),
                "base flag in self-describing reference",
            )),
            RefFlag::Derived => {
                let t = r.read_u16()?;
                let repo = self.repos.get(t as usize).cloned().ok_or(Error::BadIndex {
                    type_index: t,
                    object_index: 0,
                })?;
                if repo.referenceable() {
                    Ok(RawSite::Indexed(t, r.read_u32()?))
                } else {
                    Ok(RawSite::Value(repo.read_inline(r, self)?))
                }
            }
        }
    }

    /// Decode a reference site under a declared kind from the schema.
    pub(crate) fn read_declared(&mut self, kind: &Kind, r: &mut Reader<'_>) -> Result<RawSite> {
        match kind {
            Kind::Any => self.read_any(r),
            Kind::Prim(k) => Ok(RawSite::Value(Value::Prim(Prim::read(r, *k)?))),
            Kind::Stamp => Ok(RawSite::Value(Value::Stamp(read_stamp(r)?))),
            Kind::Span => Ok(RawSite::Value(Value::Span(r.read_i64()?))),
            Kind::Enum(name) => Ok(RawSite::Value(Value::EnumVal(EnumVal {
                type_name: Rc::from(name.as_str()),
                tag: r.read_i32()?,
            }))),
            Kind::TypeName => match RefFlag::read(r)? {
                RefFlag::Null => Ok(RawSite::Value(Value::Null)),
                RefFlag::Base => Ok(RawSite::Value(Value::TypeName(Rc::from(
                    r.read_str()?.as_str(),
                )))),
                RefFlag::Derived => Err(Error::read_failed(
                    r.offset(),
                    "derived flag in type-name slot",
                )),
            },
            Kind::Str => self.read_indexed(r, "#str"),
            Kind::Bytes => self.read_indexed(r, "#bytes"),
            Kind::Array(k) => {
                let name = format!("#array:{}", k.name());
                self.read_indexed(r, &name)
            }
            Kind::List => self.read_indexed(r, "#list"),
            Kind::Map => self.read_indexed(r, "#map"),
            Kind::Ref(name) => self.read_indexed(r, name),
        }
    }

    /// `Base` resolves against the declared type's repository; `Derived`
    /// carries an explicit type index (subtype, or declared type no longer
    /// sealed).
    fn read_indexed(&mut self, r: &mut Reader<'_>, wire_name: &str) -> Result<RawSite> {
        match RefFlag::read(r)? {
            RefFlag::Null => Ok(RawSite::Value(Value::Null)),
            RefFlag::Base => {
                let t = self
                    .type_by_name
                    .get(wire_name)
                    .copied()
                    .ok_or_else(|| Error::UnknownType {
                        name: wire_name.to_string(),
                    })?;
                Ok(RawSite::Indexed(t, r.read_u32()?))
            }
            RefFlag::Derived => {
                let t = r.read_u16()?;
                Ok(RawSite::Indexed(t, r.read_u32()?))
            }
        }
    }

    pub(crate) fn materialize(&mut self, site: RawSite) -> Result<Value> {
        match site {
            RawSite::Value(v) => Ok(v),
            RawSite::Indexed(t, i) => self.get_or_create(t, i),
        }
    }
}

/// A materialized (or lazily materializing) graph.
///
/// For a lazy load this guard owns the session the deferred fields point
/// into. Keep it alive as long as unresolved fields may be read; once it is
/// dropped, touching an unresolved field yields
/// [`Error::LazySourceDropped`].
pub struct LoadedGraph {
    name: String,
    root: Value,
    unresolved: Vec<String>,
    session: Option<Rc<RefCell<LoadSession>>>,
}

impl LoadedGraph {
    /// Graph name recorded at save time.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_root(self) -> Value {
        self.root
    }

    /// Wire type names the registry could not resolve; their instances are
    /// null in the graph.
    pub fn unresolved_types(&self) -> &[String] {
        &self.unresolved
    }

    pub fn is_lazy(&self) -> bool {
        self.session.is_some()
    }
}

impl fmt::Debug for LoadedGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedGraph")
            .field("name", &self.name)
            .field("lazy", &self.is_lazy())
            .field("unresolved", &self.unresolved)
            .finish()
    }
}

pub(crate) fn load_bytes(
    registry: Arc<TypeRegistry>,
    chain: Arc<RepoChain>,
    interner: Option<Interner>,
    bytes: Vec<u8>,
    mode: LoadMode,
) -> Result<LoadedGraph> {
    let pre = parse_preamble(&bytes)?;

    let mut repos: Vec<Rc<dyn TypeRepo>> = Vec::with_capacity(pre.schemas.len());
    let mut type_by_name = HashMap::with_capacity(pre.schemas.len());
    for (t, schema) in pre.schemas.iter().enumerate() {
        let desc = TypeDesc::parse(&schema.name, &registry);
        repos.push(chain.create(&desc, Some(&schema.members))?);
        type_by_name.insert(schema.name.clone(), t as u16);
    }
    let arenas = build_arenas(&bytes, &pre.schemas, &repos)?;

    let bytes = Rc::new(bytes);
    let session = Rc::new_cyclic(|weak| {
        RefCell::new(LoadSession {
            bytes: bytes.clone(),
            this: weak.clone(),
            repos,
            type_by_name,
            arenas,
            queue: VecDeque::new(),
            lazy: mode == LoadMode::Lazy,
            interner,
            unresolved: Vec::new(),
        })
    });

    let (root, unresolved) = {
        let mut sess = session.borrow_mut();
        let mut r = Reader::at(bytes.as_slice(), pre.root_offset)?;
        let root_count = r.read_i32()?;
        if root_count < 0 {
            return Err(Error::read_failed(pre.root_offset, "negative root count"));
        }
        let mut first = None;
        for idx in 0..root_count {
            let site = sess.read_any(&mut r)?;
            if idx == 0 {
                first = Some(site);
            }
        }
        let magic = r.read_u32()?;
        if magic != DATA_MAGIC {
            return Err(Error::BadMagic {
                section: "object data",
                expected: DATA_MAGIC,
                found: magic,
            });
        }
        let root = match first {
            Some(site) => sess.materialize(site)?,
            None => Value::Null,
        };
        sess.drain()?;
        (root, sess.unresolved.clone())
    };

    Ok(LoadedGraph {
        name: pre.name,
        root,
        unresolved,
        // Eager loads leave no deferred fields behind, so the session (and
        // with it the input buffer) can be released immediately.
        session: (mode == LoadMode::Lazy).then_some(session),
    })
}

/// Summary of one schema entry, as reported by [`crate::Serializer::validate`].
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub num_objects: u32,
    pub data_size: u64,
    pub has_subtype: bool,
}

/// File-level metadata extracted without materializing any objects.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub version: u16,
    pub len: u64,
    pub types: Vec<TypeInfo>,
}

/// Validate the preamble and block bounds of an encoded file.
pub(crate) fn validate_bytes(bytes: &[u8]) -> Result<FileInfo> {
    let pre = parse_preamble(bytes)?;
    for schema in &pre.schemas {
        if schema.num_objects == 0 {
            continue;
        }
        let end = schema.data_offset.checked_add(schema.data_size);
        if end.map_or(true, |end| end > bytes.len() as u64) {
            return Err(Error::read_failed(
                schema.data_offset as usize,
                "type data block out of bounds",
            ));
        }
    }
    Ok(FileInfo {
        name: pre.name,
        version: pre.version,
        len: bytes.len() as u64,
        types: pre
            .schemas
            .iter()
            .map(|s| TypeInfo {
                name: s.name.clone(),
                num_objects: s.num_objects,
                data_size: s.data_size,
                has_subtype: s.has_subtype,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_rejected_by_magic() {
        let err = parse_preamble(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, Error::BadMagic { section: "file", .. }));
    }

    #[test]
    fn truncated_file_is_a_length_mismatch() {
        let reg = TypeRegistry::empty();
        let chain = Arc::new(RepoChain::default());
        let root = Value::list(vec![Value::str("payload")]);
        let mut bytes = crate::save::save_bytes(reg, chain, "g", &root).unwrap();
        bytes.truncate(bytes.len() - 3);

        let err = parse_preamble(&bytes).unwrap_err();
        assert!(matches!(err, Error::LengthMismatch { .. }));
    }

    #[test]
    fn empty_schema_table_is_rejected() {
        use crate::wire::Writer;
        let mut w = Writer::new();
        w.write_u32(FILE_MAGIC);
        w.write_u16(FORMAT_VERSION);
        let len_pos = w.pos();
        w.write_i64(0);
        w.write_str("g").unwrap();
        w.write_i32(0);
        let total = w.pos() as i64;
        w.patch_i64(len_pos, total);
        let bytes = w.into_bytes();

        assert!(matches!(
            parse_preamble(&bytes).unwrap_err(),
            Error::EmptySchema
        ));
    }

    #[test]
    fn forged_object_count_is_rejected_before_sizing() {
        use crate::wire::Writer;
        let mut w = Writer::new();
        w.write_u32(FILE_MAGIC);
        w.write_u16(FORMAT_VERSION);
        let len_pos = w.pos();
        w.write_i64(0);
        w.write_str("g").unwrap();
        w.write_i32(1);
        // Schema entry claiming four billion lists in an 8-byte block.
        w.write_str("#list").unwrap();
        w.write_u16(0);
        w.write_u32(u32::MAX);
        w.write_u8(0);
        let offset_pos = w.pos();
        w.write_u64(0);
        w.write_u64(8);
        w.write_i32(1);
        w.write_u8(0); // null root
        w.write_u32(DATA_MAGIC);
        let data_offset = w.pos() as u64;
        w.patch_u64(offset_pos, data_offset);
        w.write_bytes(&[0u8; 8]);
        w.patch_i64(len_pos, w.pos() as i64);

        let err = load_bytes(
            TypeRegistry::empty(),
            Arc::new(RepoChain::default()),
            None,
            w.into_bytes(),
            LoadMode::Eager,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ReadFailed { .. }));
    }

    #[test]
    fn forged_collection_count_is_rejected_before_sizing() {
        use crate::wire::Writer;
        let mut w = Writer::new();
        w.write_u32(FILE_MAGIC);
        w.write_u16(FORMAT_VERSION);
        let len_pos = w.pos();
        w.write_i64(0);
        w.write_str("g").unwrap();
        w.write_i32(1);
        // One list instance whose header claims four billion elements in a
        // one-byte body.
        w.write_str("#list").unwrap();
        w.write_u16(0);
        w.write_u32(1);
        w.write_u8(0);
        let offset_pos = w.pos();
        w.write_u64(0);
        w.write_u64(9);
        w.write_i32(1);
        w.write_u8(2); // derived root reference
        w.write_u16(0);
        w.write_u32(0);
        w.write_u32(DATA_MAGIC);
        let data_offset = w.pos() as u64;
        w.patch_u64(offset_pos, data_offset);
        w.write_u32(u32::MAX); // element count
        w.write_u32(1); // size table
        w.write_u8(0); // body: one null site
        w.patch_i64(len_pos, w.pos() as i64);

        let err = load_bytes(
            TypeRegistry::empty(),
            Arc::new(RepoChain::default()),
            None,
            w.into_bytes(),
            LoadMode::Eager,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ReadFailed { .. }));
    }

    #[test]
    fn future_version_is_rejected() {
        use crate::wire::Writer;
        let mut w = Writer::new();
        w.write_u32(FILE_MAGIC);
        w.write_u16(FORMAT_VERSION + 1);
        w.write_i64(14);
        let bytes = w.into_bytes();
        assert!(matches!(
            parse_preamble(&bytes).unwrap_err(),
            Error::BadVersion { .. }
        ));
    }
}
