// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema table: the per-type metadata block between the file header and the
//! object data.
//!
//! Only member ordering and count are load-bearing for body decoding; the
//! member encoding itself is internal to this module. `data_offset` and
//! `data_size` are written as placeholders and patched after the object
//! bodies are encoded, like the total file length in the header.

use crate::error::{Error, Result};
use crate::registry::Kind;
use crate::value::PrimKind;
use crate::wire::{Reader, Writer};

/// File header magic, `b"GPAK"`.
pub const FILE_MAGIC: u32 = u32::from_le_bytes(*b"GPAK");
/// Object-data section magic, `b"GPOD"`.
pub const DATA_MAGIC: u32 = u32::from_le_bytes(*b"GPOD");
/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// One member (field) of a type schema.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSchema {
    pub name: String,
    pub kind: Kind,
}

/// Per-type metadata as stored in the schema section.
#[derive(Debug, Clone)]
pub struct TypeSchema {
    /// Wire type identity: a registered name, or a `#`-prefixed builtin.
    pub name: String,
    pub members: Vec<MemberSchema>,
    pub num_objects: u32,
    pub has_subtype: bool,
    /// Absolute offset of this type's block in the object-data section.
    pub data_offset: u64,
    /// Total size of that block (custom header + size table + bodies).
    pub data_size: u64,
}

/// Writer positions of the patched offset/size fields of one schema record.
pub(crate) struct SchemaPatch {
    pub offset_pos: usize,
    pub size_pos: usize,
}

impl TypeSchema {
    pub(crate) fn write(&self, w: &mut Writer) -> Result<SchemaPatch> {
        w.write_str(&self.name)?;
        w.write_u16(u16::try_from(self.members.len()).map_err(|_| Error::LimitExceeded {
            what: "member list",
        })?);
        for m in &self.members {
            w.write_str(&m.name)?;
            write_kind(w, &m.kind)?;
        }
        w.write_u32(self.num_objects);
        w.write_u8(u8::from(self.has_subtype));
        let offset_pos = w.pos();
        w.write_u64(self.data_offset);
        let size_pos = w.pos();
        w.write_u64(self.data_size);
        Ok(SchemaPatch {
            offset_pos,
            size_pos,
        })
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<TypeSchema> {
        let name = r.read_str()?;
        let member_count = r.read_u16()? as usize;
        let mut members = Vec::with_capacity(member_count);
        for _ in 0..member_count {
            let member_name = r.read_str()?;
            let kind = read_kind(r)?;
            members.push(MemberSchema {
                name: member_name,
                kind,
            });
        }
        let num_objects = r.read_u32()?;
        let has_subtype = r.read_u8()? != 0;
        let data_offset = r.read_u64()?;
        let data_size = r.read_u64()?;
        Ok(TypeSchema {
            name,
            members,
            num_objects,
            has_subtype,
            data_offset,
            data_size,
        })
    }
}

const KIND_ANY: u8 = 0;
const KIND_PRIM: u8 = 1;
const KIND_STR: u8 = 2;
const KIND_STAMP: u8 = 3;
const KIND_SPAN: u8 = 4;
const KIND_TYPE_NAME: u8 = 5;
const KIND_ENUM: u8 = 6;
const KIND_BYTES: u8 = 7;
const KIND_ARRAY: u8 = 8;
const KIND_LIST: u8 = 9;
const KIND_MAP: u8 = 10;
const KIND_REF: u8 = 11;

pub(crate) fn write_kind(w: &mut Writer, kind: &Kind) -> Result<()> {
    match kind {
        Kind::Any => w.write_u8(KIND_ANY),
        Kind::Prim(k) => {
            w.write_u8(KIND_PRIM);
            w.write_u8(k.wire_tag());
        }
        Kind::Str => w.write_u8(KIND_STR),
        Kind::Stamp => w.write_u8(KIND_STAMP),
        Kind::Span => w.write_u8(KIND_SPAN),
        Kind::TypeName => w.write_u8(KIND_TYPE_NAME),
        Kind::Enum(name) => {
            w.write_u8(KIND_ENUM);
            w.write_str(name)?;
        }
        Kind::Bytes => w.write_u8(KIND_BYTES),
        Kind::Array(k) => {
            w.write_u8(KIND_ARRAY);
            w.write_u8(k.wire_tag());
        }
        Kind::List => w.write_u8(KIND_LIST),
        Kind::Map => w.write_u8(KIND_MAP),
        Kind::Ref(name) => {
            w.write_u8(KIND_REF);
            w.write_str(name)?;
        }
    }
    Ok(())
}

pub(crate) fn read_kind(r: &mut Reader<'_>) -> Result<Kind> {
    let offset = r.offset();
    let tag = r.read_u8()?;
    Ok(match tag {
        KIND_ANY => Kind::Any,
        KIND_PRIM => Kind::Prim(read_prim_kind(r)?),
        KIND_STR => Kind::Str,
        KIND_STAMP => Kind::Stamp,
        KIND_SPAN => Kind::Span,
        KIND_TYPE_NAME => Kind::TypeName,
        KIND_ENUM => Kind::Enum(r.read_str()?),
        KIND_BYTES => Kind::Bytes,
        KIND_ARRAY => Kind::Array(read_prim_kind(r)?),
        KIND_LIST => Kind::List,
        KIND_MAP => Kind::Map,
        KIND_REF => Kind::Ref(r.read_str()?),
        _ => return Err(Error::BadKindTag { tag, offset }),
    })
}

fn read_prim_kind(r: &mut Reader<'_>) -> Result<PrimKind> {
    let offset = r.offset();
    let tag = r.read_u8()?;
    PrimKind::from_wire_tag(tag).ok_or(Error::BadKindTag { tag, offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_roundtrip() {
        let schema = TypeSchema {
            name: "person".to_string(),
            members: vec![
                MemberSchema {
                    name: "name".to_string(),
                    kind: Kind::Str,
                },
                MemberSchema {
                    name: "age".to_string(),
                    kind: Kind::Prim(PrimKind::I32),
                },
                MemberSchema {
                    name: "best".to_string(),
                    kind: Kind::Ref("person".to_string()),
                },
                MemberSchema {
                    name: "tags".to_string(),
                    kind: Kind::Array(PrimKind::U8),
                },
            ],
            num_objects: 3,
            has_subtype: true,
            data_offset: 0,
            data_size: 0,
        };
        let mut w = Writer::new();
        let patch = schema.write(&mut w).unwrap();
        w.patch_u64(patch.offset_pos, 512);
        w.patch_u64(patch.size_pos, 64);

        let buf = w.into_bytes();
        let mut r = Reader::new(&buf);
        let back = TypeSchema::read(&mut r).unwrap();
        assert_eq!(back.name, "person");
        assert_eq!(back.members, schema.members);
        assert_eq!(back.num_objects, 3);
        assert!(back.has_subtype);
        assert_eq!(back.data_offset, 512);
        assert_eq!(back.data_size, 64);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn unknown_kind_tag_is_rejected() {
        let buf = [0xEEu8];
        let mut r = Reader::new(&buf);
        assert!(matches!(
            read_kind(&mut r),
            Err(Error::BadKindTag { tag: 0xEE, .. })
        ));
    }
}
