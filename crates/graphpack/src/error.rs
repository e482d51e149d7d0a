// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type for all engine operations.
//!
//! Format errors carry expected-vs-found diagnostics so a corrupt file can be
//! reported precisely. Schema-evolution problems are deliberately *not*
//! errors: an unresolved type degrades to null instances and is surfaced via
//! [`crate::LoadedGraph::unresolved_types`].

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// File or section magic does not match.
    #[error("bad {section} magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        section: &'static str,
        expected: u32,
        found: u32,
    },

    /// Format version newer than this build supports.
    #[error("unsupported format version {found} (supported up to {supported})")]
    BadVersion { found: u16, supported: u16 },

    /// Recorded total length does not match the actual input length.
    #[error("file length mismatch: header records {header} bytes, input has {actual}")]
    LengthMismatch { header: u64, actual: u64 },

    /// Schema table is empty; no file written by the engine has zero types.
    #[error("schema table is empty")]
    EmptySchema,

    /// Ran off the end of the input, or a slice was out of section bounds.
    #[error("read failed at offset {offset}: {reason}")]
    ReadFailed { offset: usize, reason: String },

    /// Unrecognized member-kind tag in the schema section.
    #[error("bad kind tag {tag:#04x} at offset {offset}")]
    BadKindTag { tag: u8, offset: usize },

    /// Unrecognized object-reference flag byte.
    #[error("bad reference flag {flag:#04x} at offset {offset}")]
    BadRefFlag { flag: u8, offset: usize },

    /// Reference pointing outside any repo's index space.
    #[error("reference to type {type_index} object {object_index} is out of range")]
    BadIndex { type_index: u16, object_index: u32 },

    /// A value's runtime type is not registered.
    #[error("type {name:?} is not registered")]
    UnknownType { name: String },

    /// Field name not present on the addressed type.
    #[error("type {type_name:?} has no field {field:?}")]
    UnknownField { type_name: String, field: String },

    /// Enum tag with no matching registered variant.
    #[error("enum {type_name:?} has no variant with tag {tag}")]
    UnknownEnumTag { type_name: String, tag: i32 },

    /// A value did not match the kind declared for its slot.
    #[error("kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Registering the same type name twice.
    #[error("duplicate type registration: {name:?}")]
    DuplicateType { name: String },

    /// A declared base chain that loops back on itself.
    #[error("base chain of type {name:?} is cyclic")]
    CyclicBase { name: String },

    /// A length-prefixed name or table overflowed its fixed-width prefix.
    #[error("{what} exceeds its wire-format size limit")]
    LimitExceeded { what: &'static str },

    /// Engine invariant violated. Indicates a bug, not bad input.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),

    /// A lazy field was touched after its load session guard was dropped.
    #[error("lazy field resolved after its load session was dropped")]
    LazySourceDropped,

    /// Save retries exhausted; destination may be absent or partial.
    #[error("save to {path:?} failed after {attempts} attempts")]
    SaveRetriesExhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("string is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("base64 decode failed")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand used by the wire cursor.
    pub(crate) fn read_failed(offset: usize, reason: &str) -> Self {
        Error::ReadFailed {
            offset,
            reason: reason.to_string(),
        }
    }
}
