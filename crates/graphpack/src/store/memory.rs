// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-memory persistence, plus a gzip-compressed base64 text form. The text
//! form is URL-safe without padding so encoded graphs can travel in query
//! strings and JSON fields unescaped.

use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::load::{FileInfo, LoadMode, LoadedGraph};
use crate::value::Value;
use crate::Serializer;

/// Memory-backed graph store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    serializer: Serializer,
}

impl MemoryStore {
    pub fn new(serializer: Serializer) -> MemoryStore {
        MemoryStore { serializer }
    }

    pub fn save(&self, name: &str, root: &Value) -> Result<Vec<u8>> {
        self.serializer.save(name, root)
    }

    pub fn load(&self, bytes: Vec<u8>, mode: LoadMode) -> Result<LoadedGraph> {
        self.serializer.load(bytes, mode)
    }

    pub fn validate(&self, bytes: &[u8]) -> Result<FileInfo> {
        self.serializer.validate(bytes)
    }

    /// Encode, gzip, then base64 the graph.
    pub fn to_base64(&self, name: &str, root: &Value) -> Result<String> {
        let bytes = self.serializer.save(name, root)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        let compressed = encoder.finish()?;
        Ok(URL_SAFE_NO_PAD.encode(compressed))
    }

    /// Inverse of [`MemoryStore::to_base64`].
    pub fn from_base64(&self, text: &str, mode: LoadMode) -> Result<LoadedGraph> {
        let compressed = URL_SAFE_NO_PAD.decode(text.trim())?;
        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;
        self.serializer.load(bytes, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::value::PrimArray;

    fn store() -> MemoryStore {
        MemoryStore::new(Serializer::new(TypeRegistry::empty()))
    }

    #[test]
    fn base64_roundtrip() {
        let root = Value::list(vec![
            Value::str("text form"),
            Value::array(PrimArray::from(vec![10i64, 20, 30])),
        ]);
        let text = store().to_base64("b64", &root).unwrap();
        assert!(!text.contains('='));
        assert!(!text.contains('+'));

        let loaded = store().from_base64(&text, LoadMode::Eager).unwrap();
        assert_eq!(loaded.name(), "b64");
        assert!(crate::structural_eq(&root, loaded.root()).unwrap());
    }

    #[test]
    fn corrupt_base64_is_a_decode_error() {
        let err = store().from_base64("not/base64!", LoadMode::Eager).unwrap_err();
        assert!(matches!(err, crate::error::Error::Base64(_)));
    }
}
