// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge between plain Rust types and the dynamic value model.
//!
//! `#[derive(GraphType)]` implements this trait for tree-shaped structs and
//! fieldless enums. Shared references and cycles need the dynamic API
//! directly; a `Box`-built Rust tree cannot express them.

use crate::error::Result;
use crate::registry::{Kind, TypeRegistry, TypeRegistryBuilder};
use crate::value::Value;

/// A Rust type with a registered graph representation.
pub trait GraphType: Sized {
    /// Registered type name. Also the wire type identity.
    const TYPE_NAME: &'static str;

    /// Declared kind for a field holding this type (`Ref` for structs,
    /// `Enum` for enums).
    fn kind() -> Kind;

    /// Register this type and, transitively, every type it references.
    /// Idempotent: registering twice is a no-op.
    fn register(builder: &mut TypeRegistryBuilder);

    fn to_value(&self, registry: &TypeRegistry) -> Result<Value>;

    fn from_value(value: &Value, registry: &TypeRegistry) -> Result<Self>;
}
