// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type metadata registry.
//!
//! The registry is the engine's stand-in for runtime reflection: every
//! serializable object type is described by a [`TypeDef`] (ordered fields
//! with declared kinds), every enum by an [`EnumDef`]. It is built once
//! through [`TypeRegistryBuilder`], immutable afterwards, and injected into
//! the [`crate::Serializer`], never kept as a process-global mutable list.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::object::ObjHandle;
use crate::value::PrimKind;

/// Declared kind of a field slot. Decides the wire encoding of the slot:
/// fixed-width kinds are written inline without a flag byte, nullable
/// reference kinds carry the Null/Base/Derived flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// Anything; fully self-describing on the wire.
    Any,
    Prim(PrimKind),
    Str,
    Stamp,
    Span,
    TypeName,
    /// Registered enum, by name.
    Enum(String),
    Bytes,
    /// Uniform primitive array with the given element kind.
    Array(PrimKind),
    List,
    Map,
    /// Reference to a registered object type (or any of its subtypes).
    Ref(String),
}

impl Kind {
    /// Kinds that may hold an object reference and therefore can participate
    /// in lazy loading.
    pub(crate) fn deferrable(&self) -> bool {
        matches!(
            self,
            Kind::Any | Kind::Bytes | Kind::Array(_) | Kind::List | Kind::Map | Kind::Ref(_)
        )
    }
}

/// One field of an object type.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    kind: Kind,
    lazy: bool,
}

impl FieldDef {
    pub fn new(name: &str, kind: Kind) -> FieldDef {
        let lazy = kind.deferrable();
        FieldDef {
            name: name.to_string(),
            kind,
            lazy,
        }
    }

    /// Opt this field out of lazy materialization (always loaded eagerly).
    pub fn eager(mut self) -> FieldDef {
        self.lazy = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }
}

/// Object type descriptor: name, optional base type, flags, ordered fields.
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: Rc<str>,
    base: Option<String>,
    sealed: bool,
    singleton: bool,
    fields: Vec<FieldDef>,
}

impl TypeDef {
    pub fn new(name: &str) -> TypeDef {
        TypeDef {
            name: Rc::from(name),
            base: None,
            sealed: false,
            singleton: false,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, kind: Kind) -> TypeDef {
        self.fields.push(FieldDef::new(name, kind));
        self
    }

    /// Add a field that never participates in lazy loading.
    pub fn field_eager(mut self, name: &str, kind: Kind) -> TypeDef {
        self.fields.push(FieldDef::new(name, kind).eager());
        self
    }

    /// Declare the base type this type derives from.
    pub fn base(mut self, name: &str) -> TypeDef {
        self.base = Some(name.to_string());
        self
    }

    /// Sealed types cannot have subtypes; references declared as a sealed
    /// type omit the subtype index on the wire.
    pub fn sealed(mut self) -> TypeDef {
        self.sealed = true;
        self
    }

    /// Process-wide singleton: deep clone returns the same instance instead
    /// of copying.
    pub fn singleton(mut self) -> TypeDef {
        self.singleton = true;
        self
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn base_name(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

/// Enum descriptor: name plus `(variant name, tag)` pairs.
#[derive(Debug, Clone)]
pub struct EnumDef {
    name: Rc<str>,
    variants: Vec<(String, i32)>,
}

impl EnumDef {
    pub fn new(name: &str) -> EnumDef {
        EnumDef {
            name: Rc::from(name),
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, name: &str, tag: i32) -> EnumDef {
        self.variants.push((name.to_string(), tag));
        self
    }

    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    pub fn variants(&self) -> &[(String, i32)] {
        &self.variants
    }

    pub fn tag_of(&self, variant: &str) -> Option<i32> {
        self.variants
            .iter()
            .find(|(n, _)| n == variant)
            .map(|(_, t)| *t)
    }

    pub fn has_tag(&self, tag: i32) -> bool {
        self.variants.iter().any(|(_, t)| *t == tag)
    }
}

/// Immutable type registry. Construct via [`TypeRegistry::builder`].
#[derive(Debug)]
pub struct TypeRegistry {
    objects: HashMap<String, Rc<TypeDef>>,
    enums: HashMap<String, Rc<EnumDef>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder {
            objects: HashMap::new(),
            enums: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Registry with no user types; primitive graphs and collections still
    /// serialize.
    pub fn empty() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry {
            objects: HashMap::new(),
            enums: HashMap::new(),
        })
    }

    pub fn object_def(&self, name: &str) -> Option<Rc<TypeDef>> {
        self.objects.get(name).cloned()
    }

    pub fn enum_def(&self, name: &str) -> Option<Rc<EnumDef>> {
        self.enums.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name) || self.enums.contains_key(name)
    }

    /// Allocate a fresh instance of a registered object type, every field
    /// null.
    pub fn new_object(&self, name: &str) -> Result<ObjHandle> {
        let def = self.object_def(name).ok_or_else(|| Error::UnknownType {
            name: name.to_string(),
        })?;
        Ok(ObjHandle::fresh(def))
    }

    /// Whether any other registered type declares `name` in its base chain.
    pub fn has_subtype(&self, name: &str) -> bool {
        self.objects
            .values()
            .any(|d| &**d.name() != name && self.is_subtype_of(d.name(), name))
    }

    /// Walks the declared base chain.
    pub fn is_subtype_of(&self, derived: &str, base: &str) -> bool {
        let mut cur = derived.to_string();
        loop {
            if cur == base {
                return true;
            }
            match self.objects.get(&cur).and_then(|d| d.base_name()) {
                Some(next) => cur = next.to_string(),
                None => return false,
            }
        }
    }
}

/// Builder for [`TypeRegistry`]. Duplicate or reserved names surface as an
/// error at [`TypeRegistryBuilder::build`].
pub struct TypeRegistryBuilder {
    objects: HashMap<String, Rc<TypeDef>>,
    enums: HashMap<String, Rc<EnumDef>>,
    errors: Vec<String>,
}

impl TypeRegistryBuilder {
    pub fn object(&mut self, def: TypeDef) -> &mut Self {
        let name = def.name().to_string();
        if name.starts_with('#') {
            self.errors.push(name);
        } else if self.objects.contains_key(&name) || self.enums.contains_key(&name) {
            self.errors.push(name);
        } else {
            self.objects.insert(name, Rc::new(def));
        }
        self
    }

    pub fn enumeration(&mut self, def: EnumDef) -> &mut Self {
        let name = def.name().to_string();
        if name.starts_with('#') {
            self.errors.push(name);
        } else if self.objects.contains_key(&name) || self.enums.contains_key(&name) {
            self.errors.push(name);
        } else {
            self.enums.insert(name, Rc::new(def));
        }
        self
    }

    /// Register a `#[derive(GraphType)]` type and, transitively, everything
    /// it references.
    pub fn register<T: crate::GraphType>(&mut self) -> &mut Self {
        T::register(self);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name) || self.enums.contains_key(name)
    }

    pub fn build(&mut self) -> Result<Arc<TypeRegistry>> {
        if let Some(name) = self.errors.first() {
            return Err(Error::DuplicateType { name: name.clone() });
        }
        // Every base-chain walk after this point must terminate.
        for def in self.objects.values() {
            let mut seen = vec![&**def.name()];
            let mut cur = def.base_name();
            while let Some(base) = cur {
                if seen.contains(&base) {
                    return Err(Error::CyclicBase {
                        name: def.name().to_string(),
                    });
                }
                seen.push(base);
                cur = self.objects.get(base).and_then(|d| d.base_name());
            }
        }
        Ok(Arc::new(TypeRegistry {
            objects: std::mem::take(&mut self.objects),
            enums: std::mem::take(&mut self.enums),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_duplicates_and_reserved_names() {
        let mut b = TypeRegistry::builder();
        b.object(TypeDef::new("person").field("name", Kind::Str));
        b.object(TypeDef::new("person"));
        assert!(matches!(b.build(), Err(Error::DuplicateType { .. })));

        let mut b = TypeRegistry::builder();
        b.object(TypeDef::new("#str"));
        assert!(b.build().is_err());
    }

    #[test]
    fn cyclic_base_chain_is_rejected() {
        let mut b = TypeRegistry::builder();
        b.object(TypeDef::new("a").base("b"));
        b.object(TypeDef::new("b").base("a"));
        assert!(matches!(b.build(), Err(Error::CyclicBase { .. })));

        let mut b = TypeRegistry::builder();
        b.object(TypeDef::new("selfish").base("selfish"));
        assert!(matches!(b.build(), Err(Error::CyclicBase { .. })));
    }

    #[test]
    fn base_chain_walk() {
        let mut b = TypeRegistry::builder();
        b.object(TypeDef::new("shape"));
        b.object(TypeDef::new("circle").base("shape"));
        b.object(TypeDef::new("dot").base("circle"));
        let reg = b.build().unwrap();
        assert!(reg.is_subtype_of("dot", "shape"));
        assert!(reg.is_subtype_of("circle", "circle"));
        assert!(!reg.is_subtype_of("shape", "circle"));
    }

    #[test]
    fn lazy_default_tracks_kind() {
        let def = TypeDef::new("node")
            .field("id", Kind::Prim(PrimKind::I32))
            .field("next", Kind::Ref("node".into()))
            .field_eager("tags", Kind::List);
        assert!(!def.fields()[0].is_lazy());
        assert!(def.fields()[1].is_lazy());
        assert!(!def.fields()[2].is_lazy());
    }
}
