// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lazy loading: deferred slots resolve on first access, writes win over
//! pending resolutions, and a dropped source fails loudly.

use std::sync::Arc;

use graphpack::{
    deep_clone, structural_eq, Error, Kind, LoadMode, PrimKind, Serializer, TypeDef, TypeRegistry,
    Value,
};

fn registry() -> Arc<TypeRegistry> {
    let mut b = TypeRegistry::builder();
    b.object(
        TypeDef::new("person")
            .field("name", Kind::Str)
            .field("age", Kind::Prim(PrimKind::I32))
            .field("best", Kind::Ref("person".into()))
            .field("friends", Kind::List),
    );
    b.build().unwrap()
}

fn sample_bytes(ser: &Serializer) -> Vec<u8> {
    let reg = ser.registry().clone();
    let alice = reg.new_object("person").unwrap();
    alice.set("name", Value::str("alice")).unwrap();
    alice.set("age", Value::from(33)).unwrap();
    let bob = reg.new_object("person").unwrap();
    bob.set("name", Value::str("bob")).unwrap();
    bob.set("best", Value::Object(alice.clone())).unwrap();
    bob.set(
        "friends",
        Value::list(vec![Value::Object(alice.clone()), Value::str("offline")]),
    )
    .unwrap();
    alice.set("best", Value::Object(bob.clone())).unwrap();
    ser.save("pair", &Value::Object(bob)).unwrap()
}

#[test]
fn lazy_fields_start_unloaded_and_resolve_on_access() {
    let ser = Serializer::new(registry());
    let bytes = sample_bytes(&ser);

    let loaded = ser.load(bytes, LoadMode::Lazy).unwrap();
    assert!(loaded.is_lazy());
    let bob = loaded.root().as_object().unwrap();

    // Strings and primitives are always materialized.
    assert!(bob.is_loaded("name").unwrap());
    assert_eq!(bob.get("name").unwrap().as_str(), Some("bob"));
    // References and collections are not, until read.
    assert!(!bob.is_loaded("best").unwrap());
    assert!(!bob.is_loaded("friends").unwrap());

    let alice = bob.get("best").unwrap();
    assert!(bob.is_loaded("best").unwrap());
    let alice = alice.as_object().unwrap();
    assert_eq!(alice.get("name").unwrap().as_str(), Some("alice"));
    // The cycle resolves back to the same instance.
    assert_eq!(
        alice.get("best").unwrap().as_object().unwrap().id(),
        bob.id()
    );

    let friends = bob.get("friends").unwrap();
    let friends = friends.as_list().unwrap().borrow().clone();
    assert_eq!(friends[0].as_object().unwrap().id(), alice.id());
    assert_eq!(friends[1].as_str(), Some("offline"));
}

#[test]
fn lazy_load_is_equivalent_to_eager() {
    let ser = Serializer::new(registry());
    let bytes = sample_bytes(&ser);

    let eager = ser.load(bytes.clone(), LoadMode::Eager).unwrap();
    assert!(!eager.is_lazy());
    let lazy = ser.load(bytes, LoadMode::Lazy).unwrap();
    assert!(structural_eq(eager.root(), lazy.root()).unwrap());
}

#[test]
fn a_write_discards_the_pending_resolution() {
    let ser = Serializer::new(registry());
    let bytes = sample_bytes(&ser);

    let loaded = ser.load(bytes, LoadMode::Lazy).unwrap();
    let bob = loaded.root().as_object().unwrap();
    assert!(!bob.is_loaded("best").unwrap());
    bob.set("best", Value::str("nobody")).unwrap();
    assert!(bob.is_loaded("best").unwrap());
    assert_eq!(bob.get("best").unwrap().as_str(), Some("nobody"));
}

#[test]
fn reads_of_a_resolved_slot_return_its_current_content() {
    let ser = Serializer::new(registry());
    let bytes = sample_bytes(&ser);

    let loaded = ser.load(bytes, LoadMode::Lazy).unwrap();
    let bob = loaded.root().as_object().unwrap();
    let first = bob.get("best").unwrap();
    let second = bob.get("best").unwrap();
    assert_eq!(first.identity(), second.identity());

    // Once a write lands, every later read sees it, not the resolution.
    bob.set("best", Value::str("switched")).unwrap();
    assert_eq!(bob.get("best").unwrap().as_str(), Some("switched"));
}

#[test]
fn resolving_after_the_source_is_dropped_fails() {
    let ser = Serializer::new(registry());
    let bytes = sample_bytes(&ser);

    let loaded = ser.load(bytes, LoadMode::Lazy).unwrap();
    // Taking the root drops the loader and its byte buffer.
    let root = loaded.into_root();
    let bob = root.as_object().unwrap();
    assert_eq!(bob.get("name").unwrap().as_str(), Some("bob"));
    assert!(matches!(
        bob.get("best").unwrap_err(),
        Error::LazySourceDropped
    ));
}

#[test]
fn cloning_a_lazy_graph_resolves_everything() {
    let ser = Serializer::new(registry());
    let bytes = sample_bytes(&ser);

    let loaded = ser.load(bytes, LoadMode::Lazy).unwrap();
    let copy = deep_clone(loaded.root());

    // The copy stands alone once the source is gone.
    let original = structural_eq(loaded.root(), &copy).unwrap();
    assert!(original);
    drop(loaded);
    let bob = copy.as_object().unwrap();
    assert_eq!(
        bob.get("best")
            .unwrap()
            .as_object()
            .unwrap()
            .get("name")
            .unwrap()
            .as_str(),
        Some("alice")
    );
}
