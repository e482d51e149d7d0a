// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end save/load behavior: identity preservation, cycles, subtypes,
//! schema tolerance and corrupt-input rejection.

use std::sync::Arc;

use graphpack::{
    structural_eq, EnumDef, EnumVal, Error, Kind, LoadMode, Prim, PrimArray, PrimKind, Serializer,
    Stamp, TypeDef, TypeRegistry, Value,
};

fn person_registry() -> Arc<TypeRegistry> {
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

#[test]
fn shared_references_and_cycles_survive_roundtrip() {
    let reg = person_registry();
    let alice = reg.new_object("person").unwrap();
    alice.set("name", Value::str("alice")).unwrap();
    alice.set("age", Value::from(33)).unwrap();
    // Self cycle: alice is her own best friend.
    alice.set("best", Value::Object(alice.clone())).unwrap();
    let bob = reg.new_object("person").unwrap();
    bob.set("name", Value::str("bob")).unwrap();
    bob.set("age", Value::from(35)).unwrap();
    bob.set("best", Value::Object(alice.clone())).unwrap();
    let carol = reg.new_object("person").unwrap();
    carol.set("name", Value::str("carol")).unwrap();
    let root = Value::list(vec![
        Value::Object(alice.clone()),
        Value::Object(bob),
        Value::Object(carol),
    ]);

    let ser = Serializer::new(reg);
    let bytes = ser.save("people", &root).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
    assert_eq!(loaded.name(), "people");
    assert!(loaded.unresolved_types().is_empty());

    let people = loaded.root().as_list().unwrap().borrow().clone();
    let l_alice = people[0].as_object().unwrap().clone();
    let l_bob = people[1].as_object().unwrap().clone();
    assert_eq!(l_alice.get("name").unwrap().as_str(), Some("alice"));
    assert_eq!(l_bob.get("age").unwrap().as_i32(), Some(35));

    // One alice: the cycle and the shared reference land on one instance.
    let alice_best = l_alice.get("best").unwrap();
    let bob_best = l_bob.get("best").unwrap();
    assert_eq!(alice_best.as_object().unwrap().id(), l_alice.id());
    assert_eq!(bob_best.as_object().unwrap().id(), l_alice.id());
    // And it is a fresh instance, not the one we saved.
    assert_ne!(l_alice.id(), alice.id());

    assert!(structural_eq(&root, loaded.root()).unwrap());
}

#[test]
fn mutually_recursive_collections() {
    let a = Value::list(vec![Value::Null, Value::str("a")]);
    let b = Value::list(vec![a.clone(), Value::str("b")]);
    a.as_list().unwrap().borrow_mut()[0] = b.clone();

    let ser = Serializer::new(TypeRegistry::empty());
    let bytes = ser.save("cycle", &a).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();

    let la = loaded.root().as_list().unwrap().clone();
    let lb = la.borrow()[0].as_list().unwrap().clone();
    let back = lb.borrow()[0].clone();
    assert_eq!(back.identity(), Value::List(la.clone()).identity());
    assert!(structural_eq(&a, loaded.root()).unwrap());
}

#[test]
fn inline_kinds_roundtrip_in_any_context() {
    let root = Value::list(vec![
        Value::from(true),
        Value::from(-12i64),
        Value::from(2.5f64),
        Value::Prim(Prim::Char('ß')),
        Value::Stamp(Stamp::utc(1_700_000_000_000_000_000)),
        Value::Span(86_400_000_000_000),
        Value::EnumVal(EnumVal {
            type_name: std::rc::Rc::from("color"),
            tag: 2,
        }),
        Value::TypeName(std::rc::Rc::from("person")),
    ]);
    let ser = Serializer::new(TypeRegistry::empty());
    let bytes = ser.save("inline", &root).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
    assert!(structural_eq(&root, loaded.root()).unwrap());
}

#[test]
fn declared_kind_fields_roundtrip() {
    let mut b = TypeRegistry::builder();
    b.enumeration(EnumDef::new("color").variant("red", 0).variant("green", 1));
    b.object(
        TypeDef::new("event")
            .field("at", Kind::Stamp)
            .field("dur", Kind::Span)
            .field("color", Kind::Enum("color".into()))
            .field("kind", Kind::TypeName)
            .field("payload", Kind::Bytes)
            .field("samples", Kind::Array(PrimKind::F64)),
    );
    let reg = b.build().unwrap();

    let event = reg.new_object("event").unwrap();
    event
        .set("at", Value::Stamp(Stamp::utc(1_000_000_007)))
        .unwrap();
    event.set("dur", Value::Span(42)).unwrap();
    event
        .set(
            "color",
            Value::EnumVal(EnumVal {
                type_name: std::rc::Rc::from("color"),
                tag: 1,
            }),
        )
        .unwrap();
    event
        .set("kind", Value::TypeName(std::rc::Rc::from("event")))
        .unwrap();
    event.set("payload", Value::bytes(vec![0, 255, 7])).unwrap();
    event
        .set("samples", Value::array(PrimArray::from(vec![0.5f64, -1.5])))
        .unwrap();

    let ser = Serializer::new(reg);
    let bytes = ser.save("events", &Value::Object(event.clone())).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
    assert!(structural_eq(&Value::Object(event), loaded.root()).unwrap());
}

#[test]
fn maps_preserve_shared_identity() {
    let reg = person_registry();
    let p = reg.new_object("person").unwrap();
    p.set("name", Value::str("carol")).unwrap();
    let map = Value::map(vec![
        (Value::str("owner"), Value::Object(p.clone())),
        (Value::from(7), Value::str("seven")),
    ]);
    let root = Value::list(vec![map, Value::Object(p)]);

    let ser = Serializer::new(reg);
    let bytes = ser.save("m", &root).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();

    let items = loaded.root().as_list().unwrap().borrow().clone();
    let entries = items[0].as_map().unwrap().borrow().clone();
    assert_eq!(entries[0].1.identity(), items[1].identity());
    assert!(structural_eq(&root, loaded.root()).unwrap());
}

#[test]
fn subtype_in_base_typed_field_keeps_its_type() {
    let mut b = TypeRegistry::builder();
    b.object(TypeDef::new("shape").field("name", Kind::Str));
    b.object(
        TypeDef::new("circle")
            .base("shape")
            .field("name", Kind::Str)
            .field("radius", Kind::Prim(PrimKind::F64)),
    );
    b.object(TypeDef::new("canvas").field("top", Kind::Ref("shape".into())));
    let reg = b.build().unwrap();

    let circle = reg.new_object("circle").unwrap();
    circle.set("name", Value::str("c")).unwrap();
    circle.set("radius", Value::from(2.0f64)).unwrap();
    let canvas = reg.new_object("canvas").unwrap();
    canvas.set("top", Value::Object(circle)).unwrap();

    let ser = Serializer::new(reg);
    let bytes = ser.save("g", &Value::Object(canvas)).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();

    let top = loaded
        .root()
        .as_object()
        .unwrap()
        .get("top")
        .unwrap();
    let top = top.as_object().unwrap();
    assert_eq!(&*top.type_name(), "circle");
    assert_eq!(
        top.get("radius").unwrap().as_prim(),
        Some(Prim::F64(2.0))
    );
}

#[test]
fn sealed_reference_omits_the_subtype_index() {
    fn bytes_for(sealed: bool) -> Vec<u8> {
        let mut b = TypeRegistry::builder();
        let point = TypeDef::new("point").field("x", Kind::Prim(PrimKind::I32));
        b.object(if sealed { point.sealed() } else { point });
        b.object(TypeDef::new("holder").field("p", Kind::Ref("point".into())));
        let reg = b.build().unwrap();

        let point = reg.new_object("point").unwrap();
        point.set("x", Value::from(9)).unwrap();
        let holder = reg.new_object("holder").unwrap();
        holder.set("p", Value::Object(point)).unwrap();
        Serializer::new(reg)
            .save("g", &Value::Object(holder))
            .unwrap()
    }

    let sealed = bytes_for(true);
    let open = bytes_for(false);
    // The sealed encoding drops one u16 type index at the reference site.
    assert_eq!(sealed.len() + 2, open.len());

    // Both stay loadable against the sealed registry: the flag byte is
    // self-describing.
    let mut b = TypeRegistry::builder();
    b.object(
        TypeDef::new("point")
            .field("x", Kind::Prim(PrimKind::I32))
            .sealed(),
    );
    b.object(TypeDef::new("holder").field("p", Kind::Ref("point".into())));
    let ser = Serializer::new(b.build().unwrap());
    for bytes in [sealed, open] {
        let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
        let p = loaded.root().as_object().unwrap().get("p").unwrap();
        assert_eq!(p.as_object().unwrap().get("x").unwrap().as_i32(), Some(9));
    }
}

#[test]
fn unknown_type_degrades_to_null() {
    let mut b = TypeRegistry::builder();
    b.object(TypeDef::new("gadget").field("label", Kind::Str));
    let reg = b.build().unwrap();
    let gadget = reg.new_object("gadget").unwrap();
    gadget.set("label", Value::str("x")).unwrap();
    let root = Value::list(vec![Value::Object(gadget), Value::from(7)]);
    let bytes = Serializer::new(reg).save("g", &root).unwrap();

    // A reader without the gadget type still loads the rest.
    let loaded = Serializer::new(TypeRegistry::empty())
        .load(bytes, LoadMode::Eager)
        .unwrap();
    let items = loaded.root().as_list().unwrap().borrow().clone();
    assert!(items[0].is_null());
    assert_eq!(items[1].as_i32(), Some(7));
    assert_eq!(loaded.unresolved_types(), ["gadget".to_string()]);
}

#[test]
fn array_block_records_element_count() {
    let ser = Serializer::new(TypeRegistry::empty());
    let root = Value::array(PrimArray::from(vec![1i32, 2, 3]));
    let bytes = ser.save("ints", &root).unwrap();

    let info = ser.validate(&bytes).unwrap();
    let arr = info
        .types
        .iter()
        .find(|t| t.name == "#array:i32")
        .expect("array schema entry");
    assert_eq!(arr.num_objects, 1);
    // Count header, one size-table entry, three elements.
    assert_eq!(arr.data_size, 4 + 4 + 12);

    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
    let items = loaded.root().as_array().unwrap().borrow().clone();
    assert_eq!(items.len(), 3);
    assert_eq!(items.items()[2], Prim::I32(3));
}

#[test]
fn corrupt_recorded_length_is_rejected() {
    let ser = Serializer::new(TypeRegistry::empty());
    let mut bytes = ser.save("g", &Value::list(vec![Value::from(1)])).unwrap();
    // Length field sits after magic and version.
    bytes[6] = bytes[6].wrapping_add(1);
    assert!(matches!(
        ser.load(bytes, LoadMode::Eager).unwrap_err(),
        Error::LengthMismatch { .. }
    ));
}

#[test]
fn wrong_magic_is_rejected() {
    let ser = Serializer::new(TypeRegistry::empty());
    let mut bytes = ser.save("g", &Value::list(vec![])).unwrap();
    bytes[0] ^= 0xFF;
    assert!(matches!(
        ser.load(bytes, LoadMode::Eager).unwrap_err(),
        Error::BadMagic { .. }
    ));
}

#[test]
fn null_root_roundtrip() {
    let ser = Serializer::new(TypeRegistry::empty());
    let bytes = ser.save("empty", &Value::Null).unwrap();
    let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
    assert!(loaded.root().is_null());
}

#[test]
fn randomized_trees_roundtrip() {
    fn random_value(rng: &mut fastrand::Rng, depth: u32) -> Value {
        match if depth == 0 { rng.u8(0..4) } else { rng.u8(0..6) } {
            0 => Value::from(rng.i32(..)),
            1 => Value::str(&format!("s{}", rng.u32(0..16))),
            2 => Value::from(rng.f64()),
            3 => Value::bytes((0..rng.usize(0..8)).map(|_| rng.u8(..)).collect()),
            4 => Value::list(
                (0..rng.usize(0..5))
                    .map(|_| random_value(rng, depth - 1))
                    .collect(),
            ),
            _ => Value::map(
                (0..rng.usize(0..4))
                    .map(|_| {
                        (
                            Value::str(&format!("k{}", rng.u32(0..8))),
                            random_value(rng, depth - 1),
                        )
                    })
                    .collect(),
            ),
        }
    }

    let mut rng = fastrand::Rng::with_seed(0x6772_7068);
    let ser = Serializer::new(TypeRegistry::empty());
    for _ in 0..32 {
        let root = random_value(&mut rng, 3);
        let bytes = ser.save("rand", &root).unwrap();
        let loaded = ser.load(bytes, LoadMode::Eager).unwrap();
        assert!(structural_eq(&root, loaded.root()).unwrap());
    }
}
