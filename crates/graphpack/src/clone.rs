// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deep cloning.
//!
//! Same discipline as the load pipeline: an identity map memoizes every
//! copied allocation before its children are visited, and children are
//! copied through an explicit queue, so shared references stay shared,
//! cycles terminate, and arbitrarily deep graphs never touch the call
//! stack. Inline values copy by value; strings share their `Rc` storage.
//! Singleton types are never copied: the clone holds the original handle.

use std::collections::{HashMap, VecDeque};

use crate::error::Result;
use crate::object::ObjHandle;
use crate::value::{ObjId, Value};

/// Clone `v` and everything reachable from it, tolerating per-object
/// failures: a field that cannot be read (for example a lazy field whose
/// load session is gone) is logged and left null in the copy.
pub fn deep_clone(v: &Value) -> Value {
    let mut sess = CloneSession::new(false);
    // Shell creation is infallible in lenient mode.
    let root = sess.clone_value(v).unwrap_or(Value::Null);
    sess.drain();
    root
}

/// Strict variant: the first failure aborts and is returned.
pub fn try_deep_clone(v: &Value) -> Result<Value> {
    let mut sess = CloneSession::new(true);
    let root = sess.clone_value(v)?;
    sess.drain();
    match sess.failure.take() {
        Some(e) => Err(e),
        None => Ok(root),
    }
}

struct CloneSession {
    map: HashMap<ObjId, Value>,
    queue: VecDeque<(Value, Value)>,
    strict: bool,
    failure: Option<crate::error::Error>,
}

impl CloneSession {
    fn new(strict: bool) -> CloneSession {
        CloneSession {
            map: HashMap::new(),
            queue: VecDeque::new(),
            strict,
            failure: None,
        }
    }

    /// Copy one value. Identity-bearing kinds are memoized by source
    /// identity; collections and objects come back as shells and are filled
    /// by [`CloneSession::drain`].
    fn clone_value(&mut self, v: &Value) -> Result<Value> {
        let id = match v.identity() {
            Some(id) => id,
            // Inline kinds, including strings (shared Rc storage).
            None => return Ok(v.clone()),
        };
        if let Some(copy) = self.map.get(&id) {
            return Ok(copy.clone());
        }
        let copy = match v {
            Value::Bytes(b) => Value::bytes(b.borrow().clone()),
            Value::Array(a) => Value::array(a.borrow().clone()),
            Value::List(l) => {
                let shell = Value::list(vec![Value::Null; l.borrow().len()]);
                self.queue.push_back((v.clone(), shell.clone()));
                shell
            }
            Value::Map(m) => {
                let shell = Value::map(vec![(Value::Null, Value::Null); m.borrow().len()]);
                self.queue.push_back((v.clone(), shell.clone()));
                shell
            }
            Value::Object(h) => {
                if h.def().is_singleton() {
                    v.clone()
                } else {
                    let shell = Value::Object(ObjHandle::fresh(h.def()));
                    self.queue.push_back((v.clone(), shell.clone()));
                    shell
                }
            }
            _ => return Ok(v.clone()),
        };
        // Inserted before children are visited: a cycle back to `v` finds
        // the shell here instead of recursing.
        self.map.insert(id, copy.clone());
        Ok(copy)
    }

    fn drain(&mut self) {
        while let Some((src, dst)) = self.queue.pop_front() {
            if let Err(e) = self.fill(&src, &dst) {
                if self.strict {
                    if self.failure.is_none() {
                        self.failure = Some(e);
                    }
                    self.queue.clear();
                    return;
                }
                log::warn!("skipped {} during deep clone: {e}", src.kind_name());
            }
        }
    }

    fn fill(&mut self, src: &Value, dst: &Value) -> Result<()> {
        match (src, dst) {
            (Value::List(src), Value::List(dst)) => {
                let items = src.borrow().clone();
                for (idx, item) in items.iter().enumerate() {
                    let copy = self.clone_value(item)?;
                    dst.borrow_mut()[idx] = copy;
                }
                Ok(())
            }
            (Value::Map(src), Value::Map(dst)) => {
                let entries = src.borrow().clone();
                for (idx, (key, value)) in entries.iter().enumerate() {
                    let key = self.clone_value(key)?;
                    let value = self.clone_value(value)?;
                    dst.borrow_mut()[idx] = (key, value);
                }
                Ok(())
            }
            (Value::Object(src), Value::Object(dst)) => {
                for idx in 0..src.slot_count() {
                    // May resolve a lazy field; errors bubble to drain.
                    let child = src.get_at(idx)?;
                    let copy = self.clone_value(&child)?;
                    dst.set_at(idx, copy);
                }
                Ok(())
            }
            _ => Err(crate::error::Error::Internal("clone shell kind mismatch")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Kind, TypeDef, TypeRegistry};
    use crate::value::PrimArray;

    #[test]
    fn shared_reference_cloned_once() {
        let shared = Value::array(PrimArray::from(vec![1i32, 2, 3]));
        let root = Value::list(vec![shared.clone(), shared.clone()]);
        let copy = deep_clone(&root);

        let list = copy.as_list().unwrap().borrow().clone();
        assert_eq!(list.len(), 2);
        // Both entries are the same new allocation, distinct from the source.
        assert_eq!(list[0].identity(), list[1].identity());
        assert_ne!(list[0].identity(), shared.identity());
    }

    #[test]
    fn self_cycle_terminates() {
        let list = Value::list(vec![Value::Null]);
        list.as_list().unwrap().borrow_mut()[0] = list.clone();

        let copy = deep_clone(&list);
        let inner = copy.as_list().unwrap().borrow()[0].clone();
        assert_eq!(inner.identity(), copy.identity());
        assert_ne!(copy.identity(), list.identity());
    }

    #[test]
    fn singleton_object_keeps_its_handle() {
        let mut b = TypeRegistry::builder();
        b.object(TypeDef::new("config").field("name", Kind::Str).singleton());
        let reg = b.build().unwrap();
        let cfg = reg.new_object("config").unwrap();
        cfg.set("name", Value::str("prod")).unwrap();

        let root = Value::list(vec![Value::Object(cfg.clone())]);
        let copy = try_deep_clone(&root).unwrap();
        let inner = copy.as_list().unwrap().borrow()[0].clone();
        assert_eq!(inner.as_object().unwrap().id(), cfg.id());
    }

    #[test]
    fn cloning_a_clone_is_structurally_stable() {
        let shared = Value::array(PrimArray::from(vec![7i32, 8]));
        let root = Value::list(vec![
            shared.clone(),
            shared,
            Value::str("tail"),
            Value::Null,
        ]);
        // Cycle back to the root through the last slot.
        root.as_list().unwrap().borrow_mut()[3] = root.clone();

        let once = deep_clone(&root);
        let twice = deep_clone(&once);
        assert!(crate::structural_eq(&once, &twice).unwrap());
        assert!(crate::structural_eq(&root, &twice).unwrap());
        assert_ne!(once.identity(), twice.identity());
    }

    #[test]
    fn strings_share_storage() {
        let root = Value::list(vec![Value::str("shared")]);
        let copy = deep_clone(&root);
        let (a, b) = (
            root.as_list().unwrap().borrow()[0].clone(),
            copy.as_list().unwrap().borrow()[0].clone(),
        );
        match (a, b) {
            (Value::Str(a), Value::Str(b)) => assert!(std::rc::Rc::ptr_eq(&a, &b)),
            _ => panic!("expected strings"),
        }
    }
}
