// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deferred object references.
//!
//! A `TypeRef` is an unresolved `(load session, type index, object index)`
//! pointer stored in a lazy slot. Resolution materializes that subtree
//! through the load queue, then the slot caches the value and drops the
//! `TypeRef`. The session is held weakly: a dropped [`crate::LoadedGraph`]
//! must not be kept alive by the fields that still point into it, so a late
//! resolution fails with a typed error instead of leaking the input buffer.

use std::cell::RefCell;
use std::fmt;
use std::rc::Weak;

use crate::error::{Error, Result};
use crate::load::LoadSession;
use crate::value::Value;

#[derive(Clone)]
pub(crate) struct TypeRef {
    pub(crate) session: Weak<RefCell<LoadSession>>,
    pub(crate) type_index: u16,
    pub(crate) object_index: u32,
}

impl TypeRef {
    /// Materialize the referenced object (and whatever the load queue pulls
    /// in behind it).
    pub(crate) fn resolve(&self) -> Result<Value> {
        let session = self.session.upgrade().ok_or(Error::LazySourceDropped)?;
        let mut session = session.borrow_mut();
        let value = session.get_or_create(self.type_index, self.object_index)?;
        session.drain()?;
        Ok(value)
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TypeRef(type {}, object {})",
            self.type_index, self.object_index
        )
    }
}
