// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Persistence façades over the serializer: disk files with bounded retry,
//! and in-memory buffers with a compressed base64 text form for embedding
//! graphs in configuration or transport payloads.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
