// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Disk persistence with bounded retry.
//!
//! Writes go through a linear-backoff retry loop: transient failures
//! (editors holding locks, antivirus scans, network shares) usually clear
//! within a few hundred milliseconds. Retries exhausted is a typed error
//! carrying the path and the last I/O failure.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::load::{FileInfo, LoadMode, LoadedGraph};
use crate::value::Value;
use crate::Serializer;

const SAVE_RETRY_ATTEMPTS: u32 = 5;
const SAVE_RETRY_DELAY_MS: u64 = 100;

/// File-backed graph store.
#[derive(Debug, Clone)]
pub struct FileStore {
    serializer: Serializer,
}

impl FileStore {
    pub fn new(serializer: Serializer) -> FileStore {
        FileStore { serializer }
    }

    /// Encode `root` and write it to `path`, retrying transient failures.
    pub fn save(&self, path: &Path, name: &str, root: &Value) -> Result<()> {
        let bytes = self.serializer.save(name, root)?;
        write_with_retry(path, &bytes)
    }

    pub fn load(&self, path: &Path, mode: LoadMode) -> Result<LoadedGraph> {
        let bytes = fs::read(path)?;
        self.serializer.load(bytes, mode)
    }

    /// Check the file's preamble without materializing objects.
    pub fn validate(&self, path: &Path) -> Result<FileInfo> {
        let bytes = fs::read(path)?;
        self.serializer.validate(&bytes)
    }
}

fn write_with_retry(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut last_err = None;
    for attempt in 1..=SAVE_RETRY_ATTEMPTS {
        match fs::write(path, bytes) {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!(
                    "write to {} failed (attempt {attempt}/{SAVE_RETRY_ATTEMPTS}): {e}",
                    path.display()
                );
                last_err = Some(e);
                if attempt < SAVE_RETRY_ATTEMPTS {
                    thread::sleep(Duration::from_millis(SAVE_RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
    log::error!("giving up on write to {}", path.display());
    Err(Error::SaveRetriesExhausted {
        path: path.to_path_buf(),
        attempts: SAVE_RETRY_ATTEMPTS,
        source: last_err.unwrap_or_else(|| std::io::Error::other("no attempt recorded")),
    })
}
