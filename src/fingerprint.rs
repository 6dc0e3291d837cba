// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Content fingerprinting.
//!
//! The gate treats fingerprints as opaque strings. Hosts that already have a
//! hash function plug it in through [`ContentHasher`]; [`Sha256Hasher`] is
//! provided for hosts that don't.

use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Turns the content of a software unit into a fingerprint string.
pub trait ContentHasher: Send + Sync {
    fn fingerprint(&self, content: &[u8]) -> String;
}

/// Lowercase hex SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn fingerprint(&self, content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }
}

/// Fingerprint a file on disk with the given hasher.
pub fn fingerprint_file(path: &Path, hasher: &dyn ContentHasher) -> Result<String> {
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read {} for fingerprinting", path.display()))?;
    Ok(hasher.fingerprint(&data))
}
