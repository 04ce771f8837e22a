// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — streaming SHA-256 content digests.

use std::io::{ErrorKind, Read};

use sha2::{Digest, Sha256};
use tracing::{instrument, trace};
use vellum_core::error::VellumError;
use vellum_core::types::ContentDigest;

/// Default read size when streaming a document into the hasher.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Computes content digests over document streams.
///
/// Input is consumed in fixed-size chunks so arbitrarily large documents can
/// be hashed without buffering them in memory.
#[derive(Debug, Clone, Copy)]
pub struct HashEngine {
    chunk_size: usize,
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl HashEngine {
    /// A zero chunk size is bumped to one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Digest everything `reader` yields until EOF.
    ///
    /// Fails with `VellumError::Io` if the stream cannot be read to the end.
    /// Empty input yields the SHA-256 of the empty string.
    #[instrument(skip_all, fields(chunk_size = self.chunk_size))]
    pub fn digest<R: Read + ?Sized>(&self, reader: &mut R) -> Result<ContentDigest, VellumError> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(VellumError::Io(e)),
            };
            hasher.update(&buffer[..n]);
            total += n as u64;
        }

        let digest = ContentDigest(hasher.finalize().into());
        trace!(bytes = total, digest = %digest, "stream digested");
        Ok(digest)
    }

    /// Digest an in-memory buffer.
    pub fn digest_bytes(&self, data: &[u8]) -> ContentDigest {
        ContentDigest(Sha256::digest(data).into())
    }
}
