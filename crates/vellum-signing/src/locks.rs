// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-document single-writer locks.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;
use vellum_core::error::{Result, VellumError};
use vellum_core::types::DocumentId;

/// Serialises writers per document. Different documents never block each
/// other.
#[derive(Default)]
pub struct DocumentLocks {
    held: Mutex<HashSet<DocumentId>>,
    released: Condvar,
}

/// Held while a writer owns a document. Dropping it releases the document.
pub struct DocumentGuard<'a> {
    locks: &'a DocumentLocks,
    document: DocumentId,
}

fn poisoned<T>(_: PoisonError<T>) -> VellumError {
    VellumError::Database("document lock table poisoned".into())
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other writer holds `document`, then take it.
    pub fn lock(&self, document: &DocumentId) -> Result<DocumentGuard<'_>> {
        let mut held = self.held.lock().map_err(poisoned)?;
        while held.contains(document) {
            held = self.released.wait(held).map_err(poisoned)?;
        }
        held.insert(*document);
        trace!(%document, "document lock acquired");
        Ok(DocumentGuard {
            locks: self,
            document: *document,
        })
    }

    pub fn is_locked(&self, document: &DocumentId) -> bool {
        self.table().contains(document)
    }

    fn table(&self) -> MutexGuard<'_, HashSet<DocumentId>> {
        // The set stays consistent even if a holder panicked.
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        self.locks.table().remove(&self.document);
        self.locks.released.notify_all();
        trace!(document = %self.document, "document lock released");
    }
}
