// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Provenance stamping — renders a visible signer line onto a stored PDF
// version and records the result as a new version.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use vellum_core::config::StampStyle;
use vellum_core::error::Result;
use vellum_core::types::{DocumentId, VersionId};
use vellum_document::StampRenderer;
use vellum_store::VersionStore;

use crate::locks::DocumentLocks;

/// Writes provenance stamps as new document versions.
pub struct ProvenanceStamper {
    versions: Arc<VersionStore>,
    renderer: StampRenderer,
    locks: Option<Arc<DocumentLocks>>,
}

impl ProvenanceStamper {
    pub fn new(versions: Arc<VersionStore>) -> Self {
        Self {
            versions,
            renderer: StampRenderer::default(),
            locks: None,
        }
    }

    pub fn with_style(mut self, style: StampStyle) -> Self {
        self.renderer = StampRenderer::new(style);
        self
    }

    /// Serialise stamps of the same document through `locks`.
    pub fn with_locks(mut self, locks: Arc<DocumentLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn renderer(&self) -> &StampRenderer {
        &self.renderer
    }

    /// Stamp `signer` and `timestamp` onto the last page of `version` and
    /// append the result as the document's newest version.
    ///
    /// The source version is left untouched. Non-PDF content is
    /// `UnsupportedFormat`.
    pub fn stamp(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<VersionId> {
        let _guard = match &self.locks {
            Some(locks) => Some(locks.lock(document)?),
            None => None,
        };
        self.stamp_unlocked(document, version, signer, timestamp)
    }

    /// `stamp` for callers that already hold the document's lock.
    #[instrument(skip(self, timestamp), fields(%document, %version))]
    pub(crate) fn stamp_unlocked(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<VersionId> {
        let source = self.versions.fetch(document, version)?;
        let line = self.renderer.stamp_line(signer, timestamp);
        let stamped = self.renderer.render(&source, &line)?;

        let note = format!("stamped from {version}: {line}");
        let appended = self.versions.append_version(document, &stamped, Some(&note))?;

        info!(new_version = %appended.version_id, "provenance stamp recorded");
        Ok(appended.version_id)
    }
}
