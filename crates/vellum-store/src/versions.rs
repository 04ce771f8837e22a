// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Append-only document version history.
//
// Bytes go to the object store, hashes and ordering go to the ledger. A
// version is only ever appended; its bytes are never rewritten, and they are
// only removed by `purge_version` when no signature refers to them.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, instrument, warn};

use vellum_core::config::VellumConfig;
use vellum_core::error::{Result, VellumError};
use vellum_core::types::{
    ContentDigest, Document, DocumentId, DocumentStatus, DocumentVersion, UserId, VersionId,
};
use vellum_security::HashEngine;

use crate::object::ObjectStore;
use crate::repository::{
    DocumentRepository, MetadataStore, SignatureRepository, VersionRepository,
};

/// Current time at the ledger's storage precision.
pub(crate) fn ledger_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Versioned document storage over an object store and a metadata ledger.
pub struct VersionStore {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    hasher: HashEngine,
}

impl VersionStore {
    pub fn new(objects: Arc<dyn ObjectStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            objects,
            metadata,
            hasher: HashEngine::default(),
        }
    }

    /// A store that digests with `config.hash_chunk_size` reads.
    pub fn with_config(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        config: &VellumConfig,
    ) -> Self {
        Self::new(objects, metadata).with_hasher(HashEngine::new(config.hash_chunk_size))
    }

    /// Use `hasher` for every digest this store computes.
    pub fn with_hasher(mut self, hasher: HashEngine) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn hasher(&self) -> &HashEngine {
        &self.hasher
    }

    // -- Writes ---------------------------------------------------------------

    /// Create a document owned by `owner` with `bytes` as its first version.
    #[instrument(skip(self, bytes), fields(%owner, bytes_len = bytes.len()))]
    pub fn upload(
        &self,
        owner: &UserId,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
        note: Option<&str>,
    ) -> Result<(Document, DocumentVersion)> {
        let mut document = Document::new(owner.clone(), filename, content_type);
        document.created_at = ledger_now();
        self.metadata.insert_document(&document)?;

        let version = match self.store_version(&document, bytes, note) {
            Ok(version) => version,
            Err(err) => {
                // A document exists only together with its first version.
                if let Err(cleanup) = self.metadata.discard_document(&document.id) {
                    warn!(document_id = %document.id, error = %cleanup, "failed to discard empty document");
                }
                return Err(err);
            }
        };
        document.current_version = Some(version.version_id.clone());

        info!(document_id = %document.id, version_id = %version.version_id, "document uploaded");
        Ok((document, version))
    }

    /// Append `bytes` as the newest version of `document`.
    ///
    /// Retired documents accept no new versions.
    #[instrument(skip(self, bytes), fields(%document, bytes_len = bytes.len()))]
    pub fn append_version(
        &self,
        document: &DocumentId,
        bytes: &[u8],
        note: Option<&str>,
    ) -> Result<DocumentVersion> {
        let doc = self.document(document)?;
        if doc.is_retired() {
            return Err(VellumError::DocumentNotFound(format!("{document} (retired)")));
        }
        let version = self.store_version(&doc, bytes, note)?;
        info!(version_id = %version.version_id, seq = version.seq, "version appended");
        Ok(version)
    }

    fn store_version(
        &self,
        document: &Document,
        bytes: &[u8],
        note: Option<&str>,
    ) -> Result<DocumentVersion> {
        let content_hash = self.hasher.digest_bytes(bytes);
        let version_id = self
            .objects
            .put(&document.storage_key, bytes, &document.content_type)?;

        let draft = DocumentVersion {
            document_id: document.id,
            version_id: version_id.clone(),
            seq: 0,
            content_hash,
            size_bytes: bytes.len() as u64,
            created_at: ledger_now(),
            note: note.map(str::to_owned),
            purged_at: None,
        };

        match self.metadata.append_version(&draft) {
            Ok(version) => Ok(version),
            Err(err) => {
                // Unrecorded bytes would be unreachable; drop them.
                if let Err(cleanup) = self.objects.delete(&document.storage_key, Some(&version_id)) {
                    warn!(%version_id, error = %cleanup, "failed to remove orphaned object");
                }
                Err(err)
            }
        }
    }

    pub fn set_status(&self, document: &DocumentId, status: DocumentStatus) -> Result<()> {
        if !self.metadata.set_status(document, status)? {
            return Err(VellumError::DocumentNotFound(document.to_string()));
        }
        info!(%document, status = status.as_str(), "document status changed");
        Ok(())
    }

    /// Soft delete. History and signatures stay readable.
    pub fn retire(&self, document: &DocumentId) -> Result<()> {
        if !self.metadata.retire(document, ledger_now())? {
            return Err(VellumError::DocumentNotFound(document.to_string()));
        }
        info!(%document, "document retired");
        Ok(())
    }

    /// Physically delete one version's bytes.
    ///
    /// Refused with `VersionReferenced` while any signature covers the
    /// version. The ledger row is kept and marked purged.
    #[instrument(skip(self))]
    pub fn purge_version(&self, document: &DocumentId, version: &VersionId) -> Result<()> {
        let doc = self.document(document)?;
        let row = self.version(document, version)?;
        if row.purged_at.is_some() {
            debug!("version already purged");
            return Ok(());
        }

        let signatures = self.metadata.count_signatures(document, version)?;
        if signatures > 0 {
            return Err(VellumError::VersionReferenced {
                document: document.to_string(),
                version: version.to_string(),
                signatures,
            });
        }

        match self.objects.delete(&doc.storage_key, Some(version)) {
            Ok(()) | Err(VellumError::ContentNotFound { .. }) => {}
            Err(err) => return Err(err),
        }
        self.metadata.mark_purged(document, version, ledger_now())?;
        info!("version purged");
        Ok(())
    }

    // -- Reads ----------------------------------------------------------------

    /// Document metadata, retired or not.
    pub fn document(&self, document: &DocumentId) -> Result<Document> {
        self.metadata
            .document(document)?
            .ok_or_else(|| VellumError::DocumentNotFound(document.to_string()))
    }

    /// Ledger row for one version.
    pub fn version(&self, document: &DocumentId, version: &VersionId) -> Result<DocumentVersion> {
        self.metadata
            .version(document, version)?
            .ok_or_else(|| VellumError::content_not_found(document.to_string(), Some(version.as_str())))
    }

    /// All versions, oldest first.
    pub fn history(&self, document: &DocumentId) -> Result<Vec<DocumentVersion>> {
        self.document(document)?;
        self.metadata.versions(document)
    }

    /// Stream the exact bytes of one version.
    pub fn open(&self, document: &DocumentId, version: &VersionId) -> Result<Box<dyn Read + Send>> {
        let doc = self.document(document)?;
        let row = self.version(document, version)?;
        if row.purged_at.is_some() {
            return Err(VellumError::content_not_found(doc.storage_key, Some(version.as_str())));
        }
        self.objects.get(&doc.storage_key, Some(version))
    }

    /// Read one version fully into memory.
    pub fn fetch(&self, document: &DocumentId, version: &VersionId) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.open(document, version)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Stream the stored bytes of one version through the hash engine.
    #[instrument(skip(self))]
    pub fn digest(&self, document: &DocumentId, version: &VersionId) -> Result<ContentDigest> {
        let mut reader = self.open(document, version)?;
        let digest = self.hasher.digest(&mut reader)?;
        debug!(%digest, "stored content digested");
        Ok(digest)
    }

    /// Recompute a version's digest and compare it to the ledger.
    pub fn verify_integrity(
        &self,
        document: &DocumentId,
        version: &VersionId,
    ) -> Result<ContentDigest> {
        let recorded = self.version(document, version)?.content_hash;
        let actual = self.digest(document, version)?;
        if actual != recorded {
            warn!(%document, %version, security = true, "stored bytes do not match ledger hash");
            return Err(VellumError::IntegrityMismatch {
                expected: recorded.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(actual)
    }
}
