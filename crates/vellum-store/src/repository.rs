// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed metadata repositories. Lookups return `Ok(None)` for absent rows;
// `Err` is reserved for infrastructure failures.

use chrono::{DateTime, Utc};
use vellum_core::error::Result;
use vellum_core::types::{
    Certificate, CertificateId, Document, DocumentId, DocumentStatus, DocumentVersion,
    SignatureRecord, UserId, VersionId,
};

/// Document rows.
pub trait DocumentRepository: Send + Sync {
    fn insert_document(&self, document: &Document) -> Result<()>;

    fn document(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// Returns `false` if the document does not exist.
    fn set_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<bool>;

    /// Soft delete. Returns `false` if the document does not exist.
    fn retire(&self, id: &DocumentId, at: DateTime<Utc>) -> Result<bool>;

    /// Remove a document that never received a version. Returns `false` if
    /// the row is absent or already has versions.
    fn discard_document(&self, id: &DocumentId) -> Result<bool>;
}

/// The append-only version ledger.
pub trait VersionRepository: Send + Sync {
    /// Append `version` and make it the document's current version in one
    /// step. `seq` is assigned by the ledger; the incoming value is ignored.
    fn append_version(&self, version: &DocumentVersion) -> Result<DocumentVersion>;

    fn version(&self, document: &DocumentId, version: &VersionId)
    -> Result<Option<DocumentVersion>>;

    /// All versions of a document, oldest first.
    fn versions(&self, document: &DocumentId) -> Result<Vec<DocumentVersion>>;

    /// Record that a version's bytes were physically removed.
    fn mark_purged(
        &self,
        document: &DocumentId,
        version: &VersionId,
        at: DateTime<Utc>,
    ) -> Result<bool>;
}

/// Certificates per user.
pub trait CertificateDirectory: Send + Sync {
    fn insert_certificate(&self, certificate: &Certificate) -> Result<()>;

    fn certificate(&self, id: &CertificateId) -> Result<Option<Certificate>>;

    /// The most recently issued certificate of `user` that is within its
    /// validity window at `at` and not revoked.
    fn active_certificate(&self, user: &UserId, at: DateTime<Utc>)
    -> Result<Option<Certificate>>;

    /// Every certificate of `user`, most recently issued first.
    fn certificates_for(&self, user: &UserId) -> Result<Vec<Certificate>>;

    fn revoke(&self, id: &CertificateId) -> Result<bool>;

    /// Physically remove a certificate. Signatures that referenced it keep
    /// existing with no certificate.
    fn delete_certificate(&self, id: &CertificateId) -> Result<bool>;
}

/// Signature records.
pub trait SignatureRepository: Send + Sync {
    fn insert_signature(&self, record: &SignatureRecord) -> Result<()>;

    /// Signatures over one version, by `signed_at` then insertion order.
    fn signatures_for(
        &self,
        document: &DocumentId,
        version: &VersionId,
    ) -> Result<Vec<SignatureRecord>>;

    /// Earliest signature by `signer` over one version.
    fn signature_by(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &UserId,
    ) -> Result<Option<SignatureRecord>>;

    fn count_signatures(&self, document: &DocumentId, version: &VersionId) -> Result<usize>;
}

/// Everything the signing core needs from relational storage.
pub trait MetadataStore:
    DocumentRepository + VersionRepository + CertificateDirectory + SignatureRepository
{
}

impl<T> MetadataStore for T where
    T: DocumentRepository + VersionRepository + CertificateDirectory + SignatureRepository
{
}
