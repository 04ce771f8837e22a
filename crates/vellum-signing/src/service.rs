// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Signature service — signs exact document versions with the signer's active
// certificate and verifies every signature recorded against a version.
//
// A signature is RSASSA-PKCS1-v1_5 with SHA-256 over the version's 32-byte
// content digest. Signing only appends a record; documents and versions are
// never modified. Verification reports per-signature outcomes and only fails
// as a whole on infrastructure errors.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, error, info, instrument, warn};

use vellum_core::config::VellumConfig;
use vellum_core::error::{Result, VellumError};
use vellum_core::human_errors::is_security_relevant;
use vellum_core::types::{
    ContentDigest, DocumentId, SignatureCheck, SignatureId, SignatureRecord, UserId, VersionId,
};
use vellum_security::{AuditLog, HashEngine, KeyMaterial};
use vellum_store::{
    CertificateDirectory, MetadataStore, SignatureRepository, VersionRepository, VersionStore,
};

use crate::locks::DocumentLocks;
use crate::stamper::ProvenanceStamper;

/// Current time at the ledger's storage precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Orchestrates signing, verification, and signed stamping.
pub struct SignatureService {
    versions: Arc<VersionStore>,
    keys: KeyMaterial,
    stamper: ProvenanceStamper,
    locks: Arc<DocumentLocks>,
    hasher: HashEngine,
    audit: Option<Arc<Mutex<AuditLog>>>,
    audit_enabled: bool,
}

impl SignatureService {
    /// Build a service with default stamps that digests with the store's
    /// hash engine.
    pub fn new(versions: Arc<VersionStore>, keys: KeyMaterial) -> Self {
        let hasher = *versions.hasher();
        let mut service = Self::with_config(versions, keys, &VellumConfig::default());
        service.hasher = hasher;
        service
    }

    /// Build a service from `config`: stamp style, digest chunk size, and
    /// whether an attached audit log is written.
    pub fn with_config(versions: Arc<VersionStore>, keys: KeyMaterial, config: &VellumConfig) -> Self {
        let locks = Arc::new(DocumentLocks::new());
        let stamper = ProvenanceStamper::new(Arc::clone(&versions))
            .with_style(config.stamp.clone())
            .with_locks(Arc::clone(&locks));
        Self {
            versions,
            keys,
            stamper,
            locks,
            hasher: HashEngine::new(config.hash_chunk_size),
            audit: None,
            audit_enabled: config.audit_enabled,
        }
    }

    /// Record sign, verify, and stamp outcomes in `audit`.
    pub fn with_audit(mut self, audit: Arc<Mutex<AuditLog>>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    pub fn stamper(&self) -> &ProvenanceStamper {
        &self.stamper
    }

    pub fn hasher(&self) -> &HashEngine {
        &self.hasher
    }

    fn metadata(&self) -> &dyn MetadataStore {
        self.versions.metadata().as_ref()
    }

    // -- Signing --------------------------------------------------------------

    /// Sign the exact bytes of `version` as `signer`.
    ///
    /// Fails with `NoActiveCertificate` before touching content if the signer
    /// has no valid, unrevoked certificate. Stored bytes that no longer match
    /// the ledger hash are refused with `IntegrityMismatch`.
    #[instrument(skip(self, note), fields(%document, %version, %signer))]
    pub fn sign(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &UserId,
        note: Option<&str>,
    ) -> Result<SignatureRecord> {
        match self.sign_version(document, version, signer, note) {
            Ok(record) => {
                self.audit(signer, "sign", &record.content_hash.to_hex(), true, None);
                info!(signature_id = %record.id, "version signed");
                Ok(record)
            }
            Err(err) => {
                if is_security_relevant(&err) {
                    warn!(error = %err, security = true, "signing refused");
                } else {
                    debug!(error = %err, "signing failed");
                }
                let hash = self
                    .metadata()
                    .version(document, version)
                    .ok()
                    .flatten()
                    .map(|v| v.content_hash.to_hex())
                    .unwrap_or_default();
                let details = format!("{document}/{version}: {err}");
                self.audit(signer, "sign_rejected", &hash, false, Some(&details));
                Err(err)
            }
        }
    }

    fn sign_version(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &UserId,
        note: Option<&str>,
    ) -> Result<SignatureRecord> {
        let signed_at = now();
        let certificate = self
            .metadata()
            .active_certificate(signer, signed_at)?
            .ok_or_else(|| VellumError::NoActiveCertificate(signer.to_string()))?;

        let recorded = self.versions.version(document, version)?;
        let digest = self.digest(document, version)?;
        if digest != recorded.content_hash {
            return Err(VellumError::IntegrityMismatch {
                expected: recorded.content_hash.to_hex(),
                actual: digest.to_hex(),
            });
        }

        let key = self.keys.load_private_key(&certificate)?;
        let signature = key.sign_digest(&digest)?;

        let record = SignatureRecord {
            id: SignatureId::new(),
            document_id: *document,
            version_id: version.clone(),
            certificate_id: Some(certificate.id),
            signer: signer.clone(),
            signer_name: certificate.subject_name.clone(),
            signature,
            content_hash: digest,
            signed_at,
            note: note.map(str::to_owned),
        };
        self.metadata().insert_signature(&record)?;
        Ok(record)
    }

    /// The signer's earliest signature on `version`, if any. Lets callers
    /// retry a `sign` without creating duplicates.
    pub fn existing_signature(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &UserId,
    ) -> Result<Option<SignatureRecord>> {
        self.metadata().signature_by(document, version, signer)
    }

    // -- Verification ---------------------------------------------------------

    /// Check every signature recorded against `version`.
    ///
    /// Results are ordered by signing time. A signature whose certificate is
    /// gone, whose key cannot be parsed, or whose bytes do not verify is
    /// reported with `verified: false`.
    #[instrument(skip(self), fields(%document, %version))]
    pub fn verify_all(
        &self,
        document: &DocumentId,
        version: &VersionId,
    ) -> Result<Vec<SignatureCheck>> {
        let digest = self.digest(document, version)?;
        let records = self.metadata().signatures_for(document, version)?;

        let mut checks = Vec::with_capacity(records.len());
        for record in records {
            let verified = self.check(&record, &digest)?;
            checks.push(SignatureCheck {
                signature_id: record.id,
                signer: record.signer_name,
                signed_at: record.signed_at,
                verified,
            });
        }

        let passed = checks.iter().filter(|c| c.verified).count();
        info!(total = checks.len(), passed, "signatures verified");
        self.audit(
            &UserId::new("system"),
            "verify",
            &digest.to_hex(),
            passed == checks.len(),
            Some(&format!("{passed} of {} verified", checks.len())),
        );
        Ok(checks)
    }

    fn digest(&self, document: &DocumentId, version: &VersionId) -> Result<ContentDigest> {
        let mut reader = self.versions.open(document, version)?;
        self.hasher.digest(&mut reader)
    }

    fn check(&self, record: &SignatureRecord, digest: &ContentDigest) -> Result<bool> {
        let Some(certificate_id) = record.certificate_id else {
            debug!(signature_id = %record.id, "certificate deleted");
            return Ok(false);
        };
        let Some(certificate) = self.metadata().certificate(&certificate_id)? else {
            debug!(signature_id = %record.id, %certificate_id, "certificate missing");
            return Ok(false);
        };
        let key = match self.keys.load_public_key(&certificate) {
            Ok(key) => key,
            Err(err) => {
                warn!(signature_id = %record.id, error = %err, security = true, "unusable certificate");
                return Ok(false);
            }
        };
        if record.content_hash != *digest {
            debug!(signature_id = %record.id, "signed digest differs from stored content");
            return Ok(false);
        }
        Ok(key.verify_digest(digest, &record.signature))
    }

    // -- Signed stamping ------------------------------------------------------

    /// Sign `version`, then stamp the signer's name and signing time onto it
    /// as a new version. Both steps run under the document's lock.
    ///
    /// Returns the signature over `version` and the id of the stamped
    /// version.
    pub fn sign_and_stamp(
        &self,
        document: &DocumentId,
        version: &VersionId,
        signer: &UserId,
        note: Option<&str>,
    ) -> Result<(SignatureRecord, VersionId)> {
        let _guard = self.locks.lock(document)?;

        let record = self.sign(document, version, signer, note)?;
        let stamped = self
            .stamper
            .stamp_unlocked(document, version, &record.signer_name, record.signed_at);

        match stamped {
            Ok(new_version) => {
                self.audit(
                    signer,
                    "stamp",
                    &record.content_hash.to_hex(),
                    true,
                    Some(&format!("{version} -> {new_version}")),
                );
                Ok((record, new_version))
            }
            Err(err) => {
                self.audit(signer, "stamp", &record.content_hash.to_hex(), false, Some(&err.to_string()));
                Err(err)
            }
        }
    }

    // -- Audit ----------------------------------------------------------------

    fn audit(&self, user: &UserId, action: &str, document_hash: &str, success: bool, details: Option<&str>) {
        let Some(audit) = self.audit.as_ref().filter(|_| self.audit_enabled) else {
            return;
        };
        let result = match audit.lock() {
            Ok(log) => log.record(user.as_str(), action, document_hash, success, details),
            Err(_) => Err(VellumError::Database("audit log lock poisoned".into())),
        };
        if let Err(e) = result {
            error!(error = %e, action, "failed to record audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vellum_core::types::Certificate;
    use vellum_security::{CertificateRequest, EncryptedStorage, SigningKey, enroll_with_key};
    use vellum_store::{MemoryObjectStore, SqliteLedger};

    struct Fixture {
        objects: Arc<MemoryObjectStore>,
        ledger: Arc<SqliteLedger>,
        service: SignatureService,
        audit: Arc<Mutex<AuditLog>>,
    }

    fn fixture() -> Fixture {
        let objects = Arc::new(MemoryObjectStore::new());
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let versions = Arc::new(VersionStore::new(objects.clone(), ledger.clone()));
        let audit = Arc::new(Mutex::new(AuditLog::open_in_memory().unwrap()));
        let keys = KeyMaterial::new(EncryptedStorage::generate_identity());
        let service = SignatureService::new(versions, keys).with_audit(audit.clone());
        Fixture {
            objects,
            ledger,
            service,
            audit,
        }
    }

    /// One RSA key shared by every test certificate; generation is slow.
    fn test_key() -> &'static SigningKey {
        static KEY: std::sync::OnceLock<SigningKey> = std::sync::OnceLock::new();
        KEY.get_or_init(|| SigningKey::generate(2048).unwrap())
    }

    fn enroll_user(f: &Fixture, user: &str, serial: &str, valid_for: Duration) -> Certificate {
        let request = CertificateRequest::new(UserId::new(user), format!("{user} (signer)"), serial)
            .valid_for(valid_for);
        let cert = enroll_with_key(request, test_key(), &f.service.keys, now() - Duration::minutes(1)).unwrap();
        f.ledger.insert_certificate(&cert).unwrap();
        cert
    }

    fn upload(f: &Fixture, bytes: &[u8]) -> (DocumentId, VersionId) {
        let (doc, v1) = f
            .service
            .versions()
            .upload(&UserId::new("owner"), "report.txt", "text/plain", bytes, None)
            .unwrap();
        (doc.id, v1.version_id)
    }

    #[test]
    fn sign_then_verify() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(30));
        let (doc, v1) = upload(&f, b"quarterly numbers");

        let record = f.service.sign(&doc, &v1, &UserId::new("alice"), Some("looks good")).unwrap();
        assert_eq!(record.signature.len(), 256);
        assert_eq!(record.signer_name, "alice (signer)");

        let checks = f.service.verify_all(&doc, &v1).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks[0].verified);
        assert_eq!(checks[0].signature_id, record.id);
    }

    #[test]
    fn zero_signatures_verify_to_empty() {
        let f = fixture();
        let (doc, v1) = upload(&f, b"unsigned");
        assert!(f.service.verify_all(&doc, &v1).unwrap().is_empty());
    }

    #[test]
    fn no_certificate_is_rejected_before_content_lookup() {
        let f = fixture();
        let result = f
            .service
            .sign(&DocumentId::new(), &VersionId::new("1"), &UserId::new("mallory"), None);
        assert!(matches!(result, Err(VellumError::NoActiveCertificate(_))));
    }

    #[test]
    fn expired_certificate_creates_no_record() {
        let f = fixture();
        // Issued a minute ago, valid for one second.
        enroll_user(&f, "alice", "01", Duration::seconds(1));
        let (doc, v1) = upload(&f, b"late");

        let result = f.service.sign(&doc, &v1, &UserId::new("alice"), None);
        assert!(matches!(result, Err(VellumError::NoActiveCertificate(_))));
        assert_eq!(f.ledger.count_signatures(&doc, &v1).unwrap(), 0);
    }

    #[test]
    fn missing_version_is_content_not_found() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, _) = upload(&f, b"x");
        let result = f.service.sign(&doc, &VersionId::new("404"), &UserId::new("alice"), None);
        assert!(matches!(result, Err(VellumError::ContentNotFound { .. })));
    }

    #[test]
    fn tampered_content_is_not_signed() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"original terms");
        let key = f.service.versions().document(&doc).unwrap().storage_key;
        f.objects.tamper(&key, &v1, b"forged terms").unwrap();

        let result = f.service.sign(&doc, &v1, &UserId::new("alice"), None);
        assert!(matches!(result, Err(VellumError::IntegrityMismatch { .. })));
        assert_eq!(f.ledger.count_signatures(&doc, &v1).unwrap(), 0);
    }

    #[test]
    fn missing_private_key_is_key_unavailable() {
        let f = fixture();
        let mut cert = enroll_user(&f, "alice", "01", Duration::days(1));
        f.ledger.delete_certificate(&cert.id).unwrap();
        cert.id = vellum_core::types::CertificateId::new();
        cert.serial_number = "02".into();
        cert.sealed_private_key = None;
        f.ledger.insert_certificate(&cert).unwrap();
        let (doc, v1) = upload(&f, b"x");

        let result = f.service.sign(&doc, &v1, &UserId::new("alice"), None);
        assert!(matches!(result, Err(VellumError::KeyUnavailable(_))));
    }

    #[test]
    fn tampered_content_fails_verification_per_signature() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"signed terms");
        f.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

        let key = f.service.versions().document(&doc).unwrap().storage_key;
        f.objects.tamper(&key, &v1, b"changed terms").unwrap();

        let checks = f.service.verify_all(&doc, &v1).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].verified);
    }

    #[test]
    fn deleted_certificate_reports_unverified() {
        let f = fixture();
        let cert = enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"x");
        f.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

        f.ledger.delete_certificate(&cert.id).unwrap();
        let checks = f.service.verify_all(&doc, &v1).unwrap();
        assert_eq!(checks.len(), 1);
        assert!(!checks[0].verified);
    }

    #[test]
    fn corrupted_signature_bytes_fail() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"x");
        let mut record = f.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

        record.id = SignatureId::new();
        record.signature[0] ^= 0x01;
        f.ledger.insert_signature(&record).unwrap();

        let checks = f.service.verify_all(&doc, &v1).unwrap();
        let verdicts: Vec<bool> = checks.iter().map(|c| c.verified).collect();
        assert_eq!(verdicts.iter().filter(|v| **v).count(), 1);
        assert_eq!(verdicts.len(), 2);
    }

    #[test]
    fn unparsable_public_key_reports_unverified() {
        let f = fixture();
        let cert = enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"x");
        let good = f.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

        let broken = Certificate {
            id: vellum_core::types::CertificateId::new(),
            serial_number: "02".into(),
            public_key_pem: "garbage".into(),
            ..cert
        };
        f.ledger.insert_certificate(&broken).unwrap();
        let orphan = SignatureRecord {
            id: SignatureId::new(),
            certificate_id: Some(broken.id),
            ..good.clone()
        };
        f.ledger.insert_signature(&orphan).unwrap();

        let checks = f.service.verify_all(&doc, &v1).unwrap();
        let verdicts: Vec<(SignatureId, bool)> =
            checks.iter().map(|c| (c.signature_id, c.verified)).collect();
        assert_eq!(verdicts, vec![(good.id, true), (orphan.id, false)]);
    }

    #[test]
    fn config_sets_chunk_size_and_can_silence_audit() {
        let objects = Arc::new(MemoryObjectStore::new());
        let ledger = Arc::new(SqliteLedger::open_in_memory().unwrap());
        let versions = Arc::new(VersionStore::new(objects, ledger.clone()));
        let audit = Arc::new(Mutex::new(AuditLog::open_in_memory().unwrap()));
        let config = VellumConfig {
            hash_chunk_size: 7,
            audit_enabled: false,
            ..VellumConfig::default()
        };
        let keys = KeyMaterial::new(EncryptedStorage::generate_identity());
        let service = SignatureService::with_config(versions, keys, &config).with_audit(audit.clone());
        assert_eq!(service.hasher().chunk_size(), 7);

        let request = CertificateRequest::new(UserId::new("alice"), "Alice", "01");
        let cert = enroll_with_key(request, test_key(), &service.keys, now() - Duration::minutes(1)).unwrap();
        ledger.insert_certificate(&cert).unwrap();
        let (doc, v1) = service
            .versions()
            .upload(&UserId::new("owner"), "memo.txt", "text/plain", b"several chunks of text", None)
            .unwrap();
        let v1 = v1.version_id;

        service.sign(&doc.id, &v1, &UserId::new("alice"), None).unwrap();
        assert!(service.verify_all(&doc.id, &v1).unwrap()[0].verified);
        assert_eq!(audit.lock().unwrap().count().unwrap(), 0);
    }

    #[test]
    fn existing_signature_finds_prior_sign() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"x");
        let alice = UserId::new("alice");
        assert!(f.service.existing_signature(&doc, &v1, &alice).unwrap().is_none());

        let record = f.service.sign(&doc, &v1, &alice, None).unwrap();
        assert_eq!(
            f.service.existing_signature(&doc, &v1, &alice).unwrap().map(|r| r.id),
            Some(record.id)
        );
    }

    #[test]
    fn audit_trail_records_outcomes() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"x");
        f.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();
        f.service.sign(&doc, &v1, &UserId::new("bob"), None).unwrap_err();
        f.service.verify_all(&doc, &v1).unwrap();

        let log = f.audit.lock().unwrap();
        let actions: Vec<String> = log
            .recent_entries(10)
            .unwrap()
            .into_iter()
            .rev()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["sign", "sign_rejected", "verify"]);
        assert!(!log.entries_for_user("bob").unwrap()[0].success);
    }

    #[test]
    fn sign_and_stamp_rejects_non_pdf_after_signing() {
        let f = fixture();
        enroll_user(&f, "alice", "01", Duration::days(1));
        let (doc, v1) = upload(&f, b"plain text cannot be stamped");

        let result = f.service.sign_and_stamp(&doc, &v1, &UserId::new("alice"), None);
        assert!(matches!(result, Err(VellumError::UnsupportedFormat(_))));
        // The signature over the source version stands on its own.
        assert_eq!(f.ledger.count_signatures(&doc, &v1).unwrap(), 1);
        assert!(!f.service.locks.is_locked(&doc));
    }
}
