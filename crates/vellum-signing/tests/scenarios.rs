// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end signing scenarios over file-backed stores.

use std::sync::{Arc, Mutex, OnceLock};

use chrono::{Duration, TimeZone, Utc};
use lopdf::content::{Content, Operation};
use lopdf::{Document as PdfDocument, Object, Stream, dictionary};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use vellum_core::config::VellumConfig;
use vellum_core::error::VellumError;
use vellum_core::types::{Certificate, DocumentId, UserId, VersionId};
use vellum_document::PdfReader;
use vellum_security::{
    AuditLog, CertificateRequest, EncryptedStorage, KeyMaterial, SigningKey,
    enroll_with_key,
};
use vellum_signing::SignatureService;
use vellum_store::{
    CertificateDirectory, FsObjectStore, SqliteLedger, VersionStore,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Key generation dominates test time; every enrolled user shares one key.
fn shared_key() -> &'static SigningKey {
    static KEY: OnceLock<SigningKey> = OnceLock::new();
    KEY.get_or_init(|| SigningKey::generate(2048).expect("generate test key"))
}

/// A two-page PDF with a title on each page.
fn report_pdf() -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
    });

    let mut kids = Vec::new();
    for title in ["Quarterly report", "Appendix"] {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 18.into()]),
                Operation::new("Td", vec![72.into(), 760.into()]),
                Operation::new("Tj", vec![Object::string_literal(title)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 2,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

struct Harness {
    _dir: TempDir,
    ledger: Arc<SqliteLedger>,
    versions: Arc<VersionStore>,
    keys: KeyMaterial,
    service: SignatureService,
    audit: Arc<Mutex<AuditLog>>,
}

impl Harness {
    fn new(config: &VellumConfig) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let objects = Arc::new(FsObjectStore::open(dir.path().join("objects")).unwrap());
        let ledger = Arc::new(SqliteLedger::open(dir.path().join("ledger.db")).unwrap());
        let audit = Arc::new(Mutex::new(AuditLog::open(dir.path().join("audit.db")).unwrap()));
        let versions = Arc::new(VersionStore::with_config(objects, ledger.clone(), config));

        let sealer = EncryptedStorage::generate_identity();
        let identity = sealer.identity_string().unwrap();
        let service = SignatureService::with_config(versions.clone(), KeyMaterial::new(sealer), config)
            .with_audit(audit.clone());
        let keys = KeyMaterial::new(EncryptedStorage::from_identity_str(&identity).unwrap());

        Self {
            _dir: dir,
            ledger,
            versions,
            keys,
            service,
            audit,
        }
    }

    fn enroll(&self, user: &str, display: &str, serial: &str) -> Certificate {
        let request = CertificateRequest::new(UserId::new(user), display, serial);
        let issued = Utc::now() - Duration::minutes(5);
        let cert = enroll_with_key(request, shared_key(), &self.keys, issued).unwrap();
        self.ledger.insert_certificate(&cert).unwrap();
        cert
    }

    fn upload_report(&self) -> (DocumentId, VersionId) {
        let (doc, v1) = self
            .versions
            .upload(&UserId::new("owner"), "report.pdf", "application/pdf", &report_pdf(), None)
            .unwrap();
        (doc.id, v1.version_id)
    }
}

#[test]
fn sign_verify_and_revoke() {
    let h = Harness::new(&VellumConfig::default());
    let alice = UserId::new("alice");
    let cert = h.enroll("alice", "Alice", "A-001");
    let (doc, v1) = h.upload_report();
    let h1 = h.versions.version(&doc, &v1).unwrap().content_hash;

    let record = h.service.sign(&doc, &v1, &alice, None).unwrap();
    assert_eq!(record.content_hash, h1);

    let before = h.service.verify_all(&doc, &v1).unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].signer, "Alice");
    assert!(before[0].verified);

    h.ledger.revoke(&cert.id).unwrap();
    let again = h.service.sign(&doc, &v1, &alice, None);
    assert!(matches!(again, Err(VellumError::NoActiveCertificate(_))));

    // Revocation is not retroactive.
    let after = h.service.verify_all(&doc, &v1).unwrap();
    assert_eq!(after, before);
}

#[test]
fn stamping_creates_an_unsigned_version() {
    let h = Harness::new(&VellumConfig::default());
    h.enroll("alice", "Alice", "A-001");
    let (doc, v1) = h.upload_report();
    h.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

    let v1_bytes = h.versions.fetch(&doc, &v1).unwrap();
    let v1_checks = h.service.verify_all(&doc, &v1).unwrap();

    let t = Utc.with_ymd_and_hms(2026, 5, 4, 10, 15, 0).unwrap();
    let v2 = h.service.stamper().stamp(&doc, &v1, "Alice", t).unwrap();

    let h1 = h.versions.version(&doc, &v1).unwrap().content_hash;
    let h2 = h.versions.version(&doc, &v2).unwrap().content_hash;
    assert_ne!(h1, h2);

    assert!(h.service.verify_all(&doc, &v2).unwrap().is_empty());
    assert_eq!(h.service.verify_all(&doc, &v1).unwrap(), v1_checks);
    assert_eq!(h.versions.fetch(&doc, &v1).unwrap(), v1_bytes);

    let stamped = PdfReader::from_bytes(&h.versions.fetch(&doc, &v2).unwrap()).unwrap();
    assert_eq!(stamped.page_count(), 2);
    let last = stamped.page_content(2).unwrap();
    let needle = b"Signed: Alice 2026-05-04 10:15:00 UTC";
    assert!(last.windows(needle.len()).any(|w| w == needle));
    assert!(!stamped.page_content(1).unwrap().windows(needle.len()).any(|w| w == needle));
}

#[test]
fn sign_and_stamp_records_both_and_audits() {
    let mut config = VellumConfig::default();
    config.stamp.label = "Approved".into();
    let h = Harness::new(&config);
    h.enroll("bob", "Bob Builder", "B-001");
    let (doc, v1) = h.upload_report();

    let (record, v2) = h
        .service
        .sign_and_stamp(&doc, &v1, &UserId::new("bob"), Some("final"))
        .unwrap();

    assert_eq!(record.version_id, v1);
    assert_eq!(
        h.versions.document(&doc).unwrap().current_version,
        Some(v2.clone())
    );
    let content = PdfReader::from_bytes(&h.versions.fetch(&doc, &v2).unwrap())
        .unwrap()
        .page_content(2)
        .unwrap();
    assert!(content.windows(21).any(|w| w == b"Approved: Bob Builder"));

    let log = h.audit.lock().unwrap();
    let mine: Vec<String> = log
        .entries_for_user("bob")
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(mine, vec!["sign", "stamp"]);
    assert_eq!(log.entries_for_hash(&record.content_hash.to_hex()).unwrap().len(), 2);
}

#[test]
fn signatures_from_several_signers_keep_order() {
    let h = Harness::new(&VellumConfig::default());
    h.enroll("alice", "Alice", "A-001");
    h.enroll("bob", "Bob", "B-001");
    let (doc, v1) = h.upload_report();

    h.service.sign(&doc, &v1, &UserId::new("bob"), None).unwrap();
    h.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

    let signers: Vec<String> = h
        .service
        .verify_all(&doc, &v1)
        .unwrap()
        .into_iter()
        .map(|c| c.signer)
        .collect();
    assert_eq!(signers, vec!["Bob", "Alice"]);
}

#[test]
fn signed_versions_cannot_be_purged() {
    let h = Harness::new(&VellumConfig::default());
    h.enroll("alice", "Alice", "A-001");
    let (doc, v1) = h.upload_report();
    h.service.sign(&doc, &v1, &UserId::new("alice"), None).unwrap();

    let result = h.versions.purge_version(&doc, &v1);
    assert!(matches!(result, Err(VellumError::VersionReferenced { .. })));
    assert!(h.service.verify_all(&doc, &v1).unwrap()[0].verified);
}

#[test]
fn text_uploads_can_be_converted_then_stamped() {
    let h = Harness::new(&VellumConfig::default());
    let notes = b"Meeting notes\nAction items follow.";
    let pdf = vellum_document::PdfWriter::a4()
        .ensure_pdf(notes, "text/plain")
        .unwrap();
    let (doc, v1) = h
        .versions
        .upload(&UserId::new("owner"), "notes.pdf", "application/pdf", &pdf, Some("from notes.txt"))
        .unwrap();

    let v2 = h
        .service
        .stamper()
        .stamp(&doc.id, &v1.version_id, "Carol", Utc::now())
        .unwrap();
    assert_eq!(h.versions.history(&doc.id).unwrap().len(), 2);
    assert_eq!(
        h.versions.document(&doc.id).unwrap().current_version,
        Some(v2)
    );
}
