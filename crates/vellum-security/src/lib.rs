// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// vellum-security — cryptographic foundation for document signing.
//
// Content digests, RSA key material parsed from certificate records, sealed
// private-key storage, key enrollment, and the append-only audit trail.

pub mod audit;
pub mod certificates;
pub mod integrity;
pub mod keys;
pub mod storage;

pub use audit::{AuditEntry, AuditLog};
pub use certificates::{CertificateRequest, enroll, enroll_with_key};
pub use integrity::HashEngine;
pub use keys::{KeyMaterial, SigningKey, VerifyingKey};
pub use storage::EncryptedStorage;
