// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for documents, versions, certificates, and signatures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VellumError};

/// Size of a SHA-256 content digest in bytes.
pub const DIGEST_LEN: usize = 32;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse the hyphenated string form stored in the ledger.
            pub fn parse(s: &str) -> Result<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| VellumError::Database(format!("invalid {}: {e}", stringify!($name))))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a document.
    DocumentId
);
uuid_id!(
    /// Unique identifier for a certificate row.
    CertificateId
);
uuid_id!(
    /// Unique identifier for a signature record.
    SignatureId
);

/// Opaque user identity as known to the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage-assigned version identifier. Totally ordered per document by the
/// ledger sequence, not by string comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 digest of a document's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(pub [u8; DIGEST_LEN]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex encoding, as stored in the ledger and audit log.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| VellumError::Database(format!("invalid digest hex: {e}")))?;
        let arr: [u8; DIGEST_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            VellumError::Database(format!(
                "invalid digest length: expected {DIGEST_LEN}, got {}",
                b.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Review status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    New,
    InProgress,
    Approved,
    Rejected,
}

impl DocumentStatus {
    /// Keyword stored in the ledger.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "in_progress" => Some(Self::InProgress),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A stored document. Its bytes live in the object store under `storage_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Object-store key shared by every version of this document.
    pub storage_key: String,
    pub original_filename: String,
    pub content_type: String,
    pub owner: UserId,
    pub status: DocumentStatus,
    /// Latest version; `None` only between creation and the first upload.
    pub current_version: Option<VersionId>,
    pub created_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(
        owner: UserId,
        original_filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let id = DocumentId::new();
        Self {
            id,
            storage_key: format!("documents/{id}"),
            original_filename: original_filename.into(),
            content_type: content_type.into(),
            owner,
            status: DocumentStatus::New,
            current_version: None,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Immutable snapshot of a document's bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub document_id: DocumentId,
    pub version_id: VersionId,
    /// Ledger-assigned sequence; strictly increasing across all appends.
    pub seq: i64,
    pub content_hash: ContentDigest,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
    /// Set when the bytes were physically removed from the object store.
    pub purged_at: Option<DateTime<Utc>>,
}

/// A signing certificate owned by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    pub serial_number: String,
    pub owner: UserId,
    /// Display identity reported by verification.
    pub subject_name: String,
    /// SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub public_key_pem: String,
    /// age-encrypted PKCS#8 PEM private key; never stored in plaintext.
    pub sealed_private_key: Option<Vec<u8>>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
}

impl Certificate {
    /// `issued_at <= at < expires_at` and not revoked.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        !self.is_revoked && self.issued_at <= at && at < self.expires_at
    }

    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.expires_at
    }
}

/// A signature over the exact bytes of one document version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: SignatureId,
    pub document_id: DocumentId,
    pub version_id: VersionId,
    /// `None` once the certificate row has been deleted.
    pub certificate_id: Option<CertificateId>,
    pub signer: UserId,
    /// Signer display name captured at signing time.
    pub signer_name: String,
    pub signature: Vec<u8>,
    /// Digest the signature was computed over.
    pub content_hash: ContentDigest,
    pub signed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// Per-signature verification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureCheck {
    pub signature_id: SignatureId,
    pub signer: String,
    pub signed_at: DateTime<Utc>,
    pub verified: bool,
}
