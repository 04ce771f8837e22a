// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Vellum.

use thiserror::Error;

/// Top-level error type for all Vellum operations.
#[derive(Debug, Error)]
pub enum VellumError {
    // -- Content / versions --
    #[error("content not found: {key} (version {})", .version.as_deref().unwrap_or("latest"))]
    ContentNotFound { key: String, version: Option<String> },

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("version {version} of document {document} is referenced by {signatures} signature(s)")]
    VersionReferenced {
        document: String,
        version: String,
        signatures: usize,
    },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Certificates / keys --
    #[error("no active certificate for user {0}")]
    NoActiveCertificate(String),

    #[error("private key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    // -- Stamping --
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("stamp rendering failed: {0}")]
    RenderError(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl VellumError {
    /// Shorthand for an object-store miss.
    pub fn content_not_found(key: impl Into<String>, version: Option<&str>) -> Self {
        Self::ContentNotFound {
            key: key.into(),
            version: version.map(str::to_owned),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VellumError>;
