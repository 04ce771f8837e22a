// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key enrollment — provisions an RSA key pair for a user and packages it as a
// certificate record.
//
// # Design note
//
// This is key-pair provisioning, not a certificate authority. No X.509
// structure is produced and nothing is chained to a trust anchor. The record
// carries the SPKI public key PEM and the age-sealed PKCS#8 private key, which
// is exactly what `KeyMaterial` consumes at signing and verification time.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};
use vellum_core::config::VellumConfig;
use vellum_core::error::VellumError;
use vellum_core::types::{Certificate, CertificateId, UserId};

use crate::keys::{KeyMaterial, SigningKey};

/// Parameters for a new signing certificate.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub owner: UserId,
    pub subject_name: String,
    pub serial_number: String,
    /// Length of the validity window starting at enrollment time.
    pub valid_for: Duration,
}

impl CertificateRequest {
    pub fn new(owner: UserId, subject_name: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            owner,
            subject_name: subject_name.into(),
            serial_number: serial_number.into(),
            valid_for: Duration::days(365),
        }
    }

    pub fn valid_for(mut self, valid_for: Duration) -> Self {
        self.valid_for = valid_for;
        self
    }
}

/// Generate a `config.rsa_key_bits` key pair and build a certificate record
/// valid from `now`.
#[instrument(
    skip(config, material, request),
    fields(owner = %request.owner, serial = %request.serial_number, bits = config.rsa_key_bits)
)]
pub fn enroll(
    request: CertificateRequest,
    config: &VellumConfig,
    material: &KeyMaterial,
    now: DateTime<Utc>,
) -> Result<Certificate, VellumError> {
    config.validate()?;
    let key = SigningKey::generate(config.rsa_key_bits)?;
    enroll_with_key(request, &key, material, now)
}

/// Build a certificate record around an existing key.
pub fn enroll_with_key(
    request: CertificateRequest,
    key: &SigningKey,
    material: &KeyMaterial,
    now: DateTime<Utc>,
) -> Result<Certificate, VellumError> {
    if request.valid_for <= Duration::zero() {
        return Err(VellumError::Config(format!(
            "certificate {} must have a positive validity window",
            request.serial_number
        )));
    }

    let public_key_pem = key.verifying_key().to_public_key_pem()?;
    let sealed_private_key = material.seal_private_key(key)?;

    info!(expires_in_days = request.valid_for.num_days(), "certificate enrolled");

    Ok(Certificate {
        id: CertificateId::new(),
        serial_number: request.serial_number,
        owner: request.owner,
        subject_name: request.subject_name,
        public_key_pem,
        sealed_private_key: Some(sealed_private_key),
        issued_at: now,
        expires_at: now + request.valid_for,
        is_revoked: false,
    })
}
