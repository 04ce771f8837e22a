// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Key material — parses signer and verifier keys out of certificate records.
//
// Signatures are RSASSA-PKCS1-v1_5 with SHA-256 applied to the 32-byte content
// digest, so a signature commits to the digest rather than to the raw
// document bytes. Expiry and revocation are the caller's business; this
// module only parses and computes.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use vellum_core::error::VellumError;
use vellum_core::types::{Certificate, ContentDigest};

use crate::storage::EncryptedStorage;

/// Private half of a signer's key pair.
pub struct SigningKey {
    inner: RsaPrivateKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Generate a fresh RSA key pair.
    pub fn generate(bits: usize) -> Result<Self, VellumError> {
        let mut rng = rand::thread_rng();
        let inner = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| VellumError::Signing(format!("RSA-{bits} generation failed: {e}")))?;
        Ok(Self { inner })
    }

    /// Parse a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, VellumError> {
        let inner = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| VellumError::KeyUnavailable(format!("private key PEM: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_pkcs8_pem(&self) -> Result<String, VellumError> {
        let pem = self
            .inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| VellumError::Signing(format!("PKCS#8 export failed: {e}")))?;
        Ok(pem.to_string())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.to_public_key(),
        }
    }

    /// Sign a content digest.
    pub fn sign_digest(&self, digest: &ContentDigest) -> Result<Vec<u8>, VellumError> {
        let mut rng = rand::thread_rng();
        let hashed = Sha256::digest(digest.as_bytes());
        self.inner
            .sign_with_rng(&mut rng, Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| VellumError::Signing(format!("RSA signing failed: {e}")))
    }
}

/// Public half of a signer's key pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyingKey {
    inner: RsaPublicKey,
}

impl VerifyingKey {
    /// Parse an SPKI (`PUBLIC KEY`) or PKCS#1 (`RSA PUBLIC KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, VellumError> {
        let inner = RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
            .map_err(|e| VellumError::MalformedCertificate(format!("public key PEM: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_public_key_pem(&self) -> Result<String, VellumError> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| VellumError::MalformedCertificate(format!("SPKI export failed: {e}")))
    }

    /// `true` iff `signature` is a valid signature of `digest` under this key.
    pub fn verify_digest(&self, digest: &ContentDigest, signature: &[u8]) -> bool {
        let hashed = Sha256::digest(digest.as_bytes());
        self.inner
            .verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
            .is_ok()
    }
}

/// Loads keys from certificate records.
///
/// Holds the sealing secret needed to open stored private keys. No network
/// I/O happens here; every call is a pure transform over fetched bytes.
pub struct KeyMaterial {
    sealer: EncryptedStorage,
}

impl KeyMaterial {
    pub fn new(sealer: EncryptedStorage) -> Self {
        Self { sealer }
    }

    pub fn sealer(&self) -> &EncryptedStorage {
        &self.sealer
    }

    /// Unseal and parse the certificate's private key.
    ///
    /// Fails with `KeyUnavailable` if no key is stored, the key cannot be
    /// unsealed, or the unsealed bytes are not a usable RSA key.
    #[instrument(skip_all, fields(serial = %certificate.serial_number))]
    pub fn load_private_key(&self, certificate: &Certificate) -> Result<SigningKey, VellumError> {
        let sealed = certificate.sealed_private_key.as_deref().ok_or_else(|| {
            VellumError::KeyUnavailable(format!(
                "certificate {} has no stored private key",
                certificate.serial_number
            ))
        })?;

        let pem_bytes = self
            .sealer
            .decrypt(sealed)
            .map_err(|e| VellumError::KeyUnavailable(format!("unsealing failed: {e}")))?;
        let pem = std::str::from_utf8(&pem_bytes)
            .map_err(|_| VellumError::KeyUnavailable("unsealed key is not UTF-8 PEM".into()))?;

        let key = SigningKey::from_pem(pem)?;
        debug!("private key loaded");
        Ok(key)
    }

    /// Parse the certificate's public key. Fails with `MalformedCertificate`.
    #[instrument(skip_all, fields(serial = %certificate.serial_number))]
    pub fn load_public_key(&self, certificate: &Certificate) -> Result<VerifyingKey, VellumError> {
        VerifyingKey::from_pem(&certificate.public_key_pem)
    }

    /// Seal a signing key for storage on a certificate record.
    pub fn seal_private_key(&self, key: &SigningKey) -> Result<Vec<u8>, VellumError> {
        let pem = key.to_pkcs8_pem()?;
        self.sealer.encrypt(pem.as_bytes())
    }
}

/// Key generation dominates test time, so the crate's tests share keys.
#[cfg(test)]
pub(crate) fn test_key() -> &'static SigningKey {
    static KEY: std::sync::OnceLock<SigningKey> = std::sync::OnceLock::new();
    KEY.get_or_init(|| SigningKey::generate(2048).expect("generate test key"))
}

#[cfg(test)]
fn second_test_key() -> &'static SigningKey {
    static KEY: std::sync::OnceLock<SigningKey> = std::sync::OnceLock::new();
    KEY.get_or_init(|| SigningKey::generate(2048).expect("generate second test key"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use vellum_core::types::{CertificateId, UserId};

    fn digest(data: &[u8]) -> ContentDigest {
        ContentDigest(Sha256::digest(data).into())
    }

    fn certificate(public_key_pem: String, sealed: Option<Vec<u8>>) -> Certificate {
        let now = Utc::now();
        Certificate {
            id: CertificateId::new(),
            serial_number: "1001".into(),
            owner: UserId::new("alice"),
            subject_name: "Alice".into(),
            public_key_pem,
            sealed_private_key: sealed,
            issued_at: now,
            expires_at: now + Duration::days(365),
            is_revoked: false,
        }
    }

    #[test]
    fn sign_and_verify_digest() {
        let key = test_key();
        let d = digest(b"report.pdf bytes");

        let signature = key.sign_digest(&d).unwrap();
        assert!(key.verifying_key().verify_digest(&d, &signature));
    }

    #[test]
    fn tampering_breaks_verification() {
        let key = test_key();
        let d = digest(b"contract");
        let signature = key.sign_digest(&d).unwrap();
        let verifier = key.verifying_key();

        let mut flipped_sig = signature.clone();
        flipped_sig[10] ^= 0x80;
        assert!(!verifier.verify_digest(&d, &flipped_sig));

        let mut other = *d.as_bytes();
        other[0] ^= 0x01;
        assert!(!verifier.verify_digest(&ContentDigest(other), &signature));
    }

    #[test]
    fn other_key_does_not_verify() {
        let a = test_key();
        let b = second_test_key();
        let d = digest(b"memo");
        let signature = a.sign_digest(&d).unwrap();
        assert!(!b.verifying_key().verify_digest(&d, &signature));
    }

    #[test]
    fn load_keys_from_certificate() {
        let material = KeyMaterial::new(EncryptedStorage::generate_identity());
        let key = test_key();
        let sealed = material.seal_private_key(key).unwrap();
        let cert = certificate(key.verifying_key().to_public_key_pem().unwrap(), Some(sealed));

        let loaded = material.load_private_key(&cert).unwrap();
        let public = material.load_public_key(&cert).unwrap();
        assert_eq!(public, key.verifying_key());

        let d = digest(b"x");
        assert!(public.verify_digest(&d, &loaded.sign_digest(&d).unwrap()));
    }

    #[test]
    fn missing_private_key_is_unavailable() {
        let material = KeyMaterial::new(EncryptedStorage::generate_identity());
        let key = test_key();
        let cert = certificate(key.verifying_key().to_public_key_pem().unwrap(), None);

        assert!(matches!(
            material.load_private_key(&cert),
            Err(VellumError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn wrong_sealer_is_unavailable() {
        let sealing = KeyMaterial::new(EncryptedStorage::generate_identity());
        let other = KeyMaterial::new(EncryptedStorage::generate_identity());
        let key = test_key();
        let sealed = sealing.seal_private_key(key).unwrap();
        let cert = certificate(key.verifying_key().to_public_key_pem().unwrap(), Some(sealed));

        assert!(matches!(
            other.load_private_key(&cert),
            Err(VellumError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn garbage_public_key_is_malformed() {
        let material = KeyMaterial::new(EncryptedStorage::generate_identity());
        let cert = certificate("-----BEGIN PUBLIC KEY-----\nnope\n-----END PUBLIC KEY-----\n".into(), None);

        assert!(matches!(
            material.load_public_key(&cert),
            Err(VellumError::MalformedCertificate(_))
        ));
    }
}
