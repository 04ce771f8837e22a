// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sealed storage — age encryption for private key material at rest.
//
// Two sealing modes are supported:
//   * passphrase (`age::scrypt`), for operators who unlock keys by hand;
//   * X25519 identity, for services that hold a sealing key in a secret store.
// Scrypt is deliberately slow, so the identity mode is what a busy signing
// service should use.

use std::io::{Read, Write};
use std::iter;

use age::secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};
use vellum_core::error::VellumError;

enum Secret {
    Passphrase(SecretString),
    Identity(Box<age::x25519::Identity>),
}

/// Encrypts and decrypts byte buffers with `age`.
///
/// Each encrypt/decrypt call is stateless; the secret is held only for the
/// lifetime of the `EncryptedStorage` value.
pub struct EncryptedStorage {
    secret: Secret,
}

impl EncryptedStorage {
    /// Create a passphrase-sealed storage handle.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            secret: Secret::Passphrase(SecretString::from(passphrase.into())),
        }
    }

    /// Create a storage handle sealing to an X25519 identity.
    pub fn with_identity(identity: age::x25519::Identity) -> Self {
        Self {
            secret: Secret::Identity(Box::new(identity)),
        }
    }

    /// Fresh random X25519 identity.
    pub fn generate_identity() -> Self {
        Self::with_identity(age::x25519::Identity::generate())
    }

    /// Parse an `AGE-SECRET-KEY-1...` string.
    pub fn from_identity_str(identity: &str) -> Result<Self, VellumError> {
        let identity = identity
            .trim()
            .parse::<age::x25519::Identity>()
            .map_err(|e| VellumError::Config(format!("invalid age identity: {e}")))?;
        Ok(Self::with_identity(identity))
    }

    /// Bech32 form of the identity, if this handle is identity-based.
    pub fn identity_string(&self) -> Option<String> {
        match &self.secret {
            Secret::Identity(identity) => Some(identity.to_string().expose_secret().to_owned()),
            Secret::Passphrase(_) => None,
        }
    }

    /// Encrypt `plaintext` and return a complete age file.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, VellumError> {
        let encryptor = match &self.secret {
            Secret::Passphrase(passphrase) => {
                age::Encryptor::with_user_passphrase(passphrase.clone())
            }
            Secret::Identity(identity) => {
                let recipient = identity.to_public();
                age::Encryptor::with_recipients(iter::once(&recipient as &dyn age::Recipient))
                    .map_err(|e| VellumError::Encryption(e.to_string()))?
            }
        };

        let mut ciphertext = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| VellumError::Encryption(e.to_string()))?;
        writer
            .write_all(plaintext)
            .map_err(|e| VellumError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| VellumError::Encryption(e.to_string()))?;

        debug!(ciphertext_len = ciphertext.len(), "encryption complete");
        Ok(ciphertext)
    }

    /// Decrypt a complete age file and return the original plaintext.
    #[instrument(skip_all, fields(ciphertext_len = ciphertext.len()))]
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, VellumError> {
        let decryptor =
            age::Decryptor::new(ciphertext).map_err(|e| VellumError::Decryption(e.to_string()))?;

        let mut reader = match &self.secret {
            Secret::Passphrase(passphrase) => {
                let identity = age::scrypt::Identity::new(passphrase.clone());
                decryptor.decrypt(iter::once(&identity as &dyn age::Identity))
            }
            Secret::Identity(identity) => {
                decryptor.decrypt(iter::once(identity.as_ref() as &dyn age::Identity))
            }
        }
        .map_err(|e| VellumError::Decryption(e.to_string()))?;

        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| VellumError::Decryption(e.to_string()))?;

        debug!(plaintext_len = plaintext.len(), "decryption complete");
        Ok(plaintext)
    }
}
