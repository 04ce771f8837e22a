// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Signing-core configuration, persisted as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VellumError};

/// Appearance of the visible provenance stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StampStyle {
    /// Text placed before the signer identity (e.g. "Signed").
    pub label: String,
    /// Baseline origin, in PDF points from the bottom-left corner.
    pub x_pt: i64,
    pub y_pt: i64,
    pub font_size_pt: i64,
}

impl Default for StampStyle {
    fn default() -> Self {
        Self {
            label: "Signed".into(),
            x_pt: 100,
            y_pt: 100,
            font_size_pt: 10,
        }
    }
}

/// Persistent settings for the signing core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VellumConfig {
    /// Read size used when streaming document bytes into the hasher.
    pub hash_chunk_size: usize,
    /// Modulus size for newly enrolled RSA keys.
    pub rsa_key_bits: usize,
    /// Record sign/verify/stamp operations in the audit log.
    pub audit_enabled: bool,
    pub stamp: StampStyle,
}

impl Default for VellumConfig {
    fn default() -> Self {
        Self {
            hash_chunk_size: 4096,
            rsa_key_bits: 2048,
            audit_enabled: true,
            stamp: StampStyle::default(),
        }
    }
}

impl VellumConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.hash_chunk_size == 0 {
            return Err(VellumError::Config("hash_chunk_size must be non-zero".into()));
        }
        if self.rsa_key_bits < 2048 {
            return Err(VellumError::Config(format!(
                "rsa_key_bits must be at least 2048, got {}",
                self.rsa_key_bits
            )));
        }
        if self.stamp.font_size_pt <= 0 {
            return Err(VellumError::Config("stamp font size must be positive".into()));
        }
        Ok(())
    }
}
