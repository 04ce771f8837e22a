// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Error triage for the service layer.
//
// Every technical error is mapped to a plain message, a suggestion for the
// person at the keyboard, and a severity that decides retry and logging
// behaviour.

use crate::error::VellumError;

/// Severity of an error from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Infrastructure blip; the caller may retry after an idempotency check.
    Transient,
    /// The user must do something (renew a certificate, pick another version).
    ActionRequired,
    /// Cannot be fixed by retrying (wrong format, missing content).
    Permanent,
    /// Data-integrity problem with key or certificate material. Always logged.
    Security,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    pub message: String,
    pub suggestion: String,
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Convert a `VellumError` into a `HumanError`.
pub fn humanize_error(err: &VellumError) -> HumanError {
    use Severity::*;

    match err {
        VellumError::ContentNotFound { .. } => HumanError::new(
            "The document content could not be found.",
            "The requested version may have been purged. Choose another version from the history.",
            false,
            Permanent,
        ),
        VellumError::DocumentNotFound(_) => HumanError::new(
            "This document does not exist.",
            "It may have been removed. Refresh the document list.",
            false,
            Permanent,
        ),
        VellumError::VersionReferenced { signatures, .. } => HumanError::new(
            "This version has been signed and cannot be removed.",
            format!("{signatures} signature(s) depend on these exact bytes."),
            false,
            ActionRequired,
        ),
        VellumError::IntegrityMismatch { .. } => HumanError::new(
            "The stored document no longer matches its recorded fingerprint.",
            "The stored copy may have been altered. Restore it from a trusted source before signing.",
            false,
            Security,
        ),
        VellumError::NoActiveCertificate(_) => HumanError::new(
            "You don't have a valid signing certificate.",
            "Your certificate may have expired or been revoked. Ask an administrator for a new one.",
            false,
            ActionRequired,
        ),
        VellumError::KeyUnavailable(_) => HumanError::new(
            "Your signing key could not be unlocked.",
            "The key material may be missing or damaged. Ask an administrator to re-enroll your certificate.",
            false,
            Security,
        ),
        VellumError::MalformedCertificate(_) => HumanError::new(
            "A certificate on record is damaged.",
            "An administrator should inspect and replace the certificate.",
            false,
            Security,
        ),
        VellumError::Signing(_) => HumanError::new(
            "The signature could not be produced.",
            "Try again. If this keeps happening, the signing key may be unsuitable.",
            true,
            Transient,
        ),
        VellumError::Encryption(_) | VellumError::Decryption(_) => HumanError::new(
            "There was a problem with sealed key storage.",
            "The sealing secret may have changed. Check the service configuration.",
            false,
            Security,
        ),
        VellumError::UnsupportedFormat(detail) => HumanError::new(
            "This type of document can't carry a visible signature.",
            format!("Convert the file to PDF first, then stamp it. ({detail})"),
            false,
            Permanent,
        ),
        VellumError::RenderError(_) => HumanError::new(
            "The signature stamp could not be drawn on this document.",
            "The PDF may be damaged. Try re-exporting it from the original application.",
            false,
            Permanent,
        ),
        VellumError::Database(_) => HumanError::new(
            "The metadata store had a problem.",
            "Try again. Check for an existing signature or version first so nothing is recorded twice.",
            true,
            Transient,
        ),
        VellumError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError::new(
                    "The service doesn't have permission to read that file.",
                    "Check the storage directory permissions.",
                    false,
                    ActionRequired,
                )
            } else {
                HumanError::new(
                    "There was a problem reading or writing document bytes.",
                    "Try again. If this keeps happening, the storage backend may be unavailable.",
                    true,
                    Transient,
                )
            }
        }
        VellumError::Serialization(_) | VellumError::Config(_) => HumanError::new(
            "The service configuration could not be read.",
            "Check the configuration file for typos.",
            false,
            ActionRequired,
        ),
    }
}

/// Whether an error should be logged as security-relevant.
pub fn is_security_relevant(err: &VellumError) -> bool {
    humanize_error(err).severity == Severity::Security
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certificate_is_action_required() {
        let human = humanize_error(&VellumError::NoActiveCertificate("alice".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn key_problems_are_security_relevant() {
        assert!(is_security_relevant(&VellumError::KeyUnavailable("no key".into())));
        assert!(is_security_relevant(&VellumError::MalformedCertificate("bad pem".into())));
        assert!(!is_security_relevant(&VellumError::UnsupportedFormat("text/plain".into())));
    }

    #[test]
    fn io_is_transient() {
        let err = VellumError::Io(std::io::Error::other("connection reset"));
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn unsupported_format_is_permanent() {
        let human = humanize_error(&VellumError::UnsupportedFormat("image/png".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(human.suggestion.contains("image/png"));
    }
}
