// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy for the authentication lifecycle.
//!
//! Three layers of failure, kept deliberately distinct:
//!
//! - [`ValidationError`] - malformed local input, caught before anything
//!   reaches the verifier. Never transitions login state.
//! - [`CredentialError`] / [`OtpError`] - verifier-level rejections.
//!   Recoverable: the flow stays in its collecting stage and the caller
//!   may retry immediately.
//! - [`SessionExpired`] - the session timed out. Unrecoverable from
//!   within the session; the only remedy is a fresh login.
//!
//! None of these messages ever embed the secret or OTP code that was
//! submitted. Errors carry enough to render a user-facing message and
//! nothing an attacker would want logged.

use serde::Serialize;

use crate::login::LoginStage;

// =============================================================================
// VALIDATION ERRORS (local, pre-verifier)
// =============================================================================

/// Malformed input rejected before the verifier is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    /// Identifier field was empty (or whitespace only).
    EmptyIdentifier,
    /// Secret field was empty.
    EmptySecret,
    /// OTP was not exactly six ASCII digits.
    MalformedOtp,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyIdentifier => write!(f, "identifier must not be empty"),
            Self::EmptySecret => write!(f, "secret must not be empty"),
            Self::MalformedOtp => write!(f, "one-time passcode must be exactly 6 digits"),
        }
    }
}

impl std::error::Error for ValidationError {}

// =============================================================================
// VERIFIER ERRORS (recoverable, retryable in place)
// =============================================================================

/// Credential verification failure.
///
/// Unknown identifiers and wrong secrets are deliberately
/// indistinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialError {
    /// The identifier/secret pair does not match a known principal.
    InvalidCredentials,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "invalid employee ID or password"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// One-time passcode verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpError {
    /// The submitted code does not match the issued code.
    InvalidOtp,
    /// The challenge was issued beyond the configured validity window.
    OtpExpired,
}

impl std::fmt::Display for OtpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOtp => write!(f, "incorrect one-time passcode"),
            Self::OtpExpired => write!(f, "one-time passcode has expired; request a new code"),
        }
    }
}

impl std::error::Error for OtpError {}

// =============================================================================
// LOGIN FLOW ERRORS
// =============================================================================

/// Any failure the login flow can report to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LoginError {
    /// Local input validation failed; no state was touched.
    Validation(ValidationError),
    /// The verifier rejected the credential pair.
    Credentials(CredentialError),
    /// The verifier rejected the one-time passcode.
    Otp(OtpError),
    /// The operation is not legal from the current stage.
    WrongStage {
        expected: LoginStage,
        actual: LoginStage,
    },
    /// Too many failed attempts; the flow is parked until reset.
    /// Only reachable when a lockout limit is configured.
    LockedOut { attempts: u32 },
}

impl LoginError {
    /// True when the caller may retry the same operation immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Credentials(_) | Self::Otp(_)
        )
    }
}

impl std::fmt::Display for LoginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(e) => write!(f, "{}", e),
            Self::Credentials(e) => write!(f, "{}", e),
            Self::Otp(e) => write!(f, "{}", e),
            Self::WrongStage { expected, actual } => write!(
                f,
                "operation requires the {} stage but the flow is in {}",
                expected, actual
            ),
            Self::LockedOut { attempts } => {
                write!(f, "login locked after {} failed attempts", attempts)
            }
        }
    }
}

impl std::error::Error for LoginError {}

impl From<ValidationError> for LoginError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<CredentialError> for LoginError {
    fn from(e: CredentialError) -> Self {
        Self::Credentials(e)
    }
}

impl From<OtpError> for LoginError {
    fn from(e: OtpError) -> Self {
        Self::Otp(e)
    }
}

// =============================================================================
// SESSION ERRORS
// =============================================================================

/// The session reached its timeout and was force-logged-out.
///
/// Informational: there is nothing to retry. Returned where a live
/// session was required after the supervisor has already terminated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionExpired;

impl std::fmt::Display for SessionExpired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session has expired; please sign in again")
    }
}

impl std::error::Error for SessionExpired {}

// =============================================================================
// TESTS
// =============================================================================
