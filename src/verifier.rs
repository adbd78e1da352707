// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Credential and one-time-passcode verification.
//!
//! Stateless lookup-and-compare against an in-memory principal
//! directory. Secrets are stored as SHA-256 digests and compared in
//! constant time; the clear text is never retained past the call and
//! never logged. An unknown identifier and a wrong secret produce the
//! same error, so callers cannot enumerate which identifiers exist.
//!
//! The verifier performs no input validation beyond the compare itself:
//! empty fields and malformed OTP codes are the login flow's job and
//! are rejected before anything reaches this module.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use subtle::ConstantTimeEq;

use crate::errors::{CredentialError, OtpError};
use crate::types::UserProfile;

/// Default validity window for an issued OTP challenge: 5 minutes.
pub const DEFAULT_OTP_VALIDITY_SECS: u64 = 300;

// =============================================================================
// OTP CHALLENGE
// =============================================================================

/// A pending one-time-passcode challenge.
///
/// Issued when credential verification succeeds for an MFA-enabled
/// principal, and presented back alongside the submitted code. Carries
/// only the issuance instant; the expected code stays in the directory.
#[derive(Debug, Clone)]
pub struct OtpChallenge {
    issued_at: Instant,
}

impl OtpChallenge {
    /// Issue a fresh challenge, valid from this instant.
    pub fn issue() -> Self {
        Self {
            issued_at: Instant::now(),
        }
    }

    /// Time elapsed since the challenge was issued.
    pub fn age(&self) -> Duration {
        self.issued_at.elapsed()
    }
}

// =============================================================================
// PRINCIPAL DIRECTORY
// =============================================================================

/// A registered principal: the profile plus its verification material.
#[derive(Debug, Clone)]
struct Principal {
    profile: UserProfile,
    secret_hash: [u8; 32],
    otp_code: String,
}

/// Stateless credential and OTP verifier over an in-memory directory.
///
/// Pure lookup/compare: verification mutates nothing and performs no
/// I/O. Cloning the returned profile is the only way a `UserProfile`
/// leaves this module.
#[derive(Debug, Clone)]
pub struct CredentialVerifier {
    directory: HashMap<String, Principal>,
    otp_validity: Duration,
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialVerifier {
    /// Create an empty verifier with the default OTP validity window.
    pub fn new() -> Self {
        Self {
            directory: HashMap::new(),
            otp_validity: Duration::from_secs(DEFAULT_OTP_VALIDITY_SECS),
        }
    }

    /// Verifier seeded with the demo principal directory.
    ///
    /// Three accounts covering the security-level tiers:
    ///
    /// | identifier | secret             | OTP      | profile                          |
    /// |------------|--------------------|----------|----------------------------------|
    /// | `EMP-1001` | `argon-horizon-51` | `482916` | clearance 5, MFA, gov-ID         |
    /// | `EMP-2047` | `delta-crescent-9` | `735204` | clearance 3, MFA                 |
    /// | `EMP-3360` | `harbor-pine-23`   | `614308` | clearance 2, no MFA              |
    pub fn demo_directory() -> Self {
        let mut verifier = Self::new();
        verifier.register(
            UserProfile::new(
                "EMP-1001",
                "Dana Whitfield",
                "Security Operations",
                "Site Administrator",
                5,
            )
            .with_mfa()
            .with_gov_id_verified(),
            "argon-horizon-51",
            "482916",
        );
        verifier.register(
            UserProfile::new(
                "EMP-2047",
                "Marcus Webb",
                "Intelligence Analysis",
                "Senior Analyst",
                3,
            )
            .with_mfa(),
            "delta-crescent-9",
            "735204",
        );
        verifier.register(
            UserProfile::new("EMP-3360", "Priya Nair", "Facilities", "Contractor", 2),
            "harbor-pine-23",
            "614308",
        );
        verifier
    }

    /// Override the OTP validity window.
    pub fn with_otp_validity(mut self, validity: Duration) -> Self {
        self.otp_validity = validity;
        self
    }

    /// Register a principal. The secret is digested immediately and the
    /// clear text dropped.
    pub fn register(&mut self, profile: UserProfile, secret: &str, otp_code: impl Into<String>) {
        let principal = Principal {
            secret_hash: Self::digest_secret(secret),
            otp_code: otp_code.into(),
            profile,
        };
        tracing::debug!(
            "PRINCIPAL_REGISTERED | employee={} mfa={}",
            principal.profile.employee_id,
            principal.profile.mfa_enabled
        );
        self.directory
            .insert(principal.profile.employee_id.clone(), principal);
    }

    /// Number of registered principals.
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    /// True when no principals are registered.
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }

    /// Verify an identifier/secret pair.
    ///
    /// On success returns the principal's profile with `last_login`
    /// refreshed to now. Unknown identifiers and wrong secrets both
    /// yield [`CredentialError::InvalidCredentials`].
    pub fn verify_credentials(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<UserProfile, CredentialError> {
        let principal = self
            .directory
            .get(identifier)
            .ok_or(CredentialError::InvalidCredentials)?;

        let candidate = Self::digest_secret(secret);
        let matches: bool = principal.secret_hash.ct_eq(&candidate).into();
        if !matches {
            return Err(CredentialError::InvalidCredentials);
        }

        let mut profile = principal.profile.clone();
        profile.last_login = chrono::Utc::now();
        Ok(profile)
    }

    /// Verify a one-time passcode against an outstanding challenge.
    ///
    /// Expiry is checked before the code compare, so a stale challenge
    /// reveals nothing about whether the code would have matched.
    pub fn verify_otp(
        &self,
        user: &UserProfile,
        code: &str,
        challenge: &OtpChallenge,
    ) -> Result<(), OtpError> {
        if challenge.age() > self.otp_validity {
            return Err(OtpError::OtpExpired);
        }

        let expected = self
            .directory
            .get(&user.employee_id)
            .map(|p| p.otp_code.as_str())
            .ok_or(OtpError::InvalidOtp)?;

        let matches: bool = code.as_bytes().ct_eq(expected.as_bytes()).into();
        if matches {
            Ok(())
        } else {
            Err(OtpError::InvalidOtp)
        }
    }

    fn digest_secret(secret: &str) -> [u8; 32] {
        Sha256::digest(secret.as_bytes()).into()
    }
}

// =============================================================================
// TESTS
// =============================================================================
