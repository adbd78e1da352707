// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Login flow state machine.
//!
//! Drives the two-step sign-in sequence:
//!
//! ```text
//! COLLECTING_CREDENTIALS -> VERIFYING_CREDENTIALS -+-> COLLECTING_OTP -> VERIFYING_OTP -> AUTHENTICATED
//!                                                  |                                          ^
//!                                                  +------ (MFA disabled) -------------------+
//! ```
//!
//! Input validation happens here, before the verifier is consulted:
//! empty fields and malformed OTP codes are rejected without touching
//! the stage. Verifier rejections return the flow to its collecting
//! stage with the error retained for display, retryable indefinitely
//! unless a lockout limit is configured.
//!
//! `AUTHENTICATED` is terminal; the only way back is [`LoginFlow::reset`],
//! invoked on logout or session expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LoginError, ValidationError};
use crate::types::UserProfile;
use crate::verifier::{CredentialVerifier, OtpChallenge};

/// Required OTP length: exactly six ASCII digits.
pub const OTP_CODE_LEN: usize = 6;

// =============================================================================
// STAGES
// =============================================================================

/// Stage of the login sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStage {
    /// Waiting for an identifier/secret pair. Initial stage.
    CollectingCredentials,
    /// Credential pair handed to the verifier.
    VerifyingCredentials,
    /// Credentials accepted; waiting for the one-time passcode.
    CollectingOtp,
    /// Passcode handed to the verifier.
    VerifyingOtp,
    /// Sign-in complete. Terminal until reset.
    Authenticated,
    /// Too many failed attempts. Terminal until reset.
    LockedOut,
}

impl LoginStage {
    /// True once the flow has produced an authenticated user.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginStage::Authenticated)
    }

    /// True when no further submissions will be accepted without a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginStage::Authenticated | LoginStage::LockedOut)
    }
}

impl std::fmt::Display for LoginStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoginStage::CollectingCredentials => write!(f, "COLLECTING_CREDENTIALS"),
            LoginStage::VerifyingCredentials => write!(f, "VERIFYING_CREDENTIALS"),
            LoginStage::CollectingOtp => write!(f, "COLLECTING_OTP"),
            LoginStage::VerifyingOtp => write!(f, "VERIFYING_OTP"),
            LoginStage::Authenticated => write!(f, "AUTHENTICATED"),
            LoginStage::LockedOut => write!(f, "LOCKED_OUT"),
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Login events for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginEvent {
    /// Credential pair accepted.
    CredentialsAccepted {
        employee_id: String,
        mfa_required: bool,
        timestamp: DateTime<Utc>,
    },
    /// Credential pair rejected by the verifier.
    CredentialsRejected {
        identifier: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// One-time passcode accepted; sign-in complete.
    OtpAccepted {
        employee_id: String,
        timestamp: DateTime<Utc>,
    },
    /// One-time passcode rejected by the verifier.
    OtpRejected {
        employee_id: String,
        reason: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// Failed-attempt limit reached; flow parked.
    LockedOut {
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
    /// Flow returned to its initial stage.
    Reset { timestamp: DateTime<Utc> },
}

impl LoginEvent {
    /// Format event for audit log.
    pub fn to_audit_string(&self) -> String {
        match self {
            LoginEvent::CredentialsAccepted {
                employee_id,
                mfa_required,
                timestamp,
            } => format!(
                "{} | LOGIN_CREDENTIALS_ACCEPTED | employee={} mfa_required={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                employee_id,
                mfa_required
            ),
            LoginEvent::CredentialsRejected {
                identifier,
                attempts,
                timestamp,
            } => format!(
                "{} | LOGIN_CREDENTIALS_REJECTED | identifier={} attempts={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                identifier,
                attempts
            ),
            LoginEvent::OtpAccepted {
                employee_id,
                timestamp,
            } => format!(
                "{} | LOGIN_OTP_ACCEPTED | employee={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                employee_id
            ),
            LoginEvent::OtpRejected {
                employee_id,
                reason,
                attempts,
                timestamp,
            } => format!(
                "{} | LOGIN_OTP_REJECTED | employee={} reason={} attempts={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                employee_id,
                reason,
                attempts
            ),
            LoginEvent::LockedOut {
                attempts,
                timestamp,
            } => format!(
                "{} | LOGIN_LOCKED_OUT | attempts={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                attempts
            ),
            LoginEvent::Reset { timestamp } => format!(
                "{} | LOGIN_FLOW_RESET",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Login flow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Verifier-level failures tolerated before the flow parks itself
    /// in `LOCKED_OUT`. `None` means unlimited retry.
    pub max_failed_attempts: Option<u32>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: None,
        }
    }
}

impl LoginConfig {
    /// Configuration with a lockout limit.
    ///
    /// A limit of 0 would lock before the first attempt; it is clamped
    /// to 1 with a logged warning.
    pub fn with_lockout(max_failed_attempts: u32) -> Self {
        let clamped = max_failed_attempts.max(1);
        if clamped != max_failed_attempts {
            tracing::warn!(
                "LOGIN_LOCKOUT: Requested limit {} is below the minimum of 1. Clamped to {}.",
                max_failed_attempts,
                clamped
            );
        }
        Self {
            max_failed_attempts: Some(clamped),
        }
    }
}

// =============================================================================
// LOGIN FLOW
// =============================================================================

/// Result of a successful credential submission.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginAdvance {
    /// MFA is enabled for this principal; an OTP challenge was issued.
    OtpRequired,
    /// MFA is disabled; sign-in is complete.
    Authenticated(UserProfile),
}

/// State held while waiting for the OTP step.
#[derive(Debug, Clone)]
struct PendingOtp {
    profile: UserProfile,
    challenge: OtpChallenge,
}

/// The login state machine.
///
/// Owns a [`CredentialVerifier`] and walks the caller through the
/// sign-in stages. Submitted secrets and codes are borrowed for the
/// duration of the call and never retained.
#[derive(Debug)]
pub struct LoginFlow {
    verifier: CredentialVerifier,
    config: LoginConfig,
    stage: LoginStage,
    pending: Option<PendingOtp>,
    last_error: Option<LoginError>,
    failed_attempts: u32,
}

impl LoginFlow {
    /// Create a flow over the given verifier with unlimited retry.
    pub fn new(verifier: CredentialVerifier) -> Self {
        Self::with_config(verifier, LoginConfig::default())
    }

    /// Create a flow with an explicit configuration.
    pub fn with_config(verifier: CredentialVerifier, config: LoginConfig) -> Self {
        Self {
            verifier,
            config,
            stage: LoginStage::CollectingCredentials,
            pending: None,
            last_error: None,
            failed_attempts: 0,
        }
    }

    /// Current stage.
    pub fn stage(&self) -> LoginStage {
        self.stage
    }

    /// Most recent failure, retained for display until the next
    /// submission or reset.
    pub fn last_error(&self) -> Option<&LoginError> {
        self.last_error.as_ref()
    }

    /// Consecutive verifier-level failures in this flow run.
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Submit an identifier/secret pair.
    ///
    /// Legal only from `COLLECTING_CREDENTIALS`. Empty fields are
    /// rejected locally without a stage transition. On acceptance the
    /// flow either completes (`MFA` disabled) or advances to the OTP
    /// step with a freshly-issued challenge.
    pub fn submit_credentials(
        &mut self,
        identifier: &str,
        secret: &str,
    ) -> Result<LoginAdvance, LoginError> {
        if self.stage == LoginStage::LockedOut {
            return Err(LoginError::LockedOut {
                attempts: self.failed_attempts,
            });
        }
        if self.stage != LoginStage::CollectingCredentials {
            return Err(LoginError::WrongStage {
                expected: LoginStage::CollectingCredentials,
                actual: self.stage,
            });
        }

        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(self.retain(ValidationError::EmptyIdentifier.into()));
        }
        if secret.is_empty() {
            return Err(self.retain(ValidationError::EmptySecret.into()));
        }

        self.stage = LoginStage::VerifyingCredentials;
        match self.verifier.verify_credentials(identifier, secret) {
            Ok(profile) => {
                self.last_error = None;
                let event = LoginEvent::CredentialsAccepted {
                    employee_id: profile.employee_id.clone(),
                    mfa_required: profile.mfa_enabled,
                    timestamp: Utc::now(),
                };
                tracing::info!("{}", event.to_audit_string());

                if profile.mfa_enabled {
                    self.pending = Some(PendingOtp {
                        profile,
                        challenge: OtpChallenge::issue(),
                    });
                    self.stage = LoginStage::CollectingOtp;
                    Ok(LoginAdvance::OtpRequired)
                } else {
                    self.stage = LoginStage::Authenticated;
                    self.failed_attempts = 0;
                    Ok(LoginAdvance::Authenticated(profile))
                }
            }
            Err(e) => {
                self.failed_attempts += 1;
                let event = LoginEvent::CredentialsRejected {
                    identifier: identifier.to_string(),
                    attempts: self.failed_attempts,
                    timestamp: Utc::now(),
                };
                tracing::warn!("{}", event.to_audit_string());

                if self.lockout_reached() {
                    Err(self.lock_out())
                } else {
                    self.stage = LoginStage::CollectingCredentials;
                    Err(self.retain(e.into()))
                }
            }
        }
    }

    /// Submit the one-time passcode.
    ///
    /// Legal only from `COLLECTING_OTP`. A code that is not exactly six
    /// ASCII digits is rejected locally; the challenge stays
    /// outstanding. On acceptance the flow completes and yields the
    /// authenticated profile.
    pub fn submit_otp(&mut self, code: &str) -> Result<UserProfile, LoginError> {
        if self.stage == LoginStage::LockedOut {
            return Err(LoginError::LockedOut {
                attempts: self.failed_attempts,
            });
        }
        if self.stage != LoginStage::CollectingOtp {
            return Err(LoginError::WrongStage {
                expected: LoginStage::CollectingOtp,
                actual: self.stage,
            });
        }
        if code.len() != OTP_CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(self.retain(ValidationError::MalformedOtp.into()));
        }

        // COLLECTING_OTP always holds a pending challenge; both are set
        // and cleared together.
        let Some(pending) = self.pending.take() else {
            return Err(LoginError::WrongStage {
                expected: LoginStage::CollectingOtp,
                actual: self.stage,
            });
        };

        self.stage = LoginStage::VerifyingOtp;
        match self
            .verifier
            .verify_otp(&pending.profile, code, &pending.challenge)
        {
            Ok(()) => {
                self.stage = LoginStage::Authenticated;
                self.last_error = None;
                self.failed_attempts = 0;
                let event = LoginEvent::OtpAccepted {
                    employee_id: pending.profile.employee_id.clone(),
                    timestamp: Utc::now(),
                };
                tracing::info!("{}", event.to_audit_string());
                Ok(pending.profile)
            }
            Err(e) => {
                self.failed_attempts += 1;
                let event = LoginEvent::OtpRejected {
                    employee_id: pending.profile.employee_id.clone(),
                    reason: e.to_string(),
                    attempts: self.failed_attempts,
                    timestamp: Utc::now(),
                };
                tracing::warn!("{}", event.to_audit_string());

                if self.lockout_reached() {
                    Err(self.lock_out())
                } else {
                    // Challenge stays outstanding; the caller may retry.
                    self.stage = LoginStage::CollectingOtp;
                    self.pending = Some(pending);
                    Err(self.retain(e.into()))
                }
            }
        }
    }

    /// Return to `COLLECTING_CREDENTIALS`, dropping any pending
    /// challenge, retained error, and the attempt counter.
    pub fn reset(&mut self) {
        self.stage = LoginStage::CollectingCredentials;
        self.pending = None;
        self.last_error = None;
        self.failed_attempts = 0;
        let event = LoginEvent::Reset {
            timestamp: Utc::now(),
        };
        tracing::debug!("{}", event.to_audit_string());
    }

    fn retain(&mut self, e: LoginError) -> LoginError {
        self.last_error = Some(e);
        e
    }

    fn lockout_reached(&self) -> bool {
        self.config
            .max_failed_attempts
            .is_some_and(|max| self.failed_attempts >= max)
    }

    fn lock_out(&mut self) -> LoginError {
        self.stage = LoginStage::LockedOut;
        self.pending = None;
        let event = LoginEvent::LockedOut {
            attempts: self.failed_attempts,
            timestamp: Utc::now(),
        };
        tracing::warn!("{}", event.to_audit_string());
        self.retain(LoginError::LockedOut {
            attempts: self.failed_attempts,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
