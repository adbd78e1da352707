// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! cleargate - Session security and authentication lifecycle core
//!
//! Two-step credential + one-time-passcode sign-in, feeding a
//! supervised session with a rolling timeout:
//!
//! **Login Flow** -> **Session Supervisor** -> **SessionSnapshot** consumers
//!
//! The crate is an in-process library boundary: no network surface, no
//! persistence. Embedding UIs submit credentials and forward raw
//! activity/connectivity signals; the core owns the state machines,
//! the countdown clock, the pre-expiry warning, and the derived
//! security level, and publishes read-only snapshots.
//!
//! # Core Modules
//!
//! - [`verifier`] - Credential/OTP verification over an in-memory directory
//! - [`login`] - The sign-in state machine (credentials, then OTP when MFA is on)
//! - [`session`] - Session supervisor: countdown, renewal, warning, connectivity
//! - [`gatekeeper`] - Facade wiring login completion into a supervised session
//! - [`types`] - Profiles, connectivity, and the security-level policy
//! - [`errors`] - The error taxonomy, from validation to session expiry

pub mod errors;
pub mod gatekeeper;
pub mod login;
pub mod session;
pub mod types;
pub mod verifier;

// Re-export commonly used types from types module
pub use types::{Connectivity, SecurityLevel, UserProfile};

// Re-export login flow types
pub use login::{LoginAdvance, LoginConfig, LoginEvent, LoginFlow, LoginStage};

// Re-export session types
pub use session::{
    SessionConfig, SessionEvent, SessionPhase, SessionSnapshot, SessionSupervisor,
    DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_WARNING_BEFORE_TIMEOUT_SECS,
};

// Re-export verification types
pub use verifier::{CredentialVerifier, OtpChallenge, DEFAULT_OTP_VALIDITY_SECS};

// Re-export the facade
pub use gatekeeper::{GateOutcome, Gatekeeper};

// Re-export the error taxonomy
pub use errors::{CredentialError, LoginError, OtpError, SessionExpired, ValidationError};
