// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Gatekeeper: one front door over the login flow and the session.
//!
//! Wires the two halves of the lifecycle together: drives the
//! [`LoginFlow`], spawns a [`SessionSupervisor`] the moment a login
//! completes, and tears the flow back down to its initial stage when
//! the session ends, whether by explicit logout or by observed expiry.
//!
//! Embedding UIs talk to this type only: submit credentials and codes,
//! forward activity and connectivity signals, read the session handle
//! for snapshots.

use crate::errors::{LoginError, SessionExpired};
use crate::login::{LoginAdvance, LoginConfig, LoginFlow, LoginStage};
use crate::session::{SessionConfig, SessionSupervisor};
use crate::types::Connectivity;
use crate::verifier::CredentialVerifier;

/// What a successful submission led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Credentials accepted; the OTP step is required next.
    OtpRequired,
    /// Sign-in complete; a supervised session is now running.
    SessionStarted,
}

/// Facade owning the login flow and the current session, if any.
///
/// A `Gatekeeper` holds at most one session at a time. A session that
/// ended on its own (expiry, or logout through a cloned handle) is
/// noticed on the next call and cleared, resetting the login flow for
/// a fresh run.
#[derive(Debug)]
pub struct Gatekeeper {
    flow: LoginFlow,
    session: Option<SessionSupervisor>,
    session_config: SessionConfig,
}

impl Gatekeeper {
    /// Create a gatekeeper with default login and session configuration.
    pub fn new(verifier: CredentialVerifier) -> Self {
        Self::with_configs(verifier, LoginConfig::default(), SessionConfig::default())
    }

    /// Create a gatekeeper with explicit configuration.
    pub fn with_configs(
        verifier: CredentialVerifier,
        login_config: LoginConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            flow: LoginFlow::with_config(verifier, login_config),
            session: None,
            session_config,
        }
    }

    /// Submit an identifier/secret pair.
    ///
    /// For principals without MFA a session starts immediately; with
    /// MFA the OTP step is required first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_credentials(
        &mut self,
        identifier: &str,
        secret: &str,
    ) -> Result<GateOutcome, LoginError> {
        self.reconcile();
        match self.flow.submit_credentials(identifier, secret)? {
            LoginAdvance::OtpRequired => Ok(GateOutcome::OtpRequired),
            LoginAdvance::Authenticated(profile) => {
                self.session = Some(SessionSupervisor::spawn(
                    profile,
                    self.session_config.clone(),
                ));
                Ok(GateOutcome::SessionStarted)
            }
        }
    }

    /// Submit the one-time passcode, completing sign-in.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_otp(&mut self, code: &str) -> Result<GateOutcome, LoginError> {
        self.reconcile();
        let profile = self.flow.submit_otp(code)?;
        self.session = Some(SessionSupervisor::spawn(
            profile,
            self.session_config.clone(),
        ));
        Ok(GateOutcome::SessionStarted)
    }

    /// Handle to the running session, if one is live.
    pub fn session(&mut self) -> Option<&SessionSupervisor> {
        self.reconcile();
        self.session.as_ref()
    }

    /// Forward a raw activity signal (pointer, key press, click).
    ///
    /// Quietly ignored when no session is live; stray events after
    /// expiry are expected, not errors.
    pub fn record_activity(&mut self) {
        self.reconcile();
        if let Some(session) = &self.session {
            session.record_activity();
        }
    }

    /// The explicit extend action from the warning prompt.
    ///
    /// Unlike passive activity this requires a live session: the prompt
    /// may race against expiry, and the user must learn they lost.
    pub fn extend_session(&mut self) -> Result<(), SessionExpired> {
        self.reconcile();
        match &self.session {
            Some(session) => {
                session.extend_session();
                Ok(())
            }
            None => Err(SessionExpired),
        }
    }

    /// Forward a connectivity change notification.
    pub fn set_connectivity(&mut self, connectivity: Connectivity) {
        self.reconcile();
        if let Some(session) = &self.session {
            session.set_connectivity(connectivity);
        }
    }

    /// End the session and return the login flow to its initial stage.
    ///
    /// Idempotent; safe to call with no session running.
    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            session.logout();
        }
        self.flow.reset();
    }

    /// Current stage of the login flow.
    pub fn login_stage(&self) -> LoginStage {
        self.flow.stage()
    }

    /// Most recent login failure, retained for display.
    pub fn last_login_error(&self) -> Option<&LoginError> {
        self.flow.last_error()
    }

    /// Drop a session that ended on its own and reset the flow, so the
    /// next interaction starts from a clean sign-in.
    fn reconcile(&mut self) {
        let ended = self.session.as_ref().is_some_and(|s| !s.is_active());
        if ended {
            self.session = None;
            self.flow.reset();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
