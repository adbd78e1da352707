// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session state machine.
//!
//! Pure countdown arithmetic over an authenticated session: one
//! [`tick`](SessionState::tick) decrements the clock by a second,
//! renewal resets it to the full timeout, reaching zero forces logout
//! exactly once. No I/O and no timers live here; the supervisor drives
//! this machine from its command queue and publishes the resulting
//! [`SessionSnapshot`]s.
//!
//! ```text
//! RUNNING -> WARNING -> EXPIRED        (countdown, terminal)
//!    |          |
//!    +----------+------> LOGGED_OUT    (explicit logout, terminal)
//! ```
//!
//! Renewal from `RUNNING` or `WARNING` returns to `RUNNING` with a full
//! clock. The terminal phases ignore every further operation.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::types::{Connectivity, SecurityLevel, UserProfile};

/// Default session timeout: 30 minutes (1800 seconds).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 1800;

/// Default warning window before timeout: 5 minutes (300 seconds).
pub const DEFAULT_WARNING_BEFORE_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// PHASE
// =============================================================================

/// Phase of a supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Counting down, outside the warning window.
    Running,
    /// Counting down, inside the warning window.
    Warning,
    /// Clock reached zero; forced logout fired. Terminal.
    Expired,
    /// Explicit logout. Terminal.
    LoggedOut,
}

impl SessionPhase {
    /// True while the session is still counting down.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Running | SessionPhase::Warning)
    }

    /// True once the session has ended; terminal phases ignore every
    /// further operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Expired | SessionPhase::LoggedOut)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Running => write!(f, "RUNNING"),
            SessionPhase::Warning => write!(f, "WARNING"),
            SessionPhase::Expired => write!(f, "EXPIRED"),
            SessionPhase::LoggedOut => write!(f, "LOGGED_OUT"),
        }
    }
}

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Session timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds from renewal to forced logout.
    pub timeout_secs: u64,

    /// Trailing portion of the timeout during which the expiry warning
    /// is active. Always strictly less than `timeout_secs`.
    pub warning_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            warning_secs: DEFAULT_WARNING_BEFORE_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    /// Create a custom configuration with validation.
    ///
    /// The timeout must be at least 1 second and the warning window
    /// strictly shorter than the timeout; out-of-range values are
    /// clamped with a logged warning.
    pub fn custom(timeout_secs: u64, warning_secs: u64) -> Self {
        let clamped_timeout = timeout_secs.max(1);
        let clamped_warning = warning_secs.min(clamped_timeout - 1);

        if clamped_timeout != timeout_secs {
            tracing::warn!(
                "SESSION_CONFIG: Requested timeout {}s is below the minimum of 1s. Clamped to {}s.",
                timeout_secs,
                clamped_timeout
            );
        }
        if clamped_warning != warning_secs {
            tracing::warn!(
                "SESSION_CONFIG: Requested warning window {}s must be shorter than the {}s timeout. Clamped to {}s.",
                warning_secs,
                clamped_timeout,
                clamped_warning
            );
        }

        Self {
            timeout_secs: clamped_timeout,
            warning_secs: clamped_warning,
        }
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// How a session renewal was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalKind {
    /// Passive activity detection (pointer, key press, click).
    Activity,
    /// The explicit extend action from the warning prompt.
    Extend,
}

impl RenewalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenewalKind::Activity => "activity",
            RenewalKind::Extend => "extend",
        }
    }
}

/// Session events for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// Session was created for an authenticated principal.
    Created {
        session_id: String,
        employee_id: String,
        timeout_secs: u64,
        timestamp: DateTime<Utc>,
    },
    /// Clock reset to the full timeout.
    Renewed {
        session_id: String,
        kind: RenewalKind,
        timestamp: DateTime<Utc>,
    },
    /// Countdown entered the warning window.
    WarningIssued {
        session_id: String,
        expires_in_secs: u64,
        timestamp: DateTime<Utc>,
    },
    /// Clock reached zero; session force-logged-out.
    Expired {
        session_id: String,
        session_duration_secs: u64,
        timestamp: DateTime<Utc>,
    },
    /// Explicit logout.
    LoggedOut {
        session_id: String,
        session_duration_secs: u64,
        timestamp: DateTime<Utc>,
    },
    /// Connectivity signal changed.
    ConnectivityChanged {
        session_id: String,
        connectivity: Connectivity,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Format event for audit log.
    pub fn to_audit_string(&self) -> String {
        match self {
            SessionEvent::Created {
                session_id,
                employee_id,
                timeout_secs,
                timestamp,
            } => format!(
                "{} | SESSION_CREATED | session={} employee={} timeout={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                employee_id,
                timeout_secs
            ),
            SessionEvent::Renewed {
                session_id,
                kind,
                timestamp,
            } => format!(
                "{} | SESSION_RENEWED | session={} kind={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                kind.as_str()
            ),
            SessionEvent::WarningIssued {
                session_id,
                expires_in_secs,
                timestamp,
            } => format!(
                "{} | SESSION_WARNING | session={} expires_in={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                expires_in_secs
            ),
            SessionEvent::Expired {
                session_id,
                session_duration_secs,
                timestamp,
            } => format!(
                "{} | SESSION_EXPIRED | session={} duration={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                session_duration_secs
            ),
            SessionEvent::LoggedOut {
                session_id,
                session_duration_secs,
                timestamp,
            } => format!(
                "{} | SESSION_LOGGED_OUT | session={} duration={}s",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                session_duration_secs
            ),
            SessionEvent::ConnectivityChanged {
                session_id,
                connectivity,
                timestamp,
            } => format!(
                "{} | SESSION_CONNECTIVITY | session={} connectivity={}",
                timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                session_id,
                connectivity
            ),
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Read-only view of a session, published whenever a command changes it.
///
/// `warning_active` and `security_level` are derived at snapshot time
/// and never stored independently, so they can never drift from the
/// fields they are computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Identifier for audit correlation.
    pub session_id: String,
    /// The authenticated principal; `None` once the session has ended.
    pub user: Option<UserProfile>,
    /// Current phase.
    pub phase: SessionPhase,
    /// Seconds until forced logout; 0 in terminal phases.
    pub remaining_secs: u64,
    /// True iff `0 < remaining_secs <= warning window`.
    pub warning_active: bool,
    /// Last reported connectivity signal.
    pub connectivity: Connectivity,
    /// Derived classification of the session.
    pub security_level: SecurityLevel,
}

impl SessionSnapshot {
    /// True while the session is still counting down.
    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }
}

// =============================================================================
// STATE MACHINE
// =============================================================================

/// The mutable session record, exclusively owned by its supervisor.
///
/// Every operation is a plain method on `&mut self`; serialization of
/// concurrent callers is the supervisor's job.
#[derive(Debug)]
pub struct SessionState {
    session_id: String,
    profile: Option<UserProfile>,
    config: SessionConfig,
    phase: SessionPhase,
    remaining_secs: u64,
    connectivity: Connectivity,
    warning_issued: bool,
    started_at: Instant,
}

impl SessionState {
    /// Start a session for an authenticated principal with a full clock.
    ///
    /// A session can only begin from a successful online login, so the
    /// initial connectivity is `Online`.
    pub fn new(profile: UserProfile, config: SessionConfig) -> Self {
        let session_id = generate_session_id();
        let event = SessionEvent::Created {
            session_id: session_id.clone(),
            employee_id: profile.employee_id.clone(),
            timeout_secs: config.timeout_secs,
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());

        Self {
            session_id,
            remaining_secs: config.timeout_secs,
            profile: Some(profile),
            config,
            phase: SessionPhase::Running,
            connectivity: Connectivity::Online,
            warning_issued: false,
            started_at: Instant::now(),
        }
    }

    /// Advance the clock by one second.
    ///
    /// Entering the warning window emits the warning event once per
    /// countdown; reaching zero forces logout exactly once. Ticks after
    /// a terminal phase are no-ops.
    pub fn tick(&mut self) -> SessionPhase {
        if self.phase.is_terminal() {
            return self.phase;
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);

        if self.remaining_secs == 0 {
            self.phase = SessionPhase::Expired;
            self.profile = None;
            let event = SessionEvent::Expired {
                session_id: self.session_id.clone(),
                session_duration_secs: self.session_duration_secs(),
                timestamp: Utc::now(),
            };
            tracing::info!("{}", event.to_audit_string());
            return self.phase;
        }

        if self.in_warning_window() {
            self.phase = SessionPhase::Warning;
            if !self.warning_issued {
                self.warning_issued = true;
                let event = SessionEvent::WarningIssued {
                    session_id: self.session_id.clone(),
                    expires_in_secs: self.remaining_secs,
                    timestamp: Utc::now(),
                };
                tracing::warn!("{}", event.to_audit_string());
            }
        } else {
            self.phase = SessionPhase::Running;
        }

        self.phase
    }

    /// Reset the clock to the full timeout on detected user activity.
    ///
    /// Clears the warning; ignored once the session has ended.
    pub fn record_activity(&mut self) -> SessionPhase {
        self.renew(RenewalKind::Activity)
    }

    /// Reset the clock to the full timeout from the warning prompt.
    ///
    /// Identical effect to [`record_activity`](Self::record_activity);
    /// audited as the explicit user action it is.
    pub fn extend_session(&mut self) -> SessionPhase {
        self.renew(RenewalKind::Extend)
    }

    fn renew(&mut self, kind: RenewalKind) -> SessionPhase {
        if self.phase.is_terminal() {
            tracing::debug!(
                "SESSION_RENEW_IGNORED | session={} phase={} kind={}",
                self.session_id,
                self.phase,
                kind.as_str()
            );
            return self.phase;
        }

        self.remaining_secs = self.config.timeout_secs;
        self.warning_issued = false;
        self.phase = SessionPhase::Running;

        let event = SessionEvent::Renewed {
            session_id: self.session_id.clone(),
            kind,
            timestamp: Utc::now(),
        };
        match kind {
            RenewalKind::Activity => tracing::debug!("{}", event.to_audit_string()),
            RenewalKind::Extend => tracing::info!("{}", event.to_audit_string()),
        }

        self.phase
    }

    /// End the session explicitly, dropping the owned profile.
    ///
    /// Idempotent: a session that already ended keeps its original
    /// terminal phase.
    pub fn logout(&mut self) -> SessionPhase {
        if self.phase.is_terminal() {
            return self.phase;
        }

        self.phase = SessionPhase::LoggedOut;
        self.remaining_secs = 0;
        self.profile = None;

        let event = SessionEvent::LoggedOut {
            session_id: self.session_id.clone(),
            session_duration_secs: self.session_duration_secs(),
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());

        self.phase
    }

    /// Update the connectivity signal. Does not affect the clock.
    pub fn set_connectivity(&mut self, connectivity: Connectivity) -> SessionPhase {
        if self.phase.is_terminal() || self.connectivity == connectivity {
            return self.phase;
        }

        self.connectivity = connectivity;
        let event = SessionEvent::ConnectivityChanged {
            session_id: self.session_id.clone(),
            connectivity,
            timestamp: Utc::now(),
        };
        tracing::info!("{}", event.to_audit_string());

        self.phase
    }

    /// Build the published view of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            user: self.profile.clone(),
            phase: self.phase,
            remaining_secs: self.remaining_secs,
            warning_active: self.in_warning_window(),
            connectivity: self.connectivity,
            security_level: self.security_level(),
        }
    }

    /// Derived classification from connectivity and the profile's
    /// authorization facts. `LOW` once the principal is gone.
    pub fn security_level(&self) -> SecurityLevel {
        match &self.profile {
            Some(profile) => SecurityLevel::evaluate(self.connectivity, profile),
            None => SecurityLevel::Low,
        }
    }

    /// Unique session identifier.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Seconds until forced logout.
    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    /// Last reported connectivity signal.
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// The owned profile, while the session is alive.
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    /// Timing configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wall-clock seconds since the session started.
    pub fn session_duration_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    fn in_warning_window(&self) -> bool {
        self.remaining_secs > 0 && self.remaining_secs <= self.config.warning_secs
    }
}

/// Generate a unique session identifier: `sess_<millis>_<128-bit hex>`.
fn generate_session_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!(
        "sess_{}_{}",
        Utc::now().timestamp_millis(),
        hex::encode(bytes)
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_profile() -> UserProfile {
        UserProfile::new("EMP-1001", "Dana Whitfield", "Security Operations", "Site Administrator", 5)
            .with_mfa()
            .with_gov_id_verified()
    }

    fn contractor_profile() -> UserProfile {
        UserProfile::new("EMP-3360", "Priya Nair", "Facilities", "Contractor", 2)
    }

    #[test]
    fn test_session_starts_with_full_clock() {
        let state = SessionState::new(admin_profile(), SessionConfig::default());
        assert_eq!(state.phase(), SessionPhase::Running);
        assert_eq!(state.remaining_secs(), DEFAULT_SESSION_TIMEOUT_SECS);
        assert_eq!(state.connectivity(), Connectivity::Online);
        assert!(state.session_id().starts_with("sess_"));
    }

    #[test]
    fn test_tick_decrements_by_one() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::default());
        state.tick();
        assert_eq!(state.remaining_secs(), DEFAULT_SESSION_TIMEOUT_SECS - 1);
        state.tick();
        assert_eq!(state.remaining_secs(), DEFAULT_SESSION_TIMEOUT_SECS - 2);
    }

    #[test]
    fn test_warning_window_boundary() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(10, 3));
        // 10 -> 4: still running, warning not yet active.
        for _ in 0..6 {
            state.tick();
        }
        assert_eq!(state.phase(), SessionPhase::Running);
        assert!(!state.snapshot().warning_active);

        // 4 -> 3: crosses into the warning window.
        state.tick();
        assert_eq!(state.phase(), SessionPhase::Warning);
        let snap = state.snapshot();
        assert!(snap.warning_active);
        assert_eq!(snap.remaining_secs, 3);
    }

    #[test]
    fn test_expiry_fires_exactly_once_and_is_terminal() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(3, 1));
        state.tick();
        state.tick();
        assert_eq!(state.tick(), SessionPhase::Expired);
        assert_eq!(state.remaining_secs(), 0);
        assert!(state.profile().is_none());

        // Further ticks are no-ops.
        assert_eq!(state.tick(), SessionPhase::Expired);
        assert_eq!(state.remaining_secs(), 0);
    }

    #[test]
    fn test_activity_resets_clock_and_clears_warning() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(10, 5));
        for _ in 0..7 {
            state.tick();
        }
        assert_eq!(state.phase(), SessionPhase::Warning);

        assert_eq!(state.record_activity(), SessionPhase::Running);
        assert_eq!(state.remaining_secs(), 10);
        assert!(!state.snapshot().warning_active);
    }

    #[test]
    fn test_renewal_is_idempotent() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::default());
        state.tick();
        for _ in 0..5 {
            state.record_activity();
        }
        assert_eq!(state.remaining_secs(), DEFAULT_SESSION_TIMEOUT_SECS);
        assert_eq!(state.phase(), SessionPhase::Running);
    }

    #[test]
    fn test_activity_ignored_after_expiry() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(2, 1));
        state.tick();
        state.tick();
        assert_eq!(state.phase(), SessionPhase::Expired);

        assert_eq!(state.record_activity(), SessionPhase::Expired);
        assert_eq!(state.extend_session(), SessionPhase::Expired);
        assert_eq!(state.remaining_secs(), 0);
    }

    #[test]
    fn test_warning_reissued_after_renewal() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(5, 2));
        for _ in 0..3 {
            state.tick();
        }
        assert_eq!(state.phase(), SessionPhase::Warning);

        state.extend_session();
        assert_eq!(state.phase(), SessionPhase::Running);

        // The warning latch cleared; the next countdown warns again.
        for _ in 0..3 {
            state.tick();
        }
        assert_eq!(state.phase(), SessionPhase::Warning);
    }

    #[test]
    fn test_logout_from_any_active_phase() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::default());
        assert_eq!(state.logout(), SessionPhase::LoggedOut);
        assert_eq!(state.remaining_secs(), 0);
        assert!(state.profile().is_none());

        let mut warned = SessionState::new(admin_profile(), SessionConfig::custom(4, 3));
        warned.tick();
        assert_eq!(warned.phase(), SessionPhase::Warning);
        assert_eq!(warned.logout(), SessionPhase::LoggedOut);
    }

    #[test]
    fn test_logout_does_not_overwrite_expired() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(1, 0));
        state.tick();
        assert_eq!(state.phase(), SessionPhase::Expired);
        assert_eq!(state.logout(), SessionPhase::Expired);
    }

    #[test]
    fn test_connectivity_does_not_touch_the_clock() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::default());
        state.tick();
        let before = state.remaining_secs();

        state.set_connectivity(Connectivity::Offline);
        assert_eq!(state.remaining_secs(), before);
        assert_eq!(state.connectivity(), Connectivity::Offline);
    }

    #[test]
    fn test_security_level_follows_connectivity() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::default());
        assert_eq!(state.security_level(), SecurityLevel::High);

        state.set_connectivity(Connectivity::Offline);
        assert_eq!(state.security_level(), SecurityLevel::Low);

        state.set_connectivity(Connectivity::Online);
        assert_eq!(state.security_level(), SecurityLevel::High);
    }

    #[test]
    fn test_low_clearance_session_is_low() {
        let state = SessionState::new(contractor_profile(), SessionConfig::default());
        assert_eq!(state.security_level(), SecurityLevel::Low);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::custom(100, 10));
        state.tick();
        let snap = state.snapshot();
        assert_eq!(snap.session_id, state.session_id());
        assert_eq!(snap.phase, SessionPhase::Running);
        assert_eq!(snap.remaining_secs, 99);
        assert!(!snap.warning_active);
        assert_eq!(snap.security_level, SecurityLevel::High);
        assert_eq!(
            snap.user.as_ref().map(|u| u.employee_id.as_str()),
            Some("EMP-1001")
        );
    }

    #[test]
    fn test_terminal_snapshot_has_no_user() {
        let mut state = SessionState::new(admin_profile(), SessionConfig::default());
        state.logout();
        let snap = state.snapshot();
        assert!(snap.user.is_none());
        assert_eq!(snap.phase, SessionPhase::LoggedOut);
        assert_eq!(snap.remaining_secs, 0);
        assert!(!snap.warning_active);
        assert_eq!(snap.security_level, SecurityLevel::Low);
    }

    #[test]
    fn test_config_clamping() {
        let config = SessionConfig::custom(0, 0);
        assert_eq!(config.timeout_secs, 1);
        assert_eq!(config.warning_secs, 0);

        let config = SessionConfig::custom(60, 60);
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.warning_secs, 59);

        let config = SessionConfig::custom(1800, 300);
        assert_eq!(config.timeout_secs, 1800);
        assert_eq!(config.warning_secs, 300);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(format!("{}", SessionPhase::Running), "RUNNING");
        assert_eq!(format!("{}", SessionPhase::Warning), "WARNING");
        assert_eq!(format!("{}", SessionPhase::Expired), "EXPIRED");
        assert_eq!(format!("{}", SessionPhase::LoggedOut), "LOGGED_OUT");
    }

    #[test]
    fn test_audit_string_contains_event_and_session() {
        let event = SessionEvent::Created {
            session_id: "sess_test_123".to_string(),
            employee_id: "EMP-1001".to_string(),
            timeout_secs: 1800,
            timestamp: Utc::now(),
        };
        let audit = event.to_audit_string();
        assert!(audit.contains("SESSION_CREATED"));
        assert!(audit.contains("session=sess_test_123"));
        assert!(audit.contains("employee=EMP-1001"));
        assert!(audit.contains("timeout=1800s"));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("sess_"));
    }
}
