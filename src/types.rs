// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Canonical types used across cleargate.
//!
//! This module provides unified type definitions to avoid duplication:
//! the authenticated principal record, connectivity state, and the
//! derived security level with its classification policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lowest assignable clearance tier.
pub const MIN_CLEARANCE_LEVEL: u8 = 1;

/// Highest assignable clearance tier.
pub const MAX_CLEARANCE_LEVEL: u8 = 5;

/// Identity and authorization facts for an authenticated principal.
///
/// Created by the credential verifier on a successful credential check
/// and owned by the session supervisor for the lifetime of the session.
/// Immutable after creation; the record is dropped on logout or forced
/// expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Opaque unique identifier for the principal.
    pub employee_id: String,
    /// Display name.
    pub name: String,
    /// Organizational unit, for display and authorization context.
    pub department: String,
    /// Job role, for display and authorization context.
    pub role: String,
    /// Access tier in `1..=5`; higher is more trusted.
    pub clearance_level: u8,
    /// Whether the login flow requires the OTP step for this principal.
    pub mfa_enabled: bool,
    /// Whether a government identity document has been verified.
    pub gov_id_verified: bool,
    /// Informational only; refreshed by the verifier at login.
    pub last_login: DateTime<Utc>,
}

impl UserProfile {
    /// Create a profile, clamping the clearance level into the valid range.
    ///
    /// Out-of-range clearance values are adjusted rather than rejected,
    /// with a logged warning.
    pub fn new(
        employee_id: impl Into<String>,
        name: impl Into<String>,
        department: impl Into<String>,
        role: impl Into<String>,
        clearance_level: u8,
    ) -> Self {
        let employee_id = employee_id.into();
        let clamped = clearance_level.clamp(MIN_CLEARANCE_LEVEL, MAX_CLEARANCE_LEVEL);
        if clamped != clearance_level {
            tracing::warn!(
                "CLEARANCE_CLAMPED | employee={} requested={} clamped={}",
                employee_id,
                clearance_level,
                clamped
            );
        }

        Self {
            employee_id,
            name: name.into(),
            department: department.into(),
            role: role.into(),
            clearance_level: clamped,
            mfa_enabled: false,
            gov_id_verified: false,
            last_login: Utc::now(),
        }
    }

    /// Require the OTP step at login.
    pub fn with_mfa(mut self) -> Self {
        self.mfa_enabled = true;
        self
    }

    /// Mark the government identity document as verified.
    pub fn with_gov_id_verified(mut self) -> Self {
        self.gov_id_verified = true;
        self
    }
}

/// Connectivity state reported by the embedding environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl std::fmt::Display for Connectivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connectivity::Online => write!(f, "ONLINE"),
            Connectivity::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Derived security classification for a live session.
/// Ordered by strength: Low < Medium < High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

impl SecurityLevel {
    /// Classify a session from its independent signals.
    ///
    /// The policy is evaluated top-down, first match wins:
    /// 1. offline sessions are always `Low`;
    /// 2. clearance >= 4 with MFA and a verified government ID is `High`;
    /// 3. clearance >= 3 with MFA is `Medium`;
    /// 4. everything else is `Low`.
    ///
    /// Pure function of its inputs; the supervisor recomputes it on every
    /// relevant state change rather than storing it.
    pub fn evaluate(connectivity: Connectivity, profile: &UserProfile) -> Self {
        if !connectivity.is_online() {
            return SecurityLevel::Low;
        }
        if profile.clearance_level >= 4 && profile.mfa_enabled && profile.gov_id_verified {
            return SecurityLevel::High;
        }
        if profile.clearance_level >= 3 && profile.mfa_enabled {
            return SecurityLevel::Medium;
        }
        SecurityLevel::Low
    }

    /// Convert level to its wire/display representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(clearance: u8, mfa: bool, gov_id: bool) -> UserProfile {
        let mut p = UserProfile::new("EMP-0001", "Test User", "Operations", "Analyst", clearance);
        p.mfa_enabled = mfa;
        p.gov_id_verified = gov_id;
        p
    }

    #[test]
    fn test_clearance_clamping() {
        let low = UserProfile::new("EMP-0002", "A", "B", "C", 0);
        assert_eq!(low.clearance_level, MIN_CLEARANCE_LEVEL);

        let high = UserProfile::new("EMP-0003", "A", "B", "C", 9);
        assert_eq!(high.clearance_level, MAX_CLEARANCE_LEVEL);

        let ok = UserProfile::new("EMP-0004", "A", "B", "C", 3);
        assert_eq!(ok.clearance_level, 3);
    }

    #[test]
    fn test_security_level_offline_wins() {
        // Offline forces Low regardless of every other signal.
        let p = profile(5, true, true);
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Online, &p),
            SecurityLevel::High
        );
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Offline, &p),
            SecurityLevel::Low
        );
    }

    #[test]
    fn test_security_level_high_requires_all_three() {
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Online, &profile(4, true, true)),
            SecurityLevel::High
        );
        // Missing gov ID drops to Medium.
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Online, &profile(4, true, false)),
            SecurityLevel::Medium
        );
        // Missing MFA drops to Low even at top clearance.
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Online, &profile(5, false, true)),
            SecurityLevel::Low
        );
    }

    #[test]
    fn test_security_level_medium_boundary() {
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Online, &profile(3, true, false)),
            SecurityLevel::Medium
        );
        // Clearance 2 never reaches Medium.
        assert_eq!(
            SecurityLevel::evaluate(Connectivity::Online, &profile(2, true, true)),
            SecurityLevel::Low
        );
    }

    #[test]
    fn test_security_level_is_deterministic() {
        let p = profile(4, true, true);
        let first = SecurityLevel::evaluate(Connectivity::Online, &p);
        for _ in 0..100 {
            assert_eq!(SecurityLevel::evaluate(Connectivity::Online, &p), first);
        }
    }

    #[test]
    fn test_security_level_ordering() {
        assert!(SecurityLevel::Low < SecurityLevel::Medium);
        assert!(SecurityLevel::Medium < SecurityLevel::High);
    }

    #[test]
    fn test_display_representations() {
        assert_eq!(format!("{}", SecurityLevel::High), "HIGH");
        assert_eq!(format!("{}", SecurityLevel::Medium), "MEDIUM");
        assert_eq!(format!("{}", SecurityLevel::Low), "LOW");
        assert_eq!(format!("{}", Connectivity::Online), "ONLINE");
        assert_eq!(format!("{}", Connectivity::Offline), "OFFLINE");
    }
}
