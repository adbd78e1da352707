// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Supervised session lifecycle.
//!
//! Owns everything that happens after a successful login: the rolling
//! countdown to forced logout, the pre-expiry warning window,
//! activity-triggered renewal, connectivity tracking, and the derived
//! security level.
//!
//! # Architecture
//!
//! ```text
//! ticks (1 Hz) ──┐
//! activity ──────┤   ┌──────────────────┐      ┌───────────────────┐
//! extend ────────┼──▶│ command queue    │─────▶│ worker task       │
//! connectivity ──┤   │ (mpsc, in order) │      │ owns SessionState │
//! logout ────────┘   └──────────────────┘      └─────────┬─────────┘
//!                                                        │ snapshot on change
//!                                                        ▼
//!                                              ┌───────────────────┐
//!                                              │ watch channel     │──▶ consumers
//!                                              │ (SessionSnapshot) │
//!                                              └───────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use cleargate::session::{SessionConfig, SessionSupervisor};
//! use cleargate::verifier::CredentialVerifier;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = CredentialVerifier::demo_directory();
//! let profile = verifier.verify_credentials("EMP-3360", "harbor-pine-23")?;
//!
//! // Spawn the supervisor (starts the worker and the 1 Hz clock)
//! let session = SessionSupervisor::spawn(profile, SessionConfig::default());
//!
//! // Observe state
//! let mut updates = session.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snap = updates.borrow().clone();
//!     if snap.warning_active {
//!         session.extend_session();
//!     }
//!     if snap.phase.is_terminal() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod state;
pub mod supervisor;

// Re-export commonly used items
pub use state::{
    RenewalKind, SessionConfig, SessionEvent, SessionPhase, SessionSnapshot, SessionState,
    DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_WARNING_BEFORE_TIMEOUT_SECS,
};
pub use supervisor::SessionSupervisor;
