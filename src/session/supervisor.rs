// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session supervisor: the single writer over a session's state.
//!
//! Every mutation (ticks from the clock, activity signals, the extend
//! action, connectivity changes, logout) travels through one command
//! queue and is applied by one worker task, strictly in arrival order.
//! Producers never block and never touch the state directly; they
//! observe it through the [`watch`] channel, which carries a fresh
//! [`SessionSnapshot`] whenever an applied command changes one.
//!
//! The clock is a separate 1 Hz ticker task feeding `Tick` commands
//! into the same queue, so ticks and activity interleave exactly as
//! received. When the session reaches a terminal phase the worker
//! aborts the ticker and exits; commands sent after that are dropped.
//!
//! ## Usage
//!
//! ```no_run
//! use cleargate::session::{SessionConfig, SessionSupervisor};
//! use cleargate::verifier::CredentialVerifier;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = CredentialVerifier::demo_directory();
//! let profile = verifier.verify_credentials("EMP-3360", "harbor-pine-23")?;
//!
//! let session = SessionSupervisor::spawn(profile, SessionConfig::default());
//! session.record_activity(); // forwarded pointer/key/click events
//!
//! let snapshot = session.snapshot();
//! println!("{}s remaining at {}", snapshot.remaining_secs, snapshot.security_level);
//!
//! session.logout();
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use crate::session::state::{SessionConfig, SessionSnapshot, SessionState};
use crate::types::{Connectivity, UserProfile};

/// Seconds between clock ticks.
const TICK_PERIOD_SECS: u64 = 1;

/// Commands applied by the supervisor worker, in arrival order.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Advance the clock by one second.
    Tick,
    /// Passive activity detected; reset the clock.
    RecordActivity,
    /// Explicit extend action from the warning prompt.
    ExtendSession,
    /// Connectivity signal changed.
    SetConnectivity(Connectivity),
    /// End the session.
    Logout,
}

/// Cloneable handle to a supervised session.
///
/// All methods are non-blocking: commands are queued for the worker and
/// state is read from the latest published snapshot. Once the session
/// ends, commands are silently dropped and the final snapshot remains
/// readable.
#[derive(Debug, Clone)]
pub struct SessionSupervisor {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionSupervisor {
    /// Start supervising a session for an authenticated principal,
    /// driven by a real 1 Hz clock.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(profile: UserProfile, config: SessionConfig) -> Self {
        Self::launch(SessionState::new(profile, config), None)
    }

    /// Start supervising with an injected tick source instead of the
    /// real clock: one `()` received on `ticks` advances the session by
    /// one second. Made for deterministic tests.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_with_ticks(
        profile: UserProfile,
        config: SessionConfig,
        ticks: mpsc::Receiver<()>,
    ) -> Self {
        Self::launch(SessionState::new(profile, config), Some(ticks))
    }

    fn launch(state: SessionState, injected_ticks: Option<mpsc::Receiver<()>>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());

        let ticker = match injected_ticks {
            None => spawn_interval_ticker(command_tx.clone()),
            Some(ticks) => spawn_tick_forwarder(ticks, command_tx.clone()),
        };

        tokio::spawn(async move {
            Self::supervise(state, command_rx, snapshot_tx, ticker).await;
        });

        Self {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    /// Reset the clock on detected user activity.
    pub fn record_activity(&self) {
        let _ = self.commands.send(SessionCommand::RecordActivity);
    }

    /// Reset the clock from the warning prompt.
    pub fn extend_session(&self) {
        let _ = self.commands.send(SessionCommand::ExtendSession);
    }

    /// Report a connectivity change.
    pub fn set_connectivity(&self, connectivity: Connectivity) {
        let _ = self
            .commands
            .send(SessionCommand::SetConnectivity(connectivity));
    }

    /// End the session. The ticker stops promptly; no further ticks
    /// fire after the terminal snapshot is published.
    pub fn logout(&self) {
        let _ = self.commands.send(SessionCommand::Logout);
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot updates.
    ///
    /// The receiver always holds the latest snapshot; a slow consumer
    /// observes the newest state, never a backlog.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Snapshot updates as a [`Stream`](tokio_stream::Stream), starting
    /// from the current snapshot.
    pub fn snapshot_stream(&self) -> WatchStream<SessionSnapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    /// True while the session is still counting down.
    pub fn is_active(&self) -> bool {
        self.snapshots.borrow().phase.is_active()
    }

    /// Identifier of the supervised session.
    pub fn session_id(&self) -> String {
        self.snapshots.borrow().session_id.clone()
    }

    /// Wait for the session to end, returning the terminal snapshot.
    pub async fn terminated(&self) -> SessionSnapshot {
        let mut snapshots = self.snapshots.clone();
        loop {
            if snapshots.borrow().phase.is_terminal() {
                return snapshots.borrow().clone();
            }
            if snapshots.changed().await.is_err() {
                // Worker exited; the last snapshot is final.
                return snapshots.borrow().clone();
            }
        }
    }

    /// Worker loop: applies commands one at a time and publishes a
    /// snapshot after each one that changes the observable state, so
    /// observers see effects in the order the commands arrived and
    /// no-op commands never wake a subscriber.
    async fn supervise(
        mut state: SessionState,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        snapshots: watch::Sender<SessionSnapshot>,
        ticker: JoinHandle<()>,
    ) {
        while let Some(command) = commands.recv().await {
            match command {
                SessionCommand::Tick => state.tick(),
                SessionCommand::RecordActivity => state.record_activity(),
                SessionCommand::ExtendSession => state.extend_session(),
                SessionCommand::SetConnectivity(connectivity) => {
                    state.set_connectivity(connectivity)
                }
                SessionCommand::Logout => state.logout(),
            };

            let next = state.snapshot();
            snapshots.send_if_modified(|current| {
                if *current == next {
                    false
                } else {
                    *current = next;
                    true
                }
            });

            if state.phase().is_terminal() {
                break;
            }
        }

        ticker.abort();
        tracing::debug!(
            "SESSION_SUPERVISOR_STOPPED | session={} phase={}",
            state.session_id(),
            state.phase()
        );
    }
}

/// Spawn the real 1 Hz clock feeding `Tick` commands into the queue.
///
/// The first decrement lands one full period after start; a stalled
/// runtime catches back up to wall time on resume.
fn spawn_interval_ticker(commands: mpsc::UnboundedSender<SessionCommand>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TICK_PERIOD_SECS));
        // The first interval tick completes immediately; swallow it so
        // the countdown starts at the configured timeout, not one below.
        interval.tick().await;
        loop {
            interval.tick().await;
            if commands.send(SessionCommand::Tick).is_err() {
                break;
            }
        }
    })
}

/// Forward injected test ticks into the command queue.
fn spawn_tick_forwarder(
    mut ticks: mpsc::Receiver<()>,
    commands: mpsc::UnboundedSender<SessionCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while ticks.recv().await.is_some() {
            if commands.send(SessionCommand::Tick).is_err() {
                break;
            }
        }
    })
}

// =============================================================================
// TESTS
// =============================================================================
