// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Race Detection Tests for cleargate
//!
//! These tests hammer the session supervisor from many tasks at once to
//! verify the single-writer design: every mutation is serialized through
//! the command queue, and every published snapshot is internally
//! consistent. They are designed to detect data races when run with
//! ThreadSanitizer (TSAN).
//!
//! # Running with ThreadSanitizer
//!
//! ```bash
//! # On Linux with nightly Rust:
//! RUSTFLAGS="-Z sanitizer=thread" cargo +nightly test --target x86_64-unknown-linux-gnu --test supervisor_race_tests
//!
//! # Or use cargo-careful for additional checks:
//! cargo install cargo-careful
//! cargo careful test --test supervisor_race_tests
//! ```
//!
//! # Test Categories
//!
//! - Renewal commands racing the session clock
//! - Snapshot consistency under read contention
//! - Concurrent logout idempotence
//! - Whole-session churn in parallel

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use cleargate::{
    Connectivity, CredentialVerifier, SessionConfig, SessionPhase, SessionSnapshot,
    SessionSupervisor, UserProfile, DEFAULT_SESSION_TIMEOUT_SECS,
};

// Test configuration
const CONCURRENCY_LEVEL: usize = 100;
const ITERATIONS_PER_TASK: usize = 50;
const TEST_TIMEOUT_SECS: u64 = 30;

fn demo_profile() -> UserProfile {
    CredentialVerifier::demo_directory()
        .verify_credentials("EMP-1001", "argon-horizon-51")
        .expect("demo credentials rejected")
}

/// Wait until the published snapshot satisfies `pred`.
async fn settle<F>(session: &SessionSupervisor, pred: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    let mut rx = session.subscribe();
    timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        loop {
            {
                let snap = rx.borrow_and_update();
                if pred(&snap) {
                    return snap.clone();
                }
            }
            rx.changed().await.expect("supervisor closed early");
        }
    })
    .await
    .expect("snapshot did not settle in time")
}

// =============================================================================
// RENEWALS RACING THE CLOCK
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_renewals_with_injected_ticks() {
    let (tick_tx, tick_rx) = mpsc::channel(64);
    let session =
        SessionSupervisor::spawn_with_ticks(demo_profile(), SessionConfig::default(), tick_rx);

    let mut handles = vec![];

    // One clock: fewer total ticks than the timeout, so expiry is
    // impossible no matter how the queue interleaves.
    let total_ticks: u64 = 500;
    handles.push(tokio::spawn(async move {
        for _ in 0..total_ticks {
            if tick_tx.send(()).await.is_err() {
                break;
            }
        }
    }));

    for i in 0..CONCURRENCY_LEVEL {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..ITERATIONS_PER_TASK {
                match (i + j) % 4 {
                    0 => session.record_activity(),
                    1 => session.extend_session(),
                    2 => session.set_connectivity(Connectivity::Online),
                    _ => {
                        let _ = session.snapshot();
                    }
                }
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in handles {
            handle.await.expect("Task panicked");
        }
    })
    .await;
    assert!(result.is_ok(), "Test timed out");

    // A marker command flushes the queue: everything enqueued above has
    // been applied by the time it is visible.
    session.set_connectivity(Connectivity::Offline);
    let snap = settle(&session, |s| s.connectivity == Connectivity::Offline).await;

    assert!(snap.phase.is_active(), "session must survive the ticks");
    assert!(snap.remaining_secs >= DEFAULT_SESSION_TIMEOUT_SECS - total_ticks);
    assert!(snap.remaining_secs <= DEFAULT_SESSION_TIMEOUT_SECS);

    println!(
        "Survived {} ticks against {} racing commands: {}s remaining",
        total_ticks,
        CONCURRENCY_LEVEL * ITERATIONS_PER_TASK,
        snap.remaining_secs
    );

    session.logout();
    session.terminated().await;
}

// =============================================================================
// SNAPSHOT CONSISTENCY UNDER READ CONTENTION
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_consistency_under_read_contention() {
    let (tick_tx, tick_rx) = mpsc::channel(8);
    // Short timeout with a wide warning window, so the writer cycles the
    // session in and out of the warning phase while readers watch.
    let config = SessionConfig::custom(8, 5);
    let session = SessionSupervisor::spawn_with_ticks(demo_profile(), config, tick_rx);

    let mut handles = vec![];
    let reads = Arc::new(AtomicU64::new(0));

    // Readers: every observed snapshot must be internally consistent,
    // because derived fields are computed from the same state the rest
    // of the snapshot was copied from.
    for _ in 0..CONCURRENCY_LEVEL {
        let session = session.clone();
        let reads = reads.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..ITERATIONS_PER_TASK {
                let snap = session.snapshot();
                assert_eq!(
                    snap.warning_active,
                    snap.phase == SessionPhase::Warning,
                    "derived warning flag drifted from the phase"
                );
                assert_eq!(snap.phase.is_active(), snap.user.is_some());
                reads.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    // One writer: five ticks into the warning window, then a renewal
    // back out. Ticks reach the queue through the forwarder task while
    // renewals go in directly, with no ordering between the two
    // producers, so each phase must settle before the next begins.
    // That holds the countdown floor at 3s and expiry cannot happen.
    let writer = session.clone();
    handles.push(tokio::spawn(async move {
        for _ in 0..ITERATIONS_PER_TASK {
            for _ in 0..5 {
                if tick_tx.send(()).await.is_err() {
                    return;
                }
            }
            settle(&writer, |s| s.remaining_secs == 3).await;

            writer.record_activity();
            settle(&writer, |s| s.remaining_secs == 8).await;
        }
    }));

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in handles {
            handle.await.expect("Task panicked");
        }
    })
    .await;
    assert!(result.is_ok(), "Test timed out");

    let total_reads = reads.load(Ordering::Relaxed);
    assert_eq!(total_reads, (CONCURRENCY_LEVEL * ITERATIONS_PER_TASK) as u64);

    session.logout();
    let snap = session.terminated().await;
    assert_eq!(snap.phase, SessionPhase::LoggedOut);
    assert!(snap.user.is_none());

    println!("Checked {} snapshots under contention", total_reads);
}

// =============================================================================
// CONCURRENT LOGOUT IDEMPOTENCE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_logout_storm_settles_cleanly() {
    let (_tick_tx, tick_rx) = mpsc::channel(8);
    let session =
        SessionSupervisor::spawn_with_ticks(demo_profile(), SessionConfig::default(), tick_rx);

    let mut handles = vec![];
    for i in 0..CONCURRENCY_LEVEL {
        let session = session.clone();
        handles.push(tokio::spawn(async move {
            if i % 2 == 0 {
                session.logout();
            } else {
                session.record_activity();
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in handles {
            handle.await.expect("Task panicked");
        }
    })
    .await;
    assert!(result.is_ok(), "Test timed out");

    let snap = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), session.terminated())
        .await
        .expect("session never terminated");
    assert_eq!(snap.phase, SessionPhase::LoggedOut);
    assert_eq!(snap.remaining_secs, 0);
    assert!(snap.user.is_none());

    // Late commands cannot revive a terminal session.
    session.record_activity();
    session.extend_session();
    tokio::task::yield_now().await;
    assert_eq!(session.snapshot().phase, SessionPhase::LoggedOut);

    println!(
        "{} concurrent logout/activity signals settled cleanly",
        CONCURRENCY_LEVEL
    );
}

// =============================================================================
// WHOLE-SESSION CHURN
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_session_churn() {
    let verifier = Arc::new(CredentialVerifier::demo_directory());
    let mut handles = vec![];

    for i in 0..CONCURRENCY_LEVEL {
        let verifier = verifier.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..ITERATIONS_PER_TASK / 10 {
                let profile = verifier
                    .verify_credentials("EMP-3360", "harbor-pine-23")
                    .expect("demo credentials rejected");

                let (_tick_tx, tick_rx) = mpsc::channel(1);
                let session =
                    SessionSupervisor::spawn_with_ticks(profile, SessionConfig::default(), tick_rx);
                session.record_activity();
                if i % 2 == 0 {
                    session.set_connectivity(Connectivity::Offline);
                }
                session.logout();

                let snap = session.terminated().await;
                assert_eq!(snap.phase, SessionPhase::LoggedOut);
                assert!(snap.user.is_none());
            }
        }));
    }

    let result = timeout(Duration::from_secs(TEST_TIMEOUT_SECS), async {
        for handle in handles {
            handle.await.expect("Task panicked");
        }
    })
    .await;
    assert!(result.is_ok(), "Test timed out");

    println!(
        "Churned {} sessions through spawn/logout",
        CONCURRENCY_LEVEL * (ITERATIONS_PER_TASK / 10)
    );
}
