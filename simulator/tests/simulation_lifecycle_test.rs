//! Lifecycle tests - start, pause, resume and stop through the handle
//!
//! These tests drive a real actor tree:
//! - Commands are gated on the aggregate pool status
//! - Status reads observe a command as soon as it returns
//! - Pause freezes the harmonic phase and resume continues it
//! - Stop is idempotent

use pendulum_simulator::{EngineConfig, SimulationError, SimulationHandle};
use shared_types::{
    AggregateStatus, PendulumOptions, PendulumStatus, Position, SimulationEvent,
    SimulationOptions, WindOptions, ANCHOR_LINE_Y,
};
use tokio::time::{sleep, timeout, Duration};

const AMPLITUDE: f64 = 0.3;

/// Pendulums a meter apart; they never touch.
fn far_apart_options(count: usize) -> SimulationOptions {
    SimulationOptions {
        pendulums: (0..count)
            .map(|i| PendulumOptions {
                angle: AMPLITUDE,
                mass: 0.2,
                radius: 0.02,
                length: 0.3,
                anchor: Position::new(i as f64, ANCHOR_LINE_Y),
            })
            .collect(),
        wind: WindOptions::default(),
    }
}

async fn spawn_engine(count: usize) -> SimulationHandle {
    let config = EngineConfig::default().with_initial_options(far_apart_options(count));
    SimulationHandle::spawn(config)
        .await
        .expect("engine should spawn")
}

fn assert_all(handle: &SimulationHandle, status: PendulumStatus) {
    let snapshot = handle.status();
    assert!(
        snapshot.states.iter().all(|state| state.status == status),
        "expected every pendulum {status}, got {:?}",
        snapshot.states
    );
}

#[tokio::test]
async fn test_engine_boots_idle_at_initial_positions() {
    let handle = spawn_engine(3).await;

    let snapshot = handle.status();
    assert_eq!(snapshot.status, AggregateStatus::Idle);
    assert_eq!(snapshot.states.len(), 3);
    for state in &snapshot.states {
        assert_eq!(state.angle, AMPLITUDE);
        assert!(state.position.y > ANCHOR_LINE_Y);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_reports_running_near_initial_angle() {
    let handle = spawn_engine(3).await;

    let snapshot = handle.start(far_apart_options(3)).await.unwrap();
    assert_eq!(snapshot.status, AggregateStatus::Running);
    for state in &snapshot.states {
        assert!(
            (state.angle - AMPLITUDE).abs() < 0.05 * AMPLITUDE,
            "angle {} drifted from the initial angle",
            state.angle
        );
    }
    assert_all(&handle, PendulumStatus::Running);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pause_freezes_and_resume_continues_phase() {
    let handle = spawn_engine(2).await;
    handle.start(far_apart_options(2)).await.unwrap();

    sleep(Duration::from_millis(150)).await;
    handle.pause().await.unwrap();
    assert_all(&handle, PendulumStatus::Paused);
    let paused = handle.status().states;

    sleep(Duration::from_millis(300)).await;
    let still_paused = handle.status().states;
    for (before, after) in paused.iter().zip(&still_paused) {
        assert_eq!(before.angle, after.angle, "angle moved while paused");
    }

    handle.resume().await.unwrap();
    let resumed = handle.status();
    assert_eq!(resumed.status, AggregateStatus::Running);
    // At most a couple of ticks separate the resume from this read.
    for (before, after) in paused.iter().zip(&resumed.states) {
        assert!(
            (before.angle - after.angle).abs() < 0.1,
            "resume jumped from {} to {}",
            before.angle,
            after.angle
        );
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_resets_and_is_idempotent() {
    let handle = spawn_engine(2).await;

    // Stopping an idle pool is a no-op.
    handle.stop().await.unwrap();

    handle.start(far_apart_options(2)).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    handle.stop().await.unwrap();

    let snapshot = handle.status();
    assert_eq!(snapshot.status, AggregateStatus::Idle);
    for state in &snapshot.states {
        assert_eq!(state.angle, AMPLITUDE);
    }

    handle.stop().await.unwrap();
    assert_all(&handle, PendulumStatus::Idle);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_commands_are_gated_on_pool_status() {
    let handle = spawn_engine(2).await;

    assert_eq!(handle.pause().await, Err(SimulationError::NotRunning));
    assert_eq!(handle.resume().await, Err(SimulationError::NotPaused));

    handle.start(far_apart_options(2)).await.unwrap();
    assert_eq!(
        handle.start(far_apart_options(2)).await.unwrap_err(),
        SimulationError::AlreadyRunning
    );
    assert_eq!(handle.resume().await, Err(SimulationError::NotPaused));

    handle.pause().await.unwrap();
    assert_eq!(handle.pause().await, Err(SimulationError::NotRunning));
    assert_eq!(
        handle.start(far_apart_options(2)).await.unwrap_err(),
        SimulationError::AlreadyRunning
    );

    handle.resume().await.unwrap();
    assert_all(&handle, PendulumStatus::Running);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_rejects_invalid_options() {
    let handle = spawn_engine(2).await;

    let err = handle.start(far_apart_options(3)).await.unwrap_err();
    assert!(matches!(err, SimulationError::InvalidOptions(_)));

    let mut options = far_apart_options(2);
    options.pendulums[0].length = 0.0;
    let err = handle.start(options).await.unwrap_err();
    assert!(matches!(err, SimulationError::InvalidOptions(_)));

    let snapshot = handle.status();
    assert_eq!(snapshot.status, AggregateStatus::Idle);
    assert_eq!(snapshot.options, far_apart_options(2));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_start_replaces_options_and_streams_events() {
    let handle = spawn_engine(2).await;
    let mut events = handle.subscribe();

    let mut options = far_apart_options(2);
    options.pendulums[1].angle = -0.2;
    handle.start(options.clone()).await.unwrap();
    assert_eq!(handle.status().options, options);

    let first = timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("options event in time")
        .unwrap();
    assert_eq!(first, SimulationEvent::Options { options });

    let mut seen = [false; 2];
    timeout(Duration::from_secs(2), async {
        while seen.iter().any(|seen| !seen) {
            if let Ok(SimulationEvent::State { index, state, .. }) = events.recv().await {
                assert_eq!(state.status, PendulumStatus::Running);
                seen[index] = true;
            }
        }
    })
    .await
    .expect("state events from every pendulum");

    handle.shutdown().await.unwrap();
}
