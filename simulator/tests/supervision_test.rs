//! Supervision tests - pool failure and recovery
//!
//! These tests inject faults into a running tree and verify:
//! - Any pendulum failure or exit fails the whole pool
//! - The orchestrator clears the store and emits an `error` event
//! - A fresh pool is spawned exactly once and accepts commands

use std::sync::Arc;

use pendulum_simulator::actors::protocol::{now_millis, Envelope, Payload};
use pendulum_simulator::actors::PendulumMsg;
use pendulum_simulator::supervisor::{OrchestratorMsg, PoolSupervisorMsg};
use pendulum_simulator::{EngineConfig, SimulationHandle};
use ractor::ActorRef;
use shared_types::{
    AggregateStatus, PendulumOptions, Position, SimulationEvent, SimulationOptions, WindOptions,
    ANCHOR_LINE_Y,
};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout, Duration};

fn far_apart_options(count: usize) -> SimulationOptions {
    SimulationOptions {
        pendulums: (0..count)
            .map(|i| PendulumOptions {
                angle: 0.3,
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
    SimulationHandle::spawn(config).await.unwrap()
}

async fn pool_supervisor(handle: &SimulationHandle) -> ActorRef<PoolSupervisorMsg> {
    ractor::call_t!(
        handle.orchestrator(),
        |reply| OrchestratorMsg::GetSupervisor { reply },
        1000
    )
    .unwrap()
    .expect("pool supervisor should be alive")
}

async fn pendulums(supervisor: &ActorRef<PoolSupervisorMsg>) -> Vec<ActorRef<PendulumMsg>> {
    ractor::call_t!(supervisor, |reply| PoolSupervisorMsg::GetPendulums { reply }, 1000).unwrap()
}

async fn next_error(events: &mut broadcast::Receiver<SimulationEvent>) -> String {
    timeout(Duration::from_secs(3), async {
        loop {
            match events.recv().await {
                Ok(SimulationEvent::Error { message }) => return message,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("error event within three seconds")
}

#[tokio::test]
async fn test_fresh_engine_is_healthy() {
    let handle = spawn_engine(3).await;

    let health = handle.health().await.unwrap();
    assert!(health.supervisor_alive);
    assert_eq!(health.supervisor_restarts, 0);
    assert_eq!(health.last_failure, None);

    let supervisor = pool_supervisor(&handle).await;
    assert_eq!(pendulums(&supervisor).await.len(), 3);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pendulum_exit_restarts_pool() {
    let handle = spawn_engine(3).await;
    let mut events = handle.subscribe();
    handle.start(far_apart_options(3)).await.unwrap();

    let supervisor = pool_supervisor(&handle).await;
    let pool = pendulums(&supervisor).await;
    pool[1].stop(Some("injected fault".to_string()));

    let message = next_error(&mut events).await;
    assert!(message.contains("pendulum #1"), "unexpected message: {message}");
    assert!(message.contains("injected fault"), "unexpected message: {message}");

    let health = handle.health().await.unwrap();
    assert!(health.supervisor_alive);
    assert_eq!(health.supervisor_restarts, 1);
    assert!(health.last_failure.is_some());

    let snapshot = handle.status();
    assert_eq!(snapshot.status, AggregateStatus::Idle);

    let replacement = pool_supervisor(&handle).await;
    assert_ne!(replacement.get_id(), supervisor.get_id());

    let snapshot = handle.start(far_apart_options(3)).await.unwrap();
    assert_eq!(snapshot.status, AggregateStatus::Running);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_finite_motion_fails_pool_once() {
    let handle = spawn_engine(2).await;
    let mut events = handle.subscribe();

    // Bypass option validation to make pendulum #0 compute NaN on its next tick.
    let mut broken = far_apart_options(2);
    broken.pendulums[0].length = 0.0;
    let supervisor = pool_supervisor(&handle).await;
    let envelope = Envelope::command(
        now_millis(),
        Payload::Start {
            options: Arc::new(broken),
        },
    );
    ractor::call_t!(
        supervisor,
        |reply| PoolSupervisorMsg::Dispatch { envelope, reply },
        1000
    )
    .unwrap()
    .unwrap();

    let message = next_error(&mut events).await;
    assert!(message.contains("non-finite"), "unexpected message: {message}");

    // Give a duplicate failure report time to show up.
    sleep(Duration::from_millis(200)).await;
    let health = handle.health().await.unwrap();
    assert_eq!(health.supervisor_restarts, 1);

    let snapshot = handle.status();
    assert_eq!(snapshot.status, AggregateStatus::Idle);
    assert_eq!(snapshot.states[0].angle, 0.3);

    handle.start(far_apart_options(2)).await.unwrap();
    assert_eq!(handle.status().status, AggregateStatus::Running);

    handle.shutdown().await.unwrap();
}
