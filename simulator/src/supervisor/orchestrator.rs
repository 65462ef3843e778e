//! Orchestrator - root of the simulation supervision tree
//!
//! Gates collaborator commands on the aggregate pool status, owns the active
//! options, relays pendulum notifications as collaborator events and
//! rebuilds the pool whenever its supervisor fails.

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use serde::Serialize;
use shared_types::{PendulumStatus, SimulationEvent, SimulationOptions, SimulationSnapshot};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, trace, warn};

use crate::actors::protocol::{now_millis, Envelope, Origin, Payload};
use crate::config::EngineConfig;
use crate::error::SimulationError;
use crate::state_store::SharedStateStore;
use crate::supervisor::pool::{PoolSupervisor, PoolSupervisorArgs, PoolSupervisorMsg};

pub type CommandReply = RpcReplyPort<Result<(), SimulationError>>;

#[derive(Debug, Default)]
pub struct Orchestrator;

pub struct OrchestratorArgs {
    pub store: Arc<SharedStateStore>,
    pub config: EngineConfig,
    pub events: broadcast::Sender<SimulationEvent>,
    pub options_tx: watch::Sender<Arc<SimulationOptions>>,
}

pub struct OrchestratorState {
    pub store: Arc<SharedStateStore>,
    pub config: EngineConfig,
    pub options: Arc<SimulationOptions>,
    pub events: broadcast::Sender<SimulationEvent>,
    pub options_tx: watch::Sender<Arc<SimulationOptions>>,
    pub supervisor: Option<ActorRef<PoolSupervisorMsg>>,
    /// Identifier of the current run, for log correlation
    pub run_id: Option<ulid::Ulid>,
    pub supervisor_restarts: u64,
    pub last_failure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorHealth {
    pub supervisor_alive: bool,
    pub supervisor_restarts: u64,
    pub last_failure: Option<String>,
}

#[derive(Debug)]
pub enum OrchestratorMsg {
    Start {
        options: SimulationOptions,
        reply: RpcReplyPort<Result<SimulationSnapshot, SimulationError>>,
    },
    Stop {
        reply: CommandReply,
    },
    Pause {
        reply: CommandReply,
    },
    Resume {
        reply: CommandReply,
    },
    GetStatus {
        reply: RpcReplyPort<SimulationSnapshot>,
    },
    /// Message routed up from the pool
    Notify(Envelope),
    GetHealth {
        reply: RpcReplyPort<OrchestratorHealth>,
    },
    GetSupervisor {
        reply: RpcReplyPort<Option<ActorRef<PoolSupervisorMsg>>>,
    },
}

/// Collaborator commands subject to status gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Pause,
    Resume,
}

/// Check that every pendulum is in a status the command applies to.
pub fn check_precondition(
    command: Command,
    statuses: &[PendulumStatus],
) -> Result<(), SimulationError> {
    let all = |accept: fn(PendulumStatus) -> bool| statuses.iter().copied().all(accept);
    match command {
        Command::Start if all(|s| s == PendulumStatus::Idle) => Ok(()),
        Command::Start => Err(SimulationError::AlreadyRunning),
        Command::Stop if all(PendulumStatus::is_simulating) => Ok(()),
        Command::Stop => Err(SimulationError::NotRunning),
        Command::Pause if all(|s| s == PendulumStatus::Running) => Ok(()),
        Command::Pause => Err(SimulationError::NotRunning),
        Command::Resume if all(|s| s == PendulumStatus::Paused) => Ok(()),
        Command::Resume => Err(SimulationError::NotPaused),
    }
}

/// Reject options the pool cannot simulate.
pub fn validate_options(
    options: &SimulationOptions,
    pool_size: usize,
) -> Result<(), SimulationError> {
    if options.len() != pool_size {
        return Err(SimulationError::InvalidOptions(format!(
            "expected {pool_size} pendulums, got {}",
            options.len()
        )));
    }

    for (index, pendulum) in options.pendulums.iter().enumerate() {
        let values = [
            pendulum.angle,
            pendulum.mass,
            pendulum.radius,
            pendulum.length,
            pendulum.anchor.x,
            pendulum.anchor.y,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            return Err(SimulationError::InvalidOptions(format!(
                "pendulum #{index} has a non-finite value"
            )));
        }
        if pendulum.length <= 0.0 {
            return Err(SimulationError::InvalidOptions(format!(
                "pendulum #{index} length must be positive"
            )));
        }
        if pendulum.mass <= 0.0 {
            return Err(SimulationError::InvalidOptions(format!(
                "pendulum #{index} mass must be positive"
            )));
        }
        if pendulum.radius < 0.0 {
            return Err(SimulationError::InvalidOptions(format!(
                "pendulum #{index} radius must not be negative"
            )));
        }
    }

    if !options.wind.direction.is_finite() || !options.wind.velocity.is_finite() {
        return Err(SimulationError::InvalidOptions(
            "wind has a non-finite value".to_string(),
        ));
    }
    Ok(())
}

/// Options plus the last published state of every pendulum.
pub fn snapshot(store: &SharedStateStore, options: &SimulationOptions) -> SimulationSnapshot {
    SimulationSnapshot {
        options: options.clone(),
        status: store.aggregate_status(),
        states: store.snapshot(),
    }
}

impl Orchestrator {
    async fn spawn_supervisor(
        &self,
        myself: &ActorRef<OrchestratorMsg>,
        state: &OrchestratorState,
    ) -> Result<ActorRef<PoolSupervisorMsg>, ActorProcessingErr> {
        let args = PoolSupervisorArgs {
            store: Arc::clone(&state.store),
            options: Arc::clone(&state.options),
            orchestrator: myself.clone(),
            tick_interval: state.config.tick_interval,
            restart_timeout: state.config.restart_timeout,
            command_timeout: state.config.command_timeout,
        };

        let (supervisor, _handle) =
            Actor::spawn_linked(None, PoolSupervisor, args, myself.get_cell())
                .await
                .map_err(|e| {
                    error!("Failed to spawn PoolSupervisor: {}", e);
                    ActorProcessingErr::from(e)
                })?;

        info!(
            orchestrator = %myself.get_id(),
            supervisor = %supervisor.get_id(),
            "PoolSupervisor spawned as child"
        );
        Ok(supervisor)
    }

    /// Hand a command to every pendulum and wait until all applied it.
    async fn dispatch(
        &self,
        state: &OrchestratorState,
        payload: Payload,
    ) -> Result<(), SimulationError> {
        let supervisor = state
            .supervisor
            .as_ref()
            .ok_or(SimulationError::PoolUnavailable)?;
        let envelope = Envelope::command(now_millis(), payload);
        let timeout = state.config.command_timeout.saturating_mul(2);
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        ractor::call_t!(
            supervisor,
            |reply| PoolSupervisorMsg::Dispatch { envelope, reply },
            timeout_ms
        )
        .map_err(|e| SimulationError::Rpc(e.to_string()))?
    }

    async fn start(
        &self,
        state: &mut OrchestratorState,
        options: SimulationOptions,
    ) -> Result<SimulationSnapshot, SimulationError> {
        validate_options(&options, state.config.pool_size())?;
        check_precondition(Command::Start, &state.store.statuses())?;

        let options = Arc::new(options);
        state.options = Arc::clone(&options);
        state.options_tx.send_replace(Arc::clone(&options));
        self.publish(
            state,
            SimulationEvent::Options {
                options: options.as_ref().clone(),
            },
        );

        let run_id = ulid::Ulid::new();
        state.run_id = Some(run_id);
        info!(run_id = %run_id, pendulums = options.len(), "Starting simulation");

        self.dispatch(state, Payload::Start { options }).await?;
        Ok(snapshot(&state.store, &state.options))
    }

    async fn stop(&self, state: &mut OrchestratorState) -> Result<(), SimulationError> {
        let statuses = state.store.statuses();
        if statuses.iter().all(|status| *status == PendulumStatus::Idle) {
            debug!("Stop requested while idle; nothing to do");
            return Ok(());
        }
        check_precondition(Command::Stop, &statuses)?;

        self.dispatch(state, Payload::Stop).await?;
        info!(run_id = ?state.run_id.map(|id| id.to_string()), "Simulation stopped");
        state.run_id = None;
        Ok(())
    }

    async fn pause(&self, state: &OrchestratorState) -> Result<(), SimulationError> {
        check_precondition(Command::Pause, &state.store.statuses())?;
        self.dispatch(state, Payload::Pause).await?;
        info!(run_id = ?state.run_id.map(|id| id.to_string()), "Simulation paused");
        Ok(())
    }

    async fn resume(&self, state: &OrchestratorState) -> Result<(), SimulationError> {
        check_precondition(Command::Resume, &state.store.statuses())?;
        self.dispatch(state, Payload::Resume).await?;
        info!(run_id = ?state.run_id.map(|id| id.to_string()), "Simulation resumed");
        Ok(())
    }

    fn notify(&self, state: &OrchestratorState, envelope: Envelope) {
        match envelope.payload {
            Payload::State { state: pendulum } => {
                let Origin::Pendulum(index) = envelope.from else {
                    trace!(from = ?envelope.from, "Ignoring state not sent by a pendulum");
                    return;
                };
                self.publish(
                    state,
                    SimulationEvent::State {
                        index,
                        time: envelope.time,
                        state: pendulum,
                    },
                );
            }
            Payload::Collision {
                pair,
                collision_time,
            } => {
                info!(
                    run_id = ?state.run_id.map(|id| id.to_string()),
                    ?pair,
                    collision_time,
                    "Collision reported"
                );
                self.publish(
                    state,
                    SimulationEvent::Collision {
                        pair,
                        time: collision_time,
                    },
                );
            }
            other => {
                trace!(kind = other.kind(), "Ignoring notification");
            }
        }
    }

    fn publish(&self, state: &OrchestratorState, event: SimulationEvent) {
        // No subscribers is not an error.
        let _ = state.events.send(event);
    }

    async fn on_pool_failure(
        &self,
        myself: &ActorRef<OrchestratorMsg>,
        state: &mut OrchestratorState,
        reason: String,
    ) {
        state.supervisor = None;
        state.run_id = None;
        state.supervisor_restarts += 1;
        state.last_failure = Some(reason.clone());
        state.store.reset(&state.options);

        error!(
            orchestrator = %myself.get_id(),
            restarts = state.supervisor_restarts,
            reason = %reason,
            "Pendulum pool failed - restarting"
        );
        self.publish(
            state,
            SimulationEvent::Error {
                message: format!("Pendulum pool failed: {reason}"),
            },
        );

        match self.spawn_supervisor(myself, state).await {
            Ok(supervisor) => state.supervisor = Some(supervisor),
            Err(e) => {
                error!(error = %e, "Failed to restart PoolSupervisor");
                state.last_failure = Some(format!("restart failed: {e}"));
            }
        }
    }

    fn is_current_supervisor(state: &OrchestratorState, actor_id: ractor::ActorId) -> bool {
        state
            .supervisor
            .as_ref()
            .is_some_and(|supervisor| supervisor.get_id() == actor_id)
    }
}

#[ractor::async_trait]
impl Actor for Orchestrator {
    type Msg = OrchestratorMsg;
    type State = OrchestratorState;
    type Arguments = OrchestratorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(orchestrator = %myself.get_id(), "Orchestrator starting");

        let options = Arc::new(args.config.initial_options.clone());
        args.store.reset(&options);
        args.options_tx.send_replace(Arc::clone(&options));

        let mut state = OrchestratorState {
            store: args.store,
            config: args.config,
            options,
            events: args.events,
            options_tx: args.options_tx,
            supervisor: None,
            run_id: None,
            supervisor_restarts: 0,
            last_failure: None,
        };
        state.supervisor = Some(self.spawn_supervisor(&myself, &state).await?);
        Ok(state)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            OrchestratorMsg::Start { options, reply } => {
                let result = self.start(state, options).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Start rejected");
                }
                let _ = reply.send(result);
            }
            OrchestratorMsg::Stop { reply } => {
                let result = self.stop(state).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Stop rejected");
                }
                let _ = reply.send(result);
            }
            OrchestratorMsg::Pause { reply } => {
                let result = self.pause(state).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Pause rejected");
                }
                let _ = reply.send(result);
            }
            OrchestratorMsg::Resume { reply } => {
                let result = self.resume(state).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Resume rejected");
                }
                let _ = reply.send(result);
            }
            OrchestratorMsg::GetStatus { reply } => {
                let _ = reply.send(snapshot(&state.store, &state.options));
            }
            OrchestratorMsg::Notify(envelope) => {
                self.notify(state, envelope);
            }
            OrchestratorMsg::GetHealth { reply } => {
                let _ = reply.send(OrchestratorHealth {
                    supervisor_alive: state.supervisor.is_some(),
                    supervisor_restarts: state.supervisor_restarts,
                    last_failure: state.last_failure.clone(),
                });
            }
            OrchestratorMsg::GetSupervisor { reply } => {
                let _ = reply.send(state.supervisor.clone());
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match event {
            SupervisionEvent::ActorStarted(actor_cell) => {
                debug!(
                    orchestrator = %myself.get_id(),
                    child_actor = %actor_cell.get_id(),
                    "PoolSupervisor started"
                );
            }
            SupervisionEvent::ActorFailed(actor_cell, failure) => {
                if Self::is_current_supervisor(state, actor_cell.get_id()) {
                    self.on_pool_failure(&myself, state, failure.to_string())
                        .await;
                }
            }
            SupervisionEvent::ActorTerminated(actor_cell, _, reason) => {
                if Self::is_current_supervisor(state, actor_cell.get_id()) {
                    let reason = reason.unwrap_or_else(|| "terminated".to_string());
                    self.on_pool_failure(&myself, state, reason).await;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(supervisor) = state.supervisor.take() {
            if let Err(e) = supervisor
                .stop_and_wait(
                    Some("orchestrator stopping".to_string()),
                    Some(Duration::from_secs(5)),
                )
                .await
            {
                warn!(error = %e, "PoolSupervisor did not stop cleanly");
            }
        }
        info!(orchestrator = %myself.get_id(), "Orchestrator stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{AggregateStatus, PendulumOptions, Position, WindOptions};

    use shared_types::PendulumStatus::{Idle, Paused, Running, WaitingForRestart};

    #[test]
    fn test_start_requires_all_idle() {
        assert!(check_precondition(Command::Start, &[Idle, Idle]).is_ok());
        assert_eq!(
            check_precondition(Command::Start, &[Idle, Running]),
            Err(SimulationError::AlreadyRunning)
        );
        assert_eq!(
            check_precondition(Command::Start, &[Paused, Paused]),
            Err(SimulationError::AlreadyRunning)
        );
    }

    #[test]
    fn test_stop_accepts_any_simulating_mix() {
        assert!(check_precondition(Command::Stop, &[Running, Paused, WaitingForRestart]).is_ok());
        assert_eq!(
            check_precondition(Command::Stop, &[Running, Idle]),
            Err(SimulationError::NotRunning)
        );
        assert_eq!(
            check_precondition(Command::Stop, &[Running, PendulumStatus::Error]),
            Err(SimulationError::NotRunning)
        );
    }

    #[test]
    fn test_pause_and_resume_gates() {
        assert!(check_precondition(Command::Pause, &[Running, Running]).is_ok());
        assert_eq!(
            check_precondition(Command::Pause, &[Running, WaitingForRestart]),
            Err(SimulationError::NotRunning)
        );
        assert!(check_precondition(Command::Resume, &[Paused, Paused]).is_ok());
        assert_eq!(
            check_precondition(Command::Resume, &[Paused, Running]),
            Err(SimulationError::NotPaused)
        );
    }

    #[test]
    fn test_validate_options_accepts_defaults() {
        let options = SimulationOptions::default();
        assert!(validate_options(&options, options.len()).is_ok());
    }

    #[test]
    fn test_validate_options_rejects_wrong_pool_size() {
        let options = SimulationOptions::default();
        let err = validate_options(&options, options.len() + 1).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidOptions(_)));
    }

    #[test]
    fn test_validate_options_rejects_bad_pendulums() {
        let good = PendulumOptions {
            angle: 0.3,
            mass: 0.2,
            radius: 0.02,
            length: 0.3,
            anchor: Position::new(0.1, 0.05),
        };
        let cases = [
            PendulumOptions { length: 0.0, ..good },
            PendulumOptions { mass: -1.0, ..good },
            PendulumOptions { radius: -0.01, ..good },
            PendulumOptions { angle: f64::NAN, ..good },
        ];
        for bad in cases {
            let options = SimulationOptions {
                pendulums: vec![good, bad],
                wind: WindOptions::default(),
            };
            let err = validate_options(&options, 2).unwrap_err();
            assert!(
                err.to_string().contains("pendulum #1"),
                "unexpected error: {err}"
            );
        }
    }

    #[test]
    fn test_snapshot_reads_store() {
        let options = SimulationOptions::default();
        let store = SharedStateStore::new(options.len());
        store.reset(&options);
        let snapshot = snapshot(&store, &options);
        assert_eq!(snapshot.status, AggregateStatus::Idle);
        assert_eq!(snapshot.states.len(), options.len());
        assert_eq!(snapshot.states[2].angle, options.pendulums[2].angle);
    }
}
