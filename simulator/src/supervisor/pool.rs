//! Pool Supervisor - owns the PendulumActor pool
//!
//! The PoolSupervisor is responsible for:
//! - Spawning one linked PendulumActor per configured pendulum
//! - Routing addressed messages between pendulums and up to the orchestrator
//! - Delivering orchestrator commands as acknowledged broadcasts
//! - Failing as a whole when any pendulum fails or exits, so its owner can
//!   rebuild the pool

use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use shared_types::SimulationOptions;
use tracing::{debug, error, info, warn};

use crate::actors::pendulum::{PendulumActor, PendulumArguments, PendulumMsg};
use crate::actors::protocol::Envelope;
use crate::error::SimulationError;
use crate::state_store::SharedStateStore;
use crate::supervisor::orchestrator::OrchestratorMsg;

/// Upper bound for a pendulum to drain its mailbox when the pool is torn down
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
pub struct PoolSupervisor;

#[derive(Debug, Clone)]
pub struct PoolSupervisorArgs {
    pub store: Arc<SharedStateStore>,
    pub options: Arc<SimulationOptions>,
    pub orchestrator: ActorRef<OrchestratorMsg>,
    pub tick_interval: Duration,
    pub restart_timeout: Duration,
    pub command_timeout: Duration,
}

pub struct PoolSupervisorState {
    /// Pendulum index -> actor
    pub pendulums: Vec<ActorRef<PendulumMsg>>,
    pub orchestrator: ActorRef<OrchestratorMsg>,
    pub command_timeout: Duration,
}

#[derive(Debug)]
pub enum PoolSupervisorMsg {
    /// Message emitted by a pendulum; delivered by addressee
    Route(Envelope),
    /// Orchestrator command; replies once every addressed pendulum applied it
    Dispatch {
        envelope: Envelope,
        reply: RpcReplyPort<Result<(), SimulationError>>,
    },
    GetPendulums {
        reply: RpcReplyPort<Vec<ActorRef<PendulumMsg>>>,
    },
}

impl PoolSupervisor {
    fn route(&self, state: &PoolSupervisorState, envelope: Envelope) {
        for index in envelope.pendulum_targets(state.pendulums.len()) {
            if let Err(e) = state.pendulums[index].cast(PendulumMsg::Deliver(envelope.clone())) {
                warn!(
                    pendulum = index,
                    kind = envelope.payload.kind(),
                    error = %e,
                    "Failed to deliver message to pendulum"
                );
            }
        }

        if envelope.is_for_orchestrator() {
            if let Err(e) = state
                .orchestrator
                .cast(OrchestratorMsg::Notify(envelope.clone()))
            {
                warn!(
                    kind = envelope.payload.kind(),
                    error = %e,
                    "Failed to forward message to orchestrator"
                );
            }
        }

        if envelope.is_for_supervisor() {
            debug!(
                from = ?envelope.from,
                kind = envelope.payload.kind(),
                "PoolSupervisor received message addressed to itself"
            );
        }
    }

    async fn dispatch(
        &self,
        state: &PoolSupervisorState,
        envelope: Envelope,
    ) -> Result<(), SimulationError> {
        let timeout_ms = u64::try_from(state.command_timeout.as_millis()).unwrap_or(u64::MAX);
        let kind = envelope.payload.kind();
        let acks = envelope
            .pendulum_targets(state.pendulums.len())
            .into_iter()
            .map(|index| {
                let pendulum = state.pendulums[index].clone();
                let envelope = envelope.clone();
                async move {
                    ractor::call_t!(
                        pendulum,
                        |reply| PendulumMsg::Command { envelope, reply },
                        timeout_ms
                    )
                    .map_err(|e| {
                        warn!(
                            pendulum = index,
                            kind,
                            error = %e,
                            "Pendulum did not acknowledge command"
                        );
                        SimulationError::Rpc(e.to_string())
                    })
                }
            });

        futures::future::try_join_all(acks).await?;
        Ok(())
    }

    /// Stop every pendulum and wait for it to exit, so no slot is written
    /// once the pool is gone.
    async fn stop_pendulums(&self, state: &mut PoolSupervisorState) {
        for pendulum in state.pendulums.drain(..) {
            if let Err(e) = pendulum
                .stop_and_wait(Some("pool stopping".to_string()), Some(CHILD_STOP_TIMEOUT))
                .await
            {
                debug!(pendulum = %pendulum.get_id(), error = %e, "Pendulum already stopped");
            }
        }
    }
}

#[ractor::async_trait]
impl Actor for PoolSupervisor {
    type Msg = PoolSupervisorMsg;
    type State = PoolSupervisorState;
    type Arguments = PoolSupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            supervisor = %myself.get_id(),
            pool_size = args.options.len(),
            "PoolSupervisor starting"
        );

        let mut pendulums = Vec::with_capacity(args.options.len());
        for index in 0..args.options.len() {
            let slot = args.store.writer(index).ok_or_else(|| {
                ActorProcessingErr::from(format!(
                    "state store has no slot for pendulum #{index} (capacity {})",
                    args.store.capacity()
                ))
            })?;

            let pendulum_args = PendulumArguments {
                slot,
                options: Arc::clone(&args.options),
                supervisor: myself.clone(),
                tick_interval: args.tick_interval,
                restart_timeout: args.restart_timeout,
            };

            let (pendulum, _handle) =
                Actor::spawn_linked(None, PendulumActor, pendulum_args, myself.get_cell())
                    .await
                    .map_err(|e| {
                        error!(pendulum = index, error = %e, "Failed to spawn PendulumActor");
                        ActorProcessingErr::from(e)
                    })?;
            pendulums.push(pendulum);
        }

        Ok(PoolSupervisorState {
            pendulums,
            orchestrator: args.orchestrator,
            command_timeout: args.command_timeout,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PoolSupervisorMsg::Route(envelope) => {
                self.route(state, envelope);
            }
            PoolSupervisorMsg::Dispatch { envelope, reply } => {
                let result = self.dispatch(state, envelope).await;
                let _ = reply.send(result);
            }
            PoolSupervisorMsg::GetPendulums { reply } => {
                let _ = reply.send(state.pendulums.clone());
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
                    supervisor = %myself.get_id(),
                    child_actor = %actor_cell.get_id(),
                    "PendulumActor started"
                );
                Ok(())
            }
            SupervisionEvent::ActorFailed(actor_cell, failure) => {
                let index = pendulum_index(state, actor_cell.get_id());
                error!(
                    supervisor = %myself.get_id(),
                    failed_actor = %actor_cell.get_id(),
                    pendulum = ?index,
                    error = %failure,
                    "PendulumActor failed - failing pool"
                );
                self.stop_pendulums(state).await;
                Err(ActorProcessingErr::from(format!(
                    "pendulum {} failed: {failure}",
                    describe(index)
                )))
            }
            SupervisionEvent::ActorTerminated(actor_cell, _, reason) => {
                let index = pendulum_index(state, actor_cell.get_id());
                error!(
                    supervisor = %myself.get_id(),
                    terminated_actor = %actor_cell.get_id(),
                    pendulum = ?index,
                    reason = ?reason,
                    "PendulumActor terminated unexpectedly - failing pool"
                );
                self.stop_pendulums(state).await;
                Err(ActorProcessingErr::from(format!(
                    "pendulum {} terminated: {}",
                    describe(index),
                    reason.unwrap_or_else(|| "no reason".to_string())
                )))
            }
            _ => Ok(()),
        }
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        self.stop_pendulums(state).await;
        info!(supervisor = %myself.get_id(), "PoolSupervisor stopped");
        Ok(())
    }
}

fn pendulum_index(state: &PoolSupervisorState, actor_id: ractor::ActorId) -> Option<usize> {
    state
        .pendulums
        .iter()
        .position(|pendulum| pendulum.get_id() == actor_id)
}

fn describe(index: Option<usize>) -> String {
    index.map_or_else(|| "?".to_string(), |index| format!("#{index}"))
}
