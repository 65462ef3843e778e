use std::sync::Arc;
use std::time::Duration;

use ractor::{Actor, ActorRef};
use shared_types::{SimulationEvent, SimulationOptions, SimulationSnapshot};
use tokio::sync::{broadcast, watch};

use crate::config::EngineConfig;
use crate::error::SimulationError;
use crate::state_store::SharedStateStore;
use crate::supervisor::{snapshot, Orchestrator, OrchestratorArgs, OrchestratorHealth, OrchestratorMsg};

/// Collaborator-facing handle to a running engine.
#[derive(Clone)]
pub struct SimulationHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    orchestrator: ActorRef<OrchestratorMsg>,
    store: Arc<SharedStateStore>,
    events: broadcast::Sender<SimulationEvent>,
    options: watch::Receiver<Arc<SimulationOptions>>,
    rpc_timeout_ms: u64,
}

impl SimulationHandle {
    /// Build the store and channels and boot the supervision tree. The pool
    /// starts out idle at the configured initial options.
    pub async fn spawn(config: EngineConfig) -> Result<Self, SimulationError> {
        if config.initial_options.is_empty() {
            return Err(SimulationError::InvalidOptions(
                "the pool needs at least one pendulum".to_string(),
            ));
        }

        let store = SharedStateStore::new(config.pool_size());
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (options_tx, options) =
            watch::channel(Arc::new(config.initial_options.clone()));

        let rpc_timeout = config.command_timeout.saturating_mul(3);
        let rpc_timeout_ms = u64::try_from(rpc_timeout.as_millis()).unwrap_or(u64::MAX);

        let args = OrchestratorArgs {
            store: Arc::clone(&store),
            config,
            events: events.clone(),
            options_tx,
        };
        let (orchestrator, _handle) = Actor::spawn(
            Some(format!("orchestrator:{}", ulid::Ulid::new())),
            Orchestrator,
            args,
        )
        .await
        .map_err(|e| SimulationError::Spawn(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(HandleInner {
                orchestrator,
                store,
                events,
                options,
                rpc_timeout_ms,
            }),
        })
    }

    pub async fn start(
        &self,
        options: SimulationOptions,
    ) -> Result<SimulationSnapshot, SimulationError> {
        ractor::call_t!(
            self.inner.orchestrator,
            |reply| OrchestratorMsg::Start { options, reply },
            self.inner.rpc_timeout_ms
        )
        .map_err(|e| SimulationError::Rpc(e.to_string()))?
    }

    pub async fn stop(&self) -> Result<(), SimulationError> {
        ractor::call_t!(
            self.inner.orchestrator,
            |reply| OrchestratorMsg::Stop { reply },
            self.inner.rpc_timeout_ms
        )
        .map_err(|e| SimulationError::Rpc(e.to_string()))?
    }

    pub async fn pause(&self) -> Result<(), SimulationError> {
        ractor::call_t!(
            self.inner.orchestrator,
            |reply| OrchestratorMsg::Pause { reply },
            self.inner.rpc_timeout_ms
        )
        .map_err(|e| SimulationError::Rpc(e.to_string()))?
    }

    pub async fn resume(&self) -> Result<(), SimulationError> {
        ractor::call_t!(
            self.inner.orchestrator,
            |reply| OrchestratorMsg::Resume { reply },
            self.inner.rpc_timeout_ms
        )
        .map_err(|e| SimulationError::Rpc(e.to_string()))?
    }

    /// Active options and the last published pendulum states. Reads the
    /// store directly and never waits on an actor.
    pub fn status(&self) -> SimulationSnapshot {
        let options = Arc::clone(&self.inner.options.borrow());
        snapshot(&self.inner.store, &options)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SimulationEvent> {
        self.inner.events.subscribe()
    }

    pub async fn health(&self) -> Result<OrchestratorHealth, SimulationError> {
        ractor::call_t!(
            self.inner.orchestrator,
            |reply| OrchestratorMsg::GetHealth { reply },
            self.inner.rpc_timeout_ms
        )
        .map_err(|e| SimulationError::Rpc(e.to_string()))
    }

    pub fn orchestrator(&self) -> ActorRef<OrchestratorMsg> {
        self.inner.orchestrator.clone()
    }

    /// Stop the whole tree and wait for every actor to exit.
    pub async fn shutdown(&self) -> Result<(), SimulationError> {
        self.inner
            .orchestrator
            .stop_and_wait(Some("shutdown".to_string()), Some(Duration::from_secs(10)))
            .await
            .map_err(|e| SimulationError::Rpc(e.to_string()))
    }
}
