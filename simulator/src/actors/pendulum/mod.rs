//! PendulumActor - one autonomous actor per pendulum
//!
//! Runs a fixed-rate tick loop, publishes its state into the shared state
//! store, detects collisions against the other pendulums' published
//! positions and takes part in the leaderless restart barrier.
//!
//! The loop never stops while the actor lives: pause and resume only change
//! what a tick computes. Outbound messages go to the pool supervisor, which
//! routes them by addressee.

pub mod messages;
pub mod state;

pub use messages::{PendulumArguments, PendulumMsg};
pub use state::{Outbox, PendulumCore};

use async_trait::async_trait;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::actors::protocol::now_millis;
use crate::error::PendulumError;
use crate::supervisor::PoolSupervisorMsg;

pub struct PendulumActorState {
    core: PendulumCore,
    supervisor: ActorRef<PoolSupervisorMsg>,
    ticker: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct PendulumActor;

#[async_trait]
impl Actor for PendulumActor {
    type Msg = PendulumMsg;
    type State = PendulumActorState;
    type Arguments = PendulumArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let index = args.slot.index();
        let restart_timeout_ms = i64::try_from(args.restart_timeout.as_millis()).unwrap_or(i64::MAX);
        let core = PendulumCore::new(args.slot, args.options, restart_timeout_ms)?;

        let interval = args.tick_interval;
        let tick_ref = myself.clone();
        let ticker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if tick_ref.cast(PendulumMsg::Tick).is_err() {
                    break;
                }
            }
        });

        tracing::info!(
            actor_id = %myself.get_id(),
            pendulum = index,
            "PendulumActor starting"
        );

        Ok(PendulumActorState {
            core,
            supervisor: args.supervisor,
            ticker,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PendulumMsg::Tick => {
                let outbox = self.guard(state, |core| core.tick(now_millis()))?;
                self.send(&myself, state, outbox);
            }
            PendulumMsg::Deliver(envelope) => {
                let outbox = self.guard(state, |core| core.handle(&envelope, now_millis()))?;
                self.send(&myself, state, outbox);
            }
            PendulumMsg::Command { envelope, reply } => {
                let outbox = self.guard(state, |core| core.handle(&envelope, now_millis()))?;
                self.send(&myself, state, outbox);
                let _ = reply.send(());
            }
            PendulumMsg::GetState { reply } => {
                let _ = reply.send(state.core.state());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.ticker.abort();
        tracing::info!(
            actor_id = %myself.get_id(),
            pendulum = state.core.index(),
            "PendulumActor stopping"
        );
        Ok(())
    }
}

impl PendulumActor {
    /// Run a transition; a fault marks the slot as failed before the error
    /// takes the actor down.
    fn guard<F>(&self, state: &mut PendulumActorState, transition: F) -> Result<Outbox, PendulumError>
    where
        F: FnOnce(&mut PendulumCore) -> Result<Outbox, PendulumError>,
    {
        transition(&mut state.core).inspect_err(|e| {
            tracing::error!(pendulum = state.core.index(), error = %e, "Pendulum fault");
            state.core.fail();
        })
    }

    fn send(&self, myself: &ActorRef<PendulumMsg>, state: &PendulumActorState, outbox: Outbox) {
        for envelope in outbox {
            if let Err(e) = state.supervisor.cast(PoolSupervisorMsg::Route(envelope)) {
                tracing::warn!(
                    pendulum = state.core.index(),
                    error = %e,
                    "Pool supervisor unreachable; stopping pendulum"
                );
                myself.stop(Some("pool supervisor unreachable".to_string()));
                return;
            }
        }
    }
}
