//! PendulumActor message types.

use std::sync::Arc;
use std::time::Duration;

use ractor::{ActorRef, RpcReplyPort};
use shared_types::{PendulumState, SimulationOptions};

use crate::actors::protocol::Envelope;
use crate::state_store::SlotWriter;
use crate::supervisor::PoolSupervisorMsg;

#[derive(Debug)]
pub enum PendulumMsg {
    /// Internal trigger from the fixed-rate ticker.
    Tick,
    /// Routed message from a peer, the orchestrator or the supervisor.
    Deliver(Envelope),
    /// Orchestrator command; replies once applied.
    Command {
        envelope: Envelope,
        reply: RpcReplyPort<()>,
    },
    GetState {
        reply: RpcReplyPort<PendulumState>,
    },
}

#[derive(Debug)]
pub struct PendulumArguments {
    pub slot: SlotWriter,
    pub options: Arc<SimulationOptions>,
    pub supervisor: ActorRef<PoolSupervisorMsg>,
    pub tick_interval: Duration,
    pub restart_timeout: Duration,
}
