//! Simulation supervision tree
//!
//! ## Architecture
//!
//! Orchestrator (restarts its child on any failure)
//! └── PoolSupervisor (fails as a whole when any child fails)
//!     ├── PendulumActor #0
//!     ├── PendulumActor #1
//!     └── ...
//!
//! ## Supervision Events
//!
//! - `ActorStarted`: logged at debug
//! - `ActorFailed` / `ActorTerminated` of a pendulum: the PoolSupervisor
//!   fails with the pendulum's reason
//! - `ActorFailed` / `ActorTerminated` of the PoolSupervisor: the
//!   Orchestrator clears the store, emits an `error` event and spawns a
//!   fresh pool

pub mod orchestrator;
pub mod pool;

pub use orchestrator::{
    check_precondition, snapshot, validate_options, Command, Orchestrator, OrchestratorArgs,
    OrchestratorHealth, OrchestratorMsg, OrchestratorState,
};
pub use pool::{PoolSupervisor, PoolSupervisorArgs, PoolSupervisorMsg, PoolSupervisorState};
