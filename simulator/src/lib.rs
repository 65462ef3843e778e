//! Pendulum Simulator - actor-based concurrent pendulum engine
//!
//! Every pendulum is an autonomous actor ticking at a fixed rate. Actors
//! publish into a lock-free shared state store, detect collisions from each
//! other's published positions and agree on a restart without a leader. A
//! pool supervisor routes their messages; an orchestrator gates collaborator
//! commands and rebuilds the pool when it fails.

pub mod actors;
pub mod config;
pub mod error;
pub mod handle;
pub mod physics;
pub mod state_store;
pub mod supervisor;

pub use config::EngineConfig;
pub use error::{PendulumError, SimulationError};
pub use handle::SimulationHandle;
pub use state_store::{SharedStateStore, SlotWriter};
