use thiserror::Error;

/// Rejections returned to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("Simulation is already running")]
    AlreadyRunning,
    #[error("Simulation is not running")]
    NotRunning,
    #[error("Simulation is not paused")]
    NotPaused,
    #[error("Invalid simulation options: {0}")]
    InvalidOptions(String),
    #[error("Pendulum pool is not available")]
    PoolUnavailable,
    #[error("Actor RPC error: {0}")]
    Rpc(String),
    #[error("Failed to spawn actor: {0}")]
    Spawn(String),
}

/// Unrecoverable pendulum faults. Any of these fails the whole pool.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PendulumError {
    #[error("no options configured for pendulum #{0}")]
    MissingOptions(usize),
    #[error("pendulum #{index} computed a non-finite state (angle={angle})")]
    NonFinite { index: usize, angle: f64 },
}
