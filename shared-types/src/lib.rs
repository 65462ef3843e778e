//! Shared types between the simulation engine and its collaborators
//!
//! These types are used by both:
//! - the pendulum engine (native Rust actors)
//! - the browser collaborator (via the exported TypeScript bindings)
//!
//! Serializable with serde for JSON over WebSocket/HTTP

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Y coordinate of the line every default anchor hangs from (meters)
pub const ANCHOR_LINE_Y: f64 = 0.05;

// ============================================================================
// Options
// ============================================================================

/// A point in scene coordinates (meters, y grows downwards)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Immutable per-run configuration of a single pendulum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
pub struct PendulumOptions {
    /// Initial angle in radians
    pub angle: f64,
    /// Mass in kilograms
    pub mass: f64,
    /// Radius of the bob in meters
    pub radius: f64,
    /// String length in meters
    pub length: f64,
    /// Anchor point in meters
    pub anchor: Position,
}

/// Global wind applied identically to every pendulum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
pub struct WindOptions {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Direction in radians
    pub direction: f64,
    /// Velocity in km/h
    pub velocity: f64,
}

fn default_true() -> bool {
    true
}

/// Everything a run is started with; replaced wholesale on each start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
pub struct SimulationOptions {
    pub pendulums: Vec<PendulumOptions>,
    #[serde(default)]
    pub wind: WindOptions,
}

impl SimulationOptions {
    pub fn pendulum(&self, index: usize) -> Option<&PendulumOptions> {
        self.pendulums.get(index)
    }

    pub fn len(&self) -> usize {
        self.pendulums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pendulums.is_empty()
    }
}

impl Default for SimulationOptions {
    fn default() -> Self {
        let pendulum = |x: f64, angle: f64, length: f64| PendulumOptions {
            angle,
            mass: 0.2,
            radius: 0.02,
            length,
            anchor: Position::new(x, ANCHOR_LINE_Y),
        };

        Self {
            pendulums: vec![
                pendulum(0.15, -0.5, 0.3),
                pendulum(0.3, -0.3, 0.3),
                pendulum(0.45, -0.1, 0.2),
                pendulum(0.6, 0.15, 0.25),
                pendulum(0.75, 0.45, 0.1),
            ],
            wind: WindOptions {
                enabled: false,
                direction: 0.0,
                velocity: 0.0,
            },
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle status of a single pendulum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
#[serde(rename_all = "snake_case")]
pub enum PendulumStatus {
    #[default]
    Idle,
    Running,
    Paused,
    WaitingForRestart,
    Error,
}

impl PendulumStatus {
    /// Compact encoding used by the shared state store
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Paused => 2,
            Self::WaitingForRestart => 3,
            Self::Error => 4,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Running),
            2 => Some(Self::Paused),
            3 => Some(Self::WaitingForRestart),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    /// Statuses in which a run is in progress and may be stopped
    pub fn is_simulating(self) -> bool {
        matches!(
            self,
            Self::Running | Self::Paused | Self::WaitingForRestart
        )
    }
}

impl std::fmt::Display for PendulumStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendulumStatus::Idle => write!(f, "idle"),
            PendulumStatus::Running => write!(f, "running"),
            PendulumStatus::Paused => write!(f, "paused"),
            PendulumStatus::WaitingForRestart => write!(f, "waiting_for_restart"),
            PendulumStatus::Error => write!(f, "error"),
        }
    }
}

/// Status of the whole pool; `NotSynced` when the pendulums disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    Idle,
    Running,
    Paused,
    WaitingForRestart,
    Error,
    NotSynced,
}

impl AggregateStatus {
    /// Collapse per-pendulum statuses. An empty pool is idle.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = PendulumStatus>,
    {
        let mut statuses = statuses.into_iter();
        let Some(first) = statuses.next() else {
            return Self::Idle;
        };
        if statuses.any(|status| status != first) {
            return Self::NotSynced;
        }
        first.into()
    }
}

impl From<PendulumStatus> for AggregateStatus {
    fn from(status: PendulumStatus) -> Self {
        match status {
            PendulumStatus::Idle => Self::Idle,
            PendulumStatus::Running => Self::Running,
            PendulumStatus::Paused => Self::Paused,
            PendulumStatus::WaitingForRestart => Self::WaitingForRestart,
            PendulumStatus::Error => Self::Error,
        }
    }
}

/// Mutable state of one pendulum, published by its owning actor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
pub struct PendulumState {
    pub status: PendulumStatus,
    /// Current angle in radians
    pub angle: f64,
    pub position: Position,
}

/// Response payload for start and status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
pub struct SimulationSnapshot {
    pub options: SimulationOptions,
    pub status: AggregateStatus,
    pub states: Vec<PendulumState>,
}

// ============================================================================
// Events
// ============================================================================

/// Events pushed to the collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "simulation.ts")]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SimulationEvent {
    /// A start was accepted with new options
    Options { options: SimulationOptions },

    /// Per-tick state of one pendulum
    State {
        index: usize,
        #[ts(type = "number")]
        time: i64,
        state: PendulumState,
    },

    /// Two bodies touched; the pool is waiting for restart
    Collision {
        pair: (usize, usize),
        #[ts(type = "number")]
        time: i64,
    },

    /// The pendulum pool failed and was restarted
    Error { message: String },
}

// ============================================================================
// Tests
// ============================================================================
