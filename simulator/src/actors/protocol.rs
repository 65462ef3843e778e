//! Addressed messages exchanged between the orchestrator, the pool
//! supervisor and the pendulum actors.
//!
//! Every message carries its sender, an addressee set and the instant (epoch
//! milliseconds) it refers to. The pool supervisor routes on the addressee
//! set; receivers use the instant to discard stale commands.

use std::sync::Arc;

use shared_types::{PendulumState, SimulationOptions};

/// Current wall-clock instant in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Who a message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// One pendulum by index
    Pendulum(usize),
    /// Every pendulum except the sender
    Pendulums,
    Orchestrator,
    /// The pool supervisor itself
    Supervisor,
}

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Pendulum(usize),
    Orchestrator,
    Supervisor,
}

impl Origin {
    pub fn pendulum_index(&self) -> Option<usize> {
        match self {
            Origin::Pendulum(index) => Some(*index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Payload {
    Start { options: Arc<SimulationOptions> },
    Stop,
    Pause,
    Resume,
    /// Per-tick state of the sending pendulum
    State { state: PendulumState },
    /// Two bodies touched at `collision_time`
    Collision {
        pair: (usize, usize),
        collision_time: i64,
    },
    /// The sender is ready to restart after the collision at `collision_time`
    Restart { collision_time: i64 },
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Start { .. } => "start",
            Payload::Stop => "stop",
            Payload::Pause => "pause",
            Payload::Resume => "resume",
            Payload::State { .. } => "state",
            Payload::Collision { .. } => "collision",
            Payload::Restart { .. } => "restart",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: Origin,
    pub to: Vec<Address>,
    pub time: i64,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(from: Origin, to: Vec<Address>, time: i64, payload: Payload) -> Self {
        Self {
            from,
            to,
            time,
            payload,
        }
    }

    /// Command from the orchestrator to the whole pool.
    pub fn command(time: i64, payload: Payload) -> Self {
        Self::new(Origin::Orchestrator, vec![Address::Pendulums], time, payload)
    }

    pub fn from_pendulum(index: usize, to: Vec<Address>, time: i64, payload: Payload) -> Self {
        Self::new(Origin::Pendulum(index), to, time, payload)
    }

    pub fn is_for_orchestrator(&self) -> bool {
        self.to.contains(&Address::Orchestrator)
    }

    pub fn is_for_supervisor(&self) -> bool {
        self.to.contains(&Address::Supervisor)
    }

    /// Whether the pendulum at `index` should receive this message. A
    /// pendulum-wide broadcast never loops back to its sender.
    pub fn is_for_pendulum(&self, index: usize) -> bool {
        self.to.iter().any(|address| match address {
            Address::Pendulum(target) => *target == index,
            Address::Pendulums => self.from != Origin::Pendulum(index),
            _ => false,
        })
    }

    /// Pendulum indices (below `pool_size`) this message is delivered to.
    pub fn pendulum_targets(&self, pool_size: usize) -> Vec<usize> {
        (0..pool_size)
            .filter(|index| self.is_for_pendulum(*index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_excludes_sender() {
        let envelope = Envelope::from_pendulum(
            1,
            vec![Address::Pendulums, Address::Orchestrator],
            10,
            Payload::Restart { collision_time: 5 },
        );
        assert_eq!(envelope.pendulum_targets(4), vec![0, 2, 3]);
        assert!(envelope.is_for_orchestrator());
        assert!(!envelope.is_for_supervisor());
    }

    #[test]
    fn test_orchestrator_command_reaches_every_pendulum() {
        let envelope = Envelope::command(10, Payload::Pause);
        assert_eq!(envelope.pendulum_targets(3), vec![0, 1, 2]);
        assert!(!envelope.is_for_orchestrator());
    }

    #[test]
    fn test_direct_address_and_duplicates() {
        let envelope = Envelope::new(
            Origin::Supervisor,
            vec![Address::Pendulum(2), Address::Pendulum(2), Address::Pendulum(7)],
            0,
            Payload::Stop,
        );
        assert_eq!(envelope.pendulum_targets(3), vec![2]);
    }

    #[test]
    fn test_pendulum_may_address_itself_directly() {
        let envelope =
            Envelope::from_pendulum(0, vec![Address::Pendulum(0)], 0, Payload::Resume);
        assert!(envelope.is_for_pendulum(0));
    }
}
