//! Shared state store - lock-free per-pendulum slots
//!
//! Every pendulum publishes its position, angle and status into a fixed slot.
//! Any actor may read any slot at any time without a message round-trip; only
//! the actor holding the slot's [`SlotWriter`] writes it.
//!
//! Fields are individual atomics, so a reader can observe a slot mid-update
//! (for example a new angle with the previous position). Collision detection
//! tolerates this: a missed overlap is caught on the next tick.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use shared_types::{AggregateStatus, PendulumState, PendulumStatus, Position, SimulationOptions};

use crate::physics;

#[derive(Debug, Default)]
struct Slot {
    x: AtomicU64,
    y: AtomicU64,
    angle: AtomicU64,
    status: AtomicU8,
}

impl Slot {
    fn store(&self, position: Position, angle: f64, status: PendulumStatus) {
        self.x.store(position.x.to_bits(), Ordering::Release);
        self.y.store(position.y.to_bits(), Ordering::Release);
        self.angle.store(angle.to_bits(), Ordering::Release);
        self.status.store(status.as_u8(), Ordering::Release);
    }

    fn load(&self) -> PendulumState {
        PendulumState {
            status: self.status(),
            angle: f64::from_bits(self.angle.load(Ordering::Acquire)),
            position: Position::new(
                f64::from_bits(self.x.load(Ordering::Acquire)),
                f64::from_bits(self.y.load(Ordering::Acquire)),
            ),
        }
    }

    fn status(&self) -> PendulumStatus {
        PendulumStatus::from_u8(self.status.load(Ordering::Acquire))
            .unwrap_or(PendulumStatus::Error)
    }
}

/// Fixed-capacity store allocated once per process and reused across runs.
#[derive(Debug)]
pub struct SharedStateStore {
    slots: Box<[Slot]>,
}

impl SharedStateStore {
    pub fn new(capacity: usize) -> Arc<Self> {
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Arc::new(Self { slots })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn read(&self, index: usize) -> Option<PendulumState> {
        self.slots.get(index).map(Slot::load)
    }

    pub fn status(&self, index: usize) -> Option<PendulumStatus> {
        self.slots.get(index).map(Slot::status)
    }

    pub fn snapshot(&self) -> Vec<PendulumState> {
        self.slots.iter().map(Slot::load).collect()
    }

    pub fn statuses(&self) -> Vec<PendulumStatus> {
        self.slots.iter().map(Slot::status).collect()
    }

    pub fn aggregate_status(&self) -> AggregateStatus {
        AggregateStatus::from_statuses(self.slots.iter().map(Slot::status))
    }

    /// Writer handle for one slot. Handed to exactly one actor per pool.
    pub fn writer(self: &Arc<Self>, index: usize) -> Option<SlotWriter> {
        (index < self.capacity()).then(|| SlotWriter {
            store: Arc::clone(self),
            index,
        })
    }

    /// Put every slot back to idle at its initial position.
    ///
    /// Only called while no pool is alive (process start, after a pool
    /// failure), so it never races a slot owner.
    pub fn reset(&self, options: &SimulationOptions) {
        for (index, slot) in self.slots.iter().enumerate() {
            match options.pendulum(index) {
                Some(pendulum) => slot.store(
                    physics::position_for(pendulum.angle, pendulum),
                    pendulum.angle,
                    PendulumStatus::Idle,
                ),
                None => slot.store(Position::default(), 0.0, PendulumStatus::Idle),
            }
        }
    }
}

/// Exclusive write access to a single slot.
#[derive(Debug)]
pub struct SlotWriter {
    store: Arc<SharedStateStore>,
    index: usize,
}

impl SlotWriter {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn store(&self) -> &Arc<SharedStateStore> {
        &self.store
    }

    pub fn write(&self, position: Position, angle: f64, status: PendulumStatus) {
        self.store.slots[self.index].store(position, angle, status);
    }

    pub fn publish(&self, state: &PendulumState) {
        self.write(state.position, state.angle, state.status);
    }
}
