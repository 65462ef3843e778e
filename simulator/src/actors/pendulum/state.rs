//! PendulumActor state machine.
//!
//! Pure with respect to time: every transition receives the instant it
//! happens at and returns the messages to send, so the actor shell only
//! supplies the clock and the mailbox.

use std::collections::HashMap;
use std::sync::Arc;

use shared_types::{PendulumOptions, PendulumState, PendulumStatus, SimulationOptions};

use crate::actors::protocol::{Address, Envelope, Origin, Payload};
use crate::error::PendulumError;
use crate::physics;
use crate::state_store::SlotWriter;

pub type Outbox = Vec<Envelope>;

#[derive(Debug)]
pub struct PendulumCore {
    index: usize,
    slot: SlotWriter,
    options: Arc<SimulationOptions>,
    state: PendulumState,
    restart_timeout_ms: i64,
    /// Logical start of the run; shifted by resume and rebased by restart
    start_time: i64,
    pause_time: i64,
    /// Collision currently being waited out
    collision_time: Option<i64>,
    /// Latest collision already resolved by a restart
    resolved_collision: i64,
    restart_sent_for: Option<i64>,
    /// Peer index -> latest collision instant that peer is ready to restart from
    restart_acks: HashMap<usize, i64>,
}

impl PendulumCore {
    /// Idle pendulum at its initial position. The slot is published
    /// immediately so the store reflects the new owner.
    pub fn new(
        slot: SlotWriter,
        options: Arc<SimulationOptions>,
        restart_timeout_ms: i64,
    ) -> Result<Self, PendulumError> {
        let index = slot.index();
        let mut core = Self {
            index,
            slot,
            options,
            state: PendulumState::default(),
            restart_timeout_ms,
            start_time: 0,
            pause_time: 0,
            collision_time: None,
            resolved_collision: i64::MIN,
            restart_sent_for: None,
            restart_acks: HashMap::new(),
        };
        core.reset_to_initial(PendulumStatus::Idle)?;
        Ok(core)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> PendulumState {
        self.state
    }

    pub fn status(&self) -> PendulumStatus {
        self.state.status
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn collision_time(&self) -> Option<i64> {
        self.collision_time
    }

    /// Apply an addressed message. Messages not meant for this pendulum and
    /// stale commands are dropped without error.
    pub fn handle(&mut self, envelope: &Envelope, now: i64) -> Result<Outbox, PendulumError> {
        if !envelope.is_for_pendulum(self.index) {
            tracing::trace!(
                pendulum = self.index,
                kind = envelope.payload.kind(),
                "Ignoring message addressed elsewhere"
            );
            return Ok(Vec::new());
        }

        match &envelope.payload {
            Payload::Start { options } => self.start(Arc::clone(options), envelope.time),
            Payload::Stop => self.stop(envelope.time),
            Payload::Pause => self.pause(envelope.time),
            Payload::Resume => self.resume(envelope.time),
            Payload::Collision {
                pair,
                collision_time,
            } => self.on_collision(*pair, *collision_time, now),
            Payload::Restart { collision_time } => {
                if let Some(peer) = envelope.from.pendulum_index() {
                    self.on_restart(peer, *collision_time);
                }
                Ok(Vec::new())
            }
            // Peers' per-tick states need no reaction; positions come from the store.
            Payload::State { .. } => Ok(Vec::new()),
        }
    }

    pub fn start(
        &mut self,
        options: Arc<SimulationOptions>,
        time: i64,
    ) -> Result<Outbox, PendulumError> {
        self.options = options;
        self.start_time = time;
        self.pause_time = 0;
        self.clear_collision();
        self.restart_acks.clear();
        self.reset_to_initial(PendulumStatus::Running)?;
        tracing::debug!(pendulum = self.index, start_time = time, "Pendulum started");
        Ok(Vec::new())
    }

    pub fn stop(&mut self, time: i64) -> Result<Outbox, PendulumError> {
        if time < self.start_time || self.state.status == PendulumStatus::Idle {
            tracing::trace!(pendulum = self.index, time, "Ignoring stale or repeated stop");
            return Ok(Vec::new());
        }

        self.clear_collision();
        self.restart_acks.clear();
        self.reset_to_initial(PendulumStatus::Idle)?;
        tracing::debug!(pendulum = self.index, "Pendulum stopped");
        Ok(vec![self.state_message(vec![Address::Orchestrator], time)])
    }

    pub fn pause(&mut self, time: i64) -> Result<Outbox, PendulumError> {
        if self.state.status != PendulumStatus::Running || time < self.start_time {
            tracing::trace!(pendulum = self.index, status = %self.state.status, "Ignoring pause");
            return Ok(Vec::new());
        }

        self.pause_time = time;
        self.state.status = PendulumStatus::Paused;
        self.compute(time)?;
        Ok(vec![self.state_message(vec![Address::Orchestrator], time)])
    }

    pub fn resume(&mut self, time: i64) -> Result<Outbox, PendulumError> {
        if self.state.status != PendulumStatus::Paused || time < self.start_time {
            tracing::trace!(pendulum = self.index, status = %self.state.status, "Ignoring resume");
            return Ok(Vec::new());
        }

        // Paused time never elapsed as far as the harmonic phase is concerned.
        self.start_time += time - self.pause_time;
        self.pause_time = 0;
        // A collision noticed while paused still has to be waited out.
        self.state.status = if self.collision_time.is_some() {
            PendulumStatus::WaitingForRestart
        } else {
            PendulumStatus::Running
        };
        self.compute(time)?;
        Ok(vec![self.state_message(vec![Address::Orchestrator], time)])
    }

    /// One iteration of the fixed-rate loop.
    pub fn tick(&mut self, now: i64) -> Result<Outbox, PendulumError> {
        let mut outbox = Vec::new();
        match self.state.status {
            PendulumStatus::Running => {
                self.compute(now)?;
                if let Some(collision) = self.detect_collision(now) {
                    outbox.push(collision);
                }
                outbox.push(self.state_message(
                    vec![Address::Orchestrator, Address::Pendulums],
                    now,
                ));
            }
            PendulumStatus::Paused => {
                outbox.push(self.state_message(vec![Address::Orchestrator], now));
            }
            PendulumStatus::WaitingForRestart => {
                if let Some(announcement) = self.announce_restart(now) {
                    outbox.push(announcement);
                }
                if self.restart_eligible(now) {
                    self.restart(now)?;
                }
                outbox.push(self.state_message(vec![Address::Orchestrator], now));
            }
            PendulumStatus::Idle | PendulumStatus::Error => {}
        }
        Ok(outbox)
    }

    /// Mark this pendulum failed in the store.
    pub fn fail(&mut self) {
        self.state.status = PendulumStatus::Error;
        self.slot.publish(&self.state);
    }

    // ------------------------------------------------------------------
    // Collisions and the restart barrier
    // ------------------------------------------------------------------

    fn detect_collision(&mut self, now: i64) -> Option<Envelope> {
        if self.state.status != PendulumStatus::Running {
            return None;
        }
        let own_radius = self.options.pendulum(self.index)?.radius;
        let store = self.slot.store();

        let peer = (0..self.options.len())
            .filter(|peer| *peer != self.index)
            .find(|peer| {
                let (Some(peer_state), Some(peer_options)) =
                    (store.read(*peer), self.options.pendulum(*peer))
                else {
                    return false;
                };
                peer_state.status == PendulumStatus::Running
                    && physics::bodies_overlap(
                        self.state.position,
                        own_radius,
                        peer_state.position,
                        peer_options.radius,
                    )
            })?;

        self.adopt_collision(now);
        let collision_time = self.collision_time.unwrap_or(now);
        self.state.status = PendulumStatus::WaitingForRestart;
        self.slot.publish(&self.state);

        tracing::info!(
            pendulum = self.index,
            peer,
            collision_time,
            "Collision detected"
        );

        Some(Envelope::from_pendulum(
            self.index,
            vec![Address::Pendulums, Address::Orchestrator],
            now,
            Payload::Collision {
                pair: (self.index, peer),
                collision_time,
            },
        ))
    }

    fn on_collision(
        &mut self,
        pair: (usize, usize),
        collision_time: i64,
        now: i64,
    ) -> Result<Outbox, PendulumError> {
        match self.state.status {
            PendulumStatus::Idle | PendulumStatus::Error => {}
            PendulumStatus::Paused => {
                self.adopt_collision(collision_time);
            }
            PendulumStatus::WaitingForRestart => {
                if self.adopt_collision(collision_time) {
                    tracing::debug!(
                        pendulum = self.index,
                        collision_time,
                        "Moved restart barrier to a later collision"
                    );
                }
            }
            PendulumStatus::Running => {
                if self.adopt_collision(collision_time) {
                    self.compute(now)?;
                    self.state.status = PendulumStatus::WaitingForRestart;
                    self.slot.publish(&self.state);
                    tracing::debug!(
                        pendulum = self.index,
                        ?pair,
                        collision_time,
                        "Waiting for restart after peer collision"
                    );
                }
            }
        }
        Ok(Vec::new())
    }

    fn on_restart(&mut self, peer: usize, collision_time: i64) {
        if peer == self.index || collision_time <= self.resolved_collision {
            return;
        }
        let acked = self.restart_acks.entry(peer).or_insert(collision_time);
        *acked = (*acked).max(collision_time);
    }

    /// Later collision wins; returns whether the instant moved.
    fn adopt_collision(&mut self, collision_time: i64) -> bool {
        if collision_time <= self.resolved_collision {
            return false;
        }
        if self.collision_time.is_some_and(|current| current >= collision_time) {
            return false;
        }
        self.collision_time = Some(collision_time);
        // Acknowledgements for earlier collisions no longer count.
        self.restart_acks.retain(|_, acked| *acked >= collision_time);
        true
    }

    fn announce_restart(&mut self, now: i64) -> Option<Envelope> {
        let collision_time = self.collision_time?;
        if self.restart_sent_for == Some(collision_time) {
            return None;
        }
        self.restart_sent_for = Some(collision_time);
        Some(Envelope::from_pendulum(
            self.index,
            vec![Address::Pendulums],
            now,
            Payload::Restart { collision_time },
        ))
    }

    fn restart_eligible(&self, now: i64) -> bool {
        let Some(collision_time) = self.collision_time else {
            return false;
        };
        if now <= collision_time + self.restart_timeout_ms {
            return false;
        }
        (0..self.options.len())
            .filter(|peer| *peer != self.index)
            .all(|peer| {
                self.restart_acks
                    .get(&peer)
                    .is_some_and(|acked| *acked >= collision_time)
            })
    }

    fn restart(&mut self, now: i64) -> Result<(), PendulumError> {
        if let Some(collision_time) = self.collision_time {
            self.resolved_collision = collision_time;
        }
        let resolved = self.resolved_collision;
        self.restart_acks.retain(|_, acked| *acked > resolved);
        self.collision_time = None;
        self.restart_sent_for = None;
        self.start_time = now;
        self.reset_to_initial(PendulumStatus::Running)?;
        tracing::info!(pendulum = self.index, restart_time = now, "Pendulum restarted");
        Ok(())
    }

    fn clear_collision(&mut self) {
        if let Some(collision_time) = self.collision_time.take() {
            self.resolved_collision = self.resolved_collision.max(collision_time);
        }
        self.restart_sent_for = None;
    }

    // ------------------------------------------------------------------
    // Motion
    // ------------------------------------------------------------------

    fn pendulum(&self) -> Result<&PendulumOptions, PendulumError> {
        self.options
            .pendulum(self.index)
            .ok_or(PendulumError::MissingOptions(self.index))
    }

    fn compute(&mut self, now: i64) -> Result<(), PendulumError> {
        let elapsed_secs = (now - self.start_time) as f64 / 1000.0;
        let pendulum = self.pendulum()?;
        let angle = physics::angle_at(elapsed_secs, pendulum, &self.options.wind);
        let position = physics::position_for(angle, pendulum);
        self.set_motion(angle, position)
    }

    fn reset_to_initial(&mut self, status: PendulumStatus) -> Result<(), PendulumError> {
        let pendulum = self.pendulum()?;
        let angle = pendulum.angle;
        let position = physics::position_for(angle, pendulum);
        self.state.status = status;
        self.set_motion(angle, position)
    }

    fn set_motion(
        &mut self,
        angle: f64,
        position: shared_types::Position,
    ) -> Result<(), PendulumError> {
        if !angle.is_finite() || !position.is_finite() {
            return Err(PendulumError::NonFinite {
                index: self.index,
                angle,
            });
        }
        self.state.angle = angle;
        self.state.position = position;
        self.slot.publish(&self.state);
        Ok(())
    }

    fn state_message(&self, to: Vec<Address>, time: i64) -> Envelope {
        Envelope::new(
            Origin::Pendulum(self.index),
            to,
            time,
            Payload::State { state: self.state },
        )
    }
}
