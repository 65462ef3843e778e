//! Pendulum motion and body overlap.
//!
//! Small-angle harmonic motion (see
//! <https://www.acs.psu.edu/drussell/Demos/Pendulum/Pendulum.html>) with a
//! constant angular offset produced by wind pressure on the bob.

use shared_types::{PendulumOptions, Position, WindOptions};

/// Gravitational acceleration in m/s^2
pub const GRAVITY: f64 = 9.81;
/// Air density at sea level in kg/m^3
pub const AIR_DENSITY: f64 = 1.225;

/// Constant angular offset caused by the wind on this pendulum.
pub fn wind_offset(pendulum: &PendulumOptions, wind: &WindOptions) -> f64 {
    if !wind.enabled || wind.velocity <= 0.0 {
        return 0.0;
    }

    let velocity = wind.velocity / 3.6;
    let pressure = 0.5 * AIR_DENSITY * velocity;
    let area = std::f64::consts::PI * pendulum.radius.powi(2);
    let force = pressure * area;

    force / ((pendulum.mass / 100.0) * GRAVITY) * wind.direction.cos()
}

/// Angle after `elapsed_secs` of motion. Negative time is clamped to zero.
pub fn angle_at(elapsed_secs: f64, pendulum: &PendulumOptions, wind: &WindOptions) -> f64 {
    let t = elapsed_secs.max(0.0);
    let omega = (GRAVITY / pendulum.length).sqrt();
    pendulum.angle * (omega * t).cos() + wind_offset(pendulum, wind)
}

/// Bob center for a given angle, hanging below the anchor.
pub fn position_for(angle: f64, pendulum: &PendulumOptions) -> Position {
    let anchor = pendulum.anchor;
    if angle == 0.0 {
        return Position::new(anchor.x, anchor.y + pendulum.length);
    }

    Position::new(
        anchor.x + angle.signum() * angle.abs().sin() * pendulum.length,
        anchor.y + angle.abs().cos() * pendulum.length,
    )
}

/// True when two bobs touch or overlap.
pub fn bodies_overlap(a: Position, a_radius: f64, b: Position, b_radius: f64) -> bool {
    a.distance_to(&b) <= a_radius + b_radius
}
