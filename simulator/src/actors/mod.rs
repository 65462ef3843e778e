pub mod pendulum;
pub mod protocol;

pub use pendulum::{PendulumActor, PendulumArguments, PendulumMsg};
pub use protocol::{Address, Envelope, Origin, Payload};
