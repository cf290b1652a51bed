// Actuator control for the ev3 car (steering + traction)
//
// Provides:
// - The `Actuators` contract used by the safety loop
// - ev3dev tacho-motor sysfs driver
// - Steering calibration (mechanical limits -> left/center/right positions)
// - A simulated vehicle for running without hardware

mod driver;
pub mod sim;
pub mod steering;
pub mod tacho;

pub use driver::CarDriver;
pub use sim::SimActuators;
pub use steering::SteeringCalibration;
pub use tacho::{TachoCommand, TachoMotor};

/// Where the steering actuator should point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SteeringTarget {
    Left,
    Right,
    Center,
}

/// Traction set-point: direct duty cycle (percent, signed) or stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traction {
    Duty(i16),
    Stop,
}

/// Error types for actuator access
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No tacho motor connected on {port}")]
    NotConnected { port: String },

    #[error("Could not parse {attribute} value {value:?}")]
    Parse { attribute: String, value: String },

    #[error("Steering calibration failed: {0}")]
    Calibration(String),
}

/// Narrow actuator interface the safety loop drives.
///
/// Calls are synchronous and short; connection problems are caught when the
/// implementation is constructed, so per-call errors are only logged.
pub trait Actuators {
    fn set_steering_target(&mut self, target: SteeringTarget) -> Result<(), ActuatorError>;

    fn set_traction(&mut self, traction: Traction) -> Result<(), ActuatorError>;

    /// Current traction encoder position (tacho counts)
    fn traction_position(&mut self) -> Result<i32, ActuatorError>;

    /// Halt steering and traction immediately
    fn stop_all(&mut self) -> Result<(), ActuatorError>;
}

impl<A: Actuators + ?Sized> Actuators for Box<A> {
    fn set_steering_target(&mut self, target: SteeringTarget) -> Result<(), ActuatorError> {
        (**self).set_steering_target(target)
    }

    fn set_traction(&mut self, traction: Traction) -> Result<(), ActuatorError> {
        (**self).set_traction(traction)
    }

    fn traction_position(&mut self) -> Result<i32, ActuatorError> {
        (**self).traction_position()
    }

    fn stop_all(&mut self) -> Result<(), ActuatorError> {
        (**self).stop_all()
    }
}
