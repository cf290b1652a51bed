// Command interpretation: decoded packet -> actuation intent
// Pure mapping, the safety loop applies the result.

use crate::config::DEFAULT_DRIVE_DUTY;
use crate::messages::{Command, ControlPacket};
use crate::motor::{SteeringTarget, Traction};
use crate::tracker::OnReach;

/// Travel request relative to the traction position at apply time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedTravel {
    /// Signed tacho counts added to the current position
    pub distance: i16,
    pub on_reach: OnReach,
}

/// What one packet asks the actuators to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuationIntent {
    /// No actuator change (keep-alive)
    Hold,
    /// Full stop of both actuators, discarding any travel target
    StopAll,
    Drive {
        /// `None` leaves the steering where it is
        steering: Option<SteeringTarget>,
        traction: Traction,
        bounded_travel: Option<BoundedTravel>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    duty: i16,
}

impl Interpreter {
    /// `duty` is the traction magnitude in percent
    pub fn new(duty: i16) -> Self {
        Self {
            duty: duty.clamp(0, 100),
        }
    }

    pub fn interpret(&self, packet: &ControlPacket) -> ActuationIntent {
        match packet.command {
            Command::KeepAlive => ActuationIntent::Hold,
            Command::Stop => ActuationIntent::StopAll,
            Command::Forward => ActuationIntent::Drive {
                steering: Some(SteeringTarget::Center),
                traction: Traction::Duty(self.duty),
                bounded_travel: None,
            },
            Command::Backward => ActuationIntent::Drive {
                steering: Some(SteeringTarget::Center),
                traction: Traction::Duty(-self.duty),
                bounded_travel: None,
            },
            Command::Turn => {
                let steering = match packet.param2 {
                    0 => SteeringTarget::Center,
                    p if p > 0 => SteeringTarget::Left,
                    _ => SteeringTarget::Right,
                };
                let bounded_travel = (packet.param2 != 0).then_some(BoundedTravel {
                    distance: packet.param2,
                    on_reach: OnReach::RecenterSteering,
                });
                ActuationIntent::Drive {
                    steering: Some(steering),
                    traction: self.traction_for(packet.param1),
                    bounded_travel,
                }
            }
            // Steering is left as-is before braking
            Command::TurnThenStop => ActuationIntent::Drive {
                steering: None,
                traction: self.traction_for(packet.param1),
                bounded_travel: Some(BoundedTravel {
                    distance: packet.param2,
                    on_reach: OnReach::StopAll,
                }),
            },
        }
    }

    /// Positive param1 drives forward, anything else reverses
    fn traction_for(&self, param1: i16) -> Traction {
        if param1 > 0 {
            Traction::Duty(self.duty)
        } else {
            Traction::Duty(-self.duty)
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_DRIVE_DUTY)
    }
}
