// Simulated car for running the runtime without ev3 hardware
//
// Traction position is integrated from the duty cycle over tokio time,
// so bounded travel targets complete the same way they would on the car.

use tokio::time::Instant;
use tracing::debug;

use super::{ActuatorError, Actuators, SteeringTarget, Traction};

/// Tacho counts per second at 100% duty (roughly an ev3 large motor)
pub const DEFAULT_COUNTS_PER_SEC: f64 = 1000.0;

pub struct SimActuators {
    steering: SteeringTarget,
    duty: i16,
    position: f64,
    updated_at: Instant,
    counts_per_sec: f64,
}

impl SimActuators {
    pub fn new() -> Self {
        Self::with_speed(DEFAULT_COUNTS_PER_SEC)
    }

    pub fn with_speed(counts_per_sec: f64) -> Self {
        Self {
            steering: SteeringTarget::Center,
            duty: 0,
            position: 0.0,
            updated_at: Instant::now(),
            counts_per_sec,
        }
    }

    pub fn steering(&self) -> SteeringTarget {
        self.steering
    }

    pub fn duty(&self) -> i16 {
        self.duty
    }

    /// Advance the traction position up to now
    fn integrate(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.updated_at).as_secs_f64();
        self.position += f64::from(self.duty) / 100.0 * self.counts_per_sec * dt;
        self.updated_at = now;
    }
}

impl Default for SimActuators {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuators for SimActuators {
    fn set_steering_target(&mut self, target: SteeringTarget) -> Result<(), ActuatorError> {
        debug!("sim: steering -> {:?}", target);
        self.steering = target;
        Ok(())
    }

    fn set_traction(&mut self, traction: Traction) -> Result<(), ActuatorError> {
        self.integrate();
        debug!("sim: traction -> {:?}", traction);
        self.duty = match traction {
            Traction::Duty(duty) => duty.clamp(-100, 100),
            Traction::Stop => 0,
        };
        Ok(())
    }

    fn traction_position(&mut self) -> Result<i32, ActuatorError> {
        self.integrate();
        Ok(self.position.round() as i32)
    }

    fn stop_all(&mut self) -> Result<(), ActuatorError> {
        self.integrate();
        debug!("sim: stop all at position {:.0}", self.position);
        self.duty = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_position_follows_duty() {
        let mut sim = SimActuators::with_speed(1000.0);
        sim.set_traction(Traction::Duty(100)).unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(sim.traction_position().unwrap(), 500);

        sim.set_traction(Traction::Duty(-50)).unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(sim.traction_position().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_freezes_position() {
        let mut sim = SimActuators::new();
        sim.set_steering_target(SteeringTarget::Left).unwrap();
        sim.set_traction(Traction::Duty(100)).unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        sim.stop_all().unwrap();
        let stopped_at = sim.traction_position().unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(sim.traction_position().unwrap(), stopped_at);
        assert_eq!(sim.duty(), 0);
        assert_eq!(sim.steering(), SteeringTarget::Left);
    }
}
