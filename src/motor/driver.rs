// High-level actuator driver for the ev3 car
//
// Combines the steering (medium motor) and traction (large motor) tacho
// motors behind the `Actuators` contract used by the safety loop.

use std::path::Path;
use std::thread::sleep;
use tracing::{info, warn};

use super::steering::SteeringCalibration;
use super::tacho::{StopAction, TachoCommand, TachoMotor};
use super::{ActuatorError, Actuators, SteeringTarget, Traction};
use crate::config::VehicleConfig;

/// Steering + traction motors of the car
pub struct CarDriver {
    steer: TachoMotor,
    drive: TachoMotor,
    calibration: SteeringCalibration,
}

impl CarDriver {
    /// Find both motors, calibrate the steering and prepare traction.
    ///
    /// Blocks for the steering sweep and settle time. Fails if either motor
    /// is not connected.
    pub fn connect(config: &VehicleConfig) -> Result<Self, ActuatorError> {
        let root = Path::new(&config.sysfs_root);
        info!(
            "Looking for steering on {} and traction on {} under {}",
            config.steer_port,
            config.drive_port,
            root.display()
        );
        let steer = TachoMotor::find(root, &config.steer_port)?;
        let drive = TachoMotor::find(root, &config.drive_port)?;

        // Steering
        steer.run(TachoCommand::Reset)?;
        steer.set_stop_action(StopAction::Brake)?;

        let calibration = match config.steering_limits {
            Some([left, right]) => {
                info!("Using configured steering limits");
                SteeringCalibration::from_limits(left, right)?
            }
            None => Self::sweep_steering(&steer, config)?,
        };

        steer.run_to_abs_pos(calibration.center)?;
        sleep(config.steering_settle());
        info!(
            "Steering calibrated: left {}, right {}, center {}, pos {}",
            calibration.left_limit,
            calibration.right_limit,
            calibration.center,
            steer.position()?
        );

        // Traction
        drive.run(TachoCommand::Reset)?;
        drive.set_stop_action(config.drive_stop_action)?;
        drive.set_ramp_up_sp(config.drive_ramp_up_ms)?;

        info!("Motors initialized successfully");
        Ok(Self {
            steer,
            drive,
            calibration,
        })
    }

    /// Push the steering into each mechanical limit and record the positions
    fn sweep_steering(
        steer: &TachoMotor,
        config: &VehicleConfig,
    ) -> Result<SteeringCalibration, ActuatorError> {
        let duty = i32::from(config.steering_sweep_duty);
        info!("Sweeping steering to its limits ({}% duty)", duty);

        steer.run_direct(-duty)?;
        sleep(config.steering_sweep());
        steer.stop()?;
        let right = steer.position()?;

        steer.run_direct(duty)?;
        sleep(config.steering_sweep());
        steer.stop()?;
        let left = steer.position()?;

        SteeringCalibration::from_limits(left, right)
    }

    pub fn calibration(&self) -> SteeringCalibration {
        self.calibration
    }
}

impl Actuators for CarDriver {
    fn set_steering_target(&mut self, target: SteeringTarget) -> Result<(), ActuatorError> {
        self.steer
            .run_to_abs_pos(self.calibration.position_for(target))
    }

    fn set_traction(&mut self, traction: Traction) -> Result<(), ActuatorError> {
        match traction {
            Traction::Duty(duty) => self.drive.run_direct(i32::from(duty)),
            Traction::Stop => self.drive.stop(),
        }
    }

    fn traction_position(&mut self) -> Result<i32, ActuatorError> {
        self.drive.position()
    }

    fn stop_all(&mut self) -> Result<(), ActuatorError> {
        // Attempt both even if the first fails
        let steer = self.steer.stop();
        let drive = self.set_traction(Traction::Stop);
        steer.and(drive)
    }
}

impl Drop for CarDriver {
    fn drop(&mut self) {
        if let Err(e) = self.stop_all() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
