// Timeouts, ports, vehicle configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::motor::tacho::{DEFAULT_SYSFS_ROOT, StopAction};

// Full traction duty cycle (percent) for Forward/Backward/Turn
pub const DEFAULT_DRIVE_DUTY: i16 = 100;

// Bounded-motion tracker poll period while a travel target is armed
pub const DEFAULT_TRACKER_POLL: Duration = Duration::from_micros(1500);

// CLI limits
pub const MAX_TIMEOUT_MS: u64 = 10_000;

// Default tacho ports: traction on A, steering on B
pub const DEFAULT_DRIVE_PORT: &str = "ev3-ports:outA";
pub const DEFAULT_STEER_PORT: &str = "ev3-ports:outB";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Vehicle hardware settings, loaded from an optional JSON file.
/// Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub sysfs_root: String,
    pub steer_port: String,
    pub drive_port: String,
    /// Traction duty magnitude in percent (1-100)
    pub drive_duty: i16,
    /// Duty used to push the steering into each mechanical limit
    pub steering_sweep_duty: i16,
    pub steering_sweep_ms: u64,
    /// Wait after centering the steering before the loop starts
    pub steering_settle_ms: u64,
    pub drive_ramp_up_ms: u32,
    /// What the traction motor does on stop: "coast", "brake" or "hold"
    pub drive_stop_action: StopAction,
    pub tracker_poll_us: u64,
    /// Known [left, right] steering limits; skips the startup sweep
    pub steering_limits: Option<[i32; 2]>,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            sysfs_root: DEFAULT_SYSFS_ROOT.to_string(),
            steer_port: DEFAULT_STEER_PORT.to_string(),
            drive_port: DEFAULT_DRIVE_PORT.to_string(),
            drive_duty: DEFAULT_DRIVE_DUTY,
            steering_sweep_duty: 100,
            steering_sweep_ms: 3000,
            steering_settle_ms: 1500,
            drive_ramp_up_ms: 500,
            drive_stop_action: StopAction::Brake,
            tracker_poll_us: DEFAULT_TRACKER_POLL.as_micros() as u64,
            steering_limits: None,
        }
    }
}

impl VehicleConfig {
    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.drive_duty) {
            return Err(ConfigError::Invalid(format!(
                "drive_duty must be in 1..=100, got {}",
                self.drive_duty
            )));
        }
        if !(1..=100).contains(&self.steering_sweep_duty) {
            return Err(ConfigError::Invalid(format!(
                "steering_sweep_duty must be in 1..=100, got {}",
                self.steering_sweep_duty
            )));
        }
        if self.tracker_poll_us == 0 {
            return Err(ConfigError::Invalid(
                "tracker_poll_us must be non-zero".to_string(),
            ));
        }
        if self.steer_port == self.drive_port {
            return Err(ConfigError::Invalid(format!(
                "steering and traction share port {}",
                self.steer_port
            )));
        }
        Ok(())
    }

    pub fn tracker_poll(&self) -> Duration {
        Duration::from_micros(self.tracker_poll_us)
    }

    pub fn steering_sweep(&self) -> Duration {
        Duration::from_millis(self.steering_sweep_ms)
    }

    pub fn steering_settle(&self) -> Duration {
        Duration::from_millis(self.steering_settle_ms)
    }
}
