// ev3dev tacho-motor sysfs driver
//
// Each motor is a directory under /sys/class/tacho-motor/motorN with one
// file per attribute. Reads return a trimmed string, writes replace the value.
// Motors are matched by their `address` attribute (e.g. "ev3-ports:outA").

use std::fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ActuatorError;

/// Default sysfs class directory for tacho motors
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/tacho-motor";

/// Attribute files used by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Address,
    DriverName,
    Command,
    State,
    Position,
    PositionSp,
    DutyCycle,
    DutyCycleSp,
    SpeedSp,
    MaxSpeed,
    StopAction,
    RampUpSp,
}

impl Attribute {
    pub fn file_name(self) -> &'static str {
        match self {
            Attribute::Address => "address",
            Attribute::DriverName => "driver_name",
            Attribute::Command => "command",
            Attribute::State => "state",
            Attribute::Position => "position",
            Attribute::PositionSp => "position_sp",
            Attribute::DutyCycle => "duty_cycle",
            Attribute::DutyCycleSp => "duty_cycle_sp",
            Attribute::SpeedSp => "speed_sp",
            Attribute::MaxSpeed => "max_speed",
            Attribute::StopAction => "stop_action",
            Attribute::RampUpSp => "ramp_up_sp",
        }
    }
}

/// Values accepted by the `command` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TachoCommand {
    /// Run at `duty_cycle_sp` until told otherwise
    RunDirect,
    /// Move to `position_sp` at `speed_sp`
    RunToAbsPos,
    Stop,
    /// Zero the position counter and restore default attributes
    Reset,
}

impl TachoCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            TachoCommand::RunDirect => "run-direct",
            TachoCommand::RunToAbsPos => "run-to-abs-pos",
            TachoCommand::Stop => "stop",
            TachoCommand::Reset => "reset",
        }
    }
}

/// Stop action applied when a `stop` command is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopAction {
    Coast,
    Brake,
    Hold,
}

impl StopAction {
    pub fn as_str(self) -> &'static str {
        match self {
            StopAction::Coast => "coast",
            StopAction::Brake => "brake",
            StopAction::Hold => "hold",
        }
    }
}

pub type Result<T> = std::result::Result<T, ActuatorError>;

/// Handle to one tacho motor's sysfs directory
#[derive(Debug, Clone)]
pub struct TachoMotor {
    path: PathBuf,
    address: String,
}

impl TachoMotor {
    /// Find the motor plugged into `port` (matched against `address`)
    pub fn find(root: &Path, port: &str) -> Result<Self> {
        let not_connected = || ActuatorError::NotConnected {
            port: port.to_string(),
        };

        let motors = Self::list(root).map_err(|e| match e {
            ActuatorError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => not_connected(),
            other => other,
        })?;

        motors
            .into_iter()
            .find(|m| m.address == port)
            .ok_or_else(not_connected)
    }

    /// All tacho motors currently present under `root`, sorted by directory name
    pub fn list(root: &Path) -> Result<Vec<Self>> {
        let mut motors = Vec::new();

        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with("motor") {
                continue;
            }

            let path = entry.path();
            let address = read_trimmed(&path.join(Attribute::Address.file_name()))?;
            debug!("Found tacho motor {} at {}", address, path.display());
            motors.push(Self { path, address });
        }

        motors.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(motors)
    }

    /// Open a motor directory directly
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let address = read_trimmed(&path.join(Attribute::Address.file_name()))?;
        Ok(Self { path, address })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a raw attribute value
    pub fn read_attr(&self, attr: Attribute) -> Result<String> {
        read_trimmed(&self.path.join(attr.file_name()))
    }

    /// Read an integer attribute
    pub fn read_i32(&self, attr: Attribute) -> Result<i32> {
        let raw = self.read_attr(attr)?;
        raw.parse().map_err(|_| ActuatorError::Parse {
            attribute: attr.file_name().to_string(),
            value: raw,
        })
    }

    /// Write a raw attribute value
    pub fn write_attr(&self, attr: Attribute, value: &str) -> Result<()> {
        debug!("{} <- {}={}", self.address, attr.file_name(), value);
        fs::write(self.path.join(attr.file_name()), value)?;
        Ok(())
    }

    pub fn write_i32(&self, attr: Attribute, value: i32) -> Result<()> {
        self.write_attr(attr, &value.to_string())
    }

    // === High-level convenience methods ===

    pub fn driver_name(&self) -> Result<String> {
        self.read_attr(Attribute::DriverName)
    }

    pub fn position(&self) -> Result<i32> {
        self.read_i32(Attribute::Position)
    }

    pub fn duty_cycle(&self) -> Result<i32> {
        self.read_i32(Attribute::DutyCycle)
    }

    pub fn max_speed(&self) -> Result<i32> {
        self.read_i32(Attribute::MaxSpeed)
    }

    /// Running/holding/stalled flags, space separated
    pub fn state(&self) -> Result<Vec<String>> {
        Ok(self
            .read_attr(Attribute::State)?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    pub fn set_duty_cycle_sp(&self, duty: i32) -> Result<()> {
        self.write_i32(Attribute::DutyCycleSp, duty.clamp(-100, 100))
    }

    pub fn set_position_sp(&self, position: i32) -> Result<()> {
        self.write_i32(Attribute::PositionSp, position)
    }

    pub fn set_speed_sp(&self, speed: i32) -> Result<()> {
        self.write_i32(Attribute::SpeedSp, speed)
    }

    pub fn set_ramp_up_sp(&self, ms: u32) -> Result<()> {
        self.write_attr(Attribute::RampUpSp, &ms.to_string())
    }

    pub fn set_stop_action(&self, action: StopAction) -> Result<()> {
        self.write_attr(Attribute::StopAction, action.as_str())
    }

    pub fn run(&self, command: TachoCommand) -> Result<()> {
        self.write_attr(Attribute::Command, command.as_str())
    }

    pub fn stop(&self) -> Result<()> {
        self.run(TachoCommand::Stop)
    }

    /// Drive to an absolute position at full speed
    pub fn run_to_abs_pos(&self, position: i32) -> Result<()> {
        self.set_speed_sp(self.max_speed()?)?;
        self.set_position_sp(position)?;
        self.run(TachoCommand::RunToAbsPos)
    }

    /// Run open-loop at the given duty cycle
    pub fn run_direct(&self, duty: i32) -> Result<()> {
        self.set_duty_cycle_sp(duty)?;
        self.run(TachoCommand::RunDirect)
    }
}

fn read_trimmed(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Fake sysfs trees for tests
#[cfg(test)]
pub(crate) mod fake {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    /// A temporary `tacho-motor` class directory, removed on drop
    pub struct FakeSysfs {
        pub root: PathBuf,
    }

    impl FakeSysfs {
        pub fn new() -> Self {
            let root = std::env::temp_dir().join(format!(
                "ev3car-tacho-{}-{}",
                std::process::id(),
                NEXT_ID.fetch_add(1, Ordering::Relaxed)
            ));
            fs::create_dir_all(&root).unwrap();
            Self { root }
        }

        /// Add motorN with the given address and default attribute values
        pub fn add_motor(&self, index: usize, address: &str, driver: &str) -> PathBuf {
            let dir = self.root.join(format!("motor{}", index));
            fs::create_dir_all(&dir).unwrap();
            for (file, value) in [
                ("address", address),
                ("driver_name", driver),
                ("command", ""),
                ("state", ""),
                ("position", "0"),
                ("position_sp", "0"),
                ("duty_cycle", "0"),
                ("duty_cycle_sp", "0"),
                ("speed_sp", "0"),
                ("max_speed", "1560"),
                ("stop_action", "coast"),
                ("ramp_up_sp", "0"),
            ] {
                fs::write(dir.join(file), format!("{}\n", value)).unwrap();
            }
            dir
        }

        pub fn set(dir: &Path, file: &str, value: &str) {
            fs::write(dir.join(file), format!("{}\n", value)).unwrap();
        }

        pub fn get(dir: &Path, file: &str) -> String {
            fs::read_to_string(dir.join(file)).unwrap().trim().to_string()
        }
    }

    impl Drop for FakeSysfs {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }
}
