// Motor diagnostic: READ-ONLY listing of the tacho motors the runtime would use
//
// This tool does NOT write anything to the motors - it's completely safe.
// Run it before ev3car-drive to check both motors are plugged in.
//
// Usage: cargo run --example motor_diagnostic -- [config.json]

use ev3car_runtime::config::VehicleConfig;
use ev3car_runtime::motor::tacho::{Attribute, TachoMotor};
use std::path::Path;

const ATTRIBUTES: [Attribute; 6] = [
    Attribute::DriverName,
    Attribute::State,
    Attribute::Position,
    Attribute::DutyCycle,
    Attribute::MaxSpeed,
    Attribute::StopAction,
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("debug".parse().unwrap()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => VehicleConfig::load(Path::new(&path))?,
        None => VehicleConfig::default(),
    };

    println!("ev3car motor diagnostic (read-only)");
    println!("Tacho class directory: {}", config.sysfs_root);
    println!();

    println!("Step 1: Listing tacho motors...");
    let motors = match TachoMotor::list(Path::new(&config.sysfs_root)) {
        Ok(motors) => motors,
        Err(e) => {
            println!("  ✗ Failed to list motors: {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Are you running on ev3dev?");
            println!("  - Check the motor cables are plugged into the output ports");
            return Err(e.into());
        }
    };
    for motor in &motors {
        println!("  {} at {}", motor.address(), motor.path().display());
    }
    println!();

    println!("Step 2: Checking configured ports...");
    let mut all_found = true;
    for (role, port) in [("Steering", &config.steer_port), ("Traction", &config.drive_port)] {
        match motors.iter().find(|m| m.address() == port.as_str()) {
            Some(motor) => {
                println!("  ✓ {} motor on {}", role, port);
                for attr in ATTRIBUTES {
                    match motor.read_attr(attr) {
                        Ok(value) => println!("      {:<14} {}", attr.file_name(), value),
                        Err(e) => println!("      {:<14} ERROR - {}", attr.file_name(), e),
                    }
                }
            }
            None => {
                println!("  ✗ {} motor NOT FOUND on {}", role, port);
                all_found = false;
            }
        }
    }
    println!();

    if all_found {
        println!("Both motors found. Next step: ev3car-drive <port> <timeout_ms>");
    } else {
        println!("⚠ WARNING: ev3car-drive will refuse to start until both motors are connected");
    }

    Ok(())
}
