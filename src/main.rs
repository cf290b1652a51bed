use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ev3car_runtime::config::{MAX_TIMEOUT_MS, VehicleConfig};
use ev3car_runtime::runtime::{self, RunSettings};

/// Drive an ev3 car from UDP control packets, stopping when they stop
#[derive(Debug, Parser)]
#[command(name = "ev3car-drive", version, after_help = "example:\n  ev3car-drive 8003 500")]
struct Args {
    /// UDP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Stop the motors after this long without a packet (ms)
    #[arg(value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_MS))]
    timeout_ms: u64,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Vehicle config (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against a simulated car instead of the motors
    #[arg(long)]
    simulate: bool,

    /// Keep running when stdin is closed
    #[arg(long)]
    ignore_stdin: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=debug for per-packet output)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();

    let vehicle = match &args.config {
        Some(path) => match VehicleConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("ev3car-drive: {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => VehicleConfig::default(),
    };

    let settings = RunSettings {
        bind: SocketAddr::new(args.bind, args.port),
        recv_timeout: Duration::from_millis(args.timeout_ms),
        vehicle,
        simulate: args.simulate,
        watch_stdin: !args.ignore_stdin,
    };

    match runtime::run(settings).await {
        Ok(reason) => info!("Bye ({:?})", reason),
        Err(e) => {
            eprintln!("Runtime error: {}", e);
            std::process::exit(1);
        }
    }
}
