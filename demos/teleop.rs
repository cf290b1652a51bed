// Keyboard teleop: W/S drive, A/D turn, E/C turn-then-stop, Space stop, R/F turn distance, Q quit
//
// Usage: cargo run --example teleop -- <car-ip>:<port>
// Example: cargo run --example teleop -- 192.168.0.104:8003
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use ev3car_runtime::messages::{Command, ControlPacket};
use std::net::SocketAddr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tracing::{debug, info};

const TURN_DISTANCES: [i16; 3] = [90, 180, 360]; // tacho counts
const KEEPALIVE_PERIOD: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // RUST_LOG=teleop=debug prints every packet sent
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .init();

    let car: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8003".to_string())
        .parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(car).await?;
    info!("Sending control packets to {}", car);

    info!("Controls: W/S=drive, A/D=turn, E/C=turn-then-stop, Space=stop, R/F=distance, Q=quit");
    info!("Turn distance: {}", TURN_DISTANCES[0]);

    enable_raw_mode()?;
    let result = run_teleop(&socket).await;
    disable_raw_mode()?;

    // Leave the car stopped rather than waiting for its timeout
    send(&socket, ControlPacket::new(Command::Stop, 0, 0)).await?;

    result
}

async fn run_teleop(socket: &UdpSocket) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut distance_idx: usize = 0;
    let mut forward = true;
    let mut last_sent = Instant::now();

    loop {
        let mut packet = None;

        // Poll for key with 20ms timeout
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let direction = if forward { 1 } else { -1 };
                let distance = TURN_DISTANCES[distance_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        forward = true;
                        packet = Some(ControlPacket::new(Command::Forward, 1, 0));
                    }
                    KeyCode::Char('s') if pressed => {
                        forward = false;
                        packet = Some(ControlPacket::new(Command::Backward, -1, 0));
                    }
                    KeyCode::Char('a') if pressed => {
                        packet = Some(ControlPacket::new(Command::Turn, direction, distance));
                    }
                    KeyCode::Char('d') if pressed => {
                        packet = Some(ControlPacket::new(Command::Turn, direction, -distance));
                    }
                    KeyCode::Char('e') if pressed => {
                        packet = Some(ControlPacket::new(
                            Command::TurnThenStop,
                            direction,
                            distance * direction,
                        ));
                    }
                    KeyCode::Char('c') if pressed => {
                        packet = Some(ControlPacket::new(Command::Turn, direction, 0));
                    }
                    KeyCode::Char(' ') if pressed => {
                        packet = Some(ControlPacket::new(Command::Stop, 0, 0));
                    }

                    // Turn distance
                    KeyCode::Char('r') if pressed => {
                        distance_idx = (distance_idx + 1).min(TURN_DISTANCES.len() - 1);
                        info!("Turn distance: {}", TURN_DISTANCES[distance_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        distance_idx = distance_idx.saturating_sub(1);
                        info!("Turn distance: {}", TURN_DISTANCES[distance_idx]);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Keep the car's receive timeout from firing between key presses
        if packet.is_none() && last_sent.elapsed() >= KEEPALIVE_PERIOD {
            packet = Some(ControlPacket::new(Command::KeepAlive, 0, 0));
        }

        if let Some(packet) = packet {
            send(socket, packet).await?;
            last_sent = Instant::now();
        }
    }

    Ok(())
}

async fn send(
    socket: &UdpSocket,
    packet: ControlPacket,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let timestamp_us = SystemTime::now().duration_since(UNIX_EPOCH)?.as_micros() as u64;
    let packet = packet.with_timestamp(timestamp_us);
    socket.send(&packet.encode()).await?;
    debug!("Sent {}", serde_json::to_string(&packet)?);
    Ok(())
}
