// Safety loop: receive with timeout -> decode -> interpret -> actuate
// Note: the receive timeout is the fail-safe. If the drive controller goes
// quiet for longer than the timeout, both actuators are stopped.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, DEFAULT_TRACKER_POLL, VehicleConfig};
use crate::interpreter::{ActuationIntent, Interpreter};
use crate::messages::{CONTROL_PACKET_BYTES, ControlPacket};
use crate::motor::{ActuatorError, Actuators, CarDriver, SimActuators, SteeringTarget};
use crate::tracker::{MotionTarget, MotionTracker, OnReach};
use crate::transport::{DatagramSource, UdpReceiver};

/// Lifecycle of the safety loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// Why the loop was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator interrupt (SIGINT or SIGTERM)
    Interrupt,
    /// Parent process closed our stdin
    EndOfInput,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("Actuator error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Startup task failed: {0}")]
    Startup(#[from] tokio::task::JoinError),

    #[error("Safety loop has already run")]
    AlreadyRan,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Longest wait for a datagram before the fail-safe stop
    pub recv_timeout: Duration,
    /// Traction position poll period while a travel target is armed
    pub tracker_poll: Duration,
}

impl LoopConfig {
    pub fn new(recv_timeout: Duration) -> Self {
        Self {
            recv_timeout,
            tracker_poll: DEFAULT_TRACKER_POLL,
        }
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub packets: u64,
    pub dropped: u64,
    pub timeouts: u64,
}

pub struct SafetyLoop<S, A> {
    source: S,
    actuators: A,
    interpreter: Interpreter,
    tracker: MotionTracker,
    config: LoopConfig,
    state: LoopState,
    stats: LoopStats,
}

impl<S: DatagramSource, A: Actuators> SafetyLoop<S, A> {
    pub fn new(source: S, actuators: A, interpreter: Interpreter, config: LoopConfig) -> Self {
        Self {
            source,
            actuators,
            interpreter,
            tracker: MotionTracker::new(),
            config,
            state: LoopState::Idle,
            stats: LoopStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn motion_target(&self) -> Option<&MotionTarget> {
        self.tracker.target()
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }

    /// Run until `shutdown` carries a reason or the transport fails.
    ///
    /// The stop signal is only looked at between iterations. Both exits go
    /// through draining, which stops the actuators exactly once.
    pub async fn run(
        &mut self,
        shutdown: watch::Receiver<Option<StopReason>>,
    ) -> Result<StopReason, RuntimeError> {
        if self.state != LoopState::Idle {
            return Err(RuntimeError::AlreadyRan);
        }

        self.set_state(LoopState::Running);
        info!(
            "Safety loop running: {}ms receive timeout, {}us tracker poll",
            self.config.recv_timeout.as_millis(),
            self.config.tracker_poll.as_micros()
        );

        let mut buf = [0u8; CONTROL_PACKET_BYTES];
        let mut deadline = Instant::now() + self.config.recv_timeout;
        let mut tracker_tick = interval(self.config.tracker_poll);
        tracker_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            if let Some(reason) = *shutdown.borrow() {
                info!("Stop requested: {:?}", reason);
                break Ok(reason);
            }

            let armed = self.tracker.is_armed();
            tokio::select! {
                biased;

                received = self.source.recv(&mut buf) => match received {
                    Ok(len) => {
                        // Any datagram means the controller is still talking
                        deadline = Instant::now() + self.config.recv_timeout;
                        self.on_datagram(&buf[..len]);
                    }
                    Err(e) => {
                        error!("Error while receiving control packet: {}", e);
                        break Err(RuntimeError::Transport(e));
                    }
                },

                _ = sleep_until(deadline) => {
                    self.on_timeout();
                    deadline = Instant::now() + self.config.recv_timeout;
                }

                _ = tracker_tick.tick(), if armed => self.poll_tracker(),
            }
        };

        self.drain();
        outcome
    }

    fn set_state(&mut self, state: LoopState) {
        debug!("Safety loop {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    fn on_datagram(&mut self, data: &[u8]) {
        match ControlPacket::decode(data) {
            Ok(packet) => {
                self.stats.packets += 1;
                debug!("Received packet: {:?}", packet);
                let intent = self.interpreter.interpret(&packet);
                self.apply(intent);
            }
            Err(e) => {
                // Dropped frame: no actuation change
                self.stats.dropped += 1;
                warn!("Dropping control frame: {}", e);
            }
        }
    }

    fn apply(&mut self, intent: ActuationIntent) {
        match intent {
            ActuationIntent::Hold => {}
            ActuationIntent::StopAll => {
                self.supersede_target();
                self.stop_all();
            }
            ActuationIntent::Drive {
                steering,
                traction,
                bounded_travel,
            } => {
                self.supersede_target();

                if let Some(target) = steering {
                    if let Err(e) = self.actuators.set_steering_target(target) {
                        warn!("Failed to set steering {:?}: {}", target, e);
                    }
                }
                if let Err(e) = self.actuators.set_traction(traction) {
                    warn!("Failed to set traction {:?}: {}", traction, e);
                }

                if let Some(travel) = bounded_travel {
                    match self.actuators.traction_position() {
                        Ok(position) => {
                            let target = MotionTarget::new(position, travel, traction);
                            debug!("Armed travel target {:?} from {}", target, position);
                            self.tracker.arm(target);
                        }
                        Err(e) => warn!("Ignoring bounded travel, position unreadable: {}", e),
                    }
                }
            }
        }
    }

    /// Forget any pending travel target without running its action
    fn supersede_target(&mut self) {
        if let Some(target) = self.tracker.clear() {
            debug!("Superseded travel target {:?}", target);
        }
    }

    fn on_timeout(&mut self) {
        self.stats.timeouts += 1;
        self.supersede_target();
        self.stop_all();
        warn!("Waiting for drive controller...");
    }

    fn poll_tracker(&mut self) {
        let position = match self.actuators.traction_position() {
            Ok(position) => position,
            Err(e) => {
                warn!("Failed to read traction position: {}", e);
                return;
            }
        };

        match self.tracker.check(position) {
            Some(OnReach::RecenterSteering) => {
                info!("Travel target reached at {}, recentering steering", position);
                if let Err(e) = self.actuators.set_steering_target(SteeringTarget::Center) {
                    warn!("Failed to recenter steering: {}", e);
                }
            }
            Some(OnReach::StopAll) => {
                info!("Travel target reached at {}, stopping", position);
                self.stop_all();
            }
            None => {}
        }
    }

    fn stop_all(&mut self) {
        if let Err(e) = self.actuators.stop_all() {
            warn!("Failed to stop actuators: {}", e);
        }
    }

    fn drain(&mut self) {
        self.set_state(LoopState::Draining);
        self.supersede_target();
        self.stop_all();
        self.set_state(LoopState::Stopped);
        info!(
            "Safety loop stopped: {} packets, {} dropped, {} timeouts",
            self.stats.packets, self.stats.dropped, self.stats.timeouts
        );
    }
}

/// Everything the binary needs to start the runtime
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub bind: SocketAddr,
    pub recv_timeout: Duration,
    pub vehicle: VehicleConfig,
    /// Drive `SimActuators` instead of the ev3 motors
    pub simulate: bool,
    /// Stop when stdin reaches end-of-file
    pub watch_stdin: bool,
}

pub async fn run(settings: RunSettings) -> Result<StopReason, RuntimeError> {
    // Signals first: a stop during motor startup must still stop the motors
    let (stop_tx, stop_rx) = watch::channel(None);
    let stop_tx = Arc::new(stop_tx);
    install_stop_signals(Arc::clone(&stop_tx)).map_err(RuntimeError::Transport)?;

    if settings.watch_stdin {
        watch_stdin_eof(stop_tx);
    }

    run_until_stopped(settings, stop_rx).await
}

/// Start the actuators and the loop, honouring a stop requested at any point
pub async fn run_until_stopped(
    settings: RunSettings,
    stop_rx: watch::Receiver<Option<StopReason>>,
) -> Result<StopReason, RuntimeError> {
    settings.vehicle.validate()?;

    let actuators: Box<dyn Actuators> = if settings.simulate {
        info!("Simulation mode: no motors will be driven");
        Box::new(SimActuators::new())
    } else {
        // Steering calibration sleeps, keep it off the async workers
        let vehicle = settings.vehicle.clone();
        let driver = tokio::task::spawn_blocking(move || CarDriver::connect(&vehicle)).await??;
        Box::new(driver)
    };

    // Dropping the actuators stops the motors
    if let Some(reason) = *stop_rx.borrow() {
        info!("Stop requested during startup: {:?}", reason);
        return Ok(reason);
    }

    let source = UdpReceiver::bind(settings.bind)
        .await
        .map_err(RuntimeError::Transport)?;

    let mut safety_loop = SafetyLoop::new(
        source,
        actuators,
        Interpreter::new(settings.vehicle.drive_duty),
        LoopConfig {
            recv_timeout: settings.recv_timeout,
            tracker_poll: settings.vehicle.tracker_poll(),
        },
    );
    safety_loop.run(stop_rx).await
}

/// Map SIGINT and SIGTERM to `StopReason::Interrupt`.
///
/// Handlers are registered before this returns, so the default
/// terminate-on-signal action is already replaced.
#[cfg(unix)]
pub fn install_stop_signals(stop_tx: Arc<watch::Sender<Option<StopReason>>>) -> io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        info!("Received {}", name);
        stop_tx.send_replace(Some(StopReason::Interrupt));
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn install_stop_signals(stop_tx: Arc<watch::Sender<Option<StopReason>>>) -> io::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_tx.send_replace(Some(StopReason::Interrupt));
        }
    });
    Ok(())
}

/// Signal `EndOfInput` once stdin is closed by the parent process.
///
/// Plain thread: a blocking stdin read cannot be cancelled and would hold
/// up runtime shutdown if it lived on tokio's blocking pool.
fn watch_stdin_eof(stop_tx: Arc<watch::Sender<Option<StopReason>>>) {
    std::thread::spawn(move || {
        let mut stdin = io::stdin().lock();
        let mut sink = [0u8; 256];
        loop {
            match stdin.read(&mut sink) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Stopped watching stdin: {}", e);
                    return;
                }
            }
        }
        info!("Standard input closed");
        stop_tx.send_if_modified(|reason| {
            if reason.is_none() {
                *reason = Some(StopReason::EndOfInput);
                true
            } else {
                false
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Command;
    use crate::motor::Traction;
    use crate::tracker::TravelDirection;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Steer(SteeringTarget),
        Traction(Traction),
        StopAll,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        position: i32,
    }

    impl Actuators for Recorder {
        fn set_steering_target(&mut self, target: SteeringTarget) -> Result<(), ActuatorError> {
            self.calls.push(Call::Steer(target));
            Ok(())
        }

        fn set_traction(&mut self, traction: Traction) -> Result<(), ActuatorError> {
            self.calls.push(Call::Traction(traction));
            Ok(())
        }

        fn traction_position(&mut self) -> Result<i32, ActuatorError> {
            Ok(self.position)
        }

        fn stop_all(&mut self) -> Result<(), ActuatorError> {
            self.calls.push(Call::StopAll);
            Ok(())
        }
    }

    /// Source that never delivers anything
    struct Silent;

    impl DatagramSource for Silent {
        async fn recv(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            std::future::pending().await
        }
    }

    fn safety_loop() -> SafetyLoop<Silent, Recorder> {
        SafetyLoop::new(
            Silent,
            Recorder::default(),
            Interpreter::default(),
            LoopConfig::new(Duration::from_millis(100)),
        )
    }

    fn feed(sl: &mut SafetyLoop<Silent, Recorder>, command: Command, param1: i16, param2: i16) {
        sl.on_datagram(&ControlPacket::new(command, param1, param2).encode());
    }

    #[test]
    fn test_turn_arms_recenter_target() {
        let mut sl = safety_loop();
        sl.actuators.position = 100;
        feed(&mut sl, Command::Turn, 1, 5);

        let target = sl.motion_target().copied().unwrap();
        assert_eq!(target.target_position, 105);
        assert_eq!(target.on_reach, OnReach::RecenterSteering);

        sl.actuators.position = 104;
        sl.poll_tracker();
        assert!(sl.motion_target().is_some());

        sl.actuators.position = 105;
        sl.poll_tracker();
        assert!(sl.motion_target().is_none());
        assert_eq!(
            sl.actuators.calls,
            vec![
                Call::Steer(SteeringTarget::Left),
                Call::Traction(Traction::Duty(100)),
                Call::Steer(SteeringTarget::Center),
            ]
        );
    }

    #[test]
    fn test_turn_then_stop_zero_stops_on_next_poll() {
        let mut sl = safety_loop();
        sl.actuators.position = 40;
        feed(&mut sl, Command::TurnThenStop, 1, 0);
        sl.poll_tracker();

        assert!(sl.motion_target().is_none());
        assert_eq!(
            sl.actuators.calls,
            vec![Call::Traction(Traction::Duty(100)), Call::StopAll]
        );
    }

    #[test]
    fn test_stop_supersedes_without_on_reach() {
        let mut sl = safety_loop();
        feed(&mut sl, Command::TurnThenStop, 1, 50);
        feed(&mut sl, Command::Stop, 0, 0);
        assert!(sl.motion_target().is_none());

        sl.actuators.position = 1000;
        sl.poll_tracker();
        // One StopAll from the Stop command, none from the dropped target
        assert_eq!(
            sl.actuators.calls,
            vec![Call::Traction(Traction::Duty(100)), Call::StopAll]
        );
    }

    #[test]
    fn test_keep_alive_keeps_pending_target() {
        let mut sl = safety_loop();
        feed(&mut sl, Command::Turn, 1, 20);
        feed(&mut sl, Command::KeepAlive, 0, 0);
        assert!(sl.motion_target().is_some());
        assert_eq!(sl.actuators.calls.len(), 2);
    }

    #[test]
    fn test_bad_frames_change_nothing() {
        let mut sl = safety_loop();
        sl.on_datagram(&[0u8; 5]);
        let mut invalid = ControlPacket::new(Command::Forward, 1, 0).encode();
        invalid[9] = 9;
        sl.on_datagram(&invalid);

        assert!(sl.actuators.calls.is_empty());
        assert_eq!(
            sl.stats(),
            LoopStats {
                packets: 0,
                dropped: 2,
                timeouts: 0
            }
        );
    }

    #[test]
    fn test_timeout_stops_and_drops_target() {
        let mut sl = safety_loop();
        feed(&mut sl, Command::Turn, 1, 30);
        sl.on_timeout();

        assert!(sl.motion_target().is_none());
        assert_eq!(sl.actuators.calls.last(), Some(&Call::StopAll));
        assert_eq!(sl.stats().timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_drains_once() {
        let mut sl = safety_loop();
        let (_tx, rx) = watch::channel(Some(StopReason::Interrupt));

        let reason = sl.run(rx).await.unwrap();
        assert_eq!(reason, StopReason::Interrupt);
        assert_eq!(sl.state(), LoopState::Stopped);
        assert_eq!(sl.actuators.calls, vec![Call::StopAll]);

        let (_tx, rx) = watch::channel(None);
        assert!(matches!(sl.run(rx).await, Err(RuntimeError::AlreadyRan)));
    }

    #[test]
    fn test_forward_turn_with_negative_distance_recenters_next_poll() {
        let mut sl = safety_loop();
        sl.actuators.position = 100;
        feed(&mut sl, Command::Turn, 1, -10);

        let target = sl.motion_target().copied().unwrap();
        assert_eq!(target.target_position, 90);
        assert_eq!(target.on_reach, OnReach::RecenterSteering);
        assert_eq!(target.direction, TravelDirection::Forward);

        // Target already behind the car: first poll recenters
        sl.poll_tracker();
        assert!(sl.motion_target().is_none());
        assert_eq!(
            sl.actuators.calls,
            vec![
                Call::Steer(SteeringTarget::Right),
                Call::Traction(Traction::Duty(100)),
                Call::Steer(SteeringTarget::Center),
            ]
        );
    }

    fn sim_settings() -> RunSettings {
        RunSettings {
            bind: "127.0.0.1:0".parse().unwrap(),
            recv_timeout: Duration::from_millis(100),
            vehicle: VehicleConfig::default(),
            simulate: true,
            watch_stdin: false,
        }
    }

    #[tokio::test]
    async fn test_stop_before_loop_starts() {
        let (_tx, rx) = watch::channel(Some(StopReason::Interrupt));
        let reason = run_until_stopped(sim_settings(), rx).await.unwrap();
        assert_eq!(reason, StopReason::Interrupt);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_requests_interrupt() {
        let (tx, mut rx) = watch::channel(None);
        install_stop_signals(Arc::new(tx)).unwrap();

        let status = std::process::Command::new("kill")
            .arg("-TERM")
            .arg(std::process::id().to_string())
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*rx.borrow(), Some(StopReason::Interrupt));
    }
}
