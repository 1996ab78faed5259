// Task orchestration for the control pipeline
//
// Two periodic loops cooperate through single-slot watch channels:
//
//   command watch -> recalculation loop (500 ms, heading-aware) -> target watch
//   target watch  -> control loop (20 ms, encoders + PID + motor bus)
//
// A fresh velocity command triggers an immediate recompute through the watch
// notification; the 500 ms tick re-projects the last command through the
// live heading even when no new commands arrive. Wheel targets travel as one
// array per send, so the three wheels always see a consistent set.

use std::array;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::{CONTROL_PERIOD, NUM_WHEELS, RECALC_PERIOD, RuntimeConfig};
use crate::control::kinematics::{VelocityTarget, wheel_rpms};
use crate::control::pid::PidGains;
use crate::control::velocity::WheelController;
use crate::hw::{EncoderBank, MotorBus, WheelId};
use crate::messages::TelemetryRecord;
use crate::orientation::heading::HeadingCell;

// Buffered retunes and overrides awaiting the next control cycle
const CONTROL_QUEUE: usize = 16;

/// Gain retunes and per-wheel speed overrides, drained by the control loop
/// at each cycle boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMsg {
    SetGains { wheel: WheelId, gains: PidGains },
    OverrideSpeed { wheel: WheelId, rpm: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    Running,
    Stopped,
}

/// Lifecycle slot for a long-running task: spawns at most once, and once
/// stopped stays stopped.
pub struct TaskSlot {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    stopped: bool,
}

impl TaskSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handle: None,
            stopped: false,
        }
    }

    pub fn state(&self) -> TaskState {
        if self.stopped {
            return TaskState::Stopped;
        }
        match &self.handle {
            None => TaskState::NotStarted,
            Some(handle) if handle.is_finished() => TaskState::Stopped,
            Some(_) => TaskState::Running,
        }
    }

    /// Spawn the task if the slot has never run. Returns whether this call
    /// started it.
    pub fn spawn_once<F>(&mut self, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.state() != TaskState::NotStarted {
            return false;
        }
        debug!("Starting {} task", self.name);
        self.handle = Some(tokio::spawn(fut));
        true
    }

    /// Wait for the task to run to completion. The slot stays stopped
    /// afterwards.
    pub async fn finish(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Waiting for {} task", self.name);
            let _ = handle.await;
        }
        self.stopped = true;
    }
}

// Hardware and channel ends that move into the loops on first command
struct LoopParts {
    bus: Box<dyn MotorBus>,
    encoders: Box<dyn EncoderBank>,
    heading: HeadingCell,
    telemetry: mpsc::Sender<TelemetryRecord>,
    cmd_rx: watch::Receiver<VelocityTarget>,
    msg_rx: mpsc::Receiver<ControlMsg>,
}

/// Owner of the motion pipeline. Commands funnel in here; the periodic
/// loops and all per-wheel controller state hang off this struct rather
/// than module-level statics.
pub struct RobotBase {
    config: RuntimeConfig,
    cmd_tx: watch::Sender<VelocityTarget>,
    msg_tx: mpsc::Sender<ControlMsg>,
    recalc: TaskSlot,
    control: TaskSlot,
    parts: Option<LoopParts>,
}

impl RobotBase {
    pub fn new(
        config: RuntimeConfig,
        bus: Box<dyn MotorBus>,
        encoders: Box<dyn EncoderBank>,
        heading: HeadingCell,
        telemetry: mpsc::Sender<TelemetryRecord>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = watch::channel(VelocityTarget::zero());
        let (msg_tx, msg_rx) = mpsc::channel(CONTROL_QUEUE);
        Self {
            config,
            cmd_tx,
            msg_tx,
            recalc: TaskSlot::new("recalculation"),
            control: TaskSlot::new("wheel-control"),
            parts: Some(LoopParts {
                bus,
                encoders,
                heading,
                telemetry,
                cmd_rx,
                msg_rx,
            }),
        }
    }

    /// Latest base velocity command. The first command brings the loops up;
    /// later ones just replace the watched value.
    pub fn submit_velocity(&mut self, v: VelocityTarget) {
        debug!(
            "Velocity command: x={:.3} y={:.3} yaw={:.3}",
            v.x, v.y, v.yaw
        );
        self.cmd_tx.send_replace(v);
        self.ensure_loops();
    }

    /// Zero velocity on all axes.
    pub fn stop(&mut self) {
        self.submit_velocity(VelocityTarget::zero());
    }

    /// Queue a gain change for one wheel's regulator. Applied at the next
    /// control cycle; queued until the loops come up if motion has not
    /// started yet.
    pub fn set_wheel_gains(&self, wheel: WheelId, gains: PidGains) {
        if let Err(e) = self.msg_tx.try_send(ControlMsg::SetGains { wheel, gains }) {
            warn!("Dropping gain update: {}", e);
        }
    }

    /// Pin one wheel to an RPM, bypassing kinematics. The next periodic
    /// recalculation overwrites it, same as any wheel target.
    pub fn override_wheel_speed(&mut self, wheel: WheelId, rpm: f32) {
        if let Err(e) = self.msg_tx.try_send(ControlMsg::OverrideSpeed { wheel, rpm }) {
            warn!("Dropping speed override: {}", e);
        }
        self.ensure_loops();
    }

    pub fn is_driving(&self) -> bool {
        self.control.state() == TaskState::Running
    }

    /// Wind both loops down and wait for them to exit. The control loop
    /// coasts the motor bus on its way out; a halted base does not come
    /// back.
    pub async fn halt(&mut self) {
        // Dropping the command sender cascades: the recalculation loop
        // exits and drops the target sender, which ends the control loop
        // through its channel-closed path.
        self.parts = None;
        let (dead_tx, _) = watch::channel(VelocityTarget::zero());
        self.cmd_tx = dead_tx;
        self.recalc.finish().await;
        self.control.finish().await;
    }

    fn ensure_loops(&mut self) {
        let Some(parts) = self.parts.take() else {
            return;
        };
        let (targets_tx, targets_rx) = watch::channel([0.0f32; NUM_WHEELS]);
        let recalc_up = self.recalc.spawn_once(recalc_loop(
            parts.cmd_rx,
            targets_tx,
            parts.heading,
            self.config.clone(),
        ));
        let control_up = self.control.spawn_once(control_loop(
            targets_rx,
            parts.msg_rx,
            parts.bus,
            parts.encoders,
            parts.telemetry,
            self.config.clone(),
        ));
        if recalc_up && control_up {
            info!("Motion loops started");
        }
    }
}

/// Re-project the latest velocity command into per-wheel RPM targets, on
/// command arrival and on the periodic tick.
async fn recalc_loop(
    mut cmd_rx: watch::Receiver<VelocityTarget>,
    targets_tx: watch::Sender<[f32; NUM_WHEELS]>,
    heading: HeadingCell,
    config: RuntimeConfig,
) {
    let mut ticker = time::interval(RECALC_PERIOD);
    loop {
        tokio::select! {
            changed = cmd_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {}
        }
        let v = *cmd_rx.borrow_and_update();
        let heading_deg = if config.heading_compensation {
            heading.get().await
        } else {
            0.0
        };
        let rpms = wheel_rpms(v, heading_deg, &config.geometry);
        debug!(
            "Recalculated targets at heading {:.2}: {:.2} {:.2} {:.2} RPM",
            heading_deg, rpms[0], rpms[1], rpms[2]
        );
        if targets_tx.send(rpms).is_err() {
            break;
        }
    }
    debug!("Recalculation loop ended");
}

/// Fixed-cadence wheel regulation: read encoders, step each wheel's
/// controller with the measured cycle time, drive the bus.
async fn control_loop(
    mut targets_rx: watch::Receiver<[f32; NUM_WHEELS]>,
    mut msg_rx: mpsc::Receiver<ControlMsg>,
    mut bus: Box<dyn MotorBus>,
    mut encoders: Box<dyn EncoderBank>,
    telemetry: mpsc::Sender<TelemetryRecord>,
    config: RuntimeConfig,
) {
    let mut wheels: [WheelController; NUM_WHEELS] =
        array::from_fn(|_| WheelController::new(config.mode, PidGains::default()));
    let mut ticker = time::interval(CONTROL_PERIOD);
    let mut last_cycle = time::Instant::now();
    let mut last_report = time::Instant::now();

    loop {
        tokio::select! {
            changed = targets_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let targets = *targets_rx.borrow_and_update();
                for (wheel, rpm) in wheels.iter_mut().zip(targets) {
                    wheel.set_target(rpm);
                }
            }
            _ = ticker.tick() => {
                while let Ok(msg) = msg_rx.try_recv() {
                    match msg {
                        ControlMsg::SetGains { wheel, gains } => {
                            info!("Retuning wheel {:?}: kp={} ki={} kd={}",
                                wheel, gains.kp, gains.ki, gains.kd);
                            wheels[wheel.index()].set_gains(gains);
                        }
                        ControlMsg::OverrideSpeed { wheel, rpm } => {
                            info!("Overriding wheel {:?} to {:.2} RPM", wheel, rpm);
                            wheels[wheel.index()].set_target(rpm);
                        }
                    }
                }

                let now = time::Instant::now();
                let dt = now.duration_since(last_cycle);
                last_cycle = now;

                let counts = match encoders.take_counts() {
                    Ok(counts) => counts,
                    Err(e) => {
                        warn!("Encoder read failed: {}", e);
                        continue;
                    }
                };
                for (wheel, id) in wheels.iter_mut().zip(WheelId::ALL) {
                    let cmd = wheel.step(counts[id.index()], dt);
                    if let Err(e) = bus.drive(id, cmd) {
                        warn!("Motor drive failed: {}", e);
                    }
                }

                let rpm = array::from_fn(|i| wheels[i].estimate());
                let smoothed_counts = array::from_fn(|i| wheels[i].smoothed_count());
                let _ = telemetry.try_send(TelemetryRecord::Encoders {
                    rpm,
                    smoothed_counts,
                });

                if now.duration_since(last_report) >= Duration::from_secs(1) {
                    debug!(
                        "Wheel RPM {:.2} {:.2} {:.2} (targets {:.2} {:.2} {:.2})",
                        wheels[0].estimate(), wheels[1].estimate(), wheels[2].estimate(),
                        wheels[0].target(), wheels[1].target(), wheels[2].target(),
                    );
                    last_report = now;
                }
            }
        }
    }

    if let Err(e) = bus.stop_all() {
        warn!("Could not stop motors on shutdown: {}", e);
    }
    debug!("Control loop ended");
}
