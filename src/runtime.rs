// Zenoh edge of the runtime: command ingress and telemetry egress
//
// Commands arrive as JSON on the command topic and dispatch straight into
// the robot base, so a fresh velocity never waits on a polling cycle.
// Telemetry records produced by the control loop and the orientation
// supervisor drain from one channel onto the telemetry topic.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{RuntimeConfig, TELEMETRY_BUFFER, TOPIC_CMD, TOPIC_TELEMETRY};
use crate::control::kinematics::VelocityTarget;
use crate::control::pid::PidGains;
use crate::hw::{
    CalibrationStore, EncoderBank, FaultIndicator, MotorBus, OrientationSensor, WheelId,
};
use crate::messages::Command;
use crate::orchestrator::RobotBase;
use crate::orientation::OrientationSupervisor;
use crate::orientation::heading::HeadingCell;

/// Everything the runtime drives, behind trait objects so the same loops
/// run against the simulator or a real base.
pub struct Hardware {
    pub bus: Box<dyn MotorBus>,
    pub encoders: Box<dyn EncoderBank>,
    pub imu: Box<dyn OrientationSensor>,
    pub store: Box<dyn CalibrationStore>,
    pub indicator: Box<dyn FaultIndicator>,
}

pub async fn run(
    config: RuntimeConfig,
    hw: Hardware,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;

    let (telemetry_tx, mut telemetry_rx) = mpsc::channel(TELEMETRY_BUFFER);
    let heading = HeadingCell::new();

    let supervisor = OrientationSupervisor::new(
        hw.imu,
        hw.store,
        hw.indicator,
        heading.clone(),
        telemetry_tx.clone(),
    );
    tokio::spawn(supervisor.run());

    let mut base = RobotBase::new(config.clone(), hw.bus, hw.encoders, heading, telemetry_tx);

    info!(
        "Runtime started: {:?} mode, heading compensation {}",
        config.mode,
        if config.heading_compensation { "on" } else { "off" }
    );
    info!("Subscribed to: {}", TOPIC_CMD);
    info!("Publishing to: {}", TOPIC_TELEMETRY);

    loop {
        tokio::select! {
            sample = subscriber.recv_async() => {
                let sample = sample?;
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<Command>(&payload) {
                    Ok(cmd) => dispatch(&mut base, cmd),
                    Err(e) => warn!("Failed to parse command: {}", e),
                }
            }
            record = telemetry_rx.recv() => {
                // All senders live as long as the loops do
                let Some(record) = record else { break };
                let json = serde_json::to_string(&record)?;
                pub_telemetry.put(json).await?;
            }
        }
    }

    Ok(())
}

fn dispatch(base: &mut RobotBase, cmd: Command) {
    match cmd {
        Command::Velocity {
            dot_x,
            dot_y,
            dot_theta,
        } => {
            base.submit_velocity(VelocityTarget::new(dot_x, dot_y, dot_theta));
        }
        Command::WheelSpeed { wheel, rpm } => match wheel_from_wire(wheel) {
            Some(id) => base.override_wheel_speed(id, rpm),
            None => warn!("Ignoring speed override for unknown wheel {}", wheel),
        },
        Command::WheelGains { wheel, kp, ki, kd } => match wheel_from_wire(wheel) {
            Some(id) => base.set_wheel_gains(id, PidGains { kp, ki, kd }),
            None => warn!("Ignoring gain update for unknown wheel {}", wheel),
        },
        Command::Stop => base.stop(),
    }
}

// Wheels are numbered from one on the wire
fn wheel_from_wire(wheel: u8) -> Option<WheelId> {
    (wheel as usize).checked_sub(1).and_then(WheelId::from_index)
}
