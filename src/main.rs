use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use omnibase_runtime::config::{ControlMode, RuntimeConfig};
use omnibase_runtime::hw::sim::{LogIndicator, ScriptedImu, SimDrivetrain};
use omnibase_runtime::hw::store::FileCalibrationStore;
use omnibase_runtime::runtime::{self, Hardware};

#[derive(Parser, Debug)]
#[command(author, version, about = "Omnidirectional base runtime", long_about = None)]
struct Args {
    /// Wheel regulation mode
    #[arg(long, value_enum, default_value_t = ControlMode::ClosedLoop)]
    mode: ControlMode,

    /// Evaluate the kinematics at zero heading instead of the live yaw
    #[arg(long)]
    no_heading_compensation: bool,

    /// Where calibration offsets persist across runs
    #[arg(long, default_value = "omnibase-calibration.json")]
    store: PathBuf,

    /// Drive the built-in simulator instead of real hardware
    #[arg(long)]
    sim: bool,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let config = RuntimeConfig {
        mode: args.mode,
        heading_compensation: !args.no_heading_compensation,
        store_path: args.store,
        ..RuntimeConfig::default()
    };

    if !args.sim {
        eprintln!("No hardware backend is wired up yet; run with --sim");
        std::process::exit(2);
    }
    let hw = sim_hardware(&config);

    if let Err(e) = runtime::run(config, hw).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

fn sim_hardware(config: &RuntimeConfig) -> Hardware {
    let plant = SimDrivetrain::new();
    let store = FileCalibrationStore::new(&config.store_path);
    info!("Calibration store at {}", store.path().display());
    Hardware {
        bus: Box::new(plant.motor_bus()),
        encoders: Box::new(plant.encoder_bank()),
        imu: Box::new(ScriptedImu::steady(0.0)),
        store: Box::new(store),
        indicator: Box::new(LogIndicator),
    }
}
