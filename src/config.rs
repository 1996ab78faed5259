// Robot geometry, loop timing, filter/gain tuning, topics
use std::time::Duration;

/// Number of omni wheels on the base.
pub const NUM_WHEELS: usize = 3;

// Geometry (meters)
pub const WHEEL_RADIUS_M: f32 = 0.03;
pub const ROBOT_RADIUS_M: f32 = 0.1543;

// Quadrature pulses per wheel revolution
pub const PULSES_PER_REV: u32 = 1980;

// Loop periods
pub const CONTROL_PERIOD: Duration = Duration::from_millis(20);
pub const RECALC_PERIOD: Duration = Duration::from_millis(500);
pub const ORIENTATION_PERIOD: Duration = Duration::from_millis(100);
pub const CALIBRATION_POLL_PERIOD: Duration = Duration::from_millis(500);

// Nominal control time step matching CONTROL_PERIOD, used to seed the first
// PID cycle before a measured dt exists
pub const NOMINAL_DT_S: f32 = 0.02;

// Sensor fault recovery
pub const SENSOR_RETRY_BACKOFF: Duration = Duration::from_millis(2500);
pub const INDICATOR_BLINK_PERIOD: Duration = Duration::from_millis(500);
// Pause between calibration completing and the yaw reference capture
pub const CALIBRATION_SETTLE_DELAY: Duration = Duration::from_millis(1000);

// Bounded wait on the shared-heading read side
pub const HEADING_LOCK_TIMEOUT: Duration = Duration::from_millis(10);

// Actuator: 10-bit duty resolution, drive rated for 200 RPM
pub const MAX_DUTY: u32 = 700;
pub const DUTY_PER_RPM: f32 = 5.115; // 1023 / 200

// Encoder low-pass filter (first order, 20 ms sampling)
pub const ENCODER_LPF_A: [f32; 1] = [0.904204];
pub const ENCODER_LPF_B: [f32; 2] = [0.04789, 0.04789];

// Scalar Kalman tuning for the alternative velocity smoother
pub const KALMAN_PROCESS_NOISE: f32 = 0.4;
pub const KALMAN_MEASUREMENT_NOISE: f32 = 5.0;

// Diagnostic pre-smoothing of raw tick counts
pub const COUNT_SMOOTHER_ALPHA: f32 = 0.7;

// Default per-wheel PID gains (tuning starting point)
pub const DEFAULT_KP: f32 = 1.0;
pub const DEFAULT_KI: f32 = 0.1;
pub const DEFAULT_KD: f32 = 0.01;

// Blend weight on the previous derivative term
pub const DERIVATIVE_SMOOTHING: f32 = 0.7;

// Yaw reference acquisition
pub const YAW_STABILITY_THRESHOLD_DEG: f32 = 0.05;
pub const YAW_REQUIRED_STABLE_SAMPLES: u32 = 10;
pub const YAW_MAX_SAMPLES: u32 = 25;
pub const YAW_SAMPLE_PERIOD: Duration = Duration::from_millis(100);

// Calibration levels run 0..=3; all four subsystems must reach the top
pub const CALIBRATION_LEVEL_MAX: u8 = 3;

// Zenoh topics
pub const TOPIC_CMD: &str = "omnibase/cmd"; // commands
pub const TOPIC_TELEMETRY: &str = "omnibase/telemetry"; // sensor records

// Telemetry queue depth between the loops and the transport
pub const TELEMETRY_BUFFER: usize = 64;

/// Fixed base geometry, set once at startup.
#[derive(Debug, Clone, Copy)]
pub struct RobotGeometry {
    pub wheel_radius: f32,
    pub robot_radius: f32,
}

impl Default for RobotGeometry {
    fn default() -> Self {
        Self {
            wheel_radius: WHEEL_RADIUS_M,
            robot_radius: ROBOT_RADIUS_M,
        }
    }
}

/// Wheel speed control strategy, fixed for the lifetime of the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ControlMode {
    /// Target RPM converted straight to duty.
    OpenLoop,
    /// Per-wheel PID tracking the encoder estimate.
    #[default]
    ClosedLoop,
}

/// Runtime configuration assembled from the CLI in `main`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub geometry: RobotGeometry,
    pub mode: ControlMode,
    /// Feed the live heading into the kinematics matrix; with this off the
    /// matrix is evaluated at zero heading.
    pub heading_compensation: bool,
    /// Calibration blob location for the file-backed store.
    pub store_path: std::path::PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            geometry: RobotGeometry::default(),
            mode: ControlMode::default(),
            heading_compensation: true,
            store_path: "omnibase-calibration.json".into(),
        }
    }
}
