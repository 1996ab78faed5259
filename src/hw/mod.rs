// Hardware abstraction for the omni base
//
// The runtime only ever talks to these traits. Real deployments implement
// them over the motor PWM bridge, the quadrature counters and the IMU; the
// sim module provides in-memory versions for development and tests.

pub mod sim;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::config::{CALIBRATION_LEVEL_MAX, NUM_WHEELS};

pub type Result<T> = std::result::Result<T, HwError>;

#[derive(Debug, thiserror::Error)]
pub enum HwError {
    #[error("orientation sensor unavailable: {reason}")]
    SensorUnavailable { reason: String },

    #[error("sensor read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("motor bus rejected command for {wheel:?}: {reason}")]
    BusFault { wheel: WheelId, reason: String },

    #[error("calibration store I/O: {0}")]
    StoreIo(#[from] std::io::Error),

    #[error("calibration blob malformed: {0}")]
    StoreFormat(#[from] serde_json::Error),
}

/// The three wheels, numbered clockwise viewed from above with wheel one
/// on the +Y axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelId {
    One,
    Two,
    Three,
}

impl WheelId {
    pub const ALL: [WheelId; NUM_WHEELS] = [WheelId::One, WheelId::Two, WheelId::Three];

    pub fn index(&self) -> usize {
        match self {
            WheelId::One => 0,
            WheelId::Two => 1,
            WheelId::Three => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<WheelId> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

/// One wheel's actuation: unsigned duty plus spin direction, the shape the
/// dual-channel PWM bridge wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DutyCommand {
    pub direction: Direction,
    pub duty: u32,
}

impl DutyCommand {
    /// Zero duty, both bridge channels low.
    pub fn coast() -> Self {
        Self {
            direction: Direction::Forward,
            duty: 0,
        }
    }
}

/// One orientation reading: Euler angles in degrees plus the fused
/// quaternion in `[w, x, y, z]` order. The published heading is wrapped to
/// (-180, 180] once the yaw reference is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationSample {
    pub heading_deg: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub quat: [f32; 4],
}

impl Default for OrientationSample {
    fn default() -> Self {
        Self {
            heading_deg: 0.0,
            roll_deg: 0.0,
            pitch_deg: 0.0,
            quat: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

/// Per-subsystem calibration levels as reported by the fusion core, each in
/// `0..=3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub sys: u8,
    pub gyro: u8,
    pub accel: u8,
    pub mag: u8,
}

impl CalibrationStatus {
    pub fn is_complete(&self) -> bool {
        self.sys == CALIBRATION_LEVEL_MAX
            && self.gyro == CALIBRATION_LEVEL_MAX
            && self.accel == CALIBRATION_LEVEL_MAX
            && self.mag == CALIBRATION_LEVEL_MAX
    }
}

/// Fusion-core offset registers captured after a completed calibration.
/// Restoring these on the next boot skips the figure-eight dance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorOffsets {
    pub accel: [i16; 3],
    pub mag: [i16; 3],
    pub gyro: [i16; 3],
    pub accel_radius: i16,
    pub mag_radius: i16,
}

/// Drives the wheel motors. One duty command per wheel; implementations must
/// not reorder commands issued for different wheels in the same cycle.
pub trait MotorBus: Send {
    fn drive(&mut self, wheel: WheelId, cmd: DutyCommand) -> Result<()>;

    fn stop_all(&mut self) -> Result<()> {
        for wheel in WheelId::ALL {
            self.drive(wheel, DutyCommand::coast())?;
        }
        Ok(())
    }
}

/// Quadrature counters, one per wheel.
pub trait EncoderBank: Send {
    /// Signed tick deltas accumulated since the previous call. Reading
    /// resets the counters, so each call covers exactly one window.
    fn take_counts(&mut self) -> Result<[i32; NUM_WHEELS]>;
}

/// Absolute-orientation sensor with an on-chip fusion core.
pub trait OrientationSensor: Send {
    /// Bring the sensor out of reset and into fusion mode. Called again
    /// after a fault, so implementations must tolerate repeats.
    fn initialize(&mut self) -> Result<()>;

    /// Release the bus. Must tolerate a sensor that never initialized.
    fn close(&mut self) -> Result<()>;

    fn calibration_status(&mut self) -> Result<CalibrationStatus>;

    fn read_sample(&mut self) -> Result<OrientationSample>;

    fn offsets(&mut self) -> Result<SensorOffsets>;

    fn apply_offsets(&mut self, offsets: &SensorOffsets) -> Result<()>;
}

/// Persistence for calibration offsets across power cycles.
pub trait CalibrationStore: Send {
    fn load(&mut self) -> Result<Option<SensorOffsets>>;

    fn save(&mut self, offsets: &SensorOffsets) -> Result<()>;

    fn has_data(&mut self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }
}

/// Operator-visible fault lamp. The supervisor toggles it while the
/// orientation sensor is down.
pub trait FaultIndicator: Send {
    fn set_active(&mut self, on: bool) -> Result<()>;
}
