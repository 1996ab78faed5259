// Wire types between teleop/tooling and the runtime
//
// Commands arrive as tagged JSON so one topic carries the whole command set.
// Telemetry mirrors the same shape on the way out.

use serde::{Deserialize, Serialize};

use crate::config::NUM_WHEELS;
use crate::hw::{CalibrationStatus, OrientationSample};

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Base velocity: translation in m/s, rotation in rad/s.
    Velocity {
        dot_x: f32,
        dot_y: f32,
        dot_theta: f32,
    },
    /// Direct RPM override for a single wheel (1-based id).
    WheelSpeed { wheel: u8, rpm: f32 },
    /// Retune one wheel's PID (1-based id).
    WheelGains {
        wheel: u8,
        kp: f32,
        ki: f32,
        kd: f32,
    },
    /// Bring the base to rest.
    Stop,
}

// Telemetry from runtime -> operator tooling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryRecord {
    /// Filtered wheel speed estimates plus the diagnostic smoothed counts.
    Encoders {
        rpm: [f32; NUM_WHEELS],
        smoothed_counts: [f32; NUM_WHEELS],
    },
    /// Orientation sample with the yaw-referenced heading.
    Orientation(OrientationSample),
    /// Sent once when all four calibration levels reach maximum.
    CalibrationComplete(CalibrationStatus),
}
