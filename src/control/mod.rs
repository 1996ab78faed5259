// Velocity control pipeline for the omni base
//
// Provides:
// - Inverse kinematics (base velocity -> per-wheel RPM)
// - Encoder-based wheel speed estimation with IIR smoothing
// - Per-wheel PID regulation and duty conversion

pub mod estimator;
pub mod filter;
pub mod kinematics;
pub mod pid;
pub mod velocity;

pub use kinematics::{VelocityTarget, global_to_body, wheel_rpms, wheel_speeds};
pub use pid::{PidController, PidGains};
pub use velocity::{WheelController, rpm_to_duty};
