// Motion-control runtime for a three-wheel omnidirectional base

pub mod config;
pub mod control;
pub mod hw;
pub mod messages;
pub mod orchestrator;
pub mod orientation;
pub mod runtime;

pub use config::{ControlMode, RobotGeometry, RuntimeConfig};
pub use control::kinematics::VelocityTarget;
pub use orchestrator::RobotBase;
