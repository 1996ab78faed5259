// Inverse kinematics for the three-wheel omni base
//
// Wheels sit 120 degrees apart with wheel 1 on the +Y axis. The matrix is
// evaluated at the current heading so velocity commands stay in the global
// frame: the base translates along the commanded world axis regardless of
// which way it has rotated.

use std::f32::consts::PI;

use crate::config::{NUM_WHEELS, RobotGeometry};

/// Commanded base velocity: translation in m/s, rotation in rad/s.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityTarget {
    pub x: f32,
    pub y: f32,
    pub yaw: f32,
}

impl VelocityTarget {
    pub fn new(x: f32, y: f32, yaw: f32) -> Self {
        Self { x, y, yaw }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.yaw == 0.0
    }
}

/// Project a base velocity onto the three wheel axes, in rad/s.
///
/// `heading_deg` is the yaw reported by the orientation sensor (clockwise
/// positive); pass 0.0 to command in the body frame.
pub fn wheel_speeds(v: VelocityTarget, heading_deg: f32, geom: &RobotGeometry) -> [f32; NUM_WHEELS] {
    let r = geom.wheel_radius;
    let base = geom.robot_radius;
    // Sensor yaw grows clockwise; the matrix wants counter-clockwise radians
    let theta = -(heading_deg * PI) / 180.0;

    let spin = base * v.yaw;
    let w1 = (-theta.sin() * v.x + theta.cos() * v.y + spin) / r;
    let w2 = (-(PI / 3.0 - theta).sin() * v.x - (PI / 3.0 - theta).cos() * v.y + spin) / r;
    let w3 = ((PI / 3.0 + theta).sin() * v.x - (PI / 3.0 + theta).cos() * v.y + spin) / r;
    [w1, w2, w3]
}

/// Same projection with the result converted to wheel RPM.
pub fn wheel_rpms(v: VelocityTarget, heading_deg: f32, geom: &RobotGeometry) -> [f32; NUM_WHEELS] {
    wheel_speeds(v, heading_deg, geom).map(rad_s_to_rpm)
}

/// Rotate a global-frame velocity into the body frame at the given heading.
///
/// `wheel_speeds` folds this rotation into the matrix itself, so nothing in
/// the control path calls it; it exists for consumers that want body-frame
/// numbers directly. Rotation rate is frame-independent and passes through.
pub fn global_to_body(v: VelocityTarget, heading_deg: f32) -> VelocityTarget {
    let theta = -(heading_deg * PI) / 180.0;
    VelocityTarget {
        x: theta.cos() * v.x + theta.sin() * v.y,
        y: -theta.sin() * v.x + theta.cos() * v.y,
        yaw: v.yaw,
    }
}

/// rad/s to revolutions per minute.
pub fn rad_s_to_rpm(rad_s: f32) -> f32 {
    rad_s * 60.0 / (2.0 * PI)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom() -> RobotGeometry {
        RobotGeometry::default()
    }

    #[test]
    fn test_zero_velocity_stops_all_wheels() {
        let speeds = wheel_speeds(VelocityTarget::zero(), 0.0, &geom());
        assert_eq!(speeds, [0.0; 3]);
    }

    #[test]
    fn test_forward_motion_at_zero_heading() {
        // +X at zero heading: wheel 1 is perpendicular and stays still,
        // wheels 2 and 3 mirror each other
        let rpms = wheel_rpms(VelocityTarget::new(0.1, 0.0, 0.0), 0.0, &geom());
        assert!(rpms[0].abs() < 1e-4, "wheel 1 should not move: {}", rpms[0]);
        assert!((rpms[1] + 27.566).abs() < 1e-2, "wheel 2 was {}", rpms[1]);
        assert!((rpms[2] - 27.566).abs() < 1e-2, "wheel 3 was {}", rpms[2]);
    }

    #[test]
    fn test_pure_rotation_spins_all_wheels_equally() {
        // Spinning in place loads every wheel the same, at any heading
        let g = geom();
        let expected = g.robot_radius / g.wheel_radius;
        for heading in [-180.0, -77.0, 0.0, 45.0, 180.0] {
            let speeds = wheel_speeds(VelocityTarget::new(0.0, 0.0, 1.0), heading, &g);
            for (i, w) in speeds.iter().enumerate() {
                assert!(
                    (w - expected).abs() < 1e-5,
                    "wheel {i} was {w} at heading {heading}"
                );
            }
        }
    }

    #[test]
    fn test_translation_matches_matrix_evaluation() {
        // Closed-form rows at zero heading
        let g = geom();
        let (x, y) = (0.13, -0.07);
        let speeds = wheel_speeds(VelocityTarget::new(x, y, 0.0), 0.0, &g);
        let s60 = (PI / 3.0).sin();
        let c60 = (PI / 3.0).cos();
        let expected = [
            y / g.wheel_radius,
            (-s60 * x - c60 * y) / g.wheel_radius,
            (s60 * x - c60 * y) / g.wheel_radius,
        ];
        for i in 0..3 {
            assert!(
                (speeds[i] - expected[i]).abs() < 1e-4,
                "wheel {} was {}, expected {}",
                i + 1,
                speeds[i],
                expected[i]
            );
        }
    }

    #[test]
    fn test_translation_speeds_sum_to_zero() {
        // For pure translation the three projections cancel at any heading
        for heading in [0.0, 37.0, -90.0, 180.0, 311.5] {
            let speeds = wheel_speeds(VelocityTarget::new(0.13, -0.07, 0.0), heading, &geom());
            let sum: f32 = speeds.iter().sum();
            assert!(sum.abs() < 1e-4, "sum {sum} at heading {heading}");
        }
    }

    #[test]
    fn test_heading_rotates_command_frame() {
        // Facing 90 degrees clockwise, a +X world command lands mostly on
        // wheel 1 instead of the 2/3 pair
        let g = geom();
        let speeds = wheel_speeds(VelocityTarget::new(0.1, 0.0, 0.0), 90.0, &g);
        assert!((speeds[0] - 0.1 / g.wheel_radius).abs() < 1e-4);
        assert!((speeds[1] - speeds[2]).abs() < 1e-4, "2 and 3 should match");
    }

    #[test]
    fn test_heading_preserves_speed_magnitude() {
        // Re-expressing the same world velocity at a different heading must
        // not change how hard the wheels work overall
        let v = VelocityTarget::new(0.1, 0.05, 0.0);
        let at_zero = wheel_speeds(v, 0.0, &geom());
        let at_angle = wheel_speeds(v, 63.0, &geom());
        let norm = |s: [f32; 3]| s.iter().map(|w| w * w).sum::<f32>().sqrt();
        assert!((norm(at_zero) - norm(at_angle)).abs() < 1e-3);
    }

    #[test]
    fn test_rad_s_to_rpm() {
        assert!((rad_s_to_rpm(2.0 * PI) - 60.0).abs() < 1e-4);
        assert!((rad_s_to_rpm(-PI) + 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_frame_rotation_agrees_with_matrix() {
        // Pre-rotating into the body frame and evaluating at zero heading
        // is the same as letting the matrix do the rotation
        let g = geom();
        let v = VelocityTarget::new(0.08, -0.11, 0.4);
        for heading in [0.0, 30.0, -135.0, 272.0] {
            let direct = wheel_speeds(v, heading, &g);
            let rotated = wheel_speeds(global_to_body(v, heading), 0.0, &g);
            for i in 0..3 {
                assert!(
                    (direct[i] - rotated[i]).abs() < 1e-4,
                    "wheel {} diverged at heading {heading}",
                    i + 1
                );
            }
        }
        let unrotated = global_to_body(v, 0.0);
        assert!((unrotated.x - v.x).abs() < 1e-6);
        assert!((unrotated.y - v.y).abs() < 1e-6);
    }
}
