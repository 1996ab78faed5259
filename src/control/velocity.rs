// Per-wheel velocity regulation
//
// One WheelController per wheel, stepped every control cycle. Closed loop
// runs the encoder estimate through the PID; open loop converts the target
// straight to duty and keeps the estimator running for telemetry.

use std::time::Duration;

use crate::config::{ControlMode, DUTY_PER_RPM, MAX_DUTY, NOMINAL_DT_S};
use crate::control::estimator::WheelEstimator;
use crate::control::pid::{PidController, PidGains};
use crate::hw::{Direction, DutyCommand};

/// Signed RPM to bridge duty: scale, truncate toward zero like the firmware
/// timer expects, then split sign and magnitude and clamp. The float cast
/// saturates at the `i32` limits and `unsigned_abs` keeps `i32::MIN`
/// defined, so any magnitude lands inside the clamp.
pub fn rpm_to_duty(rpm: f32) -> DutyCommand {
    let scaled = (rpm * DUTY_PER_RPM) as i32;
    let direction = if scaled < 0 {
        Direction::Reverse
    } else {
        Direction::Forward
    };
    DutyCommand {
        direction,
        duty: scaled.unsigned_abs().min(MAX_DUTY),
    }
}

#[derive(Debug, Clone)]
pub struct WheelController {
    mode: ControlMode,
    pid: PidController,
    estimator: WheelEstimator,
    target_rpm: f32,
}

impl WheelController {
    pub fn new(mode: ControlMode, gains: PidGains) -> Self {
        Self {
            mode,
            pid: PidController::new(gains),
            estimator: WheelEstimator::new(),
            target_rpm: 0.0,
        }
    }

    /// Point the wheel at a new RPM.
    ///
    /// The estimator is snapped to the target in the same breath, so the
    /// next cycle's error reflects the plant, not the filter settling.
    pub fn set_target(&mut self, rpm: f32) {
        self.target_rpm = rpm;
        self.estimator.reset_to(rpm);
        self.pid.set_setpoint(rpm);
    }

    pub fn set_gains(&mut self, gains: PidGains) {
        self.pid.set_gains(gains);
    }

    /// One control cycle: fold the window's encoder ticks into the estimate
    /// and produce the duty to hold on the bridge until the next cycle.
    pub fn step(&mut self, ticks: i32, interval: Duration) -> DutyCommand {
        let estimate = self.estimator.update(ticks, interval);
        match self.mode {
            ControlMode::OpenLoop => rpm_to_duty(self.target_rpm),
            ControlMode::ClosedLoop => {
                let mut dt = interval.as_secs_f32();
                if dt <= 0.0 {
                    dt = NOMINAL_DT_S;
                }
                let output = self.pid.update(estimate, estimate, dt);
                rpm_to_duty(output)
            }
        }
    }

    pub fn target(&self) -> f32 {
        self.target_rpm
    }

    /// Latest filtered RPM estimate.
    pub fn estimate(&self) -> f32 {
        self.estimator.rpm()
    }

    /// Diagnostic smoothed tick count for telemetry.
    pub fn smoothed_count(&self) -> f32 {
        self.estimator.smoothed_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(20);

    fn default_gains() -> PidGains {
        PidGains {
            kp: 1.0,
            ki: 0.1,
            kd: 0.01,
        }
    }

    #[test]
    fn test_rpm_to_duty_forward() {
        let cmd = rpm_to_duty(100.0);
        assert_eq!(cmd.direction, Direction::Forward);
        assert_eq!(cmd.duty, 511); // 100 * 5.115 truncated
    }

    #[test]
    fn test_rpm_to_duty_reverse() {
        let cmd = rpm_to_duty(-100.0);
        assert_eq!(cmd.direction, Direction::Reverse);
        assert_eq!(cmd.duty, 511);
    }

    #[test]
    fn test_rpm_to_duty_clamps_at_max() {
        let cmd = rpm_to_duty(200.0); // would be 1023
        assert_eq!(cmd.duty, MAX_DUTY);
        let cmd = rpm_to_duty(-10_000.0);
        assert_eq!(cmd.direction, Direction::Reverse);
        assert_eq!(cmd.duty, MAX_DUTY);
    }

    #[test]
    fn test_rpm_to_duty_extreme_magnitudes_stay_clamped() {
        // Past the i32 range the scaled figure saturates; the sign and the
        // clamp must still come out right
        let cmd = rpm_to_duty(-1.0e9);
        assert_eq!(cmd.direction, Direction::Reverse);
        assert_eq!(cmd.duty, MAX_DUTY);
        let cmd = rpm_to_duty(1.0e9);
        assert_eq!(cmd.direction, Direction::Forward);
        assert_eq!(cmd.duty, MAX_DUTY);
    }

    #[test]
    fn test_rpm_to_duty_zero_coasts_forward() {
        let cmd = rpm_to_duty(0.0);
        assert_eq!(cmd, DutyCommand::coast());
    }

    #[test]
    fn test_open_loop_ignores_encoder_ticks() {
        let mut wheel = WheelController::new(ControlMode::OpenLoop, default_gains());
        wheel.set_target(-100.0);
        // Wildly wrong tick counts must not move the open-loop output
        let cmd = wheel.step(5000, WINDOW);
        assert_eq!(cmd.direction, Direction::Reverse);
        assert_eq!(cmd.duty, 511);
    }

    #[test]
    fn test_closed_loop_tracks_on_target_wheel() {
        // 33 ticks per 20 ms window is exactly the 50 RPM target, so the
        // correction stays near zero and the output hugs the feedback term
        let mut wheel = WheelController::new(ControlMode::ClosedLoop, default_gains());
        wheel.set_target(50.0);
        let mut duty = 0;
        for _ in 0..50 {
            duty = wheel.step(33, WINDOW).duty;
        }
        let nominal = (50.0 * DUTY_PER_RPM) as u32;
        assert!(
            duty.abs_diff(nominal) < 15,
            "duty {duty} drifted from nominal {nominal}"
        );
    }

    #[test]
    fn test_closed_loop_pushes_harder_on_slow_wheel() {
        let mut wheel = WheelController::new(ControlMode::ClosedLoop, default_gains());
        wheel.set_target(50.0);
        let nominal = (50.0 * DUTY_PER_RPM) as u32;
        let mut duty = 0;
        // Wheel stuck at roughly half speed: integral should wind the duty
        // above the nominal figure
        for _ in 0..100 {
            duty = wheel.step(16, WINDOW).duty;
        }
        assert!(duty > nominal, "duty {duty} did not rise above {nominal}");
    }

    #[test]
    fn test_retarget_resets_estimate() {
        let mut wheel = WheelController::new(ControlMode::ClosedLoop, default_gains());
        wheel.set_target(100.0);
        for _ in 0..20 {
            wheel.step(66, WINDOW);
        }
        wheel.set_target(20.0);
        assert!((wheel.estimate() - 20.0).abs() < 1e-4);
    }
}
