// Per-wheel velocity PID
//
// The output is biased by the current velocity estimate rather than driving
// the plant from zero: the controller publishes `estimate + correction`, so a
// well-tracked wheel sees a correction near zero. The derivative term is
// low-pass blended to keep encoder quantization out of the duty command.

use crate::config::{DEFAULT_KD, DEFAULT_KI, DEFAULT_KP, DERIVATIVE_SMOOTHING, NOMINAL_DT_S};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: DEFAULT_KP,
            ki: DEFAULT_KI,
            kd: DEFAULT_KD,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    setpoint: f32,
    integral: f32,
    prev_error: f32,
    smoothed_derivative: f32,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            setpoint: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            smoothed_derivative: 0.0,
        }
    }

    /// Retune mid-run: new gains start from a clean slate. Error history
    /// priced at the old gains has no meaning under the new ones, so the
    /// accumulated state is dropped while the setpoint stays.
    pub fn set_gains(&mut self, gains: PidGains) {
        self.gains = gains;
        self.integral = 0.0;
        self.prev_error = 0.0;
        self.smoothed_derivative = 0.0;
    }

    /// Change the tracking target and drop accumulated state.
    ///
    /// Clearing the integral here is the only anti-windup in the loop: error
    /// integrated toward the old target must not bleed into the new one.
    pub fn set_setpoint(&mut self, setpoint: f32) {
        self.setpoint = setpoint;
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    /// One control step against a new measurement.
    ///
    /// `dt` is the measured time since the previous step, in seconds; callers
    /// seed the first step with [`NOMINAL_DT_S`]. `feedback` biases the
    /// output, normally the same velocity estimate used as the measurement.
    pub fn update(&mut self, measurement: f32, feedback: f32, dt: f32) -> f32 {
        let dt = if dt > 0.0 { dt } else { NOMINAL_DT_S };
        let error = self.setpoint - measurement;
        self.integral += error * dt;
        let derivative = (error - self.prev_error) / dt;
        self.smoothed_derivative = DERIVATIVE_SMOOTHING * self.smoothed_derivative
            + (1.0 - DERIVATIVE_SMOOTHING) * derivative;
        self.prev_error = error;

        let correction = self.gains.kp * error
            + self.gains.ki * self.integral
            + self.gains.kd * self.smoothed_derivative;
        correction + feedback
    }

    pub fn setpoint(&self) -> f32 {
        self.setpoint
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.02;

    fn unit_gains() -> PidGains {
        PidGains {
            kp: 1.0,
            ki: 0.1,
            kd: 0.01,
        }
    }

    #[test]
    fn test_output_tracks_error_plus_feedback() {
        let mut pid = PidController::new(PidGains {
            kp: 2.0,
            ki: 0.0,
            kd: 0.0,
        });
        pid.set_setpoint(10.0);
        // P-only from rest: 2*(10-4) biased by the 4.0 feedback
        let out = pid.update(4.0, 4.0, DT);
        assert!((out - 16.0).abs() < 1e-4);
    }

    #[test]
    fn test_integral_accumulates_over_steps() {
        let mut pid = PidController::new(PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
        });
        pid.set_setpoint(5.0);
        let first = pid.update(0.0, 0.0, DT);
        let second = pid.update(0.0, 0.0, DT);
        assert!((first - 5.0 * DT).abs() < 1e-5);
        assert!((second - 2.0 * 5.0 * DT).abs() < 1e-5);
    }

    #[test]
    fn test_setpoint_change_clears_integral() {
        let mut pid = PidController::new(unit_gains());
        pid.set_setpoint(100.0);
        for _ in 0..50 {
            pid.update(0.0, 0.0, DT);
        }
        pid.set_setpoint(10.0);
        let out = pid.update(10.0, 0.0, DT);
        // Zero error on a fresh setpoint: no P, no I, only the smoothed
        // derivative memory survives the reset
        assert!(out.abs() < 1.0, "stale windup leaked through: {out}");
    }

    #[test]
    fn test_retune_restarts_accumulated_state() {
        let mut pid = PidController::new(unit_gains());
        pid.set_setpoint(5.0);
        for _ in 0..50 {
            pid.update(0.0, 0.0, DT);
        }
        pid.set_gains(PidGains {
            kp: 1.0,
            ki: 10.0,
            kd: 1.0,
        });
        // Zero error right after the retune: old integral and derivative
        // history must not leak through the new gains
        let out = pid.update(5.0, 0.0, DT);
        assert!(out.abs() < 1e-4, "stale state leaked through retune: {out}");
    }

    #[test]
    fn test_retune_keeps_setpoint() {
        let mut pid = PidController::new(unit_gains());
        pid.set_setpoint(25.0);
        pid.set_gains(PidGains {
            kp: 2.0,
            ki: 0.0,
            kd: 0.0,
        });
        assert_eq!(pid.setpoint(), 25.0);
        let out = pid.update(20.0, 0.0, DT);
        assert!((out - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_derivative_is_smoothed() {
        let mut pid = PidController::new(PidGains {
            kp: 0.0,
            ki: 0.0,
            kd: 1.0,
        });
        pid.set_setpoint(0.0);
        // A one-step error spike: raw derivative would be +-spike/dt; the
        // blend keeps each step at a fraction of that
        pid.update(0.0, 0.0, DT);
        let raw = 10.0 / DT;
        let out = pid.update(-10.0, 0.0, DT);
        assert!((out - 0.3 * raw).abs() < 1e-2);
    }

    #[test]
    fn test_nonpositive_dt_falls_back_to_nominal() {
        let mut pid = PidController::new(PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
        });
        pid.set_setpoint(1.0);
        let out = pid.update(0.0, 0.0, 0.0);
        assert!((out - NOMINAL_DT_S).abs() < 1e-6);
    }
}
