// Smoothing primitives for the velocity pipeline
//
// A first-order IIR low-pass is the production smoother for the encoder RPM
// estimate. The scalar Kalman filter is an interchangeable alternative with
// the same single-in single-out shape. The count smoother is a diagnostic
// stage over raw tick counts and never feeds the control path.

use std::time::Duration;

/// First-order IIR low-pass filter: `y = b0*x + b1*x_prev + a0*y_prev`.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    b: [f32; 2],
    a: [f32; 1],
    x_prev: f32,
    y_prev: f32,
    sample_interval: Duration,
}

impl LowPassFilter {
    /// Coefficients are fixed for the life of the filter. The sampling
    /// interval is recorded for documentation; the recurrence does not use it.
    pub fn new(b: [f32; 2], a: [f32; 1], sample_interval: Duration) -> Self {
        Self {
            b,
            a,
            x_prev: 0.0,
            y_prev: 0.0,
            sample_interval,
        }
    }

    /// Reset both memory taps to `value`.
    ///
    /// Called whenever the signal tracked by this filter jumps (a new wheel
    /// target), so the filter does not smooth its way over from stale history.
    pub fn clear(&mut self, value: f32) {
        self.x_prev = value;
        self.y_prev = value;
    }

    /// Run one filter step and return the new output.
    pub fn apply(&mut self, x: f32) -> f32 {
        let y = self.b[0] * x + self.b[1] * self.x_prev + self.a[0] * self.y_prev;
        self.x_prev = x;
        self.y_prev = y;
        y
    }

    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }
}

/// Scalar Kalman filter with fixed process and measurement noise, no control
/// input. Interchangeable with [`LowPassFilter`] as a velocity smoother.
#[derive(Debug, Clone)]
pub struct ScalarKalman {
    process_noise: f32,
    measurement_noise: f32,
    estimate: f32,
    uncertainty: f32,
}

impl ScalarKalman {
    pub fn new(process_noise: f32, measurement_noise: f32, initial: f32) -> Self {
        Self {
            process_noise,
            measurement_noise,
            estimate: initial,
            uncertainty: 1.0,
        }
    }

    /// One predict/update step against a new measurement.
    pub fn update(&mut self, measurement: f32) -> f32 {
        self.uncertainty += self.process_noise;
        let gain = self.uncertainty / (self.uncertainty + self.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.uncertainty *= 1.0 - gain;
        self.estimate
    }

    pub fn estimate(&self) -> f32 {
        self.estimate
    }
}

/// Exponential blend over raw tick counts: `s = alpha*x + (1-alpha)*s_prev`.
///
/// Diagnostic only. The published RPM is always derived from the unsmoothed
/// count; this stage exists so the smoothed series can be compared against it
/// in telemetry.
#[derive(Debug, Clone)]
pub struct CountSmoother {
    alpha: f32,
    prev: f32,
}

impl CountSmoother {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, prev: 0.0 }
    }

    pub fn smooth(&mut self, count: f32) -> f32 {
        let s = self.alpha * count + (1.0 - self.alpha) * self.prev;
        self.prev = s;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENCODER_LPF_A, ENCODER_LPF_B};

    #[test]
    fn test_clear_then_apply_is_identity() {
        // With coefficients summing to exactly one, a cleared filter passes
        // the clear value straight through.
        let mut lpf = LowPassFilter::new([0.05, 0.05], [0.9], Duration::from_millis(20));
        lpf.apply(123.0);
        lpf.apply(-40.0);
        lpf.clear(77.5);
        assert_eq!(lpf.apply(77.5), 77.5);
    }

    #[test]
    fn test_clear_then_apply_production_coefficients() {
        // The encoder tuning sums to 0.999984, so the step is continuous to
        // within float noise rather than bit-exact.
        let mut lpf = LowPassFilter::new(ENCODER_LPF_B, ENCODER_LPF_A, Duration::from_millis(20));
        lpf.apply(500.0);
        lpf.clear(50.0);
        let out = lpf.apply(50.0);
        assert!((out - 50.0).abs() < 1e-2, "discontinuity after clear: {out}");
    }

    #[test]
    fn test_lpf_converges_to_step_input() {
        let mut lpf = LowPassFilter::new(ENCODER_LPF_B, ENCODER_LPF_A, Duration::from_millis(20));
        let mut y = 0.0;
        for _ in 0..500 {
            y = lpf.apply(100.0);
        }
        // DC gain (b0+b1)/(1-a0) = 0.99983, near unity
        assert!((y - 100.0).abs() < 0.5, "converged to {y}");
    }

    #[test]
    fn test_lpf_attenuates_alternating_input() {
        let mut lpf = LowPassFilter::new(ENCODER_LPF_B, ENCODER_LPF_A, Duration::from_millis(20));
        let mut peak: f32 = 0.0;
        for i in 0..200 {
            let x = if i % 2 == 0 { 100.0 } else { -100.0 };
            peak = peak.max(lpf.apply(x).abs());
        }
        assert!(peak < 20.0, "high-frequency peak {peak} not attenuated");
    }

    #[test]
    fn test_kalman_moves_toward_measurement() {
        let mut kf = ScalarKalman::new(0.4, 5.0, 0.0);
        let first = kf.update(10.0);
        assert!(first > 0.0 && first < 10.0);
        let mut last = first;
        for _ in 0..100 {
            last = kf.update(10.0);
        }
        assert!((last - 10.0).abs() < 0.1, "settled at {last}");
    }

    #[test]
    fn test_kalman_gain_shrinks_uncertainty() {
        let mut kf = ScalarKalman::new(0.4, 5.0, 0.0);
        kf.update(5.0);
        let after_one = kf.uncertainty;
        for _ in 0..50 {
            kf.update(5.0);
        }
        // Uncertainty settles to the steady state of the q/r tuning
        assert!(kf.uncertainty < after_one);
        assert!(kf.uncertainty > 0.0);
    }

    #[test]
    fn test_count_smoother_keeps_state_across_calls() {
        let mut sm = CountSmoother::new(0.7);
        let s1 = sm.smooth(10.0);
        assert!((s1 - 7.0).abs() < 1e-6);
        // Second call must blend with the stored value, not restart from zero
        let s2 = sm.smooth(10.0);
        assert!((s2 - (0.7 * 10.0 + 0.3 * 7.0)).abs() < 1e-6);
        assert!(s2 > s1);
    }
}
