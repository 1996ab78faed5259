// Wheel velocity estimation from quadrature tick counts
//
// Each control cycle converts the tick delta over the sampling window to a
// raw RPM figure and low-passes it. When a fresh wheel target arrives the
// filter is snapped to that target so the controller never chases the
// filter's memory of the old speed.

use std::time::Duration;

use crate::config::{
    CONTROL_PERIOD, COUNT_SMOOTHER_ALPHA, ENCODER_LPF_A, ENCODER_LPF_B, PULSES_PER_REV,
};
use crate::control::filter::{CountSmoother, LowPassFilter};

/// Raw window conversion: ticks over `interval_ms` to RPM, before any
/// smoothing.
fn raw_rpm(ticks: i32, interval_ms: f32) -> f32 {
    (ticks as f32 * 60.0 * 1000.0) / (PULSES_PER_REV as f32 * interval_ms)
}

#[derive(Debug, Clone)]
pub struct WheelEstimator {
    lpf: LowPassFilter,
    smoother: CountSmoother,
    rpm: f32,
    smoothed_count: f32,
}

impl WheelEstimator {
    pub fn new() -> Self {
        Self {
            lpf: LowPassFilter::new(ENCODER_LPF_B, ENCODER_LPF_A, CONTROL_PERIOD),
            smoother: CountSmoother::new(COUNT_SMOOTHER_ALPHA),
            rpm: 0.0,
            smoothed_count: 0.0,
        }
    }

    /// Fold one sampling window of encoder ticks into the RPM estimate.
    ///
    /// `interval` is the measured wall time the ticks accumulated over; a
    /// degenerate zero interval falls back to the nominal control period
    /// rather than dividing by it.
    pub fn update(&mut self, ticks: i32, interval: Duration) -> f32 {
        let mut interval_ms = interval.as_secs_f32() * 1000.0;
        if interval_ms <= 0.0 {
            interval_ms = CONTROL_PERIOD.as_secs_f32() * 1000.0;
        }
        self.smoothed_count = self.smoother.smooth(ticks as f32);
        self.rpm = self.lpf.apply(raw_rpm(ticks, interval_ms));
        self.rpm
    }

    /// Snap the estimate to a fresh wheel target.
    pub fn reset_to(&mut self, rpm: f32) {
        self.lpf.clear(rpm);
        self.rpm = rpm;
    }

    /// Latest filtered estimate in RPM.
    pub fn rpm(&self) -> f32 {
        self.rpm
    }

    /// Blended tick count, published for diagnostics only.
    pub fn smoothed_count(&self) -> f32 {
        self.smoothed_count
    }
}

impl Default for WheelEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(20);

    #[test]
    fn test_raw_window_conversion_is_exact() {
        // 33 ticks in 20 ms on a 1980-pulse encoder is exactly 50 RPM,
        // before any filtering touches the figure
        assert_eq!(raw_rpm(33, 20.0), 50.0);
        assert_eq!(raw_rpm(-33, 20.0), -50.0);
        assert_eq!(raw_rpm(0, 20.0), 0.0);
    }

    #[test]
    fn test_steady_ticks_converge_to_true_rpm() {
        // 33 ticks per 20 ms window on a 1980-pulse encoder is exactly 50 RPM
        let mut est = WheelEstimator::new();
        let mut rpm = 0.0;
        for _ in 0..500 {
            rpm = est.update(33, WINDOW);
        }
        assert!((rpm - 50.0).abs() < 0.1, "converged to {rpm}");
    }

    #[test]
    fn test_reset_then_matching_ticks_holds_estimate() {
        let mut est = WheelEstimator::new();
        est.update(200, WINDOW);
        est.reset_to(50.0);
        assert_eq!(est.rpm(), 50.0);
        let rpm = est.update(33, WINDOW);
        assert!((rpm - 50.0).abs() < 1e-2, "estimate jumped to {rpm}");
    }

    #[test]
    fn test_reverse_ticks_give_negative_rpm() {
        let mut est = WheelEstimator::new();
        let mut rpm = 0.0;
        for _ in 0..500 {
            rpm = est.update(-33, WINDOW);
        }
        assert!((rpm + 50.0).abs() < 0.1, "converged to {rpm}");
    }

    #[test]
    fn test_zero_interval_does_not_divide_by_zero() {
        let mut est = WheelEstimator::new();
        let rpm = est.update(33, Duration::ZERO);
        assert!(rpm.is_finite());
    }

    #[test]
    fn test_longer_window_scales_rpm_down() {
        // The same tick count over twice the window is half the speed
        let mut a = WheelEstimator::new();
        let mut b = WheelEstimator::new();
        let mut rpm_a = 0.0;
        let mut rpm_b = 0.0;
        for _ in 0..500 {
            rpm_a = a.update(33, WINDOW);
            rpm_b = b.update(33, WINDOW * 2);
        }
        assert!((rpm_a - 2.0 * rpm_b).abs() < 0.2);
    }

    #[test]
    fn test_smoothed_count_is_separate_from_rpm_path() {
        let mut est = WheelEstimator::new();
        est.update(10, WINDOW);
        let first = est.smoothed_count();
        assert!((first - 7.0).abs() < 1e-4);
        // Clearing the RPM path must not disturb the diagnostic series
        est.reset_to(0.0);
        est.update(10, WINDOW);
        assert!(est.smoothed_count() > first);
    }
}
