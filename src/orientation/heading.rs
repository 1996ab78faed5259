// Shared heading cell
//
// One writer (the orientation supervisor) and one reader (the wheel-speed
// recalculation loop). The reader never waits longer than the lock timeout:
// a wedged supervisor degrades heading compensation to zero instead of
// stalling the control path.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time;
use tracing::warn;

use crate::config::HEADING_LOCK_TIMEOUT;

/// Normalize a heading in degrees to `(-180, 180]`. Non-finite readings
/// pass through unchanged; they would never leave the loops below.
pub fn wrap_degrees(mut deg: f32) -> f32 {
    if !deg.is_finite() {
        return deg;
    }
    while deg > 180.0 {
        deg -= 360.0;
    }
    while deg <= -180.0 {
        deg += 360.0;
    }
    deg
}

#[derive(Debug, Clone, Default)]
pub struct HeadingCell {
    inner: Arc<Mutex<f32>>,
}

impl HeadingCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, heading_deg: f32) {
        let mut cell = self.inner.lock().await;
        *cell = heading_deg;
    }

    /// Latest heading in degrees, or 0.0 if the cell could not be locked
    /// within [`HEADING_LOCK_TIMEOUT`].
    pub async fn get(&self) -> f32 {
        match time::timeout(HEADING_LOCK_TIMEOUT, self.inner.lock()).await {
            Ok(cell) => *cell,
            Err(_) => {
                warn!("heading cell busy, falling back to 0.0");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_inside_range_is_unchanged() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert_eq!(wrap_degrees(179.9), 179.9);
        assert_eq!(wrap_degrees(-179.9), -179.9);
        assert_eq!(wrap_degrees(180.0), 180.0);
    }

    #[test]
    fn test_wrap_folds_overflow() {
        assert_eq!(wrap_degrees(190.0), -170.0);
        assert_eq!(wrap_degrees(-190.0), 170.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert_eq!(wrap_degrees(540.0), 180.0);
    }

    #[test]
    fn test_wrap_maps_negative_boundary_up() {
        // -180 and +180 are the same direction; the range keeps +180
        assert_eq!(wrap_degrees(-180.0), 180.0);
    }

    #[test]
    fn test_wrap_passes_non_finite_through() {
        assert!(wrap_degrees(f32::NAN).is_nan());
        assert_eq!(wrap_degrees(f32::INFINITY), f32::INFINITY);
        assert_eq!(wrap_degrees(f32::NEG_INFINITY), f32::NEG_INFINITY);
    }

    #[test]
    fn test_wrap_lands_in_range_and_keeps_direction() {
        let mut deg = -2000.0;
        while deg <= 2000.0 {
            let wrapped = wrap_degrees(deg);
            assert!(wrapped > -180.0 && wrapped <= 180.0, "{deg} -> {wrapped}");
            let turns = (deg - wrapped) / 360.0;
            assert!(
                (turns - turns.round()).abs() < 1e-3,
                "{deg} -> {wrapped} not a whole number of turns apart"
            );
            deg += 7.3;
        }
    }

    #[test]
    fn test_wrap_of_referenced_heading_stays_in_range() {
        // Any raw reading against any reference offset
        let mut raw = -1000.0f32;
        while raw <= 1000.0 {
            let mut offset = -1000.0f32;
            while offset <= 1000.0 {
                let wrapped = wrap_degrees(raw - offset);
                assert!(
                    wrapped > -180.0 && wrapped <= 180.0,
                    "wrap({raw} - {offset}) -> {wrapped}"
                );
                offset += 93.7;
            }
            raw += 93.7;
        }
    }

    #[tokio::test]
    async fn test_cell_returns_latest_written_value() {
        let cell = HeadingCell::new();
        assert_eq!(cell.get().await, 0.0);
        cell.set(42.5).await;
        assert_eq!(cell.get().await, 42.5);
        cell.set(-17.0).await;
        assert_eq!(cell.get().await, -17.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cell_falls_back_when_lock_is_held() {
        let cell = HeadingCell::new();
        cell.set(99.0).await;
        // Wedge the cell by leaking a guard
        let guard = cell.inner.lock().await;
        std::mem::forget(guard);
        assert_eq!(cell.get().await, 0.0);
    }
}
