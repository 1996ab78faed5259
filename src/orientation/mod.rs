// Orientation subsystem: calibration, yaw referencing, fault recovery
//
// A single supervisor task walks the sensor through its lifecycle:
//
//   Initializing -> Calibrating -> Streaming
//       |               ^              |
//  (open failed)        |         (read error)
//       v               |              v
//     Faulted -> Reinitializing -> Streaming again, or Calibrating if the
//                                  yaw reference never latched
//
// Because every phase lives in one task, the fault branch can never run two
// retry loops at once and streaming resumes exactly once per recovery. The
// yaw reference survives recovery; a sensor that failed before ever
// calibrating is routed back through Calibrating instead.

pub mod heading;

use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::{
    CALIBRATION_POLL_PERIOD, CALIBRATION_SETTLE_DELAY, INDICATOR_BLINK_PERIOD, ORIENTATION_PERIOD,
    SENSOR_RETRY_BACKOFF, YAW_MAX_SAMPLES, YAW_REQUIRED_STABLE_SAMPLES, YAW_SAMPLE_PERIOD,
    YAW_STABILITY_THRESHOLD_DEG,
};
use crate::hw::{CalibrationStore, FaultIndicator, OrientationSample, OrientationSensor};
use crate::messages::TelemetryRecord;
use heading::{HeadingCell, wrap_degrees};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Calibrating,
    Streaming,
    Faulted,
    Reinitializing,
}

pub struct OrientationSupervisor {
    sensor: Box<dyn OrientationSensor>,
    store: Box<dyn CalibrationStore>,
    indicator: Box<dyn FaultIndicator>,
    heading: HeadingCell,
    telemetry: mpsc::Sender<TelemetryRecord>,
    yaw_offset: Option<f32>,
}

impl OrientationSupervisor {
    pub fn new(
        sensor: Box<dyn OrientationSensor>,
        store: Box<dyn CalibrationStore>,
        indicator: Box<dyn FaultIndicator>,
        heading: HeadingCell,
        telemetry: mpsc::Sender<TelemetryRecord>,
    ) -> Self {
        Self {
            sensor,
            store,
            indicator,
            heading,
            telemetry,
            yaw_offset: None,
        }
    }

    /// Drive the sensor lifecycle forever. Never returns; transient faults
    /// are absorbed by the Reinitializing phase.
    pub async fn run(mut self) {
        let mut phase = Phase::Initializing;
        loop {
            phase = match phase {
                Phase::Initializing => self.initialize(),
                Phase::Calibrating => self.calibrate().await,
                Phase::Streaming => self.stream().await,
                Phase::Faulted => self.enter_fault(),
                Phase::Reinitializing => self.reinitialize().await,
            };
        }
    }

    fn initialize(&mut self) -> Phase {
        info!("Initializing orientation sensor");
        if let Err(e) = self.sensor.initialize() {
            error!("Orientation sensor failed to open: {}", e);
            return Phase::Faulted;
        }
        // A previously calibrated unit starts out close to calibrated once
        // its saved offsets are back in the fusion core
        match self.store.load() {
            Ok(Some(offsets)) => match self.sensor.apply_offsets(&offsets) {
                Ok(()) => info!("Restored calibration offsets from store"),
                Err(e) => warn!("Could not apply stored offsets: {}", e),
            },
            Ok(None) => debug!("No stored calibration offsets"),
            Err(e) => warn!("Calibration store unreadable: {}", e),
        }
        Phase::Calibrating
    }

    async fn calibrate(&mut self) -> Phase {
        info!("Waiting for sensor calibration");
        let mut ticker = time::interval(CALIBRATION_POLL_PERIOD);
        let status = loop {
            ticker.tick().await;
            match self.sensor.calibration_status() {
                Ok(status) if status.is_complete() => break status,
                Ok(status) => debug!(
                    "Calibration in progress: sys={} gyro={} accel={} mag={}",
                    status.sys, status.gyro, status.accel, status.mag
                ),
                Err(e) => {
                    error!("Calibration status read failed: {}", e);
                    return Phase::Faulted;
                }
            }
        };
        info!(
            "Calibration complete: sys={} gyro={} accel={} mag={}",
            status.sys, status.gyro, status.accel, status.mag
        );

        // Persist the offsets so the next boot can restore them. Best
        // effort: a full calibration is still usable if the store is not.
        match self.sensor.offsets() {
            Ok(offsets) => match self.store.save(&offsets) {
                Ok(()) => info!("Calibration offsets saved"),
                Err(e) => warn!("Could not persist calibration offsets: {}", e),
            },
            Err(e) => warn!("Could not read calibration offsets: {}", e),
        }

        // Let the fused heading settle before picking the reference
        time::sleep(CALIBRATION_SETTLE_DELAY).await;
        self.latch_yaw_reference().await;

        if self
            .telemetry
            .try_send(TelemetryRecord::CalibrationComplete(status))
            .is_err()
        {
            debug!("Telemetry queue full, dropping calibration record");
        }
        Phase::Streaming
    }

    /// Hunt for a quiet stretch of heading readings and make it the zero
    /// reference. Falls back to the newest reading if the sensor never
    /// settles within the sample budget.
    async fn latch_yaw_reference(&mut self) {
        info!("Capturing yaw reference");
        let mut prev = match self.sensor.read_sample() {
            Ok(sample) => sample.heading_deg,
            Err(e) => {
                warn!("Initial yaw reading failed: {}", e);
                0.0
            }
        };
        let mut last = prev;
        let mut stable_run = 0u32;
        time::sleep(YAW_SAMPLE_PERIOD).await;

        for attempt in 0..YAW_MAX_SAMPLES {
            let heading = match self.sensor.read_sample() {
                Ok(sample) => sample.heading_deg,
                Err(e) => {
                    warn!("Yaw sample {} failed: {}", attempt, e);
                    stable_run = 0;
                    continue;
                }
            };
            let diff = (heading - prev).abs();
            if diff <= YAW_STABILITY_THRESHOLD_DEG {
                stable_run += 1;
                if stable_run >= YAW_REQUIRED_STABLE_SAMPLES {
                    info!(
                        "Yaw reference {:.2} latched after {} stable samples",
                        heading, stable_run
                    );
                    self.yaw_offset = Some(heading);
                    return;
                }
            } else {
                debug!("Unstable yaw change {:.4}, restarting run", diff);
                stable_run = 0;
            }
            prev = heading;
            last = heading;
            time::sleep(YAW_SAMPLE_PERIOD).await;
        }

        warn!("No stable heading found, using last reading {:.2}", last);
        self.yaw_offset = Some(last);
    }

    async fn stream(&mut self) -> Phase {
        info!("Orientation streaming started");
        let mut ticker = time::interval(ORIENTATION_PERIOD);
        loop {
            ticker.tick().await;
            let sample = match self.sensor.read_sample() {
                Ok(sample) => sample,
                Err(e) => {
                    error!("Orientation read failed: {}", e);
                    return Phase::Faulted;
                }
            };
            let adjusted = self.adjusted_heading(sample.heading_deg);
            self.heading.set(adjusted).await;

            let record = TelemetryRecord::Orientation(OrientationSample {
                heading_deg: adjusted,
                ..sample
            });
            // Telemetry is lossy on purpose; the heading cell is the
            // authoritative output of this loop
            let _ = self.telemetry.try_send(record);
        }
    }

    fn enter_fault(&mut self) -> Phase {
        warn!("Entering fault recovery");
        if let Err(e) = self.sensor.close() {
            warn!("Sensor close failed: {}", e);
        }
        if let Err(e) = self.indicator.set_active(true) {
            warn!("Fault indicator unavailable: {}", e);
        }
        Phase::Reinitializing
    }

    async fn reinitialize(&mut self) -> Phase {
        let mut lit = false;
        loop {
            // Blink through one backoff window, then try to reopen
            let deadline = time::Instant::now() + SENSOR_RETRY_BACKOFF;
            while time::Instant::now() < deadline {
                lit = !lit;
                if let Err(e) = self.indicator.set_active(lit) {
                    warn!("Fault indicator unavailable: {}", e);
                }
                time::sleep(INDICATOR_BLINK_PERIOD).await;
            }
            match self.sensor.initialize() {
                Ok(()) => {
                    if let Err(e) = self.indicator.set_active(false) {
                        warn!("Fault indicator unavailable: {}", e);
                    }
                    return if self.yaw_offset.is_some() {
                        info!("Orientation sensor recovered, resuming stream");
                        Phase::Streaming
                    } else {
                        // Failed before ever calibrating; start from scratch
                        info!("Orientation sensor recovered, calibrating");
                        Phase::Calibrating
                    };
                }
                Err(e) => warn!("Sensor reopen failed, retrying: {}", e),
            }
        }
    }

    fn adjusted_heading(&self, raw: f32) -> f32 {
        match self.yaw_offset {
            Some(offset) => wrap_degrees(raw - offset),
            None => raw,
        }
    }
}
