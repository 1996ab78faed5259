// In-memory hardware for development and tests
//
// The drivetrain is a first-order velocity plant: each encoder read advances
// every wheel toward the speed implied by its last duty command and
// synthesizes the tick count for one control window. The IMU replays a
// script, which is how tests inject calibration sequences and bus faults.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::{CONTROL_PERIOD, DUTY_PER_RPM, NUM_WHEELS, PULSES_PER_REV};
use crate::hw::{
    CalibrationStatus, Direction, DutyCommand, EncoderBank, FaultIndicator, HwError, MotorBus,
    OrientationSample, OrientationSensor, Result, SensorOffsets, WheelId,
};

// Fraction of the remaining speed error closed per window
const PLANT_RESPONSE: f32 = 0.35;

fn lock_or_fault<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| HwError::ReadFailed {
        reason: format!("{what} lock poisoned"),
    })
}

#[derive(Debug)]
struct PlantState {
    rpm: [f32; NUM_WHEELS],
    commanded_rpm: [f32; NUM_WHEELS],
    tick_residue: [f32; NUM_WHEELS],
}

/// Simulated three-wheel drivetrain. Clone handles share one plant, so the
/// motor bus and encoder bank handed to the runtime stay coupled.
#[derive(Debug, Clone)]
pub struct SimDrivetrain {
    state: Arc<Mutex<PlantState>>,
}

impl SimDrivetrain {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PlantState {
                rpm: [0.0; NUM_WHEELS],
                commanded_rpm: [0.0; NUM_WHEELS],
                tick_residue: [0.0; NUM_WHEELS],
            })),
        }
    }

    pub fn motor_bus(&self) -> SimMotorBus {
        SimMotorBus {
            state: Arc::clone(&self.state),
        }
    }

    pub fn encoder_bank(&self) -> SimEncoderBank {
        SimEncoderBank {
            state: Arc::clone(&self.state),
        }
    }

    /// Current plant speed, for assertions.
    pub fn wheel_rpm(&self, wheel: WheelId) -> f32 {
        match self.state.lock() {
            Ok(state) => state.rpm[wheel.index()],
            Err(_) => f32::NAN,
        }
    }

    /// Last duty command on the bridge expressed as RPM, for assertions.
    pub fn commanded_rpm(&self, wheel: WheelId) -> f32 {
        match self.state.lock() {
            Ok(state) => state.commanded_rpm[wheel.index()],
            Err(_) => f32::NAN,
        }
    }
}

impl Default for SimDrivetrain {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct SimMotorBus {
    state: Arc<Mutex<PlantState>>,
}

impl MotorBus for SimMotorBus {
    fn drive(&mut self, wheel: WheelId, cmd: DutyCommand) -> Result<()> {
        let mut state = lock_or_fault(&self.state, "sim plant")?;
        let magnitude = cmd.duty as f32 / DUTY_PER_RPM;
        state.commanded_rpm[wheel.index()] = match cmd.direction {
            Direction::Forward => magnitude,
            Direction::Reverse => -magnitude,
        };
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SimEncoderBank {
    state: Arc<Mutex<PlantState>>,
}

impl EncoderBank for SimEncoderBank {
    fn take_counts(&mut self) -> Result<[i32; NUM_WHEELS]> {
        let mut state = lock_or_fault(&self.state, "sim plant")?;
        let window_s = CONTROL_PERIOD.as_secs_f32();
        let mut counts = [0i32; NUM_WHEELS];
        for i in 0..NUM_WHEELS {
            let error = state.commanded_rpm[i] - state.rpm[i];
            state.rpm[i] += error * PLANT_RESPONSE;
            // Revolutions this window times pulses per revolution, with the
            // fractional remainder carried into the next window
            let exact =
                state.rpm[i] / 60.0 * PULSES_PER_REV as f32 * window_s + state.tick_residue[i];
            let whole = exact.trunc();
            state.tick_residue[i] = exact - whole;
            counts[i] = whole as i32;
        }
        Ok(counts)
    }
}

#[derive(Debug, Default)]
struct ImuScript {
    init_results: VecDeque<Result<()>>,
    statuses: VecDeque<CalibrationStatus>,
    samples: VecDeque<Result<OrientationSample>>,
    last_sample: OrientationSample,
    offsets: SensorOffsets,
    applied: Vec<SensorOffsets>,
    init_calls: usize,
    close_calls: usize,
}

/// Scripted orientation sensor. Queued entries are consumed in order; an
/// exhausted queue falls back to success (complete calibration, repeat of
/// the last sample), so a drained script behaves like a healthy sensor.
#[derive(Debug, Clone, Default)]
pub struct ScriptedImu {
    state: Arc<Mutex<ImuScript>>,
}

impl ScriptedImu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Healthy sensor pinned at one heading.
    pub fn steady(heading_deg: f32) -> Self {
        let imu = Self::new();
        if let Ok(mut s) = imu.state.lock() {
            s.last_sample = OrientationSample {
                heading_deg,
                ..OrientationSample::default()
            };
        }
        imu
    }

    /// Queue `n` failed initializations. An exhausted queue succeeds, so
    /// these are the failures before the eventual recovery.
    pub fn fail_next_inits(&self, n: usize) {
        if let Ok(mut s) = self.state.lock() {
            for _ in 0..n {
                s.init_results.push_back(Err(HwError::SensorUnavailable {
                    reason: "scripted init failure".into(),
                }));
            }
        }
    }

    /// Queue one successful initialization.
    pub fn push_init_success(&self) {
        if let Ok(mut s) = self.state.lock() {
            s.init_results.push_back(Ok(()));
        }
    }

    pub fn push_status(&self, status: CalibrationStatus) {
        if let Ok(mut s) = self.state.lock() {
            s.statuses.push_back(status);
        }
    }

    pub fn push_sample(&self, sample: OrientationSample) {
        if let Ok(mut s) = self.state.lock() {
            s.samples.push_back(Ok(sample));
        }
    }

    pub fn push_headings(&self, headings: &[f32]) {
        for &heading_deg in headings {
            self.push_sample(OrientationSample {
                heading_deg,
                ..OrientationSample::default()
            });
        }
    }

    pub fn push_sample_error(&self, reason: &str) {
        if let Ok(mut s) = self.state.lock() {
            s.samples.push_back(Err(HwError::ReadFailed {
                reason: reason.to_string(),
            }));
        }
    }

    pub fn set_offsets(&self, offsets: SensorOffsets) {
        if let Ok(mut s) = self.state.lock() {
            s.offsets = offsets;
        }
    }

    pub fn init_calls(&self) -> usize {
        self.state.lock().map(|s| s.init_calls).unwrap_or(0)
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().map(|s| s.close_calls).unwrap_or(0)
    }

    pub fn applied_offsets(&self) -> Vec<SensorOffsets> {
        self.state
            .lock()
            .map(|s| s.applied.clone())
            .unwrap_or_default()
    }
}

impl OrientationSensor for ScriptedImu {
    fn initialize(&mut self) -> Result<()> {
        let mut s = lock_or_fault(&self.state, "imu script")?;
        s.init_calls += 1;
        s.init_results.pop_front().unwrap_or(Ok(()))
    }

    fn close(&mut self) -> Result<()> {
        let mut s = lock_or_fault(&self.state, "imu script")?;
        s.close_calls += 1;
        Ok(())
    }

    fn calibration_status(&mut self) -> Result<CalibrationStatus> {
        let mut s = lock_or_fault(&self.state, "imu script")?;
        Ok(s.statuses.pop_front().unwrap_or(CalibrationStatus {
            sys: 3,
            gyro: 3,
            accel: 3,
            mag: 3,
        }))
    }

    fn read_sample(&mut self) -> Result<OrientationSample> {
        let mut s = lock_or_fault(&self.state, "imu script")?;
        match s.samples.pop_front() {
            Some(Ok(sample)) => {
                s.last_sample = sample;
                Ok(sample)
            }
            Some(Err(e)) => Err(e),
            None => Ok(s.last_sample),
        }
    }

    fn offsets(&mut self) -> Result<SensorOffsets> {
        let s = lock_or_fault(&self.state, "imu script")?;
        Ok(s.offsets)
    }

    fn apply_offsets(&mut self, offsets: &SensorOffsets) -> Result<()> {
        let mut s = lock_or_fault(&self.state, "imu script")?;
        s.applied.push(*offsets);
        Ok(())
    }
}

/// Calibration store backed by a shared slot. `failing()` makes every save
/// error, for exercising the best-effort persistence path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<SensorOffsets>>>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_offsets(offsets: SensorOffsets) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.slot.lock() {
            *slot = Some(offsets);
        }
        store
    }

    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Option<SensorOffsets> {
        self.slot.lock().ok().and_then(|slot| *slot)
    }
}

impl crate::hw::CalibrationStore for MemoryStore {
    fn load(&mut self) -> Result<Option<SensorOffsets>> {
        let slot = lock_or_fault(&self.slot, "store slot")?;
        Ok(*slot)
    }

    fn save(&mut self, offsets: &SensorOffsets) -> Result<()> {
        if self.fail_saves {
            return Err(HwError::StoreIo(std::io::Error::other(
                "scripted save failure",
            )));
        }
        let mut slot = lock_or_fault(&self.slot, "store slot")?;
        *slot = Some(*offsets);
        Ok(())
    }
}

/// Fault lamp that remembers every level it was set to.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndicator {
    states: Arc<Mutex<Vec<bool>>>,
}

impl RecordingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<bool> {
        self.states.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_lit(&self) -> bool {
        self.states
            .lock()
            .ok()
            .and_then(|s| s.last().copied())
            .unwrap_or(false)
    }
}

impl FaultIndicator for RecordingIndicator {
    fn set_active(&mut self, on: bool) -> Result<()> {
        let mut states = lock_or_fault(&self.states, "indicator")?;
        states.push(on);
        Ok(())
    }
}

/// Fault lamp for headless runs: transitions land in the log instead of
/// on a GPIO pin.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIndicator;

impl FaultIndicator for LogIndicator {
    fn set_active(&mut self, on: bool) -> Result<()> {
        tracing::info!("Fault indicator {}", if on { "on" } else { "off" });
        Ok(())
    }
}
