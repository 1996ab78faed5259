// File-backed calibration persistence
//
// Offsets are kept as a small JSON blob so they survive power cycles and can
// be inspected or edited by hand. A missing file is simply "never
// calibrated"; a malformed one is an error the caller decides how to treat.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::hw::{CalibrationStore, Result, SensorOffsets};

#[derive(Debug, Clone)]
pub struct FileCalibrationStore {
    path: PathBuf,
}

impl FileCalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CalibrationStore for FileCalibrationStore {
    fn load(&mut self) -> Result<Option<SensorOffsets>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let offsets = serde_json::from_slice(&bytes)?;
        Ok(Some(offsets))
    }

    fn save(&mut self, offsets: &SensorOffsets) -> Result<()> {
        let json = serde_json::to_vec_pretty(offsets)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}
