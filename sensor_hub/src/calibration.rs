//! Gyro bias calibration.
//!
//! The profile is a single offset subtracted from every raw reading to
//! null out sensor drift at rest. A calibration run replaces the stored
//! profile wholesale; there is no merging with the previous value.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::sampler::read_paced;
use crate::traits::AngularRateSource;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

const CALIBRATION_FILE: &str = "calibration.json";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct CalibrationProfile {
    pub offset: f64,
}

pub struct CalibrationStore {
    state_dir: String,
}

impl CalibrationStore {
    pub fn new(state_dir: &str) -> Self {
        Self {
            state_dir: state_dir.to_string(),
        }
    }

    fn profile_path(&self) -> PathBuf {
        PathBuf::from(&self.state_dir).join(CALIBRATION_FILE)
    }

    /// Returns the persisted profile, or a zero offset when none exists.
    /// Never fails; an unreadable file is treated like a missing one.
    pub fn load(&self) -> CalibrationProfile {
        let data = match fs::read(self.profile_path()) {
            Ok(data) => data,
            Err(_) => return CalibrationProfile { offset: 0.0 },
        };

        match serde_json::from_slice(&data) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Could not parse the calibration profile ({e}). Using a zero offset.");
                CalibrationProfile { offset: 0.0 }
            }
        }
    }

    /// Samples the resting sensor for `duration` and stores the mean raw
    /// reading as the new offset. A sensor failure mid-run propagates and
    /// leaves the previous profile untouched.
    pub fn calibrate(
        &self,
        source: &mut dyn AngularRateSource,
        duration: Duration,
        rate: u32,
    ) -> io::Result<CalibrationProfile> {
        let readings = read_paced(source, duration, rate)?;
        let offset = readings.iter().sum::<f64>() / readings.len() as f64;

        let profile = CalibrationProfile { offset };
        self.persist(&profile)?;
        Ok(profile)
    }

    /// Stage-then-commit: the new profile is complete and synced on disk
    /// before the rename makes it visible, so a crash can only leave the
    /// old profile or the new one, never a torn file.
    fn persist(&self, profile: &CalibrationProfile) -> io::Result<()> {
        fs::create_dir_all(&self.state_dir)?;

        let staged_path = self.profile_path().with_extension("json.staged");
        let mut staged = fs::File::create(&staged_path)?;
        staged.write_all(&serde_json::to_vec(profile)?)?;
        staged.flush()?;
        staged.sync_all()?;

        fs::rename(&staged_path, self.profile_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::ReplaySource;
    use approx::assert_relative_eq;
    use std::fs::File;
    use std::io::Write;

    fn write_trace(dir: &std::path::Path, lines: &[f64]) -> String {
        let path = dir.join("trace.txt");
        let mut file = File::create(&path).unwrap();
        for v in lines {
            writeln!(file, "{}", v).unwrap();
        }
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn offset_is_the_mean_of_the_raw_trace() {
        let dir = tempfile::tempdir().unwrap();
        let trace = write_trace(dir.path(), &[1.0, 2.0, 3.0, 4.0]);
        let mut source = ReplaySource::open(&trace).unwrap();

        let store = CalibrationStore::new(dir.path().join("state").to_str().unwrap());
        let profile = store
            .calibrate(&mut source, Duration::from_millis(4), 1000)
            .unwrap();

        assert_relative_eq!(profile.offset, 2.5);
        assert_relative_eq!(store.load().offset, 2.5);
    }

    #[test]
    fn constant_trace_yields_that_constant() {
        let dir = tempfile::tempdir().unwrap();
        let trace = write_trace(dir.path(), &[0.5, 0.5, 0.5]);
        let mut source = ReplaySource::open(&trace).unwrap();

        let store = CalibrationStore::new(dir.path().join("state").to_str().unwrap());
        let profile = store
            .calibrate(&mut source, Duration::from_millis(3), 1000)
            .unwrap();

        assert_relative_eq!(profile.offset, 0.5);
    }

    #[test]
    fn failed_run_leaves_prior_profile_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("state").to_str().unwrap());

        let trace = write_trace(dir.path(), &[2.0, 2.0]);
        let mut source = ReplaySource::open(&trace).unwrap();
        store
            .calibrate(&mut source, Duration::from_millis(2), 1000)
            .unwrap();

        // The trace runs out mid-window: the run fails and the stored
        // profile keeps its previous value.
        let short_trace = write_trace(dir.path(), &[9.0]);
        let mut short_source = ReplaySource::open(&short_trace).unwrap();
        assert!(store
            .calibrate(&mut short_source, Duration::from_millis(5), 1000)
            .is_err());

        assert_relative_eq!(store.load().offset, 2.0);
    }

    #[test]
    fn load_without_a_profile_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CalibrationStore::new(dir.path().join("state").to_str().unwrap());
        assert_eq!(store.load().offset, 0.0);
    }
}
