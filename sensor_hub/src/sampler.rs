//! Window sampling and feature extraction.
//!
//! A door swing produces a sustained one-directional angular rate, so the
//! integral of the offset-corrected rate over a short window is large in
//! magnitude (signed by swing direction), while noise and incidental
//! vibration integrate near zero. One window reduces to one scalar.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::calibration::CalibrationProfile;
use crate::traits::AngularRateSource;
use std::io;
use std::thread::sleep;
use std::time::Duration;

/// Draws `duration * rate` readings at the given cadence. This blocks the
/// caller for the full window; it is the unit of latency in the detection
/// cycle. A read failure aborts the window and propagates.
pub(crate) fn read_paced(
    source: &mut dyn AngularRateSource,
    duration: Duration,
    rate: u32,
) -> io::Result<Vec<f64>> {
    let count = (duration.as_secs_f64() * f64::from(rate)).round() as usize;
    if count == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "Sampling window holds no samples",
        ));
    }

    let period = Duration::from_secs_f64(1.0 / f64::from(rate));
    let mut readings = Vec::with_capacity(count);
    for _ in 0..count {
        readings.push(source.read_rate()?);
        sleep(period);
    }

    Ok(readings)
}

/// Reduces one observation window to its feature: the sum of
/// offset-corrected readings. Deterministic for a given trace and offset.
pub fn sample_window(
    source: &mut dyn AngularRateSource,
    profile: &CalibrationProfile,
    duration: Duration,
    rate: u32,
) -> io::Result<f64> {
    let readings = read_paced(source, duration, rate)?;
    Ok(readings.iter().map(|r| r - profile.offset).sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::ReplaySource;
    use approx::assert_relative_eq;
    use std::fs::File;
    use std::io::Write;

    fn trace_source(dir: &std::path::Path, lines: &[f64]) -> ReplaySource {
        let path = dir.join("trace.txt");
        let mut file = File::create(&path).unwrap();
        for v in lines {
            writeln!(file, "{}", v).unwrap();
        }
        ReplaySource::open(path.to_str().unwrap()).unwrap()
    }

    #[test]
    fn feature_is_the_offset_corrected_sum() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = trace_source(dir.path(), &[2.0, 3.0, -1.0]);

        let profile = CalibrationProfile { offset: 0.5 };
        let feature =
            sample_window(&mut source, &profile, Duration::from_millis(3), 1000).unwrap();

        // (2.0 - 0.5) + (3.0 - 0.5) + (-1.0 - 0.5)
        assert_relative_eq!(feature, 2.5);
    }

    #[test]
    fn same_trace_and_offset_reproduce_the_same_feature() {
        let dir = tempfile::tempdir().unwrap();
        let profile = CalibrationProfile { offset: 0.25 };

        let mut first = trace_source(dir.path(), &[1.0, 1.5, 2.0, -0.5]);
        let a = sample_window(&mut first, &profile, Duration::from_millis(4), 1000).unwrap();

        let mut second = trace_source(dir.path(), &[1.0, 1.5, 2.0, -0.5]);
        let b = sample_window(&mut second, &profile, Duration::from_millis(4), 1000).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn read_failure_aborts_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = trace_source(dir.path(), &[1.0]);

        let profile = CalibrationProfile { offset: 0.0 };
        assert!(sample_window(&mut source, &profile, Duration::from_millis(3), 1000).is_err());
    }

    #[test]
    fn empty_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = trace_source(dir.path(), &[1.0]);

        let profile = CalibrationProfile { offset: 0.0 };
        assert!(sample_window(&mut source, &profile, Duration::from_millis(0), 1000).is_err());
    }
}
