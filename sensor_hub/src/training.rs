//! Append-only store of labeled training samples.
//!
//! One line per sample, `"<feature>,<label code>"`. Rows are never
//! rewritten or deduplicated; the full history feeds every training pass.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::classifier::Label;
use log::warn;
use std::fs;
use std::io;
use std::io::Write;
use std::path::PathBuf;

const TRAINING_FILE: &str = "training_samples.csv";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingSample {
    pub feature: f64,
    pub label: Label,
}

pub struct TrainingStore {
    state_dir: String,
}

impl TrainingStore {
    pub fn new(state_dir: &str) -> Self {
        Self {
            state_dir: state_dir.to_string(),
        }
    }

    fn samples_path(&self) -> PathBuf {
        PathBuf::from(&self.state_dir).join(TRAINING_FILE)
    }

    pub fn record(&self, feature: f64, label: Label) -> io::Result<()> {
        fs::create_dir_all(&self.state_dir)?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.samples_path())?;
        writeln!(file, "{},{}", feature, label.code())?;
        file.flush()?;
        file.sync_all()
    }

    /// Returns the full labeled history. Malformed rows are skipped with
    /// a warning; an absent file is an empty history.
    pub fn load_all(&self) -> io::Result<Vec<TrainingSample>> {
        let data = match fs::read_to_string(self.samples_path()) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut samples = Vec::new();
        for line in data.lines() {
            match parse_row(line) {
                Some(sample) => samples.push(sample),
                None => warn!("Skipping malformed training row: {:?}", line),
            }
        }

        Ok(samples)
    }
}

fn parse_row(line: &str) -> Option<TrainingSample> {
    let (feature, label) = line.split_once(',')?;
    Some(TrainingSample {
        feature: feature.trim().parse().ok()?,
        label: Label::from_code(label.trim().parse().ok()?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_and_load_returns_history_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrainingStore::new(dir.path().join("state").to_str().unwrap());

        store.record(12.5, Label::Open).unwrap();
        store.record(-11.0, Label::Closed).unwrap();
        store.record(0.25, Label::Idle).unwrap();
        // Duplicates are kept; the store never deduplicates.
        store.record(12.5, Label::Open).unwrap();

        let samples = store.load_all().unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].label, Label::Open);
        assert_eq!(samples[1].feature, -11.0);
        assert_eq!(samples[3], samples[0]);
    }

    #[test]
    fn malformed_rows_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let store = TrainingStore::new(state_dir.to_str().unwrap());

        store.record(5.0, Label::Open).unwrap();
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(state_dir.join(TRAINING_FILE))
            .unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "1.0,7").unwrap(); // label code out of range
        store.record(-5.0, Label::Closed).unwrap();

        let samples = store.load_all().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].label, Label::Closed);
    }

    #[test]
    fn missing_file_is_an_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = TrainingStore::new(dir.path().join("state").to_str().unwrap());
        assert!(store.load_all().unwrap().is_empty());
    }
}
