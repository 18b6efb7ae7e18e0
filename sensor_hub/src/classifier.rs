//! Door state classification from the window feature.
//!
//! Two interchangeable strategies. With a trained model on disk, a
//! multinomial logistic regression over the 1-D feature separates the
//! opening swing (large positive integral), the closing swing (large
//! negative integral) and idle noise near zero. Without one, a fixed
//! magnitude threshold distinguishes open from closed. With neither,
//! prediction reports untrained instead of guessing.
//!
//! Copyright (C) 2025  Ajar Developers
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::training::TrainingSample;
use linfa::prelude::*;
use linfa::Dataset;
use linfa_logistic::{MultiFittedLogisticRegression, MultiLogisticRegression};
use log::{info, warn};
use ndarray::{Array1, Array2};
use std::fmt;
use std::fs;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};

const MODEL_FILE: &str = "door_model";

const MAX_TRAIN_ITERATIONS: u64 = 500;

/// Classification label for one window. The integer codes are the on-disk
/// training record encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Label {
    Closed,
    Open,
    Idle,
}

impl Label {
    pub fn code(self) -> u8 {
        match self {
            Label::Closed => 0,
            Label::Open => 1,
            Label::Idle => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Label::Closed),
            1 => Some(Label::Open),
            2 => Some(Label::Idle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Closed => "closed",
            Label::Open => "open",
            Label::Idle => "idle",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a training request. Insufficient coverage is a reported
/// no-op, not an error; the previously stored model stays usable.
pub enum TrainOutcome {
    Trained { samples: usize },
    Insufficient { missing: Vec<&'static str> },
}

type Model = MultiFittedLogisticRegression<f64, usize>;

pub struct DoorClassifier {
    model: Option<Model>,
    heuristic_threshold: Option<f64>,
}

impl DoorClassifier {
    /// Loads the trained model if one exists, else falls back to the
    /// configured heuristic. An unreadable model is treated as absent.
    pub fn load(state_dir: &str, heuristic_threshold: Option<f64>) -> Self {
        let model = match fs::read(model_path(state_dir)) {
            Ok(data) => match bincode::deserialize(&data) {
                Ok(model) => {
                    info!("Loaded trained door model.");
                    Some(model)
                }
                Err(e) => {
                    warn!("Could not parse the stored door model ({e}).");
                    None
                }
            },
            Err(_) => None,
        };

        if model.is_none() {
            match heuristic_threshold {
                Some(threshold) => warn!(
                    "No trained model found. Using the heuristic classifier (threshold {threshold})."
                ),
                None => warn!(
                    "No trained model found and no heuristic threshold configured. \
                    Classification will be skipped until a model is trained."
                ),
            }
        }

        Self {
            model,
            heuristic_threshold,
        }
    }

    /// Classifies one feature. `None` means untrained: no model and no
    /// heuristic. Callers must skip the cycle, never synthesize a label.
    pub fn predict(&self, feature: f64) -> Option<Label> {
        if let Some(model) = &self.model {
            let features =
                Array2::from_shape_vec((1, 1), vec![feature]).expect("1x1 feature matrix");
            let predicted = model.predict(&features);
            return Label::from_code(predicted[0] as u8);
        }

        self.heuristic_threshold.map(|threshold| {
            if feature.abs() > threshold {
                Label::Open
            } else {
                Label::Closed
            }
        })
    }

    /// Fits a new model from the labeled history and commits it with
    /// atomic replace semantics: the fitted model is serialized to a
    /// staging file and renamed over the old one, so a failure mid-train
    /// can never corrupt a previously usable model.
    pub fn train(state_dir: &str, samples: &[TrainingSample]) -> io::Result<TrainOutcome> {
        let missing: Vec<&'static str> = [Label::Closed, Label::Open, Label::Idle]
            .iter()
            .filter(|needed| !samples.iter().any(|s| s.label == **needed))
            .map(|needed| needed.as_str())
            .collect();
        if !missing.is_empty() {
            return Ok(TrainOutcome::Insufficient { missing });
        }

        let records = Array2::from_shape_vec(
            (samples.len(), 1),
            samples.iter().map(|s| s.feature).collect(),
        )
        .expect("one row per sample");
        let targets: Array1<usize> = samples.iter().map(|s| s.label.code() as usize).collect();
        let dataset = Dataset::new(records, targets);

        let model = MultiLogisticRegression::default()
            .max_iterations(MAX_TRAIN_ITERATIONS)
            .fit(&dataset)
            .map_err(|e| {
                io::Error::new(io::ErrorKind::Other, format!("Training failed: {e}"))
            })?;

        fs::create_dir_all(state_dir)?;
        let staged_path = PathBuf::from(state_dir).join(format!("{}.staged", MODEL_FILE));
        let mut staged = fs::File::create(&staged_path)?;
        let data = bincode::serialize(&model)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        staged.write_all(&data)?;
        staged.flush()?;
        staged.sync_all()?;
        fs::rename(&staged_path, model_path(state_dir))?;

        Ok(TrainOutcome::Trained {
            samples: samples.len(),
        })
    }
}

fn model_path(state_dir: &str) -> PathBuf {
    Path::new(state_dir).join(MODEL_FILE)
}
