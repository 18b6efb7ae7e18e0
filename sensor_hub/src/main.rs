//! Ajar sensor hub.
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

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

use ajar_telemetry_lib::message::{epoch_now, DoorState};
use ajar_telemetry_lib::mqtt::EventPublisher;
use cfg_if::cfg_if;
use docopt::Docopt;
use std::io;
use std::io::Write;
use std::process::exit;
use std::thread::sleep;
use std::time::Duration;

mod calibration;
use crate::calibration::CalibrationStore;
mod classifier;
use crate::classifier::{DoorClassifier, Label, TrainOutcome};
mod config;
use crate::config::{HubConfig, SensorConfig};
mod debounce;
use crate::debounce::TransitionDebouncer;
mod imu;
use crate::imu::ReplaySource;
mod sampler;
use crate::sampler::sample_window;
mod training;
use crate::training::TrainingStore;
mod traits;
use crate::traits::AngularRateSource;

cfg_if! {
    if #[cfg(feature = "raspberry")] {
        use crate::imu::{GyroAxis, Mpu6050};
    }
}

const USAGE: &str = "
Ajar sensor hub: watches a door-mounted gyro and publishes confirmed open/closed transitions to the telemetry channel.

Usage:
  ajar-sensor-hub [--config FILE]
  ajar-sensor-hub --calibrate [--config FILE]
  ajar-sensor-hub --train [--config FILE]
  ajar-sensor-hub (--version | -v)
  ajar-sensor-hub (--help | -h)

Options:
    --calibrate         Measure the resting gyro bias and store it
    --train             Record labeled windows, then fit a new model
    --config FILE       Configuration file [default: ajar.yaml]
    --version, -v       Show version
    --help, -h          Show help
";

#[derive(Debug, Clone, Deserialize)]
struct Args {
    flag_calibrate: bool,
    flag_train: bool,
    flag_config: String,
}

fn main() -> io::Result<()> {
    let version = env!("CARGO_PKG_NAME").to_string() + ", version: " + env!("CARGO_PKG_VERSION");
    env_logger::init();

    let args: Args = Docopt::new(USAGE)
        .map(|d| d.help(true))
        .map(|d| d.version(Some(version)))
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    let config = match HubConfig::from_file(&args.flag_config) {
        Ok(config) => config,

        Err(_error) => {
            println!(
                "Error retrieving the {} file, see example_ajar.yaml for an example configuration.",
                args.flag_config
            );
            exit(1);
        }
    };

    let mut source = build_source(&config.sensor)?;
    println!("Using sensor: {}", source.get_name());

    if args.flag_calibrate {
        calibrate(source.as_mut(), &config)
    } else if args.flag_train {
        train(source.as_mut(), &config)
    } else {
        detect(source.as_mut(), &config)
    }
}

fn build_source(config: &SensorConfig) -> io::Result<Box<dyn AngularRateSource>> {
    match config.kind.as_str() {
        "MPU6050" => mpu6050_source(config),
        "Replay" => {
            let trace = config.trace.as_deref().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "The Replay sensor needs a trace path in the sensor section",
                )
            })?;
            Ok(Box::new(ReplaySource::open(trace)?))
        }
        other => {
            panic!(
                "Unknown sensor type ({:?}). Supported types are MPU6050 and Replay",
                other
            )
        }
    }
}

#[cfg(feature = "raspberry")]
fn mpu6050_source(config: &SensorConfig) -> io::Result<Box<dyn AngularRateSource>> {
    let axis = GyroAxis::parse(&config.gyro_axis)?;
    Ok(Box::new(Mpu6050::new(axis)?))
}

#[cfg(not(feature = "raspberry"))]
fn mpu6050_source(_config: &SensorConfig) -> io::Result<Box<dyn AngularRateSource>> {
    panic!("MPU6050 sensors are only supported with the \"raspberry\" feature.")
}

fn calibrate(source: &mut dyn AngularRateSource, config: &HubConfig) -> io::Result<()> {
    let store = CalibrationStore::new(&config.detection.state_dir);

    println!(
        "Calibrating. Keep the door still for {} seconds...",
        config.sensor.calibration_secs
    );
    let profile = store.calibrate(
        source,
        Duration::from_secs_f64(config.sensor.calibration_secs),
        config.sensor.sample_rate,
    )?;

    println!("Calibration done. Offset: {:.4}", profile.offset);
    Ok(())
}

fn train(source: &mut dyn AngularRateSource, config: &HubConfig) -> io::Result<()> {
    let store = TrainingStore::new(&config.detection.state_dir);
    let profile = CalibrationStore::new(&config.detection.state_dir).load();
    let window = Duration::from_secs_f64(config.detection.window_secs);

    println!("Training mode: label states as 0=closed, 1=open, 2=idle, q=quit");
    loop {
        let input = ask_user("Label this state (0/1/2/q): ".to_string())?;
        if input.eq_ignore_ascii_case("q") {
            break;
        }
        let label = match input.parse::<u8>().ok().and_then(Label::from_code) {
            Some(label) => label,
            None => {
                println!("Unknown label {:?}.", input);
                continue;
            }
        };

        println!("Recording window...");
        let feature = match sample_window(source, &profile, window, config.sensor.sample_rate) {
            Ok(feature) => feature,
            Err(e) => {
                error!("Could not record the window ({e}). Label the state again.");
                continue;
            }
        };

        store.record(feature, label)?;
        println!("Saved sample: feature={:.3}, label={}", feature, label);
    }

    let samples = store.load_all()?;
    match DoorClassifier::train(&config.detection.state_dir, &samples)? {
        TrainOutcome::Trained { samples } => {
            println!("Model trained from {} samples.", samples);
        }
        TrainOutcome::Insufficient { missing } => {
            println!(
                "Not enough samples to train: no {} sample yet. Keeping the current model.",
                missing.join(" or ")
            );
        }
    }

    Ok(())
}

fn detect(source: &mut dyn AngularRateSource, config: &HubConfig) -> io::Result<()> {
    let profile = CalibrationStore::new(&config.detection.state_dir).load();
    let classifier = DoorClassifier::load(
        &config.detection.state_dir,
        config.detection.heuristic_threshold,
    );

    // Without a destination for events there is nothing to detect for;
    // a connection failure here ends the run.
    let publisher = EventPublisher::connect(&config.channel)?;

    let window = Duration::from_secs_f64(config.detection.window_secs);
    let pause = Duration::from_millis(config.detection.cycle_pause_ms);
    let mut debouncer = TransitionDebouncer::new();
    let mut warned_untrained = false;

    println!("Running...");
    loop {
        let feature = match sample_window(source, &profile, window, config.sensor.sample_rate) {
            Ok(feature) => feature,
            Err(e) => {
                // One bad window is not fatal; the next cycle retries.
                error!("Sensor read failed ({e}). Skipping this cycle.");
                sleep(pause);
                continue;
            }
        };

        let label = match classifier.predict(feature) {
            Some(label) => label,
            None => {
                if !warned_untrained {
                    warn!("No usable classifier. Train a model or configure a heuristic threshold.");
                    warned_untrained = true;
                }
                sleep(pause);
                continue;
            }
        };
        debug!("feature={:.3} label={}", feature, label);

        if let Some(event) = debouncer.observe(label, epoch_now()) {
            match event.door_state {
                DoorState::Open => println!("Door opened!"),
                DoorState::Closed => println!("Door closed!"),
                DoorState::Unknown => {}
            }
            publisher.publish(&event)?;
        }

        sleep(pause);
    }
}

fn ask_user(prompt: String) -> io::Result<String> {
    print!("{prompt}");
    // Make sure the prompt is displayed before reading input
    io::stdout().flush()?;

    let mut user_input = String::new();
    io::stdin().read_line(&mut user_input)?;
    // Trim the input to remove any extra whitespace or newline characters
    Ok(user_input.trim().to_string())
}
