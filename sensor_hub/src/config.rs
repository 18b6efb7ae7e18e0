//! Sensor hub configuration (ajar.yaml).
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use ajar_telemetry_lib::mqtt::ChannelConfig;
use serde::Deserialize;
use std::fs::File;
use std::io;

#[derive(Clone, Debug, Deserialize)]
pub struct HubConfig {
    pub sensor: SensorConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    pub channel: ChannelConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SensorConfig {
    /// "MPU6050" (requires the "raspberry" feature) or "Replay".
    #[serde(rename = "type")]
    pub kind: String,
    /// Axis the door swings around.
    #[serde(default = "default_gyro_axis")]
    pub gyro_axis: String,
    /// Readings per second inside a window.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Trace file for the Replay sensor.
    pub trace: Option<String>,
    /// How long a calibration run samples the resting door.
    #[serde(default = "default_calibration_secs")]
    pub calibration_secs: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
    #[serde(default = "default_cycle_pause_ms")]
    pub cycle_pause_ms: u64,
    /// Fallback |feature| threshold used when no trained model exists.
    /// Omit it to skip classification entirely until a model is trained.
    pub heuristic_threshold: Option<f64>,
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            cycle_pause_ms: default_cycle_pause_ms(),
            heuristic_threshold: None,
            state_dir: default_state_dir(),
        }
    }
}

fn default_gyro_axis() -> String {
    "x".to_string()
}

fn default_sample_rate() -> u32 {
    100
}

fn default_calibration_secs() -> f64 {
    5.0
}

fn default_window_secs() -> f64 {
    1.0
}

fn default_cycle_pause_ms() -> u64 {
    500
}

fn default_state_dir() -> String {
    "state".to_string()
}

impl HubConfig {
    pub fn from_file(path: &str) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yml::from_reader(file).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn full_config_parses_with_defaults_applied() {
        let yaml = "
sensor:
  type: Replay
  trace: traces/door.txt
detection:
  heuristic_threshold: 50.0
channel:
  endpoint: example-ats.iot.us-east-2.amazonaws.com
  port: 8883
  client_id: door_sensor
  topic: door/status
  ca_cert: certs/AmazonRootCA1.pem
  client_cert: certs/door-certificate.pem.crt
  client_key: certs/door-private.pem.key
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ajar.yaml");
        write!(File::create(&path).unwrap(), "{}", yaml).unwrap();

        let config = HubConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.sensor.kind, "Replay");
        assert_eq!(config.sensor.sample_rate, 100);
        assert_eq!(config.sensor.gyro_axis, "x");
        assert_eq!(config.detection.window_secs, 1.0);
        assert_eq!(config.detection.cycle_pause_ms, 500);
        assert_eq!(config.detection.heuristic_threshold, Some(50.0));
        assert_eq!(config.detection.state_dir, "state");
        assert_eq!(config.channel.topic, "door/status");
    }
}
