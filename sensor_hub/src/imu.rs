//! Angular-rate sources: the MPU-6050 gyro on the door, and a replay
//! source for bench runs without hardware.
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

use crate::traits::AngularRateSource;
use std::fs::File;
use std::io;
use std::io::{BufRead, BufReader};

/// Gyro axis the door swings around. The hub consumes exactly one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GyroAxis {
    X,
    Y,
    Z,
}

impl GyroAxis {
    pub fn parse(name: &str) -> io::Result<Self> {
        match name {
            "x" | "X" => Ok(GyroAxis::X),
            "y" | "Y" => Ok(GyroAxis::Y),
            "z" | "Z" => Ok(GyroAxis::Z),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Unknown gyro axis {:?}. Supported axes are x, y, and z", name),
            )),
        }
    }
}

#[cfg(feature = "raspberry")]
pub use self::mpu6050::Mpu6050;

#[cfg(feature = "raspberry")]
mod mpu6050 {
    use super::GyroAxis;
    use crate::traits::AngularRateSource;
    use rppal::i2c::I2c;
    use std::io;

    const MPU6050_ADDR: u16 = 0x68;
    const PWR_MGMT_1: u8 = 0x6B;
    const GYRO_XOUT_H: u8 = 0x43;

    /// LSB per degree/second at the +-250 deg/s full-scale default.
    const GYRO_SCALE: f64 = 131.0;

    /// MPU-6050 over I2C bus 1. The chip powers up asleep; waking it is
    /// part of construction.
    pub struct Mpu6050 {
        bus: I2c,
        axis: GyroAxis,
    }

    impl Mpu6050 {
        pub fn new(axis: GyroAxis) -> io::Result<Self> {
            let mut bus = I2c::new().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            bus.set_slave_address(MPU6050_ADDR)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            bus.write(&[PWR_MGMT_1, 0])
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            Ok(Self { bus, axis })
        }
    }

    impl AngularRateSource for Mpu6050 {
        fn read_rate(&mut self) -> io::Result<f64> {
            // Two big-endian bytes per axis, starting at GYRO_XOUT_H.
            let register = match self.axis {
                GyroAxis::X => GYRO_XOUT_H,
                GyroAxis::Y => GYRO_XOUT_H + 2,
                GyroAxis::Z => GYRO_XOUT_H + 4,
            };

            let mut word = [0u8; 2];
            self.bus
                .write_read(&[register], &mut word)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

            let raw = i16::from_be_bytes(word);
            Ok(f64::from(raw) / GYRO_SCALE)
        }

        fn get_name(&self) -> String {
            format!("MPU6050 (gyro {:?})", self.axis)
        }
    }
}

/// Replays a recorded rate trace, one reading per line. Used to exercise
/// the pipeline on machines without the sensor. The trace running out is
/// reported as a read failure, the same as a sensor going away mid-window.
pub struct ReplaySource {
    path: String,
    lines: std::io::Lines<BufReader<File>>,
}

impl ReplaySource {
    pub fn open(path: &str) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_string(),
            lines: BufReader::new(file).lines(),
        })
    }
}

impl AngularRateSource for ReplaySource {
    fn read_rate(&mut self) -> io::Result<f64> {
        match self.lines.next() {
            Some(line) => {
                let line = line?;
                line.trim().parse::<f64>().map_err(|e| {
                    io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("Bad reading in replay trace: {e}"),
                    )
                })
            }
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Replay trace exhausted",
            )),
        }
    }

    fn get_name(&self) -> String {
        format!("Replay ({})", self.path)
    }
}

#[test]
fn replay_source_reads_trace_in_order() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.txt");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "0.5").unwrap();
    writeln!(file, "-1.25").unwrap();

    let mut source = ReplaySource::open(path.to_str().unwrap()).unwrap();
    assert_eq!(source.read_rate().unwrap(), 0.5);
    assert_eq!(source.read_rate().unwrap(), -1.25);
    // Exhaustion is a read failure, not a silent zero.
    assert!(source.read_rate().is_err());
}

#[test]
fn replay_source_rejects_garbage_lines() {
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.txt");
    let mut file = File::create(&path).unwrap();
    writeln!(file, "not a number").unwrap();

    let mut source = ReplaySource::open(path.to_str().unwrap()).unwrap();
    assert!(source.read_rate().is_err());
}
