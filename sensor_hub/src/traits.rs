//! Ajar sensor traits.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use std::io;

/// Abstract angular-rate source: one scalar rotational-velocity reading
/// (degrees/second, signed) per call, on demand. The detection pipeline
/// consumes a single axis; which physical axis that is belongs to the
/// implementation.
pub trait AngularRateSource {
    fn read_rate(&mut self) -> io::Result<f64>;
    fn get_name(&self) -> String;
}
