//! Door state event carried over the telemetry channel.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

/// Discrete inferred state of the door.
///
/// `Unknown` exists only on the consuming side (a dashboard that has not
/// received any event yet). It is never published.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    Open,
    Closed,
    Unknown,
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DoorState::Open => "open",
            DoorState::Closed => "closed",
            DoorState::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One confirmed open/closed transition.
///
/// Wire format: `{"door_state": "open"|"closed", "timestamp": <epoch secs>}`.
/// The channel delivers these at least once; consumers must tolerate
/// duplicates of the exact same event.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StateEvent {
    pub door_state: DoorState,
    pub timestamp: f64,
}

impl StateEvent {
    pub fn new(door_state: DoorState) -> Self {
        Self {
            door_state,
            timestamp: epoch_now(),
        }
    }

    pub fn to_payload(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Parses an inbound payload. Rejects anything that is not a valid
    /// event with a publishable state; callers drop and log rejects.
    pub fn from_payload(payload: &[u8]) -> io::Result<Self> {
        let event: StateEvent = serde_json::from_slice(payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if event.door_state == DoorState::Unknown {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "\"unknown\" is not a publishable door state",
            ));
        }

        Ok(event)
    }
}

pub fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Could not convert time")
        .as_secs_f64()
}
