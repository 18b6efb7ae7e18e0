//! In-memory replica of the door's current state.
//!
//! One inbound worker mutates this under a lock while any number of
//! viewer sessions read snapshots of it. The event log records
//! deliveries, not distinct transitions: the channel may deliver the same
//! event twice, and a duplicate delivery overwrites the state fields
//! idempotently but appends a second, identical log line.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use ajar_telemetry_lib::message::{DoorState, StateEvent};
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::collections::VecDeque;

/// Most recent confirmed events kept for new viewers, oldest evicted first.
pub const EVENT_LOG_CAPACITY: usize = 5;

pub struct ReplicaState {
    current: DoorState,
    last_timestamp: Option<String>,
    log: VecDeque<String>,
}

/// What one viewer sees: current state, its timestamp, and the recent
/// event log (newest appended last). Sessions compare snapshots to decide
/// whether anything is worth sending.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub state: DoorState,
    pub timestamp: Option<String>,
    pub log: Vec<String>,
}

impl ReplicaState {
    pub fn new() -> Self {
        Self {
            current: DoorState::Unknown,
            last_timestamp: None,
            log: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Applies one delivered event.
    pub fn apply(&mut self, event: &StateEvent) {
        let timestamp = format_timestamp(event.timestamp);

        self.current = event.door_state;
        self.last_timestamp = Some(timestamp.clone());

        if self.log.len() == EVENT_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(format!("{}: Door {}", timestamp, event.door_state));
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.current,
            timestamp: self.last_timestamp.clone(),
            log: self.log.iter().cloned().collect(),
        }
    }
}

fn format_timestamp(epoch_secs: f64) -> String {
    match Local.timestamp_opt(epoch_secs as i64, 0).single() {
        Some(when) => when.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{}", epoch_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(door_state: DoorState, timestamp: f64) -> StateEvent {
        StateEvent {
            door_state,
            timestamp,
        }
    }

    #[test]
    fn starts_unknown_with_an_empty_log() {
        let snapshot = ReplicaState::new().snapshot();
        assert_eq!(snapshot.state, DoorState::Unknown);
        assert_eq!(snapshot.timestamp, None);
        assert!(snapshot.log.is_empty());
    }

    #[test]
    fn apply_sets_state_and_appends_to_the_log() {
        let mut replica = ReplicaState::new();
        replica.apply(&event(DoorState::Open, 1754400000.0));

        let snapshot = replica.snapshot();
        assert_eq!(snapshot.state, DoorState::Open);
        assert!(snapshot.timestamp.is_some());
        assert_eq!(snapshot.log.len(), 1);
        assert!(snapshot.log[0].ends_with(": Door open"));
    }

    #[test]
    fn log_keeps_only_the_last_five_in_arrival_order() {
        let mut replica = ReplicaState::new();
        for i in 0..6 {
            let state = if i % 2 == 0 {
                DoorState::Open
            } else {
                DoorState::Closed
            };
            replica.apply(&event(state, 1754400000.0 + i as f64));
        }

        let snapshot = replica.snapshot();
        assert_eq!(snapshot.log.len(), EVENT_LOG_CAPACITY);
        // The first event was evicted; entries 2..6 remain in order.
        assert!(snapshot.log[0].ends_with(": Door closed"));
        assert!(snapshot.log[4].ends_with(": Door closed"));
        assert_eq!(snapshot.state, DoorState::Closed);
    }

    #[test]
    fn duplicate_delivery_overwrites_state_but_duplicates_the_log_line() {
        let mut replica = ReplicaState::new();
        let delivered = event(DoorState::Open, 1754400000.0);

        replica.apply(&delivered);
        let first = replica.snapshot();
        replica.apply(&delivered);
        let second = replica.snapshot();

        // State and timestamp are idempotent under redelivery.
        assert_eq!(second.state, first.state);
        assert_eq!(second.timestamp, first.timestamp);
        // The log is not deduplicated: two deliveries, two lines.
        assert_eq!(second.log.len(), 2);
        assert_eq!(second.log[0], second.log[1]);
    }

    #[test]
    fn identical_snapshots_compare_equal() {
        let mut replica = ReplicaState::new();
        replica.apply(&event(DoorState::Closed, 1754400000.0));

        // Sessions rely on snapshot equality to suppress no-op sends.
        assert_eq!(replica.snapshot(), replica.snapshot());
    }
}
