//! Transition debouncing.
//!
//! Classifications arrive every cycle; most repeat the state already
//! reported or say "idle". An event leaves this state machine only on a
//! genuine flip between the two confirmed states. Idle is a pseudo-input:
//! it never transitions and never becomes the comparison baseline, so a
//! burst of idle windows between two door motions cannot reset debounce
//! memory.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::classifier::Label;
use ajar_telemetry_lib::message::{DoorState, StateEvent};

pub struct TransitionDebouncer {
    /// Last confirmed non-idle classification. `None` until the first
    /// confirmed window ("unknown"), so the first open/closed emits.
    confirmed: Option<Label>,
}

impl TransitionDebouncer {
    pub fn new() -> Self {
        Self { confirmed: None }
    }

    /// Applies one classification; returns the event to publish, if any.
    pub fn observe(&mut self, label: Label, timestamp: f64) -> Option<StateEvent> {
        let door_state = match label {
            Label::Idle => return None,
            Label::Open => DoorState::Open,
            Label::Closed => DoorState::Closed,
        };

        if self.confirmed == Some(label) {
            return None;
        }

        self.confirmed = Some(label);
        Some(StateEvent {
            door_state,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(sequence: &[Label]) -> Vec<DoorState> {
        let mut debouncer = TransitionDebouncer::new();
        sequence
            .iter()
            .enumerate()
            .filter_map(|(i, label)| debouncer.observe(*label, i as f64))
            .map(|event| event.door_state)
            .collect()
    }

    #[test]
    fn events_only_on_genuine_flips() {
        // closed, idle, idle, open, open, closed: the initial closed is
        // distinct from "unknown" and emits; then exactly two flips.
        let emitted = states(&[
            Label::Closed,
            Label::Idle,
            Label::Idle,
            Label::Open,
            Label::Open,
            Label::Closed,
        ]);
        assert_eq!(
            emitted,
            vec![DoorState::Closed, DoorState::Open, DoorState::Closed]
        );
    }

    #[test]
    fn idle_never_updates_the_baseline() {
        // The idle burst in the middle must not make the second "closed"
        // look like a fresh transition.
        let emitted = states(&[Label::Closed, Label::Idle, Label::Idle, Label::Closed]);
        assert_eq!(emitted, vec![DoorState::Closed]);
    }

    #[test]
    fn idle_is_never_emitted() {
        let emitted = states(&[Label::Idle, Label::Idle, Label::Idle]);
        assert!(emitted.is_empty());
    }

    #[test]
    fn repeats_of_a_confirmed_state_are_silent() {
        let emitted = states(&[Label::Open, Label::Open, Label::Open, Label::Closed]);
        assert_eq!(emitted, vec![DoorState::Open, DoorState::Closed]);
    }

    #[test]
    fn event_carries_the_observation_timestamp() {
        let mut debouncer = TransitionDebouncer::new();
        let event = debouncer.observe(Label::Open, 1754400000.5).unwrap();
        assert_eq!(event.timestamp, 1754400000.5);
        assert_eq!(event.door_state, DoorState::Open);
    }
}
