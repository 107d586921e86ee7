// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Session state machine for device lifecycle management.
//!
//! States only ever advance along the bring-up chain, then fall back to
//! `Disconnected` through `ShuttingDown`. Invalid events leave the state
//! untouched.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Events that can trigger state transitions in the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Device object created for a serial
    Opened,
    /// Connected and the controller reports settings initialized
    SettingsReady,
    /// Configuration loading finished (successfully or not)
    ConfigApplied,
    /// Polling started and drive energized
    DriveEnabled,
    /// First homing attempt finished or its bound expired
    HomingFinished,
    /// Post-home settle elapsed; moves are allowed
    Armed,
    /// Teardown started
    CloseRequested,
    /// Teardown finished
    Closed,
}

/// The current state of one device session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    SettingsPending,
    ConfigLoaded,
    Enabled,
    Homed,
    Ready,
    ShuttingDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::SettingsPending => "SettingsPending",
            Self::ConfigLoaded => "ConfigLoaded",
            Self::Enabled => "Enabled",
            Self::Homed => "Homed",
            Self::Ready => "Ready",
            Self::ShuttingDown => "ShuttingDown",
        };
        f.write_str(name)
    }
}

impl SessionState {
    /// Absolute and relative moves need a ready session.
    pub fn can_move(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Homing needs an energized drive.
    pub fn can_home(&self) -> bool {
        matches!(self, Self::Enabled | Self::Homed | Self::Ready)
    }

    /// A device handle exists and has not been torn down.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::ShuttingDown)
    }
}

/// The session state machine that manages state transitions.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    transition_count: u64,
    last_transition: Option<Instant>,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            transition_count: 0,
            last_transition: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Process an event and potentially transition to a new state.
    /// Returns true if a transition occurred.
    pub fn process_event(&mut self, event: SessionEvent) -> bool {
        match self.next_state(event) {
            Some(state) => {
                self.state = state;
                self.transition_count += 1;
                self.last_transition = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    fn next_state(&self, event: SessionEvent) -> Option<SessionState> {
        use SessionEvent as E;
        use SessionState as S;

        match (self.state, event) {
            (S::Disconnected, E::Opened) => Some(S::Connecting),
            (S::Connecting, E::SettingsReady) => Some(S::SettingsPending),
            (S::SettingsPending, E::ConfigApplied) => Some(S::ConfigLoaded),
            (S::ConfigLoaded, E::DriveEnabled) => Some(S::Enabled),
            (S::Enabled, E::HomingFinished) => Some(S::Homed),
            (S::Homed, E::Armed) => Some(S::Ready),

            (state, E::CloseRequested) if state.is_open() => Some(S::ShuttingDown),
            (S::ShuttingDown, E::Closed) => Some(S::Disconnected),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bring_up(sm: &mut SessionMachine) {
        for event in [
            SessionEvent::Opened,
            SessionEvent::SettingsReady,
            SessionEvent::ConfigApplied,
            SessionEvent::DriveEnabled,
            SessionEvent::HomingFinished,
            SessionEvent::Armed,
        ] {
            assert!(sm.process_event(event), "{:?} from {}", event, sm.state());
        }
    }

    #[test]
    fn test_initial_state() {
        let sm = SessionMachine::new();
        assert_eq!(sm.state(), SessionState::Disconnected);
        assert_eq!(sm.transition_count(), 0);
        assert!(sm.time_in_state().is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut sm = SessionMachine::new();
        bring_up(&mut sm);
        assert_eq!(sm.state(), SessionState::Ready);
        assert!(sm.state().can_move());

        assert!(sm.process_event(SessionEvent::CloseRequested));
        assert_eq!(sm.state(), SessionState::ShuttingDown);
        assert!(sm.process_event(SessionEvent::Closed));
        assert_eq!(sm.state(), SessionState::Disconnected);
        assert_eq!(sm.transition_count(), 8);
    }

    #[test]
    fn test_close_from_any_open_state() {
        let mut sm = SessionMachine::new();
        sm.process_event(SessionEvent::Opened);
        sm.process_event(SessionEvent::SettingsReady);
        assert!(sm.process_event(SessionEvent::CloseRequested));
        assert_eq!(sm.state(), SessionState::ShuttingDown);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = SessionMachine::new();
        assert!(!sm.process_event(SessionEvent::DriveEnabled));
        assert!(!sm.process_event(SessionEvent::CloseRequested));
        assert_eq!(sm.state(), SessionState::Disconnected);

        sm.process_event(SessionEvent::Opened);
        assert!(!sm.process_event(SessionEvent::Armed));
        assert_eq!(sm.state(), SessionState::Connecting);
    }

    #[test]
    fn test_ordering_gates() {
        assert!(SessionState::Enabled.can_home());
        assert!(!SessionState::Enabled.can_move());
        assert!(!SessionState::ConfigLoaded.can_home());
        assert!(SessionState::Ready > SessionState::Homed);
        assert!(!SessionState::ShuttingDown.can_home());
    }
}
