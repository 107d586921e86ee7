// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Session timing and error policies.
//!
//! This module holds the delays and bounds the session applies around
//! vendor calls, and the policy for motion failures inside a sequence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Limits for the homed-indicator observation loop.
pub const MIN_HOMING_POLL_INTERVAL: Duration = Duration::from_millis(10);
pub const MAX_HOMING_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const MAX_HOMING_BOUND: Duration = Duration::from_secs(60);

/// Delays and bounds applied by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTimings {
    /// Passed through to the settings-initialized wait.
    pub settings_timeout: Duration,
    /// Background status polling interval.
    pub poll_interval: Duration,
    /// Wait after the first enable before any further command.
    pub enable_settle: Duration,
    /// Wait after re-enabling a drive found disabled before a move.
    pub reenable_settle: Duration,
    /// Passed through to the blocking home call.
    pub home_timeout: Duration,
    /// How long the foreground waits for the home call to return.
    pub home_join_wait: Duration,
    /// Observation loop for homed indicators.
    pub homing: PollingBound,
    /// Wait after homing before the session becomes ready.
    pub post_home_settle: Duration,
    /// Passed through to each absolute move.
    pub move_timeout: Duration,
    /// Wait after each completed move.
    pub move_settle: Duration,
}

impl SessionTimings {
    /// Defaults matching the servo cube's observed behaviour.
    pub fn default_cube() -> Self {
        Self {
            settings_timeout: Duration::from_millis(5000),
            poll_interval: Duration::from_millis(250),
            enable_settle: Duration::from_millis(500),
            reenable_settle: Duration::from_millis(500),
            home_timeout: Duration::from_secs(60),
            home_join_wait: Duration::from_secs(10),
            homing: PollingBound::default_homing(),
            post_home_settle: Duration::from_millis(200),
            move_timeout: Duration::from_secs(60),
            move_settle: Duration::from_millis(500),
        }
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self::default_cube()
    }
}

/// A wall-clock bounded observation loop: sleep `interval`, re-check,
/// give up once `bound` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingBound {
    interval: Duration,
    bound: Duration,
}

impl PollingBound {
    /// Intervals longer than the bound are clamped to it.
    pub fn new(interval: Duration, bound: Duration) -> Self {
        Self {
            interval: interval.min(bound),
            bound,
        }
    }

    /// Homing observation loop, clamped to the cube's limits.
    pub fn homing(interval: Duration, bound: Duration) -> Self {
        Self::new(
            interval.clamp(MIN_HOMING_POLL_INTERVAL, MAX_HOMING_POLL_INTERVAL),
            bound.min(MAX_HOMING_BOUND),
        )
    }

    pub fn default_homing() -> Self {
        Self::homing(MAX_HOMING_POLL_INTERVAL, MAX_HOMING_BOUND)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn bound(&self) -> Duration {
        self.bound
    }
}

/// What a sequence does after one motion command fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionErrorPolicy {
    /// Report the failure and carry on with the next command.
    #[default]
    Continue,
    /// Stop the sequence at the first failure.
    Abort,
}

impl MotionErrorPolicy {
    pub fn from_abort_flag(abort_on_error: bool) -> Self {
        if abort_on_error {
            Self::Abort
        } else {
            Self::Continue
        }
    }

    pub fn aborts(&self) -> bool {
        matches!(self, Self::Abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings() {
        let t = SessionTimings::default();
        assert_eq!(t.settings_timeout, Duration::from_secs(5));
        assert_eq!(t.poll_interval, Duration::from_millis(250));
        assert_eq!(t.home_join_wait, Duration::from_secs(10));
        assert_eq!(t.homing.interval(), Duration::from_millis(500));
        assert_eq!(t.homing.bound(), Duration::from_secs(60));
    }

    #[test]
    fn test_polling_bound_clamps_interval() {
        let b = PollingBound::new(Duration::from_secs(5), Duration::from_secs(2));
        assert_eq!(b.interval(), Duration::from_secs(2));
        assert_eq!(b.bound(), Duration::from_secs(2));
    }

    #[test]
    fn test_homing_bound_limits() {
        let b = PollingBound::homing(Duration::from_secs(2), Duration::from_secs(600));
        assert_eq!(b.interval(), MAX_HOMING_POLL_INTERVAL);
        assert_eq!(b.bound(), MAX_HOMING_BOUND);

        let b = PollingBound::homing(Duration::from_millis(100), Duration::from_secs(5));
        assert_eq!(b.interval(), Duration::from_millis(100));
        assert_eq!(b.bound(), Duration::from_secs(5));

        let b = PollingBound::homing(Duration::ZERO, Duration::from_secs(5));
        assert_eq!(b.interval(), MIN_HOMING_POLL_INTERVAL);
    }

    #[test]
    fn test_error_policy_flag() {
        assert!(MotionErrorPolicy::from_abort_flag(true).aborts());
        assert!(!MotionErrorPolicy::from_abort_flag(false).aborts());
        assert_eq!(MotionErrorPolicy::default(), MotionErrorPolicy::Continue);
    }
}
