// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Homed-state probing.
//!
//! Controller variants expose the homed flag under different names. The
//! probe asks each known name in order and accepts the first affirmative
//! answer; names a controller does not know are skipped.

use tokio::time::{self, Instant};
use tracing::debug;

use crate::motion::{DeviceHandle, MotionController};

use super::policies::PollingBound;

/// Indicator names probed when none are configured.
pub const DEFAULT_HOMED_INDICATORS: &[&str] = &["IsHomed", "IsDeviceHomed", "IsHomedState"];

/// Ordered set of equivalent homed-state indicators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HomedProbe {
    indicators: Vec<String>,
}

impl Default for HomedProbe {
    fn default() -> Self {
        Self::new(DEFAULT_HOMED_INDICATORS.iter().map(|s| s.to_string()))
    }
}

impl HomedProbe {
    pub fn new<I, S>(indicators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            indicators: indicators.into_iter().map(Into::into).collect(),
        }
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    /// Ask every indicator once. Returns the name of the first one that
    /// reports homed.
    pub async fn probe(
        &self,
        controller: &dyn MotionController,
        handle: &DeviceHandle,
    ) -> Option<String> {
        for name in &self.indicators {
            match controller.read_homed_indicator(handle, name).await {
                Ok(true) => {
                    debug!("probe {} = true", name);
                    return Some(name.clone());
                }
                Ok(false) => debug!("probe {} = false", name),
                Err(e) => debug!("probe {} unavailable: {}", name, e),
            }
        }
        None
    }

    /// Probe every `bound.interval()` until an indicator reports homed or
    /// `bound.bound()` has elapsed since `started`.
    pub async fn wait_homed(
        &self,
        controller: &dyn MotionController,
        handle: &DeviceHandle,
        bound: PollingBound,
        started: Instant,
    ) -> Option<String> {
        let deadline = started + bound.bound();
        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            time::sleep(bound.interval().min(remaining)).await;
            if let Some(name) = self.probe(controller, handle).await {
                return Some(name);
            }
        }
        None
    }
}
