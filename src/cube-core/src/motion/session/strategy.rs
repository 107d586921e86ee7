// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Motor configuration loading.
//!
//! Controllers differ in which configuration call they accept, so loading
//! is an ordered list of opaque strategies where the first success wins.
//! Running out of strategies is a warning, not a failure: some firmware
//! and stage combinations move fine without an explicit load.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::motion::{ConfigLoadOption, ControllerFuture, DeviceHandle, MotionController};

/// One way of loading the motor configuration.
pub trait LoadStrategy: Send + Sync {
    /// Name used in logs and in the load result.
    fn name(&self) -> &str;

    fn load<'a>(
        &'a self,
        controller: &'a dyn MotionController,
        handle: &'a DeviceHandle,
        serial: &'a str,
    ) -> ControllerFuture<'a, ()>;
}

impl LoadStrategy for ConfigLoadOption {
    fn name(&self) -> &str {
        ConfigLoadOption::name(self)
    }

    fn load<'a>(
        &'a self,
        controller: &'a dyn MotionController,
        handle: &'a DeviceHandle,
        serial: &'a str,
    ) -> ControllerFuture<'a, ()> {
        controller.load_config(handle, serial, *self)
    }
}

/// Strategies tried when nothing else is configured: vendor file settings
/// first, then the controller's own default.
pub fn default_strategies() -> Vec<Box<dyn LoadStrategy>> {
    vec![
        Box::new(ConfigLoadOption::UseFileSettings),
        Box::new(ConfigLoadOption::Default),
    ]
}

/// Why one strategy did not work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

/// Outcome of configuration loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub succeeded: bool,
    pub strategy_used: Option<String>,
    /// Failures of the strategies tried before the winner, or of all of them.
    pub failures: Vec<StrategyFailure>,
}

impl LoadResult {
    /// The warning to report when no strategy succeeded.
    pub fn warning(&self) -> Option<ConfigLoadWarning> {
        if self.succeeded {
            None
        } else {
            Some(ConfigLoadWarning {
                failures: self.failures.clone(),
            })
        }
    }
}

/// All strategies were exhausted; the session continues without an
/// explicitly loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigLoadWarning {
    pub failures: Vec<StrategyFailure>,
}

impl fmt::Display for ConfigLoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "no configuration strategy available");
        }
        write!(f, "all configuration strategies failed")?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.strategy, failure.reason)?;
        }
        Ok(())
    }
}

/// Try each strategy in order and stop at the first one that succeeds.
pub async fn first_success(
    strategies: &[Box<dyn LoadStrategy>],
    controller: &dyn MotionController,
    handle: &DeviceHandle,
    serial: &str,
) -> LoadResult {
    let mut result = LoadResult::default();

    for strategy in strategies {
        debug!("Loading motor configuration via '{}'", strategy.name());
        match strategy.load(controller, handle, serial).await {
            Ok(()) => {
                info!("Motor configuration loaded via '{}'", strategy.name());
                result.succeeded = true;
                result.strategy_used = Some(strategy.name().to_string());
                return result;
            }
            Err(e) => {
                warn!("Configuration strategy '{}' failed: {}", strategy.name(), e);
                result.failures.push(StrategyFailure {
                    strategy: strategy.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_only_when_failed() {
        let ok = LoadResult {
            succeeded: true,
            strategy_used: Some("file".to_string()),
            failures: vec![],
        };
        assert!(ok.warning().is_none());

        let failed = LoadResult {
            succeeded: false,
            strategy_used: None,
            failures: vec![
                StrategyFailure {
                    strategy: "file".to_string(),
                    reason: "no stage file".to_string(),
                },
                StrategyFailure {
                    strategy: "default".to_string(),
                    reason: "rejected".to_string(),
                },
            ],
        };
        let warning = failed.warning().unwrap();
        assert_eq!(
            warning.to_string(),
            "all configuration strategies failed; file: no stage file; default: rejected"
        );
    }

    #[test]
    fn test_empty_strategy_list_warning() {
        let warning = LoadResult::default().warning().unwrap();
        assert_eq!(warning.to_string(), "no configuration strategy available");
    }

    #[test]
    fn test_default_strategy_order() {
        let names: Vec<String> = default_strategies()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, vec!["file", "default"]);
    }
}
