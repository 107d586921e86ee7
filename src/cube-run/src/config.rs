// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for cube-run.
//!
//! Config is loaded from the `[cube-run]` section of `cube-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./cube-rs.toml`
//! 3. `~/.config/cube-rs/cube-rs.toml`
//! 4. `/etc/cube-rs/cube-rs.toml`

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cube_app::ConfigFile;
use cube_core::motion::session::{
    HomedProbe, LoadStrategy, MotionErrorPolicy, PollingBound, SessionTimings,
    DEFAULT_HOMED_INDICATORS,
};
use cube_core::{ConfigLoadOption, MotionCommand, Position};

/// Serial of the cube on the bench this tool was written for.
pub const DEFAULT_SERIAL: &str = "27501283";
pub const DEFAULT_BACKEND: &str = "sim";

/// Default vendor library installation directory.
pub fn default_library_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\Program Files\Thorlabs\Kinesis")
    } else {
        PathBuf::from("/opt/thorlabs/kinesis")
    }
}

/// Top-level cube-run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub general: GeneralConfig,
    pub device: DeviceConfig,
    pub timing: TimingConfig,
    pub motion: MotionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Which cube to drive and through which backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub serial: String,
    /// Registered backend name, e.g. "sim" or a plugin-provided one
    pub backend: String,
    /// Vendor library installation directory, also scanned for plugins
    pub library_path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: DEFAULT_SERIAL.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            library_path: default_library_path(),
        }
    }
}

/// Session timings in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub settings_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub enable_settle_ms: u64,
    pub reenable_settle_ms: u64,
    pub home_timeout_ms: u64,
    /// How long to wait for the blocking home call before observing instead
    pub home_join_wait_ms: u64,
    pub home_poll_interval_ms: u64,
    /// Overall homing bound, measured from the home dispatch
    pub home_bound_ms: u64,
    pub post_home_settle_ms: u64,
    pub move_timeout_ms: u64,
    pub move_settle_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settings_timeout_ms: 5000,
            poll_interval_ms: 250,
            enable_settle_ms: 500,
            reenable_settle_ms: 500,
            home_timeout_ms: 60_000,
            home_join_wait_ms: 10_000,
            home_poll_interval_ms: 500,
            home_bound_ms: 60_000,
            post_home_settle_ms: 200,
            move_timeout_ms: 60_000,
            move_settle_ms: 500,
        }
    }
}

impl TimingConfig {
    pub fn to_timings(&self) -> SessionTimings {
        let ms = Duration::from_millis;
        SessionTimings {
            settings_timeout: ms(self.settings_timeout_ms),
            poll_interval: ms(self.poll_interval_ms),
            enable_settle: ms(self.enable_settle_ms),
            reenable_settle: ms(self.reenable_settle_ms),
            home_timeout: ms(self.home_timeout_ms),
            home_join_wait: ms(self.home_join_wait_ms),
            homing: PollingBound::homing(ms(self.home_poll_interval_ms), ms(self.home_bound_ms)),
            post_home_settle: ms(self.post_home_settle_ms),
            move_timeout: ms(self.move_timeout_ms),
            move_settle: ms(self.move_settle_ms),
        }
    }
}

/// One entry of `[[cube-run.motion.sequence]]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MotionStep {
    Home,
    Absolute { position: Position },
    Relative { delta: Position },
}

impl From<&MotionStep> for MotionCommand {
    fn from(step: &MotionStep) -> Self {
        match step {
            MotionStep::Home => MotionCommand::Home,
            MotionStep::Absolute { position } => MotionCommand::MoveAbsolute(*position),
            MotionStep::Relative { delta } => MotionCommand::MoveRelative(*delta),
        }
    }
}

/// What happens after bring-up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Stop the sequence at the first failed command
    pub abort_on_error: bool,
    /// Config-load options tried in order: "file", "device", "default"
    pub config_strategies: Vec<ConfigLoadOption>,
    /// Controller properties that report the homed state
    pub homed_indicators: Vec<String>,
    /// Commands run after the bring-up homing
    pub sequence: Vec<MotionStep>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            abort_on_error: false,
            config_strategies: vec![ConfigLoadOption::UseFileSettings, ConfigLoadOption::Default],
            homed_indicators: DEFAULT_HOMED_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            sequence: vec![
                MotionStep::Absolute {
                    position: Position::from_mm(2),
                },
                MotionStep::Absolute {
                    position: Position::from_mm(1),
                },
                MotionStep::Absolute {
                    position: Position::ZERO,
                },
            ],
        }
    }
}

impl MotionConfig {
    pub fn commands(&self) -> Vec<MotionCommand> {
        self.sequence.iter().map(MotionCommand::from).collect()
    }

    pub fn strategies(&self) -> Vec<Box<dyn LoadStrategy>> {
        self.config_strategies
            .iter()
            .map(|option| Box::new(*option) as Box<dyn LoadStrategy>)
            .collect()
    }

    pub fn probe(&self) -> HomedProbe {
        HomedProbe::new(self.homed_indicators.iter().cloned())
    }

    pub fn error_policy(&self) -> MotionErrorPolicy {
        MotionErrorPolicy::from_abort_flag(self.abort_on_error)
    }
}

impl RunConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.device.serial.trim().is_empty() {
            return Err("[device].serial must not be empty".to_string());
        }
        if self.device.backend.trim().is_empty() {
            return Err("[device].backend must not be empty".to_string());
        }

        let timing = &self.timing;
        for (name, value) in [
            ("settings_timeout_ms", timing.settings_timeout_ms),
            ("poll_interval_ms", timing.poll_interval_ms),
            ("home_timeout_ms", timing.home_timeout_ms),
            ("home_poll_interval_ms", timing.home_poll_interval_ms),
            ("home_bound_ms", timing.home_bound_ms),
            ("move_timeout_ms", timing.move_timeout_ms),
        ] {
            if value == 0 {
                return Err(format!("[timing].{} must be > 0", name));
            }
        }

        if self
            .motion
            .homed_indicators
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err("[motion].homed_indicators must not contain empty names".to_string());
        }
        if self.motion.homed_indicators.is_empty() {
            return Err("[motion].homed_indicators must list at least one indicator".to_string());
        }

        Ok(())
    }

    /// Example configuration under the `[cube-run]` section header.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            #[serde(rename = "cube-run")]
            inner: RunConfig,
        }
        let example = RunConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            ..RunConfig::default()
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    match level {
        None | Some("trace" | "debug" | "info" | "warn" | "error") => Ok(()),
        Some(other) => Err(format!(
            "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
            other
        )),
    }
}

impl ConfigFile for RunConfig {
    fn section_key() -> &'static str {
        "cube-run"
    }
}
