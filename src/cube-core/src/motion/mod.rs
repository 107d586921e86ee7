// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::position::Position;
use crate::DynResult;

pub mod command;
pub mod error;
pub mod session;

/// Alias to reduce type complexity in MotionController.
pub type ControllerFuture<'a, T> = Pin<Box<dyn Future<Output = DynResult<T>> + Send + 'a>>;

/// Opaque connection to one physical actuator, keyed by its serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceHandle {
    serial: String,
    id: u64,
}

impl DeviceHandle {
    /// Backends pick `id` to tell apart handles they created.
    pub fn new(serial: impl Into<String>, id: u64) -> Self {
        Self {
            serial: serial.into(),
            id,
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.serial, self.id)
    }
}

/// Which settings source the controller should use when loading the motor
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigLoadOption {
    /// Settings from the vendor's stage configuration files.
    #[serde(rename = "file", alias = "use_file_settings")]
    UseFileSettings,
    /// Settings already stored on the device.
    #[serde(rename = "device", alias = "use_device_settings")]
    UseDeviceSettings,
    /// Whatever the controller does when called without an option.
    Default,
}

impl ConfigLoadOption {
    pub fn name(&self) -> &'static str {
        match self {
            Self::UseFileSettings => "file",
            Self::UseDeviceSettings => "device",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ConfigLoadOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities consumed from the vendor motion-control library.
///
/// Every call may block for as long as the vendor layer decides; the ones
/// that take a timeout pass it straight through. Implementations must be
/// usable from several tasks at once because homing runs detached from the
/// foreground observation loop.
pub trait MotionController: Send + Sync {
    /// Serials currently reachable. An empty list does not mean absence.
    fn list_devices(&self) -> ControllerFuture<'_, Vec<String>>;

    fn create<'a>(&'a self, serial: &'a str) -> ControllerFuture<'a, DeviceHandle>;

    fn connect<'a>(&'a self, handle: &'a DeviceHandle, serial: &'a str)
        -> ControllerFuture<'a, ()>;

    fn wait_settings_ready<'a>(
        &'a self,
        handle: &'a DeviceHandle,
        timeout: Duration,
    ) -> ControllerFuture<'a, ()>;

    fn load_config<'a>(
        &'a self,
        handle: &'a DeviceHandle,
        serial: &'a str,
        option: ConfigLoadOption,
    ) -> ControllerFuture<'a, ()>;

    fn start_polling<'a>(
        &'a self,
        handle: &'a DeviceHandle,
        interval: Duration,
    ) -> ControllerFuture<'a, ()>;

    fn stop_polling<'a>(&'a self, handle: &'a DeviceHandle) -> ControllerFuture<'a, ()>;

    fn enable<'a>(&'a self, handle: &'a DeviceHandle) -> ControllerFuture<'a, ()>;

    /// Report whether the drive is energized. Not every firmware exposes it.
    fn is_enabled<'a>(&'a self, _handle: &'a DeviceHandle) -> ControllerFuture<'a, bool> {
        Box::pin(std::future::ready(Err(Box::new(
            error::ControllerError::NotSupported("is_enabled"),
        )
            as Box<dyn std::error::Error + Send + Sync>)))
    }

    fn home<'a>(&'a self, handle: &'a DeviceHandle, timeout: Duration)
        -> ControllerFuture<'a, ()>;

    fn move_to<'a>(
        &'a self,
        handle: &'a DeviceHandle,
        position: Position,
        timeout: Duration,
    ) -> ControllerFuture<'a, ()>;

    fn read_position<'a>(&'a self, handle: &'a DeviceHandle) -> ControllerFuture<'a, Position>;

    /// Read one named homed-state indicator. Fails when this controller
    /// variant has no indicator by that name.
    fn read_homed_indicator<'a>(
        &'a self,
        handle: &'a DeviceHandle,
        name: &'a str,
    ) -> ControllerFuture<'a, bool>;

    fn shutdown<'a>(&'a self, handle: &'a DeviceHandle) -> ControllerFuture<'a, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_option_names() {
        let parsed: Vec<ConfigLoadOption> =
            serde_json::from_str(r#"["file", "use_device_settings", "default"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                ConfigLoadOption::UseFileSettings,
                ConfigLoadOption::UseDeviceSettings,
                ConfigLoadOption::Default
            ]
        );
        assert_eq!(
            serde_json::to_string(&ConfigLoadOption::UseDeviceSettings).unwrap(),
            "\"device\""
        );
        assert!(serde_json::from_str::<ConfigLoadOption>("\"flash\"").is_err());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(DeviceHandle::new("27501283", 7).to_string(), "27501283#7");
    }
}
