// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Simulated servo cube for development and testing.
//!
//! Holds actuator state in memory and travels at a fixed speed.
//! No hardware or vendor library required.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::time;
use tracing::debug;

use cube_core::motion::ControllerFuture;
use cube_core::{
    ConfigLoadOption, ControllerError, DeviceHandle, DynResult, MotionController, Position,
};

/// Time the simulated firmware needs before settings are initialized.
const SETTINGS_DELAY: Duration = Duration::from_millis(150);
/// Distance from the home switch the stage starts at, in mm.
const START_OFFSET_MM: i64 = 3;

/// Travel speed of the simulated stage in mm/s.
fn travel_speed() -> Decimal {
    Decimal::new(24, 1)
}

fn device_error(message: impl Into<String>) -> Box<dyn Error + Send + Sync> {
    Box::new(ControllerError::Device(message.into()))
}

fn travel_time(from: Position, to: Position) -> Duration {
    let secs = to
        .as_decimal()
        .checked_sub(from.as_decimal())
        .and_then(|distance| distance.abs().checked_div(travel_speed()))
        .and_then(|secs| secs.to_f64())
        .unwrap_or(f64::MAX);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[derive(Debug)]
struct SimState {
    connected: bool,
    settings_ready: bool,
    config: Option<ConfigLoadOption>,
    polling: Option<Duration>,
    enabled: bool,
    homed: bool,
    position: Position,
}

pub struct SimCube {
    devices: Vec<String>,
    next_id: AtomicU64,
    state: Mutex<SimState>,
}

impl SimCube {
    pub fn new(devices: Vec<String>) -> Self {
        Self {
            devices,
            next_id: AtomicU64::new(1),
            state: Mutex::new(SimState {
                connected: false,
                settings_ready: false,
                config: None,
                polling: None,
                enabled: false,
                homed: false,
                position: Position::from_mm(START_OFFSET_MM),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require<F>(&self, what: &str, check: F) -> DynResult<()>
    where
        F: FnOnce(&SimState) -> bool,
    {
        if check(&self.lock()) {
            Ok(())
        } else {
            Err(device_error(format!("simulated cube: {}", what)))
        }
    }

    async fn settle_settings(&self, timeout: Duration) -> DynResult<()> {
        self.require("not connected", |s| s.connected)?;
        if SETTINGS_DELAY > timeout {
            time::sleep(timeout).await;
            return Err(device_error(format!(
                "settings not initialized within {:?}",
                timeout
            )));
        }
        time::sleep(SETTINGS_DELAY).await;
        self.lock().settings_ready = true;
        Ok(())
    }

    async fn travel(&self, target: Position, timeout: Duration) -> DynResult<()> {
        self.require("drive not enabled", |s| s.enabled)?;
        let travel = travel_time(self.lock().position, target);
        if travel > timeout {
            time::sleep(timeout).await;
            return Err(device_error(format!("move to {} timed out", target)));
        }
        time::sleep(travel).await;
        self.lock().position = target;
        Ok(())
    }

    async fn seek_home(&self, timeout: Duration) -> DynResult<()> {
        self.travel(Position::ZERO, timeout).await?;
        self.lock().homed = true;
        Ok(())
    }
}

impl MotionController for SimCube {
    fn list_devices(&self) -> ControllerFuture<'_, Vec<String>> {
        let devices = self.devices.clone();
        Box::pin(async move { Ok(devices) })
    }

    fn create<'a>(&'a self, serial: &'a str) -> ControllerFuture<'a, DeviceHandle> {
        let result = if self.devices.iter().any(|d| d == serial) {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            Ok(DeviceHandle::new(serial, id))
        } else {
            Err(device_error(format!("no simulated cube with serial {}", serial)))
        };
        Box::pin(async move { result })
    }

    fn connect<'a>(&'a self, _handle: &'a DeviceHandle, serial: &'a str) -> ControllerFuture<'a, ()> {
        debug!("sim: connect {}", serial);
        self.lock().connected = true;
        Box::pin(async { Ok(()) })
    }

    fn wait_settings_ready<'a>(
        &'a self,
        _handle: &'a DeviceHandle,
        timeout: Duration,
    ) -> ControllerFuture<'a, ()> {
        Box::pin(self.settle_settings(timeout))
    }

    fn load_config<'a>(
        &'a self,
        _handle: &'a DeviceHandle,
        _serial: &'a str,
        option: ConfigLoadOption,
    ) -> ControllerFuture<'a, ()> {
        let result = self.require("settings not initialized", |s| s.settings_ready);
        if result.is_ok() {
            self.lock().config = Some(option);
        }
        Box::pin(async move { result })
    }

    fn start_polling<'a>(
        &'a self,
        _handle: &'a DeviceHandle,
        interval: Duration,
    ) -> ControllerFuture<'a, ()> {
        self.lock().polling = Some(interval);
        Box::pin(async { Ok(()) })
    }

    fn stop_polling<'a>(&'a self, _handle: &'a DeviceHandle) -> ControllerFuture<'a, ()> {
        self.lock().polling = None;
        Box::pin(async { Ok(()) })
    }

    fn enable<'a>(&'a self, _handle: &'a DeviceHandle) -> ControllerFuture<'a, ()> {
        let result = self.require("not connected", |s| s.connected);
        if result.is_ok() {
            self.lock().enabled = true;
        }
        Box::pin(async move { result })
    }

    fn is_enabled<'a>(&'a self, _handle: &'a DeviceHandle) -> ControllerFuture<'a, bool> {
        let enabled = self.lock().enabled;
        Box::pin(async move { Ok(enabled) })
    }

    fn home<'a>(&'a self, _handle: &'a DeviceHandle, timeout: Duration) -> ControllerFuture<'a, ()> {
        Box::pin(self.seek_home(timeout))
    }

    fn move_to<'a>(
        &'a self,
        _handle: &'a DeviceHandle,
        position: Position,
        timeout: Duration,
    ) -> ControllerFuture<'a, ()> {
        Box::pin(self.travel(position, timeout))
    }

    fn read_position<'a>(&'a self, _handle: &'a DeviceHandle) -> ControllerFuture<'a, Position> {
        let position = self.lock().position;
        Box::pin(async move { Ok(position) })
    }

    fn read_homed_indicator<'a>(
        &'a self,
        _handle: &'a DeviceHandle,
        name: &'a str,
    ) -> ControllerFuture<'a, bool> {
        let result: DynResult<bool> = match name {
            "IsHomed" => Ok(self.lock().homed),
            other => Err(Box::new(ControllerError::UnknownIndicator(other.to_string()))),
        };
        Box::pin(async move { result })
    }

    fn shutdown<'a>(&'a self, _handle: &'a DeviceHandle) -> ControllerFuture<'a, ()> {
        let mut state = self.lock();
        state.connected = false;
        state.settings_ready = false;
        state.enabled = false;
        state.polling = None;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cube_core::motion::session::{run_sequence, MotionPlan, SessionTimings};
    use cube_core::{DeviceSession, MotionCommand};

    use super::*;

    #[test]
    fn test_travel_time() {
        assert_eq!(
            travel_time(Position::ZERO, Position::parse("2.4").unwrap()),
            Duration::from_secs(1)
        );
        assert_eq!(
            travel_time(Position::from_mm(12), Position::from_mm(0)),
            Duration::from_secs(5)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_runs_full_sequence() {
        let cube = Arc::new(SimCube::new(vec!["27501283".to_string()]));
        let controller: Arc<dyn MotionController> = cube.clone();
        let mut session = DeviceSession::new(controller, SessionTimings::default());
        let plan = MotionPlan::new(
            "27501283",
            vec![
                MotionCommand::MoveAbsolute(Position::from_mm(2)),
                MotionCommand::MoveRelative(Position::parse("0.5").unwrap()),
            ],
        );

        let report = run_sequence(&mut session, &plan).await.unwrap();

        assert!(report.home.homed);
        assert_eq!(report.failed_commands(), 0);
        let state = cube.lock();
        assert_eq!(state.position, Position::parse("2.5").unwrap());
        assert_eq!(state.config, Some(ConfigLoadOption::UseFileSettings));
        assert!(!state.connected);
        assert!(state.polling.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sim_rejects_moves_when_disabled() {
        let cube = SimCube::new(vec!["1".to_string()]);
        let handle = cube.create("1").await.unwrap();
        cube.connect(&handle, "1").await.unwrap();

        assert!(cube
            .move_to(&handle, Position::from_mm(1), Duration::from_secs(60))
            .await
            .is_err());
        assert!(cube.create("2").await.is_err());
        assert!(cube.read_homed_indicator(&handle, "IsDeviceHomed").await.is_err());
    }
}
