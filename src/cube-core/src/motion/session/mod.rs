// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device session controller.
//!
//! A [`DeviceSession`] owns one actuator for the length of one automation
//! run: discovery, connection, configuration loading, enable, homing,
//! sequenced moves and teardown. Use [`run_sequence`] to get the
//! guarantee that a successfully opened device is always closed.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::motion::command::MotionCommand;
use crate::motion::error::SessionError;
use crate::motion::{DeviceHandle, MotionController};
use crate::position::Position;

pub mod machine;
pub mod policies;
pub mod probe;
pub mod runner;
pub mod strategy;

pub use machine::{SessionEvent, SessionMachine, SessionState};
pub use policies::{MotionErrorPolicy, PollingBound, SessionTimings};
pub use probe::{HomedProbe, DEFAULT_HOMED_INDICATORS};
pub use runner::{run_sequence, run_sequence_until, CommandOutcome, MotionPlan, RunReport};
pub use strategy::{
    default_strategies, first_success, ConfigLoadWarning, LoadResult, LoadStrategy,
    StrategyFailure,
};

/// What happened to the blocking home call itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "cause", rename_all = "snake_case")]
pub enum HomeCall {
    Returned,
    Failed(String),
    /// Still running when the join wait expired; left to finish on its own.
    StillRunning,
}

/// Outcome of a homing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomeResult {
    pub homed: bool,
    /// Indicator that confirmed the homed state.
    pub indicator: Option<String>,
    pub call: HomeCall,
}

/// Lifecycle controller for one connected actuator.
pub struct DeviceSession {
    controller: Arc<dyn MotionController>,
    machine: SessionMachine,
    timings: SessionTimings,
    probe: HomedProbe,
    handle: Option<DeviceHandle>,
}

impl DeviceSession {
    pub fn new(controller: Arc<dyn MotionController>, timings: SessionTimings) -> Self {
        Self {
            controller,
            machine: SessionMachine::new(),
            timings,
            probe: HomedProbe::default(),
            handle: None,
        }
    }

    pub fn with_probe(mut self, probe: HomedProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Handle of the currently open device, if any.
    pub fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    /// Query the controller layer for reachable devices.
    pub async fn discover(&self) -> Result<BTreeSet<String>, SessionError> {
        let devices: BTreeSet<String> = self
            .controller
            .list_devices()
            .await
            .map_err(|e| SessionError::Discovery(e.to_string()))?
            .into_iter()
            .collect();
        info!(
            "Devices detected: [{}]",
            devices.iter().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(devices)
    }

    /// Discover devices and create the device object for `serial`.
    ///
    /// An empty discovery result is not treated as absence; creation is
    /// attempted anyway.
    pub async fn open(&mut self, serial: &str) -> Result<DeviceHandle, SessionError> {
        if self.handle.is_some() || self.state() != SessionState::Disconnected {
            return Err(self.invalid("open"));
        }

        let devices = self.discover().await?;
        if devices.is_empty() {
            warn!("No devices reported; trying {} anyway", serial);
        } else if !devices.contains(serial) {
            return Err(SessionError::DeviceNotFound {
                serial: serial.to_string(),
                reason: format!(
                    "not in the detected device list [{}]; unplug and replug USB, \
                     power-cycle the cube and close other vendor software, then retry",
                    devices.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
            });
        }

        let handle = self
            .controller
            .create(serial)
            .await
            .map_err(|e| SessionError::DeviceNotFound {
                serial: serial.to_string(),
                reason: e.to_string(),
            })?;
        info!("Created device {}", handle);
        self.handle = Some(handle.clone());
        self.transition(SessionEvent::Opened);
        Ok(handle)
    }

    /// Connect and block until the controller reports its settings
    /// initialized, bounded by the settings timeout.
    pub async fn connect_and_wait_ready(&mut self) -> Result<(), SessionError> {
        let handle = self.expect_state("connect", SessionState::Connecting)?;

        info!("Connecting to {}", handle.serial());
        self.controller
            .connect(&handle, handle.serial())
            .await
            .map_err(|e| SessionError::Connect {
                serial: handle.serial().to_string(),
                cause: e.to_string(),
            })?;

        let timeout = self.timings.settings_timeout;
        self.controller
            .wait_settings_ready(&handle, timeout)
            .await
            .map_err(|e| SessionError::SettingsTimeout {
                timeout_ms: timeout.as_millis() as u64,
                cause: e.to_string(),
            })?;

        self.transition(SessionEvent::SettingsReady);
        Ok(())
    }

    /// Load the motor configuration with the first strategy that works.
    /// Exhausting all strategies is reported in the result, not raised.
    pub async fn load_configuration(
        &mut self,
        strategies: &[Box<dyn LoadStrategy>],
    ) -> Result<LoadResult, SessionError> {
        let handle = self.expect_state("load configuration", SessionState::SettingsPending)?;

        let result =
            first_success(strategies, self.controller.as_ref(), &handle, handle.serial()).await;
        if let Some(warning) = result.warning() {
            warn!("{}; continuing without explicit configuration", warning);
        }

        self.transition(SessionEvent::ConfigApplied);
        Ok(result)
    }

    /// Start background polling, energize the drive and let it settle.
    pub async fn enable(&mut self) -> Result<(), SessionError> {
        let handle = self.expect_state("enable", SessionState::ConfigLoaded)?;

        self.controller
            .start_polling(&handle, self.timings.poll_interval)
            .await
            .map_err(|e| SessionError::Enable(format!("starting status polling: {}", e)))?;
        self.controller
            .enable(&handle)
            .await
            .map_err(|e| SessionError::Enable(e.to_string()))?;
        time::sleep(self.timings.enable_settle).await;

        info!("Drive enabled on {}", handle.serial());
        self.transition(SessionEvent::DriveEnabled);
        Ok(())
    }

    /// Home the actuator. An unconfirmed homing is reported through
    /// `homed = false`; the caller decides whether to carry on.
    pub async fn home(&mut self) -> Result<HomeResult, SessionError> {
        let state = self.state();
        if !state.can_home() {
            return Err(self.invalid("home"));
        }
        let handle = self.current_handle("home")?;

        let result = self.run_homing(&handle).await;
        if state == SessionState::Enabled {
            self.transition(SessionEvent::HomingFinished);
            time::sleep(self.timings.post_home_settle).await;
            self.transition(SessionEvent::Armed);
        } else {
            time::sleep(self.timings.post_home_settle).await;
        }
        Ok(result)
    }

    /// Execute one motion command on a ready session.
    ///
    /// Relative moves read the current position, add the delta exactly and
    /// command an absolute move to the sum. The position may change between
    /// the read and the move; nothing guards against that.
    pub async fn execute(&mut self, command: MotionCommand) -> Result<(), SessionError> {
        if !self.state().can_move() {
            return Err(self.invalid(command.name()));
        }
        let handle = self.current_handle(command.name())?;

        match command {
            MotionCommand::Home => {
                let result = self.run_homing(&handle).await;
                time::sleep(self.timings.post_home_settle).await;
                match result.call {
                    HomeCall::Failed(cause) if !result.homed => {
                        Err(SessionError::Motion { command, cause })
                    }
                    _ => Ok(()),
                }
            }
            MotionCommand::MoveAbsolute(target) => {
                self.ensure_enabled(&handle).await?;
                self.move_to(&handle, &command, target).await
            }
            MotionCommand::MoveRelative(delta) => {
                self.ensure_enabled(&handle).await?;
                let current = self.controller.read_position(&handle).await.map_err(|e| {
                    SessionError::Motion {
                        command: command.clone(),
                        cause: format!("reading position: {}", e),
                    }
                })?;
                let target =
                    current
                        .checked_add(delta)
                        .ok_or_else(|| SessionError::Motion {
                            command: command.clone(),
                            cause: format!("{} + {} overflows", current, delta),
                        })?;
                debug!("Relative move {} + {} -> {}", current, delta, target);
                self.move_to(&handle, &command, target).await
            }
        }
    }

    /// Stop polling, then shut the connection down. Both steps are
    /// attempted regardless of each other; failures are only logged.
    /// Does nothing when no device is open.
    pub async fn close(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.transition(SessionEvent::CloseRequested);

        if let Err(e) = self.controller.stop_polling(&handle).await {
            warn!("Stopping polling on {} failed: {}", handle, e);
        }
        match self.controller.shutdown(&handle).await {
            Ok(()) => info!("Device {} shut down", handle.serial()),
            Err(e) => warn!("Shutting down {} failed: {}", handle, e),
        }

        self.transition(SessionEvent::Closed);
        debug!(
            "Session closed after {} transitions",
            self.machine.transition_count()
        );
    }

    async fn run_homing(&self, handle: &DeviceHandle) -> HomeResult {
        let started = Instant::now();
        info!("Homing {}...", handle.serial());

        let controller = Arc::clone(&self.controller);
        let call_handle = handle.clone();
        let home_timeout = self.timings.home_timeout;
        let mut call = tokio::spawn(async move {
            controller
                .home(&call_handle, home_timeout)
                .await
                .map_err(|e| e.to_string())
        });

        let call_outcome = match time::timeout(self.timings.home_join_wait, &mut call).await {
            Ok(Ok(Ok(()))) => {
                info!("Home call returned");
                HomeCall::Returned
            }
            Ok(Ok(Err(cause))) => {
                warn!("Home call raised: {}", cause);
                HomeCall::Failed(cause)
            }
            Ok(Err(join_err)) => {
                warn!("Home call aborted: {}", join_err);
                HomeCall::Failed(join_err.to_string())
            }
            Err(_) => {
                info!(
                    "Home call still running after {:?}; polling for homed state",
                    self.timings.home_join_wait
                );
                HomeCall::StillRunning
            }
        };
        // An unfinished home call is abandoned, not cancelled.
        drop(call);

        let indicator = self
            .probe
            .wait_homed(
                self.controller.as_ref(),
                handle,
                self.timings.homing,
                started,
            )
            .await;
        let homed = indicator.is_some();
        if homed {
            info!("Homing complete after {:?}", started.elapsed());
        } else {
            warn!(
                "Homing not confirmed within {:?}",
                self.timings.homing.bound()
            );
        }

        HomeResult {
            homed,
            indicator,
            call: call_outcome,
        }
    }

    /// Some sessions report a transient disable; re-enable before moving.
    async fn ensure_enabled(&self, handle: &DeviceHandle) -> Result<(), SessionError> {
        match self.controller.is_enabled(handle).await {
            Ok(true) => return Ok(()),
            Ok(false) => warn!("Drive on {} reports disabled; re-enabling", handle.serial()),
            Err(e) => debug!("Enabled state unavailable ({}); enabling anyway", e),
        }
        self.controller
            .enable(handle)
            .await
            .map_err(|e| SessionError::Enable(e.to_string()))?;
        time::sleep(self.timings.reenable_settle).await;
        Ok(())
    }

    async fn move_to(
        &self,
        handle: &DeviceHandle,
        command: &MotionCommand,
        target: Position,
    ) -> Result<(), SessionError> {
        info!("Moving to {} mm", target);
        if let Err(e) = self
            .controller
            .move_to(handle, target, self.timings.move_timeout)
            .await
        {
            error!("{} raised: {}", command, e);
            return Err(SessionError::Motion {
                command: command.clone(),
                cause: e.to_string(),
            });
        }
        time::sleep(self.timings.move_settle).await;
        Ok(())
    }

    fn transition(&mut self, event: SessionEvent) {
        let old = self.machine.state();
        let held = self.machine.time_in_state();
        if self.machine.process_event(event) {
            debug!(
                "Session {} -> {} on {:?} (held {:?})",
                old,
                self.machine.state(),
                event,
                held.unwrap_or_default()
            );
        } else {
            debug!("Session ignored {:?} while {}", event, old);
        }
    }

    fn invalid(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState {
            operation,
            state: self.state(),
        }
    }

    fn current_handle(&self, operation: &'static str) -> Result<DeviceHandle, SessionError> {
        self.handle.clone().ok_or_else(|| self.invalid(operation))
    }

    fn expect_state(
        &self,
        operation: &'static str,
        expected: SessionState,
    ) -> Result<DeviceHandle, SessionError> {
        if self.state() != expected {
            return Err(self.invalid(operation));
        }
        self.current_handle(operation)
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            warn!("Session dropped while {} is still open", handle);
        }
    }
}
