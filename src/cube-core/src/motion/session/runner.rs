// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Scoped execution of one automation run.

use std::future::{self, Future};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::motion::command::MotionCommand;
use crate::motion::error::SessionError;

use super::policies::MotionErrorPolicy;
use super::strategy::{default_strategies, LoadResult, LoadStrategy};
use super::{DeviceSession, HomeResult};

/// What one run does with the device.
pub struct MotionPlan {
    pub serial: String,
    pub strategies: Vec<Box<dyn LoadStrategy>>,
    /// Commands run after bring-up homing.
    pub commands: Vec<MotionCommand>,
    pub error_policy: MotionErrorPolicy,
}

impl MotionPlan {
    pub fn new(serial: impl Into<String>, commands: Vec<MotionCommand>) -> Self {
        Self {
            serial: serial.into(),
            strategies: default_strategies(),
            commands,
            error_policy: MotionErrorPolicy::default(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<Box<dyn LoadStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_error_policy(mut self, policy: MotionErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// Result of one queued command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub command: MotionCommand,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a run that got past bring-up.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub serial: String,
    pub config: LoadResult,
    pub home: HomeResult,
    pub outcomes: Vec<CommandOutcome>,
    /// The sequence stopped early because of a motion error.
    pub aborted: bool,
}

impl RunReport {
    pub fn failed_commands(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_ok()).count()
    }
}

/// Run `plan` against `session`.
///
/// Once `open` succeeds, `close` runs exactly once before this returns,
/// whichever step fails. A failed `open` leaves nothing to close.
pub async fn run_sequence(
    session: &mut DeviceSession,
    plan: &MotionPlan,
) -> Result<RunReport, SessionError> {
    run_sequence_until(session, plan, future::pending()).await
}

/// Like [`run_sequence`], but stops early when `interrupt` completes.
///
/// The in-flight step is dropped and the device is still closed before
/// this returns [`SessionError::Interrupted`].
pub async fn run_sequence_until<F>(
    session: &mut DeviceSession,
    plan: &MotionPlan,
    interrupt: F,
) -> Result<RunReport, SessionError>
where
    F: Future<Output = ()>,
{
    let result = tokio::select! {
        biased;
        () = interrupt => {
            warn!("Run interrupted; closing the device");
            Err(SessionError::Interrupted)
        }
        result = drive(session, plan) => result,
    };
    session.close().await;
    result
}

async fn drive(session: &mut DeviceSession, plan: &MotionPlan) -> Result<RunReport, SessionError> {
    session.open(&plan.serial).await?;
    session.connect_and_wait_ready().await?;
    let config = session.load_configuration(&plan.strategies).await?;
    session.enable().await?;

    let home = session.home().await?;
    if !home.homed {
        warn!("Continuing without homing confirmation");
    }

    let mut outcomes = Vec::with_capacity(plan.commands.len());
    let mut aborted = false;
    for command in &plan.commands {
        match session.execute(command.clone()).await {
            Ok(()) => outcomes.push(CommandOutcome {
                command: command.clone(),
                error: None,
            }),
            Err(e) => {
                error!("{} failed: {}", command, e);
                outcomes.push(CommandOutcome {
                    command: command.clone(),
                    error: Some(e.to_string()),
                });
                if plan.error_policy.aborts() {
                    warn!("Aborting remaining motion commands");
                    aborted = true;
                    break;
                }
            }
        }
    }

    info!(
        "Sequence finished: {} of {} commands succeeded",
        outcomes.iter().filter(|o| o.is_ok()).count(),
        plan.commands.len()
    );

    Ok(RunReport {
        serial: plan.serial.clone(),
        config,
        home,
        outcomes,
        aborted,
    })
}
