// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

use super::command::MotionCommand;
use super::session::SessionState;

/// Failure reported by a controller backend for a capability it lacks or
/// cannot serve right now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("{0} is not supported by this controller")]
    NotSupported(&'static str),
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),
    #[error("{0}")]
    Device(String),
}

/// Errors raised by the device session.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("device discovery failed: {0}")]
    Discovery(String),

    #[error("device {serial} not found: {reason}")]
    DeviceNotFound { serial: String, reason: String },

    #[error("connecting to {serial} failed: {cause}")]
    Connect { serial: String, cause: String },

    #[error("device settings not initialized within {timeout_ms} ms: {cause}")]
    SettingsTimeout { timeout_ms: u64, cause: String },

    #[error("enabling the drive failed: {0}")]
    Enable(String),

    #[error("{command} failed: {cause}")]
    Motion {
        command: MotionCommand,
        cause: String,
    },

    #[error("run interrupted before completion")]
    Interrupted,

    #[error("{operation} is not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}
