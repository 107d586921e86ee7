// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod motion;
pub mod position;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use motion::command::MotionCommand;
pub use motion::error::{ControllerError, SessionError};
pub use motion::session::{DeviceSession, HomeResult, LoadResult, SessionState};
pub use motion::{ConfigLoadOption, DeviceHandle, MotionController};
pub use position::{Position, PositionError};
