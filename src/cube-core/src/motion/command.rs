// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::Serialize;

use crate::position::Position;

/// A single step of a motion sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "mm")]
pub enum MotionCommand {
    Home,
    MoveAbsolute(Position),
    MoveRelative(Position),
}

impl MotionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::MoveAbsolute(_) => "move_absolute",
            Self::MoveRelative(_) => "move_relative",
        }
    }
}

impl fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "Home"),
            Self::MoveAbsolute(p) => write!(f, "MoveAbsolute({} mm)", p),
            Self::MoveRelative(d) => write!(f, "MoveRelative({} mm)", d),
        }
    }
}
