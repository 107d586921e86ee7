// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Shared application plumbing: config file discovery, logging setup and
//! backend plugin loading.

pub mod config;
pub mod logging;
pub mod plugins;

pub use config::{ConfigError, ConfigFile, CONFIG_FILE_NAME};
pub use logging::init_logging;
pub use plugins::load_backend_plugins;
