// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Shared config file name; each binary reads its own section.
pub const CONFIG_FILE_NAME: &str = "cube-rs.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Candidate locations for `cube-rs.toml`, most specific first.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("cube-rs").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/cube-rs").join(CONFIG_FILE_NAME));
    paths
}

fn parse_section<T: DeserializeOwned>(
    path: &Path,
    content: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let parse_err =
        |e: &dyn std::fmt::Display| ConfigError::ParseError(path.to_path_buf(), e.to_string());

    let table: toml::Table = toml::from_str(content).map_err(|e| parse_err(&e))?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Round-trip through text so serde defaults apply to missing keys.
    let section_toml = toml::to_string(section).map_err(|e| parse_err(&e))?;
    let cfg = toml::from_str::<T>(&section_toml).map_err(|e| parse_err(&e))?;
    Ok(Some(cfg))
}

fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(path, &content, key)
}

/// A binary's section of `cube-rs.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key, e.g. `"cube-run"`.
    fn section_key() -> &'static str;

    /// Load the section from a specific file.
    ///
    /// Fails when the file is unreadable, not TOML, or lacks the section.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Parse the section out of an in-memory document.
    fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let origin = PathBuf::from("<inline>");
        parse_section::<Self>(&origin, content, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(origin, format!("missing [{}] section", Self::section_key()))
        })
    }

    /// Load the first default path that has the section.
    ///
    /// Returns defaults and `None` when no file provides it.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(&path, Self::section_key())? {
                    return Ok((cfg, Some(path)));
                }
            }
        }
        Ok((Self::default(), None))
    }
}
