// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dynamic backend plugins.
//!
//! A plugin is a shared library exporting `cube_register_backend`, which
//! receives a pointer to the host's backend registration context.

use std::collections::HashSet;
use std::ffi::{c_void, OsStr};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use libloading::{Library, Symbol};
use tracing::{debug, info, warn};

const PLUGIN_ENV: &str = "CUBE_PLUGIN_DIRS";
const BACKEND_ENTRYPOINT: &str = "cube_register_backend";

#[cfg(windows)]
const PATH_SEPARATOR: char = ';';
#[cfg(not(windows))]
const PATH_SEPARATOR: char = ':';

#[cfg(windows)]
const PLUGIN_EXTENSIONS: &[&str] = &["dll"];
#[cfg(target_os = "macos")]
const PLUGIN_EXTENSIONS: &[&str] = &["dylib"];
#[cfg(all(unix, not(target_os = "macos")))]
const PLUGIN_EXTENSIONS: &[&str] = &["so"];

/// Load backend plugins from the standard locations plus `extra_dirs`.
///
/// The returned libraries must outlive every controller they registered.
pub fn load_backend_plugins(context: NonNull<c_void>, extra_dirs: &[PathBuf]) -> Vec<Library> {
    let mut libraries = Vec::new();
    let search_paths = plugin_search_paths(std::env::var(PLUGIN_ENV).ok().as_deref(), extra_dirs);

    info!("Plugin search paths: {:?}", search_paths);

    for path in search_paths {
        if let Err(err) = load_plugins_from_dir(&path, context, &mut libraries) {
            warn!("Plugin scan failed for {:?}: {}", path, err);
        }
    }

    libraries
}

fn load_plugins_from_dir(
    path: &Path,
    context: NonNull<c_void>,
    libraries: &mut Vec<Library>,
) -> std::io::Result<()> {
    if !path.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();
        if !path.is_file() || !is_plugin_file(&path) {
            continue;
        }

        // Vendor directories hold many libraries without our entrypoint.
        unsafe {
            match Library::new(&path) {
                Ok(lib) => match register_library(&lib, context) {
                    Ok(()) => {
                        info!("Loaded plugin {:?}", path);
                        libraries.push(lib);
                    }
                    Err(err) => debug!("Skipping {:?}: {}", path, err),
                },
                Err(err) => warn!("Failed to load plugin {:?}: {}", path, err),
            }
        }
    }

    Ok(())
}

unsafe fn register_library(lib: &Library, context: NonNull<c_void>) -> Result<(), String> {
    let entry: Symbol<unsafe extern "C" fn(*mut c_void)> = lib
        .get(BACKEND_ENTRYPOINT.as_bytes())
        .map_err(|e| format!("missing entrypoint {}: {}", BACKEND_ENTRYPOINT, e))?;
    entry(context.as_ptr());
    Ok(())
}

fn plugin_search_paths(env_paths: Option<&str>, extra_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = env_paths
        .map(|raw| {
            raw.split(PATH_SEPARATOR)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();

    paths.extend(extra_dirs.iter().cloned());
    paths.push(PathBuf::from("plugins"));

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("cube-rs").join("plugins"));
    }

    let mut seen = HashSet::new();
    paths.retain(|path| seen.insert(path.clone()));
    paths
}

fn is_plugin_file(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| PLUGIN_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_paths_order() {
        let env = format!("/a{}{}/b", PATH_SEPARATOR, PATH_SEPARATOR);
        let paths = plugin_search_paths(Some(&env), &[PathBuf::from("/opt/thorlabs/kinesis")]);
        assert_eq!(paths[0], PathBuf::from("/a"));
        assert_eq!(paths[1], PathBuf::from("/b"));
        assert_eq!(paths[2], PathBuf::from("/opt/thorlabs/kinesis"));
        assert_eq!(paths[3], PathBuf::from("plugins"));
    }

    #[test]
    fn test_repeated_dirs_are_scanned_once() {
        let env = format!("/opt/thorlabs/kinesis{}/a", PATH_SEPARATOR);
        let paths = plugin_search_paths(Some(&env), &[PathBuf::from("/opt/thorlabs/kinesis")]);
        let kinesis = PathBuf::from("/opt/thorlabs/kinesis");
        assert_eq!(paths.iter().filter(|p| **p == kinesis).count(), 1);
        assert_eq!(paths[0], kinesis);
        assert_eq!(paths[1], PathBuf::from("/a"));
        assert_eq!(paths[2], PathBuf::from("plugins"));
    }

    #[test]
    fn test_no_env_paths() {
        let paths = plugin_search_paths(None, &[]);
        assert_eq!(paths[0], PathBuf::from("plugins"));
    }

    #[test]
    fn test_plugin_extensions() {
        let ext = PLUGIN_EXTENSIONS[0];
        assert!(is_plugin_file(Path::new(&format!("libcube_kinesis.{}", ext))));
        assert!(is_plugin_file(Path::new(&format!("x.{}", ext.to_uppercase()))));
        assert!(!is_plugin_file(Path::new("readme.txt")));
        assert!(!is_plugin_file(Path::new("noext")));
    }

    #[test]
    fn test_missing_dir_is_not_an_error() {
        let mut libraries = Vec::new();
        let mut context = 0u8;
        let ptr = NonNull::from(&mut context).cast();
        load_plugins_from_dir(Path::new("/nonexistent/cube-rs/plugins"), ptr, &mut libraries)
            .unwrap();
        assert!(libraries.is_empty());
    }
}
