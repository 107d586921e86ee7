// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use cube_core::{DynResult, MotionController};

pub mod sim;

pub use sim::SimCube;

/// What a backend needs to reach the device and the vendor library.
#[derive(Debug, Clone)]
pub struct BackendAccess {
    pub serial: String,
    /// Vendor library installation directory.
    pub library_path: PathBuf,
}

pub type BackendFactory = fn(BackendAccess) -> DynResult<Arc<dyn MotionController>>;

/// Controller backends by name. Plugins receive a pointer to this and
/// register into it, so a plugin may replace a built-in.
#[derive(Clone, Default)]
pub struct RegistrationContext {
    factories: BTreeMap<String, BackendFactory>,
}

impl RegistrationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `name`. Returns true when an earlier
    /// registration under the same key was replaced.
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) -> bool {
        let key = backend_key(name);
        let replaced = self.factories.insert(key.clone(), factory).is_some();
        if replaced {
            warn!("Controller backend '{}' registered again; the newer factory wins", key);
        }
        replaced
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&backend_key(name))
    }

    /// Registered keys in sorted order.
    pub fn registered_backends(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn build_controller(
        &self,
        name: &str,
        access: BackendAccess,
    ) -> DynResult<Arc<dyn MotionController>> {
        let Some(factory) = self.factories.get(&backend_key(name)) else {
            return Err(format!(
                "Unknown controller backend: {} (available: {})",
                name,
                self.registered_backends().join(", ")
            )
            .into());
        };
        debug!(
            "Building '{}' controller for {} (library path {})",
            name,
            access.serial,
            access.library_path.display()
        );
        factory(access)
    }
}

/// "Kinesis-DC", "kinesis_dc" and " KinesisDC " all name the same backend.
fn backend_key(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Register the backends compiled into this crate.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("sim", sim_factory);
}

fn sim_factory(access: BackendAccess) -> DynResult<Arc<dyn MotionController>> {
    Ok(Arc::new(SimCube::new(vec![access.serial])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access() -> BackendAccess {
        BackendAccess {
            serial: "27501283".to_string(),
            library_path: PathBuf::from("/opt/thorlabs/kinesis"),
        }
    }

    #[test]
    fn test_builtin_registration() {
        let mut context = RegistrationContext::new();
        register_builtin_backends_on(&mut context);
        assert_eq!(context.registered_backends(), vec!["sim"]);
        assert!(context.is_backend_registered("SIM"));
        assert!(context.build_controller("Sim", access()).is_ok());
    }

    #[test]
    fn test_unknown_backend_lists_available() {
        let mut context = RegistrationContext::new();
        register_builtin_backends_on(&mut context);
        let err = context.build_controller("kinesis", access()).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Unknown controller backend: kinesis (available: sim)"
        );
    }

    #[test]
    fn test_name_variants_share_a_key() {
        let mut context = RegistrationContext::new();
        assert!(!context.register_backend("Kinesis-DC", sim_factory));
        assert!(context.is_backend_registered("kinesis_dc"));
        assert!(context.is_backend_registered(" KinesisDC "));
        assert_eq!(context.registered_backends(), vec!["kinesisdc"]);
    }

    #[test]
    fn test_plugin_can_replace_builtin() {
        fn failing_factory(_access: BackendAccess) -> DynResult<Arc<dyn MotionController>> {
            Err("vendor library missing".into())
        }

        let mut context = RegistrationContext::new();
        register_builtin_backends_on(&mut context);
        assert!(context.register_backend("SIM", failing_factory));
        assert_eq!(context.registered_backends(), vec!["sim"]);
        let err = context.build_controller("sim", access()).err().unwrap();
        assert_eq!(err.to_string(), "vendor library missing");
    }
}
