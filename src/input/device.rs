//! Device handles and the factory that builds them
//!
//! A binding is created from a [`ParamPackage`] by the [`DeviceFactory`],
//! which dispatches on the descriptor's `engine` field to a registered
//! [`InputEngine`]. What comes back is an interface object: an
//! [`InputDevice`] that emits raw callbacks, or an [`OutputDevice`] that
//! accepts vibration and LED commands.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use super::params::ParamPackage;
use super::status::{CallbackStatus, LedStatus, VibrationStatus};
use crate::error::ControllerError;

/// Callback installed on an input device
pub type InputCallback = Arc<dyn Fn(&CallbackStatus) + Send + Sync>;

/// Source of raw input callbacks
///
/// Devices may call back from any thread.
pub trait InputDevice: Send + Sync {
    /// Install or remove (`None`) the callback
    ///
    /// After this returns with `None`, the device must not start new calls
    /// to the previous callback.
    fn set_callback(&self, callback: Option<InputCallback>);

    /// Emit the current value immediately, even if unchanged
    fn force_update(&self) {}

    /// Poll sources that only produce values when asked
    fn soft_update(&self) {}
}

/// Sink for vibration and LED commands
pub trait OutputDevice: Send + Sync {
    fn set_vibration(&self, vibration: &VibrationStatus) -> Result<(), ControllerError>;

    fn set_led(&self, led: &LedStatus) -> Result<(), ControllerError>;
}

/// A transport backend able to build devices from descriptors
pub trait InputEngine: Send + Sync {
    /// Engine name matched against the descriptor's `engine` field
    fn name(&self) -> &str;

    /// Build an input device, or `None` if the descriptor is not usable
    fn create_input(&self, params: &ParamPackage) -> Option<Arc<dyn InputDevice>>;

    /// Build an output device; engines without outputs keep the default
    fn create_output(&self, _params: &ParamPackage) -> Option<Arc<dyn OutputDevice>> {
        None
    }
}

/// Registry of engines keyed by name
#[derive(Default)]
pub struct DeviceFactory {
    engines: RwLock<HashMap<String, Arc<dyn InputEngine>>>,
}

impl DeviceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine, replacing any engine with the same name
    pub fn register(&self, engine: Arc<dyn InputEngine>) {
        let name = engine.name().to_string();
        info!("Registered input engine: {}", name);
        self.engines.write().insert(name, engine);
    }

    /// Names of all registered engines
    pub fn engine_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn engine_for(&self, params: &ParamPackage) -> Option<Arc<dyn InputEngine>> {
        if params.is_empty() {
            return None;
        }
        let engine = params.engine();
        let found = self.engines.read().get(&engine).cloned();
        if found.is_none() {
            debug!("No input engine named {:?}, leaving binding empty", engine);
        }
        found
    }

    /// Build an input device for a descriptor
    ///
    /// Empty descriptors and unknown engines yield `None`.
    pub fn create_input(&self, params: &ParamPackage) -> Option<Arc<dyn InputDevice>> {
        let device = self.engine_for(params)?.create_input(params);
        trace!("create_input({}) -> {}", params, device.is_some());
        device
    }

    /// Build an output device for a descriptor
    pub fn create_output(&self, params: &ParamPackage) -> Option<Arc<dyn OutputDevice>> {
        let device = self.engine_for(params)?.create_output(params);
        trace!("create_output({}) -> {}", params, device.is_some());
        device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::engine::VirtualEngine;

    #[test]
    fn test_dispatch_on_engine_name() {
        let factory = DeviceFactory::new();
        factory.register(Arc::new(VirtualEngine::new()));

        let bound = ParamPackage::parse("engine:virtual,button:0");
        assert!(factory.create_input(&bound).is_some());

        let unknown = ParamPackage::parse("engine:sdl,button:0");
        assert!(factory.create_input(&unknown).is_none());
        assert!(factory.create_input(&ParamPackage::new()).is_none());
    }

    #[test]
    fn test_engine_names_sorted() {
        let factory = DeviceFactory::new();
        factory.register(Arc::new(VirtualEngine::named("tas")));
        factory.register(Arc::new(VirtualEngine::new()));
        assert_eq!(factory.engine_names(), vec!["tas", "virtual"]);
    }
}
