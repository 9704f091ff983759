//! In-process engine driven programmatically
//!
//! Every descriptor handed to a [`VirtualEngine`] becomes a device the
//! engine can reach for as long as its owner keeps it alive. Callers then
//! push raw callbacks into the devices whose descriptors match a selector,
//! and inspect what was sent to the output devices. Used by the script
//! replay, TAS playback and the tests.
//!
//! The engine only holds weak references. Rebinding a controller drops its
//! old devices, and the engine forgets them the next time it creates one.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::error::ControllerError;
use crate::input::device::{InputCallback, InputDevice, InputEngine, OutputDevice};
use crate::input::params::ParamPackage;
use crate::input::status::{CallbackStatus, LedStatus, VibrationStatus};

/// Default engine name
pub const VIRTUAL_ENGINE: &str = "virtual";

/// Input device fed by [`VirtualEngine::emit`]
pub struct VirtualInput {
    params: ParamPackage,
    callback: Mutex<Option<InputCallback>>,
    last: Mutex<Option<CallbackStatus>>,
    soft_updates: AtomicUsize,
}

impl VirtualInput {
    fn new(params: ParamPackage) -> Self {
        Self {
            params,
            callback: Mutex::new(None),
            last: Mutex::new(None),
            soft_updates: AtomicUsize::new(0),
        }
    }

    /// Deliver a status to the installed callback, if any
    ///
    /// Returns whether a callback was installed.
    pub fn emit(&self, status: CallbackStatus) -> bool {
        *self.last.lock() = Some(status);
        // Call outside the slot lock so the callback may rebind this device
        let callback = self.callback.lock().clone();
        match callback {
            Some(callback) => {
                callback(&status);
                true
            }
            None => false,
        }
    }

    pub fn params(&self) -> &ParamPackage {
        &self.params
    }

    pub fn is_bound(&self) -> bool {
        self.callback.lock().is_some()
    }

    pub fn soft_update_count(&self) -> usize {
        self.soft_updates.load(Ordering::SeqCst)
    }
}

impl InputDevice for VirtualInput {
    fn set_callback(&self, callback: Option<InputCallback>) {
        *self.callback.lock() = callback;
    }

    fn force_update(&self) {
        let last = *self.last.lock();
        if let Some(status) = last {
            self.emit(status);
        }
    }

    fn soft_update(&self) {
        self.soft_updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// Output device that records every command it receives
pub struct VirtualOutput {
    params: ParamPackage,
    vibrations: Mutex<Vec<VibrationStatus>>,
    leds: Mutex<Vec<LedStatus>>,
    reject: AtomicBool,
}

impl VirtualOutput {
    fn new(params: ParamPackage) -> Self {
        Self {
            params,
            vibrations: Mutex::new(Vec::new()),
            leds: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &ParamPackage {
        &self.params
    }

    /// Make subsequent commands fail
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn vibrations(&self) -> Vec<VibrationStatus> {
        self.vibrations.lock().clone()
    }

    pub fn leds(&self) -> Vec<LedStatus> {
        self.leds.lock().clone()
    }

    fn check(&self) -> Result<(), ControllerError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ControllerError::DeviceRejected(self.params.serialize()));
        }
        Ok(())
    }
}

impl OutputDevice for VirtualOutput {
    fn set_vibration(&self, vibration: &VibrationStatus) -> Result<(), ControllerError> {
        self.check()?;
        self.vibrations.lock().push(*vibration);
        Ok(())
    }

    fn set_led(&self, led: &LedStatus) -> Result<(), ControllerError> {
        self.check()?;
        self.leds.lock().push(*led);
        Ok(())
    }
}

/// Engine whose devices are driven from code
pub struct VirtualEngine {
    name: String,
    inputs: Mutex<Vec<Weak<VirtualInput>>>,
    outputs: Mutex<Vec<Weak<VirtualOutput>>>,
}

impl Default for VirtualEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualEngine {
    /// Engine registered as `virtual`
    pub fn new() -> Self {
        Self::named(VIRTUAL_ENGINE)
    }

    /// Engine registered under another name (e.g. `tas`)
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inputs: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    /// Input devices whose descriptor contains every pair of `selector`
    pub fn inputs(&self, selector: &str) -> Vec<Arc<VirtualInput>> {
        let selector = ParamPackage::parse(selector);
        self.inputs
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|device| matches(&device.params, &selector))
            .collect()
    }

    /// Output devices whose descriptor contains every pair of `selector`
    pub fn outputs(&self, selector: &str) -> Vec<Arc<VirtualOutput>> {
        let selector = ParamPackage::parse(selector);
        self.outputs
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|device| matches(&device.params, &selector))
            .collect()
    }

    /// Number of input and output devices still alive
    pub fn device_count(&self) -> usize {
        let inputs = self.inputs.lock().iter().filter(|d| d.strong_count() > 0).count();
        let outputs = self.outputs.lock().iter().filter(|d| d.strong_count() > 0).count();
        inputs + outputs
    }

    /// Number of entries the engine is tracking, dead or alive
    pub fn tracked_count(&self) -> usize {
        self.inputs.lock().len() + self.outputs.lock().len()
    }

    /// Push a status into every bound device matching `selector`
    ///
    /// Returns the number of callbacks that ran.
    pub fn emit(&self, selector: &str, status: CallbackStatus) -> usize {
        let delivered = self
            .inputs(selector)
            .iter()
            .filter(|device| device.emit(status))
            .count();
        trace!("{} emit {:?} -> {} device(s)", self.name, selector, delivered);
        delivered
    }

    /// Forget dropped devices and inputs without a callback
    pub fn prune(&self) {
        self.inputs
            .lock()
            .retain(|device| device.upgrade().is_some_and(|device| device.is_bound()));
        self.outputs.lock().retain(|device| device.strong_count() > 0);
    }
}

fn matches(params: &ParamPackage, selector: &ParamPackage) -> bool {
    selector
        .iter()
        .all(|(key, value)| params.has(key) && params.get_str(key, "") == value)
}

impl InputEngine for VirtualEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_input(&self, params: &ParamPackage) -> Option<Arc<dyn InputDevice>> {
        let device = Arc::new(VirtualInput::new(params.clone()));
        let mut inputs = self.inputs.lock();
        inputs.retain(|device| device.strong_count() > 0);
        inputs.push(Arc::downgrade(&device));
        Some(device)
    }

    fn create_output(&self, params: &ParamPackage) -> Option<Arc<dyn OutputDevice>> {
        let device = Arc::new(VirtualOutput::new(params.clone()));
        let mut outputs = self.outputs.lock();
        outputs.retain(|device| device.strong_count() > 0);
        outputs.push(Arc::downgrade(&device));
        Some(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::status::ButtonStatus;

    #[test]
    fn test_emit_reaches_bound_devices_only() {
        let engine = VirtualEngine::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = engine
            .create_input(&ParamPackage::parse("engine:virtual,button:0"))
            .expect("device");
        let _b = engine
            .create_input(&ParamPackage::parse("engine:virtual,button:1"))
            .expect("device");

        let counter = hits.clone();
        a.set_callback(Some(Arc::new(move |_: &CallbackStatus| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        let press = CallbackStatus::Button(ButtonStatus::pressed(true));
        assert_eq!(engine.emit("button:0", press), 1);
        assert_eq!(engine.emit("button:1", press), 0);
        assert_eq!(engine.emit("engine:virtual", press), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        a.set_callback(None);
        assert_eq!(engine.emit("button:0", press), 0);
    }

    #[test]
    fn test_force_update_replays_last_value() {
        let engine = VirtualEngine::new();
        let device = engine
            .create_input(&ParamPackage::parse("engine:virtual,button:2"))
            .expect("device");
        engine.emit("button:2", CallbackStatus::Button(ButtonStatus::pressed(true)));

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        device.set_callback(Some(Arc::new(move |status: &CallbackStatus| {
            *sink.lock() = Some(*status);
        })));
        device.force_update();

        assert_eq!(
            *seen.lock(),
            Some(CallbackStatus::Button(ButtonStatus::pressed(true)))
        );
    }

    #[test]
    fn test_output_records_and_rejects() {
        let engine = VirtualEngine::new();
        let output = engine
            .create_output(&ParamPackage::parse("engine:virtual,output:1,port:0"))
            .expect("output");

        output.set_led(&LedStatus::default()).expect("led");
        let recorded = engine.outputs("port:0");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].leds().len(), 1);

        recorded[0].set_reject(true);
        assert!(output.set_led(&LedStatus::default()).is_err());
    }

    #[test]
    fn test_dropped_devices_are_forgotten() {
        let engine = VirtualEngine::new();
        let kept = engine
            .create_input(&ParamPackage::parse("engine:virtual,button:0"))
            .expect("device");
        for _ in 0..50 {
            engine.create_input(&ParamPackage::parse("engine:virtual,button:1"));
            engine.create_output(&ParamPackage::parse("engine:virtual,output:1"));
        }

        assert_eq!(engine.device_count(), 1);
        assert!(engine.tracked_count() <= 3);
        assert_eq!(engine.inputs("").len(), 1);
        drop(kept);
        assert!(engine.inputs("").is_empty());
    }
}
