//! Emulated controller for one player slot
//!
//! An [`EmulatedController`] turns the raw callbacks of every device bound
//! to a player into one canonical, thread-safe report. It owns:
//! - the parameter table and the devices built from it
//! - the canonical state and its configuration shadow, behind one lock
//! - the subscriber registry, invoked after that lock is released
//!
//! Lock order is bindings before state. Device callbacks only take the
//! state lock, and carry the binding generation they were installed with so
//! that a callback racing a reload is discarded instead of applied.

pub mod arbitration;
pub mod bindings;
pub mod notify;
pub mod output;
pub mod state;
pub mod style;
pub mod types;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConfigRepository;
use crate::error::{ConfigError, ControllerError};
use crate::input::device::{DeviceFactory, InputDevice};
use crate::input::params::ParamPackage;
use crate::input::source_id::SourceId;
use crate::input::status::{BatteryLevel, CallbackStatus, LedStatus, MotionStatus};

use self::bindings::{DeviceSet, InputBinding, InputKind, ParamTable};
use self::notify::{ControllerUpdateCallback, NotificationBus};
use self::state::{ControllerReport, ControllerState};
use self::types::*;

pub use self::arbitration::{ButtonSlot, StickSlot, TriggerSlot};

struct Bindings {
    params: ParamTable,
    devices: DeviceSet,
}

struct StateCell {
    state: ControllerState,
    /// Bumped whenever bindings are torn down
    generation: u64,
}

struct Inner {
    npad_id: NpadIdType,
    bindings: Mutex<Bindings>,
    state: Mutex<StateCell>,
    bus: NotificationBus,
    repository: Arc<dyn ConfigRepository>,
    factory: Arc<DeviceFactory>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.bindings.get_mut().devices.unbind();
    }
}

impl Inner {
    /// Run `f` under the state lock and deliver what it queued afterwards
    fn with_state<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        let (result, pending) = {
            let mut cell = self.state.lock();
            let result = f(&mut cell.state);
            (result, cell.state.take_pending())
        };
        self.bus.dispatch(pending);
        result
    }

    /// Entry point of device callbacks
    fn on_device_callback(&self, generation: u64, binding: &RawTarget, status: &CallbackStatus) {
        let pending = {
            let mut cell = self.state.lock();
            if cell.generation != generation {
                debug!(
                    "Dropping {} callback from torn-down binding {:?}[{}]",
                    status.kind(),
                    binding.kind,
                    binding.index
                );
                return;
            }
            apply_raw(&mut cell.state, binding, status);
            cell.state.take_pending()
        };
        self.bus.dispatch(pending);
    }
}

/// Where a raw callback goes
#[derive(Debug, Clone, Copy)]
struct RawTarget {
    kind: InputKind,
    index: usize,
    source: SourceId,
}

fn apply_raw(state: &mut ControllerState, target: &RawTarget, status: &CallbackStatus) {
    match target.kind {
        InputKind::Button => state.apply_button(target.index, status, target.source),
        InputKind::Stick => state.apply_stick(target.index, status, target.source),
        InputKind::Trigger => state.apply_trigger(target.index, status, target.source),
        InputKind::Motion => state.apply_motion(target.index, status),
        InputKind::Battery => state.apply_battery(target.index, status),
    }
}

/// Canonical controller of one player slot
///
/// Cheap to clone; clones share the same controller.
#[derive(Clone)]
pub struct EmulatedController {
    inner: Arc<Inner>,
}

impl EmulatedController {
    /// Create a disconnected controller with no bindings
    ///
    /// Call [`EmulatedController::reload_from_settings`] to load the player.
    pub fn new(
        npad_id: NpadIdType,
        repository: Arc<dyn ConfigRepository>,
        factory: Arc<DeviceFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                npad_id,
                bindings: Mutex::new(Bindings {
                    params: ParamTable::default(),
                    devices: DeviceSet::default(),
                }),
                state: Mutex::new(StateCell {
                    state: ControllerState::new(npad_id),
                    generation: 0,
                }),
                bus: NotificationBus::new(),
                repository,
                factory,
            }),
        }
    }

    pub fn npad_id(&self) -> NpadIdType {
        self.inner.npad_id
    }

    fn player(&self) -> Result<crate::config::PlayerConfig, ConfigError> {
        self.inner.repository.player(self.inner.npad_id.index())
    }

    // ---- settings ----

    /// Load parameters, colors, style and connection from the repository and
    /// rebind every device
    pub fn reload_from_settings(&self) -> Result<(), ConfigError> {
        let player = self.player()?;
        let npad_id = self.inner.npad_id;

        self.inner.bindings.lock().params = ParamTable::from_player(&player);

        // The debug slot is always a Pro controller
        let style = match npad_id {
            NpadIdType::Other => NpadStyleIndex::ProController,
            _ => NpadStyleIndex::from(player.controller_type),
        };

        self.inner.with_state(|state| {
            state.set_colors(ControllerColors {
                left: NpadColor {
                    body: player.body_color_left,
                    button: player.button_color_left,
                },
                right: NpadColor {
                    body: player.body_color_right,
                    button: player.button_color_right,
                },
                fullkey: NpadColor {
                    body: player.body_color_left,
                    button: player.button_color_left,
                },
            });
            state.motion_sensitivity = player.motion_sensitivity;
            state.set_style(style);
            if player.connected {
                if let Err(err) = state.connect(false) {
                    debug!("{} stays disconnected after reload: {}", npad_id, err);
                }
            } else {
                state.disconnect();
            }
        });

        self.reload_input();
        info!("{} reloaded from settings as {:?}", npad_id, style);
        Ok(())
    }

    /// Write connection, style and parameters back to the repository
    pub fn save_current_config(&self) -> Result<(), ConfigError> {
        let mut player = self.player()?;
        {
            let bindings = self.inner.bindings.lock();
            bindings.params.write_to(&mut player);
        }
        {
            let cell = self.inner.state.lock();
            player.connected = cell.state.is_connected;
            player.controller_type = cell.state.npad_type.into();
        }
        self.inner
            .repository
            .set_player(self.inner.npad_id.index(), player)
    }

    /// Throw away unsaved mapping changes; only meaningful while configuring
    pub fn restore_config(&self) -> Result<(), ConfigError> {
        if !self.is_configuring() {
            return Ok(());
        }
        self.reload_from_settings()
    }

    // ---- bindings ----

    /// Tear down all devices and rebuild them from the parameter table
    pub fn reload_input(&self) {
        let to_refresh = {
            let mut bindings = self.inner.bindings.lock();
            bindings.devices.unbind();
            let generation = {
                let mut cell = self.inner.state.lock();
                cell.generation += 1;
                cell.generation
            };

            let devices = DeviceSet::load(&self.inner.factory, &bindings.params, self.inner.npad_id);
            let weak = Arc::downgrade(&self.inner);
            for binding in &devices.inputs {
                install_callback(&weak, generation, binding);
            }
            let to_refresh: Vec<Arc<dyn InputDevice>> = devices
                .inputs
                .iter()
                .filter(|binding| binding.force_update)
                .map(|binding| binding.device.clone())
                .collect();
            bindings.devices = devices;
            to_refresh
        };

        // Outside the bindings lock: refreshed values reach subscribers,
        // which may call back into this controller
        for device in to_refresh {
            device.force_update();
        }
    }

    /// Remove every device binding
    pub fn unload_input(&self) {
        let mut bindings = self.inner.bindings.lock();
        bindings.devices.unbind();
        self.inner.state.lock().generation += 1;
        bindings.devices = DeviceSet::default();
    }

    /// Distinct physical devices referenced by the button and stick mapping
    pub fn mapped_devices(&self) -> Vec<ParamPackage> {
        self.inner.bindings.lock().params.mapped_devices()
    }

    pub fn button_param(&self, index: usize) -> ParamPackage {
        self.inner
            .bindings
            .lock()
            .params
            .buttons
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stick_param(&self, index: usize) -> ParamPackage {
        self.inner
            .bindings
            .lock()
            .params
            .sticks
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    pub fn motion_param(&self, index: usize) -> ParamPackage {
        self.inner
            .bindings
            .lock()
            .params
            .motions
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Rebind one button and reload all devices
    pub fn set_button_param(&self, index: usize, params: ParamPackage) -> Result<(), ControllerError> {
        self.set_param(index, params, "button", |table| &mut table.buttons[..])
    }

    pub fn set_stick_param(&self, index: usize, params: ParamPackage) -> Result<(), ControllerError> {
        self.set_param(index, params, "stick", |table| &mut table.sticks[..])
    }

    pub fn set_motion_param(&self, index: usize, params: ParamPackage) -> Result<(), ControllerError> {
        self.set_param(index, params, "motion", |table| &mut table.motions[..])
    }

    fn set_param(
        &self,
        index: usize,
        params: ParamPackage,
        kind: &'static str,
        column: impl FnOnce(&mut ParamTable) -> &mut [ParamPackage],
    ) -> Result<(), ControllerError> {
        {
            let mut bindings = self.inner.bindings.lock();
            let slot = column(&mut bindings.params)
                .get_mut(index)
                .ok_or(ControllerError::IndexOutOfRange { kind, index })?;
            *slot = params;
        }
        self.reload_input();
        Ok(())
    }

    // ---- raw input ----

    /// Apply a raw button callback from `source`
    pub fn set_button(&self, callback: &CallbackStatus, index: usize, source: SourceId) {
        self.inner
            .with_state(|state| state.apply_button(index, callback, source));
    }

    /// Apply a raw stick callback from `source`
    pub fn set_stick(&self, callback: &CallbackStatus, index: usize, source: SourceId) {
        self.inner
            .with_state(|state| state.apply_stick(index, callback, source));
    }

    /// Apply a raw trigger callback from `source`
    pub fn set_trigger(&self, callback: &CallbackStatus, index: usize, source: SourceId) {
        self.inner
            .with_state(|state| state.apply_trigger(index, callback, source));
    }

    pub fn set_motion(&self, callback: &CallbackStatus, index: usize) {
        self.inner.with_state(|state| state.apply_motion(index, callback));
    }

    pub fn set_battery(&self, callback: &CallbackStatus, index: usize) {
        self.inner.with_state(|state| state.apply_battery(index, callback));
    }

    // ---- output ----

    /// Send a vibration to output channel `index`
    ///
    /// Returns `false` when the channel is unbound, vibration is disabled or
    /// the device rejects the command.
    pub fn set_vibration(&self, index: usize, vibration: VibrationValue) -> bool {
        match self.try_set_vibration(index, vibration) {
            Ok(()) => true,
            Err(err) => {
                debug!("{} vibration {} failed: {}", self.inner.npad_id, index, err);
                false
            }
        }
    }

    pub fn try_set_vibration(&self, index: usize, vibration: VibrationValue) -> Result<(), ControllerError> {
        if index >= OUTPUT_COUNT {
            return Err(ControllerError::IndexOutOfRange {
                kind: "output",
                index,
            });
        }
        let device = self.inner.bindings.lock().devices.outputs[index]
            .clone()
            .ok_or(ControllerError::MissingBinding {
                kind: "output",
                index,
            })?;

        let player = self
            .player()
            .map_err(|err| ControllerError::Settings(err.to_string()))?;
        if !player.vibration_enabled {
            return Err(ControllerError::VibrationDisabled);
        }

        let status = output::shape_vibration(&vibration, player.vibration_strength);
        device.set_vibration(&status)
    }

    /// Probe rumble support with an imperceptible pulse followed by a stop
    pub fn test_vibration(&self, index: usize) -> bool {
        self.try_test_vibration(index).is_ok()
    }

    /// Both commands are always sent; the first failure is reported
    pub fn try_test_vibration(&self, index: usize) -> Result<(), ControllerError> {
        let pulse = self.try_set_vibration(index, VibrationValue::TEST_PULSE);
        let stop = self.try_set_vibration(index, VibrationValue::DEFAULT);
        pulse.and(stop)
    }

    /// Light the player LEDs on every bound output device
    pub fn set_led_pattern(&self) {
        let status = LedStatus::from(self.led_pattern());
        let outputs = self.inner.bindings.lock().devices.outputs.clone();
        for device in outputs.iter().flatten() {
            if let Err(err) = device.set_led(&status) {
                warn!("{} LED update failed: {}", self.inner.npad_id, err);
            }
        }
    }

    pub fn is_vibration_enabled(&self) -> bool {
        self.player()
            .map(|player| player.vibration_enabled)
            .unwrap_or(false)
    }

    // ---- connection, style, configuration ----

    /// Connect, refusing styles the service does not support
    pub fn connect(&self, use_temporary: bool) -> Result<(), ControllerError> {
        self.inner.with_state(|state| state.connect(use_temporary))
    }

    pub fn disconnect(&self) {
        self.inner.with_state(|state| state.disconnect());
    }

    pub fn is_connected(&self, use_temporary: bool) -> bool {
        self.inner.state.lock().state.connected(use_temporary)
    }

    pub fn npad_style_index(&self, use_temporary: bool) -> NpadStyleIndex {
        self.inner.state.lock().state.style(use_temporary)
    }

    pub fn set_npad_style_index(&self, style: NpadStyleIndex) {
        self.inner.with_state(|state| state.set_style(style));
    }

    /// Apply a new capability set, falling back or disconnecting as needed
    pub fn set_supported_npad_style_tag(&self, supported: NpadStyleTag) {
        self.inner
            .with_state(|state| state.set_supported_styles(supported));
    }

    pub fn is_controller_supported(&self, use_temporary: bool) -> bool {
        self.inner.state.lock().state.is_supported(use_temporary)
    }

    pub fn is_controller_fullkey(&self, use_temporary: bool) -> bool {
        self.inner.state.lock().state.is_fullkey(use_temporary)
    }

    /// Redirect connection and style changes into the shadow
    pub fn enable_configuration(&self) {
        self.inner.with_state(|state| state.enable_configuration());
    }

    /// Commit the shadow to the canonical state
    pub fn disable_configuration(&self) {
        self.inner.with_state(|state| state.disable_configuration());
    }

    pub fn is_configuring(&self) -> bool {
        self.inner.state.lock().state.is_configuring
    }

    // ---- subscribers ----

    /// Register a subscriber; the returned key removes it again
    pub fn set_callback(&self, callback: ControllerUpdateCallback) -> usize {
        self.inner.bus.register(callback)
    }

    /// Remove a subscriber
    ///
    /// Returns false for a key that is not registered; the bus logs it.
    pub fn delete_callback(&self, key: usize) -> bool {
        self.inner.bus.unregister(key).is_ok()
    }

    // ---- report ----

    pub fn led_pattern(&self) -> LedPattern {
        self.inner.npad_id.led_pattern()
    }

    /// Main buttons; empty while configuring
    pub fn npad_buttons(&self) -> NpadButtonState {
        let cell = self.inner.state.lock();
        if cell.state.is_configuring {
            return NpadButtonState::default();
        }
        cell.state.status.npad_button_state
    }

    pub fn debug_pad_buttons(&self) -> DebugPadButton {
        let cell = self.inner.state.lock();
        if cell.state.is_configuring {
            return DebugPadButton::default();
        }
        cell.state.status.debug_pad_button_state
    }

    /// Stick positions; centered while configuring
    ///
    /// Polls stick devices first, since sticks synthesized from buttons only
    /// produce values when asked.
    pub fn sticks(&self) -> AnalogSticks {
        if self.is_configuring() {
            return AnalogSticks::default();
        }
        for device in self.devices_of(InputKind::Stick) {
            device.soft_update();
        }
        let cell = self.inner.state.lock();
        if cell.state.is_configuring {
            return AnalogSticks::default();
        }
        cell.state.status.analog_stick_state
    }

    pub fn triggers(&self) -> NpadGcTriggerState {
        let cell = self.inner.state.lock();
        if cell.state.is_configuring {
            return NpadGcTriggerState::default();
        }
        cell.state.status.gc_trigger_state
    }

    /// Motion of both sensors, polling sources that asked for it
    pub fn motions(&self) -> MotionState {
        let force_update = self.inner.state.lock().state.force_update_motion;
        if force_update {
            for device in self.devices_of(InputKind::Motion) {
                device.force_update();
            }
        }
        self.inner.state.lock().state.status.motion_state
    }

    pub fn colors(&self) -> ControllerColors {
        self.inner.state.lock().state.status.colors_state
    }

    pub fn battery(&self) -> BatteryLevelState {
        self.inner.state.lock().state.status.battery_state
    }

    /// Full snapshot of the canonical report
    pub fn report(&self) -> ControllerReport {
        self.inner.state.lock().state.report()
    }

    fn devices_of(&self, kind: InputKind) -> Vec<Arc<dyn InputDevice>> {
        self.inner.bindings.lock().devices.devices_of(kind)
    }

    // ---- per-input values for mapping UIs (not gated by configuration) ----

    pub fn buttons_values(&self) -> [ButtonSlot; NativeButton::COUNT] {
        self.inner.state.lock().state.status.button_values
    }

    pub fn sticks_values(&self) -> [StickSlot; NativeAnalog::COUNT] {
        self.inner.state.lock().state.status.stick_values
    }

    pub fn triggers_values(&self) -> [TriggerSlot; TRIGGER_COUNT] {
        self.inner.state.lock().state.status.trigger_values
    }

    pub fn motion_values(&self) -> [MotionStatus; MOTION_COUNT] {
        let cell = self.inner.state.lock();
        [
            cell.state.status.motion_values[0].raw,
            cell.state.status.motion_values[1].raw,
        ]
    }

    pub fn battery_values(&self) -> [BatteryLevel; BATTERY_COUNT] {
        self.inner.state.lock().state.status.battery_values
    }
}

fn install_callback(weak: &Weak<Inner>, generation: u64, binding: &InputBinding) {
    let weak = weak.clone();
    let target = RawTarget {
        kind: binding.kind,
        index: binding.index,
        source: binding.source,
    };
    binding
        .device
        .set_callback(Some(Arc::new(move |status: &CallbackStatus| {
            if let Some(inner) = weak.upgrade() {
                inner.on_device_callback(generation, &target, status);
            }
        })));
}
