//! Canonical controller state and its configuration shadow
//!
//! Everything in here runs under the controller's state lock. Mutators do
//! not call subscribers; they queue [`Notification`]s that the controller
//! drains with [`ControllerState::take_pending`] and delivers after the lock
//! is released.

use serde::Serialize;
use tracing::{debug, error, warn};

use super::arbitration::{ButtonSlot, StickSlot, TriggerSlot, Update};
use super::notify::Notification;
use super::style::{negotiate, Negotiation};
use super::types::*;
use crate::error::ControllerError;
use crate::input::convert::{
    scale_to_fixed, transform_to_battery, transform_to_button, transform_to_motion,
    transform_to_stick, transform_to_trigger, HID_JOYSTICK_MAX, HID_TRIGGER_MAX,
};
use crate::input::motion::{MotionInput, Vec3};
use crate::input::source_id::SourceId;
use crate::input::status::{BatteryLevel, CallbackStatus, MotionStatus};

/// Raw sample and integrator of one motion input
#[derive(Debug, Clone, Default)]
pub struct MotionSlot {
    pub raw: MotionStatus,
    pub emulated: MotionInput,
}

/// Per-input values and the aggregated report fields
#[derive(Debug, Clone, Default)]
pub struct ControllerStatus {
    pub button_values: [ButtonSlot; NativeButton::COUNT],
    pub stick_values: [StickSlot; NativeAnalog::COUNT],
    pub trigger_values: [TriggerSlot; TRIGGER_COUNT],
    pub motion_values: [MotionSlot; MOTION_COUNT],
    pub battery_values: [BatteryLevel; BATTERY_COUNT],

    pub npad_button_state: NpadButtonState,
    pub debug_pad_button_state: DebugPadButton,
    pub analog_stick_state: AnalogSticks,
    pub gc_trigger_state: NpadGcTriggerState,
    pub motion_state: MotionState,
    pub battery_state: BatteryLevelState,
    pub colors_state: ControllerColors,
}

/// Values redirected while a mapping UI previews changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowState {
    pub is_connected: bool,
    pub npad_type: NpadStyleIndex,
}

/// Map a battery level to its report form
///
/// Sources without telemetry read as full and powered.
pub fn power_info(level: BatteryLevel) -> NpadPowerInfo {
    let (battery_level, is_charging, is_powered) = match level {
        BatteryLevel::Charging => (6, true, true),
        BatteryLevel::Medium => (6, false, false),
        BatteryLevel::Low => (4, false, false),
        BatteryLevel::Critical => (2, false, false),
        BatteryLevel::Empty => (0, false, false),
        BatteryLevel::None | BatteryLevel::Full => (8, false, true),
    };
    NpadPowerInfo {
        is_powered,
        is_charging,
        battery_level,
    }
}

/// Everything guarded by the controller's state lock
#[derive(Debug)]
pub struct ControllerState {
    pub npad_id: NpadIdType,
    pub status: ControllerStatus,
    pub is_connected: bool,
    pub npad_type: NpadStyleIndex,
    pub is_configuring: bool,
    pub shadow: ShadowState,
    pub supported_style_tag: NpadStyleTag,
    /// The last motion sample asked to be polled on every read
    pub force_update_motion: bool,
    pub motion_sensitivity: f32,
    pending: Vec<Notification>,
}

impl ControllerState {
    pub fn new(npad_id: NpadIdType) -> Self {
        Self {
            npad_id,
            status: ControllerStatus::default(),
            is_connected: false,
            npad_type: NpadStyleIndex::None,
            is_configuring: false,
            shadow: ShadowState::default(),
            supported_style_tag: NpadStyleTag::all(),
            force_update_motion: false,
            motion_sensitivity: 0.01,
            pending: Vec::new(),
        }
    }

    /// Drain queued notifications
    pub fn take_pending(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }

    fn emit(&mut self, kind: ControllerTriggerType) {
        let notification = if self.is_configuring {
            Notification::preview(kind)
        } else {
            Notification::service(kind)
        };
        self.pending.push(notification);
    }

    // ---- raw input ----

    pub fn apply_button(&mut self, index: usize, callback: &CallbackStatus, source: SourceId) {
        let Some(button) = NativeButton::from_index(index) else {
            return;
        };
        let reading = transform_to_button(callback);
        let slot = &mut self.status.button_values[index];
        if slot.offer(reading, source) != Update::Changed {
            return;
        }
        let value = slot.status.value;

        if self.is_configuring {
            self.status.npad_button_state = NpadButtonState::default();
            self.status.debug_pad_button_state = DebugPadButton::default();
            self.emit(ControllerTriggerType::Button);
            return;
        }

        let (npad_bits, debug_bits) = button.report_bits();
        self.status.npad_button_state.assign(npad_bits, value);
        self.status.debug_pad_button_state.assign(debug_bits, value);

        if !self.is_connected && self.wants_auto_connect() {
            if let Err(err) = self.connect(false) {
                debug!("Auto-connect of {} failed: {}", self.npad_id, err);
            }
        }
        self.emit(ControllerTriggerType::Button);
    }

    /// Player 1 wakes up on any button unless it is docked as handheld, and
    /// the handheld slot wakes up only as handheld
    fn wants_auto_connect(&self) -> bool {
        match self.npad_id {
            NpadIdType::Player1 => self.npad_type != NpadStyleIndex::Handheld,
            NpadIdType::Handheld => self.npad_type == NpadStyleIndex::Handheld,
            _ => false,
        }
    }

    pub fn apply_stick(&mut self, index: usize, callback: &CallbackStatus, source: SourceId) {
        let Some(analog) = NativeAnalog::from_index(index) else {
            return;
        };
        let reading = transform_to_stick(callback);
        let slot = &mut self.status.stick_values[index];
        if slot.offer(reading, source) == Update::Rejected {
            return;
        }
        let stick = slot.status;

        if self.is_configuring {
            self.status.analog_stick_state = AnalogSticks::default();
            self.emit(ControllerTriggerType::Stick);
            return;
        }

        let position = AnalogStickState {
            x: scale_to_fixed(stick.x.value, HID_JOYSTICK_MAX),
            y: scale_to_fixed(stick.y.value, HID_JOYSTICK_MAX),
        };
        match analog {
            NativeAnalog::LStick => self.status.analog_stick_state.left = position,
            NativeAnalog::RStick => self.status.analog_stick_state.right = position,
        }

        let [left, up, right, down] = analog.direction_bits();
        let buttons = &mut self.status.npad_button_state;
        buttons.assign(left, stick.left);
        buttons.assign(up, stick.up);
        buttons.assign(right, stick.right);
        buttons.assign(down, stick.down);

        self.emit(ControllerTriggerType::Stick);
    }

    pub fn apply_trigger(&mut self, index: usize, callback: &CallbackStatus, source: SourceId) {
        if index >= TRIGGER_COUNT {
            return;
        }
        let reading = transform_to_trigger(callback);
        let slot = &mut self.status.trigger_values[index];
        if slot.offer(reading, source) == Update::Rejected {
            return;
        }
        let trigger = slot.status;

        if self.is_configuring {
            self.status.gc_trigger_state = NpadGcTriggerState::default();
            self.emit(ControllerTriggerType::Trigger);
            return;
        }

        let position = scale_to_fixed(trigger.analog.value, HID_TRIGGER_MAX);
        if index == LEFT_INDEX {
            self.status.gc_trigger_state.left = position;
            self.status
                .npad_button_state
                .assign(npad_button::ZL, trigger.pressed.value);
        } else {
            self.status.gc_trigger_state.right = position;
            self.status
                .npad_button_state
                .assign(npad_button::ZR, trigger.pressed.value);
        }

        self.emit(ControllerTriggerType::Trigger);
    }

    /// Motion has a single source per input, so there is no arbitration
    pub fn apply_motion(&mut self, index: usize, callback: &CallbackStatus) {
        if index >= MOTION_COUNT {
            return;
        }
        let raw = transform_to_motion(callback);
        let slot = &mut self.status.motion_values[index];
        slot.raw = raw;

        let emulated = &mut slot.emulated;
        emulated.set_acceleration(Vec3::new(raw.accel.x.value, raw.accel.y.value, raw.accel.z.value));
        emulated.set_gyroscope(Vec3::new(raw.gyro.x.value, raw.gyro.y.value, raw.gyro.z.value));
        emulated.update_rotation(raw.delta_timestamp);
        emulated.update_orientation(raw.delta_timestamp);
        self.force_update_motion = raw.force_update;

        if self.is_configuring {
            self.emit(ControllerTriggerType::Motion);
            return;
        }

        let emulated = &self.status.motion_values[index].emulated;
        self.status.motion_state[index] = ControllerMotion {
            accel: emulated.acceleration(),
            gyro: emulated.gyroscope(),
            rotation: emulated.rotations(),
            orientation: emulated.orientation(),
            is_at_rest: !emulated.is_moving(self.motion_sensitivity),
        };

        self.emit(ControllerTriggerType::Motion);
    }

    pub fn apply_battery(&mut self, index: usize, callback: &CallbackStatus) {
        if index >= BATTERY_COUNT {
            return;
        }
        let level = transform_to_battery(callback);
        self.status.battery_values[index] = level;

        if self.is_configuring {
            self.emit(ControllerTriggerType::Battery);
            return;
        }

        let info = power_info(level);
        match index {
            LEFT_INDEX => self.status.battery_state.left = info,
            RIGHT_INDEX => self.status.battery_state.right = info,
            _ => self.status.battery_state.dual = info,
        }
        self.emit(ControllerTriggerType::Battery);
    }

    pub fn set_colors(&mut self, colors: ControllerColors) {
        if self.status.colors_state == colors {
            return;
        }
        self.status.colors_state = colors;
        self.emit(ControllerTriggerType::Color);
    }

    // ---- connection and style ----

    /// Style in effect, the shadow one when asked for while configuring
    pub fn style(&self, use_temporary: bool) -> NpadStyleIndex {
        if use_temporary && self.is_configuring {
            self.shadow.npad_type
        } else {
            self.npad_type
        }
    }

    pub fn connected(&self, use_temporary: bool) -> bool {
        if use_temporary && self.is_configuring {
            self.shadow.is_connected
        } else {
            self.is_connected
        }
    }

    pub fn is_supported(&self, use_temporary: bool) -> bool {
        self.supported_style_tag.supports(self.style(use_temporary))
    }

    pub fn is_fullkey(&self, use_temporary: bool) -> bool {
        self.style(use_temporary).is_fullkey_family()
    }

    /// Connect, refusing styles outside the capability set
    pub fn connect(&mut self, use_temporary: bool) -> Result<(), ControllerError> {
        if !self.is_supported(use_temporary) {
            let style = self.style(use_temporary);
            error!("Controller type {:?} is not supported", style);
            return Err(ControllerError::UnsupportedStyle(style));
        }

        if self.is_configuring {
            self.shadow.is_connected = true;
            self.emit(ControllerTriggerType::Connected);
            return Ok(());
        }

        if self.is_connected {
            return Ok(());
        }
        self.is_connected = true;
        self.emit(ControllerTriggerType::Connected);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.is_configuring {
            self.shadow.is_connected = false;
            self.emit(ControllerTriggerType::Disconnected);
            return;
        }

        if !self.is_connected {
            return;
        }
        self.is_connected = false;
        self.emit(ControllerTriggerType::Disconnected);
    }

    pub fn set_style(&mut self, style: NpadStyleIndex) {
        if self.is_configuring {
            if self.shadow.npad_type == style {
                return;
            }
            self.shadow.npad_type = style;
            self.emit(ControllerTriggerType::Type);
            return;
        }

        if self.npad_type == style {
            return;
        }
        if self.is_connected {
            warn!("Controller {} type changed while it's connected", self.npad_id);
        }
        self.npad_type = style;
        self.emit(ControllerTriggerType::Type);
    }

    /// Update the capability set and renegotiate a connected controller
    pub fn set_supported_styles(&mut self, supported: NpadStyleTag) {
        self.supported_style_tag = supported;
        if !self.is_connected {
            return;
        }

        match negotiate(self.npad_type, supported) {
            Negotiation::Keep => {}
            Negotiation::FallbackToPro => {
                self.disconnect();
                warn!("Reconnecting controller type {:?} as Pro controller", self.npad_type);
                self.set_style(NpadStyleIndex::ProController);
                if let Err(err) = self.connect(false) {
                    debug!("Pro controller fallback failed: {}", err);
                }
            }
            Negotiation::Unsupported => {
                self.disconnect();
                error!(
                    "Controller type {:?} is not supported. Disconnecting controller",
                    self.npad_type
                );
            }
        }
    }

    // ---- configuration shadow ----

    pub fn enable_configuration(&mut self) {
        self.is_configuring = true;
        self.shadow = ShadowState {
            is_connected: self.is_connected,
            npad_type: self.npad_type,
        };
        debug!("{} entered configuration", self.npad_id);
    }

    /// Commit the shadow: style first (disconnecting if needed), then the
    /// connection flag
    pub fn disable_configuration(&mut self) {
        self.is_configuring = false;
        debug!("{} left configuration", self.npad_id);

        if self.shadow.npad_type != self.npad_type {
            if self.is_connected {
                self.disconnect();
            }
            self.set_style(self.shadow.npad_type);
        }

        if self.shadow.is_connected != self.is_connected {
            if self.shadow.is_connected {
                if let Err(err) = self.connect(false) {
                    debug!("Configured controller left disconnected: {}", err);
                }
            } else {
                self.disconnect();
            }
        }
    }

    // ---- report ----

    /// Aggregated report as the input service sees it
    pub fn report(&self) -> ControllerReport {
        let gated = self.is_configuring;
        ControllerReport {
            npad_id: self.npad_id,
            style: self.npad_type,
            connected: self.is_connected,
            configuring: self.is_configuring,
            buttons: if gated {
                0
            } else {
                self.status.npad_button_state.raw()
            },
            debug_pad: if gated {
                0
            } else {
                self.status.debug_pad_button_state.raw()
            },
            sticks: if gated {
                AnalogSticks::default()
            } else {
                self.status.analog_stick_state
            },
            triggers: if gated {
                NpadGcTriggerState::default()
            } else {
                self.status.gc_trigger_state
            },
            motion: self.status.motion_state,
            battery: self.status.battery_state,
            colors: self.status.colors_state,
            led_pattern: self.npad_id.led_pattern(),
        }
    }
}

/// Serializable snapshot of the canonical report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerReport {
    pub npad_id: NpadIdType,
    pub style: NpadStyleIndex,
    pub connected: bool,
    pub configuring: bool,
    pub buttons: u64,
    pub debug_pad: u32,
    pub sticks: AnalogSticks,
    pub triggers: NpadGcTriggerState,
    pub motion: MotionState,
    pub battery: BatteryLevelState,
    pub colors: ControllerColors,
    pub led_pattern: LedPattern,
}
