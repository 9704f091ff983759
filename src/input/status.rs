//! Raw callback payloads emitted by device bindings
//!
//! These are the untyped-ish signals a physical source hands to the
//! controller before normalization. The conversion functions in
//! [`super::convert`] turn them into the typed values the canonical state
//! stores.

use serde::{Deserialize, Serialize};

/// Per-axis calibration carried along with an analog value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogProperties {
    /// Values with magnitude at or below this are reported as zero
    pub deadzone: f32,
    /// Full-scale magnitude of the raw signal
    pub range: f32,
    /// Digital threshold for "pressed" / direction overlays
    pub threshold: f32,
    /// Center offset subtracted from the raw value
    pub offset: f32,
    pub inverted: bool,
    pub toggle: bool,
}

impl Default for AnalogProperties {
    fn default() -> Self {
        Self {
            deadzone: 0.0,
            range: 1.0,
            threshold: 0.5,
            offset: 0.0,
            inverted: false,
            toggle: false,
        }
    }
}

/// One analog channel: raw reading plus its sanitized value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalogStatus {
    pub value: f32,
    pub raw_value: f32,
    pub properties: AnalogProperties,
}

impl AnalogStatus {
    /// Build a status from a raw reading with default calibration
    pub fn from_raw(raw_value: f32) -> Self {
        Self {
            raw_value,
            ..Default::default()
        }
    }
}

/// Digital button reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonStatus {
    pub value: bool,
    pub inverted: bool,
    /// Latch the logical value on each press instead of mirroring it
    pub toggle: bool,
    /// Set while a toggled press is held; cleared on release
    pub locked: bool,
}

impl ButtonStatus {
    pub fn pressed(value: bool) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }
}

/// Two-axis stick reading with its four-way digital overlay
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StickStatus {
    pub x: AnalogStatus,
    pub y: AnalogStatus,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl StickStatus {
    /// Build a stick reading from raw axis values with default calibration
    pub fn from_raw(x: f32, y: f32) -> Self {
        Self {
            x: AnalogStatus::from_raw(x),
            y: AnalogStatus::from_raw(y),
            ..Default::default()
        }
    }

    /// Whether any digital direction is held past its threshold
    pub fn any_direction(&self) -> bool {
        self.left || self.right || self.up || self.down
    }
}

/// Analog trigger reading with its digital "pressed" overlay
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerStatus {
    pub analog: AnalogStatus,
    pub pressed: ButtonStatus,
}

/// Three-axis sensor reading
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSensor {
    pub x: AnalogStatus,
    pub y: AnalogStatus,
    pub z: AnalogStatus,
}

impl MotionSensor {
    pub fn from_raw(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: AnalogStatus::from_raw(x),
            y: AnalogStatus::from_raw(y),
            z: AnalogStatus::from_raw(z),
        }
    }
}

/// Raw motion sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionStatus {
    /// Angular velocity in revolutions per second
    pub gyro: MotionSensor,
    /// Acceleration in g
    pub accel: MotionSensor,
    /// Time since the previous sample in microseconds
    pub delta_timestamp: u64,
    /// The source needs to be polled on every read to stay live
    pub force_update: bool,
}

/// Battery telemetry as reported by a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryLevel {
    /// No telemetry available
    #[default]
    None,
    Empty,
    Critical,
    Low,
    Medium,
    Full,
    Charging,
}

/// Payload of a raw device callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallbackStatus {
    Button(ButtonStatus),
    Analog(AnalogStatus),
    Stick(StickStatus),
    Trigger(TriggerStatus),
    Motion(MotionStatus),
    Battery(BatteryLevel),
}

impl CallbackStatus {
    /// Short name of the payload kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackStatus::Button(_) => "button",
            CallbackStatus::Analog(_) => "analog",
            CallbackStatus::Stick(_) => "stick",
            CallbackStatus::Trigger(_) => "trigger",
            CallbackStatus::Motion(_) => "motion",
            CallbackStatus::Battery(_) => "battery",
        }
    }
}

/// Amplification curve applied by the output device to vibration amplitudes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VibrationAmplificationType {
    Linear,
    Exponential,
}

/// Vibration command sent to an output device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VibrationStatus {
    pub low_amplitude: f32,
    pub low_frequency: f32,
    pub high_amplitude: f32,
    pub high_frequency: f32,
    pub amplification: VibrationAmplificationType,
}

/// Player LED command sent to an output device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedStatus {
    pub led_1: bool,
    pub led_2: bool,
    pub led_3: bool,
    pub led_4: bool,
}
