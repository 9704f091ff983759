//! Parameter table and the device bindings built from it
//!
//! The player's configured descriptors (buttons, sticks, motion) are the
//! source of truth. Trigger, battery and output descriptors are derived
//! from button descriptors, and a fixed set of TAS descriptors is added so
//! scripted playback can drive every button and stick.

use std::sync::Arc;

use tracing::debug;

use super::types::{
    NativeAnalog, NativeButton, NpadIdType, LEFT_INDEX, MOTION_COUNT, OUTPUT_COUNT, RIGHT_INDEX,
    TRIGGER_COUNT,
};
use crate::config::PlayerConfig;
use crate::input::device::{DeviceFactory, InputDevice, OutputDevice};
use crate::input::params::ParamPackage;
use crate::input::source_id::SourceId;

/// Engine name of scripted playback bindings
pub const TAS_ENGINE: &str = "tas";

/// Sticks synthesized from buttons are not a distinct physical device
const ANALOG_FROM_BUTTON_ENGINE: &str = "analog_from_button";

/// Battery cells that get a device binding (the dual cell never does)
const BOUND_BATTERY_COUNT: usize = 2;

/// Configured descriptors of one controller
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamTable {
    pub buttons: [ParamPackage; NativeButton::COUNT],
    pub sticks: [ParamPackage; NativeAnalog::COUNT],
    pub motions: [ParamPackage; MOTION_COUNT],
}

impl ParamTable {
    /// Parse the serialized descriptors of a player
    pub fn from_player(player: &PlayerConfig) -> Self {
        let mut table = Self::default();
        fill(&mut table.buttons, &player.buttons);
        fill(&mut table.sticks, &player.analogs);
        fill(&mut table.motions, &player.motions);
        table
    }

    /// Serialize the descriptors back into a player
    pub fn write_to(&self, player: &mut PlayerConfig) {
        player.buttons = self.buttons.iter().map(ParamPackage::serialize).collect();
        player.analogs = self.sticks.iter().map(ParamPackage::serialize).collect();
        player.motions = self.motions.iter().map(ParamPackage::serialize).collect();
    }

    /// Triggers reuse the ZL/ZR button descriptors
    pub fn trigger_params(&self) -> [ParamPackage; TRIGGER_COUNT] {
        [
            self.buttons[NativeButton::ZL.index()].clone(),
            self.buttons[NativeButton::ZR.index()].clone(),
        ]
    }

    /// Left/right physical halves, identified by DRight and A
    fn halves(&self) -> [ParamPackage; 2] {
        [
            self.buttons[NativeButton::DRight.index()].clone(),
            self.buttons[NativeButton::A.index()].clone(),
        ]
    }

    /// Battery channels of the left and right halves
    pub fn battery_params(&self) -> [ParamPackage; BOUND_BATTERY_COUNT] {
        self.halves().map(|mut params| {
            params.set_bool("battery", true);
            params
        })
    }

    /// Rumble/LED channels of the left and right halves
    pub fn output_params(&self) -> [ParamPackage; OUTPUT_COUNT] {
        self.halves().map(|mut params| {
            params.set_bool("output", true);
            params
        })
    }

    /// Distinct physical devices referenced by buttons and sticks
    ///
    /// Each entry carries only `engine`, `guid` and `port`.
    pub fn mapped_devices(&self) -> Vec<ParamPackage> {
        let mut devices: Vec<ParamPackage> = Vec::new();
        let sticks = self
            .sticks
            .iter()
            .filter(|params| params.engine() != ANALOG_FROM_BUTTON_ENGINE);

        for params in self.buttons.iter().chain(sticks) {
            if !params.has("engine") {
                continue;
            }
            let mut device = ParamPackage::new();
            device.set("engine", params.engine());
            device.set("guid", params.get_str("guid", ""));
            device.set("port", params.get_int("port", 0));
            if !devices.contains(&device) {
                devices.push(device);
            }
        }
        devices
    }
}

fn fill(target: &mut [ParamPackage], serialized: &[String]) {
    for (slot, text) in target.iter_mut().zip(serialized) {
        *slot = ParamPackage::parse(text);
    }
}

/// Fixed TAS descriptors for a player slot
///
/// Buttons use their table position as button number; the left stick reads
/// axes 0/1 and the right stick axes 2/3.
pub fn tas_params(
    npad_id: NpadIdType,
) -> (
    [ParamPackage; NativeButton::COUNT],
    [ParamPackage; NativeAnalog::COUNT],
) {
    let mut common = ParamPackage::new();
    common.set("engine", TAS_ENGINE);
    common.set("port", npad_id.index());

    let buttons = NativeButton::ALL.map(|button| {
        let mut params = common.clone();
        params.set("button", button.index());
        params
    });
    let sticks = NativeAnalog::ALL.map(|analog| {
        let base = analog as usize * 2;
        let mut params = common.clone();
        params.set("axis_x", base);
        params.set("axis_y", base + 1);
        params
    });
    (buttons, sticks)
}

/// Kind of raw callback a binding feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Button,
    Stick,
    Trigger,
    Motion,
    Battery,
}

/// One live input binding
#[derive(Clone)]
pub struct InputBinding {
    pub kind: InputKind,
    pub index: usize,
    pub source: SourceId,
    pub device: Arc<dyn InputDevice>,
    /// Ask the device for its current value right after binding
    pub force_update: bool,
}

/// Devices currently bound to a controller
#[derive(Default)]
pub struct DeviceSet {
    pub inputs: Vec<InputBinding>,
    pub outputs: [Option<Arc<dyn OutputDevice>>; OUTPUT_COUNT],
}

impl DeviceSet {
    /// Create every device the table describes
    ///
    /// Callbacks are not installed here.
    pub fn load(factory: &DeviceFactory, table: &ParamTable, npad_id: NpadIdType) -> Self {
        let mut set = Self::default();

        let mut add = |kind: InputKind, index: usize, params: &ParamPackage, source: SourceId, force_update: bool| {
            if let Some(device) = factory.create_input(params) {
                set.inputs.push(InputBinding {
                    kind,
                    index,
                    source,
                    device,
                    force_update,
                });
            }
        };
        let guid = |params: &ParamPackage| SourceId::from_guid(&params.get_str("guid", ""));

        for (index, params) in table.buttons.iter().enumerate() {
            add(InputKind::Button, index, params, guid(params), true);
        }
        for (index, params) in table.sticks.iter().enumerate() {
            add(InputKind::Stick, index, params, guid(params), true);
        }
        for (index, params) in table.trigger_params().iter().enumerate() {
            add(InputKind::Trigger, index, params, guid(params), true);
        }
        for (index, params) in table.battery_params().iter().enumerate() {
            add(InputKind::Battery, index, params, SourceId::NONE, true);
        }
        for (index, params) in table.motions.iter().enumerate() {
            add(InputKind::Motion, index, params, SourceId::NONE, true);
        }

        let (tas_buttons, tas_sticks) = tas_params(npad_id);
        for (index, params) in tas_buttons.iter().enumerate() {
            add(InputKind::Button, index, params, SourceId::TAS, false);
        }
        for (index, params) in tas_sticks.iter().enumerate() {
            add(InputKind::Stick, index, params, SourceId::TAS, false);
        }

        let outputs = table.output_params();
        set.outputs[LEFT_INDEX] = factory.create_output(&outputs[LEFT_INDEX]);
        set.outputs[RIGHT_INDEX] = factory.create_output(&outputs[RIGHT_INDEX]);

        debug!(
            "{}: bound {} input(s), {} output(s)",
            npad_id,
            set.inputs.len(),
            set.outputs.iter().flatten().count()
        );
        set
    }

    /// Remove every callback
    pub fn unbind(&self) {
        for binding in &self.inputs {
            binding.device.set_callback(None);
        }
    }

    /// Devices of one kind, for polling
    pub fn devices_of(&self, kind: InputKind) -> Vec<Arc<dyn InputDevice>> {
        self.inputs
            .iter()
            .filter(|binding| binding.kind == kind && binding.source != SourceId::TAS)
            .map(|binding| binding.device.clone())
            .collect()
    }
}
