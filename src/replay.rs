//! Scripted replay against a controller bound to the virtual engine
//!
//! A script is a YAML list of steps. Input steps push raw statuses into the
//! virtual devices matching a parameter selector, exactly as a physical
//! backend would; command steps call the controller directly. After each
//! step the canonical report and the notifications it produced are
//! captured.
//!
//! ```yaml
//! player: 1
//! steps:
//!   - action: button
//!     selector: "button:0"
//!     pressed: true
//!   - action: stick
//!     selector: "axis_x:0"
//!     x: 1.0
//!     y: 0.0
//!   - action: configure
//!     enabled: true
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{ConfigRepository, ControllerType, PlayerConfig};
use crate::controller::bindings::TAS_ENGINE;
use crate::controller::notify::ControllerUpdateCallback;
use crate::controller::state::ControllerReport;
use crate::controller::types::{
    ControllerTriggerType, NativeAnalog, NativeButton, NpadIdType, NpadStyleTag, VibrationValue,
    MOTION_COUNT,
};
use crate::controller::EmulatedController;
use crate::input::device::DeviceFactory;
use crate::input::engine::VirtualEngine;
use crate::input::status::{
    AnalogStatus, BatteryLevel, ButtonStatus, CallbackStatus, MotionSensor, MotionStatus,
    StickStatus,
};

/// Device guid used by [`virtual_profile`]
pub const REPLAY_GUID: &str = "00000000000000000000000000000001";

/// One scripted action
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Button {
        selector: String,
        pressed: bool,
        #[serde(default)]
        toggle: bool,
    },
    Stick {
        selector: String,
        x: f32,
        y: f32,
    },
    Trigger {
        selector: String,
        value: f32,
    },
    Motion {
        selector: String,
        #[serde(default)]
        accel: [f32; 3],
        #[serde(default)]
        gyro: [f32; 3],
        #[serde(default = "default_delta_us")]
        delta_us: u64,
    },
    Battery {
        selector: String,
        level: BatteryLevel,
    },
    Connect {
        #[serde(default)]
        temporary: bool,
    },
    Disconnect,
    SetStyle {
        style: ControllerType,
    },
    SupportedStyles {
        styles: Vec<ControllerType>,
    },
    Configure {
        enabled: bool,
    },
    Vibrate {
        index: usize,
        amplitude: f32,
    },
    TestVibration {
        index: usize,
    },
}

fn default_delta_us() -> u64 {
    5000
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Button { .. } => "button",
            Step::Stick { .. } => "stick",
            Step::Trigger { .. } => "trigger",
            Step::Motion { .. } => "motion",
            Step::Battery { .. } => "battery",
            Step::Connect { .. } => "connect",
            Step::Disconnect => "disconnect",
            Step::SetStyle { .. } => "set_style",
            Step::SupportedStyles { .. } => "supported_styles",
            Step::Configure { .. } => "configure",
            Step::Vibrate { .. } => "vibrate",
            Step::TestVibration { .. } => "test_vibration",
        }
    }
}

/// A replay script
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Script {
    /// Player number (1-8); the command line may override it
    #[serde(default)]
    pub player: Option<usize>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Failed to parse replay script")
    }

    pub async fn load(path: &str) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read replay script: {}", path))?;
        Self::from_yaml(&contents).with_context(|| format!("Invalid replay script: {}", path))
    }
}

/// What a step did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: &'static str,
    /// Devices reached (input steps) or whether the command succeeded
    pub delivered: usize,
    pub notifications: Vec<ControllerTriggerType>,
    pub report: ControllerReport,
}

/// Player profile with every input bound to the virtual engine
///
/// Button `n` reads `button:n`; the left stick reads axes 0/1 and the right
/// stick axes 2/3; motion `n` reads `motion:n`.
pub fn virtual_profile() -> PlayerConfig {
    let device = format!("engine:virtual,guid:{},port:0", REPLAY_GUID);
    PlayerConfig {
        connected: true,
        buttons: NativeButton::ALL
            .iter()
            .map(|button| format!("{},button:{}", device, button.index()))
            .collect(),
        analogs: NativeAnalog::ALL
            .iter()
            .map(|analog| {
                let base = *analog as usize * 2;
                format!("{},axis_x:{},axis_y:{}", device, base, base + 1)
            })
            .collect(),
        motions: (0..MOTION_COUNT)
            .map(|index| format!("{},motion:{}", device, index))
            .collect(),
        ..PlayerConfig::default()
    }
}

/// A controller wired to in-process engines
pub struct Replay {
    controller: EmulatedController,
    engines: Vec<Arc<VirtualEngine>>,
    seen: Arc<Mutex<Vec<ControllerTriggerType>>>,
    callback_key: usize,
}

impl Replay {
    /// Bind `npad_id` to the virtual and TAS engines and load its settings
    pub fn new(npad_id: NpadIdType, repository: Arc<dyn ConfigRepository>) -> Result<Self> {
        let engines = vec![
            Arc::new(VirtualEngine::new()),
            Arc::new(VirtualEngine::named(TAS_ENGINE)),
        ];
        let factory = Arc::new(DeviceFactory::new());
        for engine in &engines {
            factory.register(engine.clone());
        }

        let controller = EmulatedController::new(npad_id, repository, factory);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback_key = controller.set_callback(ControllerUpdateCallback::new(move |kind| {
            sink.lock().push(kind);
        }));
        controller
            .reload_from_settings()
            .with_context(|| format!("Failed to load settings of {}", npad_id))?;
        seen.lock().clear();

        Ok(Self {
            controller,
            engines,
            seen,
            callback_key,
        })
    }

    pub fn controller(&self) -> &EmulatedController {
        &self.controller
    }

    /// Run every step, collecting a report after each
    pub fn run(&self, script: &Script) -> Vec<StepReport> {
        script
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.apply(index, step))
            .collect()
    }

    /// Run one step
    pub fn apply(&self, index: usize, step: &Step) -> StepReport {
        let delivered = match step {
            Step::Button {
                selector,
                pressed,
                toggle,
            } => self.emit(
                selector,
                false,
                CallbackStatus::Button(ButtonStatus {
                    value: *pressed,
                    toggle: *toggle,
                    ..Default::default()
                }),
            ),
            Step::Stick { selector, x, y } => {
                self.emit(selector, false, CallbackStatus::Stick(StickStatus::from_raw(*x, *y)))
            }
            Step::Trigger { selector, value } => {
                self.emit(selector, false, CallbackStatus::Analog(AnalogStatus::from_raw(*value)))
            }
            Step::Motion {
                selector,
                accel,
                gyro,
                delta_us,
            } => self.emit(
                selector,
                false,
                CallbackStatus::Motion(MotionStatus {
                    accel: MotionSensor::from_raw(accel[0], accel[1], accel[2]),
                    gyro: MotionSensor::from_raw(gyro[0], gyro[1], gyro[2]),
                    delta_timestamp: *delta_us,
                    force_update: false,
                }),
            ),
            Step::Battery { selector, level } => {
                self.emit(selector, true, CallbackStatus::Battery(*level))
            }
            Step::Connect { temporary } => match self.controller.connect(*temporary) {
                Ok(()) => 1,
                Err(err) => {
                    warn!("Step {}: connect refused: {}", index, err);
                    0
                }
            },
            Step::Disconnect => {
                self.controller.disconnect();
                1
            }
            Step::SetStyle { style } => {
                self.controller.set_npad_style_index((*style).into());
                1
            }
            Step::SupportedStyles { styles } => {
                let tag = styles
                    .iter()
                    .fold(0, |raw, style| raw | NpadStyleTag::for_style((*style).into()));
                self.controller
                    .set_supported_npad_style_tag(NpadStyleTag::from_raw(tag));
                1
            }
            Step::Configure { enabled } => {
                if *enabled {
                    self.controller.enable_configuration();
                } else {
                    self.controller.disable_configuration();
                }
                1
            }
            Step::Vibrate { index: output, amplitude } => {
                let value = VibrationValue {
                    low_amplitude: *amplitude,
                    high_amplitude: *amplitude,
                    ..VibrationValue::DEFAULT
                };
                usize::from(self.controller.set_vibration(*output, value))
            }
            Step::TestVibration { index: output } => {
                usize::from(self.controller.test_vibration(*output))
            }
        };

        let notifications = std::mem::take(&mut *self.seen.lock());
        debug!(
            "Step {} ({}) delivered {}, {} notification(s)",
            index,
            step.name(),
            delivered,
            notifications.len()
        );
        StepReport {
            step: index,
            action: step.name(),
            delivered,
            notifications,
            report: self.controller.report(),
        }
    }

    /// Push `status` into matching devices
    ///
    /// Battery channels share their descriptor with a button, so they are
    /// reached only when `battery` is asked for.
    fn emit(&self, selector: &str, battery: bool, status: CallbackStatus) -> usize {
        self.engines
            .iter()
            .flat_map(|engine| engine.inputs(selector))
            .filter(|device| device.params().has("battery") == battery)
            .filter(|device| device.emit(status))
            .count()
    }

    /// Recorded vibration commands of output channels matching `selector`
    pub fn vibrations(&self, selector: &str) -> usize {
        self.engines
            .iter()
            .flat_map(|engine| engine.outputs(selector))
            .map(|device| device.vibrations().len())
            .sum()
    }
}

impl Drop for Replay {
    fn drop(&mut self) {
        if !self.controller.delete_callback(self.callback_key) {
            debug!("Replay callback {} already removed", self.callback_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, MemoryRepository};
    use crate::controller::types::npad_button;

    fn replay() -> Replay {
        let mut config = AppConfig::default();
        config.players.push(virtual_profile());
        let repository = Arc::new(MemoryRepository::new(config));
        Replay::new(NpadIdType::Player1, repository).expect("replay")
    }

    #[test]
    fn test_script_parsing() {
        let script = Script::from_yaml(
            r#"
player: 2
steps:
  - action: button
    selector: "button:0"
    pressed: true
  - action: disconnect
  - action: set_style
    style: game_cube
  - action: battery
    selector: "button:0"
    level: charging
"#,
        )
        .expect("valid script");
        assert_eq!(script.player, Some(2));
        assert_eq!(script.steps.len(), 4);
        assert_eq!(
            script.steps[0],
            Step::Button {
                selector: "button:0".into(),
                pressed: true,
                toggle: false
            }
        );
        assert_eq!(
            script.steps[2],
            Step::SetStyle {
                style: ControllerType::GameCube
            }
        );
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(Script::from_yaml("steps:\n  - action: explode\n").is_err());
    }

    #[test]
    fn test_button_press_and_release() {
        let replay = replay();
        let pressed = replay.apply(
            0,
            &Step::Button {
                selector: "engine:virtual,button:0".into(),
                pressed: true,
                toggle: false,
            },
        );
        assert_eq!(pressed.delivered, 1);
        assert_eq!(pressed.notifications, vec![ControllerTriggerType::Button]);
        assert_eq!(pressed.report.buttons & npad_button::A, npad_button::A);

        let released = replay.apply(
            1,
            &Step::Button {
                selector: "engine:virtual,button:0".into(),
                pressed: false,
                toggle: false,
            },
        );
        assert_eq!(released.report.buttons, 0);
    }

    #[test]
    fn test_tas_source_takes_over() {
        let replay = replay();
        let steps = [
            Step::Button {
                selector: "engine:virtual,button:0".into(),
                pressed: true,
                toggle: false,
            },
            Step::Button {
                selector: "engine:tas,button:0".into(),
                pressed: true,
                toggle: false,
            },
            // The virtual device no longer owns the button
            Step::Button {
                selector: "engine:virtual,button:0".into(),
                pressed: false,
                toggle: false,
            },
        ];
        let reports: Vec<_> = steps
            .iter()
            .enumerate()
            .map(|(index, step)| replay.apply(index, step))
            .collect();
        assert_eq!(reports[1].delivered, 1);
        assert!(reports[2].notifications.is_empty());
        assert_eq!(reports[2].report.buttons & npad_button::A, npad_button::A);
    }

    #[test]
    fn test_stick_and_battery_steps() {
        let replay = replay();
        let stick = replay.apply(
            0,
            &Step::Stick {
                selector: "engine:virtual,axis_x:0".into(),
                x: -1.0,
                y: 0.0,
            },
        );
        assert_eq!(stick.report.sticks.left.x, -32767);

        let battery = replay.apply(
            1,
            &Step::Battery {
                selector: "button:0".into(),
                level: BatteryLevel::Low,
            },
        );
        assert_eq!(battery.delivered, 1);
        assert_eq!(battery.report.battery.right.battery_level, 4);
    }

    #[test]
    fn test_vibration_steps() {
        let replay = replay();
        let report = replay.apply(0, &Step::TestVibration { index: 1 });
        assert_eq!(report.delivered, 1);
        assert_eq!(replay.vibrations("output:1,button:0"), 2);
    }

    #[test]
    fn test_unsupported_style_refuses_connect() {
        let replay = replay();
        let script = Script {
            player: None,
            steps: vec![
                Step::SupportedStyles {
                    styles: vec![ControllerType::Handheld],
                },
                Step::Connect { temporary: false },
            ],
        };
        let reports = replay.run(&script);
        assert!(!reports[0].report.connected);
        assert_eq!(reports[1].delivered, 0);
    }
}
