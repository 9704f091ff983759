//! End-to-end behavior of the emulated controller through its public API

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use npad_core::controller::types::{npad_button, NativeButton, VibrationValue, RIGHT_INDEX};
use npad_core::input::device::InputCallback;
use npad_core::input::engine::VirtualEngine;
use npad_core::input::status::{ButtonStatus, CallbackStatus, LedStatus, StickStatus, VibrationStatus};
use npad_core::replay::virtual_profile;
use npad_core::{
    AppConfig, ConfigRepository, ControllerError, ControllerTriggerType, ControllerUpdateCallback,
    DeviceFactory, EmulatedController, InputDevice, InputEngine, MemoryRepository, NpadIdType,
    NpadStyleIndex, OutputDevice, ParamPackage, SourceId,
};

fn repository() -> Arc<MemoryRepository> {
    Arc::new(MemoryRepository::new(AppConfig::default()))
}

fn bind_a(repository: &MemoryRepository, npad_id: NpadIdType, descriptor: &str) {
    let mut player = repository.player(npad_id.index()).expect("slot");
    player.connected = true;
    player.buttons[NativeButton::A.index()] = descriptor.to_string();
    repository.set_player(npad_id.index(), player).expect("set");
}

fn press(value: bool) -> CallbackStatus {
    CallbackStatus::Button(ButtonStatus::pressed(value))
}

fn toggle(value: bool) -> CallbackStatus {
    CallbackStatus::Button(ButtonStatus {
        value,
        toggle: true,
        ..Default::default()
    })
}

fn record(controller: &EmulatedController, service: bool) -> Arc<Mutex<Vec<ControllerTriggerType>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let on_change = move |kind: ControllerTriggerType| sink.lock().push(kind);
    let callback = if service {
        ControllerUpdateCallback::npad_service(on_change)
    } else {
        ControllerUpdateCallback::new(on_change)
    };
    controller.set_callback(callback);
    seen
}

/// Engine whose devices never forget a callback, so stale ones can be replayed
#[derive(Default)]
struct LeakyEngine {
    callbacks: Mutex<Vec<InputCallback>>,
}

struct LeakyDevice {
    engine: Arc<LeakyEngine>,
}

impl InputDevice for LeakyDevice {
    fn set_callback(&self, callback: Option<InputCallback>) {
        if let Some(callback) = callback {
            self.engine.callbacks.lock().push(callback);
        }
    }
}

struct LeakyFactory(Arc<LeakyEngine>);

impl InputEngine for LeakyFactory {
    fn name(&self) -> &str {
        "leaky"
    }

    fn create_input(&self, params: &ParamPackage) -> Option<Arc<dyn InputDevice>> {
        // Only the A button, not its derived battery channel
        if params.has("battery") {
            return None;
        }
        Some(Arc::new(LeakyDevice {
            engine: self.0.clone(),
        }))
    }
}

#[test]
fn test_press_release_round_trip() {
    let controller = EmulatedController::new(NpadIdType::Player3, repository(), Arc::new(DeviceFactory::new()));
    let seen = record(&controller, true);
    let source = SourceId::from_guid("0a");

    let before = controller.npad_buttons();
    controller.set_button(&press(true), NativeButton::X.index(), source);
    controller.set_button(&press(false), NativeButton::X.index(), source);

    assert_eq!(*seen.lock(), vec![ControllerTriggerType::Button; 2]);
    assert_eq!(controller.npad_buttons(), before);
}

#[test]
fn test_toggle_sequence() {
    let controller = EmulatedController::new(NpadIdType::Player3, repository(), Arc::new(DeviceFactory::new()));
    let index = NativeButton::L.index();
    let source = SourceId::from_guid("0a");

    let mut trail = Vec::new();
    for value in [true, false, true] {
        controller.set_button(&toggle(value), index, source);
        let slot = controller.buttons_values()[index];
        trail.push((slot.status.value, slot.status.locked));
    }
    assert_eq!(trail, vec![(true, true), (true, false), (false, true)]);
}

#[test]
fn test_foreign_release_never_overwrites() {
    let controller = EmulatedController::new(NpadIdType::Player3, repository(), Arc::new(DeviceFactory::new()));
    let index = NativeButton::B.index();
    let pad = SourceId::from_guid("0a");
    let keyboard = SourceId::from_guid("0b");

    controller.set_button(&press(true), index, pad);
    controller.set_button(&press(false), index, keyboard);
    assert!(controller.npad_buttons().is_set(npad_button::B));

    controller.set_button(&press(true), index, keyboard);
    assert_eq!(controller.buttons_values()[index].owner, keyboard);
    controller.set_button(&press(false), index, keyboard);
    assert!(!controller.npad_buttons().is_set(npad_button::B));
}

#[test]
fn test_concurrent_sources_never_mix_fragments() {
    const PRODUCERS: usize = 8;
    const ROUNDS: usize = 500;

    let controller = EmulatedController::new(NpadIdType::Player2, repository(), Arc::new(DeviceFactory::new()));
    let done = AtomicBool::new(false);
    let torn = AtomicUsize::new(0);

    let stick_source = |producer: usize| SourceId::from_parts(1, producer as u64);
    let stick_value = |producer: usize| 0.55 + producer as f32 * 0.05;
    let button_source = |producer: usize| SourceId::from_parts(2, producer as u64);
    let a = NativeButton::A.index();

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let sticks = controller.clone();
            scope.spawn(move || {
                let value = stick_value(producer);
                for _ in 0..ROUNDS {
                    let status = CallbackStatus::Stick(StickStatus::from_raw(value, value));
                    sticks.set_stick(&status, 0, stick_source(producer));
                }
            });
            let buttons = controller.clone();
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    buttons.set_button(&press(true), a, button_source(producer));
                    buttons.set_button(&press(false), a, button_source(producer));
                }
            });
        }
        scope.spawn(|| {
            while !done.load(Ordering::SeqCst) {
                let left = controller.sticks().left;
                if left.x != left.y {
                    torn.fetch_add(1, Ordering::SeqCst);
                }

                // Owner and value come from the same accepted reading
                let stick = controller.sticks_values()[0];
                if stick.owner != SourceId::NONE {
                    let paired = (0..PRODUCERS).any(|producer| {
                        stick.owner == stick_source(producer)
                            && (stick.status.x.raw_value - stick_value(producer)).abs() < 1e-6
                            && stick.status.x.raw_value == stick.status.y.raw_value
                    });
                    if !paired {
                        torn.fetch_add(1, Ordering::SeqCst);
                    }
                }

                let button = controller.buttons_values()[a];
                let known = (0..PRODUCERS).any(|producer| button.owner == button_source(producer));
                if button.status.value && !known {
                    torn.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        scope.spawn(|| {
            thread::sleep(std::time::Duration::from_millis(200));
            done.store(true, Ordering::SeqCst);
        });
    });

    assert_eq!(torn.load(Ordering::SeqCst), 0);
    let left = controller.sticks().left;
    assert_eq!(left.x, left.y);
    assert!(left.x > 0);

    // Whoever pressed last also released last
    let button = controller.buttons_values()[a];
    assert!(!button.status.value);
    assert!((0..PRODUCERS).any(|producer| button.owner == button_source(producer)));
    assert!(!controller.npad_buttons().is_set(npad_button::A));
}

#[test]
fn test_stale_callbacks_are_discarded_after_reload() {
    let repository = repository();
    bind_a(&repository, NpadIdType::Player2, "engine:leaky,button:0,guid:aa");

    let engine = Arc::new(LeakyEngine::default());
    let factory = Arc::new(DeviceFactory::new());
    factory.register(Arc::new(LeakyFactory(engine.clone())));

    let controller = EmulatedController::new(NpadIdType::Player2, repository, factory);
    controller.reload_from_settings().expect("reload");
    let first = engine.callbacks.lock()[0].clone();
    first(&press(true));
    assert!(controller.npad_buttons().is_set(npad_button::A));

    controller.reload_input();
    let callbacks = engine.callbacks.lock().clone();
    assert_eq!(callbacks.len(), 2);

    // The torn-down binding can no longer release the button
    first(&press(false));
    assert!(controller.npad_buttons().is_set(npad_button::A));

    callbacks[1](&press(false));
    assert!(!controller.npad_buttons().is_set(npad_button::A));
}

#[test]
fn test_reload_unbinds_virtual_devices() {
    let repository = repository();
    bind_a(&repository, NpadIdType::Player2, "engine:virtual,button:0,guid:aa");
    let engine = Arc::new(VirtualEngine::new());
    let factory = Arc::new(DeviceFactory::new());
    factory.register(engine.clone());

    let controller = EmulatedController::new(NpadIdType::Player2, repository, factory);
    controller.reload_from_settings().expect("reload");
    let old = engine.inputs("button:0");
    controller.reload_input();

    assert!(old.iter().all(|device| !device.is_bound()));
    engine.prune();
    assert_eq!(engine.inputs("button:0").len(), 2);

    controller.unload_input();
    engine.prune();
    assert!(engine.inputs("").is_empty());
}

#[test]
fn test_repeated_reloads_keep_engine_bounded() {
    let repository = repository();
    repository.set_player(0, virtual_profile()).expect("set");
    let engine = Arc::new(VirtualEngine::new());
    let factory = Arc::new(DeviceFactory::new());
    factory.register(engine.clone());

    let controller = EmulatedController::new(NpadIdType::Player1, repository, factory);
    controller.reload_from_settings().expect("reload");
    let live = engine.device_count();
    assert!(live > 0);

    for _ in 0..100 {
        controller.reload_from_settings().expect("reload");
    }
    assert_eq!(engine.device_count(), live);
    assert!(engine.tracked_count() <= 2 * live);
    assert!(engine.inputs("").iter().all(|device| device.is_bound()));

    controller.unload_input();
    assert_eq!(engine.device_count(), 0);
}

#[test]
fn test_configuration_commit_order() {
    let repository = repository();
    bind_a(&repository, NpadIdType::Player5, "[empty]");
    let controller = EmulatedController::new(NpadIdType::Player5, repository, Arc::new(DeviceFactory::new()));
    controller.reload_from_settings().expect("reload");
    assert!(controller.is_connected(false));

    let service = record(&controller, true);
    let preview = record(&controller, false);

    controller.enable_configuration();
    controller.set_npad_style_index(NpadStyleIndex::JoyconLeft);
    controller.set_button(&press(true), 0, SourceId::from_guid("0a"));
    assert!(service.lock().is_empty());
    assert_eq!(
        *preview.lock(),
        vec![ControllerTriggerType::Type, ControllerTriggerType::Button]
    );
    assert_eq!(controller.npad_style_index(true), NpadStyleIndex::JoyconLeft);
    assert_eq!(controller.npad_style_index(false), NpadStyleIndex::ProController);

    controller.disable_configuration();
    assert_eq!(
        *service.lock(),
        vec![
            ControllerTriggerType::Disconnected,
            ControllerTriggerType::Type,
            ControllerTriggerType::Connected,
        ]
    );
    assert!(controller.is_connected(false));
}

#[test]
fn test_vibration_disabled_always_fails() {
    let repository = repository();
    bind_a(&repository, NpadIdType::Player2, "engine:virtual,button:0,guid:aa");
    let mut player = repository.player(1).expect("slot");
    player.vibration_enabled = false;
    repository.set_player(1, player).expect("set");

    let engine = Arc::new(VirtualEngine::new());
    let factory = Arc::new(DeviceFactory::new());
    factory.register(engine.clone());
    let controller = EmulatedController::new(NpadIdType::Player2, repository, factory);
    controller.reload_from_settings().expect("reload");

    for amplitude in [0.0, 0.5, 1.0] {
        let value = VibrationValue {
            low_amplitude: amplitude,
            high_amplitude: amplitude,
            ..VibrationValue::DEFAULT
        };
        assert_eq!(
            controller.try_set_vibration(RIGHT_INDEX, value),
            Err(ControllerError::VibrationDisabled)
        );
    }
    assert!(!controller.test_vibration(RIGHT_INDEX));
    assert!(engine.outputs("output:1")[0].vibrations().is_empty());
}

/// Output whose first vibration command fails
#[derive(Default)]
struct FirstRumbleFails {
    attempts: AtomicUsize,
    sent: Mutex<Vec<VibrationStatus>>,
}

impl OutputDevice for FirstRumbleFails {
    fn set_vibration(&self, vibration: &VibrationStatus) -> Result<(), ControllerError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ControllerError::DeviceRejected("rumble".to_string()));
        }
        self.sent.lock().push(*vibration);
        Ok(())
    }

    fn set_led(&self, _led: &LedStatus) -> Result<(), ControllerError> {
        Ok(())
    }
}

struct RumbleEngine(Arc<FirstRumbleFails>);

impl InputEngine for RumbleEngine {
    fn name(&self) -> &str {
        "rumble"
    }

    fn create_input(&self, _params: &ParamPackage) -> Option<Arc<dyn InputDevice>> {
        None
    }

    fn create_output(&self, _params: &ParamPackage) -> Option<Arc<dyn OutputDevice>> {
        Some(self.0.clone())
    }
}

#[test]
fn test_test_vibration_fails_when_pulse_is_rejected() {
    let repository = repository();
    bind_a(&repository, NpadIdType::Player2, "engine:rumble,button:0,guid:aa");
    let output = Arc::new(FirstRumbleFails::default());
    let factory = Arc::new(DeviceFactory::new());
    factory.register(Arc::new(RumbleEngine(output.clone())));
    let controller = EmulatedController::new(NpadIdType::Player2, repository, factory);
    controller.reload_from_settings().expect("reload");

    assert!(!controller.test_vibration(RIGHT_INDEX));

    // The stop still went out after the rejected pulse
    let sent = output.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].low_amplitude, 0.0);
    assert_eq!(sent[0].high_amplitude, 0.0);
    assert_eq!(output.attempts.load(Ordering::SeqCst), 2);

    // Both commands accepted now
    assert_eq!(controller.try_test_vibration(RIGHT_INDEX), Ok(()));
}

#[test]
fn test_subscribers_run_in_registration_order() {
    let controller = EmulatedController::new(NpadIdType::Player6, repository(), Arc::new(DeviceFactory::new()));
    let order = Arc::new(Mutex::new(Vec::new()));
    let keys: Vec<usize> = (0..3)
        .map(|n| {
            let order = order.clone();
            controller.set_callback(ControllerUpdateCallback::new(move |_| order.lock().push(n)))
        })
        .collect();

    controller.set_npad_style_index(NpadStyleIndex::GameCube);
    assert_eq!(*order.lock(), vec![0, 1, 2]);

    assert!(controller.delete_callback(keys[1]));
    // Unknown keys are logged and ignored
    assert!(!controller.delete_callback(keys[1]));
    order.lock().clear();
    controller.connect(false).expect("all styles supported");
    assert_eq!(*order.lock(), vec![0, 2]);
}
