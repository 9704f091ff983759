//! Raw callback to typed signal conversion
//!
//! Canonical implementations of the normalization applied to every raw
//! callback before arbitration, so that all device engines produce
//! consistently scaled values.
//!
//! # Analog sanitizing
//!
//! Raw analog readings go through, in order: center offset, deadzone with
//! rescaling of the remaining travel back to full scale, range division,
//! optional inversion, and optional clamping to `[-1.0, 1.0]`.
//!
//! Sticks use a radial (circular) deadzone computed on the X/Y vector, so a
//! diagonal reaches the same magnitude as a cardinal direction.

use rand::Rng;
use tracing::error;

use super::status::{
    AnalogProperties, AnalogStatus, BatteryLevel, ButtonStatus, CallbackStatus, MotionSensor,
    MotionStatus, StickStatus, TriggerStatus,
};

/// Maximum magnitude of a stick coordinate in the controller report
pub const HID_JOYSTICK_MAX: i32 = 0x7fff;

/// Maximum magnitude of a trigger coordinate in the controller report
pub const HID_TRIGGER_MAX: i32 = 0x7fff;

/// Sample period reported for motion synthesized from a button, in microseconds
const BUTTON_MOTION_DELTA_US: u64 = 5000;

/// Scale a normalized value to a fixed integer range, truncating toward zero
///
/// # Example
/// ```
/// use npad_core::input::convert::{scale_to_fixed, HID_JOYSTICK_MAX};
///
/// assert_eq!(scale_to_fixed(1.0, HID_JOYSTICK_MAX), 32767);
/// assert_eq!(scale_to_fixed(-1.0, HID_JOYSTICK_MAX), -32767);
/// assert_eq!(scale_to_fixed(0.0, HID_JOYSTICK_MAX), 0);
/// ```
pub fn scale_to_fixed(value: f32, max: i32) -> i32 {
    (value * max as f32) as i32
}

/// Sanitize a single analog channel in place
///
/// # Arguments
/// * `analog` - Channel whose `raw_value` is read and whose `value` is written
/// * `clamp_value` - Clamp the result to `[-1.0, 1.0]`
pub fn sanitize_analog(analog: &mut AnalogStatus, clamp_value: bool) {
    let properties = analog.properties;

    if !analog.raw_value.is_normal() {
        analog.raw_value = 0.0;
    }

    analog.raw_value -= properties.offset;
    let mut value = analog.raw_value;
    let magnitude = value.abs();

    if magnitude <= properties.deadzone || properties.deadzone >= 1.0 {
        analog.value = 0.0;
        return;
    }

    // Map [deadzone..range] -> [0.0..1.0]
    let deadzone_factor =
        1.0 / magnitude * (magnitude - properties.deadzone) / (1.0 - properties.deadzone);
    value = value * deadzone_factor / properties.range;

    if properties.inverted {
        value = -value;
    }

    if clamp_value {
        value = value.clamp(-1.0, 1.0);
    }

    analog.value = value;
}

/// Sanitize a stick axis pair in place with a radial deadzone
///
/// The deadzone and range of the X axis apply to the whole vector.
///
/// # Arguments
/// * `x`, `y` - Axis channels, `raw_value` read and `value` written
/// * `clamp_value` - Pull vectors longer than 1.0 back onto the unit circle
pub fn sanitize_stick(x: &mut AnalogStatus, y: &mut AnalogStatus, clamp_value: bool) {
    let properties_x = x.properties;
    let properties_y = y.properties;

    if !x.raw_value.is_normal() {
        x.raw_value = 0.0;
    }
    if !y.raw_value.is_normal() {
        y.raw_value = 0.0;
    }

    x.raw_value -= properties_x.offset;
    y.raw_value -= properties_y.offset;

    let mut out_x = x.raw_value;
    let mut out_y = y.raw_value;
    let mut magnitude = (out_x * out_x + out_y * out_y).sqrt();

    if magnitude <= properties_x.deadzone || properties_x.deadzone >= 1.0 {
        x.value = 0.0;
        y.value = 0.0;
        return;
    }

    // Radial rescaling: map [deadzone..range] -> [0.0..1.0]
    let deadzone_factor =
        1.0 / magnitude * (magnitude - properties_x.deadzone) / (1.0 - properties_x.deadzone);
    out_x = out_x * deadzone_factor / properties_x.range;
    out_y = out_y * deadzone_factor / properties_x.range;
    magnitude = magnitude * deadzone_factor / properties_x.range;

    if properties_x.inverted {
        out_x = -out_x;
    }
    if properties_y.inverted {
        out_y = -out_y;
    }

    if magnitude > 1.0 && clamp_value {
        out_x /= magnitude;
        out_y /= magnitude;
    }

    x.value = out_x;
    y.value = out_y;
}

/// Convert any callback to a digital button reading
///
/// Analog and trigger callbacks are thresholded. The `inverted` flag is
/// applied last.
pub fn transform_to_button(callback: &CallbackStatus) -> ButtonStatus {
    let mut status = match callback {
        CallbackStatus::Button(button) => *button,
        CallbackStatus::Analog(analog) => ButtonStatus {
            value: transform_to_trigger(callback).pressed.value,
            inverted: analog.properties.inverted,
            toggle: analog.properties.toggle,
            locked: false,
        },
        CallbackStatus::Trigger(trigger) => ButtonStatus {
            value: transform_to_trigger(callback).pressed.value,
            inverted: trigger.analog.properties.inverted,
            toggle: trigger.analog.properties.toggle,
            locked: false,
        },
        other => {
            error!("Conversion from {} to button is not implemented", other.kind());
            ButtonStatus::default()
        }
    };

    if status.inverted {
        status.value = !status.value;
    }

    status
}

/// Convert a stick callback to a sanitized stick reading with its digital overlay
pub fn transform_to_stick(callback: &CallbackStatus) -> StickStatus {
    let mut status = match callback {
        CallbackStatus::Stick(stick) => *stick,
        other => {
            error!("Conversion from {} to stick is not implemented", other.kind());
            StickStatus::default()
        }
    };

    sanitize_stick(&mut status.x, &mut status.y, true);

    let threshold_x = status.x.properties.threshold;
    let threshold_y = status.y.properties.threshold;
    let x = status.x.value;
    let y = status.y.value;

    status.right = x > threshold_x;
    status.left = x < -threshold_x;
    status.up = y > threshold_y;
    status.down = y < -threshold_y;

    status
}

/// Convert an analog, button or trigger callback to a trigger reading
pub fn transform_to_trigger(callback: &CallbackStatus) -> TriggerStatus {
    let mut status = TriggerStatus::default();
    let mut calculate_button_value = true;

    match callback {
        CallbackStatus::Analog(analog) => {
            status.analog.properties = analog.properties;
            status.analog.raw_value = analog.raw_value;
        }
        CallbackStatus::Button(button) => {
            status.analog.properties = AnalogProperties {
                range: 1.0,
                inverted: button.inverted,
                ..Default::default()
            };
            status.analog.raw_value = if button.value { 1.0 } else { 0.0 };
        }
        CallbackStatus::Trigger(trigger) => {
            status = *trigger;
            calculate_button_value = false;
        }
        other => {
            error!("Conversion from {} to trigger is not implemented", other.kind());
        }
    }

    sanitize_analog(&mut status.analog, true);
    let properties = status.analog.properties;

    if calculate_button_value {
        status.pressed.value = status.analog.value > properties.threshold;
    }

    // Inverted triggers rest at -1.0; shift back to [0.0..1.0]
    if properties.inverted {
        status.analog.value += 1.0;
    }

    status
}

/// Convert a motion or button callback to a sanitized motion sample
///
/// A button bound as a motion source produces a resting sample (gravity on
/// -Z) and, while held, small random jitter on every axis so that games
/// polling for "shake" see movement. Such sources always need forced refresh.
pub fn transform_to_motion(callback: &CallbackStatus) -> MotionStatus {
    let mut status = match callback {
        CallbackStatus::Button(_) => {
            let mut status = MotionStatus {
                gyro: MotionSensor::from_raw(0.0, 0.0, 0.0),
                accel: MotionSensor::from_raw(0.0, 0.0, -1.0),
                delta_timestamp: BUTTON_MOTION_DELTA_US,
                force_update: true,
            };
            if transform_to_button(callback).value {
                let mut rng = rand::rng();
                let mut jitter = || rng.random_range(-1000i16..=1000) as f32 * 0.001;
                status.accel.x.raw_value = jitter();
                status.accel.y.raw_value = jitter();
                status.accel.z.raw_value = jitter();
                status.gyro.x.raw_value = jitter();
                status.gyro.y.raw_value = jitter();
                status.gyro.z.raw_value = jitter();
            }
            status
        }
        CallbackStatus::Motion(motion) => *motion,
        other => {
            error!("Conversion from {} to motion is not implemented", other.kind());
            MotionStatus::default()
        }
    };

    for channel in [
        &mut status.accel.x,
        &mut status.accel.y,
        &mut status.accel.z,
        &mut status.gyro.x,
        &mut status.gyro.y,
        &mut status.gyro.z,
    ] {
        sanitize_analog(channel, false);
    }

    status
}

/// Convert a battery, analog or button callback to a battery level
///
/// Analog sources are bucketed by charge fraction; a button source reads as
/// charging while held and critical otherwise.
pub fn transform_to_battery(callback: &CallbackStatus) -> BatteryLevel {
    match callback {
        CallbackStatus::Analog(_) | CallbackStatus::Trigger(_) => {
            let value = transform_to_trigger(callback).analog.value;
            if value >= 1.0 {
                BatteryLevel::Charging
            } else if value > 0.8 {
                BatteryLevel::Full
            } else if value > 0.6 {
                BatteryLevel::Medium
            } else if value > 0.4 {
                BatteryLevel::Low
            } else if value > 0.2 {
                BatteryLevel::Critical
            } else {
                BatteryLevel::Empty
            }
        }
        CallbackStatus::Button(button) => {
            if button.value {
                BatteryLevel::Charging
            } else {
                BatteryLevel::Critical
            }
        }
        CallbackStatus::Battery(level) => *level,
        other => {
            error!("Conversion from {} to battery is not implemented", other.kind());
            BatteryLevel::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn analog(raw_value: f32, properties: AnalogProperties) -> AnalogStatus {
        AnalogStatus {
            value: 0.0,
            raw_value,
            properties,
        }
    }

    #[test]
    fn test_stick_scaling_limits() {
        assert_eq!(scale_to_fixed(1.0, HID_JOYSTICK_MAX), 32767);
        assert_eq!(scale_to_fixed(-1.0, HID_JOYSTICK_MAX), -32767);
        assert_eq!(scale_to_fixed(0.0, HID_JOYSTICK_MAX), 0);
    }

    #[test]
    fn test_full_deflection_survives_sanitizing() {
        let stick = transform_to_stick(&CallbackStatus::Stick(StickStatus::from_raw(1.0, 0.0)));
        assert_eq!(stick.x.value, 1.0);
        assert_eq!(stick.y.value, 0.0);
        assert!(stick.right);
        assert!(!stick.left && !stick.up && !stick.down);
    }

    #[test]
    fn test_deadzone_filters_small_values() {
        let properties = AnalogProperties {
            deadzone: 0.1,
            ..Default::default()
        };
        let mut channel = analog(0.05, properties);
        sanitize_analog(&mut channel, true);
        assert_eq!(channel.value, 0.0);

        let mut channel = analog(-0.55, properties);
        sanitize_analog(&mut channel, true);
        assert!((channel.value + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_offset_and_inversion() {
        let properties = AnalogProperties {
            offset: 0.25,
            inverted: true,
            ..Default::default()
        };
        let mut channel = analog(0.75, properties);
        sanitize_analog(&mut channel, true);
        assert!((channel.value + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_saturated_deadzone_reads_as_zero() {
        for deadzone in [1.0, 1.5] {
            let properties = AnalogProperties {
                deadzone,
                ..Default::default()
            };
            let mut channel = analog(2.0, properties);
            sanitize_analog(&mut channel, false);
            assert_eq!(channel.value, 0.0);

            let mut x = analog(2.0, properties);
            let mut y = analog(0.0, properties);
            sanitize_stick(&mut x, &mut y, false);
            assert_eq!((x.value, y.value), (0.0, 0.0));
        }
    }

    #[test]
    fn test_nan_reads_as_zero() {
        let mut channel = analog(f32::NAN, AnalogProperties::default());
        sanitize_analog(&mut channel, true);
        assert_eq!(channel.value, 0.0);
        assert_eq!(channel.raw_value, 0.0);
    }

    #[test]
    fn test_radial_deadzone_on_diagonal() {
        let properties = AnalogProperties {
            deadzone: 0.2,
            ..Default::default()
        };
        let mut x = analog(0.1, properties);
        let mut y = analog(0.1, properties);
        // Each axis alone is inside, the vector (0.141) is inside too
        sanitize_stick(&mut x, &mut y, true);
        assert_eq!((x.value, y.value), (0.0, 0.0));

        let mut x = analog(1.0, properties);
        let mut y = analog(1.0, properties);
        sanitize_stick(&mut x, &mut y, true);
        let magnitude = (x.value * x.value + y.value * y.value).sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_trigger_from_button() {
        let pressed = transform_to_trigger(&CallbackStatus::Button(ButtonStatus::pressed(true)));
        assert_eq!(pressed.analog.value, 1.0);
        assert!(pressed.pressed.value);

        let released = transform_to_trigger(&CallbackStatus::Button(ButtonStatus::pressed(false)));
        assert_eq!(released.analog.value, 0.0);
        assert!(!released.pressed.value);
    }

    #[test]
    fn test_button_from_analog_threshold() {
        let low = CallbackStatus::Analog(AnalogStatus::from_raw(0.3));
        let high = CallbackStatus::Analog(AnalogStatus::from_raw(0.8));
        assert!(!transform_to_button(&low).value);
        assert!(transform_to_button(&high).value);
    }

    #[test]
    fn test_inverted_button() {
        let status = ButtonStatus {
            value: false,
            inverted: true,
            ..Default::default()
        };
        assert!(transform_to_button(&CallbackStatus::Button(status)).value);
    }

    #[test]
    fn test_battery_from_analog() {
        let level = |raw| transform_to_battery(&CallbackStatus::Analog(AnalogStatus::from_raw(raw)));
        assert_eq!(level(0.1), BatteryLevel::Empty);
        assert_eq!(level(0.3), BatteryLevel::Critical);
        assert_eq!(level(0.5), BatteryLevel::Low);
        assert_eq!(level(0.7), BatteryLevel::Medium);
        assert_eq!(level(0.9), BatteryLevel::Full);
        assert_eq!(level(1.0), BatteryLevel::Charging);
    }

    #[test]
    fn test_motion_from_button_forces_refresh() {
        let resting = transform_to_motion(&CallbackStatus::Button(ButtonStatus::pressed(false)));
        assert!(resting.force_update);
        assert_eq!(resting.delta_timestamp, 5000);
        assert_eq!(resting.accel.z.value, -1.0);
        assert_eq!(resting.gyro.x.value, 0.0);

        let shaking = transform_to_motion(&CallbackStatus::Button(ButtonStatus::pressed(true)));
        assert!(shaking.accel.x.value.abs() <= 1.0);
        assert!(shaking.gyro.z.value.abs() <= 1.0);
    }

    proptest! {
        #[test]
        fn prop_stick_stays_on_unit_disc(x in -4.0f32..4.0, y in -4.0f32..4.0) {
            let stick = transform_to_stick(&CallbackStatus::Stick(StickStatus::from_raw(x, y)));
            let magnitude = (stick.x.value * stick.x.value + stick.y.value * stick.y.value).sqrt();
            prop_assert!(magnitude <= 1.0 + 1e-5);

            let fixed_x = scale_to_fixed(stick.x.value, HID_JOYSTICK_MAX);
            prop_assert!(fixed_x.abs() <= HID_JOYSTICK_MAX);
        }
    }
}
