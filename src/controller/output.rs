//! Vibration shaping for output devices

use crate::input::status::{VibrationAmplificationType, VibrationStatus};

use super::types::VibrationValue;

/// Strength above which the exponential curve is used
///
/// Exponential amplification is too strong at low strengths.
pub const EXPONENTIAL_THRESHOLD: f32 = 0.7;

/// Scale a vibration request by the player's strength setting (percent)
///
/// Amplitudes are clamped to `[0, 1]`; frequencies pass through.
pub fn shape_vibration(value: &VibrationValue, strength_percent: u32) -> VibrationStatus {
    let strength = strength_percent as f32 / 100.0;
    let amplification = if strength > EXPONENTIAL_THRESHOLD {
        VibrationAmplificationType::Exponential
    } else {
        VibrationAmplificationType::Linear
    };

    VibrationStatus {
        low_amplitude: (value.low_amplitude * strength).clamp(0.0, 1.0),
        low_frequency: value.low_frequency,
        high_amplitude: (value.high_amplitude * strength).clamp(0.0, 1.0),
        high_frequency: value.high_frequency,
        amplification,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn full(amplitude: f32) -> VibrationValue {
        VibrationValue {
            low_amplitude: amplitude,
            high_amplitude: amplitude,
            ..VibrationValue::DEFAULT
        }
    }

    #[test]
    fn test_curve_selection() {
        let strong = shape_vibration(&full(1.0), 100);
        assert_eq!(strong.amplification, VibrationAmplificationType::Exponential);
        assert!(strong.low_amplitude <= 1.0);

        let half = shape_vibration(&full(1.0), 50);
        assert_eq!(half.amplification, VibrationAmplificationType::Linear);
        assert_eq!(half.low_amplitude, 0.5);

        // Exactly at the threshold stays linear
        let edge = shape_vibration(&full(1.0), 70);
        assert_eq!(edge.amplification, VibrationAmplificationType::Linear);
    }

    #[test]
    fn test_frequencies_pass_through() {
        let status = shape_vibration(&VibrationValue::TEST_PULSE, 100);
        assert_eq!(status.low_frequency, 160.0);
        assert_eq!(status.high_frequency, 320.0);
    }

    proptest! {
        #[test]
        fn prop_amplitudes_clamped(
            low in -4.0f32..4.0,
            high in -4.0f32..4.0,
            strength in 0u32..=100,
        ) {
            let value = VibrationValue {
                low_amplitude: low,
                high_amplitude: high,
                ..VibrationValue::DEFAULT
            };
            let status = shape_vibration(&value, strength);
            prop_assert!((0.0..=1.0).contains(&status.low_amplitude));
            prop_assert!((0.0..=1.0).contains(&status.high_amplitude));
        }
    }
}
