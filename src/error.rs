//! Error types for the controller core
//!
//! None of these are fatal. Controller operations that can fail report a
//! [`ControllerError`] from their `try_*` form and collapse to `false` in
//! their boolean form, after logging.

use thiserror::Error;

use crate::controller::types::NpadStyleIndex;

/// Failures of controller commands
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControllerError {
    /// The requested style is not in the supported capability set
    #[error("controller style {0:?} is not supported")]
    UnsupportedStyle(NpadStyleIndex),

    /// No device is bound to the addressed input or output
    #[error("no {kind} device bound at index {index}")]
    MissingBinding { kind: &'static str, index: usize },

    /// Vibration is turned off in the player configuration
    #[error("vibration is disabled for this player")]
    VibrationDisabled,

    /// The output device refused or failed a command
    #[error("device rejected command: {0}")]
    DeviceRejected(String),

    /// No subscriber is registered under this key
    #[error("unknown callback key {0}")]
    UnknownCallback(usize),

    /// The player's settings could not be read or written
    #[error("player settings unavailable: {0}")]
    Settings(String),

    /// Index past the end of a fixed-size input table
    #[error("{kind} index {index} out of range")]
    IndexOutOfRange { kind: &'static str, index: usize },
}

/// Failures of the settings repository
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is malformed: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Player slot index outside the configured table
    #[error("no player configuration at index {0}")]
    UnknownPlayer(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ControllerError::MissingBinding {
            kind: "output",
            index: 1,
        };
        assert_eq!(err.to_string(), "no output device bound at index 1");
        assert_eq!(
            ConfigError::UnknownPlayer(12).to_string(),
            "no player configuration at index 12"
        );
    }
}
