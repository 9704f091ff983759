//! npad-core - canonical emulated controller state
//!
//! Merges input from any number of physical sources into one report per
//! player slot, arbitrates between sources, previews configuration changes
//! without touching the live report and notifies subscribers of changes.

pub mod config;
pub mod controller;
pub mod error;
pub mod input;
pub mod replay;

pub use config::{AppConfig, ConfigRepository, MemoryRepository, PlayerConfig};
pub use controller::notify::ControllerUpdateCallback;
pub use controller::types::{ControllerTriggerType, NpadIdType, NpadStyleIndex, NpadStyleTag};
pub use controller::EmulatedController;
pub use error::{ConfigError, ControllerError};
pub use input::{DeviceFactory, InputDevice, InputEngine, OutputDevice, ParamPackage, SourceId};
