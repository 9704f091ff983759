//! Physical input plumbing
//!
//! Everything below the controller: binding descriptors, source identities,
//! raw callback payloads and their normalization, the motion integrator and
//! the device factory.

pub mod convert;
pub mod device;
pub mod engine;
pub mod motion;
pub mod params;
pub mod source_id;
pub mod status;

pub use device::{DeviceFactory, InputCallback, InputDevice, InputEngine, OutputDevice};
pub use motion::{MotionInput, Vec3};
pub use params::ParamPackage;
pub use source_id::SourceId;
pub use status::CallbackStatus;
