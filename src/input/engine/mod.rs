//! Input engines available in-process

pub mod virtual_engine;

pub use virtual_engine::{VirtualEngine, VirtualInput, VirtualOutput, VIRTUAL_ENGINE};
