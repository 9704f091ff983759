//! Player configuration for the controller core
//!
//! Handles loading, validating and saving the YAML player table, plus the
//! repository abstraction controllers read their settings through.

pub mod repository;
pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use crate::controller::types::{
    NativeAnalog, NativeButton, NpadStyleIndex, NpadStyleTag, MOTION_COUNT, PLAYER_SLOTS,
};

pub use repository::{ConfigRepository, MemoryRepository};
pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Player table in slot order (players 1-8, handheld, other)
    #[serde(default)]
    pub players: Vec<PlayerConfig>,
    /// Styles the emulated service accepts; every style when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_styles: Option<Vec<ControllerType>>,
}

/// Controller kind as stored in settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerType {
    #[default]
    ProController,
    DualJoyconDetached,
    LeftJoycon,
    RightJoycon,
    Handheld,
    GameCube,
    Pokeball,
    #[serde(rename = "nes")]
    NES,
    #[serde(rename = "snes")]
    SNES,
    #[serde(rename = "n64")]
    N64,
    SegaGenesis,
    /// Anything this build does not know; treated as a Pro controller
    #[serde(other)]
    Unknown,
}

impl From<ControllerType> for NpadStyleIndex {
    fn from(kind: ControllerType) -> Self {
        match kind {
            ControllerType::ProController | ControllerType::Unknown => NpadStyleIndex::ProController,
            ControllerType::DualJoyconDetached => NpadStyleIndex::JoyconDual,
            ControllerType::LeftJoycon => NpadStyleIndex::JoyconLeft,
            ControllerType::RightJoycon => NpadStyleIndex::JoyconRight,
            ControllerType::Handheld => NpadStyleIndex::Handheld,
            ControllerType::GameCube => NpadStyleIndex::GameCube,
            ControllerType::Pokeball => NpadStyleIndex::Pokeball,
            ControllerType::NES => NpadStyleIndex::NES,
            ControllerType::SNES => NpadStyleIndex::SNES,
            ControllerType::N64 => NpadStyleIndex::N64,
            ControllerType::SegaGenesis => NpadStyleIndex::SegaGenesis,
        }
    }
}

impl From<NpadStyleIndex> for ControllerType {
    fn from(style: NpadStyleIndex) -> Self {
        match style {
            NpadStyleIndex::JoyconDual => ControllerType::DualJoyconDetached,
            NpadStyleIndex::JoyconLeft => ControllerType::LeftJoycon,
            NpadStyleIndex::JoyconRight => ControllerType::RightJoycon,
            NpadStyleIndex::Handheld => ControllerType::Handheld,
            NpadStyleIndex::GameCube => ControllerType::GameCube,
            NpadStyleIndex::Pokeball => ControllerType::Pokeball,
            NpadStyleIndex::NES => ControllerType::NES,
            NpadStyleIndex::SNES => ControllerType::SNES,
            NpadStyleIndex::N64 => ControllerType::N64,
            NpadStyleIndex::SegaGenesis => ControllerType::SegaGenesis,
            NpadStyleIndex::ProController | NpadStyleIndex::None => ControllerType::ProController,
        }
    }
}

/// Settings of one player slot
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub controller_type: ControllerType,
    #[serde(default = "default_body_color_left")]
    pub body_color_left: u32,
    #[serde(default = "default_body_color_right")]
    pub body_color_right: u32,
    #[serde(default = "default_button_color_left")]
    pub button_color_left: u32,
    #[serde(default = "default_button_color_right")]
    pub button_color_right: u32,
    #[serde(default = "default_true")]
    pub vibration_enabled: bool,
    /// Percent, 0-100
    #[serde(default = "default_vibration_strength")]
    pub vibration_strength: u32,
    /// Gyro magnitude below which a sensor counts as at rest
    #[serde(default = "default_motion_sensitivity")]
    pub motion_sensitivity: f32,
    /// Serialized parameter packages, one per [`NativeButton`]
    #[serde(default)]
    pub buttons: Vec<String>,
    /// Serialized parameter packages, one per [`NativeAnalog`]
    #[serde(default)]
    pub analogs: Vec<String>,
    #[serde(default)]
    pub motions: Vec<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            connected: false,
            controller_type: ControllerType::default(),
            body_color_left: default_body_color_left(),
            body_color_right: default_body_color_right(),
            button_color_left: default_button_color_left(),
            button_color_right: default_button_color_right(),
            vibration_enabled: true,
            vibration_strength: default_vibration_strength(),
            motion_sensitivity: default_motion_sensitivity(),
            buttons: vec![String::new(); NativeButton::COUNT],
            analogs: vec![String::new(); NativeAnalog::COUNT],
            motions: vec![String::new(); MOTION_COUNT],
        }
    }
}

impl PlayerConfig {
    /// Pad the binding tables to their fixed sizes
    fn normalize(&mut self) {
        self.buttons.resize(NativeButton::COUNT, String::new());
        self.analogs.resize(NativeAnalog::COUNT, String::new());
        self.motions.resize(MOTION_COUNT, String::new());
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Blocking variant of [`AppConfig::load`] for non-async callers
    pub fn load_blocking(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse, validate and pad a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.players.len() > PLAYER_SLOTS {
            anyhow::bail!(
                "{} players configured, at most {} slots exist",
                self.players.len(),
                PLAYER_SLOTS
            );
        }

        for (idx, player) in self.players.iter().enumerate() {
            if player.vibration_strength > 100 {
                anyhow::bail!(
                    "Player {} vibration_strength {} is invalid (must be 0-100)",
                    idx,
                    player.vibration_strength
                );
            }
            if !(player.motion_sensitivity >= 0.0) {
                anyhow::bail!(
                    "Player {} motion_sensitivity must be a non-negative number",
                    idx
                );
            }
            if player.buttons.len() > NativeButton::COUNT {
                anyhow::bail!(
                    "Player {} has {} button bindings (at most {})",
                    idx,
                    player.buttons.len(),
                    NativeButton::COUNT
                );
            }
            if player.analogs.len() > NativeAnalog::COUNT {
                anyhow::bail!("Player {} has too many analog bindings", idx);
            }
            if player.motions.len() > MOTION_COUNT {
                anyhow::bail!("Player {} has too many motion bindings", idx);
            }
        }

        Ok(())
    }

    /// Fill missing players and bindings with defaults
    pub fn normalize(&mut self) {
        if self.players.len() < PLAYER_SLOTS {
            if !self.players.is_empty() {
                warn!(
                    "Only {} of {} players configured, using defaults for the rest",
                    self.players.len(),
                    PLAYER_SLOTS
                );
            }
            self.players.resize_with(PLAYER_SLOTS, PlayerConfig::default);
        }
        for player in &mut self.players {
            player.normalize();
        }
    }

    /// Capability set for the emulated service
    pub fn supported_style_tag(&self) -> NpadStyleTag {
        match &self.supported_styles {
            None => NpadStyleTag::all(),
            Some(kinds) => {
                let raw = kinds
                    .iter()
                    .map(|kind| NpadStyleTag::for_style(NpadStyleIndex::from(*kind)))
                    .fold(0, |acc, flag| acc | flag);
                NpadStyleTag::from_raw(raw)
            }
        }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_vibration_strength() -> u32 { 100 }
fn default_motion_sensitivity() -> f32 { 0.01 }
fn default_body_color_left() -> u32 { 0x0AB9E6 }
fn default_body_color_right() -> u32 { 0xFF3C28 }
fn default_button_color_left() -> u32 { 0x001E1E }
fn default_button_color_right() -> u32 { 0x1E0A0A }
