//! Player settings access for controllers
//!
//! Controllers never reach for a global settings table. They are handed a
//! [`ConfigRepository`] and read or write their own slot through it.

use parking_lot::RwLock;

use super::{AppConfig, PlayerConfig};
use crate::controller::types::NpadStyleTag;
use crate::error::ConfigError;

/// Get/set access to the player table
pub trait ConfigRepository: Send + Sync {
    /// Settings of player slot `index`
    fn player(&self, index: usize) -> Result<PlayerConfig, ConfigError>;

    /// Replace the settings of player slot `index`
    fn set_player(&self, index: usize, config: PlayerConfig) -> Result<(), ConfigError>;
}

/// Repository backed by an in-memory [`AppConfig`]
#[derive(Debug, Default)]
pub struct MemoryRepository {
    config: RwLock<AppConfig>,
}

impl MemoryRepository {
    pub fn new(mut config: AppConfig) -> Self {
        config.normalize();
        Self {
            config: RwLock::new(config),
        }
    }

    /// Copy of the whole table
    pub fn snapshot(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Swap in a freshly loaded table (hot reload)
    pub fn replace(&self, mut config: AppConfig) {
        config.normalize();
        *self.config.write() = config;
    }

    pub fn supported_style_tag(&self) -> NpadStyleTag {
        self.config.read().supported_style_tag()
    }
}

impl ConfigRepository for MemoryRepository {
    fn player(&self, index: usize) -> Result<PlayerConfig, ConfigError> {
        self.config
            .read()
            .players
            .get(index)
            .cloned()
            .ok_or(ConfigError::UnknownPlayer(index))
    }

    fn set_player(&self, index: usize, config: PlayerConfig) -> Result<(), ConfigError> {
        let mut table = self.config.write();
        let slot = table
            .players
            .get_mut(index)
            .ok_or(ConfigError::UnknownPlayer(index))?;
        *slot = config;
        slot.normalize();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::types::PLAYER_SLOTS;

    #[test]
    fn test_defaults_fill_every_slot() {
        let repo = MemoryRepository::new(AppConfig::default());
        for index in 0..PLAYER_SLOTS {
            assert!(repo.player(index).is_ok());
        }
        assert!(matches!(
            repo.player(PLAYER_SLOTS),
            Err(ConfigError::UnknownPlayer(_))
        ));
    }

    #[test]
    fn test_set_player() {
        let repo = MemoryRepository::default();
        repo.replace(AppConfig::default());

        let mut player = repo.player(3).expect("slot");
        player.connected = true;
        player.buttons.clear();
        repo.set_player(3, player).expect("set");

        let stored = repo.player(3).expect("slot");
        assert!(stored.connected);
        assert_eq!(stored.buttons.len(), 20);
        assert!(repo.set_player(42, PlayerConfig::default()).is_err());
    }
}
