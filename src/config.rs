//! Configuration for the mcomp compositor
//!
//! Loads configuration from TOML file at `~/.config/mcomp/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub properties: PropertiesConfig,
    pub damage: DamageConfig,
    pub textures: TexturesConfig,
    pub animation: AnimationConfig,
}

impl Config {
    /// Load configuration from file, or use defaults if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("mcomp");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string)
            .context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }
}

/// Property cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertiesConfig {
    /// Replies still pending this long after the last request are collected
    pub collect_interval_ms: u64,
    /// How many `_NET_WM_WINDOW_TYPE` atoms are read
    pub max_type_atoms: u32,
}

impl Default for PropertiesConfig {
    fn default() -> Self {
        Self {
            collect_interval_ms: 5000,
            max_type_atoms: 10,
        }
    }
}

impl PropertiesConfig {
    pub fn collect_interval(&self) -> Duration {
        Duration::from_millis(self.collect_interval_ms)
    }
}

/// Damage throttling configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DamageConfig {
    /// Window over which texture updates are counted
    pub expiry_ms: u64,
    /// Updates allowed inside one window
    pub limit: usize,
    /// Postpone updates of a transitioning window while any animation runs
    pub defer_while_animating: bool,
    /// Retry delay for updates postponed by an animation
    pub busy_retry_ms: u64,
}

impl Default for DamageConfig {
    fn default() -> Self {
        Self {
            expiry_ms: 1000,
            limit: 30,
            defer_while_animating: true,
            busy_retry_ms: 100,
        }
    }
}

/// Texture-from-pixmap backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextureBackend {
    /// EGL, then GLX, then the software path
    #[default]
    Auto,
    Egl,
    Glx,
    Software,
}

/// Texture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TexturesConfig {
    pub backend: TextureBackend,
    /// Texture names allocated up front
    pub initial_pool: usize,
    /// Names added whenever the pool runs dry
    pub pool_growth: usize,
}

impl Default for TexturesConfig {
    fn default() -> Self {
        Self {
            backend: TextureBackend::Auto,
            initial_pool: 20,
            pool_growth: 10,
        }
    }
}

/// Animation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub startup_anim_duration_ms: u64,
    pub crossfade_duration_ms: u64,
    pub sheet_duration_ms: u64,
    pub chained_duration_ms: u64,
    /// Animation plugins are loaded; built-in animations become instant
    pub has_plugins: bool,
    pub frame_interval_ms: u64,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            startup_anim_duration_ms: 300,
            crossfade_duration_ms: 250,
            sheet_duration_ms: 350,
            chained_duration_ms: 500,
            has_plugins: false,
            frame_interval_ms: 16,
        }
    }
}

impl AnimationConfig {
    /// Duration of the default show/close/iconify/restore transitions
    pub fn default_duration(&self) -> Duration {
        if self.has_plugins {
            Duration::from_millis(1)
        } else {
            Duration::from_millis(self.startup_anim_duration_ms)
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[damage]\nlimit = 5\n\n[textures]\nbackend = \"glx\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.damage.limit, 5);
        assert_eq!(config.damage.expiry_ms, 1000);
        assert_eq!(config.textures.backend, TextureBackend::Glx);
        assert_eq!(config.properties, PropertiesConfig::default());
    }

    #[test]
    fn test_default_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcomp").join("config.toml");
        Config::save_default(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[animation]\nhas_plugins = \"maybe\"\n").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_plugins_make_default_animations_instant() {
        let mut animation = AnimationConfig::default();
        assert_eq!(animation.default_duration(), Duration::from_millis(300));
        animation.has_plugins = true;
        assert_eq!(animation.default_duration(), Duration::from_millis(1));
    }
}
