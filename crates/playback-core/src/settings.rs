use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Newest settings layout this build understands.
pub const SETTINGS_VERSION: u32 = 1;

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_max_texture_size() -> u32 {
    8192
}

fn default_true() -> bool {
    true
}

/// Compositing knobs for the resource updater and the demo player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Largest plane dimension the provider will allocate.
    #[serde(default = "default_max_texture_size")]
    pub max_texture_size: u32,
    /// Without GPU compositing frames are converted to RGBA on the CPU.
    #[serde(default = "default_true")]
    pub use_gpu_compositing: bool,
    /// Upload 9/10-bit planes as half-floats instead of shifting to 8 bits.
    #[serde(default = "default_true")]
    pub allow_half_float: bool,
    /// Copy every texture-backed frame before handing it to the compositor.
    #[serde(default)]
    pub copy_hardware_textures: bool,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            max_texture_size: default_max_texture_size(),
            use_gpu_compositing: true,
            allow_half_float: true,
            copy_hardware_textures: false,
        }
    }
}

impl MediaSettings {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("playback-core").join("media.json")
    }

    /// Load from the user config dir, falling back to defaults.
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            log::info!("No media settings found, using defaults");
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded media settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Failed to load media settings: {e:#}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        if settings.version > SETTINGS_VERSION {
            anyhow::bail!(
                "settings version {} is newer than supported ({})",
                settings.version,
                SETTINGS_VERSION
            );
        }
        if settings.max_texture_size == 0 {
            anyhow::bail!("max_texture_size must be positive");
        }
        Ok(settings)
    }

    pub fn save(&self) {
        let path = Self::config_path();
        match self.save_to(&path) {
            Ok(()) => log::debug!("Saved media settings to {}", path.display()),
            Err(e) => log::error!("Failed to save media settings: {e:#}"),
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}
