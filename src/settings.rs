use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    audio::VoiceConfig,
    labels::Language,
    layout::LayoutId,
    timing::PlaybackOptions,
};

pub const SETTINGS_FILE: &str = "settings.ron";
pub const CONFIG_DIR_ENV: &str = "PIANOSIM_CONFIG_DIR";
pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 3.0;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] ron::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub layout: LayoutId,
    pub language: Language,
    pub theme: Theme,
    pub speed: f64,
    pub countdown_seconds: u32,
    pub manual_voice: VoiceConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layout: LayoutId::default(),
            language: Language::default(),
            theme: Theme::default(),
            speed: 1.0,
            countdown_seconds: 3,
            manual_voice: VoiceConfig::MANUAL,
        }
    }
}

impl Settings {
    /// `$PIANOSIM_CONFIG_DIR/settings.ron`, or `settings.ron` in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(CONFIG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(SETTINGS_FILE)
    }

    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let ron_string = fs::read_to_string(path)?;
        let settings: Settings = ron::from_str(&ron_string)?;
        Ok(settings.sanitized())
    }

    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Ignoring settings at {:?}: {}", path, e);
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn playback_options(&self) -> PlaybackOptions {
        PlaybackOptions {
            speed: self.speed,
            countdown_seconds: self.countdown_seconds,
        }
    }

    fn sanitized(mut self) -> Self {
        if !self.speed.is_finite() {
            self.speed = 1.0;
        }
        self.speed = self.speed.clamp(MIN_SPEED, MAX_SPEED);
        self
    }
}
