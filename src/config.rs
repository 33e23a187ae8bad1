//! Runner settings loaded from `echoes.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base directory for game data (dialogue graphs live in `<data_dir>/dialogue`).
    pub data_dir: PathBuf,
    /// Sqlite URL for persisted player state. None runs fully in-memory.
    pub database_url: Option<String>,
    /// Preferred locale. None defers to the process environment.
    pub locale: Option<String>,
    /// Ordered fallback locales tried when an NPC has no graph for the
    /// primary locale.
    pub fallback_locales: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: None,
            locale: None,
            fallback_locales: vec!["en-US".to_string()],
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
    }

    /// Load settings, falling back to defaults when the file is absent or
    /// malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{}, using default settings", e);
                Self::default()
            }
        }
    }
}
