use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Model used for new conversations; the first listed model when unset.
    pub active_model: Option<String>,
    pub web_search: bool,
    #[serde(default)]
    pub custom_base_url: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            active_model: None,
            web_search: false,
            custom_base_url: None,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    /// Settings file under the XDG config directory.
    pub fn default_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".config")
            });
        config_dir.join("hugchat").join("settings.json")
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load(path: &Path) -> AppSettings {
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
            Err(_) => AppSettings::default(),
        }
    }

    pub fn save(path: &Path, settings: &AppSettings) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let json = serde_json::to_string_pretty(settings)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }
}
