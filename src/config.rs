use crate::constants::{SETTINGS_DIR_NAME, SETTINGS_FILE_NAME};
use crate::error::Result;
use crate::placement::PlacementPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Persisted user preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_token: String,
    pub override_original: bool,
    pub directory_to_save: Option<PathBuf>,
    pub auto_processing: bool,
    /// Last compression count reported by the API.
    pub compressed_count: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            override_original: true,
            directory_to_save: None,
            auto_processing: true,
            compressed_count: 0,
        }
    }
}

impl Settings {
    pub fn placement_policy(&self) -> PlacementPolicy {
        PlacementPolicy::from_settings(self.override_original, self.directory_to_save.clone())
    }

    /// Token with everything but the last four characters hidden.
    pub fn masked_token(&self) -> String {
        let chars: Vec<char> = self.api_token.chars().collect();
        if chars.is_empty() {
            return "(not set)".to_string();
        }
        let visible = chars.len().min(4);
        let hidden = chars.len() - visible;
        let tail: String = chars[hidden..].iter().collect();
        format!("{}{}", "*".repeat(hidden), tail)
    }
}

/// Settings bound to the file they are loaded from and saved to.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    pub settings: Settings,
}

impl SettingsStore {
    /// `<config dir>/img-tinify/settings.json`, or the working directory when
    /// the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(SETTINGS_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_FILE_NAME)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self {
                path,
                settings: Settings::default(),
            });
        }

        let content = fs::read_to_string(&path).await?;
        let settings = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded settings");
        Ok(Self { path, settings })
    }

    pub async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, content).await?;
        tracing::debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
