//! User-level state persisted next to the indices in `settings.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use refdex_core::error::Result;
use refdex_vector::layout::write_json_atomic;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Index used by semantic search when none is named.
    pub default_vector_index: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self { path: data_dir.join("settings.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Falls back to defaults when the file is missing or unreadable.
    pub fn load(&self) -> UserSettings {
        if !self.path.exists() {
            return UserSettings::default();
        }
        match std::fs::read_to_string(&self.path).map_err(anyhow::Error::from).and_then(|raw| Ok(serde_json::from_str::<UserSettings>(&raw)?)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to load settings, using defaults");
                UserSettings::default()
            }
        }
    }

    pub fn save(&self, settings: &UserSettings) -> Result<()> {
        write_json_atomic(&self.path, settings)?;
        debug!(path = %self.path.display(), "saved settings");
        Ok(())
    }
}
