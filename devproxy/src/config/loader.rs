use crate::config::types::Settings;
use crate::error::{Error, Result};
use log::{debug, trace, warn};
use std::path::Path;

impl Settings {
    /// Load settings from a JSON file. A missing file is created with the defaults.
    pub async fn try_load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading settings from: {}", path.display());
        let settings = if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            serde_json::from_str::<Settings>(&content)
                .map_err(|e| Error::configuration(format!("Failed to parse settings file {}: {}", path.display(), e)))?
        } else {
            warn!("Settings file not found, writing defaults to {}", path.display());
            let settings = Self::default();
            settings.save(path).await?;
            settings
        };
        trace!("Loaded settings: {:#?}", settings);
        Ok(settings)
    }

    /// Save the settings as pretty JSON, creating parent directories as needed
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!("Saving settings to: {}", path.display());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|e| Error::configuration(e.to_string()))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
