//! User preferences persisted between sessions.
//!
//! Only form inputs are kept: the last raster URL and the override fields.
//! The selection rectangle is never written to disk.

use crate::error::Result;
use crate::workflow::TargetForm;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Preferences stored as JSON in the user's config directory
/// (e.g. `~/.config/cogclip/settings.json` on Linux).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Raster loaded most recently.
    pub last_cog_url: String,
    pub epsg: String,
    pub epsg_enabled: bool,
    pub cellsize_x: String,
    pub cellsize_y: String,
    pub cellsize_enabled: bool,
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cogclip").map(|dirs| {
            let config_dir = dirs.config_dir();
            if !config_dir.exists() {
                let _ = fs::create_dir_all(config_dir);
            }
            config_dir.join("settings.json")
        })
    }

    /// Loads settings from disk, falling back to defaults.
    pub fn load() -> Self {
        Self::config_path()
            .and_then(|path| fs::read_to_string(&path).ok())
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            let json = serde_json::to_string_pretty(self)?;
            fs::write(&path, json)?;
            debug!(path = %path.display(), "settings saved");
        }
        Ok(())
    }

    /// Form prefilled with the saved overrides. Disabled overrides start
    /// blank so the raster's own values can fill them.
    pub fn form(&self) -> TargetForm {
        TargetForm {
            epsg: if self.epsg_enabled { self.epsg.clone() } else { String::new() },
            epsg_enabled: self.epsg_enabled,
            cellsize_x: if self.cellsize_enabled { self.cellsize_x.clone() } else { String::new() },
            cellsize_y: if self.cellsize_enabled { self.cellsize_y.clone() } else { String::new() },
            cellsize_enabled: self.cellsize_enabled,
        }
    }

    /// Copies the current override fields from `form`.
    pub fn remember_form(&mut self, form: &TargetForm) {
        self.epsg = form.epsg.clone();
        self.epsg_enabled = form.epsg_enabled;
        self.cellsize_x = form.cellsize_x.clone();
        self.cellsize_y = form.cellsize_y.clone();
        self.cellsize_enabled = form.cellsize_enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn older_files_missing_fields_still_load() {
        let settings: Settings =
            serde_json::from_str(r#"{"last_cog_url":"https://bucket/a.tif"}"#).unwrap();
        assert_eq!(settings.last_cog_url, "https://bucket/a.tif");
        assert!(!settings.epsg_enabled);
    }

    #[test]
    fn form_only_restores_enabled_overrides() {
        let mut settings = Settings::default();
        settings.remember_form(&TargetForm {
            epsg: "3857".into(),
            epsg_enabled: true,
            cellsize_x: "30".into(),
            cellsize_y: "-30".into(),
            cellsize_enabled: false,
        });
        let form = settings.form();
        assert_eq!(form.epsg, "3857");
        assert!(form.epsg_enabled);
        assert_eq!(form.cellsize_x, "");
        assert!(!form.cellsize_enabled);
    }
}
