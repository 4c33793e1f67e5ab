use std::path::Path;

use relup::UpdaterConfig;
use serde::{Deserialize, Serialize};

use crate::paths::HelloPaths;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloSettings {
    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_repo")]
    pub repo: String,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default)]
    pub updater: UpdaterConfig,
}

fn default_owner() -> String {
    "relup-rs".to_string()
}

fn default_repo() -> String {
    "relup".to_string()
}

fn default_file_prefix() -> String {
    "relup-hello-".to_string()
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for HelloSettings {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            repo: default_repo(),
            file_prefix: default_file_prefix(),
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
            updater: UpdaterConfig::default(),
        }
    }
}

impl HelloSettings {
    pub fn load() -> Self {
        let Ok(paths) = HelloPaths::new() else {
            return Self::default();
        };
        Self::load_or_create(&paths.settings_file())
    }

    /// Like [`HelloSettings::load_from`], but writes the defaults to `path`
    /// when no file exists yet so they can be edited.
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        if let Err(error) = settings.save_to(path) {
            eprintln!(
                "Could not write default settings to {}: {error}",
                path.display()
            );
        }
        settings
    }

    /// Read settings from `path`; a missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                eprintln!("Ignoring invalid settings file {}: {error}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write settings as pretty JSON, creating parent directories.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }
}
