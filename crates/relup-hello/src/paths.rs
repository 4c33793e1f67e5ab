use std::path::PathBuf;
use thiserror::Error;

const APP_DIR: &str = "relup-hello";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HelloPathsError {
    #[error("Could not determine config directory")]
    ConfigDirUnavailable,
    #[error("Could not determine data directory")]
    DataDirUnavailable,
}

pub struct HelloPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl HelloPaths {
    /// Resolve per-user directories for the demo.
    ///
    /// # Errors
    /// Returns an error when the platform config or data directory is unknown.
    pub fn new() -> Result<Self, HelloPathsError> {
        Ok(Self {
            config_dir: dirs::config_dir()
                .ok_or(HelloPathsError::ConfigDirUnavailable)?
                .join(APP_DIR),
            data_dir: dirs::data_dir()
                .ok_or(HelloPathsError::DataDirUnavailable)?
                .join(APP_DIR),
        })
    }

    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("update.log")
    }

    /// Create the config and data directories.
    ///
    /// # Errors
    /// Returns an error if either directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}
