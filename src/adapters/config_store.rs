use std::fs;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

/// TOML-based configuration store with OS-specific paths.
pub struct TomlConfigStore {
    data_dir: PathBuf,
}

impl TomlConfigStore {
    /// Uses OS-specific application data directories.
    pub fn new() -> Result<Self, DomainError> {
        let data_dir = Self::get_data_dir()?;
        fs::create_dir_all(&data_dir)?;
        info!(data_dir = ?data_dir, "config store initialized");
        Ok(Self { data_dir })
    }

    #[cfg(test)]
    fn at(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// - macOS: ~/Library/Application Support/Parla/
    /// - Windows: %APPDATA%\Parla\
    /// - Linux: ~/.config/Parla/
    fn get_data_dir() -> Result<PathBuf, DomainError> {
        #[cfg(target_os = "macos")]
        {
            dirs::data_dir()
                .map(|p| p.join("Parla"))
                .ok_or_else(|| {
                    DomainError::Config("could not find application data directory".to_string())
                })
        }

        #[cfg(not(target_os = "macos"))]
        {
            dirs::config_dir()
                .map(|p| p.join("Parla"))
                .ok_or_else(|| {
                    DomainError::Config("could not find application data directory".to_string())
                })
        }
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        let config_path = self.config_path();

        if config_path.exists() {
            debug!(path = ?config_path, "loading configuration");
            let content = fs::read_to_string(&config_path)?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            info!(path = ?config_path, "configuration file not found, creating default");
            let config = AppConfig::new();
            self.save(&config)?;
            Ok(config)
        }
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        let config_path = self.config_path();
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(config)?;
        fs::write(&config_path, content)?;
        info!(path = ?config_path, "configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}
