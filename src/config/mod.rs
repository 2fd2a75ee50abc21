//! Configuration management for Kiln

pub mod schema;

pub use schema::{CacheConfig, Config, ProxyConfig, RestoreConfig, SourceConfig};

use crate::error::{KilnError, KilnResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("config.toml")
    }

    /// Default HTTP cache root
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
            .join("http-cache")
    }

    /// Cache root for `config`, falling back to the platform default
    pub fn cache_dir(config: &Config) -> PathBuf {
        config
            .cache
            .dir
            .clone()
            .unwrap_or_else(Self::default_cache_dir)
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> KilnResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> KilnResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| KilnError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.restore.parallel, 8);
    }

    #[tokio::test]
    async fn load_reads_sources_and_cache_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "[cache]\ndir = {:?}\nmax_age_secs = 60\n\n\
                 [[sources]]\nname = \"feed\"\nurl = \"https://feed.example.com/\"\n",
                temp.path().join("cache")
            ),
        )
        .unwrap();

        let loaded = ConfigManager::with_path(path).load().await.unwrap();

        assert_eq!(ConfigManager::cache_dir(&loaded), temp.path().join("cache"));
        assert_eq!(loaded.cache.max_age_secs, 60);
        assert_eq!(loaded.sources[0].url, "https://feed.example.com/");
        assert_eq!(loaded.restore.parallel, 8);
    }

    #[tokio::test]
    async fn invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[restore]\nparallel = \"many\"").unwrap();

        let err = ConfigManager::with_path(path.clone())
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, KilnError::ConfigInvalid { path: p, .. } if p == path));
    }

    #[test]
    fn default_cache_dir_is_namespaced() {
        let dir = ConfigManager::default_cache_dir();
        assert!(dir.ends_with("kiln/http-cache"));
        assert_eq!(ConfigManager::cache_dir(&Config::default()), dir);
    }
}
