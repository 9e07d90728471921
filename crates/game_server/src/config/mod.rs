//! Configuration loading.
//!
//! The server reads a TOML file (created with defaults when missing), then
//! applies command-line overrides on top. The same [`ConfigSource`] is used
//! for the initial load and every reload, so overrides survive reloads.

pub mod settings;

pub use settings::{
    ConsoleSettings, FolderSettings, LoggingSettings, QuerySettings, RconSettings, ServerConfig,
    ServerSettings, WorldSettings,
};

use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_DIR: &str = "config";
pub const DEFAULT_CONFIG_FILE: &str = "lodestone.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write default configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Values given on the command line that win over the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub online_mode: Option<bool>,
    pub console: Option<bool>,
    pub plugins_dir: Option<String>,
    pub worlds_dir: Option<String>,
    pub update_dir: Option<String>,
    pub max_players: Option<u32>,
    pub world_name: Option<String>,
    pub log_pattern: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.server.ip = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(online_mode) = self.online_mode {
            config.server.online_mode = online_mode;
        }
        if let Some(console) = self.console {
            config.console.enabled = console;
        }
        if let Some(dir) = &self.plugins_dir {
            config.folders.plugins = dir.clone();
        }
        if let Some(dir) = &self.worlds_dir {
            config.worlds.folder = dir.clone();
        }
        if let Some(dir) = &self.update_dir {
            config.folders.update = dir.clone();
        }
        if let Some(max) = self.max_players {
            config.server.max_players = max;
        }
        if let Some(name) = &self.world_name {
            config.worlds.name = name.clone();
        }
        if let Some(pattern) = &self.log_pattern {
            config.console.log_file = pattern.clone();
        }
    }
}

/// Where configuration comes from: a directory, a file and the overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSource {
    pub dir: PathBuf,
    pub file: PathBuf,
    pub overrides: ConfigOverrides,
}

impl Default for ConfigSource {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            file: PathBuf::from(DEFAULT_CONFIG_FILE),
            overrides: ConfigOverrides::default(),
        }
    }
}

impl ConfigSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Full path of the configuration file. An absolute `file` ignores `dir`.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }

    /// Directory holding the persisted lists and the server icon.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads the file, applies overrides and validates the result.
    ///
    /// A missing file is created from the defaults.
    pub async fn load(&self) -> Result<ServerConfig, ConfigError> {
        let path = self.config_path();
        let mut config = load_from_file(&path).await?;
        self.overrides.apply(&mut config);
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

/// Reads a configuration file, writing the defaults there if it is missing.
pub async fn load_from_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    if tokio::fs::try_exists(path).await.map_err(io_err)? {
        let content = tokio::fs::read_to_string(path).await.map_err(io_err)?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    } else {
        let defaults = ServerConfig::default();
        let content = toml::to_string_pretty(&defaults)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, content).await.map_err(io_err)?;
        info!("Created default configuration file: {}", path.display());
        Ok(defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let source = ConfigSource::new(dir.path().join("config"));

        let config = source.load().await.unwrap();
        assert_eq!(config, ServerConfig::default());
        assert!(source.config_path().exists());

        // the written file loads back to the same configuration
        let reloaded = source.load().await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[server]\nport = 30000\nmax_players = 5\n",
        )
        .await
        .unwrap();

        let mut source = ConfigSource::new(dir.path());
        source.overrides.port = Some(31000);
        source.overrides.world_name = Some("creative".into());

        let config = source.load().await.unwrap();
        assert_eq!(config.server.port, 31000);
        assert_eq!(config.server.max_players, 5);
        assert_eq!(config.worlds.name, "creative");
    }

    #[tokio::test]
    async fn test_parse_error_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(&path, "[server\nport = ").await.unwrap();

        let err = ConfigSource::new(dir.path()).load().await.unwrap_err();
        match err {
            ConfigError::Parse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[logging]\nlevel = \"chatty\"\n",
        )
        .await
        .unwrap();

        let err = ConfigSource::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref p) if p.len() == 1));
    }

    #[test]
    fn test_absolute_file_ignores_dir() {
        let source = ConfigSource {
            dir: PathBuf::from("config"),
            file: PathBuf::from("/etc/lodestone.toml"),
            overrides: ConfigOverrides::default(),
        };
        assert_eq!(source.config_path(), PathBuf::from("/etc/lodestone.toml"));
    }
}
