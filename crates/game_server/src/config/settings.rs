//! Configuration schema.
//!
//! Every section and field has a serde default so partial files load, and a
//! missing file is written out from [`ServerConfig::default`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete server configuration as read from `lodestone.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub query: QuerySettings,
    pub rcon: RconSettings,
    pub worlds: WorldSettings,
    pub folders: FolderSettings,
    pub console: ConsoleSettings,
    pub logging: LoggingSettings,
    /// Command aliases: alias name to the command lines it expands to.
    pub aliases: BTreeMap<String, Vec<String>>,
}

/// Primary game service and player-facing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind; empty binds every interface
    pub ip: String,
    /// 0 lets the OS pick a free port
    pub port: u16,
    pub name: String,
    pub motd: String,
    pub max_players: u32,
    /// Whether logins are verified against the authentication service
    pub online_mode: bool,
    /// Whether the server sits behind a forwarding proxy
    pub proxy_support: bool,
    pub whitelist: bool,
    pub spawn_radius: u32,
    /// Minutes before idle players are kicked (0 disables)
    pub idle_timeout: u32,
    /// Server tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Seconds the shutdown watchdog waits before forcing the process down
    pub shutdown_grace_secs: u64,
    pub shutdown_message: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ip: String::new(),
            port: 25565,
            name: "Lodestone Server".to_string(),
            motd: "A Lodestone server".to_string(),
            max_players: 20,
            online_mode: true,
            proxy_support: false,
            whitelist: false,
            spawn_radius: 16,
            idle_timeout: 0,
            tick_interval_ms: 50,
            shutdown_grace_secs: crate::shutdown::DEFAULT_GRACE.as_secs(),
            shutdown_message: "Server shutting down.".to_string(),
        }
    }
}

/// Status query service (UDP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub enabled: bool,
    pub port: u16,
    /// Whether the plugin list is exposed in full query responses
    pub plugins: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 25565,
            plugins: true,
        }
    }
}

/// Remote console service (TCP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconSettings {
    pub enabled: bool,
    pub port: u16,
    pub password: String,
    pub colors: bool,
}

impl Default for RconSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 25575,
            password: "lodestone".to_string(),
            colors: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Name of the primary world; dimensions derive their names from it
    pub name: String,
    /// Seed text; empty picks a random seed
    pub seed: String,
    pub level_type: String,
    pub generate_structures: bool,
    pub allow_nether: bool,
    pub allow_end: bool,
    /// Directory containing every world folder
    pub folder: String,
    /// Generator overrides keyed by world name
    pub generators: BTreeMap<String, String>,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            seed: String::new(),
            level_type: "default".to_string(),
            generate_structures: true,
            allow_nether: true,
            allow_end: true,
            folder: "worlds".to_string(),
            generators: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderSettings {
    pub plugins: String,
    /// Pending plugin updates, moved into `plugins` before loading
    pub update: String,
}

impl Default for FolderSettings {
    fn default() -> Self {
        Self {
            plugins: "plugins".to_string(),
            update: "update".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    pub enabled: bool,
    /// Log file pattern; `%D` expands to the current date. Empty disables.
    pub log_file: String,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: "logs/log-%D.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServerConfig {
    /// Checks the configuration, collecting every problem rather than
    /// stopping at the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.server.max_players == 0 {
            problems.push("server.max_players must be at least 1".to_string());
        }
        if self.server.tick_interval_ms == 0 {
            problems.push("server.tick_interval_ms must be at least 1".to_string());
        }
        if self.server.shutdown_grace_secs == 0 {
            problems.push("server.shutdown_grace_secs must be at least 1".to_string());
        }

        let world = &self.worlds.name;
        if world.trim().is_empty() {
            problems.push("worlds.name cannot be empty".to_string());
        } else if world.contains(['/', '\\']) || world == "." || world == ".." {
            problems.push(format!("worlds.name '{world}' is not a valid folder name"));
        }

        if self.folders.plugins.is_empty() {
            problems.push("folders.plugins cannot be empty".to_string());
        }

        if self.rcon.enabled && self.rcon.password.is_empty() {
            problems.push("rcon.password must be set when rcon is enabled".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            problems.push(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                self.logging.level
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.ip, "");
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.server.shutdown_grace_secs, 5);
        assert!(!config.query.enabled);
        assert!(!config.rcon.enabled);
        assert_eq!(config.worlds.name, "world");
        assert!(config.worlds.allow_nether);
        assert!(config.worlds.allow_end);
        assert_eq!(config.console.log_file, "logs/log-%D.txt");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
[server]
port = 25570

[worlds]
name = "survival"
"#,
        )
        .unwrap();
        assert_eq!(config.server.port, 25570);
        assert_eq!(config.server.max_players, 20);
        assert_eq!(config.worlds.name, "survival");
        assert_eq!(config.worlds.folder, "worlds");
        assert_eq!(config.rcon.port, 25575);
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = ServerConfig::default();
        config.server.max_players = 0;
        config.worlds.name = "../escape".to_string();
        config.rcon.enabled = true;
        config.rcon.password.clear();
        config.logging.level = "loud".to_string();

        let problems = config.validate().unwrap_err();
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("server.max_players")));
        assert!(problems.iter().any(|p| p.contains("worlds.name")));
        assert!(problems.iter().any(|p| p.contains("rcon.password")));
        assert!(problems.iter().any(|p| p.contains("Invalid log level")));
    }

    #[test]
    fn test_aliases_table() {
        let config: ServerConfig = toml::from_str(
            r#"
[aliases]
gm = ["gamemode $1"]
bye = ["save-all", "stop"]
"#,
        )
        .unwrap();
        assert_eq!(config.aliases["bye"], vec!["save-all", "stop"]);
    }
}
