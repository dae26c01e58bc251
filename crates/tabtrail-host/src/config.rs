//! Host configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabtrail_core::EngineConfig;

/// Where window histories are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Browser session storage, reached through the bridge.
    #[default]
    Session,
    /// Process memory; histories are lost when the host exits.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_menu_limit")]
    pub menu_limit: usize,
    #[serde(default = "default_menu_title_max")]
    pub menu_title_max: usize,
    #[serde(default = "default_menu_lock_timeout_ms")]
    pub menu_lock_timeout_ms: u64,
    #[serde(default = "default_host_call_timeout_ms")]
    pub host_call_timeout_ms: u64,
    #[serde(default)]
    pub persistence: Persistence,
    #[serde(default = "default_manager_page")]
    pub manager_page: String,
    #[serde(default = "default_manager_width")]
    pub manager_width: u32,
    #[serde(default = "default_manager_height")]
    pub manager_height: u32,
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_history_capacity() -> usize {
    50
}

fn default_menu_limit() -> usize {
    20
}

fn default_menu_title_max() -> usize {
    50
}

/// A whole rebuild spans several host calls, so it gets more time than one call.
fn default_menu_lock_timeout_ms() -> u64 {
    15000
}

fn default_host_call_timeout_ms() -> u64 {
    5000
}

fn default_manager_page() -> String {
    "tab_manager.html".to_string()
}

fn default_manager_width() -> u32 {
    420
}

fn default_manager_height() -> u32 {
    600
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    47615
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            menu_limit: default_menu_limit(),
            menu_title_max: default_menu_title_max(),
            menu_lock_timeout_ms: default_menu_lock_timeout_ms(),
            host_call_timeout_ms: default_host_call_timeout_ms(),
            persistence: Persistence::default(),
            manager_page: default_manager_page(),
            manager_width: default_manager_width(),
            manager_height: default_manager_height(),
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the platform config directory, or fall back to defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// `<config dir>/tabtrail/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tabtrail").join("config.toml"))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.host_call_timeout_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            history_capacity: self.history_capacity,
            menu_limit: self.menu_limit,
            menu_title_max: self.menu_title_max,
            menu_lock_timeout: Duration::from_millis(self.menu_lock_timeout_ms),
            manager_page: self.manager_page.clone(),
            manager_width: self.manager_width,
            manager_height: self.manager_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.menu_limit, 20);
        assert_eq!(config.persistence, Persistence::Session);
        assert!(!config.http.enabled);
        assert_eq!(config.http.port, 47615);
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert!(config.engine_config().menu_lock_timeout > config.call_timeout());
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "history_capacity = 10\npersistence = \"memory\"\n\n[http]\nenabled = true\nport = 9000"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.persistence, Persistence::Memory);
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "127.0.0.1");
    }

    #[test]
    fn test_engine_config_mirrors_fields() {
        let config = Config {
            menu_lock_timeout_ms: 250,
            manager_page: "manager.html".to_string(),
            ..Config::default()
        };
        let engine = config.engine_config();
        assert_eq!(engine.menu_lock_timeout, Duration::from_millis(250));
        assert_eq!(engine.manager_page, "manager.html");
        assert_eq!(engine.manager_width, 420);
    }

    #[test]
    fn test_unknown_persistence_is_rejected() {
        assert!(toml::from_str::<Config>("persistence = \"disk\"").is_err());
    }
}
