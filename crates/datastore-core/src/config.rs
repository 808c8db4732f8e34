//! Store configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/datastore/config.toml)
//! 3. Environment variables (DATASTORE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix
const ENV_PREFIX: &str = "DATASTORE";

/// Default number of executed statements remembered for diagnostics
pub const DEFAULT_STATEMENT_HISTORY: usize = 32;

/// Default wait for a locked store file, in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Configuration for one store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Store name; the file is `<data_dir>/<store_name>.db`
    pub store_name: String,

    /// Size cap in bytes, applied as the store's page quota; `None` leaves
    /// the store unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Directory holding the store file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Keep the store in memory instead of on disk
    #[serde(default)]
    pub in_memory: bool,

    /// Expected schema version; `None` opens any version
    #[serde(default)]
    pub version: Option<u32>,

    /// How many executed statements to remember
    #[serde(default = "default_statement_history")]
    pub statement_history: usize,

    /// How long a transaction waits for another connection's lock before
    /// failing, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// Configuration with defaults for everything but the name
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            size: None,
            data_dir: default_data_dir(),
            in_memory: false,
            version: None,
            statement_history: DEFAULT_STATEMENT_HISTORY,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// In-memory store (for testing)
    pub fn in_memory(store_name: impl Into<String>) -> Self {
        Self {
            in_memory: true,
            ..Self::new(store_name)
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Load configuration from the default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (DATASTORE_DATA_DIR, DATASTORE_STORE_NAME,
    ///    DATASTORE_IN_MEMORY)
    /// 2. Config file (~/.config/datastore/config.toml or DATASTORE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used with store name `default`.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::new("default")
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: StoreConfig =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_STORE_NAME", ENV_PREFIX)) {
            if !val.is_empty() {
                self.store_name = val;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_IN_MEMORY", ENV_PREFIX)) {
            self.in_memory = val.eq_ignore_ascii_case("true") || val == "1";
        }
    }

    /// Get the config file path
    ///
    /// Can be overridden with the DATASTORE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("datastore")
            .join("config.toml")
    }

    /// Path of the store file
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.db", self.store_name))
    }
}

fn default_statement_history() -> usize {
    DEFAULT_STATEMENT_HISTORY
}

const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datastore")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Serializes tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap();
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "DATASTORE_DATA_DIR",
        "DATASTORE_STORE_NAME",
        "DATASTORE_IN_MEMORY",
    ];

    #[test]
    fn test_defaults() {
        let config = StoreConfig::new("app");
        assert!(config.size.is_none());
        assert_eq!(config.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
        assert!(!config.in_memory);
        assert!(config.version.is_none());
        assert_eq!(config.statement_history, DEFAULT_STATEMENT_HISTORY);
        assert!(config.data_dir.ends_with("datastore"));
    }

    #[test]
    fn test_store_path() {
        let config = StoreConfig::new("app").with_data_dir("/data");
        assert_eq!(config.store_path(), PathBuf::from("/data/app.db"));
    }

    #[test]
    fn test_load_from_str_fills_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = StoreConfig::load_from_str(
            r#"
            store_name = "contacts"
            data_dir = "/custom/data"
            version = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.store_name, "contacts");
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.version, Some(3));
        assert!(config.size.is_none());
    }

    #[test]
    fn test_load_from_str_requires_store_name() {
        let _guard = EnvGuard::new(ENV_VARS);
        assert!(StoreConfig::load_from_str("size = 10").is_err());
    }

    #[test]
    fn test_size_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = StoreConfig::load_from_str("store_name = \"app\"\nsize = 65536").unwrap();
        assert_eq!(config.size, Some(65536));
    }

    #[test]
    fn test_env_overrides() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = StoreConfig::new("app");
        env::set_var("DATASTORE_DATA_DIR", "/tmp/datastore-test");
        env::set_var("DATASTORE_STORE_NAME", "other");
        env::set_var("DATASTORE_IN_MEMORY", "1");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/datastore-test"));
        assert_eq!(config.store_name, "other");
        assert!(config.in_memory);

        // Empty store name leaves the configured one alone
        env::set_var("DATASTORE_STORE_NAME", "");
        config.apply_env_overrides();
        assert_eq!(config.store_name, "other");
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = StoreConfig::load_from_path(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.store_name, "default");
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = StoreConfig::new("app").with_version(2).with_size(4096);
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: StoreConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
