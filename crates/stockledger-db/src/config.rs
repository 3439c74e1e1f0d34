//! # Ledger Configuration
//!
//! Settings for the database and the appender.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`STOCKLEDGER_*`)
//! 2. Config file (`ledger.toml`)
//! 3. Defaults (this file)
//!
//! ## Config File Location
//! ```text
//! ~/.config/stockledger/ledger.toml                          (Linux)
//! ~/Library/Application Support/com.stockledger.ledger/...   (macOS)
//! ```
//!
//! ## Example
//! ```toml
//! # ledger.toml
//! [database]
//! path = "/var/lib/stockledger/ledger.db"
//! max_connections = 8
//! busy_timeout_ms = 5000
//!
//! [ledger]
//! lock_shards = 32
//! require_adjustment_reference = true
//! max_balance = "1000000"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::lock::DEFAULT_LOCK_SHARDS;
use crate::pool::DbConfig;
use stockledger_core::{BalanceCap, ConsistencyGuard, MovementPolicy, Quantity};

/// Largest accepted shard count.
const MAX_LOCK_SHARDS: usize = 4096;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

/// `[database]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file. `None` uses the platform data directory.
    pub path: Option<PathBuf>,

    /// Pool size.
    pub max_connections: u32,

    /// How long a writer waits for the SQLite write lock.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: None,
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

/// `[ledger]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Shards in the per-key lock table.
    pub lock_shards: usize,

    /// Adjustments must name the document that justifies them.
    pub require_adjustment_reference: bool,

    /// Optional ceiling for any single balance.
    pub max_balance: Option<Quantity>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            lock_shards: DEFAULT_LOCK_SHARDS,
            require_adjustment_reference: true,
            max_balance: None,
        }
    }
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`ledger.toml`), if it exists
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a config file without applying overrides.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, toml::to_string_pretty(self)?)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.ledger.lock_shards == 0 || self.ledger.lock_shards > MAX_LOCK_SHARDS {
            return Err(ConfigError::Invalid(format!(
                "ledger.lock_shards must be between 1 and {}",
                MAX_LOCK_SHARDS
            )));
        }

        if let Some(cap) = self.ledger.max_balance {
            if !cap.is_positive() {
                return Err(ConfigError::Invalid(
                    "ledger.max_balance must be positive".into(),
                ));
            }
        }

        Ok(())
    }

    /// Applies `STOCKLEDGER_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STOCKLEDGER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(value) = lookup("STOCKLEDGER_MAX_CONNECTIONS") {
            match value.parse::<u32>() {
                Ok(max) => self.database.max_connections = max,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLEDGER_MAX_CONNECTIONS"),
            }
        }

        if let Some(value) = lookup("STOCKLEDGER_LOCK_SHARDS") {
            match value.parse::<usize>() {
                Ok(shards) => self.ledger.lock_shards = shards,
                Err(_) => warn!(value = %value, "Ignoring invalid STOCKLEDGER_LOCK_SHARDS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockledger", "ledger")
            .map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    // =========================================================================
    // Derived Settings
    // =========================================================================

    /// Database file to open: the configured path or `ledger.db` in the
    /// platform data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }

        directories::ProjectDirs::from("com", "stockledger", "ledger")
            .map(|dirs| dirs.data_dir().join("ledger.db"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine data directory".into()))
    }

    /// Pool settings for [`crate::Database::new`].
    pub fn db_config(&self) -> ConfigResult<DbConfig> {
        Ok(DbConfig::new(self.database_path()?)
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms)))
    }

    /// Movement validation policy.
    pub fn policy(&self) -> MovementPolicy {
        MovementPolicy {
            require_adjustment_reference: self.ledger.require_adjustment_reference,
        }
    }

    /// Balance invariants: non-negative, plus the cap when configured.
    pub fn guard(&self) -> ConsistencyGuard {
        match self.ledger.max_balance {
            Some(cap) => ConsistencyGuard::default().with_rule(BalanceCap(cap)),
            None => ConsistencyGuard::default(),
        }
    }
}
