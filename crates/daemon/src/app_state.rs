//! Heirloom config directory management
//!
//! Loading and managing daemon configuration from a config directory
//! (~/.heirloom or a custom path). Used by the CLI entrypoints.

use std::time::Duration;
use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

use blob_store::{BlobStoreConfig, PrimaryStoreConfig};
use common::capsule::{EngineLimits, SchedulerConfig};
use common::prelude::Cipher;

pub const APP_NAME: &str = "heirloom";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "heirloom.db";
pub const KEY_FILE_NAME: &str = "master.key";
pub const BLOBS_DIR_NAME: &str = "blobs";

/// Environment variable holding a hex master key. Takes precedence over
/// the key file so deployments can keep the key out of the directory.
pub const MASTER_KEY_ENV: &str = "HEIRLOOM_MASTER_KEY";

/// Configuration stored in config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port the HTTP API listens on
    pub api_port: u16,
    /// Daemon log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Database file override; defaults to heirloom.db inside the directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<PathBuf>,
    /// Base URL of the web portal, linked from outbound notices
    pub portal_url: String,
    /// Storage backend for encrypted payloads
    #[serde(default)]
    pub blob_store: BlobStoreConfig,
    /// Background sweep cadences
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Request size caps
    #[serde(default)]
    pub limits: LimitsSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: 5150,
            log_level: "info".to_string(),
            log_dir: None,
            sqlite_path: None,
            portal_url: "http://localhost:5150".to_string(),
            blob_store: BlobStoreConfig::default(),
            scheduler: SchedulerSection::default(),
            limits: LimitsSection::default(),
        }
    }
}

/// `[scheduler]` table: sweep cadences in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    pub sweep_interval_secs: u64,
    pub deep_sweep_interval_secs: u64,
    pub unlock_timeout_secs: u64,
    pub batch_limit: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let config = SchedulerConfig::default();
        Self {
            sweep_interval_secs: config.sweep_interval.as_secs(),
            deep_sweep_interval_secs: config.deep_sweep_interval.as_secs(),
            unlock_timeout_secs: config.unlock_timeout.as_secs(),
            batch_limit: config.batch_limit,
        }
    }
}

impl SchedulerSection {
    pub fn to_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            deep_sweep_interval: Duration::from_secs(self.deep_sweep_interval_secs),
            unlock_timeout: Duration::from_secs(self.unlock_timeout_secs),
            batch_limit: self.batch_limit,
        }
    }
}

/// `[limits]` table: request size caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    pub max_payload_bytes: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_payload_bytes: EngineLimits::default().max_payload_bytes,
        }
    }
}

impl LimitsSection {
    pub fn to_limits(&self) -> EngineLimits {
        EngineLimits {
            max_payload_bytes: self.max_payload_bytes,
        }
    }
}

/// A Heirloom config directory on disk
#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the heirloom directory (~/.heirloom or custom)
    pub heirloom_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the master key file
    pub key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the heirloom directory path (custom or default ~/.heirloom)
    pub fn heirloom_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, AppStateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(AppStateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Check if the heirloom directory exists
    pub fn exists(custom_path: Option<PathBuf>) -> Result<bool, AppStateError> {
        let heirloom_dir = Self::heirloom_dir(custom_path)?;
        Ok(heirloom_dir.exists())
    }

    /// Initialize a new heirloom directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, AppStateError> {
        let heirloom_dir = Self::heirloom_dir(custom_path)?;

        if heirloom_dir.exists() {
            return Err(AppStateError::AlreadyInitialized);
        }

        fs::create_dir_all(&heirloom_dir)?;

        // Generate and save the master key
        let key = Cipher::generate();
        let key_path = heirloom_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, key.to_hex())?;

        // Starter configs point the blob store at a directory inside the
        // heirloom dir, so a fresh install persists payloads out of the box.
        let config = config.unwrap_or_else(|| AppConfig {
            blob_store: BlobStoreConfig {
                primary: PrimaryStoreConfig::Local {
                    path: heirloom_dir.join(BLOBS_DIR_NAME),
                },
                legacy: None,
            },
            ..Default::default()
        });
        if let PrimaryStoreConfig::Local { path } = &config.blob_store.primary {
            fs::create_dir_all(path)?;
        }

        let config_path = heirloom_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // Create an empty database file; the daemon migrates it on first
        // connect.
        let db_path = heirloom_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            heirloom_dir,
            db_path,
            key_path,
            config_path,
            config,
        })
    }

    /// Load existing state from a heirloom directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, AppStateError> {
        let heirloom_dir = Self::heirloom_dir(custom_path)?;

        if !heirloom_dir.exists() {
            return Err(AppStateError::NotInitialized);
        }

        let config_path = heirloom_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(AppStateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        // The key file may be absent when the key arrives via environment.
        let key_path = heirloom_dir.join(KEY_FILE_NAME);
        if std::env::var(MASTER_KEY_ENV).is_err() && !key_path.exists() {
            return Err(AppStateError::MissingFile(KEY_FILE_NAME.to_string()));
        }

        // SQLite creates the database on first connect, so no existence
        // check here.
        let db_path = config
            .sqlite_path
            .clone()
            .unwrap_or_else(|| heirloom_dir.join(DB_FILE_NAME));

        Ok(Self {
            heirloom_dir,
            db_path,
            key_path,
            config_path,
            config,
        })
    }

    /// Load or initialize state from a heirloom directory
    pub fn load_or_init(
        custom_path: Option<PathBuf>,
        default_config: Option<AppConfig>,
    ) -> Result<Self, AppStateError> {
        match Self::load(custom_path.clone()) {
            Ok(state) => Ok(state),
            Err(AppStateError::NotInitialized) => Self::init(custom_path, default_config),
            Err(e) => Err(e),
        }
    }

    /// Load the master key, preferring the environment variable over the
    /// key file
    pub fn load_key(&self) -> Result<Cipher, AppStateError> {
        if let Ok(hex) = std::env::var(MASTER_KEY_ENV) {
            return Cipher::from_hex(&hex).map_err(|e| AppStateError::InvalidKey(e.to_string()));
        }

        let hex = fs::read_to_string(&self.key_path)?;
        Cipher::from_hex(&hex).map_err(|e| AppStateError::InvalidKey(e.to_string()))
    }

    /// Convert to the daemon's runtime configuration
    pub fn to_service_config(&self) -> Result<crate::ServiceConfig, AppStateError> {
        let master_key = self.load_key()?;
        let log_level = self
            .config
            .log_level
            .parse()
            .map_err(|_| AppStateError::InvalidLogLevel(self.config.log_level.clone()))?;

        Ok(crate::ServiceConfig {
            api_port: self.config.api_port,
            sqlite_path: Some(self.db_path.clone()),
            log_level,
            log_dir: self.config.log_dir.clone(),
            portal_url: self.config.portal_url.clone(),
            blob_store: self.config.blob_store.clone(),
            master_key,
            scheduler: self.config.scheduler.to_config(),
            limits: self.config.limits.to_limits(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppStateError {
    #[error("heirloom directory not initialized. Run 'heirloom init' first or use --config-path")]
    NotInitialized,

    #[error("heirloom directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid master key: {0}")]
    InvalidKey(String),

    #[error("unrecognized log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch_dir() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("heirloom");
        (tmp, dir)
    }

    #[test]
    fn test_init_writes_the_directory_layout() {
        let (_tmp, dir) = scratch_dir();

        let state = AppState::init(Some(dir.clone()), None).unwrap();

        assert!(state.config_path.exists());
        assert!(state.key_path.exists());
        assert!(state.db_path.exists());
        assert!(dir.join(BLOBS_DIR_NAME).exists());
        assert!(matches!(
            state.config.blob_store.primary,
            PrimaryStoreConfig::Local { .. }
        ));
    }

    #[test]
    fn test_init_refuses_an_existing_directory() {
        let (_tmp, dir) = scratch_dir();
        AppState::init(Some(dir.clone()), None).unwrap();

        assert!(matches!(
            AppState::init(Some(dir), None),
            Err(AppStateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_round_trips_the_config() {
        let (_tmp, dir) = scratch_dir();
        let written = AppState::init(Some(dir.clone()), None).unwrap();

        let loaded = AppState::load(Some(dir)).unwrap();
        assert_eq!(loaded.config.api_port, written.config.api_port);
        assert_eq!(loaded.config.portal_url, written.config.portal_url);
        assert_eq!(
            loaded.config.scheduler.sweep_interval_secs,
            written.config.scheduler.sweep_interval_secs
        );
    }

    #[test]
    fn test_load_requires_initialization() {
        let (_tmp, dir) = scratch_dir();

        assert!(matches!(
            AppState::load(Some(dir)),
            Err(AppStateError::NotInitialized)
        ));
    }

    #[test]
    fn test_key_file_round_trips() {
        let (_tmp, dir) = scratch_dir();
        let state = AppState::init(Some(dir), None).unwrap();

        let cipher = state.load_key().unwrap();
        let written = std::fs::read_to_string(&state.key_path).unwrap();
        assert_eq!(cipher.to_hex(), written.trim());
    }

    #[test]
    fn test_rejects_a_garbage_key_file() {
        let (_tmp, dir) = scratch_dir();
        let state = AppState::init(Some(dir), None).unwrap();
        std::fs::write(&state.key_path, "not hex at all").unwrap();

        assert!(matches!(
            state.load_key(),
            Err(AppStateError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_service_config_rejects_bad_log_level() {
        let (_tmp, dir) = scratch_dir();
        let mut state = AppState::init(Some(dir), None).unwrap();
        state.config.log_level = "shouting".to_string();

        assert!(matches!(
            state.to_service_config(),
            Err(AppStateError::InvalidLogLevel(_))
        ));
    }
}
