//! spotgrid.toml configuration loading.
//!
//! Settings are read once at process start from a TOML file and then
//! overridden by environment variables (env wins). The resulting
//! `SpotConfig` is read-only and passed by reference to the subsystems
//! that need it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// Missing required credentials are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SpotConfig {
    #[serde(default)]
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub job: JobConfig,
}

/// Marketplace API access.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarketplaceConfig {
    pub api_key: Option<String>,
    /// REST endpoint root. Overridable for tests.
    pub base_url: Option<String>,
}

/// Where the broker queue and status store keep their state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueConfig {
    pub data_dir: Option<PathBuf>,
}

/// Blob-store collaborator credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    pub repo_id: Option<String>,
    pub token: Option<String>,
}

/// Job parameters for a rental + dispatch run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobConfig {
    /// Price ceiling in dollars per hour.
    pub max_price: Option<f64>,
    pub max_nodes: Option<u32>,
    /// Docker image launched on rented nodes.
    pub image: Option<String>,
    /// Worker startup command. A default is synthesized when absent.
    pub command: Option<String>,
}

impl SpotConfig {
    /// Load from a TOML file, then apply environment overrides.
    ///
    /// A missing file is not an error: all settings can come from the
    /// environment alone, matching how workers on rented nodes are
    /// configured.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            SpotConfig::default()
        };
        config.apply_env_overrides(&env_snapshot());
        Ok(config)
    }

    /// Apply overrides from the given environment map. Env wins over
    /// file values.
    fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        if let Some(v) = env.get("SPOTGRID_API_KEY") {
            self.marketplace.api_key = Some(v.clone());
        }
        if let Some(v) = env.get("SPOTGRID_BASE_URL") {
            self.marketplace.base_url = Some(v.clone());
        }
        if let Some(v) = env.get("SPOTGRID_DATA_DIR") {
            self.queue.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env.get("SPOTGRID_STORE_REPO") {
            self.storage.repo_id = Some(v.clone());
        }
        if let Some(v) = env.get("SPOTGRID_STORE_TOKEN") {
            self.storage.token = Some(v.clone());
        }
        if let Some(v) = env.get("SPOTGRID_MAX_PRICE") {
            if let Ok(price) = v.parse() {
                self.job.max_price = Some(price);
            }
        }
        if let Some(v) = env.get("SPOTGRID_MAX_NODES") {
            if let Ok(nodes) = v.parse() {
                self.job.max_nodes = Some(nodes);
            }
        }
        if let Some(v) = env.get("SPOTGRID_IMAGE") {
            self.job.image = Some(v.clone());
        }
        if let Some(v) = env.get("SPOTGRID_COMMAND") {
            self.job.command = Some(v.clone());
        }
    }

    /// Validate that the credentials a driver run needs are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.marketplace.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Missing("marketplace.api_key"));
        }
        if self.storage.repo_id.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Missing("storage.repo_id"));
        }
        if self.storage.token.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::Missing("storage.token"));
        }
        Ok(())
    }

    /// The marketplace API key. Call `validate` first.
    pub fn api_key(&self) -> &str {
        self.marketplace.api_key.as_deref().unwrap_or("")
    }

    /// Data directory for queue and status state.
    pub fn data_dir(&self) -> PathBuf {
        self.queue
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/var/lib/spotgrid"))
    }
}

fn env_snapshot() -> HashMap<String, String> {
    std::env::vars().collect()
}
