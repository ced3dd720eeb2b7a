//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::context::Mode;
use crate::error::{ApiqlError, ApiqlResult};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiqlConfig {
    /// Entries kept in the in-process query tier before it resets
    pub cache_capacity: usize,

    /// Lifetime of an entry in the durable tier
    pub durable_ttl_secs: u64,

    /// Durable-tier key prefix, followed by the fingerprint
    pub cache_key_prefix: String,

    /// Raise on unknown fields, denials and unrenderable values
    pub strict: bool,

    /// Page size of model listings when the call omits it
    pub default_page_size: u64,
}

impl Default for ApiqlConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            durable_ttl_secs: 31 * DAY_SECS,
            cache_key_prefix: "apiql-cache-".to_string(),
            strict: false,
            default_page_size: 10,
        }
    }
}

impl ApiqlConfig {
    pub fn builder() -> ApiqlConfigBuilder {
        ApiqlConfigBuilder::default()
    }

    pub fn from_toml_str(content: &str) -> ApiqlResult<Self> {
        toml::from_str(content).map_err(|e| ApiqlError::Config(e.to_string()))
    }

    /// Load from an explicit file. The file must exist.
    pub fn load(path: impl AsRef<Path>) -> ApiqlResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| ApiqlError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `<config dir>/apiql/config.toml`, or defaults when it is absent.
    pub fn load_default() -> ApiqlResult<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("apiql").join("config.toml"))
    }

    pub fn mode(&self) -> Mode {
        if self.strict { Mode::Strict } else { Mode::Lenient }
    }

    pub fn durable_ttl(&self) -> Duration {
        Duration::from_secs(self.durable_ttl_secs)
    }
}

/// Builder for ApiqlConfig
#[derive(Debug, Default)]
pub struct ApiqlConfigBuilder {
    config: ApiqlConfig,
}

impl ApiqlConfigBuilder {
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn durable_ttl(mut self, ttl: Duration) -> Self {
        self.config.durable_ttl_secs = ttl.as_secs();
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.cache_key_prefix = prefix.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.config.strict = strict;
        self
    }

    pub fn default_page_size(mut self, page_size: u64) -> Self {
        self.config.default_page_size = page_size;
        self
    }

    pub fn build(self) -> ApiqlConfig {
        self.config
    }
}
