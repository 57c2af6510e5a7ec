//! Configuration loaded from environment variables

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::protect::{AesProtectHandler, ProtectFieldHandler};
use crate::query::pagination::DEFAULT_PAGE_SIZE;

/// Runtime configuration
#[derive(Clone)]
pub struct Config {
    /// SQLite URL (`sqlite://path.db` or `sqlite::memory:`)
    pub database_url: String,

    /// Maximum pooled connections
    pub database_max_connections: u32,

    /// Page size used when a request does not name one
    pub default_page_size: u64,

    /// Upper bound for requested page sizes
    pub max_page_size: u64,

    /// Base64-encoded 32-byte key for protected fields
    pub protect_key: Option<String>,

    /// Encrypt protected field values before comparing them
    pub enable_data_protect: bool,

    /// Fallback tracing filter when RUST_LOG is unset
    pub log_filter: String,

    /// Emit logs as JSON lines
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            database_max_connections: 10,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: 1000,
            protect_key: None,
            enable_data_protect: false,
            log_filter: "querybind=info".to_string(),
            log_json: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("database_max_connections", &self.database_max_connections)
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .field("protect_key", &self.protect_key.as_ref().map(|_| "..."))
            .field("enable_data_protect", &self.enable_data_protect)
            .field("log_filter", &self.log_filter)
            .field("log_json", &self.log_json)
            .finish()
    }
}

fn flag(value: &str) -> bool {
    value == "true" || value == "1"
}

impl Config {
    /// Load `.env` if present, then read the environment.
    pub fn load() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),

            database_max_connections: match env::var("DATABASE_MAX_CONNECTIONS") {
                Ok(v) => v.parse().context("Invalid DATABASE_MAX_CONNECTIONS")?,
                Err(_) => defaults.database_max_connections,
            },

            default_page_size: match env::var("QUERYBIND_PAGE_SIZE") {
                Ok(v) => v.parse().context("Invalid QUERYBIND_PAGE_SIZE")?,
                Err(_) => defaults.default_page_size,
            },

            max_page_size: match env::var("QUERYBIND_MAX_PAGE_SIZE") {
                Ok(v) => v.parse().context("Invalid QUERYBIND_MAX_PAGE_SIZE")?,
                Err(_) => defaults.max_page_size,
            },

            protect_key: env::var("QUERYBIND_PROTECT_KEY").ok().filter(|k| !k.trim().is_empty()),

            enable_data_protect: env::var("QUERYBIND_ENABLE_DATA_PROTECT")
                .map(|v| flag(&v))
                .unwrap_or(false),

            log_filter: env::var("QUERYBIND_LOG").unwrap_or(defaults.log_filter),

            log_json: env::var("QUERYBIND_LOG_JSON")
                .map(|v| flag(&v))
                .unwrap_or(false),
        })
    }

    /// The field protection handler, when enabled and a key is configured.
    pub fn protect_handler(&self) -> Result<Option<Arc<dyn ProtectFieldHandler>>> {
        if !self.enable_data_protect {
            return Ok(None);
        }
        let Some(key) = &self.protect_key else {
            tracing::warn!("Data protection enabled but QUERYBIND_PROTECT_KEY is not set");
            return Ok(None);
        };
        let handler = AesProtectHandler::from_base64(key).context("Invalid QUERYBIND_PROTECT_KEY")?;
        Ok(Some(Arc::new(handler)))
    }
}
