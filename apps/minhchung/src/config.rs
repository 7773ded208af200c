//! # Configuration
//!
//! `minhchung.toml`, overlaid with environment variables.
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! cors_origins = ["https://minhchung.example.edu.vn"]
//! rate_limit = 100          # requests per second, 0 disables
//! body_limit_bytes = 8388608
//!
//! [storage]
//! database = "minhchung.redb"
//!
//! [allocation]
//! utc_offset_minutes = 420  # UTC+07:00
//! max_attempts = 5
//!
//! [[auth.tokens]]
//! token = "..."
//! user_id = 1
//! role = "admin"            # admin | manager | staff
//! ```
//!
//! ## Environment Overrides
//!
//! - `MINHCHUNG_DATABASE`, `MINHCHUNG_HOST`, `MINHCHUNG_PORT`
//! - `MINHCHUNG_CORS_ORIGINS`: comma-separated list, or `*` for all
//! - `MINHCHUNG_RATE_LIMIT`: requests per second
//! - `MINHCHUNG_API_KEY`: adds an admin token for user 1

use minhchung_core::UserId;
use minhchung_core::primitives::{DEFAULT_UTC_OFFSET_MINUTES, MAX_ALLOCATION_RETRIES};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "minhchung.toml";

/// Default request body limit (8 MiB). Restore uploads are the largest bodies.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 8 * 1024 * 1024;

/// Default rate limit in requests per second.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// User id attached to the `MINHCHUNG_API_KEY` token.
pub const API_KEY_USER: UserId = UserId(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub allocation: AllocationConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `None` allows localhost only; `["*"]` allows every origin.
    pub cors_origins: Option<Vec<String>>,
    pub rate_limit: u32,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cors_origins: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("minhchung.redb"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocationConfig {
    /// Minutes east of UTC used to stamp the period of new codes.
    pub utc_offset_minutes: i32,
    /// Total allocation attempts before giving up on a conflicting bucket.
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: DEFAULT_UTC_OFFSET_MINUTES,
            max_attempts: MAX_ALLOCATION_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

/// Caller role. Ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access.
    Staff,
    /// Issue, edit and delete evidence codes.
    Manager,
    /// Everything, including reference data and backups.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Staff => "staff",
            Self::Manager => "manager",
            Self::Admin => "admin",
        })
    }
}

/// One accepted bearer token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: u64,
    pub role: Role,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .finish()
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Load the config file, apply environment overrides and validate.
    ///
    /// With no explicit path, `minhchung.toml` is read if it exists and
    /// defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay `MINHCHUNG_*` variables read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(database) = var("MINHCHUNG_DATABASE") {
            self.storage.database = PathBuf::from(database);
        }
        if let Some(host) = var("MINHCHUNG_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("MINHCHUNG_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "MINHCHUNG_PORT",
                reason: format!("'{port}' is not a port number"),
            })?;
        }
        if let Some(origins) = var("MINHCHUNG_CORS_ORIGINS") {
            self.server.cors_origins = Some(
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(rate) = var("MINHCHUNG_RATE_LIMIT") {
            self.server.rate_limit = rate.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "MINHCHUNG_RATE_LIMIT",
                reason: format!("'{rate}' is not a number"),
            })?;
        }
        if let Some(key) = var("MINHCHUNG_API_KEY") {
            self.auth.tokens.retain(|t| t.token != key);
            self.auth.tokens.push(TokenConfig {
                token: key,
                user_id: API_KEY_USER.0,
                role: Role::Admin,
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "server.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ConfigError::Invalid {
                name: "server.body_limit_bytes",
                reason: "must be positive".to_string(),
            });
        }
        if self.allocation.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "allocation.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        // strictly inside one day, as FixedOffset requires
        if self.allocation.utc_offset_minutes.unsigned_abs() >= 24 * 60 {
            return Err(ConfigError::Invalid {
                name: "allocation.utc_offset_minutes",
                reason: format!("{} is out of range", self.allocation.utc_offset_minutes),
            });
        }

        let mut seen = BTreeSet::new();
        for token in &self.auth.tokens {
            if token.token.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    name: "auth.tokens",
                    reason: format!("empty token for user {}", token.user_id),
                });
            }
            if !seen.insert(token.token.as_str()) {
                return Err(ConfigError::Invalid {
                    name: "auth.tokens",
                    reason: format!("token for user {} is listed twice", token.user_id),
                });
            }
        }
        Ok(())
    }
}
