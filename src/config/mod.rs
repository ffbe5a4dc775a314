//! Server configuration
//!
//! Read from `config.yml` (path overridable with `EXPENSE_CONFIG`), then
//! patched from `EXPENSE_*` environment variables and the bare `PORT`,
//! `DATABASE_URL`, `JWT_SECRET` and `GOOGLE_CLIENT_ID` names. A missing
//! or empty file yields the defaults; each absent key falls back on its own.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Secret used when nothing is configured. Fine for local development only.
pub const DEVELOPMENT_JWT_SECRET: &str = "development_secret";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the frontend)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Pool size; unset picks a per-driver default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: None,
        }
    }
}

fn default_database_url() -> String {
    "data/expenses.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

impl FromStr for DatabaseDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::Mysql),
            other => Err(ConfigError::ValidationError(format!(
                "unknown database driver '{}'",
                other
            ))),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Lifetime of tokens issued by password login
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Lifetime of tokens issued by third-party login
    #[serde(default = "default_token_ttl_hours")]
    pub third_party_token_ttl_hours: i64,
    /// OAuth client id expected as the audience of Google ID tokens
    #[serde(default)]
    pub google_client_id: String,
    /// How long fetched Google signing keys are reused
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
            third_party_token_ttl_hours: default_token_ttl_hours(),
            google_client_id: String::new(),
            jwks_cache_seconds: default_jwks_cache_seconds(),
        }
    }
}

fn default_jwt_secret() -> String {
    DEVELOPMENT_JWT_SECRET.to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_jwks_cache_seconds() -> u64 {
    3600
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - EXPENSE_SERVER_HOST / EXPENSE_SERVER_PORT / EXPENSE_SERVER_CORS_ORIGIN
    /// - EXPENSE_DATABASE_DRIVER / EXPENSE_DATABASE_URL / EXPENSE_DATABASE_MAX_CONNECTIONS
    /// - EXPENSE_AUTH_JWT_SECRET / EXPENSE_AUTH_TOKEN_TTL_HOURS
    /// - EXPENSE_AUTH_THIRD_PARTY_TOKEN_TTL_HOURS / EXPENSE_AUTH_GOOGLE_CLIENT_ID
    /// - EXPENSE_AUTH_JWKS_CACHE_SECONDS
    ///
    /// The bare `PORT`, `DATABASE_URL`, `JWT_SECRET` and `GOOGLE_CLIENT_ID`
    /// names are honoured as well; the prefixed form wins when both are set.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }
        if self.auth.token_ttl_hours <= 0 || self.auth.third_party_token_ttl_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.database.max_connections == Some(0) {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the signing secret is still the built-in development value
    pub fn uses_development_secret(&self) -> bool {
        self.auth.jwt_secret == DEVELOPMENT_JWT_SECRET
    }

    fn apply_env_overrides(&mut self) {
        let server = &mut self.server;
        override_from_env(&mut server.host, &["EXPENSE_SERVER_HOST"]);
        override_from_env(&mut server.port, &["EXPENSE_SERVER_PORT", "PORT"]);
        override_from_env(&mut server.cors_origin, &["EXPENSE_SERVER_CORS_ORIGIN"]);

        let database = &mut self.database;
        override_from_env(&mut database.driver, &["EXPENSE_DATABASE_DRIVER"]);
        override_from_env(&mut database.url, &["EXPENSE_DATABASE_URL", "DATABASE_URL"]);
        if let Some(max) = parse_env(&["EXPENSE_DATABASE_MAX_CONNECTIONS"]) {
            database.max_connections = Some(max);
        }

        let auth = &mut self.auth;
        override_from_env(&mut auth.jwt_secret, &["EXPENSE_AUTH_JWT_SECRET", "JWT_SECRET"]);
        override_from_env(&mut auth.token_ttl_hours, &["EXPENSE_AUTH_TOKEN_TTL_HOURS"]);
        override_from_env(
            &mut auth.third_party_token_ttl_hours,
            &["EXPENSE_AUTH_THIRD_PARTY_TOKEN_TTL_HOURS"],
        );
        override_from_env(
            &mut auth.google_client_id,
            &["EXPENSE_AUTH_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"],
        );
        override_from_env(&mut auth.jwks_cache_seconds, &["EXPENSE_AUTH_JWKS_CACHE_SECONDS"]);
    }
}

/// Replace `target` with the first variable among `names` that is set and parses
fn override_from_env<T: FromStr>(target: &mut T, names: &[&str]) {
    if let Some(value) = parse_env(names) {
        *target = value;
    }
}

/// First variable among `names` that is set, parsed. Unparsable values are
/// logged and ignored.
fn parse_env<T: FromStr>(names: &[&str]) -> Option<T> {
    let (name, raw) = names
        .iter()
        .find_map(|name| std::env::var(name).ok().map(|value| (*name, value)))?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
