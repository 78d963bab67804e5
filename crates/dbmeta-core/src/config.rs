//! Configuration management for dbmeta
//!
//! Every setting is read from the environment, with the following priority:
//! 1. Process environment variables
//! 2. A `.env` file (current directory, or an explicit path)
//! 3. Defaults
//!
//! Malformed values never abort startup; they fall back to the default.

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// dbmeta configuration
#[derive(Debug, Clone, Default)]
pub struct DbMetaConfig {
    pub database: DatabaseConfig,
    pub limits: LimitsConfig,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

/// Catalog connection settings
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Default database; `None` connects without selecting one
    pub name: Option<String>,
    pub ssl: bool,
    pub connect_timeout_secs: u64,
    pub query_timeout_secs: u64,
}

/// Request guarding limits
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Calls per minute; 0 disables rate limiting
    pub rate_limit_rpm: u32,
    pub max_tables_per_request: usize,
    pub max_identifier_length: usize,
    /// 0 = unbounded
    pub max_list_tables_result: usize,
    /// 0 = unbounded
    pub max_concurrent_requests: usize,
    /// Empty = every schema is allowed
    pub allowed_schemas: Vec<String>,
}

/// Audit log configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    /// `None` writes audit lines to stderr
    pub log_path: Option<PathBuf>,
    pub format: AuditFormat,
}

/// Audit line encoding. JSON is the only supported format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditFormat {
    #[default]
    Json,
}

/// Diagnostic log configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            name: None,
            ssl: false,
            connect_timeout_secs: 10,
            query_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .field("ssl", &self.ssl)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_rpm: 60,
            max_tables_per_request: 50,
            max_identifier_length: 64,
            max_list_tables_result: 500,
            max_concurrent_requests: 0,
            allowed_schemas: Vec::new(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: None,
            format: AuditFormat::Json,
        }
    }
}

impl AuditFormat {
    /// Unknown formats are coerced to JSON rather than rejected.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => AuditFormat::Json,
            other => {
                if !other.is_empty() {
                    tracing::debug!(format = %other, "Unsupported AUDIT_FORMAT, using json");
                }
                AuditFormat::Json
            }
        }
    }
}

impl LoggingConfig {
    /// Logging settings alone, so telemetry can start before the rest of
    /// the configuration is read
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            format: lookup("LOG_FORMAT")
                .map(|raw| LogFormat::parse(&raw))
                .unwrap_or_default(),
        }
    }
}

impl LogFormat {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

impl DbMetaConfig {
    /// Load configuration, reading `.env` from the current directory if present
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading an explicit env file when provided.
    ///
    /// A missing default `.env` is fine; a missing explicit file is an error.
    pub fn load_from(env_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = Self::load_env_file(env_file)? {
            tracing::debug!("Loaded environment from: {:?}", path);
        }
        Ok(Self::from_env())
    }

    /// Merge a dotenv file into the process environment without reading any
    /// settings. Returns the file that was loaded, if any.
    pub fn load_env_file(env_file: Option<&Path>) -> Result<Option<PathBuf>> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).map_err(|e| {
                    Error::config_error(format!(
                        "Failed to load env file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Some(path.to_path_buf()))
            }
            None => Ok(dotenvy::dotenv().ok()),
        }
    }

    /// Build configuration from the process environment only
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Tests use this to avoid mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let defaults = DbMetaConfig::default();

        let database = DatabaseConfig {
            host: get("DB_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_host),
            port: parse_or(get("DB_PORT"), defaults.database.port),
            user: get("DB_USER").unwrap_or_default(),
            // Passwords keep surrounding whitespace.
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            name: get("DB_NAME").filter(|v| !v.is_empty()),
            ssl: parse_bool(get("DB_SSL"), defaults.database.ssl),
            connect_timeout_secs: parse_or(
                get("DB_CONNECT_TIMEOUT"),
                defaults.database.connect_timeout_secs,
            ),
            query_timeout_secs: parse_or(
                get("DB_QUERY_TIMEOUT"),
                defaults.database.query_timeout_secs,
            ),
        };

        let rate_limit_rpm = parse_or::<i64>(
            get("RATE_LIMIT_RPM"),
            i64::from(defaults.limits.rate_limit_rpm),
        );

        let limits = LimitsConfig {
            rate_limit_rpm: u32::try_from(rate_limit_rpm.max(0)).unwrap_or(u32::MAX),
            max_tables_per_request: parse_or(
                get("MAX_TABLES_PER_REQUEST"),
                defaults.limits.max_tables_per_request,
            ),
            max_identifier_length: parse_or(
                get("MAX_IDENTIFIER_LENGTH"),
                defaults.limits.max_identifier_length,
            ),
            max_list_tables_result: parse_or(
                get("MAX_LIST_TABLES_RESULT"),
                defaults.limits.max_list_tables_result,
            ),
            max_concurrent_requests: parse_or(
                get("MAX_CONCURRENT_REQUESTS"),
                defaults.limits.max_concurrent_requests,
            ),
            allowed_schemas: get("ALLOWED_SCHEMAS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_default(),
        };

        let audit = AuditConfig {
            enabled: parse_bool(get("AUDIT_ENABLED"), defaults.audit.enabled),
            log_path: get("AUDIT_LOG_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            format: get("AUDIT_FORMAT")
                .map(|raw| AuditFormat::parse(&raw))
                .unwrap_or_default(),
        };

        let logging = LoggingConfig::from_lookup(&lookup);

        Self {
            database,
            limits,
            audit,
            logging,
        }
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) if !value.is_empty() => value.parse().unwrap_or(default),
        _ => default,
    }
}

fn parse_bool(raw: Option<String>, default: bool) -> bool {
    match raw.map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}
