//! Configuration module for the log shipper.
//!
//! All settings are consumed once, when a shipper is built. They can be
//! filled in directly or loaded from `BULK_SHIPPER_*` environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::auth::{AuthConfig, AuthType};
use crate::index_name::IndexNameFrequency;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 9200;

/// Default number of buffered entries that triggers a flush
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default flush interval in seconds
const DEFAULT_FLUSH_INTERVAL_SECS: f64 = 1.0;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const DEFAULT_INDEX_NAME: &str = "app_logs";

const DEFAULT_TIMESTAMP_FIELD: &str = "timestamp";

/// Maximum allowed buffer size to prevent memory issues
const MAX_BUFFER_SIZE: usize = 100_000;

/// Record fields that carry timing internals and are never shipped
pub const DEFAULT_FILTERED_FIELDS: &[&str] = &["msecs", "relativeCreated", "levelno", "created"];

/// A backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
}

impl HostAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for HostAddr {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl std::fmt::Display for HostAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostAddr {
    type Err = ConfigError;

    /// Parse `host` or `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| ConfigError {
                    message: format!("'{}' is not a valid port in '{}'", port, s),
                    env_var: None,
                })?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(ConfigError {
                message: format!("'{}' has an empty host name", s),
                env_var: None,
            });
        }

        Ok(Self::new(host, port))
    }
}

/// Configuration for a log shipper.
///
/// Settings can be configured via environment variables:
/// - `BULK_SHIPPER_HOSTS`: comma separated `host:port` list (default: localhost:9200)
/// - `BULK_SHIPPER_AUTH_TYPE`: NO_AUTH, BASIC_AUTH, KERBEROS_AUTH or AWS_SIGNED_AUTH
/// - `BULK_SHIPPER_AUTH_USER` / `BULK_SHIPPER_AUTH_PASSWORD`: basic auth credentials
/// - `BULK_SHIPPER_AWS_ACCESS_KEY` / `BULK_SHIPPER_AWS_SECRET_KEY` / `BULK_SHIPPER_AWS_REGION`
/// - `BULK_SHIPPER_USE_SSL`, `BULK_SHIPPER_VERIFY_SSL`
/// - `BULK_SHIPPER_HTTP_COMPRESS`: gzip request bodies (default: true)
/// - `BULK_SHIPPER_BUFFER_SIZE`: entries per bulk write (default: 1000)
/// - `BULK_SHIPPER_FLUSH_INTERVAL_SECS`: seconds between flushes, fractional allowed (default: 1)
/// - `BULK_SHIPPER_REQUEST_TIMEOUT_SECS`: HTTP request timeout (default: 30)
/// - `BULK_SHIPPER_INDEX_NAME`: index prefix (default: app_logs)
/// - `BULK_SHIPPER_INDEX_FREQUENCY`: DAILY, WEEKLY, MONTHLY or YEARLY
/// - `BULK_SHIPPER_ADDITIONAL_FIELDS`: JSON object merged into every entry
/// - `BULK_SHIPPER_RAISE_ON_INDEXING_EXCEPTIONS`: surface flush failures (default: false)
/// - `BULK_SHIPPER_TIMESTAMP_FIELD`: name of the timestamp field (default: timestamp)
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend endpoints, tried in order
    pub hosts: Vec<HostAddr>,

    /// Authentication strategy and credentials
    pub auth: AuthConfig,

    /// Talk to the backend over TLS
    pub use_ssl: bool,

    /// Validate server certificates (always on for AWS signed auth)
    pub verify_ssl: bool,

    /// Gzip bulk request bodies
    pub http_compress: bool,

    /// Number of buffered entries that triggers a synchronous flush
    pub buffer_size: usize,

    /// Time after which buffered entries are flushed even if below `buffer_size`
    pub flush_interval: Duration,

    /// HTTP request timeout duration
    pub request_timeout: Duration,

    /// Prefix of the destination index
    pub index_name: String,

    /// Date granularity of the destination index
    pub index_name_frequency: IndexNameFrequency,

    /// Static fields merged into every entry
    pub additional_fields: Map<String, Value>,

    /// Return flush failures to the caller instead of dropping them
    pub raise_on_indexing_exceptions: bool,

    /// Field receiving the formatted record time
    pub timestamp_field_name: String,

    /// Record fields never copied into entries
    pub filtered_fields: Vec<String>,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    fn for_var(env_var: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            env_var: Some(env_var.to_string()),
        }
    }

    fn with_var(mut self, env_var: &str) -> Self {
        self.env_var = Some(env_var.to_string());
        self
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to the defaults of [`Config::default`].
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed, names an
    /// unsupported auth type or index frequency, or fails validation.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use bulk_log_shipper::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Index prefix: {}", config.index_name);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let hosts = match env::var("BULK_SHIPPER_HOSTS") {
            Ok(value) => Self::parse_hosts(&value)
                .map_err(|e| e.with_var("BULK_SHIPPER_HOSTS"))?,
            Err(_) => defaults.hosts,
        };

        let auth = Self::parse_auth()?;

        let use_ssl = parse_var("BULK_SHIPPER_USE_SSL", defaults.use_ssl, parse_bool)?;
        let verify_ssl = parse_var("BULK_SHIPPER_VERIFY_SSL", defaults.verify_ssl, parse_bool)?;
        let http_compress =
            parse_var("BULK_SHIPPER_HTTP_COMPRESS", defaults.http_compress, parse_bool)?;

        let buffer_size = parse_var("BULK_SHIPPER_BUFFER_SIZE", defaults.buffer_size, |v| {
            v.parse::<usize>()
                .map_err(|_| format!("'{}' is not a valid number", v))
        })?;

        let flush_interval = parse_var(
            "BULK_SHIPPER_FLUSH_INTERVAL_SECS",
            defaults.flush_interval,
            |v| {
                let secs: f64 = v
                    .parse()
                    .map_err(|_| format!("'{}' is not a valid number", v))?;
                Duration::try_from_secs_f64(secs)
                    .map_err(|_| format!("'{}' is not a valid duration", v))
            },
        )?;

        let request_timeout = parse_var(
            "BULK_SHIPPER_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout,
            |v| {
                v.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| format!("'{}' is not a valid number", v))
            },
        )?;

        let index_name = env::var("BULK_SHIPPER_INDEX_NAME").unwrap_or(defaults.index_name);

        let index_name_frequency = parse_var(
            "BULK_SHIPPER_INDEX_FREQUENCY",
            defaults.index_name_frequency,
            |v| v.parse::<IndexNameFrequency>().map_err(|e| e.message),
        )?;

        let additional_fields = parse_var(
            "BULK_SHIPPER_ADDITIONAL_FIELDS",
            defaults.additional_fields,
            |v| match serde_json::from_str::<Value>(v) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(_) => Err("expected a JSON object".to_string()),
                Err(e) => Err(format!("invalid JSON: {}", e)),
            },
        )?;

        let raise_on_indexing_exceptions = parse_var(
            "BULK_SHIPPER_RAISE_ON_INDEXING_EXCEPTIONS",
            defaults.raise_on_indexing_exceptions,
            parse_bool,
        )?;

        let timestamp_field_name =
            env::var("BULK_SHIPPER_TIMESTAMP_FIELD").unwrap_or(defaults.timestamp_field_name);

        let config = Self {
            hosts,
            auth,
            use_ssl,
            verify_ssl,
            http_compress,
            buffer_size,
            flush_interval,
            request_timeout,
            index_name,
            index_name_frequency,
            additional_fields,
            raise_on_indexing_exceptions,
            timestamp_field_name,
            filtered_fields: defaults.filtered_fields,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the settings a shipper relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::for_var(
                "BULK_SHIPPER_HOSTS",
                "at least one host is required",
            ));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::for_var(
                "BULK_SHIPPER_BUFFER_SIZE",
                "buffer size must be greater than 0",
            ));
        }

        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::for_var(
                "BULK_SHIPPER_BUFFER_SIZE",
                format!(
                    "buffer size {} exceeds maximum allowed ({})",
                    self.buffer_size, MAX_BUFFER_SIZE
                ),
            ));
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::for_var(
                "BULK_SHIPPER_FLUSH_INTERVAL_SECS",
                "flush interval must be greater than 0",
            ));
        }

        if self.index_name.trim().is_empty() {
            return Err(ConfigError::for_var(
                "BULK_SHIPPER_INDEX_NAME",
                "index name prefix must not be empty",
            ));
        }

        Ok(())
    }

    fn parse_hosts(value: &str) -> Result<Vec<HostAddr>, ConfigError> {
        value
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(HostAddr::from_str)
            .collect()
    }

    /// Build the auth settings from the auth type and its credential variables.
    fn parse_auth() -> Result<AuthConfig, ConfigError> {
        let env_var = "BULK_SHIPPER_AUTH_TYPE";

        let auth_type = match env::var(env_var) {
            Ok(value) => value
                .parse::<AuthType>()
                .map_err(|e| e.with_var(env_var))?,
            Err(_) => AuthType::NoAuth,
        };

        let var = |name: &str| env::var(name).unwrap_or_default();

        Ok(match auth_type {
            AuthType::NoAuth => AuthConfig::NoAuth,
            AuthType::BasicAuth => AuthConfig::BasicAuth {
                user: var("BULK_SHIPPER_AUTH_USER"),
                password: var("BULK_SHIPPER_AUTH_PASSWORD"),
            },
            AuthType::KerberosAuth => AuthConfig::KerberosAuth,
            AuthType::AwsSignedAuth => AuthConfig::AwsSignedAuth {
                access_key: var("BULK_SHIPPER_AWS_ACCESS_KEY"),
                secret_key: var("BULK_SHIPPER_AWS_SECRET_KEY"),
                region: var("BULK_SHIPPER_AWS_REGION"),
            },
        })
    }
}

/// Read and convert an optional environment variable.
fn parse_var<T, F>(env_var: &str, default: T, parse: F) -> Result<T, ConfigError>
where
    F: FnOnce(&str) -> Result<T, String>,
{
    match env::var(env_var) {
        Ok(value) => parse(value.trim()).map_err(|message| ConfigError::for_var(env_var, message)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("'{}' is not a valid boolean", value)),
    }
}

impl Default for Config {
    /// Create a default configuration using default values.
    ///
    /// This is useful for testing or when environment variables are not set.
    fn default() -> Self {
        Self {
            hosts: vec![HostAddr::default()],
            auth: AuthConfig::NoAuth,
            use_ssl: false,
            verify_ssl: true,
            http_compress: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_interval: Duration::from_secs_f64(DEFAULT_FLUSH_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            index_name_frequency: IndexNameFrequency::Daily,
            additional_fields: Map::new(),
            raise_on_indexing_exceptions: false,
            timestamp_field_name: DEFAULT_TIMESTAMP_FIELD.to_string(),
            filtered_fields: DEFAULT_FILTERED_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}
