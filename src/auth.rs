//! Authentication strategies and the client factory.
//!
//! Each [`AuthType`] maps to one way of building an authenticated
//! [`ElasticsearchClient`]. Strategies with stable credentials share one
//! client for the lifetime of the factory; Kerberos builds a fresh client on
//! every call because its service tickets expire.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::client::{BulkClient, ConnectionSettings, ElasticsearchClient, RequestAuth};
use crate::config::{Config, ConfigError};
use crate::error::ShipperError;

const KERBEROS_UNAVAILABLE: &str =
    "Kerberos support not available: no SPNEGO token source installed";

#[cfg(not(feature = "aws-auth"))]
const AWS_UNAVAILABLE: &str =
    "AWS request signing not available: rebuild with the \"aws-auth\" feature";

/// Authentication types supported by the shipper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthType {
    NoAuth = 0,
    BasicAuth = 1,
    KerberosAuth = 2,
    AwsSignedAuth = 3,
}

/// Whether a built client may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// One client, built on first use and shared afterwards
    Shared,

    /// A new client on every call
    PerUse,
}

impl AuthType {
    pub fn all() -> &'static [AuthType] {
        &[
            AuthType::NoAuth,
            AuthType::BasicAuth,
            AuthType::KerberosAuth,
            AuthType::AwsSignedAuth,
        ]
    }

    pub fn cache_policy(self) -> CachePolicy {
        match self {
            AuthType::KerberosAuth => CachePolicy::PerUse,
            AuthType::NoAuth | AuthType::BasicAuth | AuthType::AwsSignedAuth => CachePolicy::Shared,
        }
    }

    fn unsupported() -> ConfigError {
        ConfigError {
            message: "Authentication method not supported".to_string(),
            env_var: None,
        }
    }
}

impl std::fmt::Display for AuthType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthType::NoAuth => write!(f, "NO_AUTH"),
            AuthType::BasicAuth => write!(f, "BASIC_AUTH"),
            AuthType::KerberosAuth => write!(f, "KERBEROS_AUTH"),
            AuthType::AwsSignedAuth => write!(f, "AWS_SIGNED_AUTH"),
        }
    }
}

impl TryFrom<u8> for AuthType {
    type Error = ConfigError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        AuthType::all()
            .iter()
            .copied()
            .find(|auth_type| *auth_type as u8 == tag)
            .ok_or_else(AuthType::unsupported)
    }
}

impl FromStr for AuthType {
    type Err = ConfigError;

    /// Parse an auth type from its name or its numeric tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(tag) = s.parse::<u8>() {
            return AuthType::try_from(tag);
        }
        AuthType::all()
            .iter()
            .copied()
            .find(|auth_type| auth_type.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(AuthType::unsupported)
    }
}

/// Authentication settings.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum AuthConfig {
    #[default]
    NoAuth,
    BasicAuth {
        user: String,
        password: String,
    },
    KerberosAuth,
    AwsSignedAuth {
        access_key: String,
        secret_key: String,
        region: String,
    },
}

impl AuthConfig {
    pub fn auth_type(&self) -> AuthType {
        match self {
            AuthConfig::NoAuth => AuthType::NoAuth,
            AuthConfig::BasicAuth { .. } => AuthType::BasicAuth,
            AuthConfig::KerberosAuth => AuthType::KerberosAuth,
            AuthConfig::AwsSignedAuth { .. } => AuthType::AwsSignedAuth,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::NoAuth => write!(f, "NoAuth"),
            AuthConfig::BasicAuth { user, .. } => f
                .debug_struct("BasicAuth")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
            AuthConfig::KerberosAuth => write!(f, "KerberosAuth"),
            AuthConfig::AwsSignedAuth {
                access_key, region, ..
            } => f
                .debug_struct("AwsSignedAuth")
                .field("access_key", access_key)
                .field("secret_key", &"[REDACTED]")
                .field("region", region)
                .finish(),
        }
    }
}

/// Produces SPNEGO tokens for Kerberos authentication.
///
/// Installed by the host application (typically backed by GSSAPI). Called
/// once per backend host every time a Kerberos client is built.
pub trait SpnegoTokenSource: Send + Sync {
    /// Base64 token for the `HTTP@<host>` service principal.
    fn token(&self, host: &str) -> Result<String, String>;
}

/// Hands out backend clients to the shipper.
pub trait ClientProvider: Send + Sync {
    fn get_client(&self) -> Result<Arc<dyn BulkClient>, ShipperError>;
}

/// Builds authenticated [`ElasticsearchClient`]s according to an [`AuthConfig`].
pub struct ClientFactory {
    connection: ConnectionSettings,
    auth: AuthConfig,
    spnego: Option<Arc<dyn SpnegoTokenSource>>,
    cached: Mutex<Option<Arc<dyn BulkClient>>>,
}

impl ClientFactory {
    pub fn new(connection: ConnectionSettings, auth: AuthConfig) -> Self {
        Self {
            connection,
            auth,
            spnego: None,
            cached: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(ConnectionSettings::from_config(config), config.auth.clone())
    }

    /// Install the token source required by Kerberos authentication.
    pub fn with_spnego(mut self, source: Arc<dyn SpnegoTokenSource>) -> Self {
        self.spnego = Some(source);
        self
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth.auth_type()
    }

    /// Return a client for the configured strategy.
    ///
    /// # Errors
    ///
    /// - `ShipperError::Environment` if the strategy's signing capability is
    ///   missing or refuses to produce credentials
    /// - `ShipperError::Transport` if the HTTP client cannot be built
    pub fn get_client(&self) -> Result<Arc<dyn BulkClient>, ShipperError> {
        let auth_type = self.auth.auth_type();

        match auth_type.cache_policy() {
            CachePolicy::PerUse => self.build_client(),
            CachePolicy::Shared => {
                let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(client) = cached.as_ref() {
                    return Ok(Arc::clone(client));
                }
                let client = self.build_client()?;
                info!(auth_type = %auth_type, "Backend client initialized");
                *cached = Some(Arc::clone(&client));
                Ok(client)
            }
        }
    }

    fn build_client(&self) -> Result<Arc<dyn BulkClient>, ShipperError> {
        let auth_type = self.auth.auth_type();
        let request_auth = match &self.auth {
            AuthConfig::NoAuth => RequestAuth::None,
            AuthConfig::BasicAuth { user, password } => RequestAuth::Basic {
                user: user.clone(),
                password: password.clone(),
            },
            AuthConfig::KerberosAuth => self.negotiate_auth()?,
            AuthConfig::AwsSignedAuth {
                access_key,
                secret_key,
                region,
            } => Self::aws_auth(access_key, secret_key, region)?,
        };

        debug!(auth_type = %auth_type, hosts = self.connection.hosts.len(), "Building backend client");
        let client = ElasticsearchClient::new(&self.connection, auth_type, request_auth)?;
        Ok(Arc::new(client))
    }

    fn negotiate_auth(&self) -> Result<RequestAuth, ShipperError> {
        let source = self
            .spnego
            .as_ref()
            .ok_or_else(|| ShipperError::Environment(KERBEROS_UNAVAILABLE.to_string()))?;

        let headers = self
            .connection
            .hosts
            .iter()
            .map(|host| {
                source
                    .token(&host.host)
                    .map(|token| format!("Negotiate {}", token))
                    .map_err(|e| {
                        ShipperError::Environment(format!(
                            "failed to obtain Kerberos token for {}: {}",
                            host.host, e
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RequestAuth::Negotiate(headers))
    }

    #[cfg(feature = "aws-auth")]
    fn aws_auth(access_key: &str, secret_key: &str, region: &str) -> Result<RequestAuth, ShipperError> {
        Ok(RequestAuth::AwsSigV4(crate::sigv4::SigV4Signer::new(
            access_key, secret_key, region, "es",
        )))
    }

    #[cfg(not(feature = "aws-auth"))]
    fn aws_auth(_: &str, _: &str, _: &str) -> Result<RequestAuth, ShipperError> {
        Err(ShipperError::Environment(AWS_UNAVAILABLE.to_string()))
    }
}

impl ClientProvider for ClientFactory {
    fn get_client(&self) -> Result<Arc<dyn BulkClient>, ShipperError> {
        ClientFactory::get_client(self)
    }
}
