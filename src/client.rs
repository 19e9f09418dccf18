//! HTTP client module for writing log batches to the backend.
//!
//! This module provides the [`BulkClient`] seam used by the shipper and an
//! Elasticsearch-compatible implementation built on reqwest, with connection
//! pooling, per-request authentication and failover across hosts.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::auth::AuthType;
use crate::config::{Config, HostAddr};
use crate::entry::LogEntry;

#[cfg(feature = "aws-auth")]
use crate::sigv4::SigV4Signer;
#[cfg(feature = "aws-auth")]
use chrono::Utc;

const NDJSON: &str = "application/x-ndjson";

/// One document of a bulk write and the index it goes to.
#[derive(Debug, Clone, Copy)]
pub struct BulkItem<'a> {
    pub destination: &'a str,
    pub document: &'a LogEntry,
}

/// Outcome of a successful bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Server-side processing time in milliseconds
    pub took_ms: u64,

    /// Number of documents indexed
    pub indexed: usize,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    took: u64,

    #[serde(default)]
    errors: bool,

    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(default)]
    status: u16,

    #[serde(default)]
    error: Option<Value>,
}

impl BulkItemResult {
    fn failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    fn reason(&self) -> String {
        match &self.error {
            Some(Value::Object(obj)) => obj
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
            Some(other) => other.to_string(),
            None => format!("status {}", self.status),
        }
    }
}

/// Errors that can occur during HTTP client operations.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP request failed
    Request(reqwest::Error),

    /// Server returned an error status code
    Status { code: StatusCode, message: String },

    /// Failed to parse response body
    Parse(String),

    /// Failed to encode the request body
    Encode(String),

    /// Request timeout
    Timeout,

    /// Client configuration error
    Config(String),

    /// The bulk request was accepted but some documents were rejected
    BulkRejected {
        failed: usize,
        total: usize,
        reason: String,
    },

    /// Every configured host failed
    AllHostsFailed { attempts: usize, last_error: String },
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Request(e) => write!(f, "HTTP request failed: {}", e),
            ClientError::Status { code, message } => {
                write!(f, "Server error ({}): {}", code, message)
            }
            ClientError::Parse(e) => write!(f, "Failed to parse response: {}", e),
            ClientError::Encode(e) => write!(f, "Failed to encode request: {}", e),
            ClientError::Timeout => write!(f, "Request timed out"),
            ClientError::Config(e) => write!(f, "Client configuration error: {}", e),
            ClientError::BulkRejected {
                failed,
                total,
                reason,
            } => write!(
                f,
                "{} of {} documents rejected. First error: {}",
                failed, total, reason
            ),
            ClientError::AllHostsFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "All {} hosts failed. Last error: {}",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Request(err)
        }
    }
}

/// A backend capable of health checks and bulk writes.
#[async_trait]
pub trait BulkClient: Send + Sync {
    /// Strategy the client was authenticated with.
    fn auth_type(&self) -> AuthType;

    /// True if any backend host answers.
    async fn ping(&self) -> bool;

    /// Write all items in one request, preserving their order.
    async fn bulk(&self, items: &[BulkItem<'_>]) -> Result<BulkSummary, ClientError>;
}

/// Transport settings shared by every auth strategy.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub hosts: Vec<HostAddr>,
    pub use_ssl: bool,
    pub verify_ssl: bool,

    /// Gzip request bodies
    pub compress: bool,
    pub request_timeout: Duration,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            hosts: config.hosts.clone(),
            use_ssl: config.use_ssl,
            verify_ssl: config.verify_ssl,
            compress: config.http_compress,
            request_timeout: config.request_timeout,
        }
    }
}

/// Credentials attached to each request.
#[derive(Clone)]
pub enum RequestAuth {
    None,
    Basic {
        user: String,
        password: String,
    },

    /// Ready-made `Negotiate` header, one per host
    Negotiate(Vec<String>),

    #[cfg(feature = "aws-auth")]
    AwsSigV4(SigV4Signer),
}

impl std::fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestAuth::None => write!(f, "None"),
            RequestAuth::Basic { user, .. } => write!(f, "Basic({})", user),
            RequestAuth::Negotiate(headers) => write!(f, "Negotiate({} hosts)", headers.len()),
            #[cfg(feature = "aws-auth")]
            RequestAuth::AwsSigV4(signer) => write!(f, "AwsSigV4({:?})", signer),
        }
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,

    /// Value of the `Host` header as sent on the wire
    host_header: String,
}

impl Endpoint {
    fn new(addr: &HostAddr, use_ssl: bool) -> Self {
        let scheme = if use_ssl { "https" } else { "http" };
        let default_port = if use_ssl { 443 } else { 80 };
        let host_header = if addr.port == default_port {
            addr.host.clone()
        } else {
            addr.to_string()
        };

        Self {
            base_url: format!("{}://{}:{}", scheme, addr.host, addr.port),
            host_header,
        }
    }
}

/// Elasticsearch-compatible bulk client.
///
/// # Example
///
/// ```no_run
/// use bulk_log_shipper::auth::AuthType;
/// use bulk_log_shipper::client::{BulkClient, ConnectionSettings, ElasticsearchClient, RequestAuth};
/// use bulk_log_shipper::config::Config;
///
/// #[tokio::main]
/// async fn main() {
///     let settings = ConnectionSettings::from_config(&Config::default());
///     let client = ElasticsearchClient::new(&settings, AuthType::NoAuth, RequestAuth::None)
///         .expect("Failed to create client");
///
///     println!("Backend reachable: {}", client.ping().await);
/// }
/// ```
pub struct ElasticsearchClient {
    /// The underlying HTTP client (reused for connection pooling)
    http: Client,

    endpoints: Vec<Endpoint>,

    auth_type: AuthType,

    auth: RequestAuth,

    verify_certs: bool,

    compress: bool,
}

impl ElasticsearchClient {
    /// Create a new client.
    ///
    /// AWS signed auth always verifies certificates, whatever `verify_ssl` says.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be built or no
    /// host is configured.
    pub fn new(
        settings: &ConnectionSettings,
        auth_type: AuthType,
        auth: RequestAuth,
    ) -> Result<Self, ClientError> {
        if settings.hosts.is_empty() {
            return Err(ClientError::Config("no hosts configured".to_string()));
        }

        let verify_certs = settings.verify_ssl || auth_type == AuthType::AwsSignedAuth;

        let http = Client::builder()
            .timeout(settings.request_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .danger_accept_invalid_certs(!verify_certs)
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        let endpoints = settings
            .hosts
            .iter()
            .map(|addr| Endpoint::new(addr, settings.use_ssl))
            .collect();

        Ok(Self {
            http,
            endpoints,
            auth_type,
            auth,
            verify_certs,
            compress: settings.compress,
        })
    }

    /// Whether server certificates are validated.
    pub fn verify_certs(&self) -> bool {
        self.verify_certs
    }

    /// Base URLs of the configured hosts, in failover order.
    pub fn base_urls(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.base_url.as_str()).collect()
    }

    #[cfg_attr(not(feature = "aws-auth"), allow(unused_variables))]
    fn authorize(
        &self,
        index: usize,
        endpoint: &Endpoint,
        method: &Method,
        path: &str,
        body: &[u8],
        request: RequestBuilder,
    ) -> RequestBuilder {
        match &self.auth {
            RequestAuth::None => request,
            RequestAuth::Basic { user, password } => request.basic_auth(user, Some(password)),
            RequestAuth::Negotiate(headers) => match headers.get(index) {
                Some(header) => request.header(AUTHORIZATION, header),
                None => request,
            },
            #[cfg(feature = "aws-auth")]
            RequestAuth::AwsSigV4(signer) => {
                let signed = signer.sign(
                    method.as_str(),
                    &endpoint.host_header,
                    path,
                    "",
                    body,
                    Utc::now(),
                );
                request
                    .header("x-amz-date", signed.amz_date)
                    .header(AUTHORIZATION, signed.authorization)
            }
        }
    }

    /// Send a single HTTP request to one host.
    async fn send_request(
        &self,
        index: usize,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<Response, ClientError> {
        let endpoint = &self.endpoints[index];
        let url = format!("{}{}", endpoint.base_url, path);

        let mut request = self.http.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, NDJSON).body(body.to_vec());
            if self.compress {
                request = request.header(CONTENT_ENCODING, "gzip");
            }
        }
        // Signed over the bytes on the wire, compressed or not
        let request = self.authorize(
            index,
            endpoint,
            &method,
            path,
            body.unwrap_or_default(),
            request,
        );

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(ClientError::Status {
                code: status,
                message,
            })
        }
    }

    /// Try each host in order until one answers with a non-failover outcome.
    async fn send_with_failover(
        &self,
        method: Method,
        path: &str,
        body: Option<&[u8]>,
    ) -> Result<Response, ClientError> {
        let mut last_error: Option<ClientError> = None;

        for index in 0..self.endpoints.len() {
            match self.send_request(index, method.clone(), path, body).await {
                Ok(response) => return Ok(response),
                Err(e) if is_failover_error(&e) => {
                    warn!(
                        host = %self.endpoints[index].base_url,
                        error = %e,
                        "Host unavailable, trying next host"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let last_error_msg = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());

        Err(ClientError::AllHostsFailed {
            attempts: self.endpoints.len(),
            last_error: last_error_msg,
        })
    }
}

#[async_trait]
impl BulkClient for ElasticsearchClient {
    fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    async fn ping(&self) -> bool {
        match self.send_with_failover(Method::HEAD, "/", None).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Ping failed");
                false
            }
        }
    }

    async fn bulk(&self, items: &[BulkItem<'_>]) -> Result<BulkSummary, ClientError> {
        if items.is_empty() {
            return Ok(BulkSummary::default());
        }

        let body = encode_bulk_body(items)?;
        let payload = if self.compress {
            gzip(body.as_bytes())?
        } else {
            body.into_bytes()
        };

        debug!(
            documents = items.len(),
            bytes = payload.len(),
            compressed = self.compress,
            "Sending bulk request"
        );

        let response = self
            .send_with_failover(Method::POST, "/_bulk", Some(&payload))
            .await?;

        let text = response.text().await?;
        let parsed: BulkResponse =
            serde_json::from_str(&text).map_err(|e| ClientError::Parse(e.to_string()))?;

        if parsed.errors {
            let results: Vec<&BulkItemResult> =
                parsed.items.iter().flat_map(|item| item.values()).collect();
            let failed: Vec<&&BulkItemResult> = results.iter().filter(|r| r.failed()).collect();
            let reason = failed
                .first()
                .map(|r| r.reason())
                .unwrap_or_else(|| "unknown".to_string());

            error!(
                failed = failed.len(),
                total = items.len(),
                reason = %reason,
                "Bulk request contained errors"
            );

            return Err(ClientError::BulkRejected {
                failed: failed.len(),
                total: items.len(),
                reason,
            });
        }

        Ok(BulkSummary {
            took_ms: parsed.took,
            indexed: items.len(),
        })
    }
}

/// Connection problems and gateway errors move on to the next host.
fn is_failover_error(error: &ClientError) -> bool {
    match error {
        ClientError::Request(e) => e.is_connect() || e.is_timeout(),
        ClientError::Timeout => true,
        ClientError::Status { code, .. } => matches!(
            *code,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ),
        _ => false,
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, ClientError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ClientError::Encode(e.to_string()))?;
    encoder.finish().map_err(|e| ClientError::Encode(e.to_string()))
}

/// Encode items as a bulk NDJSON body: an action line then the document.
pub fn encode_bulk_body(items: &[BulkItem<'_>]) -> Result<String, ClientError> {
    let mut body = Vec::new();

    for item in items {
        let action = json!({ "index": { "_index": item.destination } });
        serde_json::to_writer(&mut body, &action).map_err(|e| ClientError::Encode(e.to_string()))?;
        body.push(b'\n');
        serde_json::to_writer(&mut body, item.document)
            .map_err(|e| ClientError::Encode(e.to_string()))?;
        body.push(b'\n');
    }

    String::from_utf8(body).map_err(|e| ClientError::Encode(e.to_string()))
}
