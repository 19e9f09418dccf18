//! Bulk Log Shipper Library
//!
//! This library batches structured log records and writes them to an
//! Elasticsearch-compatible backend through its bulk API:
//!
//! - **buffer**: Batching engine with size and time-based flush triggers
//! - **auth**: Authentication strategies and the client factory
//! - **client**: Bulk HTTP client with host failover
//! - **config**: Environment-based configuration
//! - **entry**: Log records and the documents built from them
//! - **index_name**: Date-suffixed destination index naming
//! - **serializer**: JSON conversion with a string fallback
//!
//! # Example
//!
//! ```no_run
//! use bulk_log_shipper::config::Config;
//! use bulk_log_shipper::buffer::LogShipper;
//! use bulk_log_shipper::entry::LogRecord;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Load configuration from environment
//!     let config = Config::from_env().expect("Failed to load config");
//!
//!     let shipper = LogShipper::new(config).expect("Failed to create shipper");
//!     if !shipper.test_connection().await.unwrap_or(false) {
//!         eprintln!("backend unreachable");
//!     }
//!
//!     let record = LogRecord::now()
//!         .with_field("logger", "app")
//!         .with_field("level", "WARNING")
//!         .with_field("message", "disk usage above 90%");
//!     shipper.record(record).await.ok();
//!
//!     // Flush whatever is left
//!     shipper.close().await.ok();
//! }
//! ```

// Module declarations
pub mod auth;
pub mod buffer;
pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod index_name;
pub mod serializer;
#[cfg(feature = "aws-auth")]
pub mod sigv4;

// Re-export commonly used types at crate root for convenience
pub use auth::{AuthConfig, AuthType, ClientFactory, ClientProvider, SpnegoTokenSource};
pub use buffer::{BufferConfig, BufferStats, LogShipper};
pub use client::{BulkClient, ClientError, ElasticsearchClient};
pub use config::{Config, ConfigError, HostAddr};
pub use entry::{FieldValue, LogEntry, LogRecord};
pub use error::ShipperError;
pub use index_name::IndexNameFrequency;
