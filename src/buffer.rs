//! Buffer module for accumulating and bulk-writing log entries.
//!
//! [`LogShipper`] keeps the pending batch behind a mutex that is only held to
//! append or swap. A batch is written when it reaches the configured size
//! (on the producer's task) or when the flush timer fires (on the timer task).

use std::collections::HashSet;
use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::{ClientFactory, ClientProvider};
use crate::client::{BulkItem, BulkSummary};
use crate::config::Config;
use crate::entry::{LogEntry, LogRecord};
use crate::error::ShipperError;
use crate::index_name::{current_index_name, IndexNameFrequency};

/// Settings the shipper keeps after construction.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Number of entries that triggers a synchronous flush
    pub buffer_size: usize,

    /// Duration to wait before flushing, even if buffer size not reached
    pub flush_interval: Duration,

    /// Prefix of the destination index
    pub index_name: String,

    /// Date granularity of the destination index
    pub index_name_frequency: IndexNameFrequency,

    /// Fields merged into every entry, including process metadata
    pub additional_fields: Map<String, Value>,

    /// Return transport failures to the flushing caller
    pub raise_on_indexing_exceptions: bool,

    /// Field receiving the formatted record time
    pub timestamp_field_name: String,

    /// Record fields never copied into entries
    pub filtered_fields: HashSet<String>,
}

impl BufferConfig {
    /// Take an owned copy of the buffering settings out of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            buffer_size: config.buffer_size,
            flush_interval: config.flush_interval,
            index_name: config.index_name.clone(),
            index_name_frequency: config.index_name_frequency,
            additional_fields: config.additional_fields.clone(),
            raise_on_indexing_exceptions: config.raise_on_indexing_exceptions,
            timestamp_field_name: config.timestamp_field_name.clone(),
            filtered_fields: config.filtered_fields.iter().cloned().collect(),
        }
    }
}

/// Statistics about buffer operations.
#[derive(Debug, Clone, Default)]
pub struct BufferStats {
    /// Total number of entries recorded
    pub logs_received: u64,

    /// Total number of entries written by successful flushes
    pub logs_flushed: u64,

    /// Total number of entries discarded by failed flushes
    pub logs_dropped: u64,

    /// Number of flush operations triggered by size threshold
    pub size_flushes: u64,

    /// Number of flush operations triggered by time interval
    pub time_flushes: u64,

    /// Number of flush operations whose bulk write failed
    pub failed_flushes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Size,
    Timer,
    Manual,
    Close,
}

struct FlushTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct BufferState {
    batch: Vec<LogEntry>,
    timer: Option<FlushTimer>,
    stats: BufferStats,
}

struct Shared {
    config: BufferConfig,
    provider: Arc<dyn ClientProvider>,
    state: Mutex<BufferState>,

    /// Held for a whole flush so batches leave in the order they were cut
    flush_gate: AsyncMutex<()>,
}

/// Batching log shipper.
///
/// Must be used from within a tokio runtime: the flush timer is a spawned task.
///
/// # Example
///
/// ```no_run
/// use bulk_log_shipper::buffer::LogShipper;
/// use bulk_log_shipper::config::Config;
/// use bulk_log_shipper::entry::LogRecord;
///
/// #[tokio::main]
/// async fn main() {
///     let shipper = LogShipper::new(Config::default()).expect("Failed to create shipper");
///
///     let record = LogRecord::now()
///         .with_field("level", "INFO")
///         .with_field("message", "service started");
///     shipper.record(record).await.ok();
///
///     shipper.close().await.ok();
/// }
/// ```
pub struct LogShipper {
    shared: Arc<Shared>,
}

impl LogShipper {
    /// Create a shipper that builds its backend client from `config.auth`.
    ///
    /// # Errors
    ///
    /// Returns `ShipperError::Configuration` if `config` fails validation.
    pub fn new(config: Config) -> Result<Self, ShipperError> {
        config.validate()?;
        let provider = Arc::new(ClientFactory::from_config(&config));
        Self::with_provider(config, provider)
    }

    /// Create a shipper that obtains clients from `provider`.
    pub fn with_provider(
        config: Config,
        provider: Arc<dyn ClientProvider>,
    ) -> Result<Self, ShipperError> {
        config.validate()?;

        let mut buffer_config = BufferConfig::from_config(&config);
        merge_process_fields(&mut buffer_config.additional_fields, process_fields().clone());

        info!(
            buffer_size = buffer_config.buffer_size,
            flush_interval_ms = buffer_config.flush_interval.as_millis() as u64,
            index_name = %buffer_config.index_name,
            index_name_frequency = %buffer_config.index_name_frequency,
            auth_type = %config.auth.auth_type(),
            "Log shipper initialized"
        );

        let shared = Shared {
            state: Mutex::new(BufferState {
                batch: Vec::with_capacity(buffer_config.buffer_size),
                timer: None,
                stats: BufferStats::default(),
            }),
            config: buffer_config,
            provider,
            flush_gate: AsyncMutex::new(()),
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Buffer a record.
    ///
    /// If the batch reaches the buffer size it is flushed before returning,
    /// on the caller's task. Otherwise the flush timer is armed if it is not
    /// already.
    ///
    /// # Errors
    ///
    /// Only a size-triggered flush can fail; see [`LogShipper::flush`].
    pub async fn record(&self, record: LogRecord) -> Result<(), ShipperError> {
        let config = &self.shared.config;
        let entry = LogEntry::build(
            &config.additional_fields,
            record,
            &config.filtered_fields,
            &config.timestamp_field_name,
        );

        let threshold_reached = {
            let mut state = self.shared.lock_state();
            state.batch.push(entry);
            state.stats.logs_received += 1;

            let reached = state.batch.len() >= config.buffer_size;
            if !reached {
                self.shared.arm_timer(&mut state);
            }
            reached
        };

        if threshold_reached {
            debug!(
                buffer_size = config.buffer_size,
                "Flushing buffer: batch size threshold reached"
            );
            self.shared.flush(FlushTrigger::Size).await?;
        }

        Ok(())
    }

    /// Cancel the timer and write out everything buffered so far.
    ///
    /// The batch is discarded whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// - Client construction errors (`Configuration`, `Environment`) are always returned
    /// - `Transport` errors only when `raise_on_indexing_exceptions` is set
    pub async fn flush(&self) -> Result<(), ShipperError> {
        self.shared.flush(FlushTrigger::Manual).await
    }

    /// Stop the timer and flush what is left.
    ///
    /// Waits for a timer flush that is already writing. Calling `close` when
    /// no timer is armed does nothing.
    pub async fn close(&self) -> Result<(), ShipperError> {
        let timer = self.shared.lock_state().timer.take();
        let Some(timer) = timer else {
            return Ok(());
        };

        timer.token.cancel();
        if let Err(e) = timer.handle.await {
            warn!(error = %e, "Flush timer task ended abnormally");
        }

        info!(pending = self.pending_len(), "Closing log shipper");
        self.shared.flush(FlushTrigger::Close).await
    }

    /// Ping the backend. Does not touch the buffer.
    pub async fn test_connection(&self) -> Result<bool, ShipperError> {
        let client = self.shared.provider.get_client()?;
        Ok(client.ping().await)
    }

    /// Get the current number of entries waiting to be flushed.
    pub fn pending_len(&self) -> usize {
        self.shared.lock_state().batch.len()
    }

    /// Get current buffer statistics.
    pub fn stats(&self) -> BufferStats {
        self.shared.lock_state().stats.clone()
    }

    /// Whether a timer flush is scheduled.
    pub fn is_timer_armed(&self) -> bool {
        self.shared.lock_state().timer.is_some()
    }

    /// Get the buffer configuration.
    pub fn config(&self) -> &BufferConfig {
        &self.shared.config
    }
}

impl Drop for LogShipper {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.lock_state().timer.take() {
            timer.token.cancel();
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arm_timer(self: &Arc<Self>, state: &mut BufferState) {
        if state.timer.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_flush_timer(
            Arc::downgrade(self),
            token.clone(),
            self.config.flush_interval,
        ));

        state.timer = Some(FlushTimer { token, handle });
        debug!(
            interval_ms = self.config.flush_interval.as_millis() as u64,
            "Flush timer armed"
        );
    }

    async fn flush(&self, trigger: FlushTrigger) -> Result<(), ShipperError> {
        let _gate = self.flush_gate.lock().await;

        let batch = {
            let mut state = self.lock_state();
            if trigger != FlushTrigger::Timer {
                if let Some(timer) = state.timer.take() {
                    timer.token.cancel();
                }
            }
            if state.batch.is_empty() {
                return Ok(());
            }
            match trigger {
                FlushTrigger::Size => state.stats.size_flushes += 1,
                FlushTrigger::Timer => state.stats.time_flushes += 1,
                FlushTrigger::Manual | FlushTrigger::Close => {}
            }
            std::mem::replace(&mut state.batch, Vec::with_capacity(self.config.buffer_size))
        };

        let count = batch.len() as u64;
        let result = self.write_batch(&batch).await;

        let mut state = self.lock_state();
        match result {
            Ok(summary) => {
                state.stats.logs_flushed += count;
                debug!(
                    trigger = ?trigger,
                    documents = summary.indexed,
                    took_ms = summary.took_ms,
                    "Batch written"
                );
                Ok(())
            }
            Err(e) => {
                state.stats.failed_flushes += 1;
                state.stats.logs_dropped += count;
                drop(state);

                if e.is_transport() && !self.config.raise_on_indexing_exceptions {
                    warn!(
                        trigger = ?trigger,
                        error = %e,
                        dropped = count,
                        "Bulk write failed, batch discarded"
                    );
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn write_batch(&self, batch: &[LogEntry]) -> Result<BulkSummary, ShipperError> {
        let client = self.provider.get_client()?;
        let index = current_index_name(&self.config.index_name, self.config.index_name_frequency);

        let items: Vec<BulkItem<'_>> = batch
            .iter()
            .map(|document| BulkItem {
                destination: &index,
                document,
            })
            .collect();

        Ok(client.bulk(&items).await?)
    }
}

/// Flush every `interval` until cancelled or the shipper is gone.
async fn run_flush_timer(shared: Weak<Shared>, token: CancellationToken, interval: Duration) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(engine) = shared.upgrade() else {
            return;
        };

        debug!("Flushing buffer: time interval elapsed");
        if let Err(e) = engine.flush(FlushTrigger::Timer).await {
            error!(error = %e, "Timer flush failed");
        }
    }
}

static PROCESS_FIELDS: OnceLock<Map<String, Value>> = OnceLock::new();

/// Host name and address, looked up once per process.
fn process_fields() -> &'static Map<String, Value> {
    PROCESS_FIELDS.get_or_init(detect_process_fields)
}

fn detect_process_fields() -> Map<String, Value> {
    let mut fields = Map::new();

    let Ok(host) = hostname::get() else {
        return fields;
    };
    let host = host.to_string_lossy().into_owned();

    let host_ip = (host.as_str(), 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|addr| addr.ip().to_string());

    fields.insert("host".to_string(), Value::String(host));
    if let Some(ip) = host_ip {
        fields.insert("host_ip".to_string(), Value::String(ip));
    }
    fields
}

/// Add process fields without overriding values the caller configured.
fn merge_process_fields(additional: &mut Map<String, Value>, process: Map<String, Value>) {
    for (key, value) in process {
        additional.entry(key).or_insert(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthType;
    use crate::client::{BulkClient, ClientError};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingClient {
        writes: Mutex<Vec<Vec<(String, LogEntry)>>>,
        fail: AtomicBool,
        pings: AtomicUsize,
    }

    impl RecordingClient {
        fn writes(&self) -> Vec<Vec<(String, LogEntry)>> {
            self.writes.lock().unwrap().clone()
        }

        fn documents(&self) -> Vec<LogEntry> {
            self.writes()
                .into_iter()
                .flatten()
                .map(|(_, entry)| entry)
                .collect()
        }
    }

    #[async_trait]
    impl BulkClient for RecordingClient {
        fn auth_type(&self) -> AuthType {
            AuthType::NoAuth
        }

        async fn ping(&self) -> bool {
            self.pings.fetch_add(1, Ordering::SeqCst);
            true
        }

        async fn bulk(&self, items: &[BulkItem<'_>]) -> Result<BulkSummary, ClientError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClientError::Status {
                    code: StatusCode::SERVICE_UNAVAILABLE,
                    message: "cluster unavailable".to_string(),
                });
            }
            let write = items
                .iter()
                .map(|item| (item.destination.to_string(), item.document.clone()))
                .collect();
            self.writes.lock().unwrap().push(write);
            Ok(BulkSummary {
                took_ms: 1,
                indexed: items.len(),
            })
        }
    }

    struct RecordingProvider(Arc<RecordingClient>);

    impl ClientProvider for RecordingProvider {
        fn get_client(&self) -> Result<Arc<dyn BulkClient>, ShipperError> {
            Ok(self.0.clone())
        }
    }

    struct MissingCapability;

    impl ClientProvider for MissingCapability {
        fn get_client(&self) -> Result<Arc<dyn BulkClient>, ShipperError> {
            Err(ShipperError::Environment("signing not available".to_string()))
        }
    }

    fn test_config(buffer_size: usize, flush_interval: Duration) -> Config {
        let mut additional_fields = Map::new();
        additional_fields.insert("App".into(), json!("Test"));
        Config {
            buffer_size,
            flush_interval,
            index_name: "shiptest".to_string(),
            additional_fields,
            ..Config::default()
        }
    }

    fn shipper_with(config: Config) -> (LogShipper, Arc<RecordingClient>) {
        let client = Arc::new(RecordingClient::default());
        let shipper =
            LogShipper::with_provider(config, Arc::new(RecordingProvider(client.clone()))).unwrap();
        (shipper, client)
    }

    fn message(text: impl Into<String>) -> LogRecord {
        LogRecord::now()
            .with_field("level", "INFO")
            .with_field("message", text.into())
    }

    #[tokio::test]
    async fn test_records_below_threshold_stay_buffered() {
        let (shipper, client) = shipper_with(test_config(10, Duration::from_secs(1000)));

        for i in 0..3 {
            shipper.record(message(format!("line {}", i))).await.unwrap();
        }

        assert_eq!(shipper.pending_len(), 3);
        assert!(client.writes().is_empty());
        assert!(shipper.is_timer_armed());
        assert_eq!(shipper.stats().logs_received, 3);
    }

    #[tokio::test]
    async fn test_size_threshold_flushes_synchronously() {
        let (shipper, client) = shipper_with(test_config(2, Duration::from_secs(1000)));

        shipper.record(message("First Message")).await.unwrap();
        shipper.record(message("Second Message")).await.unwrap();

        let writes = client.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 2);
        for (_, document) in &writes[0] {
            assert_eq!(document.get("App"), Some(&json!("Test")));
        }
        assert_eq!(shipper.pending_len(), 0);
        assert!(!shipper.is_timer_armed());

        let stats = shipper.stats();
        assert_eq!(stats.size_flushes, 1);
        assert_eq!(stats.logs_flushed, 2);
    }

    #[tokio::test]
    async fn test_timer_flushes_after_interval() {
        let (shipper, client) = shipper_with(test_config(500, Duration::from_millis(100)));

        shipper.record(message("timed")).await.unwrap();
        assert_eq!(shipper.pending_len(), 1);

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(client.writes().len(), 1);
        assert_eq!(shipper.pending_len(), 0);
        assert_eq!(shipper.stats().time_flushes, 1);
    }

    #[tokio::test]
    async fn test_timer_rearms_after_timer_flush() {
        let (shipper, client) = shipper_with(test_config(500, Duration::from_millis(50)));

        shipper.record(message("first")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(shipper.is_timer_armed());

        shipper.record(message("second")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(client.writes().len(), 2);
        assert_eq!(shipper.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_flush_of_empty_batch_is_noop() {
        let (shipper, client) = shipper_with(test_config(10, Duration::from_secs(1000)));

        shipper.flush().await.unwrap();
        shipper.flush().await.unwrap();

        assert!(client.writes().is_empty());
        assert_eq!(shipper.pending_len(), 0);
        assert_eq!(shipper.stats().logs_flushed, 0);
    }

    #[tokio::test]
    async fn test_manual_flush_cancels_timer() {
        let (shipper, client) = shipper_with(test_config(10, Duration::from_secs(1000)));

        shipper.record(message("pending")).await.unwrap();
        assert!(shipper.is_timer_armed());

        shipper.flush().await.unwrap();
        assert!(!shipper.is_timer_armed());
        assert_eq!(client.writes().len(), 1);

        shipper.record(message("again")).await.unwrap();
        assert!(shipper.is_timer_armed());
    }

    #[tokio::test]
    async fn test_entries_keep_insertion_order() {
        let (shipper, client) = shipper_with(test_config(3, Duration::from_secs(1000)));

        for i in 0..7 {
            shipper.record(message(format!("line {}", i))).await.unwrap();
        }
        shipper.close().await.unwrap();

        let messages: Vec<Value> = client
            .documents()
            .iter()
            .map(|doc| doc.get("message").cloned().unwrap())
            .collect();
        let expected: Vec<Value> = (0..7).map(|i| json!(format!("line {}", i))).collect();
        assert_eq!(messages, expected);
        assert_eq!(client.writes().len(), 3);
    }

    #[tokio::test]
    async fn test_batch_goes_to_current_index() {
        let (shipper, client) = shipper_with(Config {
            index_name_frequency: IndexNameFrequency::Monthly,
            ..test_config(1, Duration::from_secs(1000))
        });

        shipper.record(message("routed")).await.unwrap();

        let writes = client.writes();
        assert_eq!(
            writes[0][0].0,
            current_index_name("shiptest", IndexNameFrequency::Monthly)
        );
    }

    #[tokio::test]
    async fn test_failed_flush_is_swallowed_by_default() {
        let (shipper, client) = shipper_with(test_config(1, Duration::from_secs(1000)));
        client.fail.store(true, Ordering::SeqCst);

        shipper.record(message("lost")).await.unwrap();

        assert_eq!(shipper.pending_len(), 0);
        let stats = shipper.stats();
        assert_eq!(stats.failed_flushes, 1);
        assert_eq!(stats.logs_dropped, 1);
        assert_eq!(stats.logs_flushed, 0);
    }

    #[tokio::test]
    async fn test_failed_flush_raises_when_configured() {
        let (shipper, client) = shipper_with(Config {
            raise_on_indexing_exceptions: true,
            ..test_config(2, Duration::from_secs(1000))
        });
        client.fail.store(true, Ordering::SeqCst);

        shipper.record(message("first")).await.unwrap();
        let result = shipper.record(message("second")).await;

        assert!(matches!(result, Err(ShipperError::Transport(_))));
        // Discarded, not re-buffered
        assert_eq!(shipper.pending_len(), 0);

        client.fail.store(false, Ordering::SeqCst);
        shipper.record(message("third")).await.unwrap();
        shipper.flush().await.unwrap();
        assert_eq!(client.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_timer_flush_failure_is_logged_not_raised() {
        let (shipper, client) = shipper_with(Config {
            raise_on_indexing_exceptions: true,
            ..test_config(500, Duration::from_millis(50))
        });
        client.fail.store(true, Ordering::SeqCst);

        shipper.record(message("timed out")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(shipper.pending_len(), 0);
        let stats = shipper.stats();
        assert_eq!(stats.failed_flushes, 1);
        assert_eq!(stats.logs_dropped, 1);
        assert!(shipper.is_timer_armed());
        assert!(client.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_capability_always_propagates() {
        let shipper = LogShipper::with_provider(
            test_config(1, Duration::from_secs(1000)),
            Arc::new(MissingCapability),
        )
        .unwrap();

        let result = shipper.record(message("unsent")).await;
        assert!(matches!(result, Err(ShipperError::Environment(_))));
        assert_eq!(shipper.pending_len(), 0);

        assert!(matches!(
            shipper.test_connection().await,
            Err(ShipperError::Environment(_))
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_pending_entries() {
        let (shipper, client) = shipper_with(test_config(100, Duration::from_secs(1000)));

        shipper.record(message("one")).await.unwrap();
        shipper.record(message("two")).await.unwrap();
        shipper.close().await.unwrap();

        assert_eq!(client.writes().len(), 1);
        assert_eq!(client.writes()[0].len(), 2);
        assert!(!shipper.is_timer_armed());

        // Idempotent
        shipper.close().await.unwrap();
        assert_eq!(client.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_close_without_timer_is_noop() {
        let (shipper, client) = shipper_with(test_config(100, Duration::from_secs(1000)));
        shipper.close().await.unwrap();
        assert!(client.writes().is_empty());
    }

    #[tokio::test]
    async fn test_test_connection_delegates_to_ping() {
        let (shipper, client) = shipper_with(test_config(10, Duration::from_secs(1000)));
        shipper.record(message("buffered")).await.unwrap();

        assert!(shipper.test_connection().await.unwrap());
        assert_eq!(client.pings.load(Ordering::SeqCst), 1);
        assert_eq!(shipper.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let client = Arc::new(RecordingClient::default());
        let result = LogShipper::with_provider(
            test_config(0, Duration::from_secs(1)),
            Arc::new(RecordingProvider(client)),
        );
        assert!(matches!(result, Err(ShipperError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_shipper_keeps_its_own_additional_fields() {
        let mut config = test_config(1, Duration::from_secs(1000));
        let (shipper, client) = shipper_with(config.clone());
        config.additional_fields.insert("App".into(), json!("Changed"));

        shipper.record(message("isolated")).await.unwrap();
        assert_eq!(client.documents()[0].get("App"), Some(&json!("Test")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers() {
        let (shipper, client) = shipper_with(test_config(20, Duration::from_millis(20)));
        let shipper = Arc::new(shipper);

        let mut handles = Vec::new();
        for producer in 0..4i64 {
            let shipper = shipper.clone();
            handles.push(tokio::spawn(async move {
                for seq in 0..50i64 {
                    let record = message("concurrent")
                        .with_field("producer", producer)
                        .with_field("seq", seq);
                    shipper.record(record).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        shipper.close().await.unwrap();
        shipper.flush().await.unwrap();

        let documents = client.documents();
        assert_eq!(documents.len(), 200);
        assert_eq!(shipper.stats().logs_flushed, 200);

        for producer in 0..4i64 {
            let seqs: Vec<i64> = documents
                .iter()
                .filter(|doc| doc.get("producer") == Some(&json!(producer)))
                .map(|doc| doc.get("seq").and_then(Value::as_i64).unwrap())
                .collect();
            assert_eq!(seqs, (0..50).collect::<Vec<i64>>());
        }
    }

    #[test]
    fn test_process_fields_do_not_override_configured_values() {
        let mut additional = Map::new();
        additional.insert("host".into(), json!("configured"));

        let mut process = Map::new();
        process.insert("host".into(), json!("detected"));
        process.insert("host_ip".into(), json!("10.0.0.1"));

        merge_process_fields(&mut additional, process);

        assert_eq!(additional.get("host"), Some(&json!("configured")));
        assert_eq!(additional.get("host_ip"), Some(&json!("10.0.0.1")));
    }

    #[test]
    fn test_buffer_config_from_config() {
        let config = test_config(5, Duration::from_secs(2));
        let buffer_config = BufferConfig::from_config(&config);

        assert_eq!(buffer_config.buffer_size, 5);
        assert_eq!(buffer_config.flush_interval, Duration::from_secs(2));
        assert_eq!(buffer_config.index_name, "shiptest");
        assert!(buffer_config.filtered_fields.contains("created"));
    }
}
