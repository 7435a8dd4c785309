//! The Timber sink: a cloneable handle in front of a batching worker.
//!
//! Adapters call [`Timber::enqueue`], which never blocks: entries go into a
//! bounded channel drained by a background Tokio task. The task groups
//! entries into batches and hands each batch to the current [`LogSink`],
//! retrying failed deliveries with exponential backoff.
//!
//! The worker runs on its own thread and current-thread runtime, with the
//! thread's default dispatcher set to [`Dispatch::none`]. Everything that
//! runs there, including connection tasks spawned by the HTTP client during
//! delivery, stays invisible to the application's subscriber, so delivering
//! entries never produces new ones.

use crate::env;
use crate::error::{panic_message, ConfigError};
use crate::record::{LogEntry, LogLevel};
use crate::sink::{sync_fn, BoxError, LogSink};
use futures_util::FutureExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tracing::dispatcher::{self, Dispatch, WeakDispatch};

/// Default ingestion endpoint used by [`HttpDelivery`](crate::delivery::HttpDelivery).
pub const DEFAULT_ENDPOINT: &str = "https://logs.timber.io";

/// Entry preprocessor registered with [`Timber::use_preprocessor`].
pub type Preprocessor = Arc<dyn Fn(LogEntry) -> LogEntry + Send + Sync>;

/// Options consumed by the sink worker.
///
/// **Fields**
/// - `endpoint`: base URL for network delivery.
/// - `batch_size`: maximum entries per delivered batch; a full batch is
///   delivered immediately.
/// - `batch_interval`: maximum time an entry waits in a partial batch.
/// - `channel_buffer`: capacity of the queue between adapters and the
///   worker; entries beyond it are dropped.
/// - `max_retries`: how many times a failed batch is retried.
/// - `retry_backoff` / `max_retry_backoff`: initial and maximum delay
///   between retries.
#[derive(Clone, Debug)]
pub struct TimberOptions {
    pub endpoint: String,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub channel_buffer: usize,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_retry_backoff: Duration,
}

impl Default for TimberOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch_size: 1000,
            batch_interval: Duration::from_secs(1),
            channel_buffer: 8192,
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            max_retry_backoff: Duration::from_secs(10),
        }
    }
}

impl TimberOptions {
    /// Defaults overridden by `TIMBER_ENDPOINT`, `TIMBER_BATCH_SIZE` and
    /// `TIMBER_BATCH_INTERVAL_MS` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut options = Self {
            endpoint: env::env_or(env::TIMBER_ENDPOINT_ENV, DEFAULT_ENDPOINT),
            ..Self::default()
        };
        if let Some(batch_size) = env::env_parse(env::TIMBER_BATCH_SIZE_ENV)? {
            options.batch_size = batch_size;
        }
        if let Some(ms) = env::env_parse(env::TIMBER_BATCH_INTERVAL_MS_ENV)? {
            options.batch_interval = Duration::from_millis(ms);
        }
        Ok(options)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_interval(mut self, batch_interval: Duration) -> Self {
        self.batch_interval = batch_interval;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_backoff = initial;
        self.max_retry_backoff = max;
        self
    }

    // Enforce minimal thresholds to avoid degenerate configs.
    fn normalized(mut self) -> Self {
        self.channel_buffer = self.channel_buffer.max(16);
        self.batch_size = self.batch_size.max(1);
        self.batch_interval = self.batch_interval.max(Duration::from_millis(1));
        self.max_retry_backoff = self.max_retry_backoff.max(self.retry_backoff);
        self
    }
}

enum Command {
    Log(LogEntry),
    Flush(oneshot::Sender<()>),
}

struct Shared {
    sink: RwLock<Arc<dyn LogSink>>,
    preprocessors: RwLock<Vec<Preprocessor>>,
    options: TimberOptions,
    logged: AtomicU64,
    synced: AtomicU64,
    dropped: AtomicU64,
    // Subscriber that was current when the handle was built. Weak, so a
    // subscriber holding a `TimberLayer` doesn't keep the worker alive.
    diagnostics: WeakDispatch,
}

impl Shared {
    fn sink(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.sink.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Report worker diagnostics to the application's subscriber.
    fn diagnose(&self, report: impl FnOnce()) {
        if let Some(dispatch) = self.diagnostics.upgrade() {
            dispatcher::with_default(&dispatch, report);
        }
    }
}

/// Handle to the Timber sink.
///
/// Cloning is cheap; all clones feed the same worker. The worker delivers
/// whatever is still buffered and stops once every clone is dropped.
#[derive(Clone)]
pub struct Timber {
    sender: mpsc::Sender<Command>,
    shared: Arc<Shared>,
}

impl Timber {
    /// Create a sink delivering to the Timber ingestion API with default
    /// options.
    pub fn new(api_key: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self::with_options(api_key, source_id, TimberOptions::default())
    }

    /// Like [`Timber::new`] with explicit [`TimberOptions`].
    pub fn with_options(
        api_key: impl Into<String>,
        source_id: impl Into<String>,
        options: TimberOptions,
    ) -> Self {
        let sink = default_sink(api_key.into(), source_id.into(), &options);
        Self::with_sink(sink, options)
    }

    /// Build from `TIMBER_API_KEY`, `TIMBER_SOURCE_ID` and the optional
    /// variables read by [`TimberOptions::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = env::env_required(env::TIMBER_API_KEY_ENV)?;
        let source_id = env::env_required(env::TIMBER_SOURCE_ID_ENV)?;
        Ok(Self::with_options(api_key, source_id, TimberOptions::from_env()?))
    }

    /// Create a sink with a custom delivery strategy and spawn its worker
    /// thread.
    pub fn with_sink(sink: Arc<dyn LogSink>, options: TimberOptions) -> Self {
        let options = options.normalized();
        let (sender, receiver) = mpsc::channel(options.channel_buffer);

        let shared = Arc::new(Shared {
            sink: RwLock::new(sink),
            preprocessors: RwLock::new(Vec::new()),
            options,
            logged: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            diagnostics: dispatcher::get_default(Dispatch::downgrade),
        });

        spawn_worker(receiver, Arc::clone(&shared));

        Self { sender, shared }
    }

    /// Replace the delivery strategy. Batches delivered after this call use
    /// the new sink.
    pub fn set_sink(&self, sink: Arc<dyn LogSink>) {
        *self.shared.sink.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    /// Replace the delivery strategy with an async closure that receives
    /// each batch and returns it.
    pub fn set_sync<F, Fut>(&self, f: F)
    where
        F: Fn(Vec<LogEntry>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<LogEntry>, BoxError>> + Send + 'static,
    {
        self.set_sink(Arc::new(sync_fn(f)));
    }

    /// Register a preprocessor applied to every entry at enqueue time, after
    /// the ones already registered.
    pub fn use_preprocessor<F>(&self, f: F)
    where
        F: Fn(LogEntry) -> LogEntry + Send + Sync + 'static,
    {
        self.shared
            .preprocessors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(f));
    }

    /// Hand one entry to the sink. Never blocks; if the queue is full or the
    /// worker is gone the entry is counted as dropped.
    pub fn enqueue(&self, entry: LogEntry) {
        let entry = {
            let preprocessors = self
                .shared
                .preprocessors
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            preprocessors.iter().fold(entry, |entry, f| f(entry))
        };

        match self.sender.try_send(Command::Log(entry)) {
            Ok(()) => {
                self.shared.logged.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        fields: BTreeMap<String, serde_json::Value>,
    ) {
        let mut entry = LogEntry::new(level, message);
        entry.merge_fields(fields);
        self.enqueue(entry);
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.enqueue(LogEntry::new(LogLevel::Debug, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.enqueue(LogEntry::new(LogLevel::Info, message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.enqueue(LogEntry::new(LogLevel::Warn, message));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.enqueue(LogEntry::new(LogLevel::Error, message));
    }

    /// Deliver everything enqueued before this call, then flush the sink.
    ///
    /// Unlike [`Timber::enqueue`] this waits for queue capacity.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Entries accepted into the queue.
    pub fn logged(&self) -> u64 {
        self.shared.logged.load(Ordering::Relaxed)
    }

    /// Entries the sink reported as delivered.
    pub fn synced(&self) -> u64 {
        self.shared.synced.load(Ordering::Relaxed)
    }

    /// Entries lost to a full queue or to exhausted retries.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn options(&self) -> &TimberOptions {
        &self.shared.options
    }
}

#[cfg(feature = "http-delivery")]
fn default_sink(api_key: String, source_id: String, options: &TimberOptions) -> Arc<dyn LogSink> {
    use crate::delivery::{HttpDelivery, HttpDeliveryConfig};

    Arc::new(HttpDelivery::new(HttpDeliveryConfig {
        endpoint: options.endpoint.clone(),
        api_key,
        source_id,
    }))
}

#[cfg(not(feature = "http-delivery"))]
fn default_sink(_api_key: String, _source_id: String, _options: &TimberOptions) -> Arc<dyn LogSink> {
    Arc::new(crate::noop_sink::NoopSink)
}

fn spawn_worker(receiver: mpsc::Receiver<Command>, shared: Arc<Shared>) {
    let spawned = std::thread::Builder::new()
        .name("timber-sink".to_string())
        .spawn(move || {
            let _silenced = dispatcher::set_default(&Dispatch::none());
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    shared.diagnose(|| tracing::error!(error = %e, "timber worker runtime failed to start"));
                    return;
                }
            };
            runtime.block_on(run_worker(receiver, shared));
        });

    if let Err(e) = spawned {
        tracing::error!(error = %e, "timber worker thread failed to start");
    }
}

async fn run_worker(mut receiver: mpsc::Receiver<Command>, shared: Arc<Shared>) {
    let batch_size = shared.options.batch_size;
    let batch_interval = shared.options.batch_interval;
    let mut batch: Vec<LogEntry> = Vec::with_capacity(batch_size);
    // Set when the first entry of a partial batch arrives.
    let mut deadline: Option<Instant> = None;

    loop {
        let flush_at = deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            command = receiver.recv() => match command {
                Some(Command::Log(entry)) => {
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + batch_interval);
                    }
                    batch.push(entry);
                    if batch.len() >= batch_size {
                        deliver(&shared, &mut batch).await;
                        deadline = None;
                    }
                }
                Some(Command::Flush(ack)) => {
                    deliver(&shared, &mut batch).await;
                    deadline = None;
                    let flushed = AssertUnwindSafe(shared.sink().flush()).catch_unwind().await;
                    match flushed {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => shared.diagnose(|| tracing::warn!(error = %e, "timber sink flush failed")),
                        Err(payload) => {
                            let e = panic_message(payload.as_ref());
                            shared.diagnose(|| tracing::warn!(error = %e, "timber sink flush panicked"));
                        }
                    }
                    let _ = ack.send(());
                }
                None => {
                    deliver(&shared, &mut batch).await;
                    break;
                }
            },
            _ = sleep_until(flush_at), if deadline.is_some() => {
                deliver(&shared, &mut batch).await;
                deadline = None;
            }
        }
    }
}

async fn deliver(shared: &Shared, batch: &mut Vec<LogEntry>) {
    if batch.is_empty() {
        return;
    }

    let logs = std::mem::take(batch);
    let count = logs.len() as u64;
    let sink = shared.sink();
    let mut backoff = shared.options.retry_backoff;
    let mut attempt = 0;

    loop {
        // A panicking sink counts as a failed attempt instead of killing the worker.
        let attempted = AssertUnwindSafe(sink.sync(logs.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(format!("sink panicked: {}", panic_message(payload.as_ref())).into()));

        match attempted {
            Ok(synced) => {
                shared.synced.fetch_add(synced.len() as u64, Ordering::Relaxed);
                return;
            }
            Err(e) if attempt >= shared.options.max_retries => {
                shared.dropped.fetch_add(count, Ordering::Relaxed);
                shared.diagnose(|| tracing::warn!(error = %e, dropped = count, "timber sync failed, dropping batch"));
                return;
            }
            Err(e) => {
                attempt += 1;
                shared.diagnose(|| tracing::warn!(error = %e, attempt, ?backoff, "timber sync failed, retrying"));
                sleep(backoff).await;
                backoff = next_backoff(backoff, shared.options.max_retry_backoff);
            }
        }
    }
}

fn next_backoff(backoff: Duration, max: Duration) -> Duration {
    std::cmp::min(backoff.saturating_mul(2), max)
}
