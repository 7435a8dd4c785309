use crate::record::LogEntry;
use async_trait::async_trait;
use std::error::Error;
use std::future::Future;

/// Error type returned by delivery strategies.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Delivery strategy for batches of [`LogEntry`]s accumulated by
/// [`Timber`](crate::timber::Timber).
///
/// Implementations transport a batch to a concrete backend (the Timber
/// ingestion API, stdout, a test collector). The sink worker calls `sync`
/// from its own Tokio task and never from the application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Deliver one batch.
    ///
    /// **Parameters**
    /// - `logs`: entries in enqueue order, at most `batch_size` long.
    ///
    /// **Returns**
    /// - `Ok(logs)` with the entries that were accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, serialization
    ///   error, HTTP status, etc.). The worker treats this as a transient
    ///   failure and retries the batch with backoff.
    async fn sync(&self, logs: Vec<LogEntry>) -> Result<Vec<LogEntry>, BoxError>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// [`LogSink`] backed by an async closure. See [`sync_fn`].
#[derive(Clone)]
pub struct SyncFn<F> {
    f: F,
}

/// Wrap an async closure as a [`LogSink`].
///
/// The closure receives the accumulated batch and returns it, the same
/// contract as [`LogSink::sync`].
pub fn sync_fn<F, Fut>(f: F) -> SyncFn<F>
where
    F: Fn(Vec<LogEntry>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<LogEntry>, BoxError>> + Send,
{
    SyncFn { f }
}

#[async_trait]
impl<F, Fut> LogSink for SyncFn<F>
where
    F: Fn(Vec<LogEntry>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<LogEntry>, BoxError>> + Send,
{
    async fn sync(&self, logs: Vec<LogEntry>) -> Result<Vec<LogEntry>, BoxError> {
        (self.f)(logs).await
    }
}
