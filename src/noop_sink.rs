use crate::record::LogEntry;
use crate::sink::{BoxError, LogSink};
use async_trait::async_trait;

/// A sink that accepts every batch and discards it.
///
/// Used when no network delivery is compiled in, for measuring the
/// overhead of the adapters themselves, and in tests that don't care
/// about delivery.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn sync(&self, logs: Vec<LogEntry>) -> Result<Vec<LogEntry>, BoxError> {
        Ok(logs)
    }
}
