use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use timber_sink::{
    init::init_tracing,
    record::LogEntry,
    sink::{BoxError, LogSink},
    Timber, TimberOptions,
};

/// Example of delivering batches somewhere other than Timber by
/// implementing the `LogSink` trait directly.
struct StdoutSink;

#[async_trait]
impl LogSink for StdoutSink {
    async fn sync(&self, logs: Vec<LogEntry>) -> Result<Vec<LogEntry>, BoxError> {
        for entry in &logs {
            println!("[stdout-sink] {}", serde_json::to_string(entry)?);
        }
        Ok(logs)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let timber = Timber::with_sink(Arc::new(StdoutSink), TimberOptions::default());

    init_tracing(timber.clone())?;

    info!("custom backend example started");
    error!(db = "my-custom-db", "simulated error sent via custom backend");

    timber.flush().await;
    Ok(())
}
