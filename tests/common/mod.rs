//! Shared fixtures for the adapter suites.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use timber_sink::noop_sink::NoopSink;
use timber_sink::sink::BoxError;
use timber_sink::{LogEntry, Timber, TimberOptions};

/// Batches handed to the sink, in delivery order.
pub type Delivered = Arc<Mutex<Vec<Vec<LogEntry>>>>;

/// A sink whose delivery step records every batch instead of sending it.
pub fn capturing_timber(options: TimberOptions) -> (Timber, Delivered) {
    let timber = Timber::with_sink(Arc::new(NoopSink), options);
    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));

    let batches = Arc::clone(&delivered);
    timber.set_sync(move |logs| {
        let batches = Arc::clone(&batches);
        async move {
            batches.lock().unwrap().push(logs.clone());
            Ok::<_, BoxError>(logs)
        }
    });

    (timber, delivered)
}

/// Options with a short flush interval, so tests don't wait on timers.
#[allow(dead_code)]
pub fn fast_options() -> TimberOptions {
    TimberOptions::default().with_batch_interval(Duration::from_millis(1))
}

/// Flush and return every entry delivered so far.
pub async fn delivered_entries(timber: &Timber, delivered: &Delivered) -> Vec<LogEntry> {
    timber.flush().await;
    delivered.lock().unwrap().iter().flatten().cloned().collect()
}
