use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;
use tracing::error;

use timber_sink::init::{init_tracing_with_config, LayerConfig};
use timber_sink::noop_sink::NoopSink;
use timber_sink::{Timber, TimberOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let timber = Timber::with_sink(Arc::new(NoopSink), TimberOptions::default());
    init_tracing_with_config(
        timber.clone(),
        LayerConfig {
            enable_stdout: false,
            ..LayerConfig::default()
        },
    )?;

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "default load test error");
    }

    let elapsed = start.elapsed();
    println!(
        "default config: enqueued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    tokio::time::timeout(Duration::from_secs(5), timber.flush()).await?;
    println!(
        "logged={} synced={} dropped={}",
        timber.logged(),
        timber.synced(),
        timber.dropped()
    );
    Ok(())
}
