//! `tracing` transport adapter.

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use common::{capturing_timber, delivered_entries};
use timber_sink::{LogEntry, LogLevel, TimberLayer, TimberOptions};

const MESSAGE: &str = "Something to do with something";

fn emit(level: Level, message: &str) {
    if level == Level::TRACE {
        tracing::trace!("{message}");
    } else if level == Level::DEBUG {
        tracing::debug!("{message}");
    } else if level == Level::INFO {
        tracing::info!("{message}");
    } else if level == Level::WARN {
        tracing::warn!("{message}");
    } else {
        tracing::error!("{message}");
    }
}

async fn assert_level(level: Level, expected: LogLevel) {
    let (timber, delivered) = capturing_timber(TimberOptions::default());
    let layer = TimberLayer::new(timber.clone()).with_max_level(LevelFilter::TRACE);
    let subscriber = Registry::default().with(layer);

    {
        let _guard = tracing::subscriber::set_default(subscriber);
        emit(level, MESSAGE);
    }

    let logs = delivered_entries(&timber, &delivered).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, MESSAGE);
    assert_eq!(logs[0].level, expected);
}

#[tokio::test]
async fn logs_at_debug() {
    assert_level(Level::DEBUG, LogLevel::Debug).await;
}

#[tokio::test]
async fn logs_at_info() {
    assert_level(Level::INFO, LogLevel::Info).await;
}

#[tokio::test]
async fn logs_at_warn() {
    assert_level(Level::WARN, LogLevel::Warn).await;
}

#[tokio::test]
async fn logs_at_error() {
    assert_level(Level::ERROR, LogLevel::Error).await;
}

#[tokio::test]
async fn unrecognized_level_defaults_to_info() {
    assert_level(Level::TRACE, LogLevel::Info).await;
}

#[tokio::test]
async fn rapid_events_are_forwarded_individually_and_batched_by_the_sink() {
    let options = TimberOptions::default()
        .with_batch_size(4)
        .with_batch_interval(Duration::from_secs(30));
    let (timber, _) = capturing_timber(options);

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<LogEntry>>();
    timber.set_sync(move |logs| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(logs.clone());
            Ok::<_, timber_sink::sink::BoxError>(logs)
        }
    });

    let entries = [
        (Level::INFO, format!("{MESSAGE} 1")),
        (Level::DEBUG, format!("{MESSAGE} 2")),
        (Level::WARN, format!("{MESSAGE} 3")),
        (Level::ERROR, format!("{MESSAGE} 4")),
    ];

    let layer = TimberLayer::new(timber.clone()).with_max_level(LevelFilter::DEBUG);
    {
        let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
        for (level, message) in &entries {
            emit(*level, message);
        }
    }

    // Delivered because the batch filled up, well before the interval.
    let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("batch delivered before the flush interval")
        .expect("sink still running");

    assert_eq!(batch.len(), entries.len());
    for log in &batch {
        assert!(entries.iter().any(|(_, message)| *message == log.message), "{}", log.message);
    }
}

#[tokio::test]
async fn event_fields_are_flattened_onto_the_entry() {
    let (timber, delivered) = capturing_timber(TimberOptions::default());
    let layer = TimberLayer::new(timber.clone());

    {
        let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
        tracing::info!(request_id = 123, "a test message");
    }

    let logs = delivered_entries(&timber, &delivered).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "a test message");
    assert_eq!(logs[0].level, LogLevel::Info);
    assert_eq!(logs[0].field("request_id"), Some(&json!(123)));

    let value = serde_json::to_value(&logs[0]).unwrap();
    assert_eq!(value["request_id"], 123);
}

#[tokio::test]
async fn default_fields_merge_with_event_fields() {
    let (timber, delivered) = capturing_timber(TimberOptions::default());
    let layer = TimberLayer::new(timber.clone())
        .with_default_field("component", "server")
        .with_default_field("request_id", 0);

    {
        let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
        tracing::info!(request_id = 123, "a test message");
    }

    let logs = delivered_entries(&timber, &delivered).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "a test message");
    assert_eq!(logs[0].field("component"), Some(&json!("server")));
    assert_eq!(logs[0].field("request_id"), Some(&json!(123)));
}

#[tokio::test]
async fn span_fields_sit_between_defaults_and_event_fields() {
    let (timber, delivered) = capturing_timber(TimberOptions::default());
    let layer = TimberLayer::new(timber.clone())
        .with_default_field("component", "server")
        .with_default_field("region", "eu");

    {
        let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
        let outer = tracing::info_span!("request", component = "handler", user = "alice");
        let _outer = outer.enter();
        let inner = tracing::info_span!("query", user = "bob");
        let _inner = inner.enter();
        tracing::warn!(component = "db", "slow query");
    }

    let logs = delivered_entries(&timber, &delivered).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Warn);
    assert_eq!(logs[0].field("region"), Some(&json!("eu")));
    assert_eq!(logs[0].field("user"), Some(&json!("bob")));
    assert_eq!(logs[0].field("component"), Some(&json!("db")));
}

#[tokio::test]
async fn events_are_filtered_by_level_and_exact_own_target() {
    let (timber, delivered) = capturing_timber(TimberOptions::default());
    let layer = TimberLayer::new(timber.clone());

    {
        let _guard = tracing::subscriber::set_default(Registry::default().with(layer));
        tracing::debug!("too verbose");
        tracing::warn!(target: "timber_sink::timber", "timber sync failed, retrying");
        tracing::info!("kept");
        tracing::info!(target: "timber_sink_ext::handlers", "kept from a neighbouring crate");
    }

    let logs = delivered_entries(&timber, &delivered).await;
    let messages: Vec<_> = logs.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, ["kept", "kept from a neighbouring crate"]);
}
