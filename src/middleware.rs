//! HTTP request logging middleware.
//!
//! [`TimberHttpLayer`] wraps any tower service handling `http::Request`s,
//! such as an axum `Router`, and enqueues exactly one [`LogEntry`] per
//! request once the inner service has produced a response, returned an
//! error, or panicked, or once the response future is dropped unfinished.
//!
//! ```text
//! request → TimberHttp → inner service → response   ⇒ "<label> HTTP request: <status>"
//!                                      → Err(e)     ⇒ Error entry, Err(e) returned
//!                                      → panic      ⇒ Error entry, panic resumed
//!                                      → dropped    ⇒ Warn "<label> HTTP request cancelled"
//! ```

use crate::error::panic_message;
use crate::record::{LogEntry, LogLevel};
use crate::timber::Timber;
use axum::http::{Request, Response};
use futures_util::future::{BoxFuture, FutureExt};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Label used in entry messages unless overridden.
pub const DEFAULT_LABEL: &str = "Axum";

/// Layer producing [`TimberHttp`] services.
///
/// ```ignore
/// let app = Router::new()
///     .route("/ping", get(|| async { "pong" }))
///     .layer(TimberHttpLayer::new(timber.clone()));
/// ```
#[derive(Clone)]
pub struct TimberHttpLayer {
    timber: Timber,
    label: Arc<str>,
}

impl TimberHttpLayer {
    pub fn new(timber: Timber) -> Self {
        Self {
            timber,
            label: Arc::from(DEFAULT_LABEL),
        }
    }

    /// Framework name prefixed to entry messages, e.g. `"Axum"` in
    /// `"Axum HTTP request: 200"`.
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        self.label = Arc::from(label.as_ref());
        self
    }
}

impl<S> Layer<S> for TimberHttpLayer {
    type Service = TimberHttp<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimberHttp {
            inner,
            timber: self.timber.clone(),
            label: Arc::clone(&self.label),
        }
    }
}

/// Service logging the outcome of every request to [`Timber`].
#[derive(Clone)]
pub struct TimberHttp<S> {
    inner: S,
    timber: Timber,
    label: Arc<str>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TimberHttp<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut request = RequestLog {
            timber: self.timber.clone(),
            label: Arc::clone(&self.label),
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            started: Instant::now(),
            logged: false,
        };
        let future = self.inner.call(req);

        Box::pin(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(response)) => {
                    let entry = request.completed(response.status().as_u16());
                    request.log(entry);
                    Ok(response)
                }
                Ok(Err(err)) => {
                    let entry = request.failed(&err.to_string());
                    request.log(entry);
                    Err(err)
                }
                Err(payload) => {
                    let entry = request.failed(&panic_message(payload.as_ref()));
                    request.log(entry);
                    panic::resume_unwind(payload)
                }
            }
        })
    }
}

/// Per-request state carried by the response future.
///
/// Logs exactly once: on completion through [`RequestLog::log`], or on drop
/// if the future is cancelled first (client disconnect, outer timeout).
struct RequestLog {
    timber: Timber,
    label: Arc<str>,
    method: String,
    path: String,
    started: Instant,
    logged: bool,
}

impl RequestLog {
    fn log(&mut self, entry: LogEntry) {
        self.logged = true;
        self.timber.enqueue(entry);
    }

    fn completed(&self, status: u16) -> LogEntry {
        let message = format!("{} HTTP request: {}", self.label, status);
        self.entry(LogLevel::from_status(status), message)
            .with_field("status", status)
    }

    fn failed(&self, fault: &str) -> LogEntry {
        let message = format!("{} HTTP request failed: {}", self.label, fault);
        self.entry(LogLevel::Error, message)
    }

    fn cancelled(&self) -> LogEntry {
        let message = format!("{} HTTP request cancelled", self.label);
        self.entry(LogLevel::Warn, message)
    }

    fn entry(&self, level: LogLevel, message: String) -> LogEntry {
        let elapsed = self.started.elapsed();
        LogEntry::new(level, message)
            .with_field("method", self.method.as_str())
            .with_field("path", self.path.as_str())
            .with_field("duration_ms", elapsed.as_secs_f64() * 1000.0)
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        if !self.logged {
            let entry = self.cancelled();
            self.log(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noop_sink::NoopSink;
    use crate::timber::TimberOptions;

    fn request_log(timber: &Timber) -> RequestLog {
        RequestLog {
            timber: timber.clone(),
            label: Arc::from("Axum"),
            method: "GET".to_string(),
            path: "/ping".to_string(),
            started: Instant::now(),
            logged: false,
        }
    }

    #[test]
    fn request_log_builds_entries() {
        let timber = Timber::with_sink(Arc::new(NoopSink), TimberOptions::default());
        let request = request_log(&timber);

        let ok = request.completed(200);
        assert_eq!(ok.message, "Axum HTTP request: 200");
        assert_eq!(ok.level, LogLevel::Info);
        assert_eq!(ok.field("method"), Some(&serde_json::json!("GET")));
        assert_eq!(ok.field("status"), Some(&serde_json::json!(200)));

        let failed = request.failed("Error from middleware");
        assert_eq!(failed.level, LogLevel::Error);
        assert!(failed.message.contains("Error from middleware"));
        assert_eq!(failed.field("status"), None);

        let cancelled = request.cancelled();
        assert_eq!(cancelled.level, LogLevel::Warn);
        assert_eq!(cancelled.message, "Axum HTTP request cancelled");
    }

    #[test]
    fn request_log_enqueues_exactly_once() {
        let timber = Timber::with_sink(Arc::new(NoopSink), TimberOptions::default());

        let mut completed = request_log(&timber);
        let entry = completed.completed(204);
        completed.log(entry);
        drop(completed);
        assert_eq!(timber.logged(), 1);

        drop(request_log(&timber));
        assert_eq!(timber.logged(), 2);
    }
}
