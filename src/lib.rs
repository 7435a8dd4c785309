//! Timber logging SDK.
//!
//! [`Timber`](timber::Timber) is the sink: a cloneable handle that batches
//! entries in a background task and delivers them through a pluggable
//! [`LogSink`](sink::LogSink). Two adapters feed it:
//!
//! - [`TimberHttpLayer`](middleware::TimberHttpLayer), tower/axum middleware
//!   logging one entry per HTTP request;
//! - [`TimberLayer`](layer::TimberLayer), a `tracing_subscriber` layer
//!   logging one entry per `tracing` event.

pub mod record;
pub mod sink;
pub mod timber;
pub mod layer;
pub mod middleware;

#[cfg(feature = "http-delivery")]
pub mod delivery;

pub mod env;
pub mod error;
pub mod init;
pub mod noop_sink;

pub use layer::TimberLayer;
pub use middleware::TimberHttpLayer;
pub use record::{LogEntry, LogLevel};
pub use timber::{Timber, TimberOptions};
