use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use timber_sink::init::init_tracing;
use timber_sink::{Timber, TimberHttpLayer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Reads TIMBER_API_KEY / TIMBER_SOURCE_ID (and optional tuning vars).
    let timber = Timber::from_env()?;
    init_tracing(timber.clone())?;

    let app = Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route("/unauthorized", get(|| async { (StatusCode::UNAUTHORIZED, "Unauthorized") }))
        .layer(TimberHttpLayer::new(timber.clone()));

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    timber.flush().await;
    Ok(())
}
