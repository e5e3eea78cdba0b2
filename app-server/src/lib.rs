//! HTTP front end of the vector rules service.
//!
//! Exposes rule and rule type CRUD plus similarity retrieval as JSON over
//! HTTP, backed by a [`vector_rules_retrieval::RuleEngine`].

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vector_rules_retrieval::RuleEngine;

pub use config::{Config, ServerConfig};
pub use error::{ApiError, ApiResult};
pub use routes::{AppState, router};

/// Serve the API on `listener` until `shutdown` is cancelled.
///
/// In-flight requests see their cancellation tokens fire when shutdown
/// starts; commits already running finish before the server stops.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<RuleEngine>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(AppState::new(engine, shutdown.clone()));

    info!("Listening on http://{}/api/v1", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}
