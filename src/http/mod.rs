//! HTTP gate: route table, CORS, and the security/rate-limit middleware
//! stack. The composition root lives in [`state::AppState`]; this module
//! only wires routes to handlers and layers the cross-cutting concerns
//! around them.

pub mod envelope;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Assemble the full route table over a shared [`AppState`]. CORS is
/// wide-open on origin but credential-less (no cookie-based session to
/// protect) while still rejecting browser-sent credentials.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .route("/stats/browser", get(handlers::stats_browser))
        .route("/stats/cache", get(handlers::stats_cache))
        .route("/stats/memory", get(handlers::stats_memory))
        .route("/scrape", post(handlers::create_scrape))
        .route("/scrape/batch", post(handlers::create_batch))
        .route("/scrape/batch/:id", get(handlers::get_batch))
        .route("/scrape/batch/:id", delete(handlers::cancel_batch))
        .route("/scrape/:id", get(handlers::get_scrape))
        .route("/scrape/:id", delete(handlers::cancel_scrape))
        .route("/scrape/:id/result", get(handlers::get_scrape_result))
        .route("/tasks", get(handlers::list_tasks))
        .route("/cache", delete(handlers::clear_cache))
        .route("/cache/:key", delete(handlers::delete_cache_key))
        .route("/maintenance/gc", post(handlers::maintenance_gc))
        .route("/maintenance/optimize", post(handlers::maintenance_optimize))
        .route("/maintenance/cleanup", post(handlers::maintenance_cleanup))
        .layer(axum::middleware::from_fn_with_state(Arc::clone(&state), middleware::rate_limit_gate))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve the gate, carrying the client's real socket address into
/// `ConnectInfo` for `middleware::extract_client_ip`'s transport-peer
/// fallback.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("scrape gate listening on {addr}");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
