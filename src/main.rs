// Scrape orchestrator: a thin binary wiring the HTTP gate over the
// library's composition root. Managed as a standalone service (no
// kodegend/MCP transport involved), listening on BIND_ADDR.

use std::net::SocketAddr;

use anyhow::Result;

use kodegen_scrape_orchestrator::config::ServiceConfig;
use kodegen_scrape_orchestrator::http::{self, state::AppState};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bind_addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:30445".to_string())
        .parse()?;
    let debug_mode = std::env::var("SCRAPE_DEBUG").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    let config = ServiceConfig::builder()
        .bind_addr(bind_addr)
        .debug_mode(debug_mode)
        .build()?;

    let state = AppState::build(config, None).await?;
    http::serve(state, bind_addr).await
}
