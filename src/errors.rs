//! Leaf error types for each subsystem, plus the HTTP-facing sanitization.
//!
//! Each subsystem gets its own `thiserror`-derived leaf enum; `anyhow`
//! is reserved for aggregation points that don't need typed variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("disallowed target: {0}")]
    DisallowedTarget(String),
    #[error("pool exhausted")]
    PoolExhausted,
    #[error("navigation timeout after {0}ms")]
    NavigationTimeout(u64),
    #[error("target responded with http status {0}")]
    HttpStatus(u16),
    #[error("engine disconnected")]
    EngineDisconnected,
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    System(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("timed out waiting for an available engine after {0:?}")]
    AcquireTimeout(std::time::Duration),
    #[error("failed to launch rendering engine: {0}")]
    LaunchFailed(String),
    #[error("pool is shutting down")]
    ShuttingDown,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("remote tier error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("request body too large ({0} bytes)")]
    TooLarge(usize),
    #[error("rate limit exceeded, retry after {0}s")]
    Exceeded(u64),
    #[error("client is temporarily blocked, retry after {0}s")]
    Blocked(u64),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch not found: {0}")]
    NotFound(String),
    #[error("batch already started: {0}")]
    AlreadyStarted(String),
}

/// Top-level error surfaced at the HTTP gate. Collapses `anyhow::Error`
/// context chains to a single user string at the boundary.
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("unexpected error")]
    Other(#[from] anyhow::Error),
}

impl GateError {
    /// Maps each error variant to the HTTP status code it should surface as.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::Scrape(ScrapeError::InvalidUrl(_))
            | GateError::Scrape(ScrapeError::UnsupportedFormat(_))
            | GateError::Scrape(ScrapeError::DisallowedTarget(_)) => 422,
            GateError::Scrape(ScrapeError::HttpStatus(_)) => 502,
            GateError::Scrape(ScrapeError::PoolExhausted)
            | GateError::Pool(PoolError::AcquireTimeout(_)) => 503,
            GateError::Scrape(ScrapeError::NavigationTimeout(_)) => 504,
            GateError::RateLimit(RateLimitError::TooLarge(_)) => 413,
            GateError::RateLimit(RateLimitError::Exceeded(_))
            | GateError::RateLimit(RateLimitError::Blocked(_)) => 429,
            GateError::Batch(BatchError::NotFound(_)) => 404,
            GateError::Batch(BatchError::AlreadyStarted(_)) => 409,
            _ => 500,
        }
    }

    /// Sanitized message for production responses. `debug_mode` controls
    /// whether internal detail is disclosed.
    pub fn public_message(&self, debug_mode: bool) -> String {
        match self {
            GateError::Other(e) if !debug_mode => {
                log::error!("internal error: {e:#}");
                "an internal error occurred".to_string()
            }
            GateError::Scrape(ScrapeError::System(_)) if !debug_mode => {
                log::error!("internal error: {self}");
                "an internal error occurred".to_string()
            }
            other => other.to_string(),
        }
    }
}
