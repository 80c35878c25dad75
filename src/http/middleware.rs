//! Security-header and rate-limit gate middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::rate_limiter::{Decision, RateLimiter, RequestContext};

use super::envelope::Envelope;
use super::state::AppState;

/// Fixed response headers accompanying every response, enforced once
/// here at the gate rather than by each handler.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(HeaderName::from_static("x-frame-options"), HeaderValue::from_static("DENY"));
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

/// Client-identity extraction precedence: `x-forwarded-for` (first hop),
/// then `x-real-ip`, then the transport peer.
fn extract_client_ip(request: &Request) -> String {
    if let Some(xff) = request.headers().get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            return first.trim().to_string();
        }
    }
    if let Some(real_ip) = request.headers().get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.to_string();
    }
    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// The admission gate: request-size check, then the sliding-window/abuse
/// check, applied before the request reaches any handler.
pub async fn rate_limit_gate(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let client_ip = extract_client_ip(&request);
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let header_bytes: usize = request
        .headers()
        .iter()
        .map(|(k, v)| k.as_str().len() + v.len())
        .sum();
    let content_length = request
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let ctx = RequestContext {
        client_ip: &client_ip,
        user_agent: &user_agent,
        url: &path,
        header_bytes,
        content_length,
    };

    match rate_limiter_check(&state.rate_limiter, &path, ctx) {
        Ok(headers) => {
            let mut response = next.run(request).await;
            apply_rate_limit_headers(&mut response, headers);
            response
        }
        Err((status, retry_after)) => {
            let mut response = (status, axum::Json(Envelope::<()>::error("rate limit exceeded"))).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(HeaderName::from_static("retry-after"), value);
            }
            response
        }
    }
}

fn rate_limiter_check(
    limiter: &RateLimiter,
    path: &str,
    ctx: RequestContext<'_>,
) -> Result<crate::rate_limiter::RateLimitHeaders, (StatusCode, u64)> {
    match limiter.check(path, &ctx) {
        Ok(Decision::Allow(headers)) => Ok(headers),
        Ok(Decision::Deny { retry_after_secs, .. }) => Err((StatusCode::TOO_MANY_REQUESTS, retry_after_secs)),
        Err(crate::errors::RateLimitError::TooLarge(_)) => Err((StatusCode::PAYLOAD_TOO_LARGE, 0)),
        Err(crate::errors::RateLimitError::Exceeded(secs)) | Err(crate::errors::RateLimitError::Blocked(secs)) => {
            Err((StatusCode::TOO_MANY_REQUESTS, secs))
        }
    }
}

fn apply_rate_limit_headers(response: &mut Response, headers: crate::rate_limiter::RateLimitHeaders) {
    let h = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&headers.limit.to_string()) {
        h.insert(HeaderName::from_static("x-ratelimit-limit"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&headers.remaining.to_string()) {
        h.insert(HeaderName::from_static("x-ratelimit-remaining"), v);
    }
    if let Ok(v) = HeaderValue::from_str(&headers.reset_secs.to_string()) {
        h.insert(HeaderName::from_static("x-ratelimit-reset"), v);
    }
    if headers.low_remaining_warning {
        h.insert(
            HeaderName::from_static("x-ratelimit-warning"),
            HeaderValue::from_static("approaching rate limit"),
        );
    }
}
