//! Per-client sliding-window rate limiting with an abuse-scoring
//! heuristic, keyed by client id via `dashmap::DashMap` (the crate's usual
//! idiom for sharded-by-key state), with a per-entry `parking_lot::Mutex`
//! guarding each client's windows.

mod client;
mod rules;

pub use client::{ClientId, ClientStats};
pub use rules::RateLimitRule;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::RateLimitError;

const ABUSE_SCORE_BLOCK_THRESHOLD: f64 = 10.0;
const ABUSE_SCORE_EMA_FACTOR: f64 = 0.8;
const INACTIVE_CLIENT_TTL_SECS: u64 = 24 * 3_600;

const SUSPICIOUS_USER_AGENTS: &[&str] = &[
    "sqlmap", "nikto", "nmap", "masscan", "zgrab", "python-requests/", "curl/", "wget/", "bot",
];

const ATTACK_SUBSTRINGS: &[&str] = &[
    "union select",
    "drop table",
    "insert into",
    "<script>",
    "javascript:",
    "eval(",
    "../",
    "etc/passwd",
    "cmd.exe",
    "or 1=1",
    "' or '1'='1",
    "admin'--",
];

/// Per-minute accounting surfaced for the gate's `x-ratelimit-*` response
/// headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitHeaders {
    pub limit: usize,
    pub remaining: usize,
    pub reset_secs: u64,
    /// True once `remaining` drops below 10% of `limit`.
    pub low_remaining_warning: bool,
}

/// The decision returned by [`RateLimiter::check`].
#[derive(Debug, Clone)]
pub enum Decision {
    Allow(RateLimitHeaders),
    Deny { reason: &'static str, retry_after_secs: u64 },
}

/// Request attributes the limiter needs; callers extract these from the
/// inbound HTTP request at the gate.
pub struct RequestContext<'a> {
    pub client_ip: &'a str,
    pub user_agent: &'a str,
    pub url: &'a str,
    pub header_bytes: usize,
    pub content_length: Option<usize>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RateLimiterStats {
    pub total_clients: usize,
    pub active_clients_1h: usize,
    pub blocked_clients: usize,
    pub total_requests: u64,
    pub total_blocked_requests: u64,
}

pub struct RateLimiter {
    clients: DashMap<String, ClientStats>,
    default_rule: RateLimitRule,
    scraping_rule: RateLimitRule,
    maintenance_rule: RateLimitRule,
    max_request_size_bytes: usize,
    max_url_length: usize,
    max_header_size_bytes: usize,
    total_requests: AtomicU64,
    total_blocked: AtomicU64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_request_size_bytes: usize, max_url_length: usize, max_header_size_bytes: usize) -> Self {
        Self {
            clients: DashMap::new(),
            default_rule: RateLimitRule::default_rule(),
            scraping_rule: RateLimitRule::scraping_rule(),
            maintenance_rule: RateLimitRule::maintenance_rule(),
            max_request_size_bytes,
            max_url_length,
            max_header_size_bytes,
            total_requests: AtomicU64::new(0),
            total_blocked: AtomicU64::new(0),
        }
    }

    /// Hash `(client_ip, user_agent[..50])` into a 16-hex-char client id
    /// (`sha256(...)[..16]`).
    #[must_use]
    pub fn client_id(client_ip: &str, user_agent: &str) -> ClientId {
        let truncated_ua: String = user_agent.chars().take(50).collect();
        let unique = format!("{client_ip}:{truncated_ua}");
        let digest = Sha256::digest(unique.as_bytes());
        ClientId(hex::encode(digest)[..16].to_string())
    }

    fn rule_for_path(&self, path: &str) -> &RateLimitRule {
        if path.starts_with("/maintenance") {
            &self.maintenance_rule
        } else if path.starts_with("/scrape") {
            &self.scraping_rule
        } else {
            &self.default_rule
        }
    }

    /// Admission check: request size, then sliding windows, then abuse
    /// scoring. Records the request on `Allow`.
    pub fn check(&self, path: &str, ctx: &RequestContext<'_>) -> Result<Decision, RateLimitError> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(len) = ctx.content_length
            && len > self.max_request_size_bytes
        {
            return Err(RateLimitError::TooLarge(len));
        }

        let id = Self::client_id(ctx.client_ip, ctx.user_agent);
        let rule = self.rule_for_path(path);
        let now = now_secs();

        let mut entry = self.clients.entry(id.0.clone()).or_insert_with(ClientStats::new);

        if let Some(blocked_until) = entry.blocked_until
            && now < blocked_until
        {
            let remaining = blocked_until - now;
            return Ok(Decision::Deny {
                reason: "client is temporarily blocked",
                retry_after_secs: remaining,
            });
        }

        entry.prune_windows(now);

        if entry.minute_requests.len() >= rule.requests_per_minute {
            self.block(&mut entry, rule.block_duration_minutes);
            return Ok(Decision::Deny {
                reason: "per-minute limit exceeded",
                retry_after_secs: rule.block_duration_minutes as u64 * 60,
            });
        }
        if entry.hour_count(now) >= rule.requests_per_hour {
            self.block(&mut entry, rule.block_duration_minutes);
            return Ok(Decision::Deny {
                reason: "per-hour limit exceeded",
                retry_after_secs: rule.block_duration_minutes as u64 * 60,
            });
        }
        if entry.day_count(now) >= rule.requests_per_day {
            self.block(&mut entry, rule.block_duration_minutes * 4);
            return Ok(Decision::Deny {
                reason: "per-day limit exceeded",
                retry_after_secs: rule.block_duration_minutes as u64 * 4 * 60,
            });
        }
        if entry.burst_requests.len() >= rule.burst_limit {
            self.block(&mut entry, rule.block_duration_minutes / 2);
            return Ok(Decision::Deny {
                reason: "burst limit exceeded",
                retry_after_secs: rule.block_duration_minutes as u64 / 2 * 60,
            });
        }

        self.record(&mut entry, ctx, now);

        if entry.abuse_score > ABUSE_SCORE_BLOCK_THRESHOLD {
            self.block(&mut entry, 60);
        }

        let remaining = rule.requests_per_minute.saturating_sub(entry.minute_requests.len());
        let reset_secs = 60 - (now % 60);
        Ok(Decision::Allow(RateLimitHeaders {
            limit: rule.requests_per_minute,
            remaining,
            reset_secs,
            low_remaining_warning: remaining * 10 < rule.requests_per_minute,
        }))
    }

    fn block(&self, entry: &mut ClientStats, duration_minutes: u32) {
        entry.blocked_until = Some(now_secs() + duration_minutes as u64 * 60);
        entry.blocked_requests += 1;
        self.total_blocked.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, entry: &mut ClientStats, ctx: &RequestContext<'_>, now: u64) {
        entry.total_requests += 1;
        entry.last_request_time = now;
        entry.minute_requests.push_back(now);
        entry.hour_requests.push_back(now / 3_600);
        entry.day_requests.push_back(now / 86_400);
        entry.burst_requests.push_back(now);

        let suspicion = self.suspicion_score(ctx, entry);
        entry.abuse_score = entry.abuse_score * ABUSE_SCORE_EMA_FACTOR + suspicion * (1.0 - ABUSE_SCORE_EMA_FACTOR);
    }

    fn suspicion_score(&self, ctx: &RequestContext<'_>, entry: &ClientStats) -> f64 {
        let mut score = 0.0;
        let ua = ctx.user_agent.to_lowercase();

        if SUSPICIOUS_USER_AGENTS.iter().any(|s| ua.contains(s)) {
            score += 2.0;
        }
        if ua.is_empty() || ua.len() < 10 {
            score += 1.5;
        }

        let url_lower = ctx.url.to_lowercase();
        for pattern in ATTACK_SUBSTRINGS {
            if url_lower.contains(pattern) {
                score += 5.0;
            }
        }

        if ctx.header_bytes > self.max_header_size_bytes {
            score += 3.0;
        }
        if ctx.url.len() > self.max_url_length {
            score += 2.0;
        }

        if entry.minute_requests.len() > 10 {
            let times: Vec<u64> = entry.minute_requests.iter().copied().collect();
            let intervals: Vec<f64> = times.windows(2).map(|w| (w[1] as f64 - w[0] as f64)).collect();
            if !intervals.is_empty() {
                let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
                let variance = intervals.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
                if variance < 0.1 && mean < 5.0 {
                    score += 2.0;
                }
            }
        }

        score
    }

    /// Remove clients silent for 24h.
    pub fn cleanup_inactive(&self) -> usize {
        let now = now_secs();
        let stale: Vec<String> = self
            .clients
            .iter()
            .filter(|e| now.saturating_sub(e.last_request_time) > INACTIVE_CLIENT_TTL_SECS)
            .map(|e| e.key().clone())
            .collect();
        let count = stale.len();
        for key in stale {
            self.clients.remove(&key);
        }
        count
    }

    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let now = now_secs();
        let active = self.clients.iter().filter(|e| now.saturating_sub(e.last_request_time) < 3_600).count();
        let blocked = self
            .clients
            .iter()
            .filter(|e| e.blocked_until.is_some_and(|b| now < b))
            .count();

        RateLimiterStats {
            total_clients: self.clients.len(),
            active_clients_1h: active,
            blocked_clients: blocked,
            total_requests: self.total_requests.load(Ordering::Relaxed),
            total_blocked_requests: self.total_blocked.load(Ordering::Relaxed),
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(ip: &'a str, ua: &'a str, url: &'a str) -> RequestContext<'a> {
        RequestContext {
            client_ip: ip,
            user_agent: ua,
            url,
            header_bytes: 100,
            content_length: None,
        }
    }

    #[test]
    fn client_id_is_stable_and_truncated() {
        let a = RateLimiter::client_id("1.2.3.4", "Mozilla/5.0 test-agent");
        let b = RateLimiter::client_id("1.2.3.4", "Mozilla/5.0 test-agent");
        assert_eq!(a.0, b.0);
        assert_eq!(a.0.len(), 16);
    }

    #[test]
    fn allows_first_request() {
        let limiter = RateLimiter::new(10_000_000, 2048, 8192);
        let decision = limiter.check("/scrape", &ctx("1.1.1.1", "Mozilla/5.0 real browser UA", "https://example.com")).unwrap();
        assert!(matches!(decision, Decision::Allow(_)));
    }

    #[test]
    fn oversized_request_rejected_before_windows() {
        let limiter = RateLimiter::new(100, 2048, 8192);
        let mut c = ctx("1.1.1.1", "Mozilla/5.0 real browser UA", "https://example.com");
        c.content_length = Some(1_000);
        let err = limiter.check("/scrape", &c).unwrap_err();
        assert!(matches!(err, RateLimitError::TooLarge(1_000)));
    }

    #[test]
    fn burst_limit_blocks_client() {
        let limiter = RateLimiter::new(10_000_000, 2048, 8192);
        let c = ctx("2.2.2.2", "Mozilla/5.0 real browser UA", "https://example.com");
        for _ in 0..5 {
            let _ = limiter.check("/scrape", &c);
        }
        let decision = limiter.check("/scrape", &c).unwrap();
        assert!(matches!(decision, Decision::Deny { .. }));
    }

    #[test]
    fn suspicious_user_agent_raises_abuse_score() {
        let limiter = RateLimiter::new(10_000_000, 2048, 8192);
        let c = ctx("3.3.3.3", "sqlmap/1.0", "https://example.com/?x=union select 1");
        let _ = limiter.check("/scrape", &c);
        let stats = limiter.clients.get(&RateLimiter::client_id("3.3.3.3", "sqlmap/1.0").0).unwrap();
        assert!(stats.abuse_score > 0.0);
    }

    #[test]
    fn stats_reports_totals() {
        let limiter = RateLimiter::new(10_000_000, 2048, 8192);
        let c = ctx("4.4.4.4", "Mozilla/5.0 real browser UA", "https://example.com");
        let _ = limiter.check("/scrape", &c);
        let stats = limiter.stats();
        assert_eq!(stats.total_clients, 1);
        assert_eq!(stats.total_requests, 1);
    }
}
