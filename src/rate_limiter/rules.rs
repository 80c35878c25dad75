//! Named rate-limit rules (`default`, `scraping`, `maintenance` — all three
//! are reachable through the route table: `maintenance` gates
//! `POST /maintenance/{gc,optimize,cleanup}`).

#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub requests_per_minute: usize,
    pub requests_per_hour: usize,
    pub requests_per_day: usize,
    pub burst_limit: usize,
    pub block_duration_minutes: u32,
}

impl RateLimitRule {
    #[must_use]
    pub fn default_rule() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1_000,
            requests_per_day: 10_000,
            burst_limit: 10,
            block_duration_minutes: 15,
        }
    }

    #[must_use]
    pub fn scraping_rule() -> Self {
        Self {
            requests_per_minute: 30,
            requests_per_hour: 500,
            requests_per_day: 5_000,
            burst_limit: 5,
            block_duration_minutes: 30,
        }
    }

    #[must_use]
    pub fn maintenance_rule() -> Self {
        Self {
            requests_per_minute: 10,
            requests_per_hour: 100,
            requests_per_day: 1_000,
            burst_limit: 2,
            block_duration_minutes: 60,
        }
    }
}
