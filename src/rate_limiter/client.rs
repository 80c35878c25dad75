//! Per-client sliding-window state.

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(pub String);

/// Rolling windows plus abuse bookkeeping for one client.
pub struct ClientStats {
    pub total_requests: u64,
    pub blocked_requests: u64,
    pub last_request_time: u64,
    pub minute_requests: VecDeque<u64>,
    pub hour_requests: VecDeque<u64>,
    pub day_requests: VecDeque<u64>,
    pub burst_requests: VecDeque<u64>,
    pub blocked_until: Option<u64>,
    pub abuse_score: f64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self {
            total_requests: 0,
            blocked_requests: 0,
            last_request_time: 0,
            minute_requests: VecDeque::new(),
            hour_requests: VecDeque::new(),
            day_requests: VecDeque::new(),
            burst_requests: VecDeque::new(),
            blocked_until: None,
            abuse_score: 0.0,
        }
    }

    /// Drop samples that have aged out of their window.
    pub fn prune_windows(&mut self, now: u64) {
        self.minute_requests.retain(|&t| now.saturating_sub(t) < 60);
        let current_hour = now / 3_600;
        self.hour_requests.retain(|&h| current_hour.saturating_sub(h) < 1);
        let current_day = now / 86_400;
        self.day_requests.retain(|&d| current_day.saturating_sub(d) < 1);
        self.burst_requests.retain(|&t| now.saturating_sub(t) < 10);
    }

    /// Count of requests recorded in the current hour bucket.
    pub fn hour_count(&self, now: u64) -> usize {
        let current_hour = now / 3_600;
        self.hour_requests.iter().filter(|&&h| h == current_hour).count()
    }

    /// Count of requests recorded in the current day bucket.
    pub fn day_count(&self, now: u64) -> usize {
        let current_day = now / 86_400;
        self.day_requests.iter().filter(|&&d| d == current_day).count()
    }
}

impl Default for ClientStats {
    fn default() -> Self {
        Self::new()
    }
}
