//! Per-context request interception: abort requests by resource type,
//! blocked domain, or URL substring ("abort if type∈X or host∈Y or
//! substring∈Z"). The same domain/url substring checks an asset-fetching
//! filter would apply before an outbound `reqwest` call, run here instead
//! at CDP request-interception time via `chromiumoxide_cdp`'s Fetch
//! domain.

use chromiumoxide::cdp::browser_protocol::network::ResourceType;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// Resource types aborted by type. Images are aborted unless the request
/// is a favicon; media and fonts are aborted unconditionally.
const FILTERED_RESOURCE_TYPES: &[ResourceType] = &[ResourceType::Image, ResourceType::Media, ResourceType::Font];

const URL_SUBSTRING_BLOCKLIST: &[&str] = &["analytics", "tracking", "pixel", "beacon"];

/// Advisory deny-list of tracker/ad domains. The concrete set here is a
/// reasonable default; the load-bearing contract is that a configurable
/// deny-list is honored, not this exact list.
const DOMAIN_BLOCKLIST: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "facebook.net",
    "facebook.com/tr",
    "hotjar.com",
    "segment.io",
    "mixpanel.com",
    "amplitude.com",
    "adsrvr.org",
    "criteo.com",
    "taboola.com",
    "outbrain.com",
];

const FONT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Request filter applied at context acquisition, plus a lightweight
/// recent-static-asset cache so repeated font requests within
/// `FONT_CACHE_TTL` are aborted outright.
#[derive(Debug, Default)]
pub struct RequestFilter {
    recent_fonts: DashMap<String, Instant>,
    blocked_domains: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Continue,
    Abort,
}

impl RequestFilter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            recent_fonts: DashMap::new(),
            blocked_domains: DOMAIN_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[must_use]
    pub fn with_blocked_domains(mut self, domains: Vec<String>) -> Self {
        self.blocked_domains = domains;
        self
    }

    /// Decide whether a request should continue or be aborted.
    /// `resource_type` is `None` for resource kinds the filter doesn't
    /// special-case (documents, scripts, stylesheets, xhr).
    #[must_use]
    pub fn decide(&self, url: &str, resource_type: ResourceType, is_favicon: bool) -> FilterDecision {
        let lower = url.to_lowercase();

        if URL_SUBSTRING_BLOCKLIST.iter().any(|s| lower.contains(s)) {
            return FilterDecision::Abort;
        }

        if let Some(host) = extract_host(&lower)
            && self.blocked_domains.iter().any(|d| host.ends_with(d.as_str()))
        {
            return FilterDecision::Abort;
        }

        if FILTERED_RESOURCE_TYPES.contains(&resource_type)
            && !(resource_type == ResourceType::Image && is_favicon)
        {
            return FilterDecision::Abort;
        }

        if resource_type == ResourceType::Font {
            let now = Instant::now();
            if let Some(seen) = self.recent_fonts.get(&lower)
                && now.duration_since(*seen) < FONT_CACHE_TTL
            {
                return FilterDecision::Abort;
            }
            self.recent_fonts.insert(lower, now);
        }

        FilterDecision::Continue
    }
}

fn extract_host(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborts_blocked_tracker_domain() {
        let filter = RequestFilter::new();
        let decision = filter.decide(
            "https://www.google-analytics.com/collect",
            ResourceType::Xhr,
            false,
        );
        assert_eq!(decision, FilterDecision::Abort);
    }

    #[test]
    fn aborts_url_substring_match() {
        let filter = RequestFilter::new();
        let decision = filter.decide("https://example.com/pixel.gif?id=1", ResourceType::Image, false);
        assert_eq!(decision, FilterDecision::Abort);
    }

    #[test]
    fn allows_favicon_images() {
        let filter = RequestFilter::new();
        let decision = filter.decide("https://example.com/favicon.ico", ResourceType::Image, true);
        assert_eq!(decision, FilterDecision::Continue);
    }

    #[test]
    fn aborts_non_favicon_images() {
        let filter = RequestFilter::new();
        let decision = filter.decide("https://example.com/hero.png", ResourceType::Image, false);
        assert_eq!(decision, FilterDecision::Abort);
    }

    #[test]
    fn fonts_are_aborted_unconditionally_by_type() {
        let filter = RequestFilter::new();
        let first = filter.decide("https://example.com/font.woff2", ResourceType::Font, false);
        let second = filter.decide("https://example.com/font.woff2", ResourceType::Font, false);
        assert_eq!(first, FilterDecision::Abort);
        assert_eq!(second, FilterDecision::Abort);
    }

    #[test]
    fn aborts_media_requests() {
        let filter = RequestFilter::new();
        let decision = filter.decide("https://example.com/clip.mp4", ResourceType::Media, false);
        assert_eq!(decision, FilterDecision::Abort);
    }

    #[test]
    fn allows_ordinary_document_requests() {
        let filter = RequestFilter::new();
        let decision = filter.decide("https://example.com/", ResourceType::Document, false);
        assert_eq!(decision, FilterDecision::Continue);
    }
}
