//! URL validation utilities.

/// Check if a URL is valid for scraping: must parse, and must use `http`
/// or `https`. Any other scheme is rejected before a request is ever made.
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_https() {
        assert!(is_valid_url("http://example.com"));
        assert!(is_valid_url("https://example.com/page"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(!is_valid_url("ftp://example.com"));
        assert!(!is_valid_url("javascript:alert(1)"));
        assert!(!is_valid_url("data:text/plain,hi"));
        assert!(!is_valid_url("mailto:a@b.com"));
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("not a url"));
    }
}
