//! Cache key (fingerprint) derivation.
//!
//! Uses `xxhash_rust::xxh3::xxh3_64`, hex-formatted, applied to the
//! canonicalized `(url, output_format, transform_provider, use_transform,
//! custom_instructions)` tuple as the fingerprint input.

use xxhash_rust::xxh3::xxh3_64;

/// Canonicalize and hash the cache-key tuple. Canonicalization lowercases
/// the URL scheme/host while leaving path/query untouched, since output
/// format and transform settings are already case-normalized by their own
/// parsers.
#[must_use]
pub fn fingerprint(
    url: &str,
    output_format: &str,
    transform_provider: Option<&str>,
    use_transform: bool,
    custom_instructions: Option<&str>,
) -> String {
    let canonical_url = canonicalize_url(url);
    let mut buf = String::with_capacity(canonical_url.len() + 64);
    buf.push_str(&canonical_url);
    buf.push('\u{1}');
    buf.push_str(output_format);
    buf.push('\u{1}');
    buf.push_str(transform_provider.unwrap_or(""));
    buf.push('\u{1}');
    buf.push(if use_transform { '1' } else { '0' });
    buf.push('\u{1}');
    buf.push_str(custom_instructions.unwrap_or(""));

    let hash = xxh3_64(buf.as_bytes());
    format!("{hash:016x}")
}

fn canonicalize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme().to_lowercase();
            let host = parsed.host_str().unwrap_or_default().to_lowercase();
            let rest = &url[parsed.scheme().len() + 3 + parsed.host_str().unwrap_or_default().len()..];
            format!("{scheme}://{host}{rest}")
        }
        Err(_) => url.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_identical_fingerprints() {
        let a = fingerprint("https://Example.com/x", "markdown", None, false, None);
        let b = fingerprint("https://example.com/x", "markdown", None, false, None);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_output_format_changes_fingerprint() {
        let a = fingerprint("https://example.com/x", "markdown", None, false, None);
        let b = fingerprint("https://example.com/x", "json", None, false, None);
        assert_ne!(a, b);
    }

    #[test]
    fn differing_transform_settings_change_fingerprint() {
        let a = fingerprint("https://example.com/x", "markdown", Some("openai"), true, None);
        let b = fingerprint("https://example.com/x", "markdown", Some("openai"), false, None);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_sixteen_hex_chars() {
        let fp = fingerprint("https://example.com", "text", None, false, None);
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
