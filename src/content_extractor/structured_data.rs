//! JSON-LD / Open Graph / Twitter Card harvest: parse every
//! `<script type="application/ld+json">` independently (malformed blocks
//! skipped silently), collect `<meta property="og:*">` into one map and
//! `<meta name="twitter:*">` into another.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredData {
    pub json_ld: Vec<serde_json::Value>,
    pub open_graph: HashMap<String, String>,
    pub twitter: HashMap<String, String>,
}

#[must_use]
pub fn extract_structured_data(html: &str) -> StructuredData {
    let document = Html::parse_document(html);
    let mut data = StructuredData::default();

    if let Ok(sel) = Selector::parse(r#"script[type="application/ld+json"]"#) {
        for el in document.select(&sel) {
            let raw: String = el.text().collect();
            if raw.trim().is_empty() {
                continue;
            }
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                data.json_ld.push(value);
            }
            // malformed blocks are skipped silently rather than aborting extraction
        }
    }

    if let Ok(sel) = Selector::parse("meta[property], meta[name]") {
        for el in document.select(&sel) {
            let Some(content) = el.value().attr("content") else {
                continue;
            };
            if content.trim().is_empty() {
                continue;
            }
            if let Some(property) = el.value().attr("property")
                && let Some(key) = property.strip_prefix("og:")
            {
                data.open_graph
                    .entry(key.to_string())
                    .or_insert_with(|| content.to_string());
            }
            if let Some(name) = el.value().attr("name")
                && let Some(key) = name.strip_prefix("twitter:")
            {
                data.twitter
                    .entry(key.to_string())
                    .or_insert_with(|| content.to_string());
            }
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_jsonld_and_skips_malformed() {
        let html = r#"<html><head>
            <script type="application/ld+json">{"@type":"Article","headline":"Hi"}</script>
            <script type="application/ld+json">{not valid json</script>
            </head></html>"#;
        let data = extract_structured_data(html);
        assert_eq!(data.json_ld.len(), 1);
        assert_eq!(data.json_ld[0]["headline"], "Hi");
    }

    #[test]
    fn collects_og_and_twitter_maps() {
        let html = r#"<html><head>
            <meta property="og:title" content="Title">
            <meta property="og:image" content="https://example.com/a.png">
            <meta name="twitter:card" content="summary">
            </head></html>"#;
        let data = extract_structured_data(html);
        assert_eq!(data.open_graph.get("title").map(String::as_str), Some("Title"));
        assert_eq!(data.open_graph.get("image").map(String::as_str), Some("https://example.com/a.png"));
        assert_eq!(data.twitter.get("card").map(String::as_str), Some("summary"));
    }

    #[test]
    fn empty_document_yields_empty_maps() {
        let data = extract_structured_data("<html></html>");
        assert!(data.json_ld.is_empty());
        assert!(data.open_graph.is_empty());
        assert!(data.twitter.is_empty());
    }
}
