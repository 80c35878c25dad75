//! `<title>`/`<meta>`/`<html lang>` metadata harvest: iterate every
//! `<meta>` tag, lowercase its `name`/`property`, map
//! author/description/keywords/language/publication-date, then let
//! `<html lang>` override language if present.

use chrono::NaiveDate;
use scraper::{Html, Selector};

#[derive(Debug, Default, Clone)]
pub struct PageMetadata {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub publication_date: Option<String>,
}

/// Best-effort date parsing across a handful of common formats, without
/// pulling in a full natural-language date parser. Returns `None` rather
/// than erroring on a parse failure.
fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.to_rfc3339());
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d.format("%Y-%m-%d").to_string());
        }
    }
    None
}

#[must_use]
pub fn extract_metadata(document: &Html) -> PageMetadata {
    let mut meta = PageMetadata::default();

    if let Ok(sel) = Selector::parse("title")
        && let Some(el) = document.select(&sel).next()
    {
        meta.title = el.text().collect::<String>().trim().to_string();
    }

    if let Ok(sel) = Selector::parse("meta") {
        for el in document.select(&sel) {
            let name = el.value().attr("name").unwrap_or_default().to_lowercase();
            let property = el
                .value()
                .attr("property")
                .unwrap_or_default()
                .to_lowercase();
            let content = el.value().attr("content").unwrap_or_default().trim();
            if content.is_empty() {
                continue;
            }

            if name == "author" || name == "creator" || property == "article:author" {
                meta.author.get_or_insert_with(|| content.to_string());
            }
            if name == "description" || property == "og:description" {
                meta.description.get_or_insert_with(|| content.to_string());
            }
            if name == "keywords" || name == "tags" {
                meta.tags = content
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect();
            }
            if name == "language" || property == "og:locale" {
                meta.language.get_or_insert_with(|| content.to_string());
            }
            if name == "date"
                || name == "publish-date"
                || name == "publication-date"
                || property == "article:published_time"
            {
                if meta.publication_date.is_none() {
                    meta.publication_date = parse_date(content);
                }
            }
        }
    }

    if let Ok(sel) = Selector::parse("html")
        && let Some(el) = document.select(&sel).next()
        && let Some(lang) = el.value().attr("lang")
        && !lang.trim().is_empty()
    {
        meta.language = Some(lang.trim().to_string());
    }

    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_author_and_date() {
        let html = r#"<html lang="fr"><head><title> My Post </title>
            <meta name="author" content="Jane Doe">
            <meta property="article:published_time" content="2024-03-05">
            <meta name="keywords" content="rust, web, scraping">
            </head><body></body></html>"#;
        let document = Html::parse_document(html);
        let meta = extract_metadata(&document);
        assert_eq!(meta.title, "My Post");
        assert_eq!(meta.author.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.publication_date.as_deref(), Some("2024-03-05"));
        assert_eq!(meta.tags, vec!["rust", "web", "scraping"]);
        assert_eq!(meta.language.as_deref(), Some("fr"));
    }

    #[test]
    fn malformed_date_is_silently_dropped() {
        assert_eq!(parse_date("not a date"), None);
    }
}
