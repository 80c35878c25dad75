//! Main-content isolation, metadata harvest, structured-data harvest and
//! format rendering.

pub mod clean;
pub mod metadata;
pub mod renderers;
pub mod structured_data;

use serde::{Deserialize, Serialize};

pub use renderers::{render, OutputFormat};
pub use structured_data::{extract_structured_data, StructuredData};

/// Result of extracting one fetched page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentExtraction {
    pub title: String,
    pub content: String,
    pub author: Option<String>,
    pub publication_date: Option<String>,
    pub tags: Vec<String>,
    pub language: Option<String>,
    pub word_count: usize,
    pub reading_time_minutes: u32,
}

/// Page-level facts the Scraping Service gathers independently of content
/// extraction (status code, final URL, link/image counts) and threads
/// through to the renderers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageData {
    pub url: String,
    pub final_url: Option<String>,
    pub status_code: Option<u16>,
    pub page_title: Option<String>,
    pub meta_description: Option<String>,
    pub links_count: usize,
    pub images_count: usize,
}

fn reading_time_minutes(word_count: usize) -> u32 {
    ((word_count as f64 / 200.0).round() as u32).max(1)
}

/// Extract the dominant article subtree, clean it, harvest metadata, and
/// assemble a `ContentExtraction`. On any internal failure, produces an
/// empty extraction with an explanatory stub rather than propagating.
#[must_use]
pub fn extract_main_content(html: &str, base_url: Option<&str>) -> ContentExtraction {
    if html.trim().is_empty() {
        return empty_extraction("empty HTML document");
    }

    let document = scraper::Html::parse_document(html);
    let meta = metadata::extract_metadata(&document);

    let cleaned = clean::isolate_and_clean(html, base_url);
    let text = clean::html_to_text(&cleaned);

    if text.trim().is_empty() {
        return empty_extraction("no extractable text content");
    }

    let word_count = text.split_whitespace().count();

    ContentExtraction {
        title: meta.title,
        content: text,
        author: meta.author,
        publication_date: meta.publication_date,
        tags: meta.tags,
        language: meta.language,
        word_count,
        reading_time_minutes: reading_time_minutes(word_count),
    }
}

fn empty_extraction(reason: &str) -> ContentExtraction {
    ContentExtraction {
        title: String::new(),
        content: format!("extraction failed: {reason}"),
        word_count: 0,
        reading_time_minutes: 1,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_title_and_body_text() {
        let html = r#"<html lang="en"><head><title>Hello</title>
            <meta name="author" content="Ada Lovelace">
            </head><body><nav>skip me</nav>
            <article><p>Real content goes here and has several words.</p></article>
            </body></html>"#;
        let extraction = extract_main_content(html, Some("https://example.com"));
        assert_eq!(extraction.title, "Hello");
        assert_eq!(extraction.author.as_deref(), Some("Ada Lovelace"));
        assert!(extraction.content.contains("Real content"));
        assert!(!extraction.content.contains("skip me"));
        assert!(extraction.word_count > 0);
    }

    #[test]
    fn empty_html_yields_empty_extraction() {
        let extraction = extract_main_content("", None);
        assert_eq!(extraction.word_count, 0);
        assert!(extraction.content.contains("extraction failed"));
    }

    #[test]
    fn reading_time_rounds_and_floors_at_one() {
        assert_eq!(reading_time_minutes(0), 1);
        assert_eq!(reading_time_minutes(100), 1);
        assert_eq!(reading_time_minutes(300), 2);
        assert_eq!(reading_time_minutes(400), 2);
    }
}
