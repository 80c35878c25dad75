//! Format renderers: pure functions over `(extraction, page_data)`. Any
//! renderer failure falls back to the `text` form rather than
//! propagating past this boundary.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ContentExtraction;
use crate::errors::ScrapeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Json,
    Xml,
    Csv,
    Html,
    Text,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
            OutputFormat::Csv => "csv",
            OutputFormat::Html => "html",
            OutputFormat::Text => "text",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            "csv" => Ok(OutputFormat::Csv),
            "html" => Ok(OutputFormat::Html),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(ScrapeError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render `extraction` in `format`, falling back to the `text` form on any
/// internal failure so a renderer bug never surfaces as a scrape failure.
#[must_use]
pub fn render(extraction: &ContentExtraction, url: &str, format: OutputFormat) -> String {
    let rendered = match format {
        OutputFormat::Markdown => render_markdown(extraction),
        OutputFormat::Json => render_json(extraction, url),
        OutputFormat::Xml => render_xml(extraction, url),
        OutputFormat::Csv => render_csv(extraction),
        OutputFormat::Html => render_html(extraction),
        OutputFormat::Text => Ok(extraction.content.clone()),
    };
    rendered.unwrap_or_else(|_| extraction.content.clone())
}

fn render_markdown(extraction: &ContentExtraction) -> Result<String, ()> {
    let mut out = String::new();
    out.push_str("# ");
    out.push_str(if extraction.title.is_empty() {
        "Untitled"
    } else {
        &extraction.title
    });
    out.push_str("\n\n");

    if let Some(author) = &extraction.author {
        out.push_str(&format!("**Author:** {author}\n\n"));
    }
    if let Some(date) = &extraction.publication_date {
        out.push_str(&format!("**Published:** {date}\n\n"));
    }
    if let Some(lang) = &extraction.language {
        out.push_str(&format!("**Language:** {lang}\n\n"));
    }
    if !extraction.tags.is_empty() {
        out.push_str(&format!("**Tags:** {}\n\n", extraction.tags.join(", ")));
    }
    out.push_str(&format!(
        "**Word count:** {} · **Reading time:** {} min\n\n",
        extraction.word_count, extraction.reading_time_minutes
    ));

    out.push_str("---\n\n");
    out.push_str(&extraction.content);
    Ok(out)
}

#[derive(Serialize)]
struct JsonArticle<'a> {
    title: &'a str,
    content: &'a str,
    author: &'a Option<String>,
    publication_date: &'a Option<String>,
    tags: &'a [String],
    language: &'a Option<String>,
    word_count: usize,
    reading_time_minutes: u32,
    url: &'a str,
    extracted_at: String,
}

fn render_json(extraction: &ContentExtraction, url: &str) -> Result<String, ()> {
    let article = JsonArticle {
        title: &extraction.title,
        content: &extraction.content,
        author: &extraction.author,
        publication_date: &extraction.publication_date,
        tags: &extraction.tags,
        language: &extraction.language,
        word_count: extraction.word_count,
        reading_time_minutes: extraction.reading_time_minutes,
        url,
        extracted_at: Utc::now().to_rfc3339(),
    };
    serde_json::to_string_pretty(&article).map_err(|_| ())
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn render_xml(extraction: &ContentExtraction, url: &str) -> Result<String, ()> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<article>\n");
    out.push_str(&format!("  <title>{}</title>\n", xml_escape(&extraction.title)));
    out.push_str(&format!("  <url>{}</url>\n", xml_escape(url)));
    if let Some(author) = &extraction.author {
        out.push_str(&format!("  <author>{}</author>\n", xml_escape(author)));
    }
    if let Some(date) = &extraction.publication_date {
        out.push_str(&format!("  <publication_date>{}</publication_date>\n", xml_escape(date)));
    }
    if let Some(lang) = &extraction.language {
        out.push_str(&format!("  <language>{}</language>\n", xml_escape(lang)));
    }
    out.push_str(&format!("  <word_count>{}</word_count>\n", extraction.word_count));
    out.push_str(&format!(
        "  <reading_time_minutes>{}</reading_time_minutes>\n",
        extraction.reading_time_minutes
    ));
    out.push_str("  <tags>\n");
    for tag in &extraction.tags {
        out.push_str(&format!("    <tag>{}</tag>\n", xml_escape(tag)));
    }
    out.push_str("  </tags>\n");
    out.push_str(&format!("  <content>{}</content>\n", xml_escape(&extraction.content)));
    out.push_str("</article>\n");
    Ok(out)
}

fn csv_escape(field: &str) -> String {
    let collapsed = field.replace(['\n', '\r'], " ");
    if collapsed.contains(',') || collapsed.contains('"') {
        format!("\"{}\"", collapsed.replace('"', "\"\""))
    } else {
        collapsed
    }
}

fn render_csv(extraction: &ContentExtraction) -> Result<String, ()> {
    let mut out = String::new();
    out.push_str("title,author,publication_date,language,word_count,reading_time_minutes,tags,content\n");
    out.push_str(&csv_escape(&extraction.title));
    out.push(',');
    out.push_str(&csv_escape(extraction.author.as_deref().unwrap_or_default()));
    out.push(',');
    out.push_str(&csv_escape(extraction.publication_date.as_deref().unwrap_or_default()));
    out.push(',');
    out.push_str(&csv_escape(extraction.language.as_deref().unwrap_or_default()));
    out.push(',');
    out.push_str(&extraction.word_count.to_string());
    out.push(',');
    out.push_str(&extraction.reading_time_minutes.to_string());
    out.push(',');
    out.push_str(&csv_escape(&extraction.tags.join("; ")));
    out.push(',');
    out.push_str(&csv_escape(&extraction.content));
    out.push('\n');
    Ok(out)
}

fn render_html(extraction: &ContentExtraction) -> Result<String, ()> {
    let title = html_escape::encode_text(if extraction.title.is_empty() {
        "Untitled"
    } else {
        &extraction.title
    });
    let body = extraction
        .content
        .split("\n\n")
        .filter(|p| !p.trim().is_empty())
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p.trim())))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(format!(
        "<!DOCTYPE html>\n<html lang=\"{}\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n<article>\n<h1>{title}</h1>\n{body}\n</article>\n</body>\n</html>\n",
        extraction.language.as_deref().unwrap_or("en"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContentExtraction {
        ContentExtraction {
            title: "Hello World".to_string(),
            content: "First paragraph.\n\nSecond paragraph.".to_string(),
            author: Some("Ada".to_string()),
            publication_date: Some("2024-01-01".to_string()),
            tags: vec!["rust".to_string(), "web".to_string()],
            language: Some("en".to_string()),
            word_count: 4,
            reading_time_minutes: 1,
        }
    }

    #[test]
    fn markdown_starts_with_h1() {
        let rendered = render(&sample(), "https://x.test", OutputFormat::Markdown);
        assert!(rendered.starts_with("# Hello World"));
        assert!(rendered.contains("**Author:** Ada"));
    }

    #[test]
    fn json_round_trips_field_set() {
        let rendered = render(&sample(), "https://x.test", OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["title"], "Hello World");
        assert_eq!(value["word_count"], 4);
        assert_eq!(value["url"], "https://x.test");
    }

    #[test]
    fn xml_has_article_root_and_tags() {
        let rendered = render(&sample(), "https://x.test", OutputFormat::Xml);
        assert!(rendered.contains("<article>"));
        assert!(rendered.contains("<tag>rust</tag>"));
        assert!(rendered.contains("<tag>web</tag>"));
    }

    #[test]
    fn csv_has_header_and_collapses_newlines() {
        let rendered = render(&sample(), "https://x.test", OutputFormat::Csv);
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next().unwrap(),
            "title,author,publication_date,language,word_count,reading_time_minutes,tags,content"
        );
        let data_line = lines.next().unwrap();
        assert!(!data_line.contains('\n'));
        assert!(data_line.contains("First paragraph. Second paragraph."));
    }

    #[test]
    fn html_wraps_paragraphs() {
        let rendered = render(&sample(), "https://x.test", OutputFormat::Html);
        assert!(rendered.contains("<p>First paragraph.</p>"));
        assert!(rendered.contains("<p>Second paragraph.</p>"));
    }

    #[test]
    fn text_is_content_as_is() {
        let rendered = render(&sample(), "https://x.test", OutputFormat::Text);
        assert_eq!(rendered, sample().content);
    }

    #[test]
    fn parses_all_format_aliases() {
        assert_eq!("markdown".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("bogus".parse::<OutputFormat>().is_err());
    }
}
