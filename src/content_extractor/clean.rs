//! Structural HTML cleanup: strip unwanted tags/selectors, retain only
//! essential attributes, resolve relative links, and project to text.
//!
//! `scraper`'s DOM is read-only, so cleaning is implemented as a tree
//! walk that skips removed subtrees while re-serializing the kept ones,
//! the same walk-and-strip style used elsewhere against
//! `markup5ever_rcdom`.

use ego_tree::NodeId;
use scraper::{Html, Node, Selector};
use std::collections::HashSet;
use std::fmt::Write as _;
use url::Url;

const UNWANTED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "object", "embed", "form",
    "input", "button", "select", "textarea", "noscript", "canvas",
];

const UNWANTED_SUBSTRINGS: &[&str] = &[
    "comment",
    "sidebar",
    "footer",
    "header",
    "navigation",
    "menu",
    "ad",
    "advertisement",
    "popup",
];

const ESSENTIAL_ATTRS: &[&str] = &["href", "src", "alt", "title"];

fn matches_unwanted_attr(value: &str) -> bool {
    let lower = value.to_lowercase();
    UNWANTED_SUBSTRINGS.iter().any(|s| lower.contains(s))
}

fn collect_removed(document: &Html) -> HashSet<NodeId> {
    let mut removed = HashSet::new();

    if let Ok(selector) = Selector::parse(&UNWANTED_TAGS.join(",")) {
        for el in document.select(&selector) {
            removed.insert(el.id());
        }
    }

    for el in document.root_element().descendants().filter_map(|n| {
        scraper::ElementRef::wrap(n)
    }) {
        let class_hit = el.value().attr("class").is_some_and(matches_unwanted_attr);
        let id_hit = el.value().attr("id").is_some_and(matches_unwanted_attr);
        if class_hit || id_hit {
            removed.insert(el.id());
        }
    }

    removed
}

fn is_under_removed(node: ego_tree::NodeRef<'_, Node>, removed: &HashSet<NodeId>) -> bool {
    let mut cur = Some(node);
    while let Some(n) = cur {
        if removed.contains(&n.id()) {
            return true;
        }
        cur = n.parent();
    }
    false
}

fn resolve(base: Option<&Url>, raw: &str) -> String {
    match base {
        Some(base) => base
            .join(raw)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    }
}

/// Serialize the document with unwanted subtrees removed and attributes
/// stripped to `{href, src, alt, title}`, with those resolved against
/// `base_url` when present.
#[must_use]
pub fn isolate_and_clean(html: &str, base_url: Option<&str>) -> String {
    let document = Html::parse_document(html);
    let removed = collect_removed(&document);
    let base = base_url.and_then(|b| Url::parse(b).ok());

    let mut out = String::new();
    serialize_node(document.tree.root(), &removed, base.as_ref(), &mut out);
    out
}

fn serialize_node(
    node: ego_tree::NodeRef<'_, Node>,
    removed: &HashSet<NodeId>,
    base: Option<&Url>,
    out: &mut String,
) {
    if removed.contains(&node.id()) {
        return;
    }
    match node.value() {
        Node::Element(el) => {
            let name = el.name();
            let _ = write!(out, "<{name}");
            for attr in ESSENTIAL_ATTRS {
                if let Some(value) = el.attr(attr) {
                    let resolved = if *attr == "href" || *attr == "src" {
                        resolve(base, value)
                    } else {
                        value.to_string()
                    };
                    let _ = write!(out, " {attr}=\"{}\"", html_escape::encode_double_quoted_attribute(&resolved));
                }
            }
            out.push('>');
            for child in node.children() {
                serialize_node(child, removed, base, out);
            }
            let _ = write!(out, "</{name}>");
        }
        Node::Text(text) => {
            out.push_str(&html_escape::encode_text(text));
        }
        _ => {
            for child in node.children() {
                serialize_node(child, removed, base, out);
            }
        }
    }
}

/// Collapse a cleaned HTML fragment to plain text: strip any remaining
/// `<script>`/`<style>`, pull text nodes, strip-then-single-space-join.
#[must_use]
pub fn html_to_text(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let raw: String = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .split("  ")
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_unwanted_tags() {
        let html = "<div><nav>nav text</nav><p>keep this</p><script>evil()</script></div>";
        let cleaned = isolate_and_clean(html, None);
        assert!(!cleaned.contains("nav text"));
        assert!(!cleaned.contains("evil()"));
        assert!(cleaned.contains("keep this"));
    }

    #[test]
    fn strips_elements_by_class_substring() {
        let html = r#"<div><div class="ad-banner">buy now</div><p>article text</p></div>"#;
        let cleaned = isolate_and_clean(html, None);
        assert!(!cleaned.contains("buy now"));
        assert!(cleaned.contains("article text"));
    }

    #[test]
    fn resolves_relative_links_against_base() {
        let html = r#"<a href="/about">About</a>"#;
        let cleaned = isolate_and_clean(html, Some("https://example.com/blog/post"));
        assert!(cleaned.contains("https://example.com/about"));
    }

    #[test]
    fn strips_non_essential_attributes() {
        let html = r#"<p onclick="evil()" data-x="1">hi</p>"#;
        let cleaned = isolate_and_clean(html, None);
        assert!(!cleaned.contains("onclick"));
        assert!(!cleaned.contains("data-x"));
    }

    #[test]
    fn html_to_text_collapses_whitespace() {
        let text = html_to_text("<p>hello\n\n  world</p>");
        assert_eq!(text, "hello world");
    }
}
