//! External collaborator interfaces. Both the LLM post-structuring step
//! and the ML page-analysis pipeline live outside this crate — they're
//! specified here only by the interface they expose, so a caller can wire
//! in an externally-supplied provider client without this crate embedding
//! one.

use async_trait::async_trait;

/// `(text, instruction) -> text`. Any failure is logged and the original
/// extraction is preserved rather than surfaced as a scrape failure.
#[async_trait]
pub trait Transform: Send + Sync {
    async fn transform(&self, text: &str, instruction: &str) -> anyhow::Result<String>;
}

/// `(html, url, headers) -> analysis`. No core operation currently
/// consumes this; it exists so a caller can wire a page-type classifier in
/// without the crate needing to know its shape.
#[async_trait]
pub trait PageAnalyzer: Send + Sync {
    async fn analyze(&self, html: &str, url: &str, headers: &[(String, String)]) -> anyhow::Result<serde_json::Value>;
}
