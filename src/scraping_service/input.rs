//! Request/response types for one `scrape()` invocation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::content_extractor::{OutputFormat, StructuredData};

#[derive(Debug, Clone)]
pub struct ScrapeInput {
    pub url: String,
    pub output_format: OutputFormat,
    pub transform_provider: Option<String>,
    pub transform_model: Option<String>,
    pub custom_instructions: Option<String>,
    pub use_cache: bool,
    pub request_timeout: Duration,
    pub max_content_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResultMetadata {
    pub page_title: Option<String>,
    pub word_count: usize,
    pub reading_time_minutes: u32,
    pub links_count: usize,
    pub images_count: usize,
    pub language: Option<String>,
    pub tags: Vec<String>,
    pub used_cache: bool,
    pub transform_applied: bool,
    pub structured_data: StructuredData,
}

#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub status: ScrapeStatus,
    pub artifact: Option<String>,
    pub metadata: Option<ScrapeResultMetadata>,
    pub execution_time_ms: u64,
    pub content_size_bytes: Option<usize>,
    pub tokens_used: Option<usize>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Rough token estimate (`len(artifact) / 4`), good enough for reporting
/// without pulling in a real tokenizer.
#[must_use]
pub fn estimate_tokens(artifact: &str) -> usize {
    artifact.len().div_ceil(4)
}
