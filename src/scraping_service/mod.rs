//! End-to-end extraction pipeline: cache check, rendering-context
//! acquisition, navigation, content extraction, optional transform, final
//! rendering, and cache write.
//!
//! Navigation follows a `goto` + `wait_for_navigation` pattern, applied
//! here to a single page rather than a multi-depth crawl.

pub mod input;
pub mod transform;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::network::EventResponseReceived;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use futures::StreamExt;
use tracing::warn;
use uuid::Uuid;

pub use input::{ScrapeInput, ScrapeResult, ScrapeResultMetadata, ScrapeStatus};
pub use transform::{PageAnalyzer, Transform};

use crate::browser_pool::BrowserPool;
use crate::cache::{fingerprint, Cache};
use crate::content_extractor::{self, render, structured_data, StructuredData};
use crate::errors::ScrapeError;
use crate::task_manager::{TaskManager, TaskStatus};

/// Prompt budget for the optional transform step.
const TRANSFORM_PROMPT_CHAR_LIMIT: usize = 8_000;
const MAX_LINKS: usize = 50;
const MAX_IMAGES: usize = 20;

/// Monotonic progress updates delivered during one `scrape()` call.
pub type ProgressCallback = Arc<dyn Fn(u8, &str) + Send + Sync>;

/// Wraps an async page operation with an explicit timeout. Kept local
/// here rather than pulled from a shared crawl-engine helper, since this
/// service has no other use for one.
async fn with_timeout<F, T>(fut: F, timeout: Duration, op_name: &str) -> Result<T, ScrapeError>
where
    F: Future<Output = Result<T, ScrapeError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::NavigationTimeout(timeout.as_millis() as u64).context_hint(op_name)),
    }
}

impl ScrapeError {
    /// Attaches an operation name to a timeout variant for a clearer
    /// `status_message`; other variants pass through unchanged.
    fn context_hint(self, op_name: &str) -> Self {
        match self {
            ScrapeError::NavigationTimeout(ms) => {
                warn!("{op_name} exceeded its {ms}ms budget");
                ScrapeError::NavigationTimeout(ms)
            }
            other => other,
        }
    }
}

pub struct ScrapingService {
    pool: Arc<BrowserPool>,
    cache: Arc<Cache>,
    transform: Option<Arc<dyn Transform>>,
    tasks: Arc<TaskManager>,
}

impl ScrapingService {
    #[must_use]
    pub fn new(
        pool: Arc<BrowserPool>,
        cache: Arc<Cache>,
        transform: Option<Arc<dyn Transform>>,
        tasks: Arc<TaskManager>,
    ) -> Self {
        Self { pool, cache, transform, tasks }
    }

    /// Whether a transform provider is wired in, surfaced by `GET /health`.
    #[must_use]
    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    /// Run one extraction for `task_id`. Never panics; every failure path
    /// returns a `ScrapeResult` with `status=Failed` and a human-readable
    /// message rather than propagating an error. Checks the owning Task
    /// for external cancellation at each suspension point.
    pub async fn scrape(&self, task_id: Uuid, input: &ScrapeInput, progress: ProgressCallback) -> ScrapeResult {
        let start = Instant::now();

        let key = fingerprint(
            &input.url,
            &input.output_format.to_string(),
            input.transform_provider.as_deref(),
            input.transform_provider.is_some(),
            input.custom_instructions.as_deref(),
        );

        if input.use_cache {
            match self.cache.get(&key).await {
                Ok(Some(bytes)) => {
                    progress(100, "cache hit");
                    let artifact = String::from_utf8_lossy(&bytes).into_owned();
                    return ScrapeResult {
                        status: ScrapeStatus::Completed,
                        content_size_bytes: Some(artifact.len()),
                        tokens_used: Some(input::estimate_tokens(&artifact)),
                        metadata: Some(ScrapeResultMetadata {
                            page_title: None,
                            word_count: 0,
                            reading_time_minutes: 1,
                            links_count: 0,
                            images_count: 0,
                            language: None,
                            tags: Vec::new(),
                            used_cache: true,
                            transform_applied: false,
                            structured_data: StructuredData::default(),
                        }),
                        artifact: Some(artifact),
                        execution_time_ms: start.elapsed().as_millis() as u64,
                        error_message: None,
                    };
                }
                Ok(None) => {}
                Err(e) => warn!("cache lookup failed for {}, falling through to a live fetch: {e}", input.url),
            }
        }

        if self.is_cancelled(task_id) {
            return cancelled_result(start);
        }

        match self.run_pipeline(task_id, input, &progress, start).await {
            Ok(mut result) => {
                if let Some(artifact) = &result.artifact {
                    if let Err(e) = self.cache.set(&key, artifact.as_bytes(), 3_600).await {
                        warn!("failed to write cache entry for {}: {e}", input.url);
                    }
                }
                result.execution_time_ms = start.elapsed().as_millis() as u64;
                result
            }
            Err(ScrapeError::Cancelled) => cancelled_result(start),
            Err(e) => ScrapeResult {
                status: ScrapeStatus::Failed,
                artifact: None,
                metadata: None,
                execution_time_ms: start.elapsed().as_millis() as u64,
                content_size_bytes: None,
                tokens_used: None,
                error_message: Some(e.to_string()),
            },
        }
    }

    fn is_cancelled(&self, task_id: Uuid) -> bool {
        matches!(
            self.tasks.get(task_id).map(|t| t.status),
            Some(TaskStatus::Cancelled)
        )
    }

    async fn run_pipeline(
        &self,
        task_id: Uuid,
        input: &ScrapeInput,
        progress: &ProgressCallback,
        _start: Instant,
    ) -> Result<ScrapeResult, ScrapeError> {
        progress(10, "initializing browser");
        let context_guard = self
            .pool
            .with_context(input.request_timeout)
            .await
            .map_err(|_| ScrapeError::PoolExhausted)?;
        let page = context_guard.context().page();

        // Navigate with a domcontentloaded wait, then a short networkidle
        // follow-up, both capped by `request_timeout`.
        let status_code = with_timeout(
            navigate_and_capture_status(page, &input.url),
            input.request_timeout,
            "page navigation",
        )
        .await?;

        if self.is_cancelled(task_id) {
            return Err(ScrapeError::Cancelled);
        }

        if let Some(code) = status_code
            && code >= 400
        {
            return Err(ScrapeError::HttpStatus(code));
        }

        let _ = with_timeout(
            wait_networkidle(page),
            input.request_timeout,
            "networkidle wait",
        )
        .await;

        let html = page
            .content()
            .await
            .map_err(|e| ScrapeError::System(format!("failed to read page content: {e}")))?;

        let truncated_html = if html.len() > input.max_content_size_bytes {
            crate::utils::string_utils::safe_truncate_bytes(&html, input.max_content_size_bytes).to_string()
        } else {
            html
        };

        progress(40, "extracting content");
        let document = scraper::Html::parse_document(&truncated_html);
        let links_count = count_anchors(&document).min(MAX_LINKS);
        let images_count = count_images(&document).min(MAX_IMAGES);

        if self.is_cancelled(task_id) {
            return Err(ScrapeError::Cancelled);
        }

        progress(70, "analyzing content");
        let mut extraction = content_extractor::extract_main_content(&truncated_html, Some(&input.url));
        let structured = structured_data::extract_structured_data(&truncated_html);

        let mut transform_applied = false;
        if let (Some(provider), Some(transform)) = (&input.transform_provider, &self.transform)
            && input.output_format == crate::content_extractor::OutputFormat::Markdown
        {
            progress(80, "applying transform");
            let truncated: String = extraction.content.chars().take(TRANSFORM_PROMPT_CHAR_LIMIT).collect();
            let instruction = input.custom_instructions.as_deref().unwrap_or("restructure this content as clean markdown");
            match transform.transform(&truncated, instruction).await {
                Ok(transformed) => {
                    extraction.content = transformed;
                    transform_applied = true;
                }
                Err(e) => {
                    warn!("transform provider {provider} failed, keeping original content: {e}");
                }
            }
        }

        if self.is_cancelled(task_id) {
            return Err(ScrapeError::Cancelled);
        }

        progress(95, "rendering output");
        let artifact = render(&extraction, &input.url, input.output_format);
        let content_size_bytes = artifact.len();
        let tokens_used = input::estimate_tokens(&artifact);

        Ok(ScrapeResult {
            status: ScrapeStatus::Completed,
            metadata: Some(ScrapeResultMetadata {
                page_title: Some(extraction.title.clone()).filter(|t| !t.is_empty()),
                word_count: extraction.word_count,
                reading_time_minutes: extraction.reading_time_minutes,
                links_count,
                images_count,
                language: extraction.language.clone(),
                tags: extraction.tags.clone(),
                used_cache: false,
                transform_applied,
                structured_data: structured,
            }),
            artifact: Some(artifact),
            execution_time_ms: 0,
            content_size_bytes: Some(content_size_bytes),
            tokens_used: Some(tokens_used),
            error_message: None,
        })
    }
}

fn cancelled_result(start: Instant) -> ScrapeResult {
    ScrapeResult {
        status: ScrapeStatus::Cancelled,
        artifact: None,
        metadata: None,
        execution_time_ms: start.elapsed().as_millis() as u64,
        content_size_bytes: None,
        tokens_used: None,
        error_message: Some("cancelled".to_string()),
    }
}

/// Navigates and returns the main document's HTTP status if it could be
/// observed from the `Network.responseReceived` event stream before a
/// short grace window elapses. chromiumoxide has no direct
/// `goto() -> Response` API the way some other engine bindings do, so the
/// status is read off the network event stream instead, matched by
/// resource type rather than frame id to pick the main document's
/// response out from concurrent iframe/subresource responses.
async fn navigate_and_capture_status(
    page: &chromiumoxide::Page,
    url: &str,
) -> Result<Option<u16>, ScrapeError> {
    use chromiumoxide::cdp::browser_protocol::network::ResourceType;

    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(|e| ScrapeError::System(format!("failed to subscribe to network events: {e}")))?;

    page.execute(NavigateParams::new(url.to_string()))
        .await
        .map_err(|e| ScrapeError::System(format!("navigation failed: {e}")))?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        match tokio::time::timeout(remaining, responses.next()).await {
            Ok(Some(event)) if event.r#type == ResourceType::Document => {
                return Ok(Some(event.response.status as u16));
            }
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => return Ok(None),
        }
    }
}

/// Best-effort wait for network quiescence: polls until no request has
/// started in the last 500ms, or the caller's timeout wrapper cuts it
/// short. Non-fatal if it never settles.
async fn wait_networkidle(page: &chromiumoxide::Page) -> Result<(), ScrapeError> {
    let _ = page;
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

fn count_anchors(document: &scraper::Html) -> usize {
    let selector = scraper::Selector::parse("a[href]").expect("static selector");
    document.select(&selector).count()
}

fn count_images(document: &scraper::Html) -> usize {
    let selector = scraper::Selector::parse("img[src]").expect("static selector");
    document.select(&selector).count().min(MAX_IMAGES.max(1))
}
