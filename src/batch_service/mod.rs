//! Fan-out of a URL list into N independent single-URL Tasks sharing one
//! batch-scoped concurrency semaphore.
//!
//! A batch record carries rollup counters and per-URL results/errors
//! maps, a `tokio::sync::Semaphore`-gated fan-out, a
//! `10s * len(urls) / parallel_limit` completion estimate, and a
//! `completed_with_errors` status rule for partial failure. Concurrency
//! bookkeeping follows the same non-reentrant-core/façade split
//! `task_manager` uses: a `parking_lot::Mutex`-guarded state struct per
//! batch, never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::warn;
use uuid::Uuid;

use crate::content_extractor::OutputFormat;
use crate::errors::BatchError;
use crate::scraping_service::{ScrapeInput, ScrapeStatus, ScrapingService};
use crate::task_manager::{TaskManager, TaskPatch};

/// Config snapshot shared by every URL in a batch.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub output_format: OutputFormat,
    pub transform_provider: Option<String>,
    pub transform_model: Option<String>,
    pub custom_instructions: Option<String>,
    pub parallel_limit: usize,
    pub delay_between_requests_ms: u64,
    pub use_cache: bool,
    pub request_timeout_secs: u64,
    pub max_content_size_bytes: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Markdown,
            transform_provider: None,
            transform_model: None,
            custom_instructions: None,
            parallel_limit: 3,
            delay_between_requests_ms: 0,
            use_cache: true,
            request_timeout_secs: 30,
            max_content_size_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
    Cancelled,
}

/// Snapshot returned by `BatchService::get` — a plain data projection of
/// the live, mutex-guarded state, kept as a separate type so callers
/// never see the internal state struct directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub batch_id: Uuid,
    pub name: Option<String>,
    pub total_urls: usize,
    pub status: BatchStatus,
    pub progress_percent: u8,
    pub completed: usize,
    pub failed: usize,
    pub running: usize,
    pub pending: usize,
    pub results: HashMap<String, String>,
    pub errors: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

struct BatchState {
    name: Option<String>,
    urls: Vec<String>,
    config: BatchConfig,
    status: BatchStatus,
    completed: usize,
    failed: usize,
    running: usize,
    results: HashMap<String, String>,
    errors: HashMap<String, String>,
    task_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    estimated_completion: Option<DateTime<Utc>>,
}

impl BatchState {
    fn pending(&self) -> usize {
        self.urls.len() - self.completed - self.failed - self.running
    }

    fn progress_percent(&self) -> u8 {
        if self.urls.is_empty() {
            return 100;
        }
        (((self.completed + self.failed) * 100) / self.urls.len()) as u8
    }

    fn snapshot(&self, batch_id: Uuid) -> BatchSnapshot {
        BatchSnapshot {
            batch_id,
            name: self.name.clone(),
            total_urls: self.urls.len(),
            status: self.status,
            progress_percent: self.progress_percent(),
            completed: self.completed,
            failed: self.failed,
            running: self.running,
            pending: self.pending(),
            results: self.results.clone(),
            errors: self.errors.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            estimated_completion: self.estimated_completion,
        }
    }
}

/// One batch's live state plus its cancellation flag, shared between the
/// registry entry and the spawned execution task.
struct BatchHandle {
    state: Mutex<BatchState>,
    cancelled: AtomicBool,
}

pub struct BatchService {
    batches: DashMap<Uuid, Arc<BatchHandle>>,
    scraping: Arc<ScrapingService>,
    tasks: Arc<TaskManager>,
}

impl BatchService {
    #[must_use]
    pub fn new(scraping: Arc<ScrapingService>, tasks: Arc<TaskManager>) -> Self {
        Self {
            batches: DashMap::new(),
            scraping,
            tasks,
        }
    }

    /// Create a `pending` batch record. Does not start execution; call
    /// [`Self::start`] to do that.
    pub fn create(&self, name: Option<String>, urls: Vec<String>, config: BatchConfig) -> Uuid {
        let batch_id = Uuid::new_v4();
        let now = Utc::now();
        let state = BatchState {
            name,
            urls,
            config,
            status: BatchStatus::Pending,
            completed: 0,
            failed: 0,
            running: 0,
            results: HashMap::new(),
            errors: HashMap::new(),
            task_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            estimated_completion: None,
        };
        self.batches.insert(
            batch_id,
            Arc::new(BatchHandle {
                state: Mutex::new(state),
                cancelled: AtomicBool::new(false),
            }),
        );
        batch_id
    }

    pub fn get(&self, batch_id: Uuid) -> Option<BatchSnapshot> {
        self.batches.get(&batch_id).map(|h| h.state.lock().snapshot(batch_id))
    }

    /// Transition to `running` and spawn one execution per URL gated by a
    /// semaphore initialized to `parallel_limit`.
    pub fn start(self: &Arc<Self>, batch_id: Uuid) -> Result<(), BatchError> {
        let handle = self
            .batches
            .get(&batch_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BatchError::NotFound(batch_id.to_string()))?;

        {
            let mut state = handle.state.lock();
            if state.status != BatchStatus::Pending {
                return Err(BatchError::AlreadyStarted(batch_id.to_string()));
            }
            let parallel_limit = state.config.parallel_limit.max(1);
            let estimate_secs = (state.urls.len() as u64 * 10) / parallel_limit as u64;
            state.status = BatchStatus::Running;
            state.updated_at = Utc::now();
            state.estimated_completion = Some(Utc::now() + chrono::Duration::seconds(estimate_secs as i64));
        }

        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_batch(batch_id, handle).await });
        Ok(())
    }

    async fn run_batch(self: Arc<Self>, batch_id: Uuid, handle: Arc<BatchHandle>) {
        let (urls, config) = {
            let state = handle.state.lock();
            (state.urls.clone(), state.config.clone())
        };

        let semaphore = Arc::new(Semaphore::new(config.parallel_limit.max(1)));
        let mut join_set = tokio::task::JoinSet::new();

        for url in urls {
            if handle.cancelled.load(Ordering::Relaxed) {
                break;
            }
            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore not closed");
            let scraping = Arc::clone(&self.scraping);
            let tasks = Arc::clone(&self.tasks);
            let handle = Arc::clone(&handle);
            let config = config.clone();
            let url = url.clone();

            join_set.spawn(async move {
                let _permit = permit;

                if handle.cancelled.load(Ordering::Relaxed) {
                    return;
                }

                if config.delay_between_requests_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(config.delay_between_requests_ms)).await;
                }

                let task_id = tasks.add(url.clone(), config.output_format.to_string());
                {
                    let mut state = handle.state.lock();
                    state.task_ids.push(task_id);
                    state.running += 1;
                    state.updated_at = Utc::now();
                }
                tasks.start(task_id);

                let input = ScrapeInput {
                    url: url.clone(),
                    output_format: config.output_format,
                    transform_provider: config.transform_provider.clone(),
                    transform_model: config.transform_model.clone(),
                    custom_instructions: config.custom_instructions.clone(),
                    use_cache: config.use_cache,
                    request_timeout: Duration::from_secs(config.request_timeout_secs),
                    max_content_size_bytes: config.max_content_size_bytes,
                };

                let tasks_for_progress = Arc::clone(&tasks);
                let progress_task_id = task_id;
                let progress = Arc::new(move |pct: u8, msg: &str| {
                    tasks_for_progress.update(
                        progress_task_id,
                        TaskPatch {
                            progress_percent: Some(pct),
                            status_message: Some(msg.to_string()),
                            ..Default::default()
                        },
                    );
                });

                let result = scraping.scrape(task_id, &input, progress).await;

                let mut state = handle.state.lock();
                state.running = state.running.saturating_sub(1);
                match result.status {
                    ScrapeStatus::Completed => {
                        tasks.complete(
                            task_id,
                            TaskPatch {
                                result_artifact: result.artifact.clone(),
                                execution_time_ms: Some(result.execution_time_ms),
                                content_size_bytes: result.content_size_bytes,
                                tokens_used: result.tokens_used,
                                ..Default::default()
                            },
                        );
                        if let Some(artifact) = result.artifact {
                            state.results.insert(url.clone(), artifact);
                        }
                        state.completed += 1;
                    }
                    ScrapeStatus::Cancelled => {
                        tasks.cancel(task_id);
                        state.errors.insert(url.clone(), "cancelled".to_string());
                        state.failed += 1;
                    }
                    ScrapeStatus::Failed => {
                        let message = result.error_message.unwrap_or_else(|| "unknown error".to_string());
                        tasks.fail(task_id, message.clone());
                        state.errors.insert(url.clone(), message);
                        state.failed += 1;
                    }
                }
                state.updated_at = Utc::now();
            });
        }

        while join_set.join_next().await.is_some() {}

        let mut state = handle.state.lock();
        state.status = if handle.cancelled.load(Ordering::Relaxed) {
            BatchStatus::Cancelled
        } else if state.failed > 0 {
            BatchStatus::CompletedWithErrors
        } else {
            BatchStatus::Completed
        };
        state.completed_at = Some(Utc::now());
        state.updated_at = Utc::now();
    }

    /// Mark `batch_id` cancelled and cancel every Task spawned under it.
    /// Outstanding per-URL futures observe the flag at their next
    /// suspension point and stop launching new work; in-flight scrapes
    /// are cancelled through the owning Task, the same cancellation path
    /// `ScrapingService::scrape` checks at each suspension point.
    pub fn cancel(&self, batch_id: Uuid) -> Result<(), BatchError> {
        let handle = self
            .batches
            .get(&batch_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| BatchError::NotFound(batch_id.to_string()))?;

        handle.cancelled.store(true, Ordering::Relaxed);
        let task_ids = {
            let mut state = handle.state.lock();
            state.status = BatchStatus::Cancelled;
            state.updated_at = Utc::now();
            state.task_ids.clone()
        };
        for id in task_ids {
            if !self.tasks.cancel(id) {
                warn!("batch {batch_id} cancel: task {id} was already terminal");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser_pool::{BrowserPool, BrowserPoolConfig};
    use crate::cache::Cache;

    fn service() -> Arc<BatchService> {
        let pool = BrowserPool::new(BrowserPoolConfig::default());
        let cache = Arc::new(Cache::new(10, 1_000_000, 1_024));
        let tasks = Arc::new(TaskManager::default());
        let scraping = Arc::new(ScrapingService::new(pool, cache, None, Arc::clone(&tasks)));
        Arc::new(BatchService::new(scraping, tasks))
    }

    #[test]
    fn create_starts_pending_with_full_rollup() {
        let svc = service();
        let urls = vec!["https://a".to_string(), "https://b".to_string()];
        let id = svc.create(Some("b1".to_string()), urls.clone(), BatchConfig::default());
        let snap = svc.get(id).expect("batch exists");
        assert_eq!(snap.status, BatchStatus::Pending);
        assert_eq!(snap.pending, urls.len());
        assert_eq!(snap.completed + snap.failed + snap.running + snap.pending, urls.len());
    }

    #[test]
    fn unknown_batch_returns_none() {
        let svc = service();
        assert!(svc.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn cancel_unknown_batch_errors() {
        let svc = service();
        assert!(matches!(svc.cancel(Uuid::new_v4()), Err(BatchError::NotFound(_))));
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let svc = service();
        let id = svc.create(None, vec!["https://a".to_string()], BatchConfig::default());
        svc.start(id).expect("first start succeeds");
        // Immediately mark running to avoid depending on the spawned
        // task's timing for this synchronous assertion.
        assert!(matches!(svc.start(id), Err(BatchError::AlreadyStarted(_))));
    }
}
