//! Route handlers. Deliberately thin: each handler validates/extracts,
//! delegates to a core module, and projects the result into the shared
//! envelope — keeping internal structs with strict fields separate from
//! the API-facing projection.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch_service::{BatchConfig, BatchSnapshot};
use crate::errors::{GateError, ScrapeError};
use crate::scraping_service::ScrapeInput;
use crate::task_manager::{Task, TaskPatch, TaskStatus};

use super::envelope::{ok, ApiError, Envelope};
use super::state::AppState;
use super::validation::{parse_output_format, validate_target, validate_url_shape};

type JsonEnvelope<T> = axum::Json<Envelope<T>>;

// ---------------------------------------------------------------- health --

#[derive(Serialize)]
pub struct HealthStatus {
    pub api: &'static str,
    pub transform_provider: &'static str,
    pub database: &'static str,
    pub ml_pipeline: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> JsonEnvelope<HealthStatus> {
    let transform_provider = if state.scraping.has_transform() { "configured" } else { "not_configured" };
    ok(HealthStatus {
        api: "ok",
        transform_provider,
        database: "not_applicable",
        ml_pipeline: "not_configured",
    })
}

// ----------------------------------------------------------------- stats --

#[derive(Serialize)]
pub struct RollupStats {
    #[serde(flatten)]
    pub tasks: crate::task_manager::TaskStats,
    pub pool: crate::browser_pool::BrowserPoolStats,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> JsonEnvelope<RollupStats> {
    let pool = state.pool.stats().snapshot().await;
    ok(RollupStats { tasks: state.tasks.stats(), pool })
}

pub async fn stats_browser(State(state): State<Arc<AppState>>) -> JsonEnvelope<crate::browser_pool::BrowserPoolStats> {
    ok(state.pool.stats().snapshot().await)
}

pub async fn stats_cache(State(state): State<Arc<AppState>>) -> JsonEnvelope<crate::cache::CacheStats> {
    ok(state.cache.stats())
}

#[derive(Serialize)]
pub struct MemoryStats {
    pub rss_mb: f64,
    pub percent: f64,
}

pub async fn stats_memory() -> JsonEnvelope<MemoryStats> {
    // Process memory isn't portably queryable from stable std, and isn't
    // worth shelling out to a platform-specific API for; reports zero.
    ok(MemoryStats { rss_mb: 0.0, percent: 0.0 })
}

// ---------------------------------------------------------------- scrape --

#[derive(Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
    pub output_format: String,
    pub transform_provider: Option<String>,
    pub transform_model: Option<String>,
    pub custom_instructions: Option<String>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct CreatedTask {
    pub task_id: Uuid,
    pub status: &'static str,
}

pub async fn create_scrape(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<ScrapeRequest>,
) -> Result<(StatusCode, JsonEnvelope<CreatedTask>), ApiError> {
    let debug_mode = state.config.debug_mode();
    validate_url_shape(&body.url).map_err(|e| to_api_error(e, debug_mode))?;
    validate_target(&body.url).await.map_err(|e| to_api_error(e, debug_mode))?;
    let output_format = parse_output_format(&body.output_format).map_err(|e| to_api_error(e, debug_mode))?;

    let task_id = state.tasks.add(body.url.clone(), output_format.to_string());
    state.tasks.start(task_id);

    let input = ScrapeInput {
        url: body.url,
        output_format,
        transform_provider: body.transform_provider,
        transform_model: body.transform_model,
        custom_instructions: body.custom_instructions,
        use_cache: body.use_cache,
        request_timeout: state.config.request_timeout(),
        max_content_size_bytes: state.config.max_content_size_bytes(),
    };

    let scraping = Arc::clone(&state.scraping);
    let tasks = Arc::clone(&state.tasks);
    tokio::spawn(async move {
        let progress_task_id = task_id;
        let progress_tasks = Arc::clone(&tasks);
        let progress = Arc::new(move |pct: u8, msg: &str| {
            progress_tasks.update(
                progress_task_id,
                TaskPatch {
                    progress_percent: Some(pct),
                    status_message: Some(msg.to_string()),
                    ..Default::default()
                },
            );
        });

        let result = scraping.scrape(task_id, &input, progress).await;
        match result.status {
            crate::scraping_service::ScrapeStatus::Completed => {
                tasks.complete(
                    task_id,
                    TaskPatch {
                        result_artifact: result.artifact,
                        execution_time_ms: Some(result.execution_time_ms),
                        content_size_bytes: result.content_size_bytes,
                        tokens_used: result.tokens_used,
                        task_metadata: result.metadata.and_then(|m| serde_json::to_value(m).ok()),
                        ..Default::default()
                    },
                );
            }
            crate::scraping_service::ScrapeStatus::Cancelled => {
                tasks.cancel(task_id);
            }
            crate::scraping_service::ScrapeStatus::Failed => {
                tasks.fail(task_id, result.error_message.unwrap_or_else(|| "unknown error".to_string()));
            }
        }
    });

    Ok((StatusCode::ACCEPTED, ok(CreatedTask { task_id, status: "pending" })))
}

pub async fn get_scrape(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<JsonEnvelope<Task>, ApiError> {
    let mut task = state
        .tasks
        .get(id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown task: {id}")))?;
    if task.status != TaskStatus::Completed {
        task.result_artifact = None;
    }
    Ok(ok(task))
}

#[derive(Serialize)]
pub struct ScrapeResultResponse {
    pub task_id: Uuid,
    pub result: String,
    pub metadata: Option<serde_json::Value>,
}

pub async fn get_scrape_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<JsonEnvelope<ScrapeResultResponse>, ApiError> {
    let task = state
        .tasks
        .get(id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown task: {id}")))?;
    if task.status != TaskStatus::Completed {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "task is not completed"));
    }
    let result = task
        .result_artifact
        .ok_or_else(|| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "completed task missing its artifact"))?;
    Ok(ok(ScrapeResultResponse { task_id: id, result, metadata: task.task_metadata }))
}

pub async fn cancel_scrape(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<JsonEnvelope<()>, ApiError> {
    let task = state
        .tasks
        .get(id)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown task: {id}")))?;
    if task.status != TaskStatus::Pending && task.status != TaskStatus::Running {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "task is already terminal"));
    }
    state.tasks.cancel(id);
    Ok(ok(()))
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

pub async fn list_tasks(State(state): State<Arc<AppState>>, Query(query): Query<ListQuery>) -> JsonEnvelope<Vec<Task>> {
    ok(state.tasks.list_all(query.limit))
}

// ----------------------------------------------------------------- batch --

#[derive(Deserialize)]
pub struct CreateBatchRequest {
    pub name: Option<String>,
    pub urls: Vec<String>,
    pub output_format: String,
    pub transform_provider: Option<String>,
    pub transform_model: Option<String>,
    pub custom_instructions: Option<String>,
    #[serde(default = "default_parallel_limit")]
    pub parallel_limit: usize,
    #[serde(default)]
    pub delay_between_requests_ms: u64,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_parallel_limit() -> usize {
    3
}

#[derive(Serialize)]
pub struct CreatedBatch {
    pub batch_id: Uuid,
    pub status: &'static str,
    pub total_urls: usize,
}

pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<CreateBatchRequest>,
) -> Result<(StatusCode, JsonEnvelope<CreatedBatch>), ApiError> {
    let debug_mode = state.config.debug_mode();
    if body.urls.is_empty() {
        return Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, "urls must not be empty"));
    }
    for url in &body.urls {
        validate_url_shape(url).map_err(|e| to_api_error(e, debug_mode))?;
    }
    let output_format = parse_output_format(&body.output_format).map_err(|e| to_api_error(e, debug_mode))?;

    let config = BatchConfig {
        output_format,
        transform_provider: body.transform_provider,
        transform_model: body.transform_model,
        custom_instructions: body.custom_instructions,
        parallel_limit: body.parallel_limit.max(1),
        delay_between_requests_ms: body.delay_between_requests_ms,
        use_cache: body.use_cache,
        request_timeout_secs: state.config.request_timeout().as_secs(),
        max_content_size_bytes: state.config.max_content_size_bytes(),
    };

    let total_urls = body.urls.len();
    let batch_id = state.batches.create(body.name, body.urls, config);
    state.batches.start(batch_id).map_err(|e| to_api_error_gate(e.into(), debug_mode))?;

    Ok((StatusCode::ACCEPTED, ok(CreatedBatch { batch_id, status: "running", total_urls })))
}

pub async fn get_batch(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<JsonEnvelope<BatchSnapshot>, ApiError> {
    state
        .batches
        .get(id)
        .map(ok)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("unknown batch: {id}")))
}

pub async fn cancel_batch(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Result<JsonEnvelope<()>, ApiError> {
    let debug_mode = state.config.debug_mode();
    state
        .batches
        .cancel(id)
        .map(|()| ok(()))
        .map_err(|e| to_api_error_gate(e.into(), debug_mode))
}

// ----------------------------------------------------------------- cache --

#[derive(Serialize)]
pub struct ClearedCache {
    pub cleared_entries: usize,
    pub freed_bytes: usize,
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Result<JsonEnvelope<ClearedCache>, ApiError> {
    let debug_mode = state.config.debug_mode();
    let (cleared_entries, freed_bytes) = state.cache.clear_all().await.map_err(|e| to_api_error_gate(e.into(), debug_mode))?;
    Ok(ok(ClearedCache { cleared_entries, freed_bytes }))
}

pub async fn delete_cache_key(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Result<JsonEnvelope<()>, ApiError> {
    let debug_mode = state.config.debug_mode();
    state.cache.delete(&key).await.map_err(|e| to_api_error_gate(e.into(), debug_mode))?;
    Ok(ok(()))
}

// ----------------------------------------------------------- maintenance --

#[derive(Serialize)]
pub struct MaintenanceResult {
    pub action: &'static str,
    pub detail: String,
}

pub async fn maintenance_gc(State(state): State<Arc<AppState>>) -> JsonEnvelope<MaintenanceResult> {
    state.tasks.cleanup_old_tasks(24);
    let removed = state.rate_limiter.cleanup_inactive();
    ok(MaintenanceResult { action: "gc", detail: format!("removed {removed} inactive rate-limit client records") })
}

pub async fn maintenance_optimize(State(state): State<Arc<AppState>>) -> Result<JsonEnvelope<MaintenanceResult>, ApiError> {
    let debug_mode = state.config.debug_mode();
    let (cleared, freed) = state.cache.clear_all().await.map_err(|e| to_api_error_gate(e.into(), debug_mode))?;
    Ok(ok(MaintenanceResult {
        action: "optimize",
        detail: format!("evicted {cleared} cache entries, freed {freed} bytes"),
    }))
}

pub async fn maintenance_cleanup(State(state): State<Arc<AppState>>) -> JsonEnvelope<MaintenanceResult> {
    state.tasks.cleanup_old_tasks(24);
    ok(MaintenanceResult { action: "cleanup", detail: "swept completed-task history".to_string() })
}

fn to_api_error(err: ScrapeError, debug_mode: bool) -> ApiError {
    ApiError::from_gate_error(err.into(), debug_mode)
}

fn to_api_error_gate(err: GateError, debug_mode: bool) -> ApiError {
    ApiError::from_gate_error(err, debug_mode)
}
