//! Process-wide registry of in-flight and completed tasks.
//!
//! An active map, a bounded FIFO completed history (default 1 000, oldest
//! evicted on overflow), and `cleanup_old_tasks`. A single lock guarding
//! both maps would let `complete()` call into `list_active()` for
//! diagnostics, but would also make every call site responsible for not
//! deadlocking on itself. Instead the inner core (`TaskManagerInner`)
//! never reenters its own lock — all its methods take `&mut self` and are
//! only ever called from the single `parking_lot::Mutex::lock()` site in
//! the outer façade (`TaskManager`).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_MAX_HISTORY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Status transitions form a DAG: `pending -> running -> {completed,
    /// failed, cancelled}`. Reverse/lateral transitions are rejected.
    fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub url: String,
    pub output_format: String,
    pub transform_provider: Option<String>,
    pub transform_model: Option<String>,
    pub custom_instructions: Option<String>,
    pub status: TaskStatus,
    pub progress_percent: u8,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_artifact: Option<String>,
    pub task_metadata: Option<serde_json::Value>,
    pub execution_time_ms: Option<u64>,
    pub content_size_bytes: Option<usize>,
    pub tokens_used: Option<usize>,
    pub error_message: Option<String>,
}

impl Task {
    fn new(id: Uuid, url: String, output_format: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            url,
            output_format,
            transform_provider: None,
            transform_model: None,
            custom_instructions: None,
            status: TaskStatus::Pending,
            progress_percent: 0,
            status_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result_artifact: None,
            task_metadata: None,
            execution_time_ms: None,
            content_size_bytes: None,
            tokens_used: None,
            error_message: None,
        }
    }
}

/// A merge-patch applied by `update()`. Every field is optional; only
/// present fields overwrite the existing task.
#[derive(Debug, Default, Clone)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress_percent: Option<u8>,
    pub status_message: Option<String>,
    pub result_artifact: Option<String>,
    pub task_metadata: Option<serde_json::Value>,
    pub execution_time_ms: Option<u64>,
    pub content_size_bytes: Option<usize>,
    pub tokens_used: Option<usize>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub active_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub success_count: usize,
    pub success_rate: f64,
}

/// Non-reentrant core: pure state transitions over the two maps. Never calls
/// back into its own public methods.
struct TaskManagerInner {
    active: HashMap<Uuid, Task>,
    completed: Vec<Task>,
    max_history: usize,
}

impl TaskManagerInner {
    fn new(max_history: usize) -> Self {
        Self {
            active: HashMap::new(),
            completed: Vec::new(),
            max_history,
        }
    }

    fn add(&mut self, url: String, output_format: String) -> Uuid {
        let id = Uuid::new_v4();
        self.active.insert(id, Task::new(id, url, output_format));
        id
    }

    fn update(&mut self, id: Uuid, patch: TaskPatch) -> bool {
        let Some(task) = self.active.get_mut(&id) else {
            return false;
        };
        if let Some(status) = patch.status
            && task.status.can_transition_to(status)
        {
            task.status = status;
        }
        if let Some(p) = patch.progress_percent {
            task.progress_percent = task.progress_percent.max(p);
        }
        if let Some(m) = patch.status_message {
            task.status_message = Some(m);
        }
        if let Some(r) = patch.result_artifact {
            task.result_artifact = Some(r);
        }
        if let Some(m) = patch.task_metadata {
            task.task_metadata = Some(m);
        }
        if let Some(e) = patch.execution_time_ms {
            task.execution_time_ms = Some(e);
        }
        if let Some(c) = patch.content_size_bytes {
            task.content_size_bytes = Some(c);
        }
        if let Some(t) = patch.tokens_used {
            task.tokens_used = Some(t);
        }
        if let Some(e) = patch.error_message {
            task.error_message = Some(e);
        }
        task.updated_at = Utc::now();
        true
    }

    fn get(&self, id: Uuid) -> Option<Task> {
        self.active
            .get(&id)
            .cloned()
            .or_else(|| self.completed.iter().find(|t| t.id == id).cloned())
    }

    fn finish(&mut self, id: Uuid, status: TaskStatus, patch: TaskPatch) -> bool {
        let Some(mut task) = self.active.remove(&id) else {
            return false;
        };
        if !task.status.can_transition_to(status) {
            // reinsert unchanged if the transition is illegal
            self.active.insert(id, task);
            return false;
        }
        task.status = status;
        let now = Utc::now();
        task.updated_at = now;
        task.completed_at = Some(now);
        if let Some(p) = patch.progress_percent {
            task.progress_percent = p;
        }
        if status == TaskStatus::Completed {
            task.progress_percent = 100;
        }
        task.status_message = patch.status_message.or(task.status_message);
        task.result_artifact = patch.result_artifact.or(task.result_artifact);
        task.task_metadata = patch.task_metadata.or(task.task_metadata);
        task.execution_time_ms = patch.execution_time_ms.or(task.execution_time_ms);
        task.content_size_bytes = patch.content_size_bytes.or(task.content_size_bytes);
        task.tokens_used = patch.tokens_used.or(task.tokens_used);
        task.error_message = patch.error_message.or(task.error_message);
        debug_assert!(task.status.is_terminal());

        self.completed.push(task);
        if self.completed.len() > self.max_history {
            self.completed.remove(0);
        }
        true
    }

    fn list_active(&self) -> Vec<Task> {
        self.active.values().cloned().collect()
    }

    fn list_completed(&self, limit: usize) -> Vec<Task> {
        self.completed
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    fn stats(&self) -> TaskStats {
        let active_count = self.active.len();
        let failed_count = self
            .completed
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .count();
        let completed_count = self
            .completed
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        let success_count = completed_count;
        let success_rate = if completed_count + failed_count > 0 {
            success_count as f64 / (completed_count + failed_count) as f64 * 100.0
        } else {
            0.0
        };
        TaskStats {
            active_count,
            completed_count,
            failed_count,
            success_count,
            success_rate,
        }
    }

    fn cleanup_old(&mut self, max_age_hours: i64) {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        self.completed.retain(|t| match t.completed_at {
            Some(c) => c >= cutoff,
            None => true,
        });
    }

    fn clear_all(&mut self) {
        self.active.clear();
        self.completed.clear();
    }
}

/// Public, concurrency-safe façade. A single `parking_lot::Mutex` guards the
/// inner core; every public method locks exactly once.
pub struct TaskManager {
    inner: Mutex<TaskManagerInner>,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl TaskManager {
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(TaskManagerInner::new(max_history)),
        }
    }

    pub fn add(&self, url: impl Into<String>, output_format: impl Into<String>) -> Uuid {
        self.inner.lock().add(url.into(), output_format.into())
    }

    pub fn update(&self, id: Uuid, patch: TaskPatch) -> bool {
        self.inner.lock().update(id, patch)
    }

    pub fn get(&self, id: Uuid) -> Option<Task> {
        self.inner.lock().get(id)
    }

    /// Transition the task to `running`, in place of a constructor-time state.
    pub fn start(&self, id: Uuid) -> bool {
        self.update(
            id,
            TaskPatch {
                status: Some(TaskStatus::Running),
                ..Default::default()
            },
        )
    }

    pub fn complete(&self, id: Uuid, patch: TaskPatch) -> bool {
        self.inner.lock().finish(id, TaskStatus::Completed, patch)
    }

    pub fn fail(&self, id: Uuid, error_message: impl Into<String>) -> bool {
        self.inner.lock().finish(
            id,
            TaskStatus::Failed,
            TaskPatch {
                error_message: Some(error_message.into()),
                ..Default::default()
            },
        )
    }

    pub fn cancel(&self, id: Uuid) -> bool {
        self.inner.lock().finish(
            id,
            TaskStatus::Cancelled,
            TaskPatch {
                error_message: Some("cancelled".to_string()),
                ..Default::default()
            },
        )
    }

    pub fn list_active(&self) -> Vec<Task> {
        self.inner.lock().list_active()
    }

    pub fn list_completed(&self, limit: usize) -> Vec<Task> {
        self.inner.lock().list_completed(limit)
    }

    /// Combined list, newest first, for `GET /tasks`.
    pub fn list_all(&self, limit: usize) -> Vec<Task> {
        let inner = self.inner.lock();
        let mut all: Vec<Task> = inner.list_active();
        all.extend(inner.list_completed(limit));
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }

    pub fn stats(&self) -> TaskStats {
        self.inner.lock().stats()
    }

    pub fn cleanup_old_tasks(&self, max_age_hours: i64) {
        self.inner.lock().cleanup_old(max_age_hours);
    }

    pub fn clear_all(&self) {
        self.inner.lock().clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_complete_moves_task_to_history() {
        let tm = TaskManager::default();
        let id = tm.add("https://example.com", "markdown");
        assert!(tm.start(id));
        assert!(tm.complete(
            id,
            TaskPatch {
                result_artifact: Some("# hi".to_string()),
                ..Default::default()
            }
        ));
        assert!(tm.get(id).is_some());
        assert!(tm.list_active().is_empty());
        let completed = tm.list_completed(10);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status, TaskStatus::Completed);
        assert_eq!(completed[0].progress_percent, 100);
    }

    #[test]
    fn completed_history_is_bounded_fifo() {
        let tm = TaskManager::new(2);
        for i in 0..3 {
            let id = tm.add(format!("https://example.com/{i}"), "text");
            tm.start(id);
            tm.complete(id, TaskPatch::default());
        }
        let completed = tm.list_completed(10);
        assert_eq!(completed.len(), 2);
    }

    #[test]
    fn update_on_unknown_id_is_noop() {
        let tm = TaskManager::default();
        let unknown = Uuid::new_v4();
        assert!(!tm.update(unknown, TaskPatch::default()));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let tm = TaskManager::default();
        let id = tm.add("https://example.com", "json");
        tm.start(id);
        tm.complete(id, TaskPatch::default());
        // Already terminal; a second fail() must not succeed.
        assert!(!tm.fail(id, "late failure"));
    }

    #[test]
    fn stats_computes_success_rate() {
        let tm = TaskManager::default();
        let ok = tm.add("https://example.com/1", "text");
        tm.start(ok);
        tm.complete(ok, TaskPatch::default());
        let bad = tm.add("https://example.com/2", "text");
        tm.start(bad);
        tm.fail(bad, "boom");
        let stats = tm.stats();
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.failed_count, 1);
        assert!((stats.success_rate - 50.0).abs() < 1e-9);
    }
}
