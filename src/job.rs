//! Conversion jobs: the trackable, cancellable unit of work, and the
//! concurrency-safe store that owns them.
//!
//! A [`ConversionJob`] is a plain state snapshot — every read through
//! [`JobStore::get`] returns a clone, so callers can never observe a job
//! mid-mutation and never hold the store's lock while inspecting one. All
//! mutation goes through [`JobStore::update`], which funnels each change
//! through a single closure under the lock and refreshes `updated_at` as a
//! side effect.
//!
//! Cancellation is cooperative: [`JobStore::cancel`] flips the job to
//! `Cancelled` immediately (so status reads reflect the request right away)
//! and sets the job's [`CancelToken`]; the running pipeline notices the token
//! at its next checkpoint and exits without overwriting the terminal state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::ConvertError;
use crate::pipeline::validate::ValidationResult;

/// Lifecycle state of a conversion job.
///
/// `Completed`, `Failed` and `Cancelled` are terminal for the pipeline; the
/// latter two can be re-entered into `Pending` via an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// One completed checkpoint in a job's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStep {
    pub name: String,
    /// Overall job progress (0–100) when the step was recorded.
    pub progress: u8,
    pub message: String,
}

/// Shared cancellation flag between a job's owner and its running pipeline.
///
/// Set-only; a fresh token is issued on retry so an old cancellation cannot
/// bleed into a new run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single document conversion, from submission to terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionJob {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    pub ocr_enabled: bool,
    pub state: JobState,
    /// 0–100; monotone within a run, reset only by retry.
    pub progress: u8,
    /// Human-readable description of what the job is doing right now.
    pub message: String,
    pub current_step: String,
    /// Checkpoint history across all runs, append-only.
    pub steps: Vec<JobStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Pipeline runs started for this job (1 on the first run).
    pub attempts: u32,
    /// Structural validation report for the generated EPUB, if any.
    pub validation: Option<ValidationResult>,
    /// The generated EPUB bytes; present only after a successful run.
    #[serde(skip)]
    pub result: Option<Arc<Vec<u8>>>,
    #[serde(skip)]
    pub cancel: CancelToken,
}

impl ConversionJob {
    fn new(id: String, filename: String, file_size: u64, ocr_enabled: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            filename,
            file_size,
            ocr_enabled,
            state: JobState::Pending,
            progress: 0,
            message: "Queued for conversion".to_string(),
            current_step: "queued".to_string(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
            error_message: None,
            attempts: 0,
            validation: None,
            result: None,
            cancel: CancelToken::default(),
        }
    }

    /// Record a checkpoint: appends to the step history and updates the
    /// live `current_step`/`progress`/`message` trio together.
    pub fn record_step(&mut self, name: &str, progress: u8, message: impl Into<String>) {
        let message = message.into();
        self.current_step = name.to_string();
        self.progress = progress;
        self.message = message.clone();
        self.steps.push(JobStep {
            name: name.to_string(),
            progress,
            message,
        });
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Concurrency-safe, in-memory job container.
///
/// Cheap to clone; all clones share the same underlying map. One async mutex
/// guards the map — job mutations are short, synchronous closures, so
/// contention stays negligible even with many concurrent conversions.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    inner: Arc<Mutex<HashMap<String, ConversionJob>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new pending job, returning its initial
    /// snapshot.
    pub async fn create(
        &self,
        id: impl Into<String>,
        filename: impl Into<String>,
        file_size: u64,
        ocr_enabled: bool,
    ) -> ConversionJob {
        let job = ConversionJob::new(id.into(), filename.into(), file_size, ocr_enabled);
        info!(job_id = %job.id, filename = %job.filename, "job created");
        let snapshot = job.clone();
        self.inner.lock().await.insert(job.id.clone(), job);
        snapshot
    }

    /// Snapshot a job by id.
    pub async fn get(&self, id: &str) -> Result<ConversionJob, ConvertError> {
        self.inner
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConvertError::JobNotFound { id: id.to_string() })
    }

    /// Apply a mutation under the lock, refreshing `updated_at`, and return
    /// the resulting snapshot.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<ConversionJob, ConvertError>
    where
        F: FnOnce(&mut ConversionJob),
    {
        let mut guard = self.inner.lock().await;
        let job = guard
            .get_mut(id)
            .ok_or_else(|| ConvertError::JobNotFound { id: id.to_string() })?;
        mutate(job);
        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Attach the generated EPUB bytes to a job.
    pub async fn set_result(&self, id: &str, bytes: Vec<u8>) -> Result<(), ConvertError> {
        self.update(id, |job| job.result = Some(Arc::new(bytes)))
            .await
            .map(|_| ())
    }

    /// Request cancellation: flip the job to `Cancelled` and set its token.
    ///
    /// Idempotent, and unconditional on the current state — a job cancelled
    /// after completion simply reads as cancelled; the pipeline never
    /// overwrites a terminal state.
    pub async fn cancel(&self, id: &str) -> Result<ConversionJob, ConvertError> {
        let snapshot = self
            .update(id, |job| {
                job.cancel.set();
                job.state = JobState::Cancelled;
                job.message = "Conversion cancelled".to_string();
            })
            .await?;
        info!(job_id = %id, "job cancellation requested");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_job_starts_pending_and_queued() {
        let store = JobStore::new();
        let job = store.create("j1", "doc.pdf", 1024, false).await;
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.current_step, "queued");
        assert_eq!(job.attempts, 0);
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn get_returns_a_snapshot() {
        let store = JobStore::new();
        store.create("j1", "doc.pdf", 10, false).await;
        let snap = store.get("j1").await.unwrap();
        store
            .update("j1", |j| j.state = JobState::Processing)
            .await
            .unwrap();
        // The earlier snapshot is unaffected by later mutation.
        assert_eq!(snap.state, JobState::Pending);
        assert_eq!(store.get("j1").await.unwrap().state, JobState::Processing);
    }

    #[tokio::test]
    async fn unknown_id_is_job_not_found() {
        let store = JobStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, ConvertError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn update_refreshes_updated_at() {
        let store = JobStore::new();
        let created = store.create("j1", "doc.pdf", 10, false).await;
        let updated = store.update("j1", |j| j.progress = 50).await.unwrap();
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(updated.progress, 50);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_sets_the_token() {
        let store = JobStore::new();
        let job = store.create("j1", "doc.pdf", 10, false).await;
        let token = job.cancel.clone();
        assert!(!token.is_set());

        let first = store.cancel("j1").await.unwrap();
        assert_eq!(first.state, JobState::Cancelled);
        assert!(token.is_set());

        let second = store.cancel("j1").await.unwrap();
        assert_eq!(second.state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn record_step_appends_history_and_updates_live_fields() {
        let store = JobStore::new();
        store.create("j1", "doc.pdf", 10, false).await;
        let job = store
            .update("j1", |j| j.record_step("analyze", 5, "Analyzing document"))
            .await
            .unwrap();
        assert_eq!(job.current_step, "analyze");
        assert_eq!(job.progress, 5);
        assert_eq!(job.steps.len(), 1);
        assert_eq!(job.steps[0].name, "analyze");
    }

    #[tokio::test]
    async fn result_bytes_are_shared_not_copied() {
        let store = JobStore::new();
        store.create("j1", "doc.pdf", 10, false).await;
        store.set_result("j1", vec![1, 2, 3]).await.unwrap();
        let a = store.get("j1").await.unwrap().result.unwrap();
        let b = store.get("j1").await.unwrap().result.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
