//! The pipeline orchestrator: drives each submitted document through the
//! checkpointed conversion pipeline as a trackable, cancellable, retryable
//! job.
//!
//! ## Run model
//!
//! [`PipelineOrchestrator::start`] creates a `Pending` job and spawns one
//! independent run on the runtime, returning immediately; callers observe
//! everything else through [`status`](PipelineOrchestrator::status). A run is
//! a straight-line sequence of checkpoints (`analyze` → `extract` →
//! `enrich`? → `generate` → `validate` → `complete`), each of which updates
//! the job's progress and step history before doing its work.
//!
//! ## Cancellation
//!
//! Cooperative only. [`cancel`](PipelineOrchestrator::cancel) marks the job
//! `Cancelled` and sets its token; the run checks the token before every
//! checkpoint (and between extraction chunks) and exits silently when it is
//! set — the terminal state was already written by `cancel`, so the run never
//! overwrites it. A collaborator call already in flight cannot be
//! interrupted.
//!
//! ## Retry
//!
//! A failed collaborator call is retried with linear backoff
//! (`backoff_base * attempts`, capped) up to `max_retries` runs; each retry
//! restarts from `analyze` — the pipeline never resumes mid-way. Input errors
//! are never retried. Exhausted retries leave the job `Failed` with the last
//! error message; a caller may then invoke an explicit
//! [`retry`](PipelineOrchestrator::retry), which resets the attempt counter
//! and re-runs from the cached input bytes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::collaborators::{ContentEnrichmentAgent, EpubByteEncoder, PdfPageExtractor};
use crate::config::OrchestratorConfig;
use crate::error::ConvertError;
use crate::job::{CancelToken, ConversionJob, JobState, JobStore};
use crate::pipeline::assemble::assemble;
use crate::pipeline::classify::{classify, DocumentType};
use crate::pipeline::generate::build_chapters;
use crate::pipeline::validate::validate_epub;

// ── Checkpoint progress values ───────────────────────────────────────────

const PROGRESS_ANALYZE: u8 = 5;
const PROGRESS_EXTRACT: u8 = 20;
const PROGRESS_ENRICH: u8 = 55;
const PROGRESS_GENERATE: u8 = 80;
const PROGRESS_VALIDATE: u8 = 95;
const PROGRESS_COMPLETE: u8 = 100;

/// Extraction owns the progress band from 20 up to this bound; chunked
/// extraction reports incremental progress inside it.
const PROGRESS_EXTRACT_END: u8 = 50;

/// A document submission: everything the orchestrator needs to run one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    /// Enables the enrichment step for scanned documents.
    pub ocr_enabled: bool,
    pub pdf: Vec<u8>,
}

/// How a single run ended when it did not fail.
enum RunOutcome {
    Completed,
    Cancelled,
}

/// Drives conversion jobs through the pipeline. Cheap to clone; clones share
/// the job store and the input cache.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    store: JobStore,
    extractor: Arc<dyn PdfPageExtractor>,
    encoder: Arc<dyn EpubByteEncoder>,
    enricher: Option<Arc<dyn ContentEnrichmentAgent>>,
    config: OrchestratorConfig,
    /// Original PDF bytes per job, kept so an explicit retry can re-run
    /// without re-submission. Entries are dropped once a job completes.
    inputs: Arc<Mutex<HashMap<String, Arc<Vec<u8>>>>>,
}

impl PipelineOrchestrator {
    pub fn new(
        extractor: Arc<dyn PdfPageExtractor>,
        encoder: Arc<dyn EpubByteEncoder>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store: JobStore::new(),
            extractor,
            encoder,
            enricher: None,
            config,
            inputs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attach the OCR/LLM enrichment agent used for scanned documents.
    pub fn with_enrichment_agent(mut self, agent: Arc<dyn ContentEnrichmentAgent>) -> Self {
        self.enricher = Some(agent);
        self
    }

    /// The job store backing this orchestrator.
    pub fn store(&self) -> &JobStore {
        &self.store
    }

    // ── Public API ───────────────────────────────────────────────────────

    /// Create a pending job for `spec`, launch its run on the runtime, and
    /// return the initial snapshot immediately.
    pub async fn start(&self, spec: JobSpec) -> ConversionJob {
        let job = self
            .store
            .create(&spec.id, &spec.filename, spec.file_size, spec.ocr_enabled)
            .await;

        let pdf = Arc::new(spec.pdf);
        self.inputs.lock().await.insert(spec.id.clone(), pdf.clone());

        let this = self.clone();
        let id = spec.id;
        let ocr = spec.ocr_enabled;
        tokio::spawn(async move {
            this.run_with_retry(&id, &pdf, ocr).await;
        });

        job
    }

    /// Snapshot a job's current state.
    pub async fn status(&self, id: &str) -> Result<ConversionJob, ConvertError> {
        self.store.get(id).await
    }

    /// Request cooperative cancellation.
    pub async fn cancel(&self, id: &str) -> Result<ConversionJob, ConvertError> {
        self.store.cancel(id).await
    }

    /// Fetch the generated EPUB bytes of a completed job.
    pub async fn download(&self, id: &str) -> Result<Arc<Vec<u8>>, ConvertError> {
        let job = self.store.get(id).await?;
        if job.state != JobState::Completed {
            return Err(ConvertError::ResultNotReady { id: id.to_string() });
        }
        job.result
            .ok_or_else(|| ConvertError::ResultNotReady { id: id.to_string() })
    }

    /// Re-run a failed or cancelled job from its cached input bytes.
    ///
    /// Resets progress, attempts, error state and the cancellation token,
    /// then launches a fresh run. Completed and pending/processing jobs are
    /// rejected with [`ConvertError::RetryNotAllowed`].
    pub async fn retry(&self, id: &str) -> Result<ConversionJob, ConvertError> {
        let job = self.store.get(id).await?;
        match job.state {
            JobState::Failed | JobState::Cancelled => {}
            state => {
                return Err(ConvertError::RetryNotAllowed {
                    id: id.to_string(),
                    state,
                })
            }
        }

        let pdf = self
            .inputs
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ConvertError::InputUnavailable { id: id.to_string() })?;

        let snapshot = self
            .store
            .update(id, |j| {
                j.state = JobState::Pending;
                j.progress = 0;
                j.current_step = "queued".to_string();
                j.message = "Queued for retry".to_string();
                j.attempts = 0;
                j.error_message = None;
                j.validation = None;
                j.result = None;
                j.cancel = CancelToken::default();
            })
            .await?;

        info!(job_id = %id, "job retry requested");

        let this = self.clone();
        let id = id.to_string();
        let ocr = job.ocr_enabled;
        tokio::spawn(async move {
            this.run_with_retry(&id, &pdf, ocr).await;
        });

        Ok(snapshot)
    }

    // ── Run loop ─────────────────────────────────────────────────────────

    fn backoff_delay(&self, attempts: u32) -> Duration {
        std::cmp::min(self.config.backoff_base * attempts, self.config.backoff_cap)
    }

    /// Execute runs for one job until it reaches a terminal state: retries
    /// retryable failures with backoff, fails the job otherwise.
    async fn run_with_retry(&self, id: &str, pdf: &[u8], ocr_enabled: bool) {
        loop {
            // Guard every state write on the token: a cancellation that
            // landed a moment ago must stay the observable terminal state.
            let job = match self
                .store
                .update(id, |j| {
                    if j.cancel.is_set() {
                        return;
                    }
                    j.attempts += 1;
                    j.state = JobState::Processing;
                })
                .await
            {
                Ok(job) => job,
                // The job vanished from the store; nothing left to drive.
                Err(_) => return,
            };

            let cancel = job.cancel.clone();
            if cancel.is_set() {
                return;
            }

            info!(job_id = %id, attempt = job.attempts, "pipeline run starting");

            match self.run_once(id, pdf, ocr_enabled, &cancel).await {
                Ok(RunOutcome::Completed) => {
                    info!(job_id = %id, "pipeline run completed");
                    return;
                }
                Ok(RunOutcome::Cancelled) => {
                    info!(job_id = %id, "pipeline run observed cancellation");
                    return;
                }
                Err(err) => {
                    let retryable = err.is_retryable() && job.attempts < self.config.max_retries;
                    if !retryable {
                        warn!(job_id = %id, error = %err, "pipeline run failed terminally");
                        let _ = self
                            .store
                            .update(id, |j| {
                                if j.cancel.is_set() {
                                    return;
                                }
                                j.state = JobState::Failed;
                                j.error_message = Some(err.to_string());
                                j.message = format!("Conversion failed: {err}");
                            })
                            .await;
                        return;
                    }

                    let delay = self.backoff_delay(job.attempts);
                    warn!(
                        job_id = %id,
                        error = %err,
                        attempt = job.attempts,
                        delay_secs = delay.as_secs(),
                        "pipeline run failed; retrying after backoff"
                    );
                    let _ = self
                        .store
                        .update(id, |j| {
                            if j.cancel.is_set() {
                                return;
                            }
                            let progress = j.progress;
                            j.state = JobState::Pending;
                            j.error_message = Some(err.to_string());
                            j.record_step(
                                "retry_wait",
                                progress,
                                format!("Retrying in {}s after: {err}", delay.as_secs()),
                            );
                        })
                        .await;

                    tokio::time::sleep(delay).await;
                    if cancel.is_set() {
                        return;
                    }
                }
            }
        }
    }

    /// One straight-line pass through the pipeline checkpoints.
    async fn run_once(
        &self,
        id: &str,
        pdf: &[u8],
        ocr_enabled: bool,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, ConvertError> {
        // analyze
        if cancel.is_set() {
            return Ok(RunOutcome::Cancelled);
        }
        self.store
            .update(id, |j| {
                j.record_step("analyze", PROGRESS_ANALYZE, "Analyzing document content")
            })
            .await?;
        let descriptors = self
            .extractor
            .describe(pdf)
            .await
            .map_err(|e| ConvertError::Extraction { detail: e.to_string() })?;
        let analysis = classify(&descriptors)?;
        info!(
            job_id = %id,
            document_type = ?analysis.document_type,
            pages = analysis.total_pages,
            confidence = analysis.overall_confidence,
            "document analyzed"
        );

        // extract
        if cancel.is_set() {
            return Ok(RunOutcome::Cancelled);
        }
        self.store
            .update(id, |j| {
                j.record_step("extract", PROGRESS_EXTRACT, "Extracting text content")
            })
            .await?;
        let extracted = if analysis.document_type == DocumentType::Scanned {
            // Scanned pages yield garbage text; enrichment is the only
            // useful source of content for them.
            String::new()
        } else {
            match self.extract_text(id, pdf, &descriptors, cancel).await? {
                Some(text) => text,
                None => return Ok(RunOutcome::Cancelled),
            }
        };

        // enrich (conditional)
        let mut enriched: Option<String> = None;
        if analysis.document_type == DocumentType::Scanned && ocr_enabled {
            if cancel.is_set() {
                return Ok(RunOutcome::Cancelled);
            }
            match &self.enricher {
                Some(agent) => {
                    self.store
                        .update(id, |j| {
                            j.record_step(
                                "enrich",
                                PROGRESS_ENRICH,
                                "Enriching scanned content via OCR",
                            )
                        })
                        .await?;
                    let images = self
                        .extractor
                        .extract_images(pdf)
                        .await
                        .map_err(|e| ConvertError::Extraction { detail: e.to_string() })?;
                    let markdown = agent
                        .enrich(&images, None)
                        .await
                        .map_err(|e| ConvertError::Enrichment { detail: e.to_string() })?;
                    enriched = Some(markdown);
                }
                None => {
                    warn!(job_id = %id, "OCR requested but no enrichment agent configured; skipping");
                }
            }
        }

        // generate
        if cancel.is_set() {
            return Ok(RunOutcome::Cancelled);
        }
        self.store
            .update(id, |j| {
                j.record_step("generate", PROGRESS_GENERATE, "Generating EPUB")
            })
            .await?;
        let chapters = build_chapters(enriched.as_deref(), &extracted);
        let epub = self
            .encoder
            .encode(
                &self.config.book_title,
                &self.config.book_author,
                &chapters,
                Some(id),
            )
            .await
            .map_err(|e| ConvertError::Encoding { detail: e.to_string() })?;

        // validate — a non-valid report never fails the job; best-effort
        // delivery of a possibly-imperfect EPUB beats no output.
        if cancel.is_set() {
            return Ok(RunOutcome::Cancelled);
        }
        self.store
            .update(id, |j| {
                j.record_step("validate", PROGRESS_VALIDATE, "Validating EPUB structure")
            })
            .await?;
        let report = validate_epub(&epub);
        if !report.valid {
            warn!(
                job_id = %id,
                errors = report.errors.len(),
                "generated EPUB failed structural validation"
            );
        }

        // complete
        if cancel.is_set() {
            return Ok(RunOutcome::Cancelled);
        }
        self.store.set_result(id, epub).await?;
        let mut completed = false;
        self.store
            .update(id, |j| {
                if j.cancel.is_set() {
                    return;
                }
                j.state = JobState::Completed;
                j.error_message = None;
                j.validation = Some(report.clone());
                j.record_step("complete", PROGRESS_COMPLETE, "Conversion complete");
                completed = true;
            })
            .await?;
        if !completed {
            // A cancel slipped in ahead of the completion write; keep the
            // cached input so the cancelled job stays retryable.
            return Ok(RunOutcome::Cancelled);
        }
        self.inputs.lock().await.remove(id);

        Ok(RunOutcome::Completed)
    }

    /// Extract the document's text, chunk by chunk when it is large.
    ///
    /// Returns `Ok(None)` when cancellation was observed between chunks.
    async fn extract_text(
        &self,
        id: &str,
        pdf: &[u8],
        descriptors: &[crate::collaborators::PageDescriptor],
        cancel: &CancelToken,
    ) -> Result<Option<String>, ConvertError> {
        let page_texts: Vec<(u32, String)> = descriptors
            .iter()
            .map(|d| (d.page_number, d.text.clone()))
            .collect();
        let chunks = assemble(&page_texts, self.config.chunk_max_chars);

        if chunks.len() <= 1 {
            let pages = self
                .extractor
                .extract_text(pdf, None)
                .await
                .map_err(|e| ConvertError::Extraction { detail: e.to_string() })?;
            return Ok(Some(join_pages(&pages)));
        }

        let total = chunks.len();
        let mut parts: Vec<(u32, String)> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if cancel.is_set() {
                return Ok(None);
            }
            let pages = self
                .extractor
                .extract_text(pdf, Some(&chunk.pages))
                .await
                .map_err(|e| ConvertError::Extraction { detail: e.to_string() })?;
            parts.extend(pages);

            let span = (PROGRESS_EXTRACT_END - PROGRESS_EXTRACT) as usize;
            let progress = PROGRESS_EXTRACT + (span * (i + 1) / total) as u8;
            let done = i + 1;
            self.store
                .update(id, |j| {
                    j.record_step(
                        "extract",
                        progress,
                        format!("Extracted chunk {done}/{total}"),
                    )
                })
                .await?;
        }

        Ok(Some(join_pages(&parts)))
    }
}

fn join_pages(pages: &[(u32, String)]) -> String {
    pages
        .iter()
        .map(|(_, text)| text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::collaborators::{Chapter, PageDescriptor, PageImage};
    use crate::error::CollaboratorError;

    struct StubExtractor;

    #[async_trait]
    impl PdfPageExtractor for StubExtractor {
        async fn describe(&self, _pdf: &[u8]) -> Result<Vec<PageDescriptor>, CollaboratorError> {
            Ok(vec![PageDescriptor {
                page_number: 1,
                text: "x".repeat(5_100),
                image_count: 0,
                width: 595.0,
                height: 842.0,
            }])
        }

        async fn extract_text(
            &self,
            _pdf: &[u8],
            _pages: Option<&[u32]>,
        ) -> Result<Vec<(u32, String)>, CollaboratorError> {
            Ok(vec![(1, "hello".to_string())])
        }

        async fn extract_images(&self, _pdf: &[u8]) -> Result<Vec<PageImage>, CollaboratorError> {
            Ok(Vec::new())
        }
    }

    struct StubEncoder;

    #[async_trait]
    impl EpubByteEncoder for StubEncoder {
        async fn encode(
            &self,
            _title: &str,
            _author: &str,
            _chapters: &[Chapter],
            _uid: Option<&str>,
        ) -> Result<Vec<u8>, CollaboratorError> {
            Ok(vec![0u8; 4])
        }
    }

    fn orchestrator() -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            Arc::new(StubExtractor),
            Arc::new(StubEncoder),
            OrchestratorConfig::default(),
        )
    }

    #[test]
    fn backoff_is_linear_and_capped() {
        let orch = orchestrator();
        assert_eq!(orch.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(orch.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(orch.backoff_delay(100), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn download_before_completion_is_not_ready() {
        let orch = orchestrator();
        orch.store().create("j1", "doc.pdf", 10, false).await;
        let err = orch.download("j1").await.unwrap_err();
        assert!(matches!(err, ConvertError::ResultNotReady { .. }));
    }

    #[tokio::test]
    async fn retry_is_rejected_for_pending_and_completed_jobs() {
        let orch = orchestrator();
        orch.store().create("j1", "doc.pdf", 10, false).await;
        let err = orch.retry("j1").await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::RetryNotAllowed {
                state: JobState::Pending,
                ..
            }
        ));

        orch.store()
            .update("j1", |j| j.state = JobState::Completed)
            .await
            .unwrap();
        let err = orch.retry("j1").await.unwrap_err();
        assert!(matches!(
            err,
            ConvertError::RetryNotAllowed {
                state: JobState::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn retry_without_cached_input_is_input_unavailable() {
        let orch = orchestrator();
        orch.store().create("j1", "doc.pdf", 10, false).await;
        orch.store()
            .update("j1", |j| j.state = JobState::Failed)
            .await
            .unwrap();
        let err = orch.retry("j1").await.unwrap_err();
        assert!(matches!(err, ConvertError::InputUnavailable { .. }));
    }
}
