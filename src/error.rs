//! Error types for the pdf2epub library.
//!
//! One fatal error type, [`ConvertError`], covers the whole crate, but its
//! variants fall into two camps with different pipeline consequences:
//!
//! * **Never retried** — bad input (`EmptyDocument`), unknown job ids, and
//!   precondition failures on `download`/`retry`. Retrying cannot help, so
//!   they surface to the caller immediately.
//!
//! * **Retried with backoff** — collaborator failures during a run
//!   (`Extraction`, `Enrichment`, `Encoding`). These are usually transient
//!   (network blip, overloaded worker), so the orchestrator re-runs the
//!   pipeline from the first step up to its configured retry budget.
//!
//! [`ConvertError::is_retryable`] is the single source of truth for that
//! split; the orchestrator never matches on variants directly.
//!
//! Two things are deliberately *not* errors: a non-valid EPUB validation
//! report (recorded on the job, which still completes) and a cancellation
//! observed at a checkpoint (the run exits silently).

use thiserror::Error;

use crate::job::JobState;

/// All fatal errors returned by the pdf2epub library.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The document has no pages at all; classification cannot proceed and
    /// retrying would classify the same empty input again.
    #[error("Document has no pages; nothing to classify or convert")]
    EmptyDocument,

    /// The page extractor collaborator failed during a run.
    #[error("Text/image extraction failed: {detail}")]
    Extraction { detail: String },

    /// The content enrichment collaborator failed during a run.
    #[error("Content enrichment failed: {detail}")]
    Enrichment { detail: String },

    /// The EPUB byte encoder collaborator failed during a run.
    #[error("EPUB encoding failed: {detail}")]
    Encoding { detail: String },

    /// No job with the given id exists in the store.
    #[error("Conversion job '{id}' not found")]
    JobNotFound { id: String },

    /// `download` was called before the job completed or produced bytes.
    #[error("Result for job '{id}' is not ready; the job has not completed")]
    ResultNotReady { id: String },

    /// `retry` was called on a job that is not in a retryable state.
    #[error("Job '{id}' cannot be retried from state {state:?}; only failed or cancelled jobs may be retried")]
    RetryNotAllowed { id: String, state: JobState },

    /// `retry` was called but the original PDF bytes are no longer cached.
    #[error("Input for job '{id}' is no longer available; submit the document again")]
    InputUnavailable { id: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A transport-layer failure (malformed wire payload, enqueue refusal).
    #[error("Transport error: {detail}")]
    Transport { detail: String },
}

impl ConvertError {
    /// Whether the automatic retry/backoff policy applies to this error.
    ///
    /// Only collaborator failures during a run are retryable; input errors
    /// and caller-side precondition failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConvertError::Extraction { .. }
                | ConvertError::Enrichment { .. }
                | ConvertError::Encoding { .. }
        )
    }
}

/// A failure reported by an external collaborator (extractor, encoder,
/// enrichment agent).
///
/// Collaborators live outside the core and may wrap arbitrary backends, so
/// the contract is a plain detail string; call sites in the orchestrator map
/// it onto the matching retryable [`ConvertError`] variant.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}
