//! # pdf2epub
//!
//! Convert PDF documents to EPUB e-books as trackable, cancellable,
//! retryable jobs.
//!
//! ## Why this crate?
//!
//! Naive PDF-to-EPUB converters treat every document the same way and fail
//! in opposite directions: born-digital PDFs come out fine but scanned books
//! become empty shells, while OCR-everything pipelines waste minutes and
//! money re-reading text the PDF already carries. This crate first
//! *classifies* each document (text-based, scanned, or mixed) with cheap
//! page-level heuristics and picks the extraction strategy accordingly —
//! then validates the produced EPUB against the container specification so a
//! broken book is caught here, not on the reader's device.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Analyze   classify pages: text-based / scanned / mixed
//!  ├─ 2. Extract   pull text, chunk-by-chunk on large documents
//!  ├─ 3. Enrich    OCR/LLM markdown for scanned docs (opt-in)
//!  ├─ 4. Generate  build chapters, delegate EPUB serialization
//!  ├─ 5. Validate  structural EPUB 2/3 compliance check
//!  └─ 6. Complete  result bytes + validation report on the job
//! ```
//!
//! Every step is a checkpoint: it updates the job's progress and step
//! history, and observes cooperative cancellation before proceeding.
//! Collaborator failures are retried with linear backoff; each retry
//! restarts the pipeline from analysis.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pdf2epub::{JobSpec, OrchestratorConfig, PipelineOrchestrator};
//! # use pdf2epub::{Chapter, CollaboratorError, EpubByteEncoder, PdfPageExtractor, PageDescriptor, PageImage};
//! # struct MyExtractor; struct MyEncoder;
//! # #[async_trait::async_trait]
//! # impl PdfPageExtractor for MyExtractor {
//! #     async fn describe(&self, _: &[u8]) -> Result<Vec<PageDescriptor>, CollaboratorError> { Ok(vec![]) }
//! #     async fn extract_text(&self, _: &[u8], _: Option<&[u32]>) -> Result<Vec<(u32, String)>, CollaboratorError> { Ok(vec![]) }
//! #     async fn extract_images(&self, _: &[u8]) -> Result<Vec<PageImage>, CollaboratorError> { Ok(vec![]) }
//! # }
//! # #[async_trait::async_trait]
//! # impl EpubByteEncoder for MyEncoder {
//! #     async fn encode(&self, _: &str, _: &str, _: &[Chapter], _: Option<&str>) -> Result<Vec<u8>, CollaboratorError> { Ok(vec![]) }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = PipelineOrchestrator::new(
//!         Arc::new(MyExtractor),
//!         Arc::new(MyEncoder),
//!         OrchestratorConfig::default(),
//!     );
//!
//!     let job = orchestrator.start(JobSpec {
//!         id: "job-1".into(),
//!         filename: "book.pdf".into(),
//!         file_size: 1024,
//!         ocr_enabled: false,
//!         pdf: std::fs::read("book.pdf")?,
//!     }).await;
//!
//!     // Poll until terminal, then fetch the result.
//!     let status = orchestrator.status(&job.id).await?;
//!     println!("{:?} at {}%", status.state, status.progress);
//!     Ok(())
//! }
//! ```
//!
//! ## Collaborators
//!
//! The core owns the classification, job machinery and validation; the
//! byte-level heavy lifting is injected:
//!
//! | Trait | Responsibility |
//! |-------|----------------|
//! | [`PdfPageExtractor`] | page descriptors, text, images from PDF bytes |
//! | [`EpubByteEncoder`] | chapters → EPUB package bytes |
//! | [`ContentEnrichmentAgent`] | OCR/LLM markdown for scanned documents |
//! | [`JobTransport`] | where runs execute (in-process by default) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod collaborators;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use collaborators::{
    Chapter, ContentEnrichmentAgent, EpubByteEncoder, PageDescriptor, PageImage, PdfPageExtractor,
};
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use error::{CollaboratorError, ConvertError};
pub use job::{CancelToken, ConversionJob, JobState, JobStep, JobStore};
pub use orchestrator::{JobSpec, PipelineOrchestrator};
pub use pipeline::classify::{classify, DocumentAnalysis, DocumentType, PageAnalysis};
pub use pipeline::validate::{validate_epub, IssueLevel, ValidationIssue, ValidationResult};
pub use transport::{JobTransport, LocalTransport, TaskHandle, TaskStatus, TransportJobSpec};
