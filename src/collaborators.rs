//! External collaborator contracts.
//!
//! The core deliberately owns no byte-level PDF parsing, no EPUB zip/XML
//! serialisation and no OCR/LLM behaviour — those are production services
//! with their own deployment lifecycles. What the core owns is the *shape*
//! of each collaboration, expressed as an async trait object injected into
//! the orchestrator at construction time. Tests swap in mocks; production
//! wires real backends; the pipeline code is identical either way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// Raw per-page description of a PDF, as produced by the extraction engine.
///
/// This is the classifier's only input: the core never opens the PDF itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDescriptor {
    /// 1-indexed page number.
    pub page_number: u32,
    /// Raw text as extracted from the page (may be empty for scans).
    pub text: String,
    /// Number of distinct images embedded in the page.
    pub image_count: u32,
    /// Page width in points.
    pub width: f64,
    /// Page height in points.
    pub height: f64,
}

/// An image extracted from a PDF page, handed to the enrichment agent.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed page the image came from.
    pub page_number: u32,
    /// Encoded image bytes in whatever format the extractor produced.
    pub data: Vec<u8>,
    /// Format hint, e.g. "png" or "jpeg".
    pub format: String,
}

/// One chapter of the book handed to the EPUB encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// XHTML body content (inner HTML of `<body>`).
    pub html: String,
    /// File name inside the EPUB package, e.g. "chapter1.xhtml".
    pub filename: String,
}

/// Turns raw PDF bytes into per-page text and images.
///
/// `extract_text` takes an optional page filter so the orchestrator can pull
/// one chunk's worth of pages at a time on large documents instead of holding
/// the whole document's text in memory. Returned pairs are `(page_number,
/// text)` in ascending page order.
#[async_trait]
pub trait PdfPageExtractor: Send + Sync {
    async fn describe(&self, pdf: &[u8]) -> Result<Vec<PageDescriptor>, CollaboratorError>;

    async fn extract_text(
        &self,
        pdf: &[u8],
        pages: Option<&[u32]>,
    ) -> Result<Vec<(u32, String)>, CollaboratorError>;

    async fn extract_images(&self, pdf: &[u8]) -> Result<Vec<PageImage>, CollaboratorError>;
}

/// Serialises chapters into a complete EPUB package.
///
/// The produced bytes must satisfy [`crate::pipeline::validate::validate_epub`];
/// the orchestrator runs that check on every output and records the report on
/// the job.
#[async_trait]
pub trait EpubByteEncoder: Send + Sync {
    async fn encode(
        &self,
        title: &str,
        author: &str,
        chapters: &[Chapter],
        uid: Option<&str>,
    ) -> Result<Vec<u8>, CollaboratorError>;
}

/// OCR/LLM content enrichment for scanned documents.
///
/// Invoked only when the document classified as scanned *and* the caller
/// enabled OCR for the job. Returns markdown synthesised from the page
/// images.
#[async_trait]
pub trait ContentEnrichmentAgent: Send + Sync {
    async fn enrich(
        &self,
        images: &[PageImage],
        context: Option<&str>,
    ) -> Result<String, CollaboratorError>;
}
