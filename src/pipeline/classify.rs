//! Content classification: decide whether a PDF is born-digital text, scanned
//! imagery, or a mix of both.
//!
//! ## Why classify at all?
//!
//! The two extraction strategies are wildly different in cost and quality.
//! Born-digital text comes out of the extraction engine essentially for free;
//! scanned pages produce empty or garbage text and need the image/OCR path.
//! Picking the wrong strategy either burns OCR budget on text the PDF already
//! carries, or ships an EPUB full of blank chapters. The classifier looks at
//! cheap page-level signals (text length, image count, page geometry) and
//! never touches the PDF bytes itself — it works purely on the
//! [`PageDescriptor`]s the extraction engine hands over.
//!
//! ## The double-threshold decision
//!
//! A document is only called `TextBased` or `Scanned` when ≥ 80 % of its
//! pages agree; everything in between is `Mixed`. This is intentionally *not*
//! a 50/50 split: a 60 % text document still has 40 % of pages that would be
//! silently dropped by pure text extraction, so it must flow through the
//! mixed-handling path downstream.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collaborators::PageDescriptor;
use crate::error::ConvertError;

// ── Heuristic thresholds ─────────────────────────────────────────────────
//
// Values and comparison operators are part of the classifier contract; the
// test suite depends on them exactly as written.

/// A page with text density below this is treated as scanned.
pub const TEXT_DENSITY_THRESHOLD: f64 = 0.1;

/// Fraction of pages that must agree before the document gets a dominant
/// type; below this on both sides the document is `Mixed`.
pub const DOMINANT_RATIO: f64 = 0.8;

/// A page with images needs at least this many characters per image to count
/// as text; fewer and the images dominate.
pub const TEXT_VS_IMAGE_FACTOR: usize = 100;

/// Minimum characters-per-image ratio for a page with images to be
/// considered text-based.
pub const TEXT_PER_IMAGE_MIN: usize = 50;

/// Pages under this confidence drag down the document-level confidence.
const LOW_CONFIDENCE_FLOOR: f64 = 0.6;

/// Maximum document-level confidence penalty when every page is low
/// confidence.
const LOW_CONFIDENCE_PENALTY: f64 = 0.2;

// ── Types ────────────────────────────────────────────────────────────────

/// Document-level content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// ≥ 80 % of pages carry extractable text.
    TextBased,
    /// ≥ 80 % of pages are scans; text extraction is pointless.
    Scanned,
    /// Neither side dominates; downstream must handle both kinds of page.
    Mixed,
}

/// Per-page classification outcome. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageAnalysis {
    /// 1-indexed page number.
    pub page_number: u32,
    pub has_text: bool,
    /// Extracted text; cleared when the page is deemed scanned so scan
    /// garbage never leaks into the generated book.
    pub text_content: String,
    pub image_count: u32,
    pub is_scanned: bool,
    /// Heuristic certainty in \[0, 1\], rounded to 2 decimals.
    pub confidence_score: f64,
}

/// Whole-document classification outcome. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub document_type: DocumentType,
    pub total_pages: u32,
    /// Per-page analyses in page order.
    pub pages: Vec<PageAnalysis>,
    /// Mean page confidence, penalised by the fraction of low-confidence
    /// pages. In \[0, 1\], rounded to 2 decimals.
    pub overall_confidence: f64,
    /// Fraction of scanned pages; meaningful only when
    /// `document_type == Mixed`.
    pub mixed_ratio: f64,
}

impl DocumentAnalysis {
    /// Page numbers that carry usable text.
    pub fn text_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| p.has_text && !p.is_scanned)
            .map(|p| p.page_number)
            .collect()
    }

    /// Page numbers classified as scans.
    pub fn scanned_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| p.is_scanned)
            .map(|p| p.page_number)
            .collect()
    }

    /// All text-page content merged with page markers, in page order.
    pub fn text_content(&self) -> String {
        self.pages
            .iter()
            .filter(|p| p.has_text && !p.is_scanned)
            .map(|p| format!("=== Page {} ===\n{}", p.page_number, p.text_content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

// ── Classification ───────────────────────────────────────────────────────

/// Classify a document from its per-page descriptors.
///
/// # Errors
/// Only an entirely empty page list is fatal
/// ([`ConvertError::EmptyDocument`]). A single malformed page never aborts
/// the document: it is defensively reported as scanned with confidence 0.5
/// and zero images.
pub fn classify(pages: &[PageDescriptor]) -> Result<DocumentAnalysis, ConvertError> {
    if pages.is_empty() {
        return Err(ConvertError::EmptyDocument);
    }

    let analyses: Vec<PageAnalysis> = pages.iter().map(analyze_page).collect();

    let total = analyses.len();
    let scanned_count = analyses.iter().filter(|p| p.is_scanned).count();
    let text_count = total - scanned_count;

    let text_ratio = text_count as f64 / total as f64;
    let scanned_ratio = scanned_count as f64 / total as f64;

    let (document_type, mixed_ratio) = if text_ratio >= DOMINANT_RATIO {
        (DocumentType::TextBased, 0.0)
    } else if scanned_ratio >= DOMINANT_RATIO {
        (DocumentType::Scanned, 0.0)
    } else {
        (DocumentType::Mixed, scanned_ratio)
    };

    let overall_confidence = overall_confidence(&analyses);

    debug!(
        ?document_type,
        total_pages = total,
        scanned = scanned_count,
        confidence = overall_confidence,
        "document classified"
    );

    Ok(DocumentAnalysis {
        document_type,
        total_pages: total as u32,
        pages: analyses,
        overall_confidence,
        mixed_ratio,
    })
}

/// Analyse one page. Never fails: unanalysable geometry falls back to a
/// defensive scanned verdict so one bad page cannot sink the document.
fn analyze_page(page: &PageDescriptor) -> PageAnalysis {
    if !page.width.is_finite() || !page.height.is_finite() {
        warn!(
            page = page.page_number,
            "page geometry is unusable; reporting as scanned"
        );
        return PageAnalysis {
            page_number: page.page_number,
            has_text: false,
            text_content: String::new(),
            image_count: 0,
            is_scanned: true,
            confidence_score: 0.5,
        };
    }

    let text_len = page.text.chars().count();
    let has_text = !page.text.trim().is_empty();
    let density = text_density(page, text_len);
    let is_scanned = is_scanned_page(has_text, density, page.image_count, text_len);
    let confidence = page_confidence(density, page.image_count, is_scanned);

    PageAnalysis {
        page_number: page.page_number,
        has_text,
        text_content: if is_scanned {
            String::new()
        } else {
            page.text.clone()
        },
        image_count: page.image_count,
        is_scanned,
        confidence_score: confidence,
    }
}

/// `min(text_len * 100 / page_area, 1.0)`; degenerate page area yields
/// density 0, not an error.
fn text_density(page: &PageDescriptor, text_len: usize) -> f64 {
    let area = page.width * page.height;
    if area <= 0.0 {
        return 0.0;
    }
    ((text_len * 100) as f64 / area).min(1.0)
}

fn is_scanned_page(has_text: bool, density: f64, image_count: u32, text_len: usize) -> bool {
    if !has_text || density < TEXT_DENSITY_THRESHOLD {
        return true;
    }
    let images = image_count as usize;
    if images > 0 && text_len < images * TEXT_VS_IMAGE_FACTOR {
        return true;
    }
    // Image-only page that still reports "has text".
    if has_text && text_len == 0 && images > 0 {
        return true;
    }
    if images > 0 && text_len / images.max(1) < TEXT_PER_IMAGE_MIN {
        return true;
    }
    false
}

/// Per-page confidence: starts at 0.5; scanned pages are pushed toward 0.9
/// by image count and density, text pages toward 0.95 by density alone.
fn page_confidence(density: f64, image_count: u32, is_scanned: bool) -> f64 {
    let mut confidence: f64 = 0.5;

    if is_scanned {
        if image_count > 0 {
            confidence = (confidence + image_count as f64 * 0.1).min(0.9);
        }
        if density > 0.0 {
            confidence = (confidence + density * 0.5).min(0.9);
        }
    } else {
        confidence = (confidence + density * 0.8).min(0.95);
    }

    round2(confidence)
}

fn overall_confidence(pages: &[PageAnalysis]) -> f64 {
    if pages.is_empty() {
        return 0.0;
    }

    let mean: f64 =
        pages.iter().map(|p| p.confidence_score).sum::<f64>() / pages.len() as f64;

    let low = pages
        .iter()
        .filter(|p| p.confidence_score < LOW_CONFIDENCE_FLOOR)
        .count();

    let penalised = if low > 0 {
        let penalty = low as f64 / pages.len() as f64 * LOW_CONFIDENCE_PENALTY;
        (mean - penalty).max(0.0)
    } else {
        mean
    };

    round2(penalised)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_page(n: u32, chars: usize) -> PageDescriptor {
        PageDescriptor {
            page_number: n,
            text: "x".repeat(chars),
            image_count: 0,
            width: 595.0,
            height: 842.0,
        }
    }

    fn scanned_page(n: u32) -> PageDescriptor {
        PageDescriptor {
            page_number: n,
            text: String::new(),
            image_count: 1,
            width: 595.0,
            height: 842.0,
        }
    }

    #[test]
    fn empty_document_is_fatal() {
        let err = classify(&[]).unwrap_err();
        assert!(matches!(err, ConvertError::EmptyDocument));
    }

    #[test]
    fn dense_text_page_is_text_based() {
        // 595 × 842 area ≈ 501k; 5 100 chars × 100 ≈ density 1.0.
        let analysis = classify(&[text_page(1, 5_100)]).unwrap();
        assert_eq!(analysis.document_type, DocumentType::TextBased);
        assert_eq!(analysis.total_pages, 1);
        assert!(!analysis.pages[0].is_scanned);
        assert!(analysis.pages[0].has_text);
    }

    #[test]
    fn empty_pages_are_scanned() {
        let analysis = classify(&[scanned_page(1), scanned_page(2)]).unwrap();
        assert_eq!(analysis.document_type, DocumentType::Scanned);
        assert!(analysis.pages.iter().all(|p| p.is_scanned));
    }

    #[test]
    fn eighty_percent_text_is_text_based() {
        let pages = vec![
            text_page(1, 5_100),
            text_page(2, 5_100),
            text_page(3, 5_100),
            text_page(4, 5_100),
            scanned_page(5),
        ];
        let analysis = classify(&pages).unwrap();
        assert_eq!(analysis.document_type, DocumentType::TextBased);
        assert_eq!(analysis.mixed_ratio, 0.0);
    }

    #[test]
    fn eighty_percent_scanned_is_scanned() {
        let pages = vec![
            scanned_page(1),
            scanned_page(2),
            scanned_page(3),
            scanned_page(4),
            text_page(5, 5_100),
        ];
        let analysis = classify(&pages).unwrap();
        assert_eq!(analysis.document_type, DocumentType::Scanned);
    }

    #[test]
    fn in_between_is_mixed_with_scanned_ratio() {
        let pages = vec![
            text_page(1, 5_100),
            text_page(2, 5_100),
            scanned_page(3),
            scanned_page(4),
        ];
        let analysis = classify(&pages).unwrap();
        assert_eq!(analysis.document_type, DocumentType::Mixed);
        assert!((analysis.mixed_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn overall_confidence_is_bounded() {
        let pages = vec![text_page(1, 5_100), scanned_page(2), text_page(3, 200)];
        let analysis = classify(&pages).unwrap();
        assert!(analysis.overall_confidence >= 0.0);
        assert!(analysis.overall_confidence <= 1.0);
    }

    #[test]
    fn low_confidence_pages_penalise_the_document() {
        // One sparse text page: density well under 0.1 → scanned, no
        // images, density > 0 nudges confidence but stays under 0.6.
        let sparse = PageDescriptor {
            page_number: 1,
            text: "a few words".into(),
            image_count: 0,
            width: 595.0,
            height: 842.0,
        };
        let low = classify(std::slice::from_ref(&sparse)).unwrap();
        let dense = classify(&[text_page(1, 5_100)]).unwrap();
        assert!(low.overall_confidence < dense.overall_confidence);
    }

    #[test]
    fn image_heavy_page_with_thin_text_is_scanned() {
        // Enough text to clear the density bar, but 10 images at only
        // 60 chars per image — images dominate.
        let page = PageDescriptor {
            page_number: 1,
            text: "x".repeat(600),
            image_count: 10,
            width: 100.0,
            height: 100.0,
        };
        let analysis = classify(&[page]).unwrap();
        assert!(analysis.pages[0].is_scanned);
    }

    #[test]
    fn scanned_page_text_is_cleared() {
        let page = PageDescriptor {
            page_number: 1,
            text: "scan artefacts".into(),
            image_count: 3,
            width: 595.0,
            height: 842.0,
        };
        let analysis = classify(&[page]).unwrap();
        assert!(analysis.pages[0].is_scanned);
        assert!(analysis.pages[0].text_content.is_empty());
    }

    #[test]
    fn degenerate_geometry_is_not_an_error() {
        let page = PageDescriptor {
            page_number: 1,
            text: "text on a zero-area page".into(),
            image_count: 0,
            width: 0.0,
            height: 0.0,
        };
        // Density 0 → scanned, but classification succeeds.
        let analysis = classify(&[page]).unwrap();
        assert!(analysis.pages[0].is_scanned);
    }

    #[test]
    fn nan_geometry_falls_back_to_defensive_verdict() {
        let page = PageDescriptor {
            page_number: 7,
            text: "whatever".into(),
            image_count: 4,
            width: f64::NAN,
            height: 842.0,
        };
        let analysis = classify(&[page]).unwrap();
        let p = &analysis.pages[0];
        assert!(p.is_scanned);
        assert_eq!(p.image_count, 0);
        assert!((p.confidence_score - 0.5).abs() < f64::EPSILON);
        assert_eq!(p.page_number, 7);
    }

    #[test]
    fn confidence_is_rounded_to_two_decimals() {
        let analysis = classify(&[text_page(1, 800)]).unwrap();
        let c = analysis.pages[0].confidence_score;
        assert!((c * 100.0 - (c * 100.0).round()).abs() < 1e-9);
    }

    #[test]
    fn text_helpers_report_page_numbers() {
        let pages = vec![
            text_page(1, 5_100),
            scanned_page(2),
            text_page(3, 5_100),
            scanned_page(4),
        ];
        let analysis = classify(&pages).unwrap();
        assert_eq!(analysis.text_pages(), vec![1, 3]);
        assert_eq!(analysis.scanned_pages(), vec![2, 4]);
        let merged = analysis.text_content();
        assert!(merged.contains("=== Page 1 ==="));
        assert!(merged.contains("=== Page 3 ==="));
        assert!(!merged.contains("=== Page 2 ==="));
    }
}
