//! Structural EPUB validation.
//!
//! A from-scratch compliance checker for the EPUB 2/3 *container* format: the
//! zip layout, the `mimetype` contract, `META-INF/container.xml`, the OPF
//! package document, and the version-specific navigation requirements. It
//! checks structure only — no XHTML content validation, no schema checking.
//!
//! ## Why validate at all?
//!
//! The EPUB encoder is an external collaborator; a bug there (or a truncated
//! upload downstream) produces a file most reading systems reject with an
//! unhelpful generic error. Running the validator on every generated book
//! turns "it doesn't open on my reader" into a precise issue list attached to
//! the job.
//!
//! ## Reporting model
//!
//! Every finding is a [`ValidationIssue`] with a stable `code` callers can
//! match on. Findings are split into `errors` (the book violates the
//! container spec) and `warnings` (tolerated by readers but worth surfacing,
//! e.g. an EPUB 2 book with no declared NCX). `valid` is simply "no errors".
//! The validator keeps going after most findings so one broken item does not
//! hide the rest; only a handful of checks are terminal because nothing
//! meaningful can be validated past them (unreadable zip, no container.xml,
//! no resolvable root file).

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zip::{CompressionMethod, ZipArchive};

/// Exact bytes required as the `mimetype` entry's content.
const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueLevel {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: IssueLevel,
    /// Stable machine-readable identifier, e.g. `MIMETYPE_STORED`.
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
    /// Archive path the finding refers to, when one applies.
    pub path: Option<String>,
}

/// Outcome of validating one EPUB buffer. Produced fresh per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True iff `errors` is empty. Warnings never affect validity.
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    /// Facts discovered along the way, e.g. `opf_path` and `version`.
    pub metadata: BTreeMap<String, String>,
}

/// Internal accumulator; finalised into a [`ValidationResult`].
#[derive(Default)]
struct Report {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    metadata: BTreeMap<String, String>,
}

impl Report {
    fn error(&mut self, code: &str, message: impl Into<String>, path: Option<&str>) {
        self.errors.push(ValidationIssue {
            level: IssueLevel::Error,
            code: code.to_string(),
            message: message.into(),
            path: path.map(str::to_string),
        });
    }

    fn warning(&mut self, code: &str, message: impl Into<String>, path: Option<&str>) {
        self.warnings.push(ValidationIssue {
            level: IssueLevel::Warning,
            code: code.to_string(),
            message: message.into(),
            path: path.map(str::to_string),
        });
    }

    fn finish(self) -> ValidationResult {
        let valid = self.errors.is_empty();
        debug!(
            valid,
            errors = self.errors.len(),
            warnings = self.warnings.len(),
            "epub validation finished"
        );
        ValidationResult {
            valid,
            errors: self.errors,
            warnings: self.warnings,
            metadata: self.metadata,
        }
    }
}

/// A manifest `<item>` as parsed from the OPF.
#[derive(Debug)]
struct ManifestItem {
    id: Option<String>,
    href: Option<String>,
    properties: Option<String>,
}

/// Parsed skeleton of the package document.
#[derive(Debug, Default)]
struct PackageDoc {
    version: Option<String>,
    has_manifest: bool,
    has_spine: bool,
    spine_toc: Option<String>,
    items: Vec<ManifestItem>,
}

/// Validate an EPUB buffer against the container/package structure rules.
///
/// Never fails: any defect in the input becomes an issue in the returned
/// report instead of an error to the caller.
pub fn validate_epub(bytes: &[u8]) -> ValidationResult {
    let mut report = Report::default();

    let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(a) => a,
        Err(e) => {
            report.error("ZIP_INVALID", format!("Not a readable zip archive: {e}"), None);
            return report.finish();
        }
    };

    if archive.is_empty() {
        report.error("ZIP_EMPTY", "Archive contains no entries", None);
        return report.finish();
    }

    let names: HashSet<String> = archive.file_names().map(str::to_owned).collect();

    check_mimetype(&mut archive, &mut report);

    let opf_path = match root_file_path(&mut archive, &names, &mut report) {
        Some(p) => p,
        None => return report.finish(),
    };
    report
        .metadata
        .insert("opf_path".to_string(), opf_path.clone());

    let package = match read_package(&mut archive, &opf_path) {
        Some(p) => p,
        None => {
            report.error(
                "OPF_INVALID",
                "Package document is not parseable XML with a <package> root",
                Some(&opf_path),
            );
            return report.finish();
        }
    };

    let version = package.version.clone().unwrap_or_default();
    report.metadata.insert("version".to_string(), version.clone());

    if !package.has_manifest || !package.has_spine {
        report.error(
            "OPF_INVALID",
            "Package document must contain both <manifest> and <spine>",
            Some(&opf_path),
        );
        return report.finish();
    }

    check_manifest_items(&package, &opf_path, &names, &mut report);
    check_navigation(&package, &opf_path, &version, &names, &mut report);

    report.finish()
}

// ── Mimetype entry ───────────────────────────────────────────────────────

/// The three mimetype checks run against the archive's first entry and are
/// independent: a single malformed file can trigger all of them at once.
fn check_mimetype(archive: &mut ZipArchive<Cursor<&[u8]>>, report: &mut Report) {
    let mut first = match archive.by_index(0) {
        Ok(f) => f,
        Err(e) => {
            report.error("ZIP_INVALID", format!("Cannot read first entry: {e}"), None);
            return;
        }
    };

    let name = first.name().to_string();
    if name != "mimetype" {
        report.error(
            "MIMETYPE_FIRST",
            format!("First archive entry must be 'mimetype', found '{name}'"),
            Some(&name),
        );
    }

    if first.compression() != CompressionMethod::Stored {
        report.error(
            "MIMETYPE_STORED",
            "The mimetype entry must be stored uncompressed",
            Some(&name),
        );
    }

    let mut content = Vec::new();
    let readable = first.read_to_end(&mut content).is_ok();
    if !readable || content != EPUB_MIMETYPE {
        report.error(
            "MIMETYPE_CONTENT",
            "The mimetype entry must contain exactly 'application/epub+zip'",
            Some(&name),
        );
    }
}

// ── Container ────────────────────────────────────────────────────────────

/// Locate the package document via `META-INF/container.xml`. Returns `None`
/// when validation cannot continue (missing/unparsable container, or the
/// declared root file does not exist in the archive).
fn root_file_path(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    names: &HashSet<String>,
    report: &mut Report,
) -> Option<String> {
    let container_path = "META-INF/container.xml";
    let mut xml = Vec::new();
    match archive.by_name(container_path) {
        Ok(mut f) => {
            if f.read_to_end(&mut xml).is_err() {
                report.error(
                    "CONTAINER_INVALID",
                    "container.xml exists but cannot be read",
                    Some(container_path),
                );
                return None;
            }
        }
        Err(_) => {
            report.error(
                "CONTAINER_MISSING",
                "META-INF/container.xml is missing",
                Some(container_path),
            );
            return None;
        }
    }

    let full_path = match parse_container(&xml) {
        Some(p) => p,
        None => {
            report.error(
                "CONTAINER_INVALID",
                "container.xml has no parseable <rootfile full-path=...>",
                Some(container_path),
            );
            return None;
        }
    };

    if !names.contains(&full_path) {
        report.error(
            "CONTAINER_INVALID",
            format!("Declared root file '{full_path}' does not exist in the archive"),
            Some(&full_path),
        );
        return None;
    }

    Some(full_path)
}

/// Extract the first `rootfile/@full-path` from container.xml.
fn parse_container(xml: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rootfile" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"full-path" {
                            let value = String::from_utf8_lossy(&attr.value).into_owned();
                            if !value.is_empty() {
                                return Some(value);
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

// ── Package document ─────────────────────────────────────────────────────

/// Parse the OPF skeleton. `None` means the document is not usable at all:
/// unreadable entry, malformed XML, or a root element other than <package>.
fn read_package(archive: &mut ZipArchive<Cursor<&[u8]>>, opf_path: &str) -> Option<PackageDoc> {
    let mut xml = Vec::new();
    archive.by_name(opf_path).ok()?.read_to_end(&mut xml).ok()?;

    let mut reader = Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut package = PackageDoc::default();
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = e.local_name().as_ref().to_vec();
                if !saw_root {
                    if local != b"package" {
                        return None;
                    }
                    saw_root = true;
                    package.version = attr_value(&e, b"version");
                    buf.clear();
                    continue;
                }
                match local.as_slice() {
                    b"manifest" => package.has_manifest = true,
                    b"spine" => {
                        package.has_spine = true;
                        package.spine_toc = attr_value(&e, b"toc");
                    }
                    b"item" => package.items.push(ManifestItem {
                        id: attr_value(&e, b"id"),
                        href: attr_value(&e, b"href"),
                        properties: attr_value(&e, b"properties"),
                    }),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    saw_root.then_some(package)
}

fn attr_value(e: &quick_xml::events::BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

// ── Manifest + navigation checks ─────────────────────────────────────────

fn check_manifest_items(
    package: &PackageDoc,
    opf_path: &str,
    names: &HashSet<String>,
    report: &mut Report,
) {
    for item in &package.items {
        match &item.href {
            Some(href) => {
                let resolved = resolve_href(opf_path, href);
                if !names.contains(&resolved) {
                    report.error(
                        "RESOURCE_MISSING",
                        format!("Manifest item '{href}' resolves to a missing file"),
                        Some(&resolved),
                    );
                }
            }
            None => {
                let id = item.id.as_deref().unwrap_or("<no id>");
                report.error(
                    "MANIFEST_ITEM_NO_HREF",
                    format!("Manifest item '{id}' has no href attribute"),
                    Some(opf_path),
                );
            }
        }
    }
}

fn check_navigation(
    package: &PackageDoc,
    opf_path: &str,
    version: &str,
    names: &HashSet<String>,
    report: &mut Report,
) {
    let numeric = version.parse::<f64>().unwrap_or(0.0);

    if numeric >= 3.0 {
        let has_nav = package.items.iter().any(|item| {
            item.properties
                .as_deref()
                .map(|p| p.to_lowercase().contains("nav"))
                .unwrap_or(false)
        });
        if !has_nav {
            report.error(
                "NAV_MISSING",
                "EPUB 3 package declares no manifest item with properties containing 'nav'",
                Some(opf_path),
            );
        }
        return;
    }

    // EPUB 2: navigation is the NCX the spine points at via @toc.
    let toc_id = match &package.spine_toc {
        Some(id) => id,
        None => {
            report.warning(
                "TOC_NOT_DECLARED",
                "EPUB 2 spine declares no toc attribute; readers will fall back to spine order",
                Some(opf_path),
            );
            return;
        }
    };

    let toc_item = package
        .items
        .iter()
        .find(|item| item.id.as_deref() == Some(toc_id.as_str()));

    match toc_item {
        None => report.error(
            "TOC_REF_INVALID",
            format!("spine/@toc references unknown manifest item '{toc_id}'"),
            Some(opf_path),
        ),
        Some(item) => {
            if let Some(href) = &item.href {
                let resolved = resolve_href(opf_path, href);
                if !names.contains(&resolved) {
                    report.error(
                        "TOC_FILE_MISSING",
                        format!("Declared NCX '{href}' does not exist in the archive"),
                        Some(&resolved),
                    );
                }
            }
        }
    }
}

/// Resolve a manifest href against the package document's directory, with
/// POSIX-style `.`/`..` normalisation. Zip entry names always use `/`.
fn resolve_href(opf_path: &str, href: &str) -> String {
    let dir = match opf_path.rfind('/') {
        Some(idx) => &opf_path[..idx],
        None => "",
    };

    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    parts.join("/")
}
