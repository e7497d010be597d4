//! Pipeline stages for PDF-to-EPUB conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different validation policy) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! classify ──▶ assemble ──▶ extract ──▶ enrich ──▶ generate ──▶ validate
//! (heuristics)  (chunks)   (collab.)   (collab.)  (chapters)   (EPUB zip)
//! ```
//!
//! 1. [`classify`] — per-page heuristics deciding text-based / scanned /
//!    mixed, with a confidence score
//! 2. [`assemble`] — plan character-bounded extraction chunks so large
//!    documents get incremental progress and bounded memory
//! 3. extract / enrich — delegated to the injected collaborators; the
//!    orchestrator drives them between the stages here
//! 4. [`generate`] — turn extracted or enriched text into the chapter list
//!    handed to the EPUB encoder
//! 5. [`validate`] — structural EPUB 2/3 compliance check on the encoder's
//!    output

pub mod assemble;
pub mod classify;
pub mod generate;
pub mod validate;
