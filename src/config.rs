//! Configuration for the conversion orchestrator.
//!
//! All orchestrator behaviour is controlled through [`OrchestratorConfig`],
//! built via its [`OrchestratorConfigBuilder`]. Keeping every knob in one
//! struct makes it trivial to share configs across tasks and to diff two runs
//! to understand why their outcomes differ.
//!
//! The classifier's heuristic thresholds are *not* here — they are named
//! constants in [`crate::pipeline::classify`] because the decision boundaries
//! and their comparison operators are part of the classifier's contract, not
//! something deployments should tune per environment.

use std::time::Duration;

use crate::error::ConvertError;
use crate::pipeline::assemble::DEFAULT_MAX_CHARS;

/// Configuration for a [`crate::orchestrator::PipelineOrchestrator`].
///
/// Built via [`OrchestratorConfig::builder()`] or using
/// [`OrchestratorConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2epub::OrchestratorConfig;
///
/// let config = OrchestratorConfig::builder()
///     .max_retries(2)
///     .chunk_max_chars(20_000)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Maximum pipeline runs per job before the job goes terminal FAILED.
    /// Default: 3.
    ///
    /// Collaborator failures are usually transient (a worker restart, a
    /// network blip). Three runs catch the vast majority without keeping a
    /// doomed job alive for minutes. Input errors are never retried
    /// regardless of this value.
    pub max_retries: u32,

    /// Base delay before an automatic retry. Default: 5s.
    ///
    /// The actual wait is `backoff_base * attempts`, capped at
    /// [`backoff_cap`](Self::backoff_cap), so consecutive failures back off
    /// linearly instead of hammering a recovering collaborator.
    pub backoff_base: Duration,

    /// Upper bound on the retry delay. Default: 30s.
    pub backoff_cap: Duration,

    /// Character budget per extraction chunk. Default: 10 000.
    ///
    /// Documents whose text splits into more than one chunk are extracted
    /// chunk-by-chunk with incremental progress reporting, bounding peak
    /// memory on very large inputs. Smaller values mean more progress
    /// granularity and more collaborator round-trips.
    pub chunk_max_chars: usize,

    /// Title stamped on the generated EPUB. Default: "Converted Document".
    pub book_title: String,

    /// Author stamped on the generated EPUB. Default: "pdf2epub converter".
    pub book_author: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(30),
            chunk_max_chars: DEFAULT_MAX_CHARS,
            book_title: "Converted Document".to_string(),
            book_author: "pdf2epub converter".to_string(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a new builder for `OrchestratorConfig`.
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`OrchestratorConfig`].
#[derive(Debug)]
pub struct OrchestratorConfigBuilder {
    config: OrchestratorConfig,
}

impl OrchestratorConfigBuilder {
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn backoff_base(mut self, d: Duration) -> Self {
        self.config.backoff_base = d;
        self
    }

    pub fn backoff_cap(mut self, d: Duration) -> Self {
        self.config.backoff_cap = d;
        self
    }

    pub fn chunk_max_chars(mut self, n: usize) -> Self {
        self.config.chunk_max_chars = n;
        self
    }

    pub fn book_title(mut self, title: impl Into<String>) -> Self {
        self.config.book_title = title.into();
        self
    }

    pub fn book_author(mut self, author: impl Into<String>) -> Self {
        self.config.book_author = author.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OrchestratorConfig, ConvertError> {
        let c = &self.config;
        if c.chunk_max_chars == 0 {
            return Err(ConvertError::InvalidConfig(
                "chunk_max_chars must be ≥ 1".into(),
            ));
        }
        if c.backoff_cap < c.backoff_base {
            return Err(ConvertError::InvalidConfig(format!(
                "backoff_cap ({:?}) must be ≥ backoff_base ({:?})",
                c.backoff_cap, c.backoff_base
            )));
        }
        Ok(self.config)
    }
}
