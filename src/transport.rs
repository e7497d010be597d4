//! Job transport: the seam between the in-process orchestrator and an
//! external worker system.
//!
//! The orchestrator's in-process run and a transport-backed run are
//! semantically equivalent — a transport implementation must preserve the
//! same state machine and checkpoint semantics. The core ships only
//! [`LocalTransport`], which dispatches straight into a
//! [`PipelineOrchestrator`]; a queue-backed implementation (a broker, a
//! worker pool) plugs in behind the same [`JobTransport`] trait.
//!
//! PDF bytes cross the wire base64-encoded inside a JSON-serialisable
//! [`TransportJobSpec`], so the payload survives any text-safe queue or
//! message broker unmodified.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;
use crate::job::JobState;
use crate::orchestrator::{JobSpec, PipelineOrchestrator};

/// Wire form of a [`JobSpec`]: JSON-serialisable, PDF bytes base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportJobSpec {
    pub id: String,
    pub filename: String,
    pub file_size: u64,
    pub ocr_enabled: bool,
    pub pdf_base64: String,
}

impl TransportJobSpec {
    /// Encode a submission for transport.
    pub fn from_spec(spec: &JobSpec) -> Self {
        Self {
            id: spec.id.clone(),
            filename: spec.filename.clone(),
            file_size: spec.file_size,
            ocr_enabled: spec.ocr_enabled,
            pdf_base64: BASE64.encode(&spec.pdf),
        }
    }

    /// Decode back into a runnable submission.
    ///
    /// # Errors
    /// [`ConvertError::Transport`] when the payload is not valid base64.
    pub fn into_spec(self) -> Result<JobSpec, ConvertError> {
        let pdf = BASE64.decode(&self.pdf_base64).map_err(|e| {
            ConvertError::Transport {
                detail: format!("job '{}' carries an undecodable payload: {e}", self.id),
            }
        })?;
        Ok(JobSpec {
            id: self.id,
            filename: self.filename,
            file_size: self.file_size,
            ocr_enabled: self.ocr_enabled,
            pdf,
        })
    }
}

/// Opaque reference to an enqueued run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// A transport-level view of a run's progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: JobState,
    pub progress: u8,
    pub error: Option<String>,
}

/// Dispatches conversion runs to wherever they execute.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn enqueue(&self, spec: TransportJobSpec) -> Result<TaskHandle, ConvertError>;

    async fn poll(&self, handle: &TaskHandle) -> Result<TaskStatus, ConvertError>;

    /// Request cancellation of the run behind `handle`.
    async fn revoke(&self, handle: &TaskHandle) -> Result<(), ConvertError>;
}

/// In-process transport: runs jobs on the local orchestrator's runtime.
#[derive(Clone)]
pub struct LocalTransport {
    orchestrator: PipelineOrchestrator,
}

impl LocalTransport {
    pub fn new(orchestrator: PipelineOrchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobTransport for LocalTransport {
    async fn enqueue(&self, spec: TransportJobSpec) -> Result<TaskHandle, ConvertError> {
        let spec = spec.into_spec()?;
        let job = self.orchestrator.start(spec).await;
        Ok(TaskHandle { task_id: job.id })
    }

    async fn poll(&self, handle: &TaskHandle) -> Result<TaskStatus, ConvertError> {
        let job = self.orchestrator.status(&handle.task_id).await?;
        Ok(TaskStatus {
            state: job.state,
            progress: job.progress,
            error: job.error_message,
        })
    }

    async fn revoke(&self, handle: &TaskHandle) -> Result<(), ConvertError> {
        self.orchestrator.cancel(&handle.task_id).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec {
            id: "j1".to_string(),
            filename: "doc.pdf".to_string(),
            file_size: 4,
            ocr_enabled: true,
            pdf: vec![0x25, 0x50, 0x44, 0x46],
        }
    }

    #[test]
    fn wire_spec_round_trips() {
        let original = spec();
        let wire = TransportJobSpec::from_spec(&original);
        assert_eq!(wire.pdf_base64, "JVBERg==");

        let decoded = wire.into_spec().unwrap();
        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.pdf, original.pdf);
        assert!(decoded.ocr_enabled);
    }

    #[test]
    fn wire_spec_survives_json() {
        let wire = TransportJobSpec::from_spec(&spec());
        let json = serde_json::to_string(&wire).unwrap();
        let back: TransportJobSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pdf_base64, wire.pdf_base64);
    }

    #[test]
    fn corrupt_payload_is_a_transport_error() {
        let mut wire = TransportJobSpec::from_spec(&spec());
        wire.pdf_base64 = "!!! not base64 !!!".to_string();
        let err = wire.into_spec().unwrap_err();
        assert!(matches!(err, ConvertError::Transport { .. }));
        assert!(err.to_string().contains("j1"));
    }
}
