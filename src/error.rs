//! Error types.
//!
//! Two layers:
//!
//! | Type | Raised by | Carries |
//! |------|-----------|---------|
//! | [`HalError`] | backend implementations | backend-side detail |
//! | [`RunError`] | submitter, watcher, normalizer | request label, job id |
//!
//! `RunError` variants are terminal to the request they belong to. None is
//! retried internally: resubmitting a hardware job may queue and bill it
//! twice, so retry policy stays with the caller.

use std::time::Duration;

use thiserror::Error;

use crate::job::JobId;

/// Errors reported by a backend.
///
/// | Category | Variants | Recovery |
/// |----------|----------|----------|
/// | **Transient** | `BackendUnavailable` | Retry with backoff |
/// | **Permanent** | `InvalidCircuit`, `CircuitTooLarge`, `InvalidShots`, `Unsupported` | Fix input |
/// | **Job-level** | `JobNotFound` | Resubmit or abort |
/// | **Auth** | `AuthenticationFailed` | Re-authenticate |
/// | **Config** | `Configuration`, `Backend` | Fix configuration |
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    // ── Transient errors (retry with backoff) ────────────────────────
    /// Backend is not available.
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    // ── Permanent errors (fix input) ─────────────────────────────────
    /// Invalid circuit.
    #[error("Invalid circuit: {0}")]
    InvalidCircuit(String),

    /// Circuit exceeds backend capabilities.
    #[error("Circuit exceeds backend capabilities: {0}")]
    CircuitTooLarge(String),

    /// Invalid number of shots.
    #[error("Invalid shots: {0}")]
    InvalidShots(String),

    /// Invalid parameter bindings.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Unsupported feature.
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    // ── Job-level errors ─────────────────────────────────────────────
    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    // ── Auth errors ──────────────────────────────────────────────────
    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // ── Config errors ────────────────────────────────────────────────
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl HalError {
    /// Returns `true` if this error is transient and the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

/// Result type for backend operations.
pub type HalResult<T> = Result<T, HalError>;

/// Request-level failures.
///
/// Every variant names the request (`label`) it belongs to so a caller
/// juggling several jobs can tell which one failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The request was rejected before execution began.
    #[error("[{label}] submission rejected: {source}")]
    Submission {
        label: String,
        #[source]
        source: HalError,
    },

    /// The local wait budget ran out. The job may still be running remotely.
    #[error("[{label}] job {job_id} not terminal after {waited:?}")]
    Timeout {
        label: String,
        job_id: JobId,
        waited: Duration,
    },

    /// The backend reported a terminal failure or cancellation.
    #[error("[{label}] job {job_id} did not complete: {reason}")]
    JobFailure {
        label: String,
        job_id: JobId,
        reason: String,
    },

    /// The raw result did not match any recognized shape.
    #[error("[{label}] unexpected result shape: {detail}")]
    ResultShape { label: String, detail: String },

    /// The handle offers no way to learn completion.
    #[error("[{label}] job {job_id} supports neither polling nor blocking wait")]
    MalformedHandle { label: String, job_id: JobId },

    /// A status, result or cancel query failed.
    #[error("[{label}] backend query for job {job_id} failed: {source}")]
    Backend {
        label: String,
        job_id: JobId,
        #[source]
        source: HalError,
    },
}

impl RunError {
    /// Label of the request that failed.
    pub fn label(&self) -> &str {
        match self {
            Self::Submission { label, .. }
            | Self::Timeout { label, .. }
            | Self::JobFailure { label, .. }
            | Self::ResultShape { label, .. }
            | Self::MalformedHandle { label, .. }
            | Self::Backend { label, .. } => label,
        }
    }

    /// Job id, when the failure happened after submission.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Timeout { job_id, .. }
            | Self::JobFailure { job_id, .. }
            | Self::MalformedHandle { job_id, .. }
            | Self::Backend { job_id, .. } => Some(job_id),
            Self::Submission { .. } | Self::ResultShape { .. } => None,
        }
    }

    /// Returns `true` if the job may still be running on the backend.
    pub fn job_may_be_running(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Backend { .. })
    }

    pub(crate) fn submission(label: impl Into<String>, source: HalError) -> Self {
        Self::Submission {
            label: label.into(),
            source,
        }
    }

    pub(crate) fn shape(label: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ResultShape {
            label: label.into(),
            detail: detail.into(),
        }
    }
}

/// Result type for request-level operations.
pub type RunResult<T> = Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(HalError::BackendUnavailable("offline".into()).is_transient());
        assert!(!HalError::InvalidCircuit("bad".into()).is_transient());
        assert!(!HalError::JobNotFound("job-9".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = HalError::InvalidCircuit("too many qubits".into());
        assert_eq!(err.to_string(), "Invalid circuit: too many qubits");
    }

    #[test]
    fn test_run_error_carries_label() {
        let err = RunError::JobFailure {
            label: "GHZ".into(),
            job_id: JobId::new("job-7"),
            reason: "calibration drift".into(),
        };
        assert_eq!(err.label(), "GHZ");
        assert_eq!(err.job_id(), Some(&JobId::new("job-7")));
        assert_eq!(
            err.to_string(),
            "[GHZ] job job-7 did not complete: calibration drift"
        );
        assert!(!err.job_may_be_running());
    }

    #[test]
    fn test_timeout_keeps_job_alive() {
        let err = RunError::Timeout {
            label: "circuit[1]".into(),
            job_id: JobId::new("job-2"),
            waited: Duration::from_secs(5),
        };
        assert!(err.job_may_be_running());
        assert_eq!(err.label(), "circuit[1]");
    }

    #[test]
    fn test_submission_error_source() {
        let err = RunError::submission("batch", HalError::InvalidShots("0".into()));
        assert!(err.job_id().is_none());
        assert_eq!(err.to_string(), "[batch] submission rejected: Invalid shots: 0");
    }
}
