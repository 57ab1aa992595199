//! Backend traits and availability types.
//!
//! A backend is split in two so the watcher never needs the circuit type:
//!
//! ```text
//!   Backend<C>:  capabilities() ──→ validate() ──→ submit()
//!                                                     │
//!   JobControl:                 status() / wait_terminal() ──→ result()
//!                                           cancel()
//! ```
//!
//! | Method | Trait | Kind | Required |
//! |--------|-------|------|----------|
//! | `status()` | `JobControl` | async | yes |
//! | `wait_terminal()` | `JobControl` | async | provided (unsupported) |
//! | `result()` | `JobControl` | async | yes |
//! | `cancel()` | `JobControl` | async | provided (unsupported) |
//! | `name()` | `Backend` | sync | yes |
//! | `capabilities()` | `Backend` | sync | yes |
//! | `availability()` | `Backend` | async | provided |
//! | `validate()` | `Backend` | async | provided (`Valid`) |
//! | `submit()` | `Backend` | async | yes |
//!
//! Implementations are handed to the crate already authenticated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::Capabilities;
use crate::error::{HalError, HalResult};
use crate::job::{JobId, JobStatus};
use crate::request::{CircuitDescriptor, ExecutionRequest};
use crate::result::ExecutionResult;

/// Job-level operations on a backend.
#[async_trait]
pub trait JobControl: Send + Sync {
    /// Get the status of a job without blocking.
    async fn status(&self, job_id: &JobId) -> HalResult<JobStatus>;

    /// Block until the job reaches a terminal state and return it.
    ///
    /// Only called when the backend advertises blocking completion.
    async fn wait_terminal(&self, job_id: &JobId) -> HalResult<JobStatus> {
        Err(HalError::Unsupported(format!(
            "blocking wait for job {job_id}"
        )))
    }

    /// Get the result of a completed job.
    ///
    /// MUST only be called when the job is `Completed`.
    async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult>;

    /// Ask the backend to cancel a job.
    async fn cancel(&self, job_id: &JobId) -> HalResult<()> {
        Err(HalError::Unsupported(format!("cancelling job {job_id}")))
    }
}

/// Trait for quantum backends.
///
/// Generic over `C`, the circuit type, so it is independent of any
/// specific intermediate representation.
///
/// # Contract
///
/// - `capabilities()` MUST be synchronous and infallible, cached at
///   construction time.
/// - `submit()` MUST return a `JobId` whose initial status is `Queued`.
/// - `submit()` never retries internally.
#[async_trait]
pub trait Backend<C: CircuitDescriptor>: JobControl {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Get the capabilities of this backend.
    fn capabilities(&self) -> &Capabilities;

    /// Check backend availability with queue depth information.
    async fn availability(&self) -> HalResult<BackendAvailability> {
        Ok(BackendAvailability::always_available())
    }

    /// Validate a circuit against backend-specific constraints.
    ///
    /// The submitter has already checked width and shot limits against
    /// [`capabilities()`](Self::capabilities); this hook is for anything
    /// else the backend knows.
    async fn validate(&self, _circuit: &C) -> HalResult<ValidationResult> {
        Ok(ValidationResult::Valid)
    }

    /// Submit a request for execution.
    async fn submit(&self, request: &ExecutionRequest<C>) -> HalResult<JobId>;
}

/// Backend availability information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendAvailability {
    /// Whether the backend is currently accepting jobs.
    pub is_available: bool,
    /// Number of jobs currently in queue (if known).
    pub queue_depth: Option<u32>,
    /// Estimated wait time for a new job in seconds (if known).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_wait_secs: Option<f64>,
    /// Human-readable status message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl BackendAvailability {
    /// Create availability for a backend that is always available.
    pub fn always_available() -> Self {
        Self {
            is_available: true,
            queue_depth: Some(0),
            estimated_wait_secs: Some(0.0),
            status_message: None,
        }
    }

    /// Create availability for an offline backend.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            is_available: false,
            queue_depth: None,
            estimated_wait_secs: None,
            status_message: Some(reason.into()),
        }
    }
}

/// Result of circuit validation against backend constraints.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// Circuit is valid and can be submitted directly.
    Valid,
    /// Circuit is invalid for this backend.
    Invalid {
        /// Reasons the circuit is invalid.
        reasons: Vec<String>,
    },
    /// Circuit could run after transpilation.
    RequiresTranspilation {
        /// What transpilation is needed.
        details: String,
    },
}

impl ValidationResult {
    /// Check if the circuit is valid (can be submitted as-is).
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Turn a non-valid verdict into an error.
    pub fn into_result(self) -> HalResult<()> {
        match self {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid { reasons } => {
                Err(HalError::InvalidCircuit(reasons.join("; ")))
            }
            ValidationResult::RequiresTranspilation { details } => Err(
                HalError::InvalidCircuit(format!("requires transpilation: {details}")),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_availability_always_available() {
        let avail = BackendAvailability::always_available();
        assert!(avail.is_available);
        assert_eq!(avail.queue_depth, Some(0));
        assert!(avail.status_message.is_none());
    }

    #[test]
    fn test_backend_availability_unavailable() {
        let avail = BackendAvailability::unavailable("maintenance");
        assert!(!avail.is_available);
        assert_eq!(avail.status_message, Some("maintenance".to_string()));
    }

    #[test]
    fn test_validation_result_into_result() {
        assert!(ValidationResult::Valid.into_result().is_ok());

        let err = ValidationResult::Invalid {
            reasons: vec!["Unsupported gate: ecr".into(), "too deep".into()],
        }
        .into_result()
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid circuit: Unsupported gate: ecr; too deep"
        );

        assert!(
            !ValidationResult::RequiresTranspilation {
                details: String::new()
            }
            .is_valid()
        );
    }
}
