//! Job lifecycle types.
//!
//! The job state machine:
//!
//! ```text
//!   submit() ──→ Queued ──→ Running ──→ Completed
//!                  │           │
//!                  │           ├──→ Failed(reason)
//!                  │           │
//!                  └───────────┴──→ Cancelled
//! ```
//!
//! **Invariants:**
//! - Transitions are monotonic — a job never moves backward.
//! - Terminal states (`Completed`, `Failed`, `Cancelled`) are permanent.
//! - Once a [`JobHandle`] holds a terminal state it never contacts the
//!   backend again to learn it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Status of a job as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Job is waiting in queue.
    Queued,
    /// Job is currently running.
    Running,
    /// Job completed successfully.
    Completed,
    /// Job failed with an error message.
    Failed(String),
    /// Job was cancelled.
    Cancelled,
}

impl JobStatus {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed(_) | JobStatus::Cancelled
        )
    }

    /// Check if the job is still pending (queued or running).
    pub fn is_pending(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    /// Check if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    // Queued < Running < terminal.
    fn stage(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed | JobStatus::Failed(_) | JobStatus::Cancelled => 2,
        }
    }

    /// The terminal state this status represents, if any.
    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            JobStatus::Completed => Some(TerminalState::Completed),
            JobStatus::Failed(msg) => Some(TerminalState::Failed(msg.clone())),
            JobStatus::Cancelled => Some(TerminalState::Cancelled),
            JobStatus::Queued | JobStatus::Running => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed(msg) => write!(f, "Failed: {msg}"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A state after which no further transition occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    /// The job finished and its result can be fetched.
    Completed,
    /// The backend reported a failure; the text is the backend's diagnostic.
    Failed(String),
    /// The job was cancelled.
    Cancelled,
}

impl TerminalState {
    /// Check if the job completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalState::Completed)
    }
}

impl From<TerminalState> for JobStatus {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Completed => JobStatus::Completed,
            TerminalState::Failed(msg) => JobStatus::Failed(msg),
            TerminalState::Cancelled => JobStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        JobStatus::from(self.clone()).fmt(f)
    }
}

/// How a backend signals that a job is done.
///
/// A usable handle supports at least one mechanism. When both are present
/// the watcher prefers the blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionModes {
    /// `status()` can be queried without blocking.
    pub pollable: bool,
    /// `wait_terminal()` blocks until a terminal state.
    pub blocking: bool,
}

impl CompletionModes {
    /// Only the non-blocking status query is available.
    pub const POLL_ONLY: Self = Self {
        pollable: true,
        blocking: false,
    };

    /// Only the blocking monitor is available.
    pub const BLOCKING_ONLY: Self = Self {
        pollable: false,
        blocking: true,
    };

    /// Both mechanisms are available.
    pub const BOTH: Self = Self {
        pollable: true,
        blocking: true,
    };

    /// Check if at least one completion mechanism is available.
    pub fn is_usable(&self) -> bool {
        self.pollable || self.blocking
    }
}

impl Default for CompletionModes {
    fn default() -> Self {
        Self::POLL_ONLY
    }
}

/// One observed status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    /// The status the job moved into.
    pub status: JobStatus,
    /// When the watcher observed it.
    pub observed_at: DateTime<Utc>,
}

/// Local view of a submitted job.
///
/// The handle is owned by whichever call is driving it; the watcher borrows
/// it mutably while awaiting and records every status change it sees.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    label: String,
    modes: CompletionModes,
    cancellable: bool,
    submitted_at: DateTime<Utc>,
    trail: Vec<StatusChange>,
}

impl JobHandle {
    /// Create a handle for a freshly submitted job (status `Queued`).
    ///
    /// The handle is not cancellable until [`with_cancel`](Self::with_cancel)
    /// says so.
    pub fn new(id: impl Into<JobId>, label: impl Into<String>, modes: CompletionModes) -> Self {
        let submitted_at = Utc::now();
        Self {
            id: id.into(),
            label: label.into(),
            modes,
            cancellable: false,
            submitted_at,
            trail: vec![StatusChange {
                status: JobStatus::Queued,
                observed_at: submitted_at,
            }],
        }
    }

    /// Backend job identifier.
    pub fn id(&self) -> &JobId {
        &self.id
    }

    /// Caller-facing label of the request this job belongs to.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Completion mechanisms the backend offers for this job.
    pub fn modes(&self) -> CompletionModes {
        self.modes
    }

    /// Record whether the backend advertises cancellation.
    pub fn with_cancel(mut self, supported: bool) -> Self {
        self.cancellable = supported;
        self
    }

    /// Whether the backend advertised that this job can be cancelled.
    pub fn cancellable(&self) -> bool {
        self.cancellable
    }

    /// When the job was submitted.
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Last status the watcher observed.
    pub fn status(&self) -> &JobStatus {
        // The trail is seeded with `Queued` on construction.
        &self.trail[self.trail.len() - 1].status
    }

    /// Terminal state, once one has been observed.
    pub fn terminal(&self) -> Option<TerminalState> {
        self.status().terminal()
    }

    /// Every status change observed so far, oldest first.
    pub fn trail(&self) -> &[StatusChange] {
        &self.trail
    }

    /// Record a status observation. Repeats of the current status, moves
    /// backward (`Running` to `Queued`) and any update after a terminal
    /// state are ignored. Returns whether the observation changed the
    /// handle.
    pub(crate) fn observe(&mut self, status: JobStatus) -> bool {
        let current = self.status();
        if current.is_terminal() || *current == status || status.stage() < current.stage() {
            return false;
        }
        self.trail.push(StatusChange {
            status,
            observed_at: Utc::now(),
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed("error".into()).is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Queued.to_string(), "Queued");
        assert_eq!(JobStatus::Running.to_string(), "Running");
        assert_eq!(
            JobStatus::Failed("timeout".into()).to_string(),
            "Failed: timeout"
        );
        assert_eq!(TerminalState::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_job_id_from() {
        let id: JobId = "job-123".into();
        assert_eq!(id.0, "job-123");
        assert_eq!(id.to_string(), "job-123");
    }

    #[test]
    fn test_status_terminal_conversion() {
        assert_eq!(JobStatus::Running.terminal(), None);
        assert_eq!(
            JobStatus::Failed("qubit 3 offline".into()).terminal(),
            Some(TerminalState::Failed("qubit 3 offline".into()))
        );
        assert_eq!(
            JobStatus::from(TerminalState::Completed),
            JobStatus::Completed
        );
    }

    #[test]
    fn test_completion_modes() {
        assert!(CompletionModes::POLL_ONLY.is_usable());
        assert!(CompletionModes::BLOCKING_ONLY.is_usable());
        assert!(
            !CompletionModes {
                pollable: false,
                blocking: false
            }
            .is_usable()
        );
    }

    #[test]
    fn test_handle_trail() {
        let mut handle = JobHandle::new("job-1", "circuit[0]", CompletionModes::POLL_ONLY);
        assert_eq!(*handle.status(), JobStatus::Queued);
        assert!(handle.terminal().is_none());

        assert!(!handle.observe(JobStatus::Queued));
        assert!(handle.observe(JobStatus::Running));
        // Never moves backward.
        assert!(!handle.observe(JobStatus::Queued));
        assert!(handle.observe(JobStatus::Completed));
        // Terminal states are permanent.
        assert!(!handle.observe(JobStatus::Running));

        assert_eq!(handle.trail().len(), 3);
        assert_eq!(handle.terminal(), Some(TerminalState::Completed));
        assert_eq!(handle.label(), "circuit[0]");
        assert!(!handle.cancellable());
        assert!(handle.with_cancel(true).cancellable());
    }
}
