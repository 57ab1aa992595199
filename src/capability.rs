//! Backend capability descriptor.
//!
//! The submitter checks requests against these numbers before anything is
//! sent, and the watcher reads [`Capabilities::completion`] to decide how to
//! learn that a job is done.

use serde::{Deserialize, Serialize};

use crate::job::CompletionModes;

/// What a backend can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    /// Name of the backend.
    pub name: String,
    /// Number of qubits available.
    pub num_qubits: u32,
    /// Maximum number of shots per job.
    pub max_shots: u32,
    /// Whether this is a simulator (not real hardware). Non-simulators need
    /// an API token.
    pub is_simulator: bool,
    /// Whether the backend computes expectation values for observables.
    pub supports_estimation: bool,
    /// Whether jobs can be cancelled once submitted.
    pub supports_cancel: bool,
    /// How job completion is signalled.
    pub completion: CompletionModes,
}

impl Capabilities {
    /// Create capabilities for a simulator.
    ///
    /// Simulators sample, estimate, cancel and offer both completion
    /// mechanisms.
    pub fn simulator(num_qubits: u32) -> Self {
        Self {
            name: "simulator".into(),
            num_qubits,
            max_shots: 100_000,
            is_simulator: true,
            supports_estimation: true,
            supports_cancel: true,
            completion: CompletionModes::BOTH,
        }
    }

    /// Create capabilities for a remote device that only answers status
    /// queries.
    pub fn remote(name: impl Into<String>, num_qubits: u32) -> Self {
        Self {
            name: name.into(),
            num_qubits,
            max_shots: 20_000,
            is_simulator: false,
            supports_estimation: false,
            supports_cancel: true,
            completion: CompletionModes::POLL_ONLY,
        }
    }

    /// Override the completion mechanisms.
    pub fn with_completion(mut self, completion: CompletionModes) -> Self {
        self.completion = completion;
        self
    }

    /// Enable or disable expectation-value estimation.
    pub fn with_estimation(mut self, supported: bool) -> Self {
        self.supports_estimation = supported;
        self
    }

    /// Enable or disable cancellation.
    pub fn with_cancel(mut self, supported: bool) -> Self {
        self.supports_cancel = supported;
        self
    }

    /// Override the shot limit.
    pub fn with_max_shots(mut self, max_shots: u32) -> Self {
        self.max_shots = max_shots;
        self
    }
}
