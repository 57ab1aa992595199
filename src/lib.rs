//! HAL Job Watch — submit, await and normalize quantum backend jobs
//!
//! This crate sits between a caller and any backend that implements the
//! [`Backend`] trait. It turns "submit circuits and get numbers back" into
//! one uniform pipeline, whatever completion mechanism or result shape the
//! backend uses.
//!
//! # Overview
//!
//! - [`Submitter`] checks an [`ExecutionRequest`] against the backend and
//!   sends it exactly once
//! - [`Watcher`] drives a [`JobHandle`] to a [`TerminalState`] by blocking
//!   wait or by polling with backoff, under a timeout
//! - [`normalize`] turns a [`RawResult`] into a [`NormalizedResult`]: ordered
//!   `(label, Outcome)` pairs
//! - [`Runner`] chains the three
//! - [`RunError`] names the request (and job) every failure belongs to
//!
//! # Pipeline
//!
//! ```text
//!   ExecutionRequest ──→ Submitter ──→ JobHandle ──→ Watcher ──→ TerminalState
//!                                                                     │
//!   NormalizedResult ←── normalize() ←── RawResult ←── result() ←─────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hal_jobwatch::{ExecutionRequest, Observable, RunConfig, Runner};
//! use hal_jobwatch::sim::{SimpleCircuit, SimulatedBackend};
//!
//! let config = RunConfig::from_file("jobwatch.json")?;
//! let backend = SimulatedBackend::from_config(&config.provider, 4)?;
//! let runner = Runner::new(&backend, config)?;
//!
//! let bell = SimpleCircuit::new(2, ["h", "cx"]).named("bell");
//! let counts = runner.run(ExecutionRequest::sample([bell.clone()], 1000)).await?;
//! let evs = runner
//!     .run(ExecutionRequest::estimate([bell], [Observable::pauli("ZZ")]))
//!     .await?;
//! ```

pub mod backend;
pub mod capability;
pub mod config;
pub mod error;
pub mod job;
pub mod normalize;
pub mod request;
pub mod result;
pub mod runner;
pub mod sim;
pub mod submit;
pub mod watch;

pub use backend::{Backend, BackendAvailability, JobControl, ValidationResult};
pub use capability::Capabilities;
pub use config::{ProviderConfig, RunConfig, WatchPolicy};
pub use error::{HalError, HalResult, RunError, RunResult};
pub use job::{CompletionModes, JobHandle, JobId, JobStatus, StatusChange, TerminalState};
pub use normalize::{NormalizedResult, Outcome, normalize};
pub use request::{CircuitDescriptor, ExecutionRequest, Observable, ParameterBinding, RequestShape};
pub use result::{Counts, ExecutionResult, PubEstimates, RawResult};
pub use runner::Runner;
pub use submit::{Submission, Submitter};
pub use watch::Watcher;
