//! In-memory simulated backend.
//!
//! Every circuit is treated as preparing the n-qubit GHZ state
//! `(|0…0⟩ + |1…1⟩)/√2`: sampling splits shots evenly between the two
//! bitstrings and estimation returns exact GHZ expectation values.
//!
//! Job progress is scripted. Each submission takes the next queued
//! [`JobScript`] (or a default `Running → Completed` script); every
//! `status()` call advances one step along it and `wait_terminal()` walks
//! the rest of it. A script that never reaches a terminal state keeps the
//! job pending forever, which is how timeouts are exercised.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{Backend, JobControl, ValidationResult};
use crate::capability::Capabilities;
use crate::config::ProviderConfig;
use crate::error::{HalError, HalResult};
use crate::job::{JobId, JobStatus};
use crate::request::{CircuitDescriptor, ExecutionRequest, Observable};
use crate::result::{Counts, ExecutionResult, PubEstimates, RawResult};

/// Gates the simulator accepts.
const SUPPORTED_GATES: &[&str] = &[
    "id", "x", "y", "z", "h", "s", "sdg", "t", "tdg", "sx", "rx", "ry", "rz", "p", "u", "cx",
    "cy", "cz", "swap", "ccx", "measure", "barrier",
];

/// A circuit described by its width and gate names.
#[derive(Debug, Clone)]
pub struct SimpleCircuit {
    name: Option<String>,
    num_qubits: u32,
    gates: Vec<String>,
}

impl SimpleCircuit {
    /// Create an unnamed circuit.
    pub fn new(num_qubits: u32, gates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: None,
            num_qubits,
            gates: gates.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Gate names in program order.
    pub fn gates(&self) -> &[String] {
        &self.gates
    }
}

impl CircuitDescriptor for SimpleCircuit {
    fn num_qubits(&self) -> u32 {
        self.num_qubits
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Scripted progress of one job.
#[derive(Debug, Clone)]
pub struct JobScript {
    trajectory: Vec<JobStatus>,
    result: Option<RawResult>,
}

impl JobScript {
    /// Statuses returned by successive `status()` calls.
    pub fn trajectory(statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        Self {
            trajectory: statuses.into_iter().collect(),
            result: None,
        }
    }

    /// `Running` for `polls - 1` queries, then `Completed`.
    pub fn completes_after(polls: usize) -> Self {
        let mut trajectory = vec![JobStatus::Running; polls.saturating_sub(1)];
        trajectory.push(JobStatus::Completed);
        Self::trajectory(trajectory)
    }

    /// `Running` once, then `Failed(reason)`.
    pub fn fails(reason: impl Into<String>) -> Self {
        Self::trajectory([JobStatus::Running, JobStatus::Failed(reason.into())])
    }

    /// `Running` forever.
    pub fn stuck() -> Self {
        Self::trajectory([JobStatus::Running])
    }

    /// Return `raw` instead of the simulated result once completed.
    pub fn with_result(mut self, raw: RawResult) -> Self {
        self.result = Some(raw);
        self
    }
}

impl Default for JobScript {
    fn default() -> Self {
        Self::trajectory([JobStatus::Running, JobStatus::Completed])
    }
}

struct SimJob {
    current: JobStatus,
    remaining: VecDeque<JobStatus>,
    result: RawResult,
}

impl SimJob {
    fn advance(&mut self) -> JobStatus {
        if self.current.is_pending() {
            if let Some(next) = self.remaining.pop_front() {
                self.current = next;
            }
        }
        self.current.clone()
    }
}

/// In-memory backend with scripted job progress and call counters.
pub struct SimulatedBackend {
    name: String,
    capabilities: Capabilities,
    step_delay: Duration,
    scripts: Mutex<VecDeque<JobScript>>,
    jobs: Mutex<FxHashMap<String, SimJob>>,
    next_id: AtomicU64,
    status_calls: AtomicUsize,
    wait_calls: AtomicUsize,
    result_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl SimulatedBackend {
    /// Simulator with `num_qubits` qubits and default capabilities.
    pub fn new(num_qubits: u32) -> Self {
        Self::with_capabilities(Capabilities::simulator(num_qubits))
    }

    /// Simulator with explicit capabilities.
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            name: capabilities.name.clone(),
            capabilities,
            step_delay: Duration::from_millis(50),
            scripts: Mutex::new(VecDeque::new()),
            jobs: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(0),
            status_calls: AtomicUsize::new(0),
            wait_calls: AtomicUsize::new(0),
            result_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
        }
    }

    /// Simulator named after the configured backend.
    pub fn from_config(provider: &ProviderConfig, num_qubits: u32) -> HalResult<Self> {
        if provider.backend.trim().is_empty() {
            return Err(HalError::Configuration("backend name is empty".into()));
        }
        let mut capabilities = Capabilities::simulator(num_qubits);
        capabilities.name = provider.backend.clone();
        Ok(Self::with_capabilities(capabilities))
    }

    /// Simulated time each step of a blocking wait takes.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Queue a script for the next submission.
    pub fn push_script(&self, script: JobScript) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    /// Number of `status()` calls so far.
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Number of `wait_terminal()` calls so far.
    pub fn wait_calls(&self) -> usize {
        self.wait_calls.load(Ordering::SeqCst)
    }

    /// Number of `result()` calls so far.
    pub fn result_calls(&self) -> usize {
        self.result_calls.load(Ordering::SeqCst)
    }

    /// Number of `cancel()` calls so far.
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Number of jobs submitted so far.
    pub fn submitted(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    fn with_job<T>(&self, job_id: &JobId, f: impl FnOnce(&mut SimJob) -> T) -> HalResult<T> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.get_mut(&job_id.0)
            .map(f)
            .ok_or_else(|| HalError::JobNotFound(job_id.0.clone()))
    }
}

fn simulate(request: &ExecutionRequest<SimpleCircuit>) -> RawResult {
    let circuits = request.circuits();
    match request.observables() {
        Some(observables) => RawResult::PerCircuitEstimates(
            circuits
                .iter()
                .map(|_| {
                    let evs: Vec<f64> = observables.iter().map(ghz_expectation).collect();
                    let estimates = PubEstimates::new(evs.clone());
                    match request.shots() {
                        Some(shots) => estimates.with_stds(
                            evs.iter()
                                .map(|ev| ((1.0 - ev * ev).max(0.0) / f64::from(shots)).sqrt())
                                .collect(),
                        ),
                        None => estimates,
                    }
                })
                .collect(),
        ),
        None => {
            let shots = u64::from(request.shots().unwrap_or_default());
            let mut tables: Vec<Counts> = circuits
                .iter()
                .map(|circuit| {
                    let width = circuit.num_qubits() as usize;
                    let mut counts = Counts::new();
                    counts.insert("0".repeat(width), shots / 2);
                    counts.insert("1".repeat(width), shots - shots / 2);
                    counts
                })
                .collect();
            if tables.len() == 1 {
                RawResult::Counts(tables.remove(0))
            } else {
                RawResult::PerCircuit(tables)
            }
        }
    }
}

/// ⟨GHZ|O|GHZ⟩ for a weighted sum of Pauli strings.
fn ghz_expectation(observable: &Observable) -> f64 {
    observable
        .terms
        .iter()
        .map(|(pauli, coeff)| coeff * ghz_pauli_expectation(pauli))
        .sum()
}

fn ghz_pauli_expectation(pauli: &str) -> f64 {
    let flips = pauli.chars().filter(|c| matches!(c, 'X' | 'Y')).count();
    if flips == 0 {
        // Diagonal: |1…1⟩ picks up a sign per Z.
        let zs = pauli.chars().filter(|&c| c == 'Z').count();
        return if zs % 2 == 0 { 1.0 } else { 0.0 };
    }
    if flips != pauli.len() {
        // Flips only some qubits: maps GHZ outside its own span.
        return 0.0;
    }
    match pauli.chars().filter(|&c| c == 'Y').count() % 4 {
        0 => 1.0,
        2 => -1.0,
        _ => 0.0,
    }
}

#[async_trait]
impl JobControl for SimulatedBackend {
    async fn status(&self, job_id: &JobId) -> HalResult<JobStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.with_job(job_id, SimJob::advance)
    }

    async fn wait_terminal(&self, job_id: &JobId) -> HalResult<JobStatus> {
        if !self.capabilities.completion.blocking {
            return Err(HalError::Unsupported(format!(
                "{} has no blocking wait",
                self.name
            )));
        }
        self.wait_calls.fetch_add(1, Ordering::SeqCst);

        loop {
            let (status, exhausted) = self.with_job(job_id, |job| {
                let status = job.advance();
                (status, job.remaining.is_empty())
            })?;
            if status.is_terminal() {
                return Ok(status);
            }
            if exhausted {
                debug!(%job_id, "scripted job never terminates");
                return std::future::pending().await;
            }
            tokio::time::sleep(self.step_delay).await;
        }
    }

    async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.step_delay;
        self.with_job(job_id, |job| match job.current {
            JobStatus::Completed => Ok(ExecutionResult::new(job.result.clone())
                .with_execution_time(u64::try_from(step.as_millis()).unwrap_or(u64::MAX))),
            ref other => Err(HalError::Backend(format!(
                "job {job_id} has no result in state {other}"
            ))),
        })?
    }

    async fn cancel(&self, job_id: &JobId) -> HalResult<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if !self.capabilities.supports_cancel {
            return Err(HalError::Unsupported(format!(
                "{} does not cancel jobs",
                self.name
            )));
        }
        self.with_job(job_id, |job| {
            if !job.current.is_terminal() {
                job.current = JobStatus::Cancelled;
                job.remaining.clear();
            }
        })
    }
}

#[async_trait]
impl Backend<SimpleCircuit> for SimulatedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    async fn validate(&self, circuit: &SimpleCircuit) -> HalResult<ValidationResult> {
        let unsupported: Vec<String> = circuit
            .gates
            .iter()
            .filter(|g| !SUPPORTED_GATES.contains(&g.as_str()))
            .map(|g| format!("Unsupported gate: {g}"))
            .collect();
        if unsupported.is_empty() {
            Ok(ValidationResult::Valid)
        } else {
            Ok(ValidationResult::Invalid {
                reasons: unsupported,
            })
        }
    }

    async fn submit(&self, request: &ExecutionRequest<SimpleCircuit>) -> HalResult<JobId> {
        if let Some(circuit) = request
            .circuits()
            .iter()
            .find(|c| c.num_qubits > self.capabilities.num_qubits)
        {
            return Err(HalError::CircuitTooLarge(format!(
                "Circuit requires {} qubits, backend has {}",
                circuit.num_qubits, self.capabilities.num_qubits
            )));
        }

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default();
        let result = script.result.unwrap_or_else(|| simulate(request));

        let id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).insert(
            id.clone(),
            SimJob {
                current: JobStatus::Queued,
                remaining: script.trajectory.into(),
                result,
            },
        );
        debug!(job_id = %id, circuits = request.circuits().len(), "submitted job");

        Ok(JobId::new(id))
    }
}
