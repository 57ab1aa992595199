//! Execution submitter.
//!
//! Checks a request against the backend before anything is sent, then
//! hands it over exactly once:
//!
//! ```text
//!   provider matches backend?
//!     → token present               (hardware only)
//!     → request.validate()          (structure, bindings, shots)
//!     → capabilities()              (shot limit, width, estimation)
//!     → availability()
//!     → validate(circuit) for each  (backend-specific)
//!     → submit()                    (once; never retried)
//! ```
//!
//! Every rejection is a [`RunError::Submission`] carrying the request label.

use tracing::{debug, info, instrument};

use crate::backend::Backend;
use crate::config::ProviderConfig;
use crate::error::{HalError, HalResult, RunError, RunResult};
use crate::job::JobHandle;
use crate::request::{CircuitDescriptor, ExecutionRequest, RequestShape};

/// A submitted job together with what is needed to read its result.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Handle to await.
    pub handle: JobHandle,
    /// Snapshot of the request, for normalization.
    pub shape: RequestShape,
}

/// Sends requests to one backend on behalf of one provider account.
pub struct Submitter<'a, B: ?Sized> {
    backend: &'a B,
    provider: ProviderConfig,
}

impl<'a, B: ?Sized> Submitter<'a, B> {
    /// Create a submitter for `backend` using an explicit provider config.
    pub fn new(backend: &'a B, provider: ProviderConfig) -> Self {
        Self { backend, provider }
    }

    /// Backend requests are sent to.
    pub fn backend(&self) -> &'a B {
        self.backend
    }

    /// Provider configuration in use.
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Check and submit a request.
    #[instrument(skip_all, fields(label = %request.label()))]
    pub async fn submit<C>(&self, request: ExecutionRequest<C>) -> RunResult<Submission>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        self.check(&request)
            .await
            .map_err(|e| RunError::submission(request.label(), e))?;
        self.send(request).await
    }

    /// Submit each circuit of `request` as its own job.
    ///
    /// The whole request is checked before any job is sent. If a send
    /// fails, jobs already sent keep running and the error is returned.
    #[instrument(skip_all, fields(label = %request.label()))]
    pub async fn submit_each<C>(&self, request: ExecutionRequest<C>) -> RunResult<Vec<Submission>>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        self.check(&request)
            .await
            .map_err(|e| RunError::submission(request.label(), e))?;

        let parts = request.into_single_circuit_requests();
        let mut submissions = Vec::with_capacity(parts.len());
        for part in parts {
            submissions.push(self.send(part).await?);
        }
        Ok(submissions)
    }

    async fn check<C>(&self, request: &ExecutionRequest<C>) -> HalResult<()>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        if self.provider.backend != self.backend.name() {
            return Err(HalError::Configuration(format!(
                "provider targets `{}` but the backend is `{}`",
                self.provider.backend,
                self.backend.name()
            )));
        }

        let caps = self.backend.capabilities();
        if !caps.is_simulator {
            self.provider.require_token()?;
        }

        request.validate()?;

        if let Some(shots) = request.shots() {
            if shots > caps.max_shots {
                return Err(HalError::InvalidShots(format!(
                    "{shots} shots requested, {} allows at most {}",
                    caps.name, caps.max_shots
                )));
            }
        }
        if request.is_estimation() && !caps.supports_estimation {
            return Err(HalError::Unsupported(format!(
                "{} does not estimate observables",
                caps.name
            )));
        }
        for (i, circuit) in request.circuits().iter().enumerate() {
            if circuit.num_qubits() > caps.num_qubits {
                return Err(HalError::CircuitTooLarge(format!(
                    "{} requires {} qubits, backend has {}",
                    request.circuit_label(i),
                    circuit.num_qubits(),
                    caps.num_qubits
                )));
            }
        }

        let availability = self.backend.availability().await?;
        if !availability.is_available {
            return Err(HalError::BackendUnavailable(
                availability
                    .status_message
                    .unwrap_or_else(|| self.backend.name().to_string()),
            ));
        }

        for circuit in request.circuits() {
            self.backend.validate(circuit).await?.into_result()?;
        }
        debug!(
            queue_depth = ?availability.queue_depth,
            estimated_wait_secs = ?availability.estimated_wait_secs,
            "request passed checks"
        );
        Ok(())
    }

    async fn send<C>(&self, request: ExecutionRequest<C>) -> RunResult<Submission>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        let shape = request.shape();
        let job_id = self
            .backend
            .submit(&request)
            .await
            .map_err(|e| RunError::submission(&shape.label, e))?;
        info!(%job_id, label = %shape.label, backend = self.backend.name(), "job submitted");

        let caps = self.backend.capabilities();
        let handle = JobHandle::new(job_id, shape.label.clone(), caps.completion)
            .with_cancel(caps.supports_cancel);
        Ok(Submission { handle, shape })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{BackendAvailability, JobControl};
    use crate::capability::Capabilities;
    use crate::job::{CompletionModes, JobId, JobStatus};
    use crate::request::{Observable, ParameterBinding};
    use crate::result::ExecutionResult;
    use crate::sim::{SimpleCircuit, SimulatedBackend};
    use crate::watch::Watcher;

    fn bell() -> SimpleCircuit {
        SimpleCircuit::new(2, ["h", "cx", "measure"]).named("bell")
    }

    fn submitter(backend: &SimulatedBackend) -> Submitter<'_, SimulatedBackend> {
        Submitter::new(backend, ProviderConfig::new("simulator"))
    }

    fn rejection(err: RunError) -> HalError {
        match err {
            RunError::Submission { source, .. } => source,
            other => panic!("expected submission error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_queued_handle() {
        let backend = SimulatedBackend::new(4);
        let submission = submitter(&backend)
            .submit(ExecutionRequest::sample([bell()], 100))
            .await
            .unwrap();

        assert_eq!(*submission.handle.status(), JobStatus::Queued);
        assert_eq!(submission.handle.label(), "bell");
        assert_eq!(submission.handle.modes(), CompletionModes::BOTH);
        assert_eq!(submission.shape.shots, Some(100));
        assert_eq!(backend.submitted(), 1);
    }

    #[tokio::test]
    async fn test_provider_must_match_backend() {
        let backend = SimulatedBackend::new(4);
        let err = Submitter::new(&backend, ProviderConfig::new("scarlet"))
            .submit(ExecutionRequest::sample([bell()], 100))
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), HalError::Configuration(_)));
        assert_eq!(backend.submitted(), 0);
    }

    #[tokio::test]
    async fn test_wide_circuit_rejected_before_sending() {
        let backend = SimulatedBackend::new(2);
        let err = submitter(&backend)
            .submit(ExecutionRequest::sample([SimpleCircuit::new(5, ["h"])], 100))
            .await
            .unwrap_err();

        assert_eq!(err.label(), "circuit[0]");
        assert!(matches!(rejection(err), HalError::CircuitTooLarge(_)));
        assert_eq!(backend.submitted(), 0);
    }

    #[tokio::test]
    async fn test_shot_limits() {
        let backend = SimulatedBackend::with_capabilities(
            Capabilities::simulator(4).with_max_shots(1_000),
        );
        let submitter = submitter(&backend);

        let err = submitter
            .submit(ExecutionRequest::sample([bell()], 1_001))
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), HalError::InvalidShots(_)));

        let err = submitter
            .submit(ExecutionRequest::sample([bell()], 0))
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), HalError::InvalidShots(_)));
        assert_eq!(backend.submitted(), 0);
    }

    #[tokio::test]
    async fn test_estimation_needs_support() {
        let backend = SimulatedBackend::with_capabilities(
            Capabilities::simulator(4).with_estimation(false),
        );
        let err = submitter(&backend)
            .submit(ExecutionRequest::estimate([bell()], [Observable::pauli("ZZ")]))
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), HalError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_backend_validation_reasons_surface() {
        let backend = SimulatedBackend::new(4);
        let err = submitter(&backend)
            .submit(ExecutionRequest::sample([SimpleCircuit::new(2, ["h", "ecr"])], 10))
            .await
            .unwrap_err();
        match rejection(err) {
            HalError::InvalidCircuit(reason) => assert!(reason.contains("ecr")),
            other => panic!("expected invalid circuit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_bindings_rejected() {
        let backend = SimulatedBackend::new(4);
        let request = ExecutionRequest::sample([bell()], 10)
            .with_parameters([ParameterBinding::new().bind("theta", f64::INFINITY)]);
        let err = submitter(&backend).submit(request).await.unwrap_err();
        assert!(matches!(rejection(err), HalError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_submit_each_labels_and_order() {
        let backend = SimulatedBackend::new(4);
        let request = ExecutionRequest::sample(
            [bell(), SimpleCircuit::new(3, ["h"]), SimpleCircuit::new(1, ["x"])],
            64,
        );
        let submissions = submitter(&backend).submit_each(request).await.unwrap();

        let labels: Vec<_> = submissions.iter().map(|s| s.handle.label()).collect();
        assert_eq!(labels, ["bell", "circuit[1]", "circuit[2]"]);
        let ids: Vec<_> = submissions.iter().map(|s| s.handle.id().0.as_str()).collect();
        assert_eq!(ids, ["sim-1", "sim-2", "sim-3"]);
    }

    #[tokio::test]
    async fn test_submit_each_checks_everything_first() {
        let backend = SimulatedBackend::new(4);
        let request = ExecutionRequest::sample(
            [bell(), SimpleCircuit::new(2, ["ecr"]), bell()],
            64,
        );
        assert!(submitter(&backend).submit_each(request).await.is_err());
        assert_eq!(backend.submitted(), 0);
    }

    struct OfflineBackend {
        capabilities: Capabilities,
    }

    #[async_trait]
    impl JobControl for OfflineBackend {
        async fn status(&self, job_id: &JobId) -> HalResult<JobStatus> {
            Err(HalError::JobNotFound(job_id.0.clone()))
        }

        async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
            Err(HalError::JobNotFound(job_id.0.clone()))
        }
    }

    #[async_trait]
    impl Backend<SimpleCircuit> for OfflineBackend {
        fn name(&self) -> &str {
            "scarlet"
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }

        async fn availability(&self) -> HalResult<BackendAvailability> {
            Ok(BackendAvailability::unavailable("scheduled maintenance"))
        }

        async fn submit(&self, _request: &ExecutionRequest<SimpleCircuit>) -> HalResult<JobId> {
            panic!("offline backend must not receive jobs");
        }
    }

    #[tokio::test]
    async fn test_unavailable_backend_rejected() {
        let backend = OfflineBackend {
            capabilities: Capabilities::remote("scarlet", 32),
        };
        let provider = ProviderConfig::new("scarlet").with_token("t0ken");
        let err = Submitter::new(&backend, provider)
            .submit(ExecutionRequest::sample([bell()], 100))
            .await
            .unwrap_err();
        match rejection(err) {
            HalError::BackendUnavailable(msg) => assert_eq!(msg, "scheduled maintenance"),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hardware_needs_token() {
        let backend = OfflineBackend {
            capabilities: Capabilities::remote("scarlet", 32),
        };
        let err = Submitter::new(&backend, ProviderConfig::new("scarlet"))
            .submit(ExecutionRequest::sample([bell()], 100))
            .await
            .unwrap_err();
        assert!(matches!(rejection(err), HalError::AuthenticationFailed(_)));
    }

    /// Accepts jobs and cancel requests, but does not advertise cancel.
    struct QuietCancelBackend {
        capabilities: Capabilities,
        cancels: AtomicUsize,
    }

    #[async_trait]
    impl JobControl for QuietCancelBackend {
        async fn status(&self, _job_id: &JobId) -> HalResult<JobStatus> {
            Ok(JobStatus::Running)
        }

        async fn result(&self, job_id: &JobId) -> HalResult<ExecutionResult> {
            Err(HalError::JobNotFound(job_id.0.clone()))
        }

        async fn cancel(&self, _job_id: &JobId) -> HalResult<()> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Backend<SimpleCircuit> for QuietCancelBackend {
        fn name(&self) -> &str {
            "scarlet"
        }

        fn capabilities(&self) -> &Capabilities {
            &self.capabilities
        }

        async fn submit(&self, _request: &ExecutionRequest<SimpleCircuit>) -> HalResult<JobId> {
            Ok(JobId::new("scarlet-1"))
        }
    }

    #[tokio::test]
    async fn test_unadvertised_cancel_never_reaches_backend() {
        let backend = QuietCancelBackend {
            capabilities: Capabilities::remote("scarlet", 32).with_cancel(false),
            cancels: AtomicUsize::new(0),
        };
        let provider = ProviderConfig::new("scarlet").with_token("t0ken");
        let mut submission = Submitter::new(&backend, provider)
            .submit(ExecutionRequest::sample([bell()], 100))
            .await
            .unwrap();
        assert!(!submission.handle.cancellable());

        let err = Watcher::default()
            .cancel(&backend, &mut submission.handle)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Backend {
                source: HalError::Unsupported(_),
                ..
            }
        ));
        assert_eq!(backend.cancels.load(Ordering::SeqCst), 0);
        assert_eq!(*submission.handle.status(), JobStatus::Queued);
    }
}
