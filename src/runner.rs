//! End-to-end execution: submit, await, fetch, normalize.

use futures::future::join_all;
use tracing::{instrument, warn};

use crate::backend::{Backend, JobControl};
use crate::config::RunConfig;
use crate::error::{HalResult, RunError, RunResult};
use crate::job::{JobStatus, TerminalState};
use crate::normalize::{NormalizedResult, normalize};
use crate::request::{CircuitDescriptor, ExecutionRequest};
use crate::submit::{Submission, Submitter};
use crate::watch::Watcher;

/// Runs requests on one backend and returns normalized outcomes.
pub struct Runner<'a, B: ?Sized> {
    submitter: Submitter<'a, B>,
    watcher: Watcher,
}

impl<'a, B: ?Sized> Runner<'a, B> {
    /// Create a runner from a loaded configuration.
    pub fn new(backend: &'a B, config: RunConfig) -> HalResult<Self> {
        Ok(Self {
            watcher: Watcher::new(config.watch)?,
            submitter: Submitter::new(backend, config.provider),
        })
    }

    /// Assemble a runner from parts.
    pub fn from_parts(submitter: Submitter<'a, B>, watcher: Watcher) -> Self {
        Self { submitter, watcher }
    }

    /// Submitter in use.
    pub fn submitter(&self) -> &Submitter<'a, B> {
        &self.submitter
    }

    /// Watcher in use.
    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }

    /// Run one request as one job.
    pub async fn run<C>(&self, request: ExecutionRequest<C>) -> RunResult<NormalizedResult>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        let mut submission = self.submitter.submit(request).await?;
        self.collect(&mut submission).await
    }

    /// Run each circuit of `request` as its own job and concatenate the
    /// outcomes in circuit order.
    pub async fn run_each<C>(&self, request: ExecutionRequest<C>) -> RunResult<NormalizedResult>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        let mut submissions = self.submitter.submit_each(request).await?;
        join_all(submissions.iter_mut().map(|s| self.collect(s)))
            .await
            .into_iter()
            .collect::<RunResult<Vec<_>>>()
            .map(|parts| parts.into_iter().collect())
    }

    /// Run several independent requests concurrently.
    ///
    /// Results line up with `requests`; one request failing does not stop
    /// the others.
    pub async fn run_batch<C>(
        &self,
        requests: impl IntoIterator<Item = ExecutionRequest<C>>,
    ) -> Vec<RunResult<NormalizedResult>>
    where
        C: CircuitDescriptor,
        B: Backend<C>,
    {
        let mut submitted = Vec::new();
        for request in requests {
            submitted.push(self.submitter.submit(request).await);
        }
        join_all(submitted.into_iter().map(|submission| async move {
            let mut submission = submission?;
            self.collect(&mut submission).await
        }))
        .await
    }

    /// Ask the backend to cancel a submitted job.
    ///
    /// Refused without a backend call when the backend did not advertise
    /// cancellation at submission.
    pub async fn cancel(&self, submission: &mut Submission) -> RunResult<JobStatus>
    where
        B: JobControl,
    {
        self.watcher
            .cancel(self.submitter.backend(), &mut submission.handle)
            .await
    }

    /// Await a submitted job, fetch its result and normalize it.
    ///
    /// Safe to call again after a timeout; a terminal handle is not
    /// re-polled.
    #[instrument(skip_all, fields(label = %submission.shape.label, job_id = %submission.handle.id()))]
    pub async fn collect(&self, submission: &mut Submission) -> RunResult<NormalizedResult>
    where
        B: JobControl,
    {
        let backend = self.submitter.backend();
        let handle = &mut submission.handle;

        match self.watcher.await_completion(backend, handle).await? {
            TerminalState::Completed => {}
            TerminalState::Failed(reason) => {
                warn!(%reason, "job failed");
                return Err(RunError::JobFailure {
                    label: handle.label().to_string(),
                    job_id: handle.id().clone(),
                    reason,
                });
            }
            TerminalState::Cancelled => {
                warn!("job was cancelled");
                return Err(RunError::JobFailure {
                    label: handle.label().to_string(),
                    job_id: handle.id().clone(),
                    reason: "cancelled".into(),
                });
            }
        }

        let result = backend
            .result(handle.id())
            .await
            .map_err(|source| RunError::Backend {
                label: handle.label().to_string(),
                job_id: handle.id().clone(),
                source,
            })?;
        normalize(&result.raw, &submission.shape)
    }
}
