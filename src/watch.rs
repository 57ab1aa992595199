//! Job completion watcher.
//!
//! Drives a [`JobHandle`] to a terminal state over whichever mechanism the
//! backend offers:
//!
//! ```text
//!   terminal already? ──yes──→ return cached state (no backend call)
//!          │ no
//!   blocking wait offered? ──yes──→ wait_terminal()
//!          │ no                          │ Unsupported + pollable
//!          ▼                             ▼
//!   status() ──→ terminal? ──no──→ sleep(interval) ──→ interval *= backoff
//!                   │ yes
//!                   ▼
//!              TerminalState
//! ```
//!
//! Both paths run under the same timeout. A timeout drops the local wait
//! only; the remote job is left alone and may still finish.
//!
//! `Failed` and `Cancelled` are terminal states, not watcher errors. The
//! watcher's own failures are timeouts, handles with no completion
//! mechanism, and backend queries that error out.

use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use crate::backend::JobControl;
use crate::config::WatchPolicy;
use crate::error::{HalError, HalResult, RunError, RunResult};
use crate::job::{JobHandle, JobStatus, TerminalState};

/// Waits for jobs according to a [`WatchPolicy`].
#[derive(Debug, Clone)]
pub struct Watcher {
    policy: WatchPolicy,
}

impl Watcher {
    /// Create a watcher. Fails if the policy is invalid.
    pub fn new(policy: WatchPolicy) -> HalResult<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    /// Policy in use.
    pub fn policy(&self) -> &WatchPolicy {
        &self.policy
    }

    /// Wait until `handle` reaches a terminal state.
    ///
    /// Calling this again on a terminal handle returns the same state
    /// without contacting the backend.
    #[instrument(skip_all, fields(label = handle.label(), job_id = %handle.id()))]
    pub async fn await_completion<B>(
        &self,
        backend: &B,
        handle: &mut JobHandle,
    ) -> RunResult<TerminalState>
    where
        B: JobControl + ?Sized,
    {
        if let Some(state) = handle.terminal() {
            debug!(%state, "handle already terminal");
            return Ok(state);
        }

        let modes = handle.modes();
        if !modes.is_usable() {
            return Err(RunError::MalformedHandle {
                label: handle.label().to_string(),
                job_id: handle.id().clone(),
            });
        }

        let timeout = self.policy.timeout();
        let waited = tokio::time::timeout(timeout, self.drive(backend, handle)).await;

        match waited {
            Ok(Ok(state)) => {
                info!(%state, "job reached terminal state");
                Ok(state)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(
                    ?timeout,
                    status = %handle.status(),
                    "gave up waiting; job left running on the backend"
                );
                Err(RunError::Timeout {
                    label: handle.label().to_string(),
                    job_id: handle.id().clone(),
                    waited: timeout,
                })
            }
        }
    }

    /// Wait for several handles at once.
    ///
    /// Every handle is driven to completion (or failure) before this
    /// returns; results line up with `handles`.
    pub async fn await_all<B>(
        &self,
        backend: &B,
        handles: &mut [JobHandle],
    ) -> Vec<RunResult<TerminalState>>
    where
        B: JobControl + ?Sized,
    {
        join_all(
            handles
                .iter_mut()
                .map(|handle| self.await_completion(backend, handle)),
        )
        .await
    }

    /// Ask the backend to cancel a job.
    ///
    /// Handles whose backend did not advertise cancellation are refused with
    /// `Unsupported` without contacting the backend.
    /// The handle only becomes `Cancelled` once the backend reports it;
    /// the returned status is whatever the backend said after the request.
    /// Blocking-only handles cannot be asked, so their status is unchanged
    /// until the next [`await_completion`](Self::await_completion).
    #[instrument(skip_all, fields(label = handle.label(), job_id = %handle.id()))]
    pub async fn cancel<B>(&self, backend: &B, handle: &mut JobHandle) -> RunResult<JobStatus>
    where
        B: JobControl + ?Sized,
    {
        if handle.terminal().is_some() {
            return Ok(handle.status().clone());
        }
        if !handle.cancellable() {
            return Err(query_error(
                handle,
                HalError::Unsupported(format!("cancelling job {}", handle.id())),
            ));
        }

        backend
            .cancel(handle.id())
            .await
            .map_err(|source| query_error(handle, source))?;
        debug!("cancel requested");

        if !handle.modes().pollable {
            return Ok(handle.status().clone());
        }

        let status = backend
            .status(handle.id())
            .await
            .map_err(|source| query_error(handle, source))?;
        if status == JobStatus::Cancelled {
            handle.observe(status.clone());
            info!("backend confirmed cancellation");
        }
        Ok(status)
    }

    async fn drive<B>(&self, backend: &B, handle: &mut JobHandle) -> RunResult<TerminalState>
    where
        B: JobControl + ?Sized,
    {
        if handle.modes().blocking {
            let waited = backend.wait_terminal(handle.id()).await;
            match waited {
                Ok(status) => return settle_blocking(handle, status),
                Err(HalError::Unsupported(what)) if handle.modes().pollable => {
                    debug!(%what, "blocking wait unavailable, polling instead");
                }
                Err(source) => return Err(query_error(handle, source)),
            }
        }
        self.poll(backend, handle).await
    }

    async fn poll<B>(&self, backend: &B, handle: &mut JobHandle) -> RunResult<TerminalState>
    where
        B: JobControl + ?Sized,
    {
        let mut interval = self.policy.poll_interval();
        let mut polls: u32 = 0;

        loop {
            let status = backend
                .status(handle.id())
                .await
                .map_err(|source| query_error(handle, source))?;
            polls += 1;

            if handle.observe(status.clone()) {
                debug!(%status, polls, "status changed");
            }
            if let Some(state) = status.terminal() {
                return Ok(state);
            }

            sleep_for(interval).await;
            interval = self.policy.next_interval(interval);
        }
    }
}

impl Default for Watcher {
    fn default() -> Self {
        Self {
            policy: WatchPolicy::default(),
        }
    }
}

fn settle_blocking(handle: &mut JobHandle, status: JobStatus) -> RunResult<TerminalState> {
    match status.terminal() {
        Some(state) => {
            handle.observe(status);
            Ok(state)
        }
        None => Err(query_error(
            handle,
            HalError::Backend(format!("blocking wait returned non-terminal status {status}")),
        )),
    }
}

fn query_error(handle: &JobHandle, source: HalError) -> RunError {
    RunError::Backend {
        label: handle.label().to_string(),
        job_id: handle.id().clone(),
        source,
    }
}

async fn sleep_for(interval: Duration) {
    debug!(?interval, "job not terminal, sleeping");
    tokio::time::sleep(interval).await;
}
