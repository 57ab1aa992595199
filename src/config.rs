//! Explicit configuration.
//!
//! Nothing here is read from process-wide state behind the caller's back:
//! a [`ProviderConfig`] is built (from the environment, a file, or code) and
//! handed to the submitter; a [`WatchPolicy`] is handed to the watcher.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};

/// Environment variable naming the backend.
pub const ENV_BACKEND: &str = "JOBWATCH_BACKEND";
/// Environment variable holding the account name.
pub const ENV_ACCOUNT: &str = "JOBWATCH_ACCOUNT";
/// Environment variable holding the API token.
pub const ENV_TOKEN: &str = "JOBWATCH_TOKEN";
/// Environment variable holding the endpoint URL.
pub const ENV_ENDPOINT: &str = "JOBWATCH_ENDPOINT";

/// Which backend to talk to, and as whom.
///
/// The token is never serialized and never printed by `Debug`.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend name, e.g. `"simulator"`.
    pub backend: String,
    /// Account name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// API token.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    /// API endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ProviderConfig {
    /// Create a configuration for the named backend.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            account: None,
            token: None,
            endpoint: None,
        }
    }

    /// Read the configuration from `JOBWATCH_*` environment variables.
    pub fn from_env() -> HalResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HalResult<Self> {
        let backend = lookup(ENV_BACKEND)
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| HalError::Configuration(format!("{ENV_BACKEND} not set")))?;
        Ok(Self {
            backend,
            account: lookup(ENV_ACCOUNT),
            token: lookup(ENV_TOKEN),
            endpoint: lookup(ENV_ENDPOINT),
        })
    }

    /// Set the account name.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Set the API token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Token, or an authentication error if none was configured.
    pub fn require_token(&self) -> HalResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                HalError::AuthenticationFailed(format!("no token configured for {}", self.backend))
            })
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("backend", &self.backend)
            .field("account", &self.account)
            .field("token", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// How long and how often to wait for a job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchPolicy {
    /// Initial delay between status queries.
    pub poll_interval_ms: u64,
    /// Upper bound for the delay once backoff kicks in.
    pub max_poll_interval_ms: u64,
    /// Factor applied to the delay after every non-terminal poll.
    pub backoff: f64,
    /// Total wait budget for one await call.
    pub timeout_ms: u64,
}

impl WatchPolicy {
    /// Fixed-interval polling.
    pub fn fixed(poll_interval: Duration, timeout: Duration) -> Self {
        let interval = duration_ms(poll_interval);
        Self {
            poll_interval_ms: interval,
            max_poll_interval_ms: interval,
            backoff: 1.0,
            timeout_ms: duration_ms(timeout),
        }
    }

    /// Grow the poll interval by `factor` up to `max_interval`.
    pub fn with_backoff(mut self, factor: f64, max_interval: Duration) -> Self {
        self.backoff = factor;
        self.max_poll_interval_ms = duration_ms(max_interval);
        self
    }

    /// Replace the wait budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_ms(timeout);
        self
    }

    /// Initial poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Maximum poll interval.
    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    /// Total wait budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The delay to use after a poll that waited `current`.
    pub fn next_interval(&self, current: Duration) -> Duration {
        let max = self.max_poll_interval();
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff)
            .map_or(max, |next| next.min(max))
    }

    /// Reject policies that would spin or never grow sensibly.
    pub fn validate(&self) -> HalResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(HalError::Configuration(
                "poll interval must be positive".into(),
            ));
        }
        if !self.backoff.is_finite() || self.backoff < 1.0 {
            return Err(HalError::Configuration(format!(
                "backoff factor {} must be finite and >= 1.0",
                self.backoff
            )));
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(HalError::Configuration(
                "max poll interval is shorter than the poll interval".into(),
            ));
        }
        Ok(())
    }
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_poll_interval_ms: 30_000,
            backoff: 1.0,
            timeout_ms: 300_000,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Everything a run needs, loadable from one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Provider settings.
    pub provider: ProviderConfig,
    /// Watcher settings.
    #[serde(default)]
    pub watch: WatchPolicy,
}

impl RunConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> HalResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HalError::Configuration(format!("invalid run config: {e}")))?;
        config.watch.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> HalResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            HalError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }
}
