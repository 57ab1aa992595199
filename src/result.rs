//! Raw execution results as a backend hands them back.
//!
//! Bitstring ordering: the rightmost bit corresponds to the
//! lowest-indexed qubit (OpenQASM 3 convention). For example,
//! the string `"01"` means qubit 0 measured `1` and qubit 1
//! measured `0`.
//!
//! Backends disagree on result shape. [`RawResult`] names the shapes this
//! crate understands; anything else is rejected by the normalizer.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Measurement counts from circuit execution.
///
/// Maps bitstrings to occurrence counts. Serializes as a flat JSON object,
/// e.g. `{"00": 48, "11": 52}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts {
    counts: FxHashMap<String, u64>,
}

impl Counts {
    /// Create empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create counts from an iterator of (bitstring, count) pairs.
    /// Duplicate bitstrings are accumulated (summed), consistent with `insert()`.
    pub fn from_pairs(iter: impl IntoIterator<Item = (impl Into<String>, u64)>) -> Self {
        let mut counts = Self::new();
        for (k, v) in iter {
            counts.insert(k, v);
        }
        counts
    }

    /// Insert a count for a bitstring.
    pub fn insert(&mut self, bitstring: impl Into<String>, count: u64) {
        let key = bitstring.into();
        *self.counts.entry(key).or_default() += count;
    }

    /// Get the count for a bitstring.
    pub fn get(&self, bitstring: &str) -> u64 {
        self.counts.get(bitstring).copied().unwrap_or(0)
    }

    /// Iterate over (bitstring, count) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.counts.iter()
    }

    /// Get the total number of shots, saturating at `u64::MAX`.
    pub fn total_shots(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |total, &count| total.saturating_add(count))
    }

    /// Total number of shots, or `None` if it does not fit in a `u64`.
    pub fn checked_total(&self) -> Option<u64> {
        self.counts
            .values()
            .try_fold(0u64, |total, &count| total.checked_add(count))
    }

    /// Get the most frequent bitstring.
    pub fn most_frequent(&self) -> Option<(&String, &u64)> {
        self.counts.iter().max_by_key(|&(_, count)| count)
    }

    /// Get probabilities for each bitstring.
    #[allow(clippy::cast_precision_loss)]
    pub fn probabilities(&self) -> FxHashMap<String, f64> {
        let total = self.total_shots() as f64;
        if total == 0.0 {
            return FxHashMap::default();
        }
        self.counts
            .iter()
            .map(|(k, &v)| (k.clone(), v as f64 / total))
            .collect()
    }

    /// Get sorted counts (by count descending, then bitstring).
    pub fn sorted(&self) -> Vec<(&String, &u64)> {
        let mut items: Vec<_> = self.counts.iter().collect();
        items.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        items
    }

    /// Get the number of unique bitstrings.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Check if counts are empty.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FromIterator<(String, u64)> for Counts {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (key, value) in iter {
            counts.insert(key, value);
        }
        counts
    }
}

/// Expectation values for one circuit, one entry per observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubEstimates {
    /// Expectation values.
    pub evs: Vec<f64>,
    /// Standard errors, parallel to `evs` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stds: Option<Vec<f64>>,
}

impl PubEstimates {
    /// Estimates without standard errors.
    pub fn new(evs: Vec<f64>) -> Self {
        Self { evs, stds: None }
    }

    /// Attach standard errors.
    pub fn with_stds(mut self, stds: Vec<f64>) -> Self {
        self.stds = Some(stds);
        self
    }
}

/// Shapes a backend may return.
///
/// Deserialization is untagged, so a JSON payload lands in whichever shape
/// it matches first; payloads matching none fail to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawResult {
    /// One flat frequency table.
    Counts(Counts),
    /// One frequency table per submitted circuit.
    PerCircuit(Vec<Counts>),
    /// A flat list of expectation values.
    Scalars(Vec<f64>),
    /// One block of expectation values per submitted circuit.
    PerCircuitEstimates(Vec<PubEstimates>),
}

impl RawResult {
    /// Parse a JSON payload into one of the known shapes.
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Short name of the shape, for diagnostics.
    pub fn shape_name(&self) -> &'static str {
        match self {
            RawResult::Counts(_) => "counts",
            RawResult::PerCircuit(_) => "per-circuit counts",
            RawResult::Scalars(_) => "scalar list",
            RawResult::PerCircuitEstimates(_) => "per-circuit estimates",
        }
    }
}

/// Result of a completed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Result payload.
    pub raw: RawResult,
    /// Execution time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    /// Additional metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ExecutionResult {
    /// Create a new execution result.
    pub fn new(raw: RawResult) -> Self {
        Self {
            raw,
            execution_time_ms: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Set the execution time.
    pub fn with_execution_time(mut self, time_ms: u64) -> Self {
        self.execution_time_ms = Some(time_ms);
        self
    }

    /// Set metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
