//! Execution requests.
//!
//! A request pairs one or more circuits with parameter bindings, a shot
//! count and, for estimation, a list of observables. Circuits are opaque:
//! the crate only needs their width and an optional display name, exposed
//! through [`CircuitDescriptor`].
//!
//! A request is consumed by submission. What the normalizer needs
//! afterwards (labels, shots, observable count) is captured in a
//! [`RequestShape`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{HalError, HalResult};

/// The slice of a circuit the crate looks at.
pub trait CircuitDescriptor: Send + Sync {
    /// Number of qubits the circuit acts on.
    fn num_qubits(&self) -> u32;

    /// Display name, if the caller gave one.
    fn name(&self) -> Option<&str> {
        None
    }
}

/// Values for a circuit's free parameters, keyed by parameter name.
///
/// Keys are plain strings (`"theta"`, `"p[0]"`), never parameter objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterBinding {
    values: FxHashMap<String, f64>,
}

impl ParameterBinding {
    /// Create an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a parameter.
    pub fn bind(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Iterate over (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.values.iter()
    }

    /// Number of bound parameters.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reject empty names and non-finite values.
    pub fn validate(&self) -> HalResult<()> {
        for (name, value) in &self.values {
            if name.trim().is_empty() {
                return Err(HalError::InvalidParameters(
                    "parameter name must not be empty".into(),
                ));
            }
            if !value.is_finite() {
                return Err(HalError::InvalidParameters(format!(
                    "parameter `{name}` bound to non-finite value {value}"
                )));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ParameterBinding {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// A weighted sum of Pauli strings, e.g. `1.0 * ZZ + 0.5 * XX`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observable {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// (Pauli string, coefficient) terms.
    pub terms: Vec<(String, f64)>,
}

impl Observable {
    /// Build an observable from (Pauli string, coefficient) terms.
    pub fn from_terms(terms: impl IntoIterator<Item = (impl Into<String>, f64)>) -> Self {
        Self {
            name: None,
            terms: terms.into_iter().map(|(p, c)| (p.into(), c)).collect(),
        }
    }

    /// Single Pauli string with unit coefficient, named after the string.
    pub fn pauli(pauli: impl Into<String>) -> Self {
        let pauli = pauli.into();
        Self {
            name: Some(pauli.clone()),
            terms: vec![(pauli, 1.0)],
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Number of qubits the observable acts on, if its terms agree.
    pub fn num_qubits(&self) -> Option<u32> {
        let first = self.terms.first()?.0.len();
        self.terms
            .iter()
            .all(|(p, _)| p.len() == first)
            .then(|| u32::try_from(first).ok())
            .flatten()
    }

    /// Reject empty, ragged or non-Pauli terms and non-finite coefficients.
    pub fn validate(&self) -> HalResult<()> {
        if self.terms.is_empty() {
            return Err(HalError::InvalidCircuit("observable has no terms".into()));
        }
        for (pauli, coeff) in &self.terms {
            if pauli.is_empty() || !pauli.chars().all(|c| matches!(c, 'I' | 'X' | 'Y' | 'Z')) {
                return Err(HalError::InvalidCircuit(format!(
                    "`{pauli}` is not a Pauli string"
                )));
            }
            if !coeff.is_finite() {
                return Err(HalError::InvalidCircuit(format!(
                    "coefficient of `{pauli}` is not finite"
                )));
            }
        }
        if self.num_qubits().is_none() {
            return Err(HalError::InvalidCircuit(
                "observable terms act on different numbers of qubits".into(),
            ));
        }
        Ok(())
    }
}

/// Work to hand to a backend in one submission.
#[derive(Debug, Clone)]
pub struct ExecutionRequest<C> {
    label: Option<String>,
    // Position of the first circuit in the request this one was split from.
    offset: usize,
    circuits: Vec<C>,
    parameters: Vec<ParameterBinding>,
    shots: Option<u32>,
    observables: Option<Vec<Observable>>,
}

impl<C: CircuitDescriptor> ExecutionRequest<C> {
    /// Sample every circuit `shots` times.
    pub fn sample(circuits: impl IntoIterator<Item = C>, shots: u32) -> Self {
        Self {
            label: None,
            offset: 0,
            circuits: circuits.into_iter().collect(),
            parameters: vec![],
            shots: Some(shots),
            observables: None,
        }
    }

    /// Estimate every observable on every circuit.
    ///
    /// Without [`with_shots`](Self::with_shots) the backend computes exact
    /// values.
    pub fn estimate(
        circuits: impl IntoIterator<Item = C>,
        observables: impl IntoIterator<Item = Observable>,
    ) -> Self {
        Self {
            label: None,
            offset: 0,
            circuits: circuits.into_iter().collect(),
            parameters: vec![],
            shots: None,
            observables: Some(observables.into_iter().collect()),
        }
    }

    /// Set the shot count. With observables this is a precision budget.
    pub fn with_shots(mut self, shots: u32) -> Self {
        self.shots = Some(shots);
        self
    }

    /// Set parameter bindings: one set for all circuits, or one per circuit.
    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = ParameterBinding>) -> Self {
        self.parameters = parameters.into_iter().collect();
        self
    }

    /// Name the request in errors and logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Circuits in submission order.
    pub fn circuits(&self) -> &[C] {
        &self.circuits
    }

    /// Parameter binding sets.
    pub fn parameters(&self) -> &[ParameterBinding] {
        &self.parameters
    }

    /// Parameter bindings that apply to circuit `index`.
    pub fn parameters_for(&self, index: usize) -> Option<&ParameterBinding> {
        match self.parameters.len() {
            0 => None,
            1 => self.parameters.first(),
            _ => self.parameters.get(index),
        }
    }

    /// Requested shots.
    pub fn shots(&self) -> Option<u32> {
        self.shots
    }

    /// Observables, for estimation requests.
    pub fn observables(&self) -> Option<&[Observable]> {
        self.observables.as_deref()
    }

    /// Check if this request estimates observables rather than sampling.
    pub fn is_estimation(&self) -> bool {
        self.observables.is_some()
    }

    /// Label for circuit `index`: its name, or `circuit[index]`.
    pub fn circuit_label(&self, index: usize) -> String {
        self.circuits
            .get(index)
            .and_then(|c| c.name())
            .map_or_else(
                || format!("circuit[{}]", index + self.offset),
                str::to_string,
            )
    }

    /// Label used in errors and logs for the request as a whole.
    pub fn label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        (0..self.circuits.len())
            .map(|i| self.circuit_label(i))
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Structural checks that need no backend.
    pub fn validate(&self) -> HalResult<()> {
        if self.circuits.is_empty() {
            return Err(HalError::InvalidCircuit("request contains no circuits".into()));
        }
        match (self.shots, &self.observables) {
            (Some(0), _) => return Err(HalError::InvalidShots("shots must be positive".into())),
            (None, None) => {
                return Err(HalError::InvalidShots(
                    "a sampling request needs a shot count".into(),
                ));
            }
            _ => {}
        }
        if let Some(observables) = &self.observables {
            if observables.is_empty() {
                return Err(HalError::InvalidCircuit(
                    "estimation request contains no observables".into(),
                ));
            }
            for (j, observable) in observables.iter().enumerate() {
                observable.validate()?;
                let width = observable.num_qubits().unwrap_or_default();
                for (i, circuit) in self.circuits.iter().enumerate() {
                    if circuit.num_qubits() != width {
                        return Err(HalError::InvalidCircuit(format!(
                            "{} acts on {width} qubits but {} has {}",
                            observable_label(observables, j),
                            self.circuit_label(i),
                            circuit.num_qubits()
                        )));
                    }
                }
            }
        }
        let sets = self.parameters.len();
        if sets > 1 && sets != self.circuits.len() {
            return Err(HalError::InvalidParameters(format!(
                "{sets} parameter sets for {} circuits; expected 0, 1 or one per circuit",
                self.circuits.len()
            )));
        }
        self.parameters.iter().try_for_each(ParameterBinding::validate)
    }

    /// Snapshot of what the normalizer needs once the request is consumed.
    pub fn shape(&self) -> RequestShape {
        RequestShape {
            label: self.label(),
            circuit_labels: (0..self.circuits.len())
                .map(|i| self.circuit_label(i))
                .collect(),
            observable_labels: self.observables.as_ref().map(|observables| {
                (0..observables.len())
                    .map(|j| observable_label(observables, j))
                    .collect()
            }),
            shots: self.shots,
        }
    }

    /// Split into one request per circuit, keeping each circuit's bindings
    /// and the shared shots and observables.
    pub fn into_single_circuit_requests(self) -> Vec<ExecutionRequest<C>> {
        let broadcast = (self.parameters.len() == 1).then(|| self.parameters[0].clone());
        let mut per_circuit = self.parameters.into_iter();
        let offset = self.offset;

        self.circuits
            .into_iter()
            .enumerate()
            .map(|(i, circuit)| {
                let parameters = match &broadcast {
                    Some(shared) => vec![shared.clone()],
                    None => per_circuit.next().into_iter().collect(),
                };
                ExecutionRequest {
                    label: None,
                    offset: offset + i,
                    circuits: vec![circuit],
                    parameters,
                    shots: self.shots,
                    observables: self.observables.clone(),
                }
            })
            .collect()
    }
}

fn observable_label(observables: &[Observable], index: usize) -> String {
    observables
        .get(index)
        .and_then(|o| o.name.clone())
        .unwrap_or_else(|| format!("observable[{index}]"))
}

/// What the normalizer needs to know about a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestShape {
    /// Label of the whole request.
    pub label: String,
    /// One label per circuit, submission order.
    pub circuit_labels: Vec<String>,
    /// One label per observable; `None` for sampling requests.
    pub observable_labels: Option<Vec<String>>,
    /// Requested shots.
    pub shots: Option<u32>,
}

impl RequestShape {
    /// Number of outcomes a well-formed result yields.
    pub fn expected_outcomes(&self) -> usize {
        let observables = self.observable_labels.as_ref().map_or(1, Vec::len);
        self.circuit_labels.len() * observables
    }
}
