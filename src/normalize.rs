//! Result normalization.
//!
//! Turns whatever shape a backend returned into one ordered list of named
//! outcomes:
//!
//! | Request | Accepted raw shapes | Outcomes |
//! |---------|---------------------|----------|
//! | sampling, 1 circuit | `Counts`, `PerCircuit` (len 1) | 1 frequency table |
//! | sampling, C circuits | `PerCircuit` (len C) | C frequency tables |
//! | estimation, C × O | `Scalars` (len C·O), `PerCircuitEstimates` (len C, O each) | C·O scalar estimates, circuit-major |
//!
//! Anything else is a [`RunError::ResultShape`]; the normalizer never
//! guesses.

use serde::{Deserialize, Serialize};

use crate::error::{RunError, RunResult};
use crate::request::RequestShape;
use crate::result::{Counts, PubEstimates, RawResult};

/// One named result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Bitstring frequencies summing to the requested shots.
    FrequencyTable(Counts),
    /// An expectation value, with its standard error when the backend
    /// reported one.
    ScalarEstimate {
        /// Estimated value.
        value: f64,
        /// Standard error.
        std_error: Option<f64>,
    },
}

impl Outcome {
    /// Frequency table, if this is one.
    pub fn as_counts(&self) -> Option<&Counts> {
        match self {
            Outcome::FrequencyTable(counts) => Some(counts),
            Outcome::ScalarEstimate { .. } => None,
        }
    }

    /// Estimated value, if this is a scalar estimate.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Outcome::ScalarEstimate { value, .. } => Some(*value),
            Outcome::FrequencyTable(_) => None,
        }
    }
}

/// Ordered `(label, outcome)` pairs in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedResult {
    outcomes: Vec<(String, Outcome)>,
}

impl NormalizedResult {
    /// Iterate over (label, outcome) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.outcomes.iter().map(|(label, o)| (label.as_str(), o))
    }

    /// First outcome with the given label.
    pub fn get(&self, label: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, o)| o)
    }

    /// Labels in order.
    pub fn labels(&self) -> Vec<&str> {
        self.outcomes.iter().map(|(l, _)| l.as_str()).collect()
    }

    /// Number of outcomes.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Check if there are no outcomes.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Append another result's outcomes after this one's.
    pub fn extend(&mut self, other: NormalizedResult) {
        self.outcomes.extend(other.outcomes);
    }

    /// Consume into the underlying pairs.
    pub fn into_inner(self) -> Vec<(String, Outcome)> {
        self.outcomes
    }
}

impl IntoIterator for NormalizedResult {
    type Item = (String, Outcome);
    type IntoIter = std::vec::IntoIter<(String, Outcome)>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

impl FromIterator<NormalizedResult> for NormalizedResult {
    fn from_iter<I: IntoIterator<Item = NormalizedResult>>(iter: I) -> Self {
        let mut all = NormalizedResult::default();
        for part in iter {
            all.extend(part);
        }
        all
    }
}

/// Convert a raw backend result into labelled outcomes.
pub fn normalize(raw: &RawResult, shape: &RequestShape) -> RunResult<NormalizedResult> {
    let outcomes = match &shape.observable_labels {
        None => frequency_tables(raw, shape)?,
        Some(observables) => scalar_estimates(raw, shape, observables)?,
    };
    debug_assert_eq!(outcomes.len(), shape.expected_outcomes());
    Ok(NormalizedResult { outcomes })
}

fn frequency_tables(raw: &RawResult, shape: &RequestShape) -> RunResult<Vec<(String, Outcome)>> {
    let shots = shape.shots.ok_or_else(|| {
        RunError::shape(&shape.label, "sampling request carries no shot count")
    })?;
    let circuits = shape.circuit_labels.len();

    let tables: Vec<&Counts> = match raw {
        RawResult::Counts(counts) if circuits == 1 => vec![counts],
        RawResult::PerCircuit(tables) if tables.len() == circuits => tables.iter().collect(),
        RawResult::Counts(_) | RawResult::PerCircuit(_) => {
            return Err(RunError::shape(
                &shape.label,
                format!("{} for {circuits} circuit(s)", describe(raw)),
            ));
        }
        other => {
            return Err(RunError::shape(
                &shape.label,
                format!("expected frequency tables, got {}", other.shape_name()),
            ));
        }
    };

    shape
        .circuit_labels
        .iter()
        .zip(tables)
        .map(|(label, counts)| {
            check_table(counts, shots)
                .map_err(|detail| RunError::shape(&shape.label, format!("{label}: {detail}")))?;
            Ok((label.clone(), Outcome::FrequencyTable(counts.clone())))
        })
        .collect()
}

/// Keys must be bitstrings of one width (spaces separate registers) and
/// counts must sum to exactly `shots`.
fn check_table(counts: &Counts, shots: u32) -> Result<(), String> {
    let mut width = None;
    for (key, _) in counts.iter() {
        let bits = key.chars().filter(|&c| c != ' ').count();
        if bits == 0 || !key.chars().all(|c| matches!(c, '0' | '1' | ' ')) {
            return Err(format!("`{key}` is not a bitstring"));
        }
        match width {
            None => width = Some(key.len()),
            Some(w) if w != key.len() => {
                return Err(format!("bitstrings of width {w} and {} in one table", key.len()));
            }
            Some(_) => {}
        }
    }

    match counts.checked_total() {
        Some(total) if total == u64::from(shots) => Ok(()),
        Some(total) => Err(format!("counts sum to {total}, requested {shots} shots")),
        None => Err(format!("counts overflow, requested {shots} shots")),
    }
}

fn scalar_estimates(
    raw: &RawResult,
    shape: &RequestShape,
    observables: &[String],
) -> RunResult<Vec<(String, Outcome)>> {
    let circuits = shape.circuit_labels.len();
    let per_circuit = observables.len();

    // Circuit-major (value, std_error) pairs.
    let values: Vec<(f64, Option<f64>)> = match raw {
        RawResult::Scalars(values) if values.len() == circuits * per_circuit => {
            values.iter().map(|&v| (v, None)).collect()
        }
        RawResult::Scalars(values) => {
            return Err(RunError::shape(
                &shape.label,
                format!(
                    "{} scalars for {circuits} circuit(s) x {per_circuit} observable(s)",
                    values.len()
                ),
            ));
        }
        RawResult::PerCircuitEstimates(pubs) if pubs.len() == circuits => {
            let mut values = Vec::with_capacity(circuits * per_circuit);
            for (label, estimates) in shape.circuit_labels.iter().zip(pubs) {
                values.extend(pub_values(&shape.label, label, estimates, per_circuit)?);
            }
            values
        }
        RawResult::PerCircuitEstimates(pubs) => {
            return Err(RunError::shape(
                &shape.label,
                format!("{} estimate blocks for {circuits} circuit(s)", pubs.len()),
            ));
        }
        other => {
            return Err(RunError::shape(
                &shape.label,
                format!("expected expectation values, got {}", other.shape_name()),
            ));
        }
    };

    let labels = shape.circuit_labels.iter().flat_map(|circuit| {
        observables.iter().map(move |observable| {
            if per_circuit == 1 {
                circuit.clone()
            } else {
                format!("{circuit}/{observable}")
            }
        })
    });

    labels
        .zip(values)
        .map(|(label, (value, std_error))| {
            if !value.is_finite() {
                return Err(RunError::shape(
                    &shape.label,
                    format!("{label}: expectation value {value} is not finite"),
                ));
            }
            if let Some(std) = std_error {
                if !std.is_finite() || std < 0.0 {
                    return Err(RunError::shape(
                        &shape.label,
                        format!("{label}: standard error {std} is invalid"),
                    ));
                }
            }
            Ok((label, Outcome::ScalarEstimate { value, std_error }))
        })
        .collect()
}

fn pub_values(
    request: &str,
    circuit: &str,
    estimates: &PubEstimates,
    expected: usize,
) -> RunResult<Vec<(f64, Option<f64>)>> {
    if estimates.evs.len() != expected {
        return Err(RunError::shape(
            request,
            format!(
                "{circuit}: {} expectation values for {expected} observable(s)",
                estimates.evs.len()
            ),
        ));
    }
    match &estimates.stds {
        None => Ok(estimates.evs.iter().map(|&v| (v, None)).collect()),
        Some(stds) if stds.len() == expected => Ok(estimates
            .evs
            .iter()
            .zip(stds)
            .map(|(&v, &s)| (v, Some(s)))
            .collect()),
        Some(stds) => Err(RunError::shape(
            request,
            format!(
                "{circuit}: {} standard errors for {expected} observable(s)",
                stds.len()
            ),
        )),
    }
}

fn describe(raw: &RawResult) -> String {
    match raw {
        RawResult::PerCircuit(tables) => format!("{} frequency tables", tables.len()),
        other => format!("one {}", other.shape_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sampling(labels: &[&str], shots: u32) -> RequestShape {
        RequestShape {
            label: labels.join("+"),
            circuit_labels: labels.iter().map(|l| l.to_string()).collect(),
            observable_labels: None,
            shots: Some(shots),
        }
    }

    fn estimation(circuits: &[&str], observables: &[&str]) -> RequestShape {
        RequestShape {
            label: circuits.join("+"),
            circuit_labels: circuits.iter().map(|l| l.to_string()).collect(),
            observable_labels: Some(observables.iter().map(|l| l.to_string()).collect()),
            shots: None,
        }
    }

    #[test]
    fn test_single_counts() {
        let raw = RawResult::from_json(json!({"00": 48, "11": 52})).unwrap();
        let result = normalize(&raw, &sampling(&["circuit[0]"], 100)).unwrap();

        assert_eq!(result.len(), 1);
        let counts = result.get("circuit[0]").and_then(Outcome::as_counts).unwrap();
        assert_eq!(counts.get("00"), 48);
        assert_eq!(counts.get("11"), 52);
    }

    #[test]
    fn test_shot_sum_must_match() {
        let raw = RawResult::from_json(json!({"00": 45, "11": 52})).unwrap();
        let err = normalize(&raw, &sampling(&["bell"], 100)).unwrap_err();
        match err {
            RunError::ResultShape { label, detail } => {
                assert_eq!(label, "bell");
                assert!(detail.contains("97"), "{detail}");
            }
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_overflowing_counts_rejected() {
        let raw = RawResult::from_json(json!({"0": u64::MAX, "1": 101u64})).unwrap();
        let err = normalize(&raw, &sampling(&["circuit[0]"], 100)).unwrap_err();
        match err {
            RunError::ResultShape { detail, .. } => assert!(detail.contains("overflow"), "{detail}"),
            other => panic!("expected shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_bitstring_keys_rejected() {
        let shape = sampling(&["circuit[0]"], 100);

        let hex = RawResult::from_json(json!({"0x0": 48, "0x3": 52})).unwrap();
        assert!(matches!(
            normalize(&hex, &shape),
            Err(RunError::ResultShape { .. })
        ));

        let named = RawResult::from_json(json!({"evs": 100})).unwrap();
        assert!(matches!(
            normalize(&named, &shape),
            Err(RunError::ResultShape { .. })
        ));

        let empty_key = RawResult::Counts(Counts::from_pairs([("", 100)]));
        assert!(normalize(&empty_key, &shape).is_err());
    }

    #[test]
    fn test_mixed_widths_rejected() {
        let raw = RawResult::Counts(Counts::from_pairs([("00", 50), ("111", 50)]));
        let err = normalize(&raw, &sampling(&["bell"], 100)).unwrap_err();
        assert!(err.to_string().contains("width"), "{err}");
    }

    #[test]
    fn test_register_separated_keys_accepted() {
        let raw = RawResult::Counts(Counts::from_pairs([("01 1", 60), ("10 0", 40)]));
        let result = normalize(&raw, &sampling(&["two_registers"], 100)).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_per_circuit_counts_in_order() {
        let raw = RawResult::PerCircuit(vec![
            Counts::from_pairs([("0", 10)]),
            Counts::from_pairs([("1", 7), ("0", 3)]),
        ]);
        let result = normalize(&raw, &sampling(&["a", "b"], 10)).unwrap();
        assert_eq!(result.labels(), ["a", "b"]);
        assert_eq!(
            result.get("b").and_then(Outcome::as_counts).map(|c| c.get("1")),
            Some(7)
        );
    }

    #[test]
    fn test_table_count_must_match_circuits() {
        let raw = RawResult::Counts(Counts::from_pairs([("00", 10)]));
        assert!(normalize(&raw, &sampling(&["a", "b"], 10)).is_err());

        let raw = RawResult::PerCircuit(vec![Counts::from_pairs([("00", 10)])]);
        assert!(normalize(&raw, &sampling(&["a", "b"], 10)).is_err());
    }

    #[test]
    fn test_flat_scalars() {
        let raw = RawResult::from_json(json!([0.71, -0.13])).unwrap();
        let result = normalize(&raw, &estimation(&["ansatz"], &["ZZ", "XX"])).unwrap();

        let values: Vec<_> = result
            .iter()
            .map(|(label, o)| (label, o.as_scalar().unwrap()))
            .collect();
        assert_eq!(values, [("ansatz/ZZ", 0.71), ("ansatz/XX", -0.13)]);
    }

    #[test]
    fn test_flat_scalars_one_per_circuit() {
        let raw = RawResult::from_json(json!([0.71, -0.13])).unwrap();
        let result = normalize(
            &raw,
            &estimation(&["circuit[0]", "circuit[1]"], &["observable[0]"]),
        )
        .unwrap();

        let values: Vec<_> = result
            .iter()
            .map(|(label, o)| (label, o.as_scalar().unwrap()))
            .collect();
        assert_eq!(values, [("circuit[0]", 0.71), ("circuit[1]", -0.13)]);
    }

    #[test]
    fn test_scalars_are_circuit_major() {
        let raw = RawResult::Scalars(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let result = normalize(&raw, &estimation(&["c0", "c1"], &["A", "B", "C"])).unwrap();
        assert_eq!(
            result.labels(),
            ["c0/A", "c0/B", "c0/C", "c1/A", "c1/B", "c1/C"]
        );
        assert_eq!(result.get("c1/A").and_then(Outcome::as_scalar), Some(4.0));
    }

    #[test]
    fn test_single_observable_uses_circuit_label() {
        let raw = RawResult::Scalars(vec![0.5]);
        let result = normalize(&raw, &estimation(&["circuit[0]"], &["observable[0]"])).unwrap();
        assert_eq!(result.labels(), ["circuit[0]"]);
    }

    #[test]
    fn test_per_circuit_estimates_with_stds() {
        let raw = RawResult::from_json(json!([
            {"evs": [1.0, 0.02], "stds": [0.01, 0.03]},
            {"evs": [0.5, -0.5]}
        ]))
        .unwrap();
        let result = normalize(&raw, &estimation(&["a", "b"], &["ZZ", "XX"])).unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(
            result.get("a/XX"),
            Some(&Outcome::ScalarEstimate {
                value: 0.02,
                std_error: Some(0.03)
            })
        );
        assert_eq!(
            result.get("b/ZZ"),
            Some(&Outcome::ScalarEstimate {
                value: 0.5,
                std_error: None
            })
        );
    }

    #[test]
    fn test_estimate_length_mismatches_rejected() {
        let shape = estimation(&["a"], &["ZZ", "XX"]);

        assert!(normalize(&RawResult::Scalars(vec![0.1, 0.2, 0.3]), &shape).is_err());

        let short = RawResult::PerCircuitEstimates(vec![PubEstimates::new(vec![0.1])]);
        assert!(normalize(&short, &shape).is_err());

        let ragged_stds = RawResult::PerCircuitEstimates(vec![
            PubEstimates::new(vec![0.1, 0.2]).with_stds(vec![0.01]),
        ]);
        assert!(normalize(&ragged_stds, &shape).is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let shape = estimation(&["a"], &["ZZ"]);
        assert!(normalize(&RawResult::Scalars(vec![f64::NAN]), &shape).is_err());

        let negative = RawResult::PerCircuitEstimates(vec![
            PubEstimates::new(vec![0.1]).with_stds(vec![-0.01]),
        ]);
        assert!(normalize(&negative, &shape).is_err());
    }

    #[test]
    fn test_shape_kind_mismatch_rejected() {
        let counts = RawResult::Counts(Counts::from_pairs([("0", 10)]));
        let err = normalize(&counts, &estimation(&["a"], &["Z"])).unwrap_err();
        assert!(err.to_string().contains("counts"));

        let scalars = RawResult::Scalars(vec![0.3]);
        assert!(normalize(&scalars, &sampling(&["a"], 10)).is_err());
    }

    #[test]
    fn test_concatenation_preserves_order() {
        let first = normalize(
            &RawResult::Counts(Counts::from_pairs([("0", 4)])),
            &sampling(&["circuit[0]"], 4),
        )
        .unwrap();
        let second = normalize(
            &RawResult::Counts(Counts::from_pairs([("1", 4)])),
            &sampling(&["circuit[1]"], 4),
        )
        .unwrap();

        let all: NormalizedResult = [first, second].into_iter().collect();
        assert_eq!(all.labels(), ["circuit[0]", "circuit[1]"]);
    }
}
