//! Bell-state walkthrough on the simulated backend.
//!
//! Samples a Bell circuit, then estimates ZZ and XX on it, printing the
//! normalized outcomes. Set `RUST_LOG=hal_jobwatch=debug` to watch the
//! polling; set `JOBWATCH_BACKEND` to name the simulated backend.

use std::time::Duration;

use hal_jobwatch::sim::{SimpleCircuit, SimulatedBackend};
use hal_jobwatch::{
    Backend, ExecutionRequest, Observable, Outcome, ProviderConfig, RunConfig, Runner,
    WatchPolicy,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let provider = ProviderConfig::from_env().unwrap_or_else(|_| ProviderConfig::new("simulator"));
    let backend = SimulatedBackend::from_config(&provider, 4)?;
    let config = RunConfig {
        provider,
        watch: WatchPolicy::fixed(Duration::from_millis(200), Duration::from_secs(30))
            .with_backoff(1.5, Duration::from_secs(2)),
    };
    let runner = Runner::new(&backend, config)?;

    let caps = Backend::<SimpleCircuit>::capabilities(&backend);
    println!("Backend: {}", caps.name);
    println!("Qubits:  {}", caps.num_qubits);
    println!();

    let bell = SimpleCircuit::new(2, ["h", "cx", "measure"]).named("bell");

    let sampled = runner
        .run(ExecutionRequest::sample([bell.clone()], 1000))
        .await?;
    println!("Counts:");
    for (label, outcome) in sampled.iter() {
        if let Some(counts) = outcome.as_counts() {
            println!("  {label}");
            for (bitstring, count) in counts.sorted() {
                println!("    {bitstring}: {count}");
            }
            if let Some((bitstring, count)) = counts.most_frequent() {
                let share = counts.probabilities().get(bitstring).copied().unwrap_or(0.0);
                println!("    most frequent: {bitstring} ({count}, {:.1}%)", share * 100.0);
            }
        }
    }
    println!();

    let estimated = runner
        .run(
            ExecutionRequest::estimate([bell], [Observable::pauli("ZZ"), Observable::pauli("XX")])
                .with_shots(4000),
        )
        .await?;
    println!("Expectation values:");
    for (label, outcome) in estimated.iter() {
        if let Outcome::ScalarEstimate { value, std_error } = outcome {
            match std_error {
                Some(err) => println!("  {label}: {value:+.3} ± {err:.3}"),
                None => println!("  {label}: {value:+.3}"),
            }
        }
    }

    Ok(())
}
