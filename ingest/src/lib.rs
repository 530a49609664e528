//! Flattening of measured benchmark runs into store samples.

pub mod build_type;
pub mod outcome;
pub mod recorder;

pub use build_type::BuildTypeResolver;
pub use outcome::{BenchmarkRun, TaskOutcome};
pub use recorder::{RecordSummary, Recorder};

use std::{io, path::PathBuf};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to read runs from {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read runs from stdin")]
    Stdin(#[source] io::Error),
    #[error("Failed to deserialize benchmark runs")]
    Deserialize(#[from] serde_yaml::Error),
}

/// Parse one run or a list of runs. YAML is a superset of JSON, so both are accepted.
pub fn parse_runs(content: &str) -> Result<Vec<BenchmarkRun>, IngestError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    // a list is decided on its shape, so field errors are reported for the run they belong to
    let parsed = serde_yaml::from_str::<serde_yaml::Value>(content).and_then(|value| match value {
        serde_yaml::Value::Sequence(_) => serde_yaml::from_value::<Vec<BenchmarkRun>>(value),
        single => serde_yaml::from_value::<BenchmarkRun>(single).map(|run| vec![run]),
    });

    match parsed {
        Ok(runs) => Ok(runs),
        Err(error) => {
            error!(error = ?error, "Failed to deserialize benchmark runs: {error}");

            Err(IngestError::Deserialize(error))
        }
    }
}
