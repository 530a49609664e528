use benchlog_ingest::{parse_runs, BuildTypeResolver, IngestError, Recorder};
use benchlog_store::{ResultStore, StoreConfig};
use clap::Parser;
use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Record benchmark runs into the result store
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// YAML or JSON file with one run or a list of runs, stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// store config (YAML), DB_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// fail instead of skipping when the store is unreachable
    #[arg(long)]
    require_store: bool,
}

fn read_input(path: Option<&Path>) -> Result<String, IngestError> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| IngestError::Read {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut content = String::new();
            io::stdin()
                .read_to_string(&mut content)
                .map_err(IngestError::Stdin)?;

            Ok(content)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,benchlog_ingest=info,benchlog_store=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match StoreConfig::discover(args.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            error!(error = ?error, "Invalid store configuration: {error}");
            return ExitCode::FAILURE;
        }
    };

    let runs = match read_input(args.input.as_deref()).and_then(|content| parse_runs(&content)) {
        Ok(runs) => runs,
        Err(error) => {
            error!(error = ?error, "Could not load runs: {error}");
            return ExitCode::FAILURE;
        }
    };

    let store = ResultStore::connect_or_offline(&config.database);
    if !store.is_connected() {
        if args.require_store {
            error!(store = %config.database.describe(), "Result store is unreachable");
            return ExitCode::FAILURE;
        }

        warn!(runs = runs.len(), "Result store is unreachable, runs are not recorded");
        return ExitCode::SUCCESS;
    }

    let mut recorder = Recorder::new(store, BuildTypeResolver::from_env());
    let summary = recorder.record_all(runs);

    info!(recorded = summary.recorded, failed = summary.failed, "Done");
    println!("recorded {} run(s), {} failed", summary.recorded, summary.failed);

    if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
