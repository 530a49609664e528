use benchlog_analysis::{
    comparison_sections,
    compare::BuildPair,
    export::{ExportError, ExportFormat, ExportOutcome},
    monitor::{CancellationToken, Monitor, MonitorError, DEFAULT_WINDOW},
    statistics_sections, table, tasks, DEFAULT_LIST_LIMIT, EXPORT_LIMIT,
};
use benchlog_store::{build, ConnectionError, ResultFilter, ResultStore, StoreConfig};
use clap::Parser;
use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    time::Duration,
};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// View, compare and export stored benchmark results
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// only this task
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=3))]
    task: Option<u32>,

    /// only this build type
    #[arg(short, long, value_parser = [build::RELEASE, build::DEBUG])]
    build: Option<String>,

    /// maximum number of records listed
    #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
    limit: u32,

    /// statistics by method
    #[arg(short, long)]
    stats: bool,

    /// compare Release against Debug
    #[arg(short, long)]
    compare: bool,

    /// export results instead of printing them
    #[arg(short, long, value_enum)]
    export: Option<ExportFormat>,

    /// export file, benchmark_results.<format> by default
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// keep refreshing the latest results
    #[arg(short, long)]
    watch: bool,

    /// refresh interval for --watch in seconds
    #[arg(short, long, default_value_t = 5)]
    interval: u64,

    /// store config (YAML), DB_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Error)]
enum ViewError {
    #[error("Failed to write output")]
    Output(#[from] io::Error),
    #[error("Failed to read the result store")]
    Store(#[from] ConnectionError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("Failed to install Ctrl+C handler")]
    Signal(#[from] ctrlc::Error),
}

fn watch(args: &Args, store: &mut ResultStore) -> Result<(), ViewError> {
    let filter = ResultFilter {
        task_number: args.task,
        build_type: args.build.clone(),
        limit: DEFAULT_WINDOW,
    };
    let mut monitor = Monitor::new(filter, Duration::from_secs(args.interval))?;

    let token = CancellationToken::new();
    let handler = token.clone();
    ctrlc::set_handler(move || handler.cancel())?;

    let mut out = io::stdout().lock();
    let summary = monitor.run(store, &token, &mut out)?;
    writeln!(out, "\nMonitoring stopped after {} refresh(es)", summary.refreshes)?;
    if summary.failed_refreshes > 0 {
        writeln!(out, "The store could not be read on {} refresh(es)", summary.failed_refreshes)?;
    }

    Ok(())
}

fn export(args: &Args, format: ExportFormat, store: &mut ResultStore) -> Result<(), ViewError> {
    let filter = ResultFilter {
        task_number: args.task,
        build_type: args.build.clone(),
        limit: EXPORT_LIMIT,
    };

    match format.export_from(store, &filter, args.output.as_deref())? {
        ExportOutcome::Written { path, rows } => {
            println!("Exported {rows} record(s) to {}", path.display())
        }
        ExportOutcome::NothingToExport => println!("No data to export"),
    }

    Ok(())
}

fn run(args: &Args, store: &mut ResultStore) -> Result<(), ViewError> {
    if args.watch {
        return watch(args, store);
    }

    let mut out = io::stdout().lock();

    if args.compare {
        let pair = BuildPair::default();
        let sections = comparison_sections(store, &tasks(args.task), &pair)?;
        table::write_comparison(&mut out, &sections, &pair)?;
    } else if args.stats {
        let build_type = args.build.as_deref();
        let sections = statistics_sections(store, &tasks(args.task), build_type)?;
        table::write_statistics(&mut out, &sections, build_type)?;
    } else if let Some(format) = args.export {
        drop(out);
        return export(args, format, store);
    } else {
        let filter = ResultFilter {
            task_number: args.task,
            build_type: args.build.clone(),
            limit: args.limit,
        };
        table::write_results(&mut out, &store.try_query(&filter)?)?;
    }

    out.flush()?;

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,benchlog_analysis=info")),
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

    let mut store = match ResultStore::connect(&config.database) {
        Ok(store) => store,
        Err(error) => {
            eprintln!(
                "Error: failed to connect to the result store at {}: {error}",
                config.database.describe()
            );
            eprintln!("Make sure the database is running and the DB_* settings are right");
            return ExitCode::FAILURE;
        }
    };

    match run(&args, &mut store) {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(error = ?error, "benchlog-view failed: {error}");
            ExitCode::FAILURE
        }
    }
}
