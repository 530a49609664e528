use benchlog_store::{ConnectionError, Record, ResultFilter, ResultStore, SampleError};
use chrono::SecondsFormat;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info};

pub const CSV_HEADER: [&str; 9] = [
    "timestamp",
    "build_type",
    "task_number",
    "task_name",
    "method_name",
    "execution_time_ns",
    "operations_per_second",
    "thread_count",
    "parameters",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write export file {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write export")]
    Io(#[from] io::Error),
    #[error("Failed to encode CSV")]
    Csv(#[from] csv::Error),
    #[error("Failed to encode JSON")]
    Json(#[from] serde_json::Error),
    #[error("Record parameters could not be encoded")]
    Parameters(#[from] SampleError),
    #[error("Failed to read results to export")]
    Store(#[from] ConnectionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written { path: PathBuf, rows: usize },
    /// the query was empty, no file was created
    NothingToExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn default_file_name(self) -> &'static str {
        match self {
            Self::Csv => "benchmark_results.csv",
            Self::Json => "benchmark_results.json",
        }
    }

    pub fn write<W: Write>(self, out: W, records: &[Record]) -> Result<usize, ExportError> {
        match self {
            Self::Csv => write_csv(out, records),
            Self::Json => write_json(out, records),
        }
    }

    /// write `records` to `path` (or the default file name), nothing for an empty slice
    pub fn export(self, records: &[Record], path: Option<&Path>) -> Result<ExportOutcome, ExportError> {
        let path = path.unwrap_or_else(|| Path::new(self.default_file_name()));

        if records.is_empty() {
            debug!(format = ?self, "Nothing to export");
            return Ok(ExportOutcome::NothingToExport);
        }

        let rows = write_atomically(path, |file| self.write(BufWriter::new(file), records))?;
        info!(path = %path.display(), rows = rows, "Exported results");

        Ok(ExportOutcome::Written {
            path: path.to_path_buf(),
            rows,
        })
    }

    /// query `store` and export the result, a failed read is an error rather than nothing to export
    pub fn export_from(
        self,
        store: &mut ResultStore,
        filter: &ResultFilter,
        path: Option<&Path>,
    ) -> Result<ExportOutcome, ExportError> {
        let records = store.try_query(filter).map_err(|error| {
            error!(error = ?error, filter = ?filter, "Failed to read results to export: {error}");

            error
        })?;

        self.export(&records, path)
    }
}

/// Write through a temporary file in the target directory. `path` is only
/// replaced once `write` succeeded, a failure leaves no partial file behind.
fn write_atomically<F>(path: &Path, write: F) -> Result<usize, ExportError>
where
    F: FnOnce(&mut File) -> Result<usize, ExportError>,
{
    let create_error = |source: io::Error| ExportError::Create {
        path: path.to_path_buf(),
        source,
    };
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(directory).map_err(create_error)?;
    let rows = write(file.as_file_mut())?;
    file.persist(path).map_err(|error| create_error(error.error))?;

    Ok(rows)
}

fn timestamp(record: &Record) -> String {
    record.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// header plus one row per record, absent values as empty cells
pub fn write_csv<W: Write>(out: W, records: &[Record]) -> Result<usize, ExportError> {
    let mut writer = csv::WriterBuilder::new().from_writer(out);
    writer.write_record(CSV_HEADER)?;

    for record in records {
        let sample = &record.sample;
        let parameters = match &sample.parameters {
            Some(parameters) => parameters.to_canonical_string()?,
            None => "null".to_owned(),
        };

        writer.write_record([
            timestamp(record),
            sample.build_type.clone().unwrap_or_default(),
            sample.task_number.to_string(),
            sample.task_name.clone(),
            sample.method_name.clone(),
            sample.execution_time_ns.to_string(),
            sample
                .operations_per_second
                .map(|ops| ops.to_string())
                .unwrap_or_default(),
            sample.thread_count.to_string(),
            parameters,
        ])?;
    }

    writer.flush()?;

    Ok(records.len())
}

/// pretty printed array of records, same input gives the same bytes
pub fn write_json<W: Write>(mut out: W, records: &[Record]) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(&mut out, records)?;
    writeln!(out)?;
    out.flush()?;

    Ok(records.len())
}

pub fn export_csv(records: &[Record], path: Option<&Path>) -> Result<ExportOutcome, ExportError> {
    ExportFormat::Csv.export(records, path)
}

pub fn export_json(records: &[Record], path: Option<&Path>) -> Result<ExportOutcome, ExportError> {
    ExportFormat::Json.export(records, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use benchlog_store::{Parameters, Sample};
    use chrono::{DateTime, Utc};
    use serde_json::{json, Value};

    fn record(id: i64, sample: Sample) -> Record {
        Record {
            id,
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123Z")
                .unwrap()
                .with_timezone(&Utc),
            sample,
        }
    }

    fn records() -> Vec<Record> {
        vec![
            record(
                2,
                Sample::new(2, "Vector erase", "partition", 890_000)
                    .with_build_type("Release")
                    .with_throughput(112_359.55)
                    .with_parameters(
                        Parameters::from_serialize(&json!({"vector_size": 100000, "iterations": 100}))
                            .unwrap(),
                    ),
            ),
            record(1, Sample::new(1, "weak_ptr::lock()", "CustomWeakPtr::lock(), \"fast\"", 1_000)),
        ]
    }

    #[test]
    fn csv_layout() {
        let mut out = Vec::new();
        assert_eq!(write_csv(&mut out, &records()).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(
            lines[1],
            r#"2024-05-01T10:20:30.123Z,Release,2,Vector erase,partition,890000,112359.55,1,"{""iterations"":100,""vector_size"":100000}""#
        );
        assert_eq!(
            lines[2],
            r#"2024-05-01T10:20:30.123Z,,1,weak_ptr::lock(),"CustomWeakPtr::lock(), ""fast""",1000,,1,null"#
        );
    }

    #[test]
    fn json_is_nested_and_stable() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_json(&mut first, &records()).unwrap();
        write_json(&mut second, &records()).unwrap();

        assert_eq!(first, second);

        let value: Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(value[0]["timestamp"], "2024-05-01T10:20:30.123Z");
        assert_eq!(value[0]["parameters"]["vector_size"], 100000);
        assert_eq!(value[0]["execution_time_ns"], 890000);
        assert_eq!(value[1]["parameters"], Value::Null);
        assert_eq!(value[1]["operations_per_second"], Value::Null);
    }

    #[test]
    fn empty_export_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();

        for format in [ExportFormat::Csv, ExportFormat::Json] {
            let path = dir.path().join(format.default_file_name());

            assert_eq!(
                format.export(&[], Some(&path)).unwrap(),
                ExportOutcome::NothingToExport
            );
            assert!(!path.exists());
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let result = write_atomically(&path, |file| {
            file.write_all(b"timestamp,build_type\n2024-05-01")?;
            Err(ExportError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        });
        assert!(matches!(result, Err(ExportError::Io(_))));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // an earlier export stays intact
        std::fs::write(&path, "previous").unwrap();
        let result = write_atomically(&path, |file| {
            file.write_all(b"partial")?;
            Err(ExportError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        });
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn export_writes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        assert_eq!(
            export_json(&records(), Some(&path)).unwrap(),
            ExportOutcome::Written {
                path: path.clone(),
                rows: 2
            }
        );

        let written: Vec<Record> = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, records());
    }
}
