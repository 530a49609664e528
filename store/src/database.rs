pub mod postgresql;
pub mod sqlite;
mod util;

use crate::{
    config::ConnectionConfig,
    sample::{Record, RecordId, Sample, SampleError},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Name of the single append-only table
pub const RESULTS_TABLE: &str = "benchmark_results";

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Store is not reachable: {0}")]
    Unavailable(String),
    #[error("SQLite error: {0}")]
    SQLite(#[from] rusqlite::Error),
    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),
    #[error("Sample rejected: {0}")]
    Rejected(#[from] SampleError),
    #[error("Stored row is malformed: {0}")]
    MalformedRow(String),
}

/// Bounded read of the most recent records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFilter {
    pub task_number: Option<u32>,
    pub build_type: Option<String>,
    pub limit: u32,
}

impl Default for ResultFilter {
    fn default() -> Self {
        Self {
            task_number: None,
            build_type: None,
            limit: 100,
        }
    }
}

impl ResultFilter {
    pub fn latest(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn for_task(task_number: u32, limit: u32) -> Self {
        Self {
            task_number: Some(task_number),
            limit,
            ..Self::default()
        }
    }

    pub fn with_build_type(mut self, build_type: impl Into<String>) -> Self {
        self.build_type = Some(build_type.into());
        self
    }
}

/// Summary of one (method, build type) group. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub method_name: String,
    pub build_type: Option<String>,
    pub count: u64,
    pub avg_time_ns: f64,
    pub min_time_ns: u64,
    pub max_time_ns: u64,
    pub avg_ops_per_sec: Option<f64>,
}

#[derive(Debug)]
/// All supported storage backends
/// (kept as a closed enum instead of dynamic dispatch, the set is known up front)
pub enum ConnectionAdapter {
    SQLite(sqlite::SQLiteStore),
    Postgres(postgresql::PostgresStore),
}

impl ConnectionAdapter {
    pub fn load(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        match config {
            ConnectionConfig::SQLite { .. } => Ok(Self::SQLite(sqlite::SQLiteStore::load(config)?)),
            ConnectionConfig::Postgres { .. } => {
                Ok(Self::Postgres(postgresql::PostgresStore::load(config)?))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::SQLite(store) => store.is_connected(),
            Self::Postgres(store) => store.is_connected(),
        }
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        match self {
            Self::SQLite(store) => store.close(),
            Self::Postgres(store) => store.close(),
        }
    }

    pub fn store(&mut self, sample: &Sample) -> Result<RecordId, ConnectionError> {
        match self {
            Self::SQLite(store) => store.store(sample),
            Self::Postgres(store) => store.store(sample),
        }
    }

    pub fn results(&mut self, filter: &ResultFilter) -> Result<Vec<Record>, ConnectionError> {
        match self {
            Self::SQLite(store) => store.results(filter),
            Self::Postgres(store) => store.results(filter),
        }
    }

    pub fn statistics(
        &mut self,
        task_number: u32,
        build_type: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        match self {
            Self::SQLite(store) => store.statistics(task_number, build_type),
            Self::Postgres(store) => store.statistics(task_number, build_type),
        }
    }

    pub fn compare(
        &mut self,
        task_number: u32,
        method_name: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        match self {
            Self::SQLite(store) => store.compare(task_number, method_name),
            Self::Postgres(store) => store.compare(task_number, method_name),
        }
    }
}

/// Result store facade.
///
/// Expected faults (unreachable backend, rejected sample, failed statement) are
/// logged here and surface as `false` or an empty vector from the plain
/// methods. The `try_*` variants hand the same error to the caller instead.
/// Nothing is retried and nothing is cached: every read goes to the backend.
///
/// Every operation takes `&mut self`; callers sharing one store have to
/// serialize access on their side.
#[derive(Debug)]
pub struct ResultStore {
    config: ConnectionConfig,
    adapter: Option<ConnectionAdapter>,
}

impl ResultStore {
    /// connect and apply the schema, failing if the backend is not reachable
    pub fn connect(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let adapter = ConnectionAdapter::load(config)?;
        info!(store = %config.describe(), "Connected to result store");

        Ok(Self {
            config: config.clone(),
            adapter: Some(adapter),
        })
    }

    /// connect, or fall back to an offline store that rejects every operation
    pub fn connect_or_offline(config: &ConnectionConfig) -> Self {
        match Self::connect(config) {
            Ok(store) => store,
            Err(error) => {
                warn!(
                    error = ?error,
                    store = %config.describe(),
                    "Result store unavailable, continuing without it: {error}"
                );

                Self::offline(config)
            }
        }
    }

    pub fn offline(config: &ConnectionConfig) -> Self {
        Self {
            config: config.clone(),
            adapter: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.adapter
            .as_ref()
            .map(ConnectionAdapter::is_connected)
            .unwrap_or(false)
    }

    /// drop the current connection (if any) and open a new one
    pub fn reconnect(&mut self) -> bool {
        if let Some(adapter) = self.adapter.take() {
            if let Err(error) = adapter.close() {
                debug!(error = ?error, "Closing stale connection failed: {error}");
            }
        }

        match ConnectionAdapter::load(&self.config) {
            Ok(adapter) => {
                info!(store = %self.config.describe(), "Reconnected to result store");
                self.adapter = Some(adapter);

                true
            }
            Err(error) => {
                error!(error = ?error, "Failed to reconnect to result store: {error}");

                false
            }
        }
    }

    pub fn close(&mut self) -> Result<(), ConnectionError> {
        match self.adapter.take() {
            Some(adapter) => adapter.close(),
            None => Ok(()),
        }
    }

    fn adapter(&mut self) -> Result<&mut ConnectionAdapter, ConnectionError> {
        match self.adapter.as_mut() {
            Some(adapter) if adapter.is_connected() => Ok(adapter),
            _ => Err(ConnectionError::Unavailable(self.config.describe())),
        }
    }

    pub fn try_save(&mut self, sample: &Sample) -> Result<RecordId, ConnectionError> {
        // reject before touching the backend, a bad sample is never half written
        sample.validate()?;

        self.adapter()?.store(sample)
    }

    /// append one sample, `false` if it was rejected or could not be written
    pub fn save(&mut self, sample: &Sample) -> bool {
        match self.try_save(sample) {
            Ok(id) => {
                debug!(id = id, method = %sample.method_name, "Saved sample");

                true
            }
            Err(error) => {
                error!(
                    error = ?error,
                    task = sample.task_number,
                    method = %sample.method_name,
                    "Failed to save sample: {error}"
                );

                false
            }
        }
    }

    pub fn try_query(&mut self, filter: &ResultFilter) -> Result<Vec<Record>, ConnectionError> {
        let adapter = self.adapter()?;
        if filter.limit == 0 {
            return Ok(Vec::new());
        }

        adapter.results(filter)
    }

    /// most recent records first, at most `filter.limit` of them
    pub fn query(&mut self, filter: &ResultFilter) -> Vec<Record> {
        self.try_query(filter).unwrap_or_else(|error| {
            error!(error = ?error, filter = ?filter, "Failed to query results: {error}");

            Vec::new()
        })
    }

    pub fn try_statistics(
        &mut self,
        task_number: u32,
        build_type: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        self.adapter()?.statistics(task_number, build_type)
    }

    /// per method (and build type) summaries for a task, fastest average first
    pub fn statistics(&mut self, task_number: u32, build_type: Option<&str>) -> Vec<AggregateStat> {
        self.try_statistics(task_number, build_type)
            .unwrap_or_else(|error| {
                error!(error = ?error, task = task_number, "Failed to compute statistics: {error}");

                Vec::new()
            })
    }

    pub fn try_compare(
        &mut self,
        task_number: u32,
        method_name: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        self.adapter()?.compare(task_number, method_name)
    }

    /// per (method, build type) summaries ordered for pairing by method
    pub fn compare(&mut self, task_number: u32, method_name: Option<&str>) -> Vec<AggregateStat> {
        self.try_compare(task_number, method_name)
            .unwrap_or_else(|error| {
                error!(error = ?error, task = task_number, "Failed to compare build types: {error}");

                Vec::new()
            })
    }
}

impl Drop for ResultStore {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            warn!(error = ?error, "Failed to close result store: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_store_short_circuits() {
        let mut store = ResultStore::offline(&ConnectionConfig::default());

        assert!(!store.is_connected());
        assert!(!store.save(&Sample::new(1, "weak_ptr::lock()", "CustomWeakPtr::lock()", 10)));
        assert!(store.query(&ResultFilter::latest(10)).is_empty());
        assert!(store.statistics(1, None).is_empty());
        assert!(store.compare(1, None).is_empty());
        assert!(matches!(
            store.try_query(&ResultFilter::latest(10)),
            Err(ConnectionError::Unavailable(_))
        ));
    }

    #[test]
    fn invalid_sample_is_rejected_before_the_backend() {
        let mut store = ResultStore::offline(&ConnectionConfig::default());

        // rejected as invalid even though the store is offline
        assert!(matches!(
            store.try_save(&Sample::new(1, "x", "", 10)),
            Err(ConnectionError::Rejected(SampleError::EmptyMethodName))
        ));
    }
}
