//! Durable storage for benchmark samples.
//!
//! Samples are appended to a single `benchmark_results` table (SQLite or
//! Postgres) and never modified afterwards. Reads return the latest records
//! or grouped per-method statistics computed by the backend on every call.

pub mod config;
pub mod database;
pub mod sample;

pub use config::{ConfigError, ConnectionConfig, StoreConfig};
pub use database::{AggregateStat, ConnectionError, ResultFilter, ResultStore, RESULTS_TABLE};
pub use sample::{Parameters, Record, RecordId, Sample, SampleError};

/// canonical build labels
pub mod build {
    pub const RELEASE: &str = "Release";
    pub const DEBUG: &str = "Debug";
}
