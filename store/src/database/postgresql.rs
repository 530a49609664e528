use super::{
    util::{RawRecord, RawStat},
    AggregateStat, ConnectionError, ResultFilter,
};
use crate::{
    config::ConnectionConfig,
    sample::{Record, RecordId, Sample},
};
use postgres::{Client, NoTls, Row};
use std::{fmt, time::Duration};
use tracing::{debug, error, info, trace};

pub struct PostgresStore {
    client: Client,
}

impl fmt::Debug for PostgresStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStore")
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl PostgresStore {
    pub fn load(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        match config {
            ConnectionConfig::Postgres {
                host,
                port,
                database,
                user,
                password,
                connect_timeout_secs,
            } => {
                let client = postgres::Config::new()
                    .host(host)
                    .port(*port)
                    .dbname(database)
                    .user(user)
                    .password(password)
                    .connect_timeout(Duration::from_secs(*connect_timeout_secs))
                    .application_name("benchlog")
                    .connect(NoTls)?;

                let mut store = Self { client };
                store.init()?;

                Ok(store)
            }
            other => Err(ConnectionError::Unavailable(format!(
                "{} is not a Postgres target",
                other.describe()
            ))),
        }
    }

    fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for statement in SQL_SCHEMA {
            match self.client.batch_execute(statement) {
                Ok(()) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, statement = statement, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::Postgres(error));
                }
            }

            counter += 1;
        }

        info!("Postgres schema ready");

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        match self.client.close() {
            Ok(()) => {
                info!("Closed Postgres connection");

                Ok(())
            }
            Err(error) => {
                error!(error = ?error, "Failed to close Postgres connection: {error}");

                Err(ConnectionError::Postgres(error))
            }
        }
    }

    pub fn store(&mut self, sample: &Sample) -> Result<RecordId, ConnectionError> {
        let values = sample.to_row()?;
        trace!("Inserting {values:?}...");

        let row = self.client.query_one(
            "INSERT INTO benchmark_results
             (timestamp, task_number, task_name, method_name, parameters,
              execution_time_ns, operations_per_second, thread_count, build_type, notes)
             VALUES (
                GREATEST(clock_timestamp(), (SELECT MAX(timestamp) FROM benchmark_results)),
                $1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id",
            &[
                &values.task_number,
                &values.task_name,
                &values.method_name,
                &values.parameters,
                &values.execution_time_ns,
                &values.operations_per_second,
                &values.thread_count,
                &values.build_type,
                &values.notes,
            ],
        )?;
        let id: i64 = row.try_get(0)?;

        debug!(id = id, "Inserted entry");

        Ok(id)
    }

    pub fn results(&mut self, filter: &ResultFilter) -> Result<Vec<Record>, ConnectionError> {
        let task_number = filter
            .task_number
            .map(i32::try_from)
            .transpose()
            .map_err(|_| ConnectionError::MalformedRow("task_number filter out of range".into()))?;
        let limit = i64::from(filter.limit);

        self.client
            .query(
                "SELECT id, timestamp, task_number, task_name, method_name, parameters,
                        execution_time_ns, operations_per_second, thread_count, build_type, notes
                 FROM benchmark_results
                 WHERE ($1::INTEGER IS NULL OR task_number = $1)
                   AND ($2::TEXT IS NULL OR build_type = $2)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT $3",
                &[&task_number, &filter.build_type, &limit],
            )?
            .iter()
            .map(|row| Record::try_from(raw_record(row)?))
            .collect()
    }

    pub fn statistics(
        &mut self,
        task_number: u32,
        build_type: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        self.grouped(
            "SELECT method_name, build_type, COUNT(*), AVG(execution_time_ns)::DOUBLE PRECISION,
                    MIN(execution_time_ns), MAX(execution_time_ns), AVG(operations_per_second)
             FROM benchmark_results
             WHERE task_number = $1 AND ($2::TEXT IS NULL OR build_type = $2)
             GROUP BY method_name, build_type
             ORDER BY build_type ASC NULLS LAST, AVG(execution_time_ns) ASC, method_name ASC",
            task_number,
            build_type,
        )
    }

    pub fn compare(
        &mut self,
        task_number: u32,
        method_name: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        self.grouped(
            "SELECT method_name, build_type, COUNT(*), AVG(execution_time_ns)::DOUBLE PRECISION,
                    MIN(execution_time_ns), MAX(execution_time_ns), AVG(operations_per_second)
             FROM benchmark_results
             WHERE task_number = $1 AND ($2::TEXT IS NULL OR method_name = $2)
             GROUP BY method_name, build_type
             ORDER BY method_name ASC, build_type ASC NULLS LAST",
            task_number,
            method_name,
        )
    }

    fn grouped(
        &mut self,
        query: &str,
        task_number: u32,
        narrow: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        let task_number = i32::try_from(task_number)
            .map_err(|_| ConnectionError::MalformedRow("task_number out of range".into()))?;

        self.client
            .query(query, &[&task_number, &narrow])?
            .iter()
            .map(|row| {
                AggregateStat::try_from(RawStat {
                    method_name: row.try_get(0)?,
                    build_type: row.try_get(1)?,
                    count: row.try_get(2)?,
                    avg_time_ns: row.try_get(3)?,
                    min_time_ns: row.try_get(4)?,
                    max_time_ns: row.try_get(5)?,
                    avg_ops_per_sec: row.try_get(6)?,
                })
            })
            .collect()
    }
}

fn raw_record(row: &Row) -> Result<RawRecord, ConnectionError> {
    Ok(RawRecord {
        id: row.try_get(0)?,
        timestamp: row.try_get(1)?,
        task_number: row.try_get(2)?,
        task_name: row.try_get(3)?,
        method_name: row.try_get(4)?,
        parameters: row.try_get(5)?,
        execution_time_ns: row.try_get(6)?,
        operations_per_second: row.try_get(7)?,
        thread_count: row.try_get(8)?,
        build_type: row.try_get(9)?,
        notes: row.try_get(10)?,
    })
}

// ref: https://www.postgresql.org/docs/current/sql-createtable.html
pub const SQL_SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS benchmark_results (
    id BIGSERIAL PRIMARY KEY,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),

    task_number INTEGER NOT NULL CHECK (task_number >= 1),
    task_name TEXT NOT NULL,
    method_name TEXT NOT NULL CHECK (length(method_name) > 0),
    parameters TEXT,

    execution_time_ns BIGINT NOT NULL CHECK (execution_time_ns >= 0),
    operations_per_second DOUBLE PRECISION,
    thread_count INTEGER NOT NULL DEFAULT 1 CHECK (thread_count >= 1),

    notes TEXT
);",
    // tables created before build types were tracked lack the column
    "ALTER TABLE benchmark_results ADD COLUMN IF NOT EXISTS build_type TEXT;",
    "CREATE INDEX IF NOT EXISTS idx_benchmark_results_task_time
    ON benchmark_results (task_number, timestamp);",
    "CREATE INDEX IF NOT EXISTS idx_benchmark_results_build_method
    ON benchmark_results (build_type, method_name);",
    "CREATE INDEX IF NOT EXISTS idx_benchmark_results_time
    ON benchmark_results (timestamp);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from_env() -> ConnectionConfig {
        crate::config::StoreConfig::default()
            .with_env_overrides()
            .expect("DB_* environment is valid")
            .database
    }

    #[test]
    #[ignore = "needs a running Postgres reachable through the DB_* environment"]
    fn postgres_round_trip() {
        let mut store = PostgresStore::load(&config_from_env()).unwrap();
        let sample = Sample::new(3, "Mapping benchmark", "std::unordered_map", 800_000)
            .with_build_type("Release")
            .with_throughput(1_250_000.0);

        let id = store.store(&sample).unwrap();
        let latest = store.results(&ResultFilter::for_task(3, 1)).unwrap();

        assert_eq!(latest[0].id, id);
        assert_eq!(latest[0].sample, sample);
    }

    #[test]
    fn unreachable_server_fails_fast() {
        let config = ConnectionConfig::Postgres {
            host: "127.0.0.1".to_owned(),
            // reserved port, nothing listens there
            port: 1,
            database: "benchlog".to_owned(),
            user: "benchlog".to_owned(),
            password: "benchlog".to_owned(),
            connect_timeout_secs: 1,
        };

        assert!(matches!(
            PostgresStore::load(&config),
            Err(ConnectionError::Postgres(_))
        ));
    }
}
