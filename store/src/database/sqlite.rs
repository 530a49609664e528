use super::{
    util::{parse_timestamp, RawRecord, RawStat},
    AggregateStat, ConnectionError, ResultFilter,
};
use crate::{
    config::ConnectionConfig,
    sample::{Record, RecordId, Sample},
};
use rusqlite::{params, types::Type, Connection, Row};
use tracing::{debug, error, info, trace};

#[derive(Debug)]
pub struct SQLiteStore {
    connection: Connection,
}

impl SQLiteStore {
    pub fn load(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        match config {
            ConnectionConfig::SQLite { path } => {
                let connection = Connection::open(path)?;
                let mut store = Self { connection };
                store.init()?;

                Ok(store)
            }
            other => Err(ConnectionError::Unavailable(format!(
                "{} is not a SQLite target",
                other.describe()
            ))),
        }
    }

    fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for statement in SQL_SCHEMA {
            match self.connection.execute(statement, []) {
                Ok(_) => debug!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, statement = statement, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::SQLite(error));
                }
            };

            counter += 1;
        }

        info!("SQLite schema ready");

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .query_row("select 1", [], |_| Ok(()))
            .is_ok()
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        match self.connection.close() {
            Ok(()) => {
                info!("Closed SQLite connection");

                Ok(())
            }
            Err((_connection, error)) => {
                error!(error = ?error, "Failed to close SQLite connection: {error}");

                Err(ConnectionError::SQLite(error))
            }
        }
    }

    pub fn store(&mut self, sample: &Sample) -> Result<RecordId, ConnectionError> {
        let values = sample.to_row()?;
        trace!("Inserting {values:?}...");

        let id = self
            .connection
            .prepare_cached(
                "insert into benchmark_results
                 (timestamp, task_number, task_name, method_name, parameters,
                  execution_time_ns, operations_per_second, thread_count, build_type, notes)
                 values (
                    (select max(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), coalesce(max(timestamp), ''))
                     from benchmark_results),
                    ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 returning id",
            )?
            .query_row(
                params![
                    values.task_number,
                    values.task_name,
                    values.method_name,
                    values.parameters,
                    values.execution_time_ns,
                    values.operations_per_second,
                    values.thread_count,
                    values.build_type,
                    values.notes,
                ],
                |row| row.get(0),
            )?;

        debug!(id = id, "Inserted entry");

        Ok(id)
    }

    pub fn results(&mut self, filter: &ResultFilter) -> Result<Vec<Record>, ConnectionError> {
        let records = self
            .connection
            .prepare_cached(
                "select id, timestamp, task_number, task_name, method_name, parameters,
                        execution_time_ns, operations_per_second, thread_count, build_type, notes
                 from benchmark_results
                 where (?1 is null or task_number = ?1)
                   and (?2 is null or build_type = ?2)
                 order by timestamp desc, id desc
                 limit ?3",
            )?
            .query_map(
                params![filter.task_number, filter.build_type, filter.limit],
                raw_record,
            )?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(Record::try_from(result?)?);

                Ok::<Vec<Record>, ConnectionError>(init)
            })?;

        Ok(records)
    }

    pub fn statistics(
        &mut self,
        task_number: u32,
        build_type: Option<&str>,
    ) -> Result<Vec<AggregateStat>, ConnectionError> {
        self.grouped(
            "select method_name, build_type, count(*), avg(execution_time_ns),
                    min(execution_time_ns), max(execution_time_ns), avg(operations_per_second)
             from benchmark_results
             where task_number = ?1 and (?2 is null or build_type = ?2)
             group by method_name, build_type
             order by build_type asc nulls last, avg(execution_time_ns) asc, method_name asc",
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
            "select method_name, build_type, count(*), avg(execution_time_ns),
                    min(execution_time_ns), max(execution_time_ns), avg(operations_per_second)
             from benchmark_results
             where task_number = ?1 and (?2 is null or method_name = ?2)
             group by method_name, build_type
             order by method_name asc, build_type asc nulls last",
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
        let stats = self
            .connection
            .prepare_cached(query)?
            .query_map(params![task_number, narrow], |row| {
                Ok(RawStat {
                    method_name: row.get(0)?,
                    build_type: row.get(1)?,
                    count: row.get(2)?,
                    avg_time_ns: row.get(3)?,
                    min_time_ns: row.get(4)?,
                    max_time_ns: row.get(5)?,
                    avg_ops_per_sec: row.get(6)?,
                })
            })?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(AggregateStat::try_from(result?)?);

                Ok::<Vec<AggregateStat>, ConnectionError>(init)
            })?;

        Ok(stats)
    }
}

/// row mapper, a timestamp that does not parse fails the row like any other bad column
fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    let timestamp: String = row.get(1)?;
    let timestamp = parse_timestamp(&timestamp)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(error)))?;

    Ok(RawRecord {
        id: row.get(0)?,
        timestamp,
        task_number: row.get(2)?,
        task_name: row.get(3)?,
        method_name: row.get(4)?,
        parameters: row.get(5)?,
        execution_time_ns: row.get(6)?,
        operations_per_second: row.get(7)?,
        thread_count: row.get(8)?,
        build_type: row.get(9)?,
        notes: row.get(10)?,
    })
}

// ref: https://www.sqlite.org/lang_createtable.html
//      https://www.sqlite.org/lang_datefunc.html
pub const SQL_SCHEMA: [&str; 4] = [
    "create table if not exists benchmark_results (
    id integer primary key autoincrement,
    timestamp text not null default (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),

    task_number integer not null check (task_number >= 1),
    task_name text not null,
    method_name text not null check (length(method_name) > 0),
    parameters text,

    execution_time_ns integer not null check (execution_time_ns >= 0),
    operations_per_second real,
    thread_count integer not null default 1 check (thread_count >= 1),

    build_type text,
    notes text
);",
    "create index if not exists idx_benchmark_results_task_time
    on benchmark_results (task_number, timestamp);",
    "create index if not exists idx_benchmark_results_build_method
    on benchmark_results (build_type, method_name);",
    "create index if not exists idx_benchmark_results_time
    on benchmark_results (timestamp);",
];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
