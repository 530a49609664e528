use super::{AggregateStat, ConnectionError};
use crate::sample::{Parameters, Record, Sample};
use chrono::{DateTime, Utc};

/// Columns of one result row as the backends hand them out
#[derive(Debug)]
pub(crate) struct RawRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub task_number: i32,
    pub task_name: String,
    pub method_name: String,
    pub parameters: Option<String>,
    pub execution_time_ns: i64,
    pub operations_per_second: Option<f64>,
    pub thread_count: i32,
    pub build_type: Option<String>,
    pub notes: Option<String>,
}

/// Columns of one grouped statistics row
#[derive(Debug)]
pub(crate) struct RawStat {
    pub method_name: String,
    pub build_type: Option<String>,
    pub count: i64,
    pub avg_time_ns: f64,
    pub min_time_ns: i64,
    pub max_time_ns: i64,
    pub avg_ops_per_sec: Option<f64>,
}

fn unsigned<T, U>(column: &'static str, value: T) -> Result<U, ConnectionError>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| {
        ConnectionError::MalformedRow(format!("{column} holds out of range value {value}"))
    })
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|timestamp| timestamp.with_timezone(&Utc))
}

impl TryFrom<RawRecord> for Record {
    type Error = ConnectionError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        // parameters are only decoded once the row is actually read back
        let parameters = raw
            .parameters
            .as_deref()
            .map(Parameters::from_canonical_str)
            .transpose()
            .map_err(|error| ConnectionError::MalformedRow(format!("parameters: {error}")))?;

        Ok(Record {
            id: raw.id,
            timestamp: raw.timestamp,
            sample: Sample {
                task_number: unsigned("task_number", raw.task_number)?,
                task_name: raw.task_name,
                method_name: raw.method_name,
                execution_time_ns: unsigned("execution_time_ns", raw.execution_time_ns)?,
                operations_per_second: raw.operations_per_second,
                thread_count: unsigned("thread_count", raw.thread_count)?,
                parameters,
                build_type: raw.build_type,
                notes: raw.notes,
            },
        })
    }
}

impl TryFrom<RawStat> for AggregateStat {
    type Error = ConnectionError;

    fn try_from(raw: RawStat) -> Result<Self, Self::Error> {
        Ok(AggregateStat {
            method_name: raw.method_name,
            build_type: raw.build_type,
            count: unsigned("count", raw.count)?,
            avg_time_ns: raw.avg_time_ns,
            min_time_ns: unsigned("min_time_ns", raw.min_time_ns)?,
            max_time_ns: unsigned("max_time_ns", raw.max_time_ns)?,
            avg_ops_per_sec: raw.avg_ops_per_sec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(parameters: Option<&str>, execution_time_ns: i64) -> RawRecord {
        RawRecord {
            id: 1,
            timestamp: parse_timestamp("2024-01-02T03:04:05.678Z").unwrap(),
            task_number: 2,
            task_name: "Vector erase".to_owned(),
            method_name: "partition".to_owned(),
            parameters: parameters.map(str::to_owned),
            execution_time_ns,
            operations_per_second: None,
            thread_count: 4,
            build_type: Some("Debug".to_owned()),
            notes: None,
        }
    }

    #[test]
    fn decodes_rows() {
        let record = Record::try_from(raw(Some(r#"{"vector_size":100000}"#), 890_000)).unwrap();

        assert_eq!(record.sample.thread_count, 4);
        assert_eq!(record.sample.execution_time_ns, 890_000);
        assert_eq!(
            record.sample.parameters.unwrap().get("vector_size"),
            Some(&serde_json::json!(100000))
        );
    }

    #[test]
    fn rejects_corrupt_rows() {
        assert!(matches!(
            Record::try_from(raw(Some("{not json"), 1)),
            Err(ConnectionError::MalformedRow(_))
        ));
        assert!(matches!(
            Record::try_from(raw(None, -5)),
            Err(ConnectionError::MalformedRow(_))
        ));
        assert!(parse_timestamp("yesterday").is_err());
    }
}
