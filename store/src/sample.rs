use chrono::{DateTime, Utc};
use serde::{ser::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Row id assigned by the store on insertion
pub type RecordId = i64;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("task_number must be at least 1")]
    InvalidTaskNumber,
    #[error("method_name must not be empty")]
    EmptyMethodName,
    #[error("thread_count must be at least 1")]
    ZeroThreads,
    #[error("execution_time_ns {0} does not fit the storage column")]
    ExecutionTimeOutOfRange(u64),
    #[error("operations_per_second must be finite and non-negative, got {0}")]
    InvalidThroughput(f64),
    #[error("parameters could not be serialized: {0}")]
    MalformedParameters(#[from] serde_json::Error),
    #[error("parameters must be a JSON object, got {0}")]
    ParametersNotAnObject(&'static str),
}

/// Open key/value mapping attached to a sample.
///
/// Backed by `serde_json::Map`, which keeps keys sorted, so the text produced by
/// [`Parameters::to_canonical_string`] is stable for equal mappings. The same
/// encoding is written to the store and to every export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // read through serde_yaml::Value so NaN and infinities are still visible
        let value = serde_yaml::Value::deserialize(deserializer)?;

        Self::from_serialize(&value).map_err(serde::de::Error::custom)
    }
}

impl Parameters {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// build parameters from any serializable value that encodes as a JSON object
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, SampleError> {
        match to_json_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SampleError::ParametersNotAnObject(json_kind(&other))),
        }
    }

    pub fn from_canonical_str(text: &str) -> Result<Self, SampleError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SampleError::ParametersNotAnObject(json_kind(&other))),
        }
    }

    pub fn to_canonical_string(&self) -> Result<String, SampleError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// add one serializable value, NaN and infinities are rejected
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Option<Value>, SampleError> {
        let value = to_json_value(value)?;

        Ok(self.0.insert(key.into(), value))
    }

    /// add a value that is already JSON
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn malformed(message: impl fmt::Display) -> SampleError {
    SampleError::MalformedParameters(serde_json::Error::custom(message))
}

/// serde_json encodes NaN and infinities as null, serde_yaml keeps them as numbers
fn to_json_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, SampleError> {
    let shadow = serde_yaml::to_value(value).map_err(malformed)?;
    if has_non_finite(&shadow) {
        return Err(malformed("parameters must not hold NaN or infinite numbers"));
    }

    Ok(serde_json::to_value(value)?)
}

fn has_non_finite(value: &serde_yaml::Value) -> bool {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Number(number) => number.as_f64().is_some_and(|number| !number.is_finite()),
        Yaml::Sequence(items) => items.iter().any(has_non_finite),
        Yaml::Mapping(map) => map
            .iter()
            .any(|(key, value)| has_non_finite(key) || has_non_finite(value)),
        Yaml::Tagged(tagged) => has_non_finite(&tagged.value),
        Yaml::Null | Yaml::Bool(_) | Yaml::String(_) => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn default_thread_count() -> u32 {
    1
}

/// One measured benchmark run, as handed to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub task_number: u32,
    pub task_name: String,
    pub method_name: String,
    pub execution_time_ns: u64,
    #[serde(default)]
    pub operations_per_second: Option<f64>,
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,
    #[serde(default)]
    pub parameters: Option<Parameters>,
    #[serde(default)]
    pub build_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Sample {
    pub fn new(
        task_number: u32,
        task_name: impl Into<String>,
        method_name: impl Into<String>,
        execution_time_ns: u64,
    ) -> Self {
        Self {
            task_number,
            task_name: task_name.into(),
            method_name: method_name.into(),
            execution_time_ns,
            operations_per_second: None,
            thread_count: 1,
            parameters: None,
            build_type: None,
            notes: None,
        }
    }

    pub fn with_throughput(mut self, operations_per_second: f64) -> Self {
        self.operations_per_second = Some(operations_per_second);
        self
    }

    pub fn with_threads(mut self, thread_count: u32) -> Self {
        self.thread_count = thread_count;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_build_type(mut self, build_type: impl Into<String>) -> Self {
        self.build_type = Some(build_type.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// check every invariant a stored row has to satisfy
    pub fn validate(&self) -> Result<(), SampleError> {
        if self.task_number == 0 {
            return Err(SampleError::InvalidTaskNumber);
        }
        if self.method_name.trim().is_empty() {
            return Err(SampleError::EmptyMethodName);
        }
        if self.thread_count == 0 {
            return Err(SampleError::ZeroThreads);
        }
        if i64::try_from(self.execution_time_ns).is_err() {
            return Err(SampleError::ExecutionTimeOutOfRange(self.execution_time_ns));
        }
        if let Some(ops) = self.operations_per_second {
            if !ops.is_finite() || ops < 0.0 {
                return Err(SampleError::InvalidThroughput(ops));
            }
        }

        Ok(())
    }

    /// validate and convert into the column values shared by all backends
    pub(crate) fn to_row(&self) -> Result<SampleRow<'_>, SampleError> {
        self.validate()?;

        let parameters = match &self.parameters {
            Some(parameters) => Some(parameters.to_canonical_string()?),
            None => None,
        };

        Ok(SampleRow {
            task_number: i32::try_from(self.task_number)
                .map_err(|_| SampleError::InvalidTaskNumber)?,
            task_name: &self.task_name,
            method_name: &self.method_name,
            parameters,
            execution_time_ns: i64::try_from(self.execution_time_ns)
                .map_err(|_| SampleError::ExecutionTimeOutOfRange(self.execution_time_ns))?,
            operations_per_second: self.operations_per_second,
            thread_count: i32::try_from(self.thread_count).map_err(|_| SampleError::ZeroThreads)?,
            build_type: self.build_type.as_deref(),
            notes: self.notes.as_deref(),
        })
    }
}

/// Sample converted into signed column types
#[derive(Debug)]
pub(crate) struct SampleRow<'a> {
    pub task_number: i32,
    pub task_name: &'a str,
    pub method_name: &'a str,
    pub parameters: Option<String>,
    pub execution_time_ns: i64,
    pub operations_per_second: Option<f64>,
    pub thread_count: i32,
    pub build_type: Option<&'a str>,
    pub notes: Option<&'a str>,
}

/// A persisted sample. Never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: Sample,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} task {} {} = {} ns",
            self.id, self.sample.task_number, self.sample.method_name, self.sample.execution_time_ns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_parameters_sort_keys() {
        let parameters = Parameters::from_serialize(&json!({
            "vector_size": 100000,
            "iterations": 100,
            "nested": {"b": 1, "a": [1, 2.5, "x"]}
        }))
        .unwrap();

        assert_eq!(
            parameters.to_canonical_string().unwrap(),
            r#"{"iterations":100,"nested":{"a":[1,2.5,"x"],"b":1},"vector_size":100000}"#
        );
    }

    #[test]
    fn parameters_must_be_an_object() {
        assert!(matches!(
            Parameters::from_serialize(&vec![1, 2, 3]),
            Err(SampleError::ParametersNotAnObject("an array"))
        ));
        assert!(matches!(
            Parameters::from_canonical_str("42"),
            Err(SampleError::ParametersNotAnObject("a number"))
        ));
    }

    #[test]
    fn non_string_keys_are_malformed() {
        let mut map = std::collections::BTreeMap::new();
        map.insert((1, 2), "tuple keys cannot become JSON");

        assert!(matches!(
            Parameters::from_serialize(&map),
            Err(SampleError::MalformedParameters(_))
        ));
    }

    #[test]
    fn non_finite_numbers_are_malformed() {
        let mut parameters = Parameters::new();
        assert!(parameters.insert("elements", &100_000).unwrap().is_none());

        assert!(matches!(
            parameters.insert("memory_mb", &f64::NAN),
            Err(SampleError::MalformedParameters(_))
        ));
        assert!(parameters.get("memory_mb").is_none());

        let mut nested = std::collections::BTreeMap::new();
        nested.insert("ratios", vec![0.5, f64::INFINITY]);
        assert!(matches!(
            Parameters::from_serialize(&nested),
            Err(SampleError::MalformedParameters(_))
        ));

        nested.insert("ratios", vec![0.5, -0.25]);
        assert_eq!(
            Parameters::from_serialize(&nested).unwrap().get("ratios"),
            Some(&json!([0.5, -0.25]))
        );
    }

    #[test]
    fn floats_survive_the_canonical_text() {
        let mut parameters = Parameters::new();
        parameters.insert("v", &1.079907802215119e-66).unwrap();

        let text = parameters.to_canonical_string().unwrap();
        assert_eq!(Parameters::from_canonical_str(&text).unwrap(), parameters);
    }

    #[test]
    fn validate_rejects_broken_samples() {
        let valid = Sample::new(2, "Vector erase", "remove_if_erase", 1_230_000);
        assert!(valid.validate().is_ok());

        assert!(matches!(
            Sample::new(0, "x", "m", 1).validate(),
            Err(SampleError::InvalidTaskNumber)
        ));
        assert!(matches!(
            Sample::new(1, "x", "  ", 1).validate(),
            Err(SampleError::EmptyMethodName)
        ));
        assert!(matches!(
            valid.clone().with_threads(0).validate(),
            Err(SampleError::ZeroThreads)
        ));
        assert!(matches!(
            Sample::new(1, "x", "m", u64::MAX).validate(),
            Err(SampleError::ExecutionTimeOutOfRange(_))
        ));
        assert!(matches!(
            valid.clone().with_throughput(f64::NAN).validate(),
            Err(SampleError::InvalidThroughput(_))
        ));
        assert!(matches!(
            valid.with_throughput(-1.0).validate(),
            Err(SampleError::InvalidThroughput(_))
        ));
    }

    #[test]
    fn record_serializes_flat() {
        let record = Record {
            id: 7,
            timestamp: DateTime::parse_from_rfc3339("2024-05-01T10:20:30.123Z")
                .unwrap()
                .with_timezone(&Utc),
            sample: Sample::new(3, "Mapping benchmark", "std::map", 15_000_000)
                .with_build_type("Release"),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["timestamp"], "2024-05-01T10:20:30.123Z");
        assert_eq!(value["execution_time_ns"], 15_000_000);
        assert_eq!(value["build_type"], "Release");
        assert_eq!(value["parameters"], Value::Null);
    }
}
