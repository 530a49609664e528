use crate::build_type::BuildTypeResolver;
use benchlog_store::{Parameters, Sample};
use serde::{Deserialize, Serialize};

fn default_thread_count() -> u32 {
    1
}

/// What a benchmark measured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum TaskOutcome {
    /// single wall clock duration
    Duration { time_ns: u64 },
    /// container workload measured per phase, lookup is the headline number
    Phased {
        insert_time_ns: u64,
        lookup_time_ns: u64,
        erase_time_ns: u64,
        memory_usage_bytes: u64,
    },
}

impl TaskOutcome {
    pub fn primary_time_ns(&self) -> u64 {
        match self {
            Self::Duration { time_ns } => *time_ns,
            Self::Phased { lookup_time_ns, .. } => *lookup_time_ns,
        }
    }

    /// values that do not fit a sample column and end up in its parameters
    fn secondary(&self) -> Vec<(&'static str, u64)> {
        match self {
            Self::Duration { .. } => Vec::new(),
            Self::Phased {
                insert_time_ns,
                erase_time_ns,
                memory_usage_bytes,
                ..
            } => vec![
                ("insert_time_ns", *insert_time_ns),
                ("erase_time_ns", *erase_time_ns),
                ("memory_usage_bytes", *memory_usage_bytes),
            ],
        }
    }
}

/// One measured run as a benchmark harness reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkRun {
    pub task_number: u32,
    pub task_name: String,
    pub method_name: String,
    pub outcome: TaskOutcome,
    #[serde(default)]
    pub parameters: Option<Parameters>,
    #[serde(default = "default_thread_count")]
    pub thread_count: u32,
    #[serde(default)]
    pub operations_per_second: Option<f64>,
    /// operation count, used to derive throughput when none is given
    #[serde(default)]
    pub operations: Option<u64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub build_type: Option<String>,
}

/// `operations / seconds`, absent for a zero duration
pub fn throughput(operations: u64, time_ns: u64) -> Option<f64> {
    if time_ns == 0 {
        return None;
    }

    Some(operations as f64 / (time_ns as f64 / 1e9))
}

impl BenchmarkRun {
    pub fn new(
        task_number: u32,
        task_name: impl Into<String>,
        method_name: impl Into<String>,
        outcome: TaskOutcome,
    ) -> Self {
        Self {
            task_number,
            task_name: task_name.into(),
            method_name: method_name.into(),
            outcome,
            parameters: None,
            thread_count: 1,
            operations_per_second: None,
            operations: None,
            notes: None,
            build_type: None,
        }
    }

    /// Flatten into a storable sample.
    ///
    /// An explicit build type on the run wins over `resolver`. Phase timings
    /// other than the primary one are merged into the parameters, keys given
    /// by the caller are kept.
    pub fn into_sample(self, resolver: &BuildTypeResolver) -> Sample {
        let time_ns = self.outcome.primary_time_ns();
        let operations_per_second = self
            .operations_per_second
            .or_else(|| self.operations.and_then(|operations| throughput(operations, time_ns)));

        let secondary = self.outcome.secondary();
        let parameters = if secondary.is_empty() {
            self.parameters
        } else {
            let mut parameters = self.parameters.unwrap_or_default();
            for (key, value) in secondary {
                if parameters.get(key).is_none() {
                    parameters.insert_value(key, value.into());
                }
            }

            Some(parameters)
        };

        let build_type = self.build_type.unwrap_or_else(|| resolver.resolve());

        Sample {
            task_number: self.task_number,
            task_name: self.task_name,
            method_name: self.method_name,
            execution_time_ns: time_ns,
            operations_per_second,
            thread_count: self.thread_count,
            parameters,
            build_type: Some(build_type),
            notes: self.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn derives_throughput_from_operations() {
        assert_eq!(throughput(100, 890_000), Some(100.0 / 0.00089));
        assert_eq!(throughput(1_000_000, 1_000_000_000), Some(1_000_000.0));
        assert_eq!(throughput(10, 0), None);

        let mut run = BenchmarkRun::new(2, "Vector erase", "partition", TaskOutcome::Duration { time_ns: 500_000_000 });
        run.operations = Some(100);
        let sample = run.into_sample(&BuildTypeResolver::fixed("Debug"));

        assert_eq!(sample.operations_per_second, Some(200.0));
        assert_eq!(sample.execution_time_ns, 500_000_000);
        assert_eq!(sample.build_type.as_deref(), Some("Debug"));
    }

    #[test]
    fn explicit_values_win() {
        let mut run = BenchmarkRun::new(1, "weak_ptr::lock()", "CustomWeakPtr::lock()", TaskOutcome::Duration { time_ns: 10 });
        run.operations = Some(5);
        run.operations_per_second = Some(42.0);
        run.build_type = Some("Release".into());

        let sample = run.into_sample(&BuildTypeResolver::fixed("Debug"));

        assert_eq!(sample.operations_per_second, Some(42.0));
        assert_eq!(sample.build_type.as_deref(), Some("Release"));
        assert_eq!(sample.parameters, None);
    }

    #[test]
    fn phased_outcome_keeps_lookup_as_primary() {
        let mut run = BenchmarkRun::new(
            3,
            "Mapping benchmark",
            "std::unordered_map",
            TaskOutcome::Phased {
                insert_time_ns: 1_500_000,
                lookup_time_ns: 800_000,
                erase_time_ns: 900_000,
                memory_usage_bytes: 4_096_000,
            },
        );
        run.parameters = Some(Parameters::from_serialize(&json!({"elements": 100000, "lookups": 1000000})).unwrap());
        run.operations = Some(1_000_000);

        let sample = run.into_sample(&BuildTypeResolver::fixed("Release"));
        let parameters = sample.parameters.unwrap();

        assert_eq!(sample.execution_time_ns, 800_000);
        assert_eq!(sample.operations_per_second, Some(1_000_000.0 / 0.0008));
        assert_eq!(parameters.len(), 5);
        assert_eq!(parameters.get("insert_time_ns"), Some(&json!(1_500_000)));
        assert_eq!(parameters.get("erase_time_ns"), Some(&json!(900_000)));
        assert_eq!(parameters.get("memory_usage_bytes"), Some(&json!(4_096_000)));
        assert_eq!(parameters.get("elements"), Some(&json!(100000)));
    }

    #[test]
    fn deserializes_harness_output() {
        let run: BenchmarkRun = serde_yaml::from_str(
            "task_number: 3\n\
             task_name: Mapping benchmark\n\
             method_name: std::map\n\
             thread_count: 2\n\
             outcome:\n  kind: phased\n  insert_time_ns: 1\n  lookup_time_ns: 2\n  erase_time_ns: 3\n  memory_usage_bytes: 4\n\
             parameters:\n  elements: 10\n",
        )
        .unwrap();

        assert_eq!(run.thread_count, 2);
        assert_eq!(run.outcome.primary_time_ns(), 2);
        assert_eq!(run.parameters.unwrap().get("elements"), Some(&json!(10)));
    }
}
