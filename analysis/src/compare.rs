use benchlog_store::{build, AggregateStat};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// The two build labels a comparison is drawn between
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPair {
    /// expected to be the faster build, speedup is relative to it
    pub reference: String,
    pub other: String,
}

impl Default for BuildPair {
    fn default() -> Self {
        Self::new(build::RELEASE, build::DEBUG)
    }
}

impl BuildPair {
    pub fn new(reference: impl Into<String>, other: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            other: other.into(),
        }
    }
}

/// Per-method comparison between the two builds of a [`BuildPair`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub method_name: String,
    pub reference: Option<AggregateStat>,
    pub other: Option<AggregateStat>,
    /// buckets of any further build label (or none), not part of the speedup
    pub others: Vec<AggregateStat>,
    /// other average divided by reference average
    pub speedup: Option<f64>,
}

impl ComparisonRow {
    pub fn is_reference_faster(&self) -> bool {
        self.speedup.is_some_and(|speedup| speedup > 1.0)
    }
}

fn speedup(reference: Option<&AggregateStat>, other: Option<&AggregateStat>) -> Option<f64> {
    let (reference, other) = (reference?, other?);

    if reference.count == 0 || other.count == 0 || reference.avg_time_ns <= 0.0 {
        return None;
    }

    Some(other.avg_time_ns / reference.avg_time_ns)
}

/// Group per-build statistics by method, in order of first appearance.
pub fn pair_builds(stats: &[AggregateStat], pair: &BuildPair) -> Vec<ComparisonRow> {
    stats
        .iter()
        .map(|stat| stat.method_name.as_str())
        .unique()
        .map(|method| {
            let mut row = ComparisonRow {
                method_name: method.to_owned(),
                reference: None,
                other: None,
                others: Vec::new(),
                speedup: None,
            };

            for stat in stats.iter().filter(|stat| stat.method_name == method) {
                match stat.build_type.as_deref() {
                    Some(label) if label == pair.reference && row.reference.is_none() => {
                        row.reference = Some(stat.clone())
                    }
                    Some(label) if label == pair.other && row.other.is_none() => {
                        row.other = Some(stat.clone())
                    }
                    _ => row.others.push(stat.clone()),
                }
            }

            row.speedup = speedup(row.reference.as_ref(), row.other.as_ref());
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(method: &str, build_type: Option<&str>, count: u64, avg_time_ns: f64) -> AggregateStat {
        AggregateStat {
            method_name: method.to_owned(),
            build_type: build_type.map(str::to_owned),
            count,
            avg_time_ns,
            min_time_ns: avg_time_ns as u64,
            max_time_ns: avg_time_ns as u64,
            avg_ops_per_sec: None,
        }
    }

    #[test]
    fn release_faster_than_debug() {
        let rows = pair_builds(
            &[
                stat("partition", Some("Debug"), 3, 25_000_000.0),
                stat("partition", Some("Release"), 2, 10_000_000.0),
            ],
            &BuildPair::default(),
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].speedup, Some(2.5));
        assert!(rows[0].is_reference_faster());
    }

    #[test]
    fn missing_or_empty_side_has_no_speedup() {
        let rows = pair_builds(
            &[
                stat("copy_to_new", Some("Release"), 4, 980_000.0),
                stat("iterators", Some("Debug"), 0, 0.0),
                stat("iterators", Some("Release"), 2, 100.0),
                stat("zero", Some("Debug"), 1, 10.0),
                stat("zero", Some("Release"), 1, 0.0),
            ],
            &BuildPair::default(),
        );

        assert_eq!(rows.iter().map(|row| row.speedup).collect::<Vec<_>>(), [None, None, None]);
        assert!(rows.iter().all(|row| !row.is_reference_faster()));
    }

    #[test]
    fn slower_reference_is_not_flagged() {
        let rows = pair_builds(
            &[
                stat("naive_erase", Some("Release"), 1, 200.0),
                stat("naive_erase", Some("Debug"), 1, 100.0),
            ],
            &BuildPair::default(),
        );

        assert_eq!(rows[0].speedup, Some(0.5));
        assert!(!rows[0].is_reference_faster());
    }

    #[test]
    fn extra_labels_are_kept_aside() {
        let rows = pair_builds(
            &[
                stat("std::map", Some("Debug"), 1, 300.0),
                stat("std::map", Some("RelWithDebInfo"), 1, 150.0),
                stat("std::map", None, 1, 120.0),
                stat("std::vector<pair>", Some("Release"), 1, 95.0),
                stat("std::map", Some("Release"), 1, 100.0),
            ],
            &BuildPair::default(),
        );

        let methods: Vec<_> = rows.iter().map(|row| row.method_name.as_str()).collect();
        assert_eq!(methods, ["std::map", "std::vector<pair>"]);
        assert_eq!(rows[0].speedup, Some(3.0));
        assert_eq!(rows[0].others.len(), 2);
        assert_eq!(rows[0].others[0].build_type.as_deref(), Some("RelWithDebInfo"));
    }

    #[test]
    fn custom_pair() {
        let rows = pair_builds(
            &[
                stat("std::map", Some("Release"), 1, 100.0),
                stat("std::map", Some("RelWithDebInfo"), 1, 150.0),
            ],
            &BuildPair::new("Release", "RelWithDebInfo"),
        );

        assert_eq!(rows[0].speedup, Some(1.5));
        assert!(rows[0].others.is_empty());
    }
}
