//! Reporting over the result store: build comparison, text tables, CSV/JSON
//! export and a polling live view.

pub mod compare;
pub mod export;
pub mod format;
pub mod monitor;
pub mod table;

use benchlog_store::{AggregateStat, ConnectionError, ResultStore};
use compare::{pair_builds, BuildPair, ComparisonRow};

/// tasks reported on when none is selected
pub const KNOWN_TASKS: [u32; 3] = [1, 2, 3];
pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const EXPORT_LIMIT: u32 = 10_000;

/// `task` alone, or every known task
pub fn tasks(task: Option<u32>) -> Vec<u32> {
    match task {
        Some(task) => vec![task],
        None => KNOWN_TASKS.to_vec(),
    }
}

/// statistics for each task, tasks without data are kept with an empty list.
/// A store that cannot be read is an error, never an empty section.
pub fn statistics_sections(
    store: &mut ResultStore,
    tasks: &[u32],
    build_type: Option<&str>,
) -> Result<Vec<(u32, Vec<AggregateStat>)>, ConnectionError> {
    tasks
        .iter()
        .map(|&task| Ok((task, store.try_statistics(task, build_type)?)))
        .collect()
}

pub fn comparison_sections(
    store: &mut ResultStore,
    tasks: &[u32],
    pair: &BuildPair,
) -> Result<Vec<(u32, Vec<ComparisonRow>)>, ConnectionError> {
    tasks
        .iter()
        .map(|&task| Ok((task, pair_builds(&store.try_compare(task, None)?, pair))))
        .collect()
}
