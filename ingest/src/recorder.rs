use crate::{build_type::BuildTypeResolver, outcome::BenchmarkRun};
use benchlog_store::ResultStore;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub recorded: usize,
    pub failed: usize,
}

/// Flattens runs and hands them to the store. Never fails the caller.
#[derive(Debug)]
pub struct Recorder {
    store: ResultStore,
    resolver: BuildTypeResolver,
}

impl Recorder {
    pub fn new(store: ResultStore, resolver: BuildTypeResolver) -> Self {
        Self { store, resolver }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    pub fn store_mut(&mut self) -> &mut ResultStore {
        &mut self.store
    }

    pub fn into_store(self) -> ResultStore {
        self.store
    }

    /// `false` if the run was rejected or the store could not take it
    pub fn record(&mut self, run: BenchmarkRun) -> bool {
        let sample = run.into_sample(&self.resolver);
        debug!(task = sample.task_number, method = %sample.method_name, "Recording run");

        self.store.save(&sample)
    }

    pub fn record_all(&mut self, runs: impl IntoIterator<Item = BenchmarkRun>) -> RecordSummary {
        let summary = runs
            .into_iter()
            .fold(RecordSummary::default(), |mut summary, run| {
                if self.record(run) {
                    summary.recorded += 1;
                } else {
                    summary.failed += 1;
                }

                summary
            });

        if summary.failed > 0 {
            warn!(
                recorded = summary.recorded,
                failed = summary.failed,
                "Some runs were not recorded"
            );
        }

        summary
    }
}
