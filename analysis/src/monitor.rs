use crate::table::write_results;
use benchlog_store::{ResultFilter, ResultStore};
use chrono::Local;
use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{Clear, ClearType},
};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_WINDOW: u32 = 20;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Refresh interval must be positive")]
    ZeroInterval,
    #[error("Failed to render live view")]
    Render(#[from] io::Error),
}

/// Cloneable stop flag shared between the monitor and whoever stops it
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Polling,
    Waiting,
    Stopped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorSummary {
    pub refreshes: u64,
    /// rows shown by the last refresh
    pub last_rows: usize,
    /// refreshes where the store could not be read
    pub failed_refreshes: u64,
}

/// Polls the latest records and redraws them until cancelled
#[derive(Debug)]
pub struct Monitor {
    filter: ResultFilter,
    interval: Duration,
    clear_screen: bool,
    state: MonitorState,
}

impl Monitor {
    pub fn new(filter: ResultFilter, interval: Duration) -> Result<Self, MonitorError> {
        if interval.is_zero() {
            return Err(MonitorError::ZeroInterval);
        }

        Ok(Self {
            filter,
            interval,
            clear_screen: true,
            state: MonitorState::Idle,
        })
    }

    /// the latest [`DEFAULT_WINDOW`] records of `task_number` (all tasks if absent)
    pub fn latest(task_number: Option<u32>, interval: Duration) -> Result<Self, MonitorError> {
        let filter = ResultFilter {
            task_number,
            limit: DEFAULT_WINDOW,
            ..ResultFilter::default()
        };

        Self::new(filter, interval)
    }

    pub fn with_clear_screen(mut self, clear_screen: bool) -> Self {
        self.clear_screen = clear_screen;
        self
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn filter(&self) -> &ResultFilter {
        &self.filter
    }

    pub fn run<W: Write>(
        &mut self,
        store: &mut ResultStore,
        token: &CancellationToken,
        out: &mut W,
    ) -> Result<MonitorSummary, MonitorError> {
        let mut summary = MonitorSummary::default();
        self.state = MonitorState::Idle;
        info!(interval = ?self.interval, filter = ?self.filter, "Starting live view");

        while !token.is_cancelled() {
            self.state = MonitorState::Polling;
            let records = store.try_query(&self.filter);

            if self.clear_screen {
                queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
            }
            writeln!(
                out,
                "Updated: {} (every {} s, Ctrl+C to stop)",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                self.interval.as_secs_f64()
            )?;
            summary.refreshes += 1;
            match records {
                Ok(records) => {
                    write_results(out, &records)?;
                    summary.last_rows = records.len();
                    debug!(refresh = summary.refreshes, rows = records.len(), "Refreshed live view");
                }
                // an unreadable store must not look like an empty one
                Err(error) => {
                    writeln!(out, "Store unavailable: {error}")?;
                    summary.last_rows = 0;
                    summary.failed_refreshes += 1;
                    warn!(error = ?error, refresh = summary.refreshes, "Live view could not read the store: {error}");
                }
            }
            out.flush()?;

            self.state = MonitorState::Waiting;
            self.wait(token);
        }

        self.state = MonitorState::Stopped;
        info!(refreshes = summary.refreshes, "Live view stopped");

        Ok(summary)
    }

    /// sleep out the interval in short slices so a cancellation is seen quickly
    fn wait(&self, token: &CancellationToken) {
        let deadline = Instant::now() + self.interval;

        while !token.is_cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            thread::sleep(remaining.min(WAIT_SLICE));
        }
    }
}
