//! The event contract between the coordinator and whatever renders results.
//!
//! The coordinator is the only caller of an [`EventSink`], from a single thread per
//! run, and runs never overlap. Implementations still need `Send + Sync` because
//! the same sink is shared across consecutive runs.
//!
//! Call order for one run:
//! - `on_match` any number of times; records of one file arrive in sheet, row,
//!   column order, files interleave freely.
//! - `on_progress` once per finished file, `completed_files` strictly increasing.
//! - then exactly one terminal call: `on_completed` when the run finished, or
//!   `on_error` with [`SearchError::RunAborted`] under the fail-fast policy.
//!   Under the continue policy `on_error` carries a non-terminal
//!   [`SearchError::FileAccess`] per unreadable file and `on_completed` still ends
//!   the run.
//!
//! Just before the terminal call the coordinator hands over the run statistics
//! through `on_stats`, which sinks may ignore.
//!
//! A cancelled run simply stops calling the sink.

use std::sync::Mutex;

use crate::errors::SearchError;
use crate::metrics::ScanStats;
use crate::results::{MatchRecord, ProgressUpdate};

pub trait EventSink: Send + Sync {
    /// A match; `index` is its 0-based position in the run's arrival order
    fn on_match(&self, index: usize, record: MatchRecord);

    fn on_progress(&self, progress: ProgressUpdate);

    fn on_error(&self, error: SearchError);

    fn on_completed(&self, total_matches: usize);

    fn on_stats(&self, _stats: ScanStats) {}
}

/// Owned copy of a sink call
#[derive(Debug)]
pub enum ScanEvent {
    Match { index: usize, record: MatchRecord },
    Progress(ProgressUpdate),
    Error(SearchError),
    Completed { total_matches: usize },
}

impl ScanEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::Completed { .. } | ScanEvent::Error(SearchError::RunAborted { .. })
        )
    }
}

/// Records every call in order
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ScanEvent>>,
    stats: Mutex<Option<ScanStats>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ScanEvent) {
        // A poisoned lock still holds every event pushed before the panic
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.push(event);
    }

    /// Removes and returns everything collected so far
    pub fn take_events(&self) -> Vec<ScanEvent> {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *events)
    }

    /// Statistics of the last run that reached a terminal event
    pub fn take_stats(&self) -> Option<ScanStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for CollectingSink {
    fn on_match(&self, index: usize, record: MatchRecord) {
        self.push(ScanEvent::Match { index, record });
    }

    fn on_progress(&self, progress: ProgressUpdate) {
        self.push(ScanEvent::Progress(progress));
    }

    fn on_error(&self, error: SearchError) {
        self.push(ScanEvent::Error(error));
    }

    fn on_completed(&self, total_matches: usize) {
        self.push(ScanEvent::Completed { total_matches });
    }

    fn on_stats(&self, stats: ScanStats) {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner()) = Some(stats);
    }
}
