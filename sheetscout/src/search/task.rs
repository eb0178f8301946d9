use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::matcher::Matcher;
use crate::cancellation::CancellationToken;
use crate::config::RowContextPolicy;
use crate::errors::{SearchError, SearchResult};
use crate::metrics::FileStats;
use crate::reader::WorkbookSource;
use crate::results::{CellRef, MatchRecord, ScanOutcome};

/// What a task reports to the coordinator
#[derive(Debug)]
pub enum TaskEvent {
    Match(MatchRecord),
    /// Always the last event of a task that was not cancelled
    Finished {
        path: PathBuf,
        outcome: ScanOutcome,
        stats: FileStats,
    },
}

enum Completion {
    Done,
    Cancelled,
}

/// Searches one workbook.
///
/// A task owns its target path and never touches run-wide state: it reports
/// matches and its final outcome through the `emit` callback and nothing else.
/// Reader failures are caught here and turned into a `ScanOutcome::Failure`.
pub struct SearchTask {
    path: PathBuf,
    matcher: Matcher,
    row_context: RowContextPolicy,
    source: Arc<dyn WorkbookSource>,
    token: CancellationToken,
}

impl SearchTask {
    pub fn new(
        path: PathBuf,
        matcher: Matcher,
        row_context: RowContextPolicy,
        source: Arc<dyn WorkbookSource>,
        token: CancellationToken,
    ) -> Self {
        Self {
            path,
            matcher,
            row_context,
            source,
            token,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Runs the task to completion.
    ///
    /// Emits the file's matches in sheet, row, column order followed by exactly one
    /// `TaskEvent::Finished`, unless the run is cancelled, in which case the task
    /// stops at the next I/O boundary and emits nothing further.
    pub fn run(self, mut emit: impl FnMut(TaskEvent)) {
        if self.token.is_cancelled() {
            trace!("Skipping cancelled task: {}", self.path.display());
            return;
        }

        debug!("Searching workbook: {}", self.path.display());
        let mut stats = FileStats::default();
        let outcome = match self.search(&mut stats, &mut emit) {
            Ok(Completion::Done) => ScanOutcome::Success,
            Ok(Completion::Cancelled) => {
                debug!("Cancelled while searching: {}", self.path.display());
                return;
            }
            Err(e) => {
                warn!("Failed to search {}: {}", self.path.display(), e);
                ScanOutcome::Failure(failure_message(e))
            }
        };

        debug!(
            "Finished {}: {} matches in {} rows",
            self.path.display(),
            stats.matches,
            stats.rows
        );
        emit(TaskEvent::Finished {
            path: self.path,
            outcome,
            stats,
        });
    }

    fn search(
        &self,
        stats: &mut FileStats,
        emit: &mut impl FnMut(TaskEvent),
    ) -> SearchResult<Completion> {
        let mut workbook = self.source.open(&self.path)?;

        for sheet_name in workbook.sheet_names() {
            if self.token.is_cancelled() {
                return Ok(Completion::Cancelled);
            }

            let rows = workbook.sheet_rows(&sheet_name)?;
            stats.sheets += 1;
            trace!("Sheet '{}' has {} rows", sheet_name, rows.len());

            for row in rows {
                if self.token.is_cancelled() {
                    return Ok(Completion::Cancelled);
                }
                stats.rows += 1;
                stats.cells += row.cells.len() as u64;

                let cells: Vec<String> = row.cells.iter().map(|c| c.to_string()).collect();
                let matched_columns: Vec<u32> = cells
                    .iter()
                    .enumerate()
                    .filter(|(_, text)| self.matcher.is_match(text))
                    .map(|(i, _)| i as u32 + 1)
                    .collect();

                // Context needs the whole row, so a row's matches go out together
                for column in matched_columns {
                    let cell = CellRef::new(column, row.index);
                    trace!("Match at {}!{}", sheet_name, cell);
                    stats.matches += 1;
                    emit(TaskEvent::Match(MatchRecord {
                        file_path: self.path.clone(),
                        sheet_name: sheet_name.clone(),
                        cell,
                        cell_content: cells[column as usize - 1].clone(),
                        row_context: self.row_context.context(&cells, column),
                    }));
                }
            }
        }

        Ok(Completion::Done)
    }
}

fn failure_message(error: SearchError) -> String {
    match error {
        SearchError::FileAccess { message, .. } => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{CellValue, MemorySource, MemoryWorkbook};
    use crate::search::matcher::MatchMode;

    fn sample_source() -> Arc<dyn WorkbookSource> {
        let workbook = MemoryWorkbook::new().sheet(
            "Sheet1",
            vec![vec!["foo", "bar"], vec!["baz", "foobar"]],
        );
        Arc::new(MemorySource::new().with_workbook("A.xlsx", workbook))
    }

    fn run_task(
        source: Arc<dyn WorkbookSource>,
        path: &str,
        keyword: &str,
        mode: MatchMode,
        row_context: RowContextPolicy,
    ) -> Vec<TaskEvent> {
        let task = SearchTask::new(
            PathBuf::from(path),
            Matcher::new(keyword, mode).unwrap(),
            row_context,
            source,
            CancellationToken::new(),
        );
        let mut events = Vec::new();
        task.run(|event| events.push(event));
        events
    }

    fn matches(events: &[TaskEvent]) -> Vec<&MatchRecord> {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Match(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_literal_scenario() {
        let events = run_task(
            sample_source(),
            "A.xlsx",
            "foo",
            MatchMode::Literal,
            RowContextPolicy::AllCells,
        );
        let records = matches(&events);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].sheet_name, "Sheet1");
        assert_eq!(records[0].cell.to_string(), "A1");
        assert_eq!(records[0].cell_content, "foo");
        assert_eq!(records[0].row_context, "foo bar");

        assert_eq!(records[1].cell.to_string(), "B2");
        assert_eq!(records[1].cell_content, "foobar");
        assert_eq!(records[1].row_context, "baz foobar");

        match events.last().unwrap() {
            TaskEvent::Finished {
                path,
                outcome,
                stats,
            } => {
                assert_eq!(path, &PathBuf::from("A.xlsx"));
                assert_eq!(outcome, &ScanOutcome::Success);
                assert_eq!(stats.sheets, 1);
                assert_eq!(stats.rows, 2);
                assert_eq!(stats.cells, 4);
                assert_eq!(stats.matches, 2);
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn test_regex_scenario() {
        let events = run_task(
            sample_source(),
            "A.xlsx",
            "^ba",
            MatchMode::Regex,
            RowContextPolicy::AllCells,
        );
        let cells: Vec<String> = matches(&events)
            .iter()
            .map(|r| format!("{}={}", r.cell, r.cell_content))
            .collect();
        assert_eq!(cells, vec!["B1=bar", "A2=baz"]);
    }

    #[test]
    fn test_row_context_policies() {
        let skip_first = run_task(
            sample_source(),
            "A.xlsx",
            "foo",
            MatchMode::Literal,
            RowContextPolicy::SkipFirstColumn,
        );
        let records = matches(&skip_first);
        assert_eq!(records[0].row_context, "bar");
        assert_eq!(records[1].row_context, "foobar");

        let skip_matched = run_task(
            sample_source(),
            "A.xlsx",
            "foo",
            MatchMode::Literal,
            RowContextPolicy::SkipMatchedColumn,
        );
        let records = matches(&skip_matched);
        assert_eq!(records[0].row_context, "bar");
        assert_eq!(records[1].row_context, "baz");
    }

    #[test]
    fn test_every_match_in_a_row_gets_context() {
        let workbook = MemoryWorkbook::new().sheet("S", vec![vec!["foo1", "x", "foo2"]]);
        let source: Arc<dyn WorkbookSource> =
            Arc::new(MemorySource::new().with_workbook("B.xlsx", workbook));
        let events = run_task(
            source,
            "B.xlsx",
            "foo",
            MatchMode::Literal,
            RowContextPolicy::AllCells,
        );
        let records = matches(&events);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.row_context == "foo1 x foo2"));
        assert_eq!(records[1].cell.to_string(), "C1");
    }

    #[test]
    fn test_empty_cells_render_as_none() {
        let workbook = MemoryWorkbook::new().sheet(
            "S",
            vec![vec![CellValue::Empty, CellValue::from("key"), CellValue::Int(3)]],
        );
        let source: Arc<dyn WorkbookSource> =
            Arc::new(MemorySource::new().with_workbook("C.xlsx", workbook));
        let events = run_task(
            source,
            "C.xlsx",
            "key",
            MatchMode::Literal,
            RowContextPolicy::AllCells,
        );
        assert_eq!(matches(&events)[0].row_context, "None key 3");
    }

    #[test]
    fn test_sheet_order_is_preserved() {
        let workbook = MemoryWorkbook::new()
            .sheet("Zeta", vec![vec!["hit"]])
            .sheet("Alpha", vec![vec!["miss"], vec!["hit"]]);
        let source: Arc<dyn WorkbookSource> =
            Arc::new(MemorySource::new().with_workbook("D.xlsx", workbook));
        let events = run_task(
            source,
            "D.xlsx",
            "hit",
            MatchMode::Literal,
            RowContextPolicy::AllCells,
        );
        let located: Vec<String> = matches(&events)
            .iter()
            .map(|r| format!("{}!{}", r.sheet_name, r.cell))
            .collect();
        assert_eq!(located, vec!["Zeta!A1", "Alpha!A2"]);
    }

    #[test]
    fn test_open_failure_emits_only_failure() {
        let events = run_task(
            sample_source(),
            "missing.xlsx",
            "foo",
            MatchMode::Literal,
            RowContextPolicy::AllCells,
        );
        assert_eq!(events.len(), 1);
        match &events[0] {
            TaskEvent::Finished { outcome, .. } => {
                assert_eq!(
                    outcome,
                    &ScanOutcome::Failure("File is not a zip file".to_string())
                );
            }
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_mid_file_stops_matching() {
        let workbook = MemoryWorkbook::new()
            .sheet("Good", vec![vec!["foo"]])
            .unreadable_sheet("Bad", "malformed sheet xml")
            .sheet("Never", vec![vec!["foo"]]);
        let source: Arc<dyn WorkbookSource> =
            Arc::new(MemorySource::new().with_workbook("E.xlsx", workbook));
        let events = run_task(
            source,
            "E.xlsx",
            "foo",
            MatchMode::Literal,
            RowContextPolicy::AllCells,
        );

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], TaskEvent::Match(r) if r.sheet_name == "Good"));
        assert!(matches!(
            &events[1],
            TaskEvent::Finished { outcome: ScanOutcome::Failure(msg), .. } if msg == "malformed sheet xml"
        ));
    }

    #[test]
    fn test_cancelled_task_emits_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let task = SearchTask::new(
            PathBuf::from("A.xlsx"),
            Matcher::new("foo", MatchMode::Literal).unwrap(),
            RowContextPolicy::AllCells,
            sample_source(),
            token,
        );
        let mut events = Vec::new();
        task.run(|event| events.push(event));
        assert!(events.is_empty());
    }
}
