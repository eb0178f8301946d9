/// Result types produced by a scan.
///
/// A [`MatchRecord`] is created once per matching cell, never mutated, and handed by
/// value to the event sink. [`ProgressUpdate`] is a snapshot of the coordinator's
/// counters taken each time a file finishes. [`ScanSummary`] is what the blocking
/// [`search`](crate::search::search) call assembles from the event stream.
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::metrics::ScanStats;

/// Converts a 1-based column index to its spreadsheet letters (1 -> A, 27 -> AA)
pub fn column_letter(mut column: u32) -> String {
    let mut letters = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        column = (column - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Address of a cell, both indices 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub fn new(column: u32, row: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letter(self.column), self.row)
    }
}

impl Serialize for CellRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A single matching cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MatchRecord {
    /// The workbook containing the match
    pub file_path: PathBuf,
    /// The sheet containing the match
    pub sheet_name: String,
    /// Where the cell sits, e.g. `B2`
    pub cell: CellRef,
    /// Canonical string form of the matching cell
    pub cell_content: String,
    /// Space-joined, trimmed string form of the row, per the configured context policy
    pub row_context: String,
}

/// Terminal outcome of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Success,
    Failure(String),
}

impl ScanOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Success)
    }
}

/// Progress snapshot sent after each finished file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub completed_files: usize,
    pub total_files: usize,
    /// The file that just finished
    pub current_file: PathBuf,
}

/// Everything a finished run produced
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    /// Records in arrival order
    pub records: Vec<MatchRecord>,
    /// Number of files discovered and searched
    pub files_searched: usize,
    /// Files that could not be read, with the reader's message
    pub failed_files: Vec<(PathBuf, String)>,
    /// Total number of matches found
    pub total_matches: usize,
    pub stats: ScanStats,
}

impl ScanSummary {
    /// Creates a new empty summary
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a record in arrival order
    pub fn add_record(&mut self, record: MatchRecord) {
        self.total_matches += 1;
        self.records.push(record);
    }

    /// Number of distinct files with at least one match
    pub fn files_with_matches(&self) -> usize {
        let mut paths: Vec<&PathBuf> = self.records.iter().map(|r| &r.file_path).collect();
        paths.sort();
        paths.dedup();
        paths.len()
    }
}
