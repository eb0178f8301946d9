use std::time::Duration;
use tracing::info;

/// What one search task read, reported with its terminal event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub sheets: u64,
    pub rows: u64,
    pub cells: u64,
    pub matches: u64,
}

/// Run-wide counters. Owned by the coordinator and only updated from its event loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanStats {
    pub files_discovered: u64,
    pub files_searched: u64,
    pub files_failed: u64,
    pub sheets_read: u64,
    pub rows_read: u64,
    pub cells_scanned: u64,
    pub matches: u64,
    pub elapsed: Duration,
}

impl ScanStats {
    pub fn new(files_discovered: usize) -> Self {
        Self {
            files_discovered: files_discovered as u64,
            ..Self::default()
        }
    }

    /// Folds in the statistics of a finished file
    pub fn record_file(&mut self, file: &FileStats, succeeded: bool) {
        self.files_searched += 1;
        if !succeeded {
            self.files_failed += 1;
        }
        self.sheets_read += file.sheets;
        self.rows_read += file.rows;
        self.cells_scanned += file.cells;
        self.matches += file.matches;
    }

    /// Logs the run statistics
    pub fn log_stats(&self) {
        info!(
            "Scan stats:\n\
             Files discovered/searched/failed: {}/{}/{}\n\
             Sheets read: {}\n\
             Rows read: {}\n\
             Cells scanned: {}\n\
             Matches: {}\n\
             Elapsed: {:?}",
            self.files_discovered,
            self.files_searched,
            self.files_failed,
            self.sheets_read,
            self.rows_read,
            self.cells_scanned,
            self.matches,
            self.elapsed
        );
    }
}
