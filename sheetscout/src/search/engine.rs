use std::sync::Arc;
use tracing::{debug, info};

use super::coordinator::Scanner;
use crate::config::{ScanConfig, ScanRequest};
use crate::errors::{SearchError, SearchResult};
use crate::reader::{CalamineSource, WorkbookSource};
use crate::results::ScanSummary;
use crate::sink::{CollectingSink, ScanEvent};

/// Searches every recognized workbook under `config.root_path` and waits for the result
pub fn search(config: &ScanConfig) -> SearchResult<ScanSummary> {
    search_with(Arc::new(CalamineSource::new()), config)
}

/// Same as [`search`] with a custom workbook source.
///
/// Under the fail-fast policy an unreadable workbook turns the whole call into
/// `SearchError::RunAborted`. Under the continue policy it is listed in
/// `ScanSummary::failed_files` instead.
pub fn search_with(
    source: Arc<dyn WorkbookSource>,
    config: &ScanConfig,
) -> SearchResult<ScanSummary> {
    let request = ScanRequest::new(config)?;
    info!("Searching for {:?} in {}", config.keyword, config.root_path.display());

    let sink = Arc::new(CollectingSink::new());
    let scanner = Scanner::new(source, sink.clone());
    scanner.start_scan(request)?;
    scanner.wait();

    let mut summary = ScanSummary::new();
    for event in sink.take_events() {
        match event {
            ScanEvent::Match { record, .. } => summary.add_record(record),
            ScanEvent::Progress(progress) => summary.files_searched = progress.completed_files,
            ScanEvent::Error(SearchError::FileAccess { path, message }) => {
                summary.failed_files.push((path, message));
            }
            ScanEvent::Error(e) => return Err(e),
            ScanEvent::Completed { total_matches } => {
                debug!("Run completed with {} matches", total_matches);
            }
        }
    }

    summary.stats = sink.take_stats().unwrap_or_default();
    Ok(summary)
}
