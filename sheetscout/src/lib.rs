pub mod cancellation;
pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod reader;
pub mod results;
pub mod search;
pub mod sink;

pub use cancellation::CancellationToken;
pub use config::{FailurePolicy, RowContextPolicy, ScanConfig, ScanRequest};
pub use errors::{SearchError, SearchResult};
pub use reader::{CalamineSource, CellValue, MemorySource, MemoryWorkbook, WorkbookSource};
pub use results::{CellRef, MatchRecord, ProgressUpdate, ScanOutcome, ScanSummary};
pub use search::{search, search_with, MatchMode, Scanner};
pub use sink::{CollectingSink, EventSink, ScanEvent};
