//! The scan engine.
//!
//! # Pieces
//!
//! 1. [`Matcher`] decides whether a cell's string form matches the keyword
//!    (case-sensitive substring or case-insensitive regex, compiled once).
//! 2. [`SearchTask`] walks one workbook sheet by sheet, row by row, and reports
//!    [`TaskEvent`]s: matches as each row completes, then one `Finished` outcome.
//! 3. [`Scanner`] discovers workbooks, schedules one task per file on a bounded
//!    rayon pool and owns every run-wide counter. Tasks talk to it over a
//!    crossbeam channel, so progress, insertion indices and the failure flag are only
//!    ever mutated by the single coordinator loop.
//! 4. [`search`] wraps the scanner for callers that just want the final result.
//!
//! # Data Flow
//!
//! ```text
//! discover_targets ──> SearchTask (x N, <= concurrency at once)
//!                          │ TaskEvent
//!                          ▼
//!                     coordinator loop ──> EventSink
//! ```
//!
//! # Ordering
//!
//! Records of one workbook keep sheet, row, column order. Workbooks finish in any
//! order, and the sink sees them in arrival order.
pub mod coordinator;
pub mod engine;
pub mod matcher;
pub mod task;

pub use coordinator::{discover_targets, Scanner};
pub use engine::{search, search_with};
pub use matcher::{MatchMode, Matcher};
pub use task::{SearchTask, TaskEvent};
