//! Tabular workbook access.
//!
//! The engine never decodes spreadsheet formats itself. It talks to a
//! [`WorkbookSource`], which opens one file at a time and hands back a [`Workbook`]
//! exposing sheets in declaration order and rows in sheet order. The production
//! source is [`CalamineSource`]; [`MemorySource`] serves decoded workbooks from memory.

pub mod memory;
pub mod xlsx;

use std::fmt;
use std::path::Path;

use crate::errors::SearchResult;

pub use memory::{MemorySource, MemoryWorkbook};
pub use xlsx::CalamineSource;

/// A decoded cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Already rendered as `YYYY-MM-DD HH:MM:SS`
    DateTime(String),
    /// Excel error code such as `#DIV/0!`
    Error(String),
}

/// Canonical string form used for matching and for row context.
///
/// An empty cell renders as the literal text `None`, so row context keeps one
/// token per column.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => f.write_str("None"),
            CellValue::Text(s) | CellValue::DateTime(s) | CellValue::Error(s) => f.write_str(s),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            CellValue::Bool(true) => f.write_str("True"),
            CellValue::Bool(false) => f.write_str("False"),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Empty, Into::into)
    }
}

/// One sheet row. `cells[0]` is column A.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// 1-based row number within the sheet
    pub index: u32,
    pub cells: Vec<CellValue>,
}

impl Row {
    pub fn new(index: u32, cells: Vec<CellValue>) -> Self {
        Self { index, cells }
    }
}

/// An opened workbook
pub trait Workbook {
    /// Sheet names in declaration order
    fn sheet_names(&self) -> Vec<String>;

    /// Rows of one sheet in row order
    fn sheet_rows(&mut self, sheet: &str) -> SearchResult<Vec<Row>>;
}

/// Opens workbooks. Shared by every worker of a run.
pub trait WorkbookSource: Send + Sync {
    fn open(&self, path: &Path) -> SearchResult<Box<dyn Workbook>>;
}
