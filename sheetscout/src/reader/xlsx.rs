use calamine::{open_workbook_auto, Data, Reader, Sheets};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::trace;

use super::{CellValue, Row, Workbook, WorkbookSource};
use crate::errors::{SearchError, SearchResult};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads `.xlsx` / `.xlsm` workbooks (and the other formats calamine detects)
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineSource;

impl CalamineSource {
    pub fn new() -> Self {
        Self
    }
}

impl WorkbookSource for CalamineSource {
    fn open(&self, path: &Path) -> SearchResult<Box<dyn Workbook>> {
        trace!("Opening workbook: {}", path.display());
        let sheets = open_workbook_auto(path)
            .map_err(|e| SearchError::file_access(path, e.to_string()))?;
        Ok(Box::new(CalamineWorkbook {
            path: path.to_path_buf(),
            sheets,
        }))
    }
}

struct CalamineWorkbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook for CalamineWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn sheet_rows(&mut self, sheet: &str) -> SearchResult<Vec<Row>> {
        let range = self
            .sheets
            .worksheet_range(sheet)
            .map_err(|e| SearchError::file_access(&self.path, e.to_string()))?;

        // The used range may start below row 1 or right of column A
        let (first_row, first_col) = range.start().unwrap_or((0, 0));
        let padding = first_col as usize;

        let rows = range
            .rows()
            .enumerate()
            .map(|(i, cells)| {
                let mut values = Vec::with_capacity(padding + cells.len());
                values.resize(padding, CellValue::Empty);
                values.extend(cells.iter().map(convert_cell));
                Row::new(first_row + i as u32 + 1, values)
            })
            .collect();

        Ok(rows)
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(v) => CellValue::Float(*v),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => CellValue::DateTime(naive.format(DATETIME_FORMAT).to_string()),
            None => CellValue::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::DateTime(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}
