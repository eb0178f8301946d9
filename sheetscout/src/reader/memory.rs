use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use super::{CellValue, Row, Workbook, WorkbookSource};
use crate::errors::{SearchError, SearchResult};

#[derive(Debug, Clone)]
enum SheetData {
    Rows(Vec<Row>),
    Unreadable(String),
}

/// A workbook held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    path: PathBuf,
    sheets: Vec<(String, SheetData)>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sheet. Rows are numbered from 1 and cells start at column A.
    pub fn sheet<R, C>(mut self, name: &str, rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<CellValue>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, cells)| {
                Row::new(i as u32 + 1, cells.into_iter().map(Into::into).collect())
            })
            .collect();
        self.sheets.push((name.to_string(), SheetData::Rows(rows)));
        self
    }

    /// Appends a sheet whose rows fail to load with `message`
    pub fn unreadable_sheet(mut self, name: &str, message: &str) -> Self {
        self.sheets
            .push((name.to_string(), SheetData::Unreadable(message.to_string())));
        self
    }
}

impl Workbook for MemoryWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    fn sheet_rows(&mut self, sheet: &str) -> SearchResult<Vec<Row>> {
        match self.sheets.iter().find(|(name, _)| name == sheet) {
            Some((_, SheetData::Rows(rows))) => Ok(rows.clone()),
            Some((_, SheetData::Unreadable(message))) => {
                Err(SearchError::file_access(&self.path, message.clone()))
            }
            None => Err(SearchError::file_access(
                &self.path,
                format!("Worksheet named '{}' not found", sheet),
            )),
        }
    }
}

/// Serves registered workbooks by path.
///
/// Opening a path that was never registered fails the same way a corrupt file does.
/// An optional open latency stands in for slow storage.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    workbooks: HashMap<PathBuf, MemoryWorkbook>,
    open_latency: Option<Duration>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, workbook: MemoryWorkbook) {
        self.workbooks.insert(path.into(), workbook);
    }

    pub fn with_workbook(mut self, path: impl Into<PathBuf>, workbook: MemoryWorkbook) -> Self {
        self.insert(path, workbook);
        self
    }

    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency = Some(latency);
        self
    }
}

impl WorkbookSource for MemorySource {
    fn open(&self, path: &Path) -> SearchResult<Box<dyn Workbook>> {
        if let Some(latency) = self.open_latency {
            thread::sleep(latency);
        }
        match self.workbooks.get(path) {
            Some(workbook) => {
                let mut workbook = workbook.clone();
                workbook.path = path.to_path_buf();
                Ok(Box::new(workbook))
            }
            None => Err(SearchError::file_access(path, "File is not a zip file")),
        }
    }
}
