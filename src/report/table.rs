//! In-memory working table loaded from an uploaded workbook.
//!
//! The first row of the sheet is the header row; every following row up to
//! the sheet's highest used row is a data row. Cell values are kept as the
//! strings the workbook reports, normalization happens later.

use std::path::Path;

use tracing::debug;
use umya_spreadsheet::Worksheet;

use crate::error::IngestError;

/// A sheet as headers plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    sheet: String,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table directly (used by tests and callers that already hold rows).
    pub fn new(sheet: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            sheet: sheet.into(),
            headers,
            rows,
        }
    }

    /// Read one sheet of an .xlsx file. `sheet = None` picks the first sheet.
    pub fn from_xlsx(path: &Path, sheet: Option<&str>) -> Result<Self, IngestError> {
        let book = umya_spreadsheet::reader::xlsx::read(path)
            .map_err(|e| IngestError::Workbook(e.to_string()))?;

        let worksheet = match sheet {
            Some(name) => book
                .get_sheet_by_name(name)
                .ok_or_else(|| IngestError::SheetNotFound(name.to_string()))?,
            None => book
                .get_sheet_collection()
                .first()
                .ok_or_else(|| IngestError::SheetNotFound("(first sheet)".to_string()))?,
        };

        let table = Self::from_worksheet(worksheet)?;
        debug!(
            sheet = %table.sheet,
            columns = table.headers.len(),
            rows = table.rows.len(),
            "Workbook sheet loaded"
        );
        Ok(table)
    }

    fn from_worksheet(sheet: &Worksheet) -> Result<Self, IngestError> {
        let (max_col, max_row) = sheet.get_highest_column_and_row();
        if max_row == 0 || max_col == 0 {
            return Err(IngestError::EmptySheet);
        }

        let read_row = |row: u32| -> Vec<String> {
            (1..=max_col)
                .map(|col| cell_value(sheet, col, row))
                .collect()
        };

        let headers: Vec<String> = read_row(1).into_iter().map(|h| h.trim().to_string()).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(IngestError::EmptySheet);
        }

        let rows = (2..=max_row).map(read_row).collect();

        Ok(Self {
            sheet: sheet.get_name().to_string(),
            headers,
            rows,
        })
    }

    pub fn sheet(&self) -> &str {
        &self.sheet
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell text, empty when the row is shorter than the column index.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Overwrite a cell, padding the row if it is short. Out-of-range rows are ignored.
    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value.into();
        }
    }
}

fn cell_value(sheet: &Worksheet, col: u32, row: u32) -> String {
    let address = format!("{}{}", column_letter(col), row);
    sheet
        .get_cell(address.as_str())
        .map(|cell| cell.get_value().to_string())
        .unwrap_or_default()
}

/// 1-based column index to spreadsheet letters (1 → A, 27 → AA).
pub fn column_letter(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}
