//! Report inventory ingest: workbook → table → typed rows.

pub mod columns;
pub mod normalize;
pub mod table;

pub use columns::{ColumnMap, Field, resolve_columns};
pub use normalize::{
    Commitment, EMPTY_PLACEHOLDER, Flag, NormalizeOptions, ReportRow, Seal, display_or_placeholder,
    normalize,
};
pub use table::RawTable;

use chrono::NaiveDate;

/// Value written to the email-sent column once a digest went out.
pub const SENT_MARK: &str = "Correo enviado";

/// A loaded table with its resolved columns. This is the value handed from
/// upload to preview to send; nothing about it is global.
#[derive(Debug, Clone)]
pub struct LoadedReport {
    pub file_name: String,
    pub table: RawTable,
    pub columns: ColumnMap,
}

impl LoadedReport {
    /// Resolve columns for `table`, requiring the fields every upload needs.
    pub fn new(
        file_name: impl Into<String>,
        table: RawTable,
    ) -> Result<Self, crate::error::IngestError> {
        let columns = resolve_columns(table.headers(), &Field::BASE)?;
        Ok(Self {
            file_name: file_name.into(),
            table,
            columns,
        })
    }

    /// Normalize every data row, in table order.
    pub fn rows(&self, options: NormalizeOptions) -> Vec<ReportRow> {
        self.table
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, raw)| normalize(idx, raw, &self.columns, options))
            .collect()
    }

    /// Record a successful send on the given rows. Only columns present in
    /// the upload are touched; returns how many rows were marked.
    pub fn mark_sent<I>(&mut self, rows: I, date: NaiveDate) -> usize
    where
        I: IntoIterator<Item = usize>,
    {
        let sent_col = self.columns.index(Field::EmailSent);
        let date_col = self.columns.index(Field::SentDate);
        if sent_col.is_none() && date_col.is_none() {
            return 0;
        }

        let stamp = date.format("%Y-%m-%d").to_string();
        let mut marked = 0;
        for row in rows {
            if row >= self.table.len() {
                continue;
            }
            if let Some(col) = sent_col {
                self.table.set_cell(row, col, SENT_MARK);
            }
            if let Some(col) = date_col {
                self.table.set_cell(row, col, stamp.as_str());
            }
            marked += 1;
        }
        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            "Hoja1",
            headers.iter().map(|s| s.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn base_columns_are_required() {
        let err = LoadedReport::new("x.xlsx", table(&["Titulo", "Dominio"], &[])).unwrap_err();
        assert_eq!(err.to_string(), "Missing required columns: owner");
    }

    #[test]
    fn mark_sent_updates_only_given_rows() {
        let mut report = LoadedReport::new(
            "estado.xlsx",
            table(
                &["Titulo", "Dominio", "Data Owner", "Correo Enviado", "Fecha envío"],
                &[
                    &["A", "Ventas", "o@x.com", "No", ""],
                    &["B", "Ventas", "o@x.com", "No"],
                    &["C", "Ventas", "o@x.com", "No", ""],
                ],
            ),
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(report.mark_sent([1, 2, 9], date), 2);

        let rows = report.rows(NormalizeOptions::default());
        assert_eq!(rows[0].email_sent_state, "no");
        assert_eq!(rows[0].sent_date, None);
        assert_eq!(report.table.cell(1, 3), "Correo enviado");
        assert_eq!(rows[1].sent_date, Some(date));
        assert_eq!(rows[2].email_sent_state, "correo enviado");
    }

    #[test]
    fn mark_sent_without_tracking_columns_is_noop() {
        let mut report = LoadedReport::new(
            "estado.xlsx",
            table(&["Titulo", "Dominio", "Data Owner"], &[&["A", "Ventas", "o@x.com"]]),
        )
        .unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(report.mark_sent([0], date), 0);
        assert_eq!(report.table.rows()[0].len(), 3);
    }
}
