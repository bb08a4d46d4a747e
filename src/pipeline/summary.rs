//! Upload summary shown before any digest is built.

use std::collections::BTreeSet;

use serde::Serialize;

use super::aggregate::{AggregateOptions, Aggregation, is_valid_recipient, recipient_key, skip_reason};
use crate::report::{Field, ReportRow};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub total_reports: usize,
    /// Distinct rows that landed in at least one bucket. `None` when the
    /// sheet cannot be classified under the chosen variant.
    pub pending_reports: Option<usize>,
    pub domains: usize,
    pub data_owners: usize,
    pub skipped_rows: usize,
    /// Variant columns the sheet lacks.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_columns: Vec<Field>,
}

impl TableSummary {
    pub fn build(rows: &[ReportRow], aggregation: &Aggregation) -> Self {
        let pending: BTreeSet<usize> = aggregation
            .digests
            .values()
            .flat_map(|d| d.row_indices())
            .collect();

        Self {
            pending_reports: Some(pending.len()),
            skipped_rows: aggregation.skipped.len(),
            ..Self::counts(rows)
        }
    }

    /// Summary of a sheet that lacks `missing` for classification.
    pub fn unclassified(rows: &[ReportRow], options: AggregateOptions, missing: Vec<Field>) -> Self {
        let skipped = rows
            .iter()
            .filter(|r| skip_reason(r, options.include_secondary_recipients).is_some())
            .count();

        Self {
            skipped_rows: skipped,
            missing_columns: missing,
            ..Self::counts(rows)
        }
    }

    fn counts(rows: &[ReportRow]) -> Self {
        let domains: BTreeSet<&str> = rows
            .iter()
            .map(|r| r.domain.as_str())
            .filter(|d| !d.is_empty())
            .collect();
        let owners: BTreeSet<String> = rows
            .iter()
            .filter_map(|r| r.owner_email.as_deref())
            .filter(|o| is_valid_recipient(o))
            .map(recipient_key)
            .collect();

        Self {
            total_reports: rows.len(),
            domains: domains.len(),
            data_owners: owners.len(),
            ..Default::default()
        }
    }
}
