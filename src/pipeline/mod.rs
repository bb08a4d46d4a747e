//! Classification pipeline.
//!
//! Every run goes through the same steps, starting from a [`LoadedReport`]:
//! 1. Check the rule variant's columns; structural, aborts the run
//! 2. Normalize rows (`report::normalize`)
//! 3. Follow-up filter (`follow_up::FollowUpPolicy`)
//! 4. Classify and aggregate (`rules`, `aggregate`)
//!
//! Nothing is cached between runs; the same report and options always give
//! the same digests.

pub mod aggregate;
pub mod follow_up;
pub mod rules;
pub mod summary;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::IngestError;
use crate::report::{Field, LoadedReport, NormalizeOptions, ReportRow};

pub use aggregate::{AggregateOptions, Aggregation, RecipientDigest, aggregate};
pub use follow_up::FollowUpPolicy;
pub use rules::{RuleVariant, StatusKey, StatusLabel, classify};
pub use summary::TableSummary;

/// Options for one classification run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub aggregate: AggregateOptions,
    pub follow_up: FollowUpPolicy,
    pub normalize: NormalizeOptions,
}

/// Classify and aggregate a loaded report.
pub fn run(
    report: &LoadedReport,
    options: &RunOptions,
    today: NaiveDate,
) -> Result<Aggregation, IngestError> {
    report
        .columns
        .require(options.aggregate.variant.required_fields())?;

    let rows = report.rows(options.normalize);
    let selected: Vec<&ReportRow> =
        if options.follow_up.enabled && !report.columns.contains(Field::EmailSent) {
            warn!(file = %report.file_name, "No email-sent column; follow-up includes every row");
            rows.iter().collect()
        } else {
            options.follow_up.filter(&rows, today)
        };
    Ok(aggregate(selected, options.aggregate))
}

/// Summary of a loaded report under the given options. A sheet without the
/// variant's columns still gets its counts; only the pending figure is
/// left out.
pub fn summarize(
    report: &LoadedReport,
    options: &RunOptions,
    today: NaiveDate,
) -> Result<TableSummary, IngestError> {
    let rows = report.rows(options.normalize);
    match run(report, options, today) {
        Ok(aggregation) => Ok(TableSummary::build(&rows, &aggregation)),
        Err(IngestError::MissingColumns { fields }) => {
            Ok(TableSummary::unclassified(&rows, options.aggregate, fields))
        }
        Err(e) => Err(e),
    }
}
