//! Owner/domain aggregator: groups classified rows into per-recipient digests.
//!
//! Shape of the output: recipient → domain (sorted) → status key (first
//! seen) → titles (input order).

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info};

use super::rules::{RuleVariant, StatusKey};
use crate::report::{ReportRow, display_or_placeholder};

/// Aggregation switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateOptions {
    pub variant: RuleVariant,
    /// Attribute a row to every steward as well as to the owner.
    pub include_secondary_recipients: bool,
    /// Collect stewards of a recipient's rows as CC addresses.
    pub cc_stewards: bool,
}

/// Display columns of one report, empty values already replaced by the
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowDetail {
    pub title: String,
    pub workspace: String,
    pub responsible: String,
    /// Current seals; only set for variants that look at seals.
    pub seals: Option<String>,
}

impl RowDetail {
    fn from_row(row: &ReportRow, variant: RuleVariant) -> Self {
        Self {
            title: row.title.clone(),
            workspace: display_or_placeholder(&row.workspace_title).to_string(),
            responsible: display_or_placeholder(&row.responsible).to_string(),
            seals: variant.uses_seals().then(|| row.seal_summary()),
        }
    }
}

/// Titles sharing one `(recipient, domain, status key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregationBucket {
    pub status_key: StatusKey,
    pub titles: Vec<String>,
    /// Source row indices, parallel to `titles`.
    pub rows: Vec<usize>,
    /// Parallel to `titles`.
    pub details: Vec<RowDetail>,
}

impl AggregationBucket {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

/// One domain of a recipient's digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainDigest {
    pub buckets: Vec<AggregationBucket>,
    /// Every valid row of this recipient and domain, compliant ones included.
    pub total_rows: usize,
}

impl DomainDigest {
    pub fn pending_rows(&self) -> usize {
        self.buckets.iter().map(AggregationBucket::count).sum()
    }
}

/// Everything one recipient is told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientDigest {
    pub recipient: String,
    pub domains: BTreeMap<String, DomainDigest>,
    pub cc: BTreeSet<String>,
}

impl RecipientDigest {
    fn new(recipient: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            domains: BTreeMap::new(),
            cc: BTreeSet::new(),
        }
    }

    pub fn total_rows(&self) -> usize {
        self.domains.values().map(|d| d.total_rows).sum()
    }

    pub fn pending_rows(&self) -> usize {
        self.domains.values().map(DomainDigest::pending_rows).sum()
    }

    pub fn domain_list(&self) -> Vec<String> {
        self.domains.keys().cloned().collect()
    }

    /// Indices of every pending row in this digest.
    pub fn row_indices(&self) -> BTreeSet<usize> {
        self.domains
            .values()
            .flat_map(|d| d.buckets.iter())
            .flat_map(|b| b.rows.iter().copied())
            .collect()
    }
}

/// Why a row never reached a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingTitle,
    MissingDomain,
    NoRecipient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub index: usize,
    pub reason: SkipReason,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Aggregation {
    pub digests: BTreeMap<String, RecipientDigest>,
    pub skipped: Vec<SkippedRow>,
}

impl Aggregation {
    pub fn pending_rows(&self) -> usize {
        self.digests.values().map(RecipientDigest::pending_rows).sum()
    }
}

/// A recipient identity is usable only if it looks like an address.
pub fn is_valid_recipient(candidate: &str) -> bool {
    candidate.contains('@')
}

/// Digest key for an address. Mailboxes are matched case-insensitively.
pub fn recipient_key(address: &str) -> String {
    address.trim().to_lowercase()
}

fn recipients_of(row: &ReportRow, include_secondary: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(owner) = row.owner_email.as_deref().filter(|o| is_valid_recipient(o)) {
        out.push(recipient_key(owner));
    }
    if include_secondary {
        for steward in row.steward_emails.iter().filter(|s| is_valid_recipient(s)) {
            let key = recipient_key(steward);
            if !out.contains(&key) {
                out.push(key);
            }
        }
    }
    out
}

/// Why `row` cannot be attributed to anyone, if it cannot.
pub fn skip_reason(row: &ReportRow, include_secondary: bool) -> Option<SkipReason> {
    if row.title.is_empty() {
        Some(SkipReason::MissingTitle)
    } else if row.domain.is_empty() {
        Some(SkipReason::MissingDomain)
    } else if recipients_of(row, include_secondary).is_empty() {
        Some(SkipReason::NoRecipient)
    } else {
        None
    }
}

/// Group rows into per-recipient digests.
pub fn aggregate<'a, I>(rows: I, options: AggregateOptions) -> Aggregation
where
    I: IntoIterator<Item = &'a ReportRow>,
{
    let mut digests: BTreeMap<String, RecipientDigest> = BTreeMap::new();
    let mut skipped = Vec::new();

    for row in rows {
        if let Some(reason) = skip_reason(row, options.include_secondary_recipients) {
            debug!(row = row.index, reason = ?reason, "Row skipped");
            skipped.push(SkippedRow {
                index: row.index,
                reason,
            });
            continue;
        }

        let key = options.variant.classify(row);
        let key = StatusKey::from_labels(&key);

        for recipient in recipients_of(row, options.include_secondary_recipients) {
            let digest = digests
                .entry(recipient.clone())
                .or_insert_with(|| RecipientDigest::new(&recipient));
            let domain = digest.domains.entry(row.domain.clone()).or_default();
            domain.total_rows += 1;

            let Some(key) = key.as_ref() else {
                continue;
            };
            let detail = RowDetail::from_row(row, options.variant);
            match domain.buckets.iter_mut().find(|b| &b.status_key == key) {
                Some(bucket) => {
                    bucket.titles.push(row.title.clone());
                    bucket.rows.push(row.index);
                    bucket.details.push(detail);
                }
                None => domain.buckets.push(AggregationBucket {
                    status_key: key.clone(),
                    titles: vec![row.title.clone()],
                    rows: vec![row.index],
                    details: vec![detail],
                }),
            }

            if options.cc_stewards {
                for steward in &row.steward_emails {
                    let steward = recipient_key(steward);
                    if steward != recipient {
                        digest.cc.insert(steward);
                    }
                }
            }
        }
    }

    for digest in digests.values_mut() {
        digest.domains.retain(|_, d| !d.buckets.is_empty());
    }
    digests.retain(|_, d| !d.domains.is_empty());

    info!(
        variant = options.variant.as_str(),
        recipients = digests.len(),
        skipped = skipped.len(),
        "Rows aggregated"
    );

    Aggregation { digests, skipped }
}
