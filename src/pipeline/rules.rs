//! Status classifier: decides which pending-status labels apply to a row.
//!
//! Three rule sets have been used over time and downstream consumers still
//! depend on each of them, so the variant is an explicit choice:
//!
//! - [`RuleVariant::Endorsement`]: endorsement lifecycle plus visibility
//! - [`RuleVariant::EndorsementSeal`]: visibility plus "no endorsement and no seal"
//! - [`RuleVariant::SealCompleteness`]: visibility first, then all three seals
//!
//! Classification is total: every row yields a (possibly empty) label set.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use tracing::trace;

use crate::report::{Field, Flag, ReportRow, Seal};

/// Joins labels inside a [`StatusKey`].
pub const KEY_CONJUNCTION: &str = " and ";

/// A pending action for a report. Declaration order is name order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    NeedsCertification,
    NeedsPromotion,
    NeedsPublishing,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsCertification => "needs_certification",
            Self::NeedsPromotion => "needs_promotion",
            Self::NeedsPublishing => "needs_publishing",
        }
    }

    /// Wording used in the digests sent to owners.
    pub fn display(&self) -> &'static str {
        match self {
            Self::NeedsCertification => "por certificar",
            Self::NeedsPromotion => "por promocionar",
            Self::NeedsPublishing => "por publicar",
        }
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Labels that apply to one row.
pub type LabelSet = BTreeSet<StatusLabel>;

/// Canonical grouping key for a non-empty label set.
///
/// Labels are sorted by name and joined with [`KEY_CONJUNCTION`], so equal
/// sets always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatusKey {
    key: String,
    labels: Vec<StatusLabel>,
}

impl StatusKey {
    /// `None` for an empty set (the row is compliant).
    pub fn from_labels(labels: &LabelSet) -> Option<Self> {
        if labels.is_empty() {
            return None;
        }
        let mut labels: Vec<StatusLabel> = labels.iter().copied().collect();
        labels.sort_by_key(|l| l.as_str());
        labels.dedup();
        let key = labels
            .iter()
            .map(StatusLabel::as_str)
            .collect::<Vec<_>>()
            .join(KEY_CONJUNCTION);
        Some(Self { key, labels })
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn labels(&self) -> &[StatusLabel] {
        &self.labels
    }

    /// Human wording, e.g. "Por promocionar y por publicar".
    pub fn display(&self) -> String {
        let joined = self
            .labels
            .iter()
            .map(StatusLabel::display)
            .collect::<Vec<_>>()
            .join(" y ");
        let mut chars = joined.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => joined,
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl Serialize for StatusKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

/// Which rule set to classify with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleVariant {
    /// Promotion/certification from the endorsement text, publishing when
    /// explicitly not visible.
    #[default]
    Endorsement,
    /// Publishing unless visible; promotion when there is neither an
    /// endorsement nor any seal.
    EndorsementSeal,
    /// Publishing unless visible; once visible, certification until all
    /// three seals are present.
    SealCompleteness,
}

impl RuleVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Endorsement => "endorsement",
            Self::EndorsementSeal => "endorsement-seal",
            Self::SealCompleteness => "seal-completeness",
        }
    }

    /// Columns this variant cannot classify without (beyond the upload base).
    pub fn required_fields(&self) -> &'static [Field] {
        match self {
            Self::Endorsement | Self::EndorsementSeal => &[Field::Visible, Field::Endorsement],
            Self::SealCompleteness => &[Field::Visible],
        }
    }

    /// Whether digests of this variant show each report's current seals.
    pub fn uses_seals(&self) -> bool {
        matches!(self, Self::EndorsementSeal | Self::SealCompleteness)
    }

    /// Compute the pending labels for a row.
    pub fn classify(&self, row: &ReportRow) -> LabelSet {
        let mut labels = LabelSet::new();
        match self {
            Self::Endorsement => {
                let endorsement = row.endorsement_state.as_str();
                let promoted = endorsement.contains("promoted");
                let certified = endorsement.contains("certified");

                if row.is_blank || (!promoted && !certified) {
                    labels.insert(StatusLabel::NeedsPromotion);
                }
                if promoted && !certified {
                    labels.insert(StatusLabel::NeedsCertification);
                }
                // Unknown visibility is not treated as hidden here.
                if row.is_visible == Flag::False {
                    labels.insert(StatusLabel::NeedsPublishing);
                }
            }
            Self::EndorsementSeal => {
                if !row.is_visible.is_true() {
                    labels.insert(StatusLabel::NeedsPublishing);
                }
                if row.endorsement_state.trim().is_empty() && row.seals.is_empty() {
                    labels.insert(StatusLabel::NeedsPromotion);
                }
            }
            Self::SealCompleteness => {
                if !row.is_visible.is_true() {
                    labels.insert(StatusLabel::NeedsPublishing);
                } else if !Seal::ALL.iter().all(|s| row.seals.contains(s)) {
                    labels.insert(StatusLabel::NeedsCertification);
                }
            }
        }

        trace!(
            row = row.index,
            variant = self.as_str(),
            labels = ?labels,
            "Row classified"
        );
        labels
    }
}

impl fmt::Display for RuleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" | "endorsement" => Ok(Self::Endorsement),
            "b" | "endorsement-seal" | "endorsement_seal" => Ok(Self::EndorsementSeal),
            "c" | "seal-completeness" | "seal_completeness" | "seals" => Ok(Self::SealCompleteness),
            other => Err(format!(
                "unknown rule variant '{other}' (expected endorsement, endorsement-seal or seal-completeness)"
            )),
        }
    }
}

/// Classify a row under a variant.
pub fn classify(row: &ReportRow, variant: RuleVariant) -> LabelSet {
    variant.classify(row)
}

/// Classify and build the grouping key in one step.
pub fn status_key(row: &ReportRow, variant: RuleVariant) -> Option<StatusKey> {
    StatusKey::from_labels(&variant.classify(row))
}
