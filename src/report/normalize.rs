//! Row normalization: raw cells to a typed [`ReportRow`].

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::columns::{ColumnMap, Field};

/// Shown wherever a text field is empty.
pub const EMPTY_PLACEHOLDER: &str = "Sin información";

/// Tri-state boolean read from a spreadsheet cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    True,
    False,
    #[default]
    Unknown,
}

impl Flag {
    pub fn is_true(self) -> bool {
        self == Flag::True
    }
}

/// Compliance seal attached to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seal {
    Technical,
    Business,
    Security,
}

impl Seal {
    pub const ALL: [Seal; 3] = [Seal::Technical, Seal::Business, Seal::Security];

    /// Display name used in digests.
    pub fn display(&self) -> &'static str {
        match self {
            Self::Technical => "Tecnología",
            Self::Business => "Negocio",
            Self::Security => "Seguridad",
        }
    }

    fn field(&self) -> Field {
        match self {
            Self::Technical => Field::SealTechnical,
            Self::Business => Field::SealBusiness,
            Self::Security => Field::SealSecurity,
        }
    }
}

/// State of the owner's commitment date column.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Commitment {
    #[default]
    Blank,
    Pending,
    Ok,
    Date(NaiveDate),
    Other(String),
}

impl Commitment {
    pub fn parse(raw: &str) -> Self {
        let text = clean_text(raw).to_lowercase();
        match text.as_str() {
            "" => Self::Blank,
            "pendiente" | "pending" => Self::Pending,
            "ok" => Self::Ok,
            _ => match parse_date(&text) {
                Some(date) => Self::Date(date),
                None => Self::Other(text),
            },
        }
    }
}

/// One normalized spreadsheet record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    /// 0-based data row index in the source table.
    pub index: usize,
    pub title: String,
    pub domain: String,
    pub owner_email: Option<String>,
    pub steward_emails: Vec<String>,
    pub workspace_title: String,
    pub responsible: String,
    pub is_visible: Flag,
    /// Lower-cased endorsement text.
    pub endorsement_state: String,
    pub seals: BTreeSet<Seal>,
    /// Lower-cased, trimmed "email sent" token.
    pub email_sent_state: String,
    pub sent_date: Option<NaiveDate>,
    pub commitment_date: Commitment,
    /// True when every cell of the row is empty.
    pub is_blank: bool,
}

impl ReportRow {
    /// Seals as a display string ("Tecnología ; Negocio"), or "Sin sellos".
    pub fn seal_summary(&self) -> String {
        if self.seals.is_empty() {
            return "Sin sellos".to_string();
        }
        self.seals
            .iter()
            .map(Seal::display)
            .collect::<Vec<_>>()
            .join(" ; ")
    }
}

/// Normalization switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Remove a leading "Área " / "Area " from domains.
    pub strip_area_prefix: bool,
}

/// Normalize one raw row against a resolved column map.
pub fn normalize(
    index: usize,
    raw: &[String],
    columns: &ColumnMap,
    options: NormalizeOptions,
) -> ReportRow {
    let get = |field: Field| {
        columns
            .index(field)
            .and_then(|idx| raw.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    };

    let mut domain = clean_text(get(Field::Domain));
    if options.strip_area_prefix {
        domain = strip_area_prefix(&domain);
    }

    let owner = clean_text(get(Field::Owner));
    let seals = Seal::ALL
        .into_iter()
        .filter(|seal| parse_flag(get(seal.field())).is_true())
        .collect();

    ReportRow {
        index,
        title: clean_title(get(Field::Title)),
        domain,
        owner_email: (!owner.is_empty()).then_some(owner),
        steward_emails: parse_recipients(get(Field::Stewards)),
        workspace_title: clean_text(get(Field::Workspace)),
        responsible: clean_text(get(Field::Responsible)),
        is_visible: parse_flag(get(Field::Visible)),
        endorsement_state: clean_text(get(Field::Endorsement)).to_lowercase(),
        seals,
        email_sent_state: clean_text(get(Field::EmailSent)).to_lowercase(),
        sent_date: parse_date(get(Field::SentDate)),
        commitment_date: Commitment::parse(get(Field::CommitmentDate)),
        is_blank: raw.iter().all(|cell| clean_text(cell).is_empty()),
    }
}

/// Trim; `nan` and blank become empty.
pub fn clean_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("nan") {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Drop the workspace qualifier (`" - [..."`) and a `.docx` suffix.
pub fn clean_title(raw: &str) -> String {
    let text = clean_text(raw);
    let cut = match text.find(" - [") {
        Some(pos) => &text[..pos],
        None => text.as_str(),
    };
    cut.trim().replace(".docx", "")
}

/// Boolean-like cell to [`Flag`].
pub fn parse_flag(raw: &str) -> Flag {
    let text = clean_text(raw).to_lowercase();
    match text.as_str() {
        "true" | "sí" | "si" | "1" | "1.0" | "verdadero" => Flag::True,
        "false" | "no" | "0" | "0.0" | "falso" => Flag::False,
        _ => Flag::Unknown,
    }
}

/// Split a multi-address cell on `,`/`;`, keeping entries with an `@`.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in clean_text(raw).split([',', ';']) {
        let address = part.trim();
        if address.contains('@') && !out.iter().any(|a| a.eq_ignore_ascii_case(address)) {
            out.push(address.to_string());
        }
    }
    out
}

/// Remove a leading "Área " / "Area " (case-insensitive).
pub fn strip_area_prefix(domain: &str) -> String {
    let mut chars = domain.chars();
    let head: String = chars.by_ref().take(5).collect();
    match head.to_lowercase().as_str() {
        "área " | "area " => chars.as_str().trim().to_string(),
        _ => domain.to_string(),
    }
}

/// Parse the date formats found in report inventories, including Excel serials.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = clean_text(raw);
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
        return Some(date);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&text, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&text, "%d/%m/%Y") {
        return Some(date);
    }
    let serial: f64 = text.parse().ok()?;
    if !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.trunc() as i64))
}

/// Text for display: the value, or [`EMPTY_PLACEHOLDER`] when empty.
pub fn display_or_placeholder(value: &str) -> &str {
    if value.is_empty() {
        EMPTY_PLACEHOLDER
    } else {
        value
    }
}
