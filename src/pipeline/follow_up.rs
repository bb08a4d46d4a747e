//! Follow-up filter: decides whether a row should be (re)notified.
//!
//! Owners who were never emailed are always included. Owners who were
//! emailed are included again only once the previous notice is old enough
//! and no commitment date has been agreed. Rows whose email-sent cell is
//! blank or unrecognized are left out.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::report::{Commitment, ReportRow};

const NOT_SENT: &[&str] = &["no", "n", "no.", "n."];
const SENT: &[&str] = &["correo enviado", "enviado", "sí", "si"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpPolicy {
    pub enabled: bool,
    /// Minimum age of the previous notice before re-sending.
    pub min_age_months: u32,
}

impl Default for FollowUpPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_age_months: 1,
        }
    }
}

impl FollowUpPolicy {
    /// Whether `row` should be part of this run, as of `today`.
    pub fn should_notify(&self, row: &ReportRow, today: NaiveDate) -> bool {
        if !self.enabled {
            return true;
        }

        let state = row.email_sent_state.as_str();
        if NOT_SENT.contains(&state) {
            return true;
        }
        if !SENT.contains(&state) {
            return false;
        }

        let Some(sent) = row.sent_date else {
            return false;
        };
        let Some(threshold) = today.checked_sub_months(Months::new(self.min_age_months)) else {
            return false;
        };
        sent <= threshold && matches!(row.commitment_date, Commitment::Blank | Commitment::Pending)
    }

    /// Keep only the rows that should be notified.
    pub fn filter<'a>(&self, rows: &'a [ReportRow], today: NaiveDate) -> Vec<&'a ReportRow> {
        rows.iter()
            .filter(|row| self.should_notify(row, today))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Flag;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn make_row(state: &str, sent: Option<NaiveDate>, commitment: Commitment) -> ReportRow {
        ReportRow {
            index: 0,
            title: "Ventas".into(),
            domain: "Comercial".into(),
            owner_email: Some("o@corp.com".into()),
            steward_emails: vec![],
            workspace_title: String::new(),
            responsible: String::new(),
            is_visible: Flag::True,
            endorsement_state: String::new(),
            seals: Default::default(),
            email_sent_state: state.into(),
            sent_date: sent,
            commitment_date: commitment,
            is_blank: false,
        }
    }

    fn enabled() -> FollowUpPolicy {
        FollowUpPolicy {
            enabled: true,
            min_age_months: 1,
        }
    }

    #[test]
    fn never_sent_is_included() {
        for state in ["no", "n.", "no."] {
            assert!(enabled().should_notify(&make_row(state, None, Commitment::Blank), today()));
        }
    }

    #[test]
    fn recent_send_is_excluded() {
        let sent = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert!(!enabled().should_notify(&make_row("enviado", sent, Commitment::Pending), today()));
    }

    #[test]
    fn old_send_without_commitment_is_included() {
        let sent = NaiveDate::from_ymd_opt(2024, 5, 15);
        assert!(enabled().should_notify(&make_row("correo enviado", sent, Commitment::Blank), today()));
        assert!(enabled().should_notify(&make_row("si", sent, Commitment::Pending), today()));
    }

    #[test]
    fn old_send_with_commitment_is_excluded() {
        let sent = NaiveDate::from_ymd_opt(2024, 1, 2);
        assert!(!enabled().should_notify(&make_row("enviado", sent, Commitment::Ok), today()));
        let agreed = Commitment::Date(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        assert!(!enabled().should_notify(&make_row("enviado", sent, agreed), today()));
    }

    #[test]
    fn sent_without_date_is_excluded() {
        assert!(!enabled().should_notify(&make_row("enviado", None, Commitment::Blank), today()));
    }

    #[test]
    fn blank_or_unknown_state_is_excluded() {
        assert!(!enabled().should_notify(&make_row("", None, Commitment::Blank), today()));
        assert!(!enabled().should_notify(&make_row("quizás", None, Commitment::Blank), today()));
    }

    #[test]
    fn disabled_policy_includes_everything() {
        assert!(FollowUpPolicy::default().should_notify(&make_row("", None, Commitment::Ok), today()));
        let sent = NaiveDate::from_ymd_opt(2024, 6, 14);
        let disabled = FollowUpPolicy::default();
        assert!(disabled.should_notify(&make_row("enviado", sent, Commitment::Ok), today()));
    }
}
