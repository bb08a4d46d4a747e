//! Digest dispatch: render every digest and hand it to a [`Mailer`].
//!
//! One failing recipient never stops the run; its error is kept in the
//! [`SendHistory`] and the loop moves on. There is no retry.

pub mod smtp;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::digest::{DigestRenderer, RenderedDigest};
use crate::error::DispatchError;
use crate::pipeline::RecipientDigest;

pub use smtp::{AccountInfo, SenderAccount, SmtpConnector, SmtpMailer, SmtpSettings};

/// One message as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl From<RenderedDigest> for OutgoingMail {
    fn from(rendered: RenderedDigest) -> Self {
        Self {
            to: rendered.recipient,
            cc: rendered.cc,
            subject: rendered.subject,
            html: rendered.html,
        }
    }
}

/// Anything that can deliver an [`OutgoingMail`]. Blocking.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError>;
}

/// Opens a [`Mailer`] for one send run. Blocking.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        settings: &SmtpSettings,
        account: &SenderAccount,
    ) -> Result<Box<dyn Mailer>, DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentRecord {
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    /// Every report in the digest's domains, compliant ones included.
    pub report_count: usize,
    pub domain_list: Vec<String>,
    /// Table rows covered by this message.
    #[serde(skip)]
    pub rows: Vec<usize>,
}

/// Outcome of one send run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendHistory {
    pub id: Uuid,
    pub sender: String,
    pub account_label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sent: Vec<SentRecord>,
    pub errors: Vec<String>,
}

impl SendHistory {
    pub fn new(account: &SenderAccount) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: account.address.clone(),
            account_label: account.label.clone(),
            started_at: Utc::now(),
            finished_at: None,
            sent: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn total_sent(&self) -> usize {
        self.sent.len()
    }

    pub fn total_errors(&self) -> usize {
        self.errors.len()
    }

    /// Rows of every digest that went out.
    pub fn sent_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.sent.iter().flat_map(|r| r.rows.iter().copied())
    }
}

fn send_one(
    digest: &RecipientDigest,
    renderer: &DigestRenderer,
    mailer: &dyn Mailer,
) -> Result<SentRecord, DispatchError> {
    let rendered = renderer
        .render(digest)
        .map_err(|source| DispatchError::Render {
            recipient: digest.recipient.clone(),
            source,
        })?;
    mailer.send(&OutgoingMail::from(rendered))?;

    Ok(SentRecord {
        recipient: digest.recipient.clone(),
        timestamp: Utc::now(),
        report_count: digest.total_rows(),
        domain_list: digest.domain_list(),
        rows: digest.row_indices().into_iter().collect(),
    })
}

/// Send every digest in order.
pub fn dispatch<'a, I>(
    digests: I,
    renderer: &DigestRenderer,
    mailer: &dyn Mailer,
    account: &SenderAccount,
) -> SendHistory
where
    I: IntoIterator<Item = &'a RecipientDigest>,
{
    let mut history = SendHistory::new(account);

    for digest in digests {
        match send_one(digest, renderer, mailer) {
            Ok(record) => history.sent.push(record),
            Err(e) => {
                warn!(recipient = %digest.recipient, error = %e, "Digest not sent");
                history.errors.push(e.to_string());
            }
        }
    }

    history.finished_at = Some(Utc::now());
    info!(
        sender = %history.sender,
        sent = history.total_sent(),
        errors = history.total_errors(),
        "Dispatch finished"
    );
    history
}
