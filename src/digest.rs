//! Digest renderer: turns a [`RecipientDigest`] into an HTML email body.
//!
//! The template only loops over a prepared view; ordering and wording are
//! decided here.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::RenderError;
use crate::pipeline::RecipientDigest;
use crate::pipeline::aggregate::RowDetail;

const TEMPLATE_NAME: &str = "digest.html";
const TEMPLATE: &str = include_str!("../templates/digest.html");

pub const DEFAULT_SUBJECT_PREFIX: &str = "Estado de Reportes";

/// A rendered email, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDigest {
    pub recipient: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Serialize)]
struct DigestView<'a> {
    subject: &'a str,
    recipient: &'a str,
    domains: Vec<DomainView<'a>>,
    /// Adds the "Sellos Actuales" column.
    show_seals: bool,
    total_rows: usize,
    pending_rows: usize,
}

#[derive(Serialize)]
struct DomainView<'a> {
    name: &'a str,
    total_rows: usize,
    statuses: Vec<StatusView<'a>>,
}

#[derive(Serialize)]
struct StatusView<'a> {
    label: String,
    titles: &'a [String],
    details: &'a [RowDetail],
}

pub struct DigestRenderer {
    tera: Tera,
    subject_prefix: String,
}

impl DigestRenderer {
    pub fn new(subject_prefix: impl Into<String>) -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self {
            tera,
            subject_prefix: subject_prefix.into(),
        })
    }

    pub fn subject_prefix(&self) -> &str {
        &self.subject_prefix
    }

    pub fn subject(&self, digest: &RecipientDigest) -> String {
        format!("{} - {}", self.subject_prefix, digest.domain_list().join(", "))
    }

    pub fn render(&self, digest: &RecipientDigest) -> Result<RenderedDigest, RenderError> {
        if digest.domains.is_empty() {
            return Err(RenderError::EmptyDigest {
                recipient: digest.recipient.clone(),
            });
        }

        let subject = self.subject(digest);
        let view = DigestView {
            subject: &subject,
            recipient: &digest.recipient,
            domains: digest
                .domains
                .iter()
                .map(|(name, domain)| DomainView {
                    name,
                    total_rows: domain.total_rows,
                    statuses: domain
                        .buckets
                        .iter()
                        .map(|bucket| StatusView {
                            label: bucket.status_key.display(),
                            titles: &bucket.titles,
                            details: &bucket.details,
                        })
                        .collect(),
                })
                .collect(),
            show_seals: digest
                .domains
                .values()
                .flat_map(|d| d.buckets.iter())
                .flat_map(|b| b.details.iter())
                .any(|detail| detail.seals.is_some()),
            total_rows: digest.total_rows(),
            pending_rows: digest.pending_rows(),
        };

        let context = Context::from_serialize(&view)?;
        let html = self.tera.render(TEMPLATE_NAME, &context)?;
        tracing::debug!(
            recipient = %digest.recipient,
            domains = digest.domains.len(),
            "Rendered digest"
        );

        Ok(RenderedDigest {
            recipient: digest.recipient.clone(),
            cc: digest.cc.iter().cloned().collect(),
            subject,
            html,
        })
    }
}
