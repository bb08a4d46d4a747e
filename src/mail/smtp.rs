//! SMTP via lettre. One transport per run, pooled to a single connection.

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{info, warn};

use super::{Connector, Mailer, OutgoingMail};
use crate::error::DispatchError;

const IMPLICIT_TLS_PORT: u16 = 465;

/// A sender the operator can pick when sending.
#[derive(Debug, Clone)]
pub struct SenderAccount {
    pub id: String,
    pub address: String,
    pub label: String,
    pub password: SecretString,
}

/// What `/api/accounts` exposes about a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub id: String,
    pub address: String,
    pub label: String,
}

impl SenderAccount {
    pub fn info(&self) -> AccountInfo {
        AccountInfo {
            id: self.id.clone(),
            address: self.address.clone(),
            label: self.label.clone(),
        }
    }

    pub fn mailbox(&self) -> Result<Mailbox, DispatchError> {
        let address = parse_address(&self.address)?;
        let name = (!self.label.is_empty()).then(|| self.label.clone());
        Ok(Mailbox::new(name, address))
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub accounts: Vec<SenderAccount>,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".into(),
            port: 587,
            accounts: Vec::new(),
        }
    }
}

impl SmtpSettings {
    pub fn account(&self, id: &str) -> Result<&SenderAccount, DispatchError> {
        self.accounts
            .iter()
            .find(|a| a.id == id)
            .ok_or_else(|| DispatchError::UnknownAccount(id.to_string()))
    }
}

fn parse_address(raw: &str) -> Result<Address, DispatchError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| DispatchError::InvalidAddress {
            address: raw.to_string(),
            reason: e.to_string(),
        })
}

/// Build the HTML message for one recipient.
pub fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<Message, DispatchError> {
    let mut builder = Message::builder()
        .from(from.clone())
        .to(Mailbox::new(None, parse_address(&mail.to)?))
        .subject(mail.subject.as_str())
        .header(ContentType::TEXT_HTML);
    for cc in &mail.cc {
        builder = builder.cc(Mailbox::new(None, parse_address(cc)?));
    }

    builder
        .body(mail.html.clone())
        .map_err(|e| DispatchError::Build {
            recipient: mail.to.clone(),
            reason: e.to_string(),
        })
}

pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    /// Open and verify the connection. Failure here aborts the whole run.
    pub fn connect(settings: &SmtpSettings, account: &SenderAccount) -> Result<Self, DispatchError> {
        let connect_err = |reason: String| DispatchError::Connect {
            host: settings.host.clone(),
            reason,
        };

        let relay = if settings.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&settings.host)
        } else {
            SmtpTransport::starttls_relay(&settings.host)
        };
        let builder = relay.map_err(|e| connect_err(format!("SMTP relay error: {e}")))?;

        let creds = Credentials::new(
            account.address.clone(),
            account.password.expose_secret().to_string(),
        );
        let transport = builder
            .port(settings.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(1))
            .build();

        match transport.test_connection() {
            Ok(true) => {}
            Ok(false) => return Err(connect_err("server did not accept the connection".into())),
            Err(e) => {
                warn!(host = %settings.host, error = %e, "SMTP connection test failed");
                return Err(connect_err(e.to_string()));
            }
        }

        info!(
            host = %settings.host,
            port = settings.port,
            account = %account.id,
            "SMTP connection ready"
        );
        Ok(Self {
            transport,
            from: account.mailbox()?,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &OutgoingMail) -> Result<(), DispatchError> {
        let message = build_message(&self.from, mail)?;
        self.transport
            .send(&message)
            .map_err(|e| DispatchError::Send {
                recipient: mail.to.clone(),
                reason: format!("SMTP send failed: {e}"),
            })?;
        info!(to = %mail.to, cc = mail.cc.len(), "Email sent");
        Ok(())
    }
}

/// Connects through [`SmtpMailer::connect`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpConnector;

impl Connector for SmtpConnector {
    fn connect(
        &self,
        settings: &SmtpSettings,
        account: &SenderAccount,
    ) -> Result<Box<dyn Mailer>, DispatchError> {
        Ok(Box::new(SmtpMailer::connect(settings, account)?))
    }
}
