//! Error types for report-digest.

use uuid::Uuid;

use crate::report::columns::Field;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while turning an uploaded workbook into rows.
///
/// All of these are structural: they abort the run before any row is
/// classified.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Missing required columns: {}", join_fields(.fields))]
    MissingColumns { fields: Vec<Field> },

    #[error("Unsupported file {name}: expected an .xlsx workbook")]
    UnsupportedFile { name: String },

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Workbook has no header row")]
    EmptySheet,

    #[error("Failed to read workbook: {0}")]
    Workbook(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Digest rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Digest for {recipient} has no pending reports")]
    EmptyDigest { recipient: String },
}

/// Mail dispatch errors.
///
/// `Connect` and `UnknownAccount` abort a run; the others are per
/// recipient and end up in the send history.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown sender account: {0}")]
    UnknownAccount(String),

    #[error("SMTP connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message for {recipient}: {reason}")]
    Build { recipient: String, reason: String },

    #[error("Failed to send to {recipient}: {reason}")]
    Send { recipient: String, reason: String },

    #[error("Failed to render digest for {recipient}: {source}")]
    Render {
        recipient: String,
        #[source]
        source: RenderError,
    },
}

/// Session store errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session {0} not found")]
    NotFound(Uuid),

    #[error("Recipient {recipient} has no digest in session {id}")]
    RecipientNotFound { id: Uuid, recipient: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
