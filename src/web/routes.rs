//! REST handlers: upload, preview, send, history.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use super::error::ApiError;
use crate::error::{DispatchError, IngestError, SessionError};
use crate::mail::{AccountInfo, SendHistory, dispatch};
use crate::pipeline::aggregate::recipient_key;
use crate::pipeline::{self, RecipientDigest, RuleVariant, RunOptions, TableSummary};
use crate::report::{LoadedReport, RawTable};

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid session ID".into()))
}

/// Per-request overrides of the configured run options.
#[derive(Debug, Default, Deserialize)]
pub struct RunOverrides {
    pub variant: Option<RuleVariant>,
    pub secondary: Option<bool>,
    pub cc: Option<bool>,
    pub follow_up: Option<bool>,
}

impl RunOverrides {
    pub fn apply(&self, mut options: RunOptions) -> RunOptions {
        if let Some(variant) = self.variant {
            options.aggregate.variant = variant;
        }
        if let Some(secondary) = self.secondary {
            options.aggregate.include_secondary_recipients = secondary;
        }
        if let Some(cc) = self.cc {
            options.aggregate.cc_stewards = cc;
        }
        if let Some(follow_up) = self.follow_up {
            options.follow_up.enabled = follow_up;
        }
        options
    }
}

// ── Health ──────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "report-digest"
    }))
}

pub async fn list_accounts(State(state): State<AppState>) -> Json<Vec<AccountInfo>> {
    Json(state.config.smtp.accounts.iter().map(|a| a.info()).collect())
}

// ── Upload ──────────────────────────────────────────────────────────────

pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut sheet: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;
                file = Some((file_name, data.to_vec()));
            }
            "sheet" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid sheet field: {e}")))?;
                let text = text.trim();
                if !text.is_empty() {
                    sheet = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    let Some((file_name, data)) = file else {
        return Err(ApiError::BadRequest("Missing 'file' field".into()));
    };
    if !file_name.to_lowercase().ends_with(".xlsx") {
        return Err(IngestError::UnsupportedFile { name: file_name }.into());
    }

    let upload_dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(IngestError::Io)?;
    let path = upload_dir.join(format!("{}.xlsx", Uuid::new_v4()));
    tokio::fs::write(&path, &data).await.map_err(IngestError::Io)?;

    let sheet = sheet.or_else(|| state.config.sheet.clone());
    let parse_path = path.clone();
    let parsed = tokio::task::spawn_blocking(move || {
        RawTable::from_xlsx(&parse_path, sheet.as_deref())
    })
    .await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
    }
    let table = parsed.map_err(|e| ApiError::Internal(format!("Parse task failed: {e}")))??;

    let report = LoadedReport::new(file_name.clone(), table)?;
    let summary = pipeline::summarize(&report, &state.config.run, today())?;
    let sheet_name = report.table.sheet().to_string();
    let columns = report.columns.clone();
    let session_id = state.sessions.create(report).await;

    info!(
        session_id = %session_id,
        file = %file_name,
        reports = summary.total_reports,
        pending = ?summary.pending_reports,
        "Upload processed"
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "session_id": session_id,
            "file_name": file_name,
            "sheet": sheet_name,
            "variant": state.config.run.aggregate.variant,
            "summary": summary,
            "columns": columns,
        })),
    ))
}

// ── Preview ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DigestPreview<'a> {
    subject: String,
    total_rows: usize,
    pending_rows: usize,
    #[serde(flatten)]
    digest: &'a RecipientDigest,
}

pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(overrides): Query<RunOverrides>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_session_id(&id)?;
    let report = state.sessions.report(id).await?;
    let options = overrides.apply(state.config.run);

    let aggregation = pipeline::run(&report, &options, today())?;
    let summary = TableSummary::build(&report.rows(options.normalize), &aggregation);
    let digests: Vec<DigestPreview> = aggregation
        .digests
        .values()
        .map(|digest| DigestPreview {
            subject: state.renderer.subject(digest),
            total_rows: digest.total_rows(),
            pending_rows: digest.pending_rows(),
            digest,
        })
        .collect();

    Ok(Json(serde_json::json!({
        "session_id": id,
        "variant": options.aggregate.variant,
        "summary": summary,
        "skipped": aggregation.skipped,
        "digests": digests,
    })))
}

pub async fn preview_recipient(
    State(state): State<AppState>,
    Path((id, recipient)): Path<(String, String)>,
    Query(overrides): Query<RunOverrides>,
) -> Result<Html<String>, ApiError> {
    let id = parse_session_id(&id)?;
    let report = state.sessions.report(id).await?;
    let options = overrides.apply(state.config.run);

    let aggregation = pipeline::run(&report, &options, today())?;
    let digest = aggregation
        .digests
        .get(&recipient_key(&recipient))
        .ok_or(SessionError::RecipientNotFound { id, recipient })?;
    let rendered = state.renderer.render(digest)?;
    Ok(Html(rendered.html))
}

// ── Send ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub account: String,
    #[serde(flatten)]
    pub overrides: RunOverrides,
}

pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendRequest>,
) -> Result<Json<SendHistory>, ApiError> {
    let id = parse_session_id(&id)?;
    let account = state.config.smtp.account(&body.account)?.clone();
    // Held until the run is recorded.
    let (_send_guard, report) = state.sessions.begin_send(id).await?;
    let options = body.overrides.apply(state.config.run);
    let today = today();
    let aggregation = pipeline::run(&report, &options, today)?;

    info!(
        session_id = %id,
        account = %account.id,
        recipients = aggregation.digests.len(),
        variant = %options.aggregate.variant,
        "Starting send run"
    );

    let config = Arc::clone(&state.config);
    let renderer = Arc::clone(&state.renderer);
    let connector = Arc::clone(&state.connector);
    let history = tokio::task::spawn_blocking(move || -> Result<SendHistory, DispatchError> {
        let mailer = connector.connect(&config.smtp, &account)?;
        Ok(dispatch(
            aggregation.digests.values(),
            &renderer,
            mailer.as_ref(),
            &account,
        ))
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Send task failed: {e}")))??;

    let marked = state.sessions.record_send(id, history.clone(), today).await?;
    info!(
        session_id = %id,
        sent = history.total_sent(),
        errors = history.total_errors(),
        marked,
        "Send run stored"
    );
    Ok(Json(history))
}

// ── History ─────────────────────────────────────────────────────────────

pub async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SendHistory>>, ApiError> {
    let id = parse_session_id(&id)?;
    Ok(Json(state.sessions.histories(id).await?))
}

pub async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SessionError::NotFound(id).into())
    }
}
