//! HTTP surface: axum router over the session store.

pub mod error;
pub mod routes;
pub mod session;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header::CONTENT_TYPE},
    routing::{delete, get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::digest::DigestRenderer;
use crate::error::RenderError;
use crate::mail::Connector;

pub use error::ApiError;
pub use session::{SessionStore, spawn_sweep_task};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub renderer: Arc<DigestRenderer>,
    /// Opens the mail transport for a send run.
    pub connector: Arc<dyn Connector>,
}

impl AppState {
    pub fn new(config: AppConfig, connector: Arc<dyn Connector>) -> Result<Self, RenderError> {
        let renderer = DigestRenderer::new(config.subject_prefix.clone())?;
        Ok(Self {
            sessions: SessionStore::new(config.session_ttl),
            config: Arc::new(config),
            renderer: Arc::new(renderer),
            connector,
        })
    }
}

/// Build the router with every REST route.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/accounts", get(routes::list_accounts))
        .route("/api/uploads", post(routes::upload))
        .route("/api/sessions/{id}", delete(routes::close_session))
        .route("/api/sessions/{id}/preview", get(routes::preview))
        .route(
            "/api/sessions/{id}/preview/{recipient}",
            get(routes::preview_recipient),
        )
        .route("/api/sessions/{id}/send", post(routes::send))
        .route("/api/sessions/{id}/history", get(routes::history))
        .with_state(state)
        .layer(body_limit)
        .layer(cors)
}
