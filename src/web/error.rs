//! HTTP mapping for service errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::error::{DispatchError, Error, IngestError, RenderError, SessionError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
    Service(Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Service(err) => match err {
                Error::Ingest(IngestError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
                Error::Ingest(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::Session(_) => StatusCode::NOT_FOUND,
                Error::Dispatch(DispatchError::UnknownAccount(_)) => StatusCode::BAD_REQUEST,
                Error::Dispatch(DispatchError::Connect { .. }) => StatusCode::BAD_GATEWAY,
                Error::Dispatch(_) | Error::Render(_) | Error::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) | Self::Internal(message) => message.clone(),
            Self::Service(err) => err.to_string(),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "Request rejected");
        }

        let mut body = serde_json::json!({"error": message});
        if let Self::Service(Error::Ingest(IngestError::MissingColumns { fields })) = &self {
            body["missing_columns"] = serde_json::json!(fields);
        }
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::Service(err)
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        Self::Service(err.into())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self::Service(err.into())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self::Service(err.into())
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        Self::Service(err.into())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::report::Field;

    #[test]
    fn status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (SessionError::NotFound(Uuid::nil()).into(), StatusCode::NOT_FOUND),
            (
                IngestError::MissingColumns { fields: vec![Field::Owner] }.into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                IngestError::UnsupportedFile { name: "a.csv".into() }.into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DispatchError::UnknownAccount("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                DispatchError::Connect {
                    host: "smtp".into(),
                    reason: "refused".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err:?}");
        }
    }
}
