use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the executor lifecycle and the dispatcher.
///
/// Every variant maps to exactly one HTTP status via [`ProxyError::status_code`]
/// and a sanitized caller-facing message via [`ProxyError::user_message`] — no
/// error is swallowed, but internal detail (io errors, raw stderr) stays in the
/// trace log rather than crossing the HTTP boundary.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no action defined yet")]
    NotInitialized,

    #[error("command exited")]
    ProcessExited,

    #[error("command exited")]
    InitRefused,

    #[error("command exited")]
    Timeout,

    #[error("no answer from the action")]
    NoAnswer,

    #[error("The action did not return a dictionary.")]
    ReplyNotObject,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("resource failure: {0}")]
    ResourceFailure(String),

    #[error("unknown model kind for action_name: {0}")]
    UnknownKind(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::NotInitialized => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::ProcessExited => StatusCode::BAD_REQUEST,
            ProxyError::InitRefused => StatusCode::BAD_REQUEST,
            ProxyError::Timeout => StatusCode::BAD_REQUEST,
            ProxyError::NoAnswer => StatusCode::BAD_REQUEST,
            ProxyError::ReplyNotObject => StatusCode::BAD_GATEWAY,
            ProxyError::WriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::ResourceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UnknownKind(_) => StatusCode::BAD_REQUEST,
            ProxyError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Json(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Sanitized message safe to return to the orchestrator. Does not leak
    /// raw io errors or internal paths.
    pub fn user_message(&self) -> String {
        match self {
            ProxyError::Io(_) => "resource failure".to_string(),
            ProxyError::Json(_) => "bad request".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrResponse {
    error: String,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "request failed");
        let status = self.status_code();
        let body = ErrResponse {
            error: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}
