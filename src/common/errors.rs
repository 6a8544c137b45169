//! Request-level error type for the HTTP front door.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use maud::{html, DOCTYPE};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to show to a client. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Logs the error at a level matching its severity.
    pub fn log(&self) {
        match self {
            AppError::Internal(err) => tracing::error!(kind = self.kind(), "{err:#}"),
            other => tracing::debug!(kind = other.kind(), "{other}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status();
        let markup = html! {
            (DOCTYPE)
            html {
                head { title { (status.as_u16()) } }
                body {
                    h1 { (status.canonical_reason().unwrap_or("Error")) }
                    p { (self.public_message()) }
                }
            }
        };
        (status, Html(markup.into_string())).into_response()
    }
}
