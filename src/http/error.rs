use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::app::auth::AuthError;
use crate::app::feed::FeedError;
use crate::app::posts::PostError;
use crate::app::users::UserError;
use crate::store::StoreError;

/// JSON error body `{"error": ...}` with an HTTP status.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Maps a store failure. Backend details are logged, never returned.
    pub(crate) fn store(err: StoreError, action: &'static str) -> Self {
        match err {
            StoreError::Invalid(message) => Self::bad_request(message),
            StoreError::Conflict(message) => Self::conflict(message),
            other => {
                tracing::error!(error = ?other, action, "store request failed");
                Self::internal(format!("failed to {}", action))
            }
        }
    }

    pub(crate) fn post(err: PostError, action: &'static str) -> Self {
        match err {
            PostError::Validation(err) => Self::bad_request(err.to_string()),
            PostError::Store(err) => Self::store(err, action),
        }
    }

    pub(crate) fn user(err: UserError, action: &'static str) -> Self {
        match err {
            UserError::Validation(err) => Self::bad_request(err.to_string()),
            UserError::Store(err) => Self::store(err, action),
        }
    }

    pub(crate) fn auth(err: AuthError, action: &'static str) -> Self {
        match err {
            AuthError::EarlyAccessClosed => Self::forbidden(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidRefreshToken => {
                Self::unauthorized(err.to_string())
            }
            AuthError::UsernameTaken | AuthError::EmailTaken => Self::conflict(err.to_string()),
            AuthError::Invalid(message) => Self::bad_request(message),
            AuthError::Store(err) => Self::store(err, action),
            AuthError::Internal(err) => {
                tracing::error!(error = ?err, action, "auth request failed");
                Self::internal(format!("failed to {}", action))
            }
        }
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::ViewerRequired => Self::unauthorized(err.to_string()),
            FeedError::UnknownMode(_) | FeedError::InvalidPage(_) => {
                Self::bad_request(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}
