use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, AppError>;

/// Catch-all error for handlers outside the relationship state machine.
pub struct AppError(anyhow::Error);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = ?self.0, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Outcome taxonomy for friend transitions and authorization.
#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    InvalidTransition(&'static str),
    #[error("Unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FriendError {
    pub fn status(&self) -> StatusCode {
        match self {
            FriendError::NotFound(_) => StatusCode::NOT_FOUND,
            FriendError::InvalidTransition(_) => StatusCode::BAD_REQUEST,
            FriendError::Unauthorized => StatusCode::UNAUTHORIZED,
            FriendError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The caller-facing reason. Internal faults never leak their detail.
    pub fn message(&self) -> String {
        match self {
            FriendError::Internal(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for FriendError {
    fn from(err: StoreError) -> Self {
        FriendError::Internal(err.into())
    }
}

impl IntoResponse for FriendError {
    fn into_response(self) -> Response {
        if let FriendError::Internal(err) = &self {
            tracing::error!(error = ?err, "friend operation failed");
        }
        (self.status(), self.message()).into_response()
    }
}
