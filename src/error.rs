//! request-level error taxonomy and its mapping onto http responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// store unreachable (pool timeout, refused connection, tls or handshake
    /// failure, ...)
    #[error("failed to connect to the database: {0}")]
    Connection(String),

    /// malformed ingest payload; nothing was written
    #[error("invalid payload: {0}")]
    Validation(String),

    /// read/write failed after a connection was established
    #[error("storage error: {0}")]
    Storage(String),

    /// chart could not be drawn or encoded
    #[error("failed to render chart: {0}")]
    Render(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Connection(_) | AppError::Storage(_) | AppError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::Configuration(_) => AppError::Connection(err.to_string()),
            other => AppError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_a_client_error() {
        assert_eq!(
            AppError::Validation("missing field".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Storage("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn pool_timeouts_are_connection_errors() {
        assert!(matches!(AppError::from(sqlx::Error::PoolTimedOut), AppError::Connection(_)));
        assert!(matches!(AppError::from(sqlx::Error::RowNotFound), AppError::Storage(_)));
    }

    #[test]
    fn broken_handshake_is_a_connection_error() {
        let err = AppError::from(sqlx::Error::Protocol("unexpected startup message".into()));
        assert!(matches!(err, AppError::Connection(_)), "got {err:?}");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
