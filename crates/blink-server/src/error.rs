use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Caller-visible failure kinds for every store and HTTP operation.
#[derive(Error, Debug)]
pub enum BlinkError {
    #[error("{0}")]
    Validation(String),

    /// Absent, expired, or read-exhausted. Deliberately indistinguishable.
    #[error("not found or expired")]
    NotFound,

    #[error("slug is already taken")]
    SlugTaken,

    #[error("could not allocate a free identifier, try again")]
    AllocationExhausted,

    #[error("unauthorized")]
    Unauthorized,

    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BlinkError {
    pub fn kind(&self) -> &'static str {
        match self {
            BlinkError::Validation(_) => "validation",
            BlinkError::NotFound => "not_found",
            BlinkError::SlugTaken => "slug_taken",
            BlinkError::AllocationExhausted => "allocation_exhausted",
            BlinkError::Unauthorized => "unauthorized",
            BlinkError::Storage(_) | BlinkError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            BlinkError::Validation(_) | BlinkError::SlugTaken => StatusCode::BAD_REQUEST,
            BlinkError::NotFound => StatusCode::NOT_FOUND,
            BlinkError::AllocationExhausted => StatusCode::SERVICE_UNAVAILABLE,
            BlinkError::Unauthorized => StatusCode::UNAUTHORIZED,
            BlinkError::Storage(_) | BlinkError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redb::DatabaseError> for BlinkError {
    fn from(value: redb::DatabaseError) -> Self {
        Self::Storage(value.into())
    }
}

impl From<redb::TransactionError> for BlinkError {
    fn from(value: redb::TransactionError) -> Self {
        Self::Storage(value.into())
    }
}

impl From<redb::TableError> for BlinkError {
    fn from(value: redb::TableError) -> Self {
        Self::Storage(value.into())
    }
}

impl From<redb::StorageError> for BlinkError {
    fn from(value: redb::StorageError) -> Self {
        Self::Storage(value.into())
    }
}

impl From<redb::CommitError> for BlinkError {
    fn from(value: redb::CommitError) -> Self {
        Self::Storage(value.into())
    }
}

impl IntoResponse for BlinkError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            BlinkError::Storage(e) => {
                tracing::error!(error = %e, "storage error");
                "internal server error".to_owned()
            }
            BlinkError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "internal server error".to_owned()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message, "kind": self.kind() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_distinct_statuses() {
        assert_eq!(BlinkError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(BlinkError::SlugTaken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(BlinkError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(BlinkError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            BlinkError::AllocationExhausted.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(BlinkError::SlugTaken.kind(), "slug_taken");
    }

    #[test]
    fn internal_errors_hide_detail() {
        let err = BlinkError::Internal(anyhow::anyhow!("disk on fire at /var/lib/x"));
        assert_eq!(err.kind(), "internal");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // The store logs exhaustion with the identifier kind; the response only renders it.
    #[tokio::test]
    async fn allocation_exhausted_renders_retry_hint() {
        let resp = BlinkError::AllocationExhausted.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "allocation_exhausted");
        assert_eq!(
            body["error"],
            "could not allocate a free identifier, try again"
        );
    }
}
