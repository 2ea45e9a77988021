use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use trojan_shared::{CategoryError, IdError};
use trojan_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    InvalidId(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Upload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Media storage error: {0}")]
    MediaStorage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(kind) => ServerError::NotFound(not_found_message(kind)),
            StoreError::Validation(msg) => ServerError::Validation(msg),
            StoreError::InvalidId(e) => e.into(),
            StoreError::Forbidden(msg) => ServerError::Forbidden(msg),
            StoreError::EmailTaken => {
                ServerError::Validation(StoreError::EmailTaken.to_string())
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<IdError> for ServerError {
    fn from(err: IdError) -> Self {
        match err {
            IdError::Missing { .. } => ServerError::Validation(err.to_string()),
            IdError::Malformed { .. } => ServerError::InvalidId(err.to_string()),
        }
    }
}

impl From<CategoryError> for ServerError {
    fn from(err: CategoryError) -> Self {
        ServerError::Validation(err.to_string())
    }
}

fn not_found_message(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => format!("{}{} not found", first.to_uppercase(), chars.as_str()),
        None => "Not found".to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::Validation(_) | ServerError::InvalidId(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::MediaStorage(detail) => {
                tracing::error!(error = %detail, "Media storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Media storage error".to_string())
            }
            ServerError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::NotFound("listing"), StatusCode::NOT_FOUND),
            (StoreError::Validation("name is required".into()), StatusCode::BAD_REQUEST),
            (StoreError::Forbidden("not yours".into()), StatusCode::FORBIDDEN),
            (StoreError::EmailTaken, StatusCode::BAD_REQUEST),
            (
                StoreError::InvalidId(IdError::Malformed {
                    kind: "listing",
                    value: "nope".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (StoreError::Migration("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            let response = ServerError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }

    #[test]
    fn not_found_message_is_capitalized() {
        let err = ServerError::from(StoreError::NotFound("conversation"));
        assert_eq!(err.to_string(), "Conversation not found");
    }

    #[test]
    fn missing_id_is_validation() {
        let err = ServerError::from(IdError::Missing { kind: "listing" });
        assert!(matches!(err, ServerError::Validation(_)));
    }
}
