use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use coffre_store::StoreError;

/// Error taxonomy surfaced by the API. Authorization and validation
/// failures map to stable 4xx codes and are never retried; transient
/// backend failures surface as 503 after bounded retries.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Account is locked")]
    AccountLocked,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::AccessDenied(_) => "access_denied",
            ServerError::AccountLocked => "account_locked",
            ServerError::Unauthorized(_) => "unauthorized",
            ServerError::NotFound(_) => "not_found",
            ServerError::Conflict(_) => "conflict",
            ServerError::PayloadTooLarge { .. } => "payload_too_large",
            ServerError::InvalidInput(_) => "invalid_input",
            ServerError::Unavailable(_) => "unavailable",
            ServerError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::AccessDenied(_) => (StatusCode::FORBIDDEN, self.to_string()),
            ServerError::AccountLocked => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Conflict(_) => (StatusCode::CONFLICT, self.to_string()),
            ServerError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, self.to_string())
            }
            ServerError::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::Unavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable".to_string())
            }
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServerError::NotFound("record not found".to_string()),
            StoreError::Conflict(msg) => ServerError::Conflict(msg),
            // Backend detail is logged where the error originates, not leaked.
            other => ServerError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (ServerError::AccessDenied("x".into()), StatusCode::FORBIDDEN),
            (ServerError::AccountLocked, StatusCode::UNAUTHORIZED),
            (ServerError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ServerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServerError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                ServerError::PayloadTooLarge { size: 2, max: 1 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (ServerError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ServerError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            ServerError::from(StoreError::NotFound),
            ServerError::NotFound(_)
        ));
        assert!(matches!(
            ServerError::from(StoreError::Conflict("dup".into())),
            ServerError::Conflict(_)
        ));
        assert!(matches!(
            ServerError::from(StoreError::Migration("boom".into())),
            ServerError::Unavailable(_)
        ));
    }
}
