use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;

/// Short-circuit responses produced by the coordination interceptors.
///
/// Each variant maps to one status code and a `{"error": "..."}` JSON body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordError {
    /// A rate limiter refused the request. Converts to `429 Too Many Requests`.
    #[error("too many requests")]
    TooManyRequests,

    /// Another holder owns the lease. Converts to `429 Too Many Requests`.
    #[error("resource is locked")]
    Locked,

    /// The work queue had nothing to hand over. Converts to `204 No Content`
    /// with an empty body.
    #[error("queue is empty")]
    QueueEmpty,

    /// The claimed work item could not be read as text.
    #[error("invalid item type")]
    InvalidItem,

    #[error("missing session_id")]
    MissingSession,

    #[error("session not found")]
    SessionNotFound,

    #[error("unauthorized")]
    Unauthorized,

    /// The compare-and-swap found a different value. Converts to `409 Conflict`.
    #[error("update failed, expected value did not match")]
    Conflict,

    /// The store could not decide and the layer is configured to fail closed.
    /// Converts to `503 Service Unavailable`.
    #[error("coordination store unavailable")]
    StoreUnavailable,

    /// A panic or an unhandled error further down the chain.
    #[error("internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl CoordError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooManyRequests | Self::Locked => StatusCode::TOO_MANY_REQUESTS,
            Self::QueueEmpty => StatusCode::NO_CONTENT,
            Self::InvalidItem | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingSession | Self::SessionNotFound | Self::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            Self::Conflict => StatusCode::CONFLICT,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for CoordError {
    fn into_response(self) -> Response {
        let status = self.status();
        // 204 must not carry a body
        if status == StatusCode::NO_CONTENT {
            return status.into_response();
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
