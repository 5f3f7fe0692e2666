use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use triage_core::TriageError;

// ---------------------------------------------------------------------------
// Internal sentinels for explicit statuses
// ---------------------------------------------------------------------------

/// Private sentinel error type used to carry an explicit HTTP 409 through the
/// `anyhow::Error` chain without touching the `TriageError` enum.
#[derive(Debug)]
struct ConflictError(serde_json::Value);

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConflictError {}

/// Private sentinel error type for explicit HTTP 400 responses.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Private sentinel error type for explicit HTTP 401 responses.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    /// Construct a 409 Conflict error with a structured body.
    pub fn conflict(body: serde_json::Value) -> Self {
        Self(ConflictError(body).into())
    }

    /// Construct a 401 Unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(c) = self.0.downcast_ref::<ConflictError>() {
            return (StatusCode::CONFLICT, axum::Json(c.0.clone())).into_response();
        }
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }
        if let Some(u) = self.0.downcast_ref::<UnauthorizedError>() {
            let body = serde_json::json!({ "error": u.0.clone() });
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }

        let status = if let Some(e) = self.0.downcast_ref::<TriageError>() {
            match e {
                TriageError::IncidentNotFound(_) => StatusCode::NOT_FOUND,
                TriageError::InvalidTenant(_) | TriageError::InvalidStatus(_) => {
                    StatusCode::BAD_REQUEST
                }
                // Malformed payloads and storage constraint violations are
                // the caller's problem at admission time.
                TriageError::Json(_) | TriageError::Store(_) => StatusCode::BAD_REQUEST,
                TriageError::MissingInitialAlert(_)
                | TriageError::Planner(_)
                | TriageError::LogStore(_)
                | TriageError::Evidence(_)
                | TriageError::BreakerOpen
                | TriageError::Timeout(_)
                | TriageError::ExternalCall { .. }
                | TriageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn incident_not_found_maps_to_404() {
        let err = AppError(TriageError::IncidentNotFound(Uuid::new_v4()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_tenant_maps_to_400() {
        let err = AppError(TriageError::InvalidTenant("".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_error_maps_to_400() {
        let err = AppError(TriageError::Store("constraint violated".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn conflict_constructor_maps_to_409() {
        let err = AppError::conflict(serde_json::json!({"message": "Duplicate webhook"}));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn unauthorized_constructor_maps_to_401() {
        let err = AppError::unauthorized("Signature mismatch");
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn unknown_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn breaker_open_maps_to_500() {
        let err = AppError(TriageError::BreakerOpen.into());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
