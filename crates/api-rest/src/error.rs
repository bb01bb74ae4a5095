//! Mapping of [`RestError`] onto HTTP responses.

use api_shared::ErrorEnvelope;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use emr_core::RestError;
use emr_domain::DomainError;

/// A failed request. Wraps the core error so it can be turned into a response.
#[derive(Debug)]
pub struct ApiError(pub RestError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<RestError> for ApiError {
    fn from(e: RestError) -> Self {
        Self(e)
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(RestError::Domain(e))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            RestError::ObjectNotFound(_) | RestError::Domain(DomainError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            RestError::OperationNotSupported(_) => StatusCode::METHOD_NOT_ALLOWED,
            RestError::Conversion { .. }
            | RestError::IllegalRequest(_)
            | RestError::CyclicStructure { .. }
            | RestError::UnsupportedRepresentation { .. }
            | RestError::Domain(DomainError::Validation(_)) => StatusCode::BAD_REQUEST,
            RestError::Domain(DomainError::Conflict(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error: {:?}", self.0);
            "Internal error".to_owned()
        } else {
            self.0.to_string()
        };
        (status, Json(ErrorEnvelope::new(self.0.code(), message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (RestError::ObjectNotFound("patient x".into()), StatusCode::NOT_FOUND),
            (
                RestError::Domain(DomainError::NotFound("obs y".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                RestError::OperationNotSupported("purge".into()),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (RestError::conversion("gender", "bad"), StatusCode::BAD_REQUEST),
            (RestError::IllegalRequest("no".into()), StatusCode::BAD_REQUEST),
            (
                RestError::Domain(DomainError::Validation("name".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                RestError::Domain(DomainError::Conflict("dup".into())),
                StatusCode::CONFLICT,
            ),
            (
                RestError::InvalidConfig("limit".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let code = error.code();
            assert_eq!(ApiError(error).status(), expected, "status for {code}");
        }
    }
}
