//! API-facing error type and HTTP status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gate::Rejection;
use crate::processor::ProcessorError;

/// Errors a request handler can return.
#[derive(Debug, Error)]
pub enum Error {
    /// The ledger gate refused the request.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// The downstream processor failed after admission. The debit stands.
    #[error(transparent)]
    Processor(#[from] ProcessorError),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Rejected(Rejection::MissingKey | Rejection::UnknownKey) => {
                StatusCode::UNAUTHORIZED
            }
            Error::Rejected(Rejection::Inactive) => StatusCode::FORBIDDEN,
            Error::Rejected(Rejection::InsufficientCredit) => StatusCode::TOO_MANY_REQUESTS,
            Error::Rejected(Rejection::StoreUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Processor(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// A user-safe message, without leaking upstream bodies or internals.
    pub fn user_message(&self) -> String {
        match self {
            Error::Rejected(rejection) => rejection.to_string(),
            Error::Processor(_) => "inference backend is unavailable".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Infrastructure failures are system errors; quota and auth
        // rejections are normal traffic and stay at debug.
        match &self {
            Error::Rejected(Rejection::StoreUnavailable) => {
                tracing::error!("refusing request: {}", self);
            }
            Error::Processor(err) => {
                tracing::warn!(error = %err, "processor failed after admission");
            }
            Error::Rejected(_) => {
                tracing::debug!("rejected request: {}", self);
            }
        }

        let body = json!({ "detail": self.user_message() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Type alias for handler results.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_status_mapping() {
        assert_eq!(
            Error::from(Rejection::MissingKey).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::from(Rejection::UnknownKey).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::from(Rejection::Inactive).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            Error::from(Rejection::InsufficientCredit).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Error::from(Rejection::StoreUnavailable).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn processor_failures_are_bad_gateway_and_unleaked() {
        let err = Error::from(ProcessorError::Status {
            status: 500,
            body: "secret internals".to_string(),
        });

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.user_message().contains("secret internals"));
    }
}
