//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::{SagaError, SagaOutcome};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Saga or remote service error.
    Saga(SagaError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Saga(err) => (saga_error_status(&err), err.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// Status for an error returned before or outside a saga.
pub fn saga_error_status(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::DuplicateRequest(_) | SagaError::InvalidState { .. } => StatusCode::CONFLICT,
        SagaError::ProductNotFound(_)
        | SagaError::WalletNotFound(_)
        | SagaError::OrderNotFound(_) => StatusCode::NOT_FOUND,
        SagaError::RemoteUnavailable { .. } | SagaError::Cancelled => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SagaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SagaError::DebitOutcomeUnknown { .. } => StatusCode::BAD_GATEWAY,
        SagaError::InsufficientFunds { .. }
        | SagaError::DebitDeclined(_)
        | SagaError::OrderRejected(_)
        | SagaError::AmountOverflow
        | SagaError::CompensationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// Status for a finished saga.
///
/// `Rejected` and `FailedAfterDebit` never share a status, so clients can
/// tell "nothing happened" from "money moved".
pub fn outcome_status(outcome: &SagaOutcome) -> StatusCode {
    match outcome {
        SagaOutcome::Completed { .. } => StatusCode::CREATED,
        SagaOutcome::Rejected { reason } => match reason {
            SagaError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            SagaError::ProductNotFound(_) | SagaError::WalletNotFound(_) => StatusCode::NOT_FOUND,
            SagaError::RemoteUnavailable { .. } | SagaError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
        SagaOutcome::FailedAfterDebit { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}
