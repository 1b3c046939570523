//! Error → HTTP mapping.
//!
//! Every ledger error carries a stable kind tag; the response body is
//! always `{ "error": kind, "message": … }`. Internal failures (database,
//! serialization, invariant breaches) are logged in full and answered with
//! a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use billing_core::LedgerError;
use billing_store::StoreError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Unauthenticated(String),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Store(StoreError::Ledger(err))
    }
}

fn status_for(kind: &str) -> StatusCode {
    match kind {
        "validation_error" => StatusCode::BAD_REQUEST,
        "not_found" => StatusCode::NOT_FOUND,
        "state_conflict" | "concurrency_conflict" => StatusCode::CONFLICT,
        "business_rule_violation" => StatusCode::UNPROCESSABLE_ENTITY,
        "forbidden" => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            Self::Unauthenticated(message) => {
                (StatusCode::UNAUTHORIZED, "unauthenticated", message)
            }
            Self::Store(err) => {
                let kind = err.kind();
                let status = status_for(kind);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    // Full detail stays in the logs; the body stays generic.
                    error!(error = %err, kind, "internal error while serving request");
                    (status, kind, "internal error".to_string())
                } else {
                    (status, kind, err.to_string())
                }
            }
        };
        (status, Json(ErrorBody { error: kind, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_expected_statuses() {
        assert_eq!(status_for("validation_error"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("not_found"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("state_conflict"), StatusCode::CONFLICT);
        assert_eq!(status_for("concurrency_conflict"), StatusCode::CONFLICT);
        assert_eq!(
            status_for("business_rule_violation"),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for("forbidden"), StatusCode::FORBIDDEN);
        assert_eq!(status_for("internal_error"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_errors_hide_their_detail() {
        let response = ApiError::from(LedgerError::Invariant("remainder 0.01".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
