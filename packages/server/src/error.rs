use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use vault::ContentError;

use crate::delivery::DeliveryError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `PERMISSION_DENIED`, `NOT_FOUND`, `CONFLICT`,
    /// `PAYMENT_INVALID`, `CONTENT_CORRUPTED`, `SETTLEMENT_FAILED`,
    /// `SERVICE_UNAVAILABLE`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "content must not be empty")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    /// A payment was attached but the facilitator refused it.
    PaymentInvalid(String),
    ContentCorrupted,
    SettlementFailed,
    ServiceUnavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Insufficient permissions".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::PaymentInvalid(reason) => (
                StatusCode::PAYMENT_REQUIRED,
                ErrorBody {
                    code: "PAYMENT_INVALID",
                    message: format!("Payment verification failed: {reason}"),
                },
            ),
            AppError::ContentCorrupted => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    code: "CONTENT_CORRUPTED",
                    message: "Stored content failed its integrity check".into(),
                },
            ),
            AppError::SettlementFailed => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    code: "SETTLEMENT_FAILED",
                    message: "Payment could not be settled. You have not been charged.".into(),
                },
            ),
            AppError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorBody {
                    code: "SERVICE_UNAVAILABLE",
                    message: msg,
                },
            ),
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ContentError> for AppError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::Validation(msg) => AppError::Validation(msg),
            ContentError::Corrupted => AppError::ContentCorrupted,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::NotFound => AppError::NotFound("Resource not found".into()),
            DeliveryError::PaymentInvalid(reason) => AppError::PaymentInvalid(reason),
            DeliveryError::ContentCorrupted => AppError::ContentCorrupted,
            DeliveryError::SettlementFailed(_) => AppError::SettlementFailed,
            DeliveryError::Facilitator(e) => {
                tracing::warn!("Facilitator unavailable: {e}");
                AppError::ServiceUnavailable("Payment facilitator unavailable".into())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}
