//! Error types for the faucet service

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Message returned when no caller-supplied payout address is usable
pub const ADDRESS_REQUIRED: &str = "FaucetPay address is required";

/// Fallback message when the payout service rejects without explaining why
pub const PAYOUT_REJECTED_FALLBACK: &str = "Failed to claim faucet reward";

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Method {0} Not Allowed")]
    MethodNotAllowed(String),

    #[error("Unauthorized: {message}")]
    Unauthorized {
        message: String,
        /// Error body produced by the identity provider, forwarded as-is
        details: Option<Value>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Please wait {0} seconds before claiming again")]
    RateLimited(u64),

    #[error("A claim for this account is already being processed")]
    ClaimInProgress,

    #[error("Service misconfigured: {0}")]
    ServiceMisconfigured(String),

    #[error("Payout rejected: {message}")]
    PayoutRejected {
        message: String,
        details: Value,
        retryable: bool,
    },

    #[error("Payout service unavailable: {0}")]
    PayoutUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FaucetError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        FaucetError::Unauthorized {
            message: message.into(),
            details: None,
        }
    }

    /// Errors nobody anticipated; these go to the error tracker.
    pub fn is_internal(&self) -> bool {
        matches!(self, FaucetError::Storage(_) | FaucetError::Internal(_))
    }

    /// Label used for the `outcome` dimension of the claim counter
    pub fn outcome(&self) -> &'static str {
        match self {
            FaucetError::MethodNotAllowed(_) => "method_not_allowed",
            FaucetError::Unauthorized { .. } => "unauthorized",
            FaucetError::InvalidArgument(_) => "invalid_argument",
            FaucetError::RateLimited(_) => "rate_limited",
            FaucetError::ClaimInProgress => "in_progress",
            FaucetError::ServiceMisconfigured(_) => "misconfigured",
            FaucetError::PayoutRejected { .. } => "rejected",
            FaucetError::PayoutUnavailable(_) => "unavailable",
            FaucetError::Storage(_) | FaucetError::Internal(_) => "internal_error",
        }
    }
}

/// Seconds a client should wait before retrying a temporarily unavailable payout
const PAYOUT_RETRY_AFTER_SECS: u64 = 30;

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        match self {
            FaucetError::MethodNotAllowed(method) => (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, HeaderValue::from_static("POST"))],
                format!("Method {} Not Allowed", method),
            )
                .into_response(),
            FaucetError::Unauthorized { message, details } => {
                let body = details.unwrap_or_else(|| json!({ "error": message }));
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            FaucetError::InvalidArgument(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            FaucetError::RateLimited(seconds) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, seconds.to_string())],
                Json(json!({
                    "error": format!("Please wait {} seconds before claiming again", seconds)
                })),
            )
                .into_response(),
            FaucetError::ClaimInProgress => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "A claim for this account is already being processed" })),
            )
                .into_response(),
            FaucetError::ServiceMisconfigured(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response(),
            FaucetError::PayoutRejected {
                message,
                details,
                retryable,
            } => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": message,
                    "details": details,
                    "retryable": retryable
                })),
            )
                .into_response(),
            FaucetError::PayoutUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, PAYOUT_RETRY_AFTER_SECS.to_string())],
                Json(json!({ "error": "Payout service unavailable, please try again later" })),
            )
                .into_response(),
            FaucetError::Storage(_) | FaucetError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal Server Error" })),
            )
                .into_response(),
        }
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
