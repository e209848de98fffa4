use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::OnceLock;
use thiserror::Error;

use crate::gateways::{GatewayErrorKind, GatewayFailure};

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    InvalidSignature(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) => StatusCode::BAD_REQUEST,
            PaymentError::Forbidden(_) => StatusCode::FORBIDDEN,
            PaymentError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PaymentError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Upstream(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Configuration(_) | PaymentError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::Forbidden(_) => "FORBIDDEN",
            PaymentError::Unauthorized(_) => "UNAUTHORIZED",
            PaymentError::InvalidSignature(_) => "INVALID_SIGNATURE",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::Upstream(_) => "GATEWAY_ERROR",
            PaymentError::Configuration(_) => "CONFIGURATION_ERROR",
            PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PaymentError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        PaymentError::NotFound(msg.into())
    }

    /// Message safe to show a client.
    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Internal(e) if !is_production() => format!("internal error: {e:#}"),
            PaymentError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<GatewayFailure> for PaymentError {
    fn from(f: GatewayFailure) -> Self {
        match f.kind {
            GatewayErrorKind::Configuration => PaymentError::Configuration(f.message),
            GatewayErrorKind::InvalidSignature => PaymentError::InvalidSignature(f.message),
            GatewayErrorKind::InvalidPayload => PaymentError::Validation(f.message),
            GatewayErrorKind::Upstream => PaymentError::Upstream(f.message),
        }
    }
}

fn is_production() -> bool {
    static PRODUCTION: OnceLock<bool> = OnceLock::new();
    *PRODUCTION.get_or_init(|| {
        std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false)
    })
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        }
        let body = Json(json!({
            "success": false,
            "code": self.code(),
            "message": self.public_message(),
        }));
        (status, body).into_response()
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_and_not_found_are_distinct_client_errors() {
        let sig = PaymentError::InvalidSignature("bad".to_string());
        let missing = PaymentError::not_found("nope");
        assert_eq!(sig.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_ne!(sig.code(), missing.code());
    }

    #[test]
    fn gateway_failures_map_onto_taxonomy() {
        let cfg: PaymentError = GatewayFailure::configuration("missing keys").into();
        assert_eq!(cfg.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let upstream: PaymentError = GatewayFailure::upstream("timeout", None).into();
        assert_eq!(upstream.status_code(), StatusCode::BAD_GATEWAY);

        let payload: PaymentError = GatewayFailure::invalid_payload("no order").into();
        assert_eq!(payload.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn response_body_has_envelope_fields() {
        let response = PaymentError::validation("amount must be greater than 0").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["message"], "amount must be greater than 0");
    }
}
