use crate::error::PaymentError;
use axum::body::{Body, Bytes};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Request body exactly as received, for signature checks.
#[derive(Debug, Clone, Default)]
pub struct RawBody(pub Bytes);

/// Buffers the body once and hands both the bytes and a fresh body downstream.
/// Mounted only on callback and webhook routes.
pub async fn capture_raw_body(request: Request<Body>, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "callback body rejected");
            return PaymentError::validation("Request body could not be read").into_response();
        }
    };
    parts.extensions.insert(RawBody(bytes.clone()));
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}
