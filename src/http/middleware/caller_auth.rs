use crate::domain::context::{CallerContext, Claims};
use crate::error::PaymentError;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::AUTHORIZATION, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
}

/// Decodes the bearer token and attaches the caller to the request.
pub async fn require_caller(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    let Some(token) = token else {
        return PaymentError::Unauthorized("Missing bearer token".to_string()).into_response();
    };

    match decode::<Claims>(
        &token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    ) {
        Ok(data) => {
            request
                .extensions_mut()
                .insert(CallerContext::from_claims(&data.claims));
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            PaymentError::Unauthorized("Invalid or expired token".to_string()).into_response()
        }
    }
}
