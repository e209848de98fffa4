use crate::http::handlers::{callbacks, ops, payments, webhooks};
use crate::http::middleware::caller_auth::{self, AuthState};
use crate::http::middleware::rate_limit::{self, RateLimitState};
use crate::http::middleware::raw_body;
use crate::AppState;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/payments", get(payments::list_transactions))
        .route("/payments/initiate", post(payments::initiate_payment))
        .route("/payments/refund", post(payments::refund_payment))
        .route("/payments/transaction/:id", get(payments::get_transaction))
        .layer(from_fn_with_state(
            AuthState {
                jwt_secret: state.config.jwt_secret.clone(),
            },
            caller_auth::require_caller,
        ));

    let mut inbound = Router::new()
        .route(
            "/payments/callback/:gateway",
            get(callbacks::payment_callback).post(callbacks::payment_callback),
        )
        .route("/webhooks/:gateway", post(webhooks::provider_webhook))
        .layer(from_fn(raw_body::capture_raw_body));

    if let Some(redis_client) = state.redis_client.clone() {
        inbound = inbound.layer(from_fn_with_state(
            RateLimitState {
                redis_client,
                max_per_minute: state.config.callback_rate_limit_per_minute,
            },
            rate_limit::enforce,
        ));
    }

    Router::new()
        .route("/health", get(ops::health))
        .route("/ops/liveness", get(ops::liveness))
        .route("/ops/readiness", get(ops::readiness))
        .merge(authenticated)
        .merge(inbound)
        .with_state(state)
}
