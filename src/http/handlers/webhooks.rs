use crate::domain::transaction::DeliveryChannel;
use crate::http::handlers::callbacks::build_payload;
use crate::http::middleware::raw_body::RawBody;
use crate::AppState;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;

/// Server-to-server notification. Always acknowledged so the provider stops
/// retrying; failures only reach the logs.
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Extension(RawBody(body)): Extension<RawBody>,
) -> impl IntoResponse {
    let payload = build_payload(query, headers, body);
    let report = state
        .payment_service
        .reconcile(&gateway, payload, DeliveryChannel::Webhook)
        .await;

    match &report.result {
        Ok(outcome) => tracing::info!(
            gateway = %gateway,
            transaction_id = %outcome.transaction_id,
            status = %outcome.status,
            applied = outcome.applied,
            "webhook processed"
        ),
        Err(e) => tracing::error!(
            gateway = %gateway,
            transaction_id = ?report.transaction.as_ref().map(|t| t.id),
            code = e.code(),
            error = %e,
            "webhook reconciliation failed"
        ),
    }

    (StatusCode::OK, "OK")
}
