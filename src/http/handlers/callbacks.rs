use crate::domain::transaction::DeliveryChannel;
use crate::gateways::CallbackPayload;
use crate::http::middleware::raw_body::RawBody;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, RawQuery, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde_json::{json, Map, Value};

fn form_fields(bytes: &[u8]) -> Map<String, Value> {
    serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

fn body_fields(headers: &HeaderMap, body: &[u8]) -> Map<String, Value> {
    if body.is_empty() {
        return Map::new();
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return form_fields(body);
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => form_fields(body),
    }
}

/// Union of the decoded body and the query string; query values win.
pub fn build_payload(query: Option<String>, headers: HeaderMap, body: Bytes) -> CallbackPayload {
    let mut fields = body_fields(&headers, &body);
    if let Some(query) = query {
        fields.extend(form_fields(query.as_bytes()));
    }
    CallbackPayload {
        fields: Value::Object(fields),
        raw_body: body.to_vec(),
        headers,
    }
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

/// Browser return from a provider checkout. Ends in a redirect to the tenant's
/// success or failure page unless the caller asked for JSON.
pub async fn payment_callback(
    State(state): State<AppState>,
    Path(gateway): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    Extension(RawBody(body)): Extension<RawBody>,
) -> Response {
    let json_mode = wants_json(&headers);
    let payload = build_payload(query, headers, body);
    let report = state
        .payment_service
        .reconcile(&gateway, payload, DeliveryChannel::Callback)
        .await;

    if let Err(e) = &report.result {
        tracing::warn!(gateway = %gateway, code = e.code(), error = %e, "callback reconciliation failed");
    }

    if json_mode {
        return match report.result {
            Ok(outcome) => (
                StatusCode::OK,
                Json(json!({
                    "success": outcome.status.is_success(),
                    "data": {
                        "transactionId": outcome.transaction_id,
                        "status": outcome.status,
                        "applied": outcome.applied,
                    }
                })),
            )
                .into_response(),
            Err(e) => e.into_response(),
        };
    }

    let location = report.redirect_location(&state.config.frontend_base);
    Redirect::to(&location).into_response()
}
