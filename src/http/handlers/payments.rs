use crate::domain::context::CallerContext;
use crate::domain::payment::{InitiatePaymentRequest, RefundRequest};
use crate::error::{PaymentError, PaymentResult};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> PaymentResult<T> {
    body.map(|Json(v)| v)
        .map_err(|e| PaymentError::validation(format!("Invalid request body: {}", e.body_text())))
}

pub async fn initiate_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> PaymentResult<impl IntoResponse> {
    let req = json_body(body)?;
    let resp = state.payment_service.initiate(&caller, req).await?;
    Ok((StatusCode::OK, Json(json!({ "success": true, "data": resp }))))
}

pub async fn refund_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    body: Result<Json<RefundRequest>, JsonRejection>,
) -> PaymentResult<impl IntoResponse> {
    let req = json_body(body)?;
    let outcome = state.payment_service.refund(&caller, req).await?;
    Ok(Json(json!({ "success": true, "data": outcome })))
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub format: Option<String>,
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Query(query): Query<TransactionQuery>,
) -> PaymentResult<Response> {
    let tx = state.payment_service.get_transaction(&caller, &id).await?;

    if query.format.as_deref() == Some("pdf") {
        // Invoice rendering lives outside this service.
        return Ok((
            StatusCode::NOT_IMPLEMENTED,
            Json(json!({
                "success": false,
                "code": "NOT_IMPLEMENTED",
                "message": format!("Invoice rendering is not available for transaction {}", tx.id),
            })),
        )
            .into_response());
    }

    Ok(Json(json!({ "success": true, "data": tx })).into_response())
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
) -> PaymentResult<impl IntoResponse> {
    let rows = state.payment_service.list_transactions(&caller).await?;
    Ok(Json(json!({ "success": true, "data": rows })))
}
