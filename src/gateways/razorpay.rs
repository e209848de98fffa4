use crate::domain::payment::{GatewayKind, PaymentStatus};
use crate::domain::transaction::GatewayRefs;
use crate::gateways::signature::{redact, verify_hmac_sha256_hex};
use crate::gateways::{
    non_empty, read_json_response, CallbackPayload, CheckoutPrefill, CompletionAction, GatewayFailure,
    GatewayOutcome, InitiateData, InitiateInput, PaymentGateway, RefundData, RefundInput, VerifiedPayment,
    VerifyInput,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.razorpay.com";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Standard Checkout: server-side order, client-side popup, HMAC callback.
pub struct RazorpayGateway {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl RazorpayGateway {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn verify_checkout_callback(
        &self,
        payload: &CallbackPayload,
        key_secret: &str,
    ) -> GatewayOutcome<VerifiedPayment> {
        let order_id = payload.first_of(&[&["razorpay_order_id"], &["order_id"]]);
        let payment_id = payload.first_of(&[&["razorpay_payment_id"], &["payment_id"]]);
        let signature = payload.first_of(&[&["razorpay_signature"], &["signature"]]);

        let (Some(order_id), Some(payment_id), Some(signature)) = (order_id, payment_id, signature) else {
            return Err(GatewayFailure::invalid_payload(
                "Missing Razorpay verification fields",
            ));
        };

        let message = format!("{order_id}|{payment_id}");
        if !verify_hmac_sha256_hex(key_secret, message.as_bytes(), &signature) {
            tracing::warn!(
                gateway = "razorpay",
                order_id = %order_id,
                provided_prefix = %redact(&signature),
                "checkout signature mismatch"
            );
            return Err(GatewayFailure::invalid_signature("Invalid Razorpay signature"));
        }

        Ok(VerifiedPayment {
            status: PaymentStatus::Paid,
            provider_status: "signature_verified".to_string(),
            // transactionId is not covered by the signature.
            correlation_id: None,
            gateway_payment_id: Some(payment_id),
            gateway_order_id: Some(order_id),
            confirmed_amount: None,
        })
    }

    fn verify_webhook(
        &self,
        payload: &CallbackPayload,
        signature: &str,
        webhook_secret: Option<&str>,
    ) -> GatewayOutcome<VerifiedPayment> {
        let Some(secret) = webhook_secret else {
            return Err(GatewayFailure::configuration(
                "Razorpay webhook secret is not configured",
            ));
        };
        if payload.raw_body.is_empty() {
            return Err(GatewayFailure::invalid_payload(
                "Razorpay webhook signature requires the raw request body",
            ));
        }
        if !verify_hmac_sha256_hex(secret, &payload.raw_body, signature) {
            tracing::warn!(
                gateway = "razorpay",
                provided_prefix = %redact(signature),
                "webhook signature mismatch"
            );
            return Err(GatewayFailure::invalid_signature(
                "Invalid Razorpay webhook signature",
            ));
        }

        // Fields are only trusted from the body that was signed.
        let body: serde_json::Value = serde_json::from_slice(&payload.raw_body)
            .map_err(|_| GatewayFailure::invalid_payload("Razorpay webhook body is not JSON"))?;
        let entity = body
            .pointer("/payload/payment/entity")
            .ok_or_else(|| GatewayFailure::invalid_payload("Razorpay webhook has no payment entity"))?;

        let provider_status = entity
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let status = normalize_status(&provider_status);
        let confirmed_amount = if status == PaymentStatus::Paid {
            entity.get("amount").and_then(|v| v.as_i64()).map(|paise| Decimal::new(paise, 2))
        } else {
            None
        };

        Ok(VerifiedPayment {
            status,
            provider_status,
            correlation_id: entity
                .pointer("/notes/transactionId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            gateway_payment_id: entity.get("id").and_then(|v| v.as_str()).map(str::to_string),
            gateway_order_id: entity
                .get("order_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            confirmed_amount,
        })
    }
}

/// Razorpay payment entity status to canonical status.
pub fn normalize_status(raw: &str) -> PaymentStatus {
    match raw.trim().to_lowercase().as_str() {
        "captured" => PaymentStatus::Paid,
        "authorized" => PaymentStatus::Processing,
        "created" => PaymentStatus::Pending,
        "failed" => PaymentStatus::Failed,
        "refunded" => PaymentStatus::Refunded,
        _ => PaymentStatus::Processing,
    }
}

pub(crate) fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

#[async_trait::async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn initiate_payment(&self, input: InitiateInput) -> GatewayOutcome<InitiateData> {
        let (key_id, key_secret) = input.credentials.require(GatewayKind::Razorpay)?;

        let amount_minor = match to_minor_units(input.amount) {
            Some(v) if v > 0 => v,
            _ => return Err(GatewayFailure::invalid_payload("Invalid amount for Razorpay")),
        };
        let currency = input.currency.to_uppercase();

        let order_url = format!(
            "{}/v1/orders",
            input.credentials.base_url_or(DEFAULT_BASE_URL)
        );
        let body = json!({
            "amount": amount_minor,
            "currency": currency,
            "receipt": input
                .meta
                .get("receipt")
                .and_then(|v| v.as_str())
                .unwrap_or(&input.transaction_id),
            "payment_capture": 1,
            "notes": {
                "transactionId": input.transaction_id,
                "purpose": input.meta.get("linkPurpose").and_then(|v| v.as_str()).unwrap_or("ORDER_PAYMENT"),
                "title": input.meta.get("linkTitle").and_then(|v| v.as_str()).unwrap_or("Payment"),
            }
        });

        let resp = self
            .client
            .post(order_url)
            .basic_auth(key_id, Some(key_secret))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await;
        let order = read_json_response(GatewayKind::Razorpay, resp).await?;

        let order_id = order
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayFailure::upstream("Razorpay did not return an order id", Some(order.clone()))
            })?;

        let action = CompletionAction::Popup {
            key: key_id.to_string(),
            order_id: order_id.clone(),
            amount_minor: order.get("amount").and_then(|v| v.as_i64()).unwrap_or(amount_minor),
            currency: order
                .get("currency")
                .and_then(|v| v.as_str())
                .unwrap_or(&currency)
                .to_string(),
            prefill: CheckoutPrefill {
                name: input.customer.name.clone().unwrap_or_else(|| "Customer".to_string()),
                email: input.customer.email.clone(),
                contact: input.customer.phone.clone().unwrap_or_default(),
            },
        };

        Ok(InitiateData {
            action,
            refs: GatewayRefs {
                gateway_order_id: order_id,
                ..Default::default()
            },
            raw: order,
        })
    }

    async fn verify_payment(&self, input: VerifyInput) -> GatewayOutcome<VerifiedPayment> {
        let payload = &input.payload;
        if let Some(signature) = payload.header(WEBHOOK_SIGNATURE_HEADER) {
            return self.verify_webhook(
                payload,
                signature,
                non_empty(&input.credentials.webhook_secret),
            );
        }

        let (_, key_secret) = input.credentials.require(GatewayKind::Razorpay)?;
        self.verify_checkout_callback(payload, key_secret)
    }

    async fn refund_payment(&self, input: RefundInput) -> GatewayOutcome<RefundData> {
        let (key_id, key_secret) = input.credentials.require(GatewayKind::Razorpay)?;
        let Some(payment_id) = input.gateway_payment_id.as_deref().filter(|p| !p.is_empty()) else {
            return Err(GatewayFailure::invalid_payload(
                "Razorpay refunds need the captured payment id",
            ));
        };
        let amount_minor = to_minor_units(input.amount)
            .filter(|v| *v > 0)
            .ok_or_else(|| GatewayFailure::invalid_payload("Invalid refund amount"))?;

        let url = format!(
            "{}/v1/payments/{}/refund",
            input.credentials.base_url_or(DEFAULT_BASE_URL),
            payment_id
        );
        let resp = self
            .client
            .post(url)
            .basic_auth(key_id, Some(key_secret))
            .json(&json!({
                "amount": amount_minor,
                "notes": { "reason": input.reason },
            }))
            .timeout(self.timeout)
            .send()
            .await;
        let refund = read_json_response(GatewayKind::Razorpay, resp).await?;

        let status = match refund.get("status").and_then(|v| v.as_str()) {
            Some("processed") => PaymentStatus::Refunded,
            _ => PaymentStatus::Processing,
        };

        Ok(RefundData {
            status,
            refund_id: refund.get("id").and_then(|v| v.as_str()).map(str::to_string),
            amount: refund
                .get("amount")
                .and_then(|v| v.as_i64())
                .map(|paise| Decimal::new(paise, 2))
                .unwrap_or(input.amount),
            raw: refund,
        })
    }
}
