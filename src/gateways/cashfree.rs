use crate::domain::payment::{Customer, GatewayKind, PaymentStatus};
use crate::domain::transaction::GatewayRefs;
use crate::gateways::signature::{redact, verify_hmac_sha256_base64};
use crate::gateways::{
    non_empty, read_json_response, CallbackPayload, CompletionAction, GatewayFailure, GatewayOutcome,
    InitiateData, InitiateInput, PaymentGateway, RefundData, RefundInput, VerifiedPayment, VerifyInput,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://sandbox.cashfree.com/pg";
pub const API_VERSION: &str = "2023-08-01";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Hosted payment links with an asynchronous signed webhook.
pub struct CashfreeGateway {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl CashfreeGateway {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn request(&self, builder: reqwest::RequestBuilder, app_id: &str, secret: &str) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", app_id)
            .header("x-client-secret", secret)
            .header("x-api-version", API_VERSION)
            .timeout(self.timeout)
    }

    fn verify_webhook(
        &self,
        payload: &CallbackPayload,
        signature: &str,
        timestamp: &str,
        secret: &str,
    ) -> GatewayOutcome<VerifiedPayment> {
        if payload.raw_body.is_empty() {
            return Err(GatewayFailure::invalid_payload(
                "Cashfree webhook signature requires the raw request body",
            ));
        }

        let mut signed = timestamp.as_bytes().to_vec();
        signed.extend_from_slice(&payload.raw_body);
        if !verify_hmac_sha256_base64(secret, &signed, signature) {
            tracing::warn!(
                gateway = "cashfree",
                provided_prefix = %redact(signature),
                "webhook signature mismatch"
            );
            return Err(GatewayFailure::invalid_signature(
                "Invalid Cashfree webhook signature",
            ));
        }

        let body: serde_json::Value = serde_json::from_slice(&payload.raw_body)
            .map_err(|_| GatewayFailure::invalid_payload("Cashfree webhook body is not JSON"))?;
        webhook_fields(&CallbackPayload::from_fields(body))
    }

    /// Browser returns carry no signature, so the link is fetched
    /// server-to-server and only that answer is trusted.
    async fn verify_by_lookup(
        &self,
        payload: &CallbackPayload,
        base_url: &str,
        app_id: &str,
        secret: &str,
    ) -> GatewayOutcome<VerifiedPayment> {
        let Some(link_id) = payload.first_of(&[&["link_id"], &["linkId"], &["data", "link_id"]]) else {
            return Err(GatewayFailure::invalid_payload(
                "Missing Cashfree link reference in callback",
            ));
        };

        let url = format!("{base_url}/links/{link_id}");
        let resp = self.request(self.client.get(url), app_id, secret).send().await;
        let link = read_json_response(GatewayKind::Cashfree, resp).await?;

        let provider_status = link
            .get("link_status")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let status = normalize_status(&provider_status);
        let confirmed_amount = if status == PaymentStatus::Paid {
            link.get("link_amount_paid").and_then(decimal_value)
        } else {
            None
        };

        Ok(VerifiedPayment {
            status,
            provider_status,
            correlation_id: link
                .pointer("/link_notes/transactionId")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            gateway_payment_id: None,
            gateway_order_id: Some(link_id),
            confirmed_amount,
        })
    }
}

fn webhook_fields(body: &CallbackPayload) -> GatewayOutcome<VerifiedPayment> {
    // The link id is what the ledger stores, so it outranks Cashfree's own order id.
    let order_id = body.first_of(&[
        &["data", "order", "order_tags", "link_id"],
        &["data", "link_id"],
        &["data", "order", "order_id"],
        &["data", "order_id"],
    ]);
    let Some(order_id) = order_id else {
        return Err(GatewayFailure::invalid_payload("Missing order_id in callback"));
    };

    let payment_id = body.first_of(&[
        &["data", "payment", "cf_payment_id"],
        &["data", "order", "transaction_id"],
    ]);
    let provider_status = body
        .first_of(&[
            &["data", "payment", "payment_status"],
            &["data", "link_status"],
            &["data", "order", "transaction_status"],
        ])
        .unwrap_or_default();
    let status = normalize_status(&provider_status);
    let confirmed_amount = if status == PaymentStatus::Paid {
        body.get(&["data", "payment", "payment_amount"])
            .and_then(|s| Decimal::from_str(&s).ok())
    } else {
        None
    };

    Ok(VerifiedPayment {
        status,
        provider_status,
        correlation_id: body.first_of(&[
            &["data", "link_notes", "transactionId"],
            &["data", "order", "order_tags", "transactionId"],
        ]),
        gateway_payment_id: payment_id,
        gateway_order_id: Some(order_id),
        confirmed_amount,
    })
}

fn decimal_value(v: &serde_json::Value) -> Option<Decimal> {
    match v {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        serde_json::Value::String(s) => Decimal::from_str(s).ok(),
        _ => None,
    }
}

/// Cashfree order, payment and link statuses to canonical status.
pub fn normalize_status(raw: &str) -> PaymentStatus {
    match raw.trim().to_uppercase().as_str() {
        "SUCCESS" | "PAID" | "COMPLETED" | "SETTLED" => PaymentStatus::Paid,
        "PENDING" | "ACTIVE" | "PARTIALLY_PAID" => PaymentStatus::Processing,
        "FAILED" | "USER_DROPPED" => PaymentStatus::Failed,
        "CANCELLED" | "EXPIRED" => PaymentStatus::Cancelled,
        _ => PaymentStatus::Processing,
    }
}

/// Reduces a phone number to a 10-digit local number, dropping a leading
/// `91` country code.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 && digits.starts_with("91") {
        digits = digits[digits.len() - 10..].to_string();
    }
    (digits.len() == 10).then_some(digits)
}

pub(crate) fn require_local_phone(customer: Customer, gateway: GatewayKind) -> Result<Customer, String> {
    if customer.email.trim().is_empty() {
        return Err(format!("Customer email is required for {gateway} payments"));
    }
    let raw = customer.phone.as_deref().unwrap_or_default();
    if raw.trim().is_empty() {
        return Err(format!("Phone number is required for {gateway} payments"));
    }
    let phone = normalize_phone(raw).ok_or_else(|| {
        format!("Invalid phone format \"{raw}\": a 10-digit Indian mobile number is required")
    })?;
    Ok(Customer {
        phone: Some(phone),
        ..customer
    })
}

#[async_trait::async_trait]
impl PaymentGateway for CashfreeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Cashfree
    }

    fn prepare_customer(&self, customer: Customer) -> Result<Customer, String> {
        require_local_phone(customer, GatewayKind::Cashfree)
    }

    async fn initiate_payment(&self, input: InitiateInput) -> GatewayOutcome<InitiateData> {
        let (app_id, secret) = input.credentials.require(GatewayKind::Cashfree)?;
        let base_url = input.credentials.base_url_or(DEFAULT_BASE_URL);

        let compact_id: String = input.transaction_id.chars().filter(|c| *c != '-').collect();
        let link_id = format!("link_{}_{}", compact_id, chrono::Utc::now().timestamp_millis());

        let mut payload = json!({
            "link_id": link_id,
            "link_amount": input.amount.round_dp(2),
            "link_currency": input.currency,
            "link_purpose": "PAYMENT",
            "link_notes": {
                "description": input.meta.get("description").and_then(|v| v.as_str()).unwrap_or("Payment"),
                "transactionId": input.transaction_id,
            },
            "customer_details": {
                "customer_phone": input.customer.phone.clone().unwrap_or_default(),
                "customer_email": input.customer.email,
                "customer_name": input.customer.name.clone().unwrap_or_else(|| "Customer".to_string()),
            },
            "link_notify": { "send_sms": false, "send_email": false },
        });

        let return_url = non_empty(&input.redirect.success_url).or(non_empty(&input.redirect.notify_url));
        if let Some(return_url) = return_url {
            let mut meta = json!({ "return_url": return_url });
            if let Some(notify_url) = non_empty(&input.redirect.notify_url) {
                meta["notify_url"] = json!(notify_url);
                payload["link_notify"]["send_webhook"] = json!(true);
            }
            payload["link_meta"] = meta;
        }

        let resp = self
            .request(self.client.post(format!("{base_url}/links")), app_id, secret)
            .json(&payload)
            .send()
            .await;
        let link = read_json_response(GatewayKind::Cashfree, resp).await?;

        let Some(link_url) = link.get("link_url").and_then(|v| v.as_str()).map(str::to_string) else {
            return Err(GatewayFailure::upstream(
                "Cashfree did not return link_url",
                Some(link),
            ));
        };
        let link_id = link
            .get("link_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or(link_id);
        let secondary_order_id = ["order_id", "cf_order_id", "cf_link_id"]
            .iter()
            .find_map(|k| match link.get(*k) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            });

        Ok(InitiateData {
            action: CompletionAction::Redirect { url: link_url },
            refs: GatewayRefs {
                gateway_order_id: link_id.clone(),
                link_id: Some(link_id),
                secondary_order_id,
            },
            raw: link,
        })
    }

    async fn verify_payment(&self, input: VerifyInput) -> GatewayOutcome<VerifiedPayment> {
        let (app_id, secret) = input.credentials.require(GatewayKind::Cashfree)?;
        let payload = &input.payload;

        match (payload.header(SIGNATURE_HEADER), payload.header(TIMESTAMP_HEADER)) {
            (Some(signature), Some(timestamp)) => {
                let signing_secret = non_empty(&input.credentials.webhook_secret).unwrap_or(secret);
                self.verify_webhook(payload, signature, timestamp, signing_secret)
            }
            (Some(_), None) | (None, Some(_)) => Err(GatewayFailure::invalid_signature(
                "Incomplete Cashfree signature headers",
            )),
            (None, None) => {
                let base_url = input.credentials.base_url_or(DEFAULT_BASE_URL);
                self.verify_by_lookup(payload, &base_url, app_id, secret).await
            }
        }
    }

    async fn refund_payment(&self, input: RefundInput) -> GatewayOutcome<RefundData> {
        let (app_id, secret) = input.credentials.require(GatewayKind::Cashfree)?;
        if input.gateway_order_id.is_empty() {
            return Err(GatewayFailure::invalid_payload("gatewayOrderId required"));
        }
        let base_url = input.credentials.base_url_or(DEFAULT_BASE_URL);

        let resp = self
            .request(
                self.client
                    .post(format!("{base_url}/links/{}/refunds", input.gateway_order_id)),
                app_id,
                secret,
            )
            .json(&json!({
                "refund_amount": input.amount.round_dp(2),
                "refund_note": input.reason,
            }))
            .send()
            .await;
        let refund = read_json_response(GatewayKind::Cashfree, resp).await?;

        let status = match refund.get("refund_status").and_then(|v| v.as_str()) {
            Some("SUCCESS") => PaymentStatus::Refunded,
            _ => PaymentStatus::Processing,
        };
        let refund_id = refund.get("cf_refund_id").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(RefundData {
            status,
            refund_id,
            amount: refund
                .get("refund_amount")
                .and_then(decimal_value)
                .unwrap_or(input.amount),
            raw: refund,
        })
    }
}
