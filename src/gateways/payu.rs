use crate::domain::payment::{Customer, GatewayKind, PaymentStatus};
use crate::domain::transaction::GatewayRefs;
use crate::gateways::cashfree::require_local_phone;
use crate::gateways::signature::{digest_matches, redact, sha512_hex};
use crate::gateways::{
    non_empty, read_json_response, CallbackPayload, CompletionAction, GatewayFailure, GatewayOutcome,
    InitiateData, InitiateInput, PaymentGateway, RefundData, RefundInput, VerifiedPayment, VerifyInput,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://test.payu.in";
const TXNID_MAX_LEN: usize = 25;

/// Hosted checkout completed by an auto-submitted HTML form.
pub struct PayuGateway {
    pub client: reqwest::Client,
    pub timeout: Duration,
}

impl PayuGateway {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

/// Fields covered by the PayU request and response hashes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashFields {
    pub txnid: String,
    pub amount: String,
    pub productinfo: String,
    pub firstname: String,
    pub email: String,
    pub udf: [String; 5],
}

pub fn request_hash(key: &str, salt: &str, f: &HashFields) -> String {
    let [u1, u2, u3, u4, u5] = &f.udf;
    sha512_hex(&format!(
        "{key}|{}|{}|{}|{}|{}|{u1}|{u2}|{u3}|{u4}|{u5}||||||{salt}",
        f.txnid, f.amount, f.productinfo, f.firstname, f.email
    ))
}

pub fn response_hash(
    key: &str,
    salt: &str,
    status: &str,
    f: &HashFields,
    additional_charges: Option<&str>,
) -> String {
    let [u1, u2, u3, u4, u5] = &f.udf;
    let base = format!(
        "{salt}|{status}||||||{u5}|{u4}|{u3}|{u2}|{u1}|{}|{}|{}|{}|{}|{key}",
        f.email, f.firstname, f.productinfo, f.amount, f.txnid
    );
    match additional_charges {
        Some(charges) => sha512_hex(&format!("{charges}|{base}")),
        None => sha512_hex(&base),
    }
}

/// PayU accepts at most 25 characters, so the ledger id is compacted.
pub fn txnid_for(transaction_id: &str) -> String {
    transaction_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(TXNID_MAX_LEN)
        .collect()
}

pub fn normalize_status(raw: &str) -> PaymentStatus {
    match raw.trim().to_lowercase().as_str() {
        "success" => PaymentStatus::Paid,
        "failure" | "failed" => PaymentStatus::Failed,
        "pending" | "in progress" => PaymentStatus::Processing,
        "usercancelled" | "cancelled" => PaymentStatus::Cancelled,
        _ => PaymentStatus::Processing,
    }
}

fn response_fields(payload: &CallbackPayload) -> HashFields {
    let field = |name: &str| payload.get(&[name]).unwrap_or_default();
    HashFields {
        txnid: field("txnid"),
        amount: field("amount"),
        productinfo: field("productinfo"),
        firstname: field("firstname"),
        email: field("email"),
        udf: [
            field("udf1"),
            field("udf2"),
            field("udf3"),
            field("udf4"),
            field("udf5"),
        ],
    }
}

#[async_trait::async_trait]
impl PaymentGateway for PayuGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Payu
    }

    fn prepare_customer(&self, customer: Customer) -> Result<Customer, String> {
        require_local_phone(customer, GatewayKind::Payu)
    }

    async fn initiate_payment(&self, input: InitiateInput) -> GatewayOutcome<InitiateData> {
        let (key, salt) = input.credentials.require(GatewayKind::Payu)?;
        let base_url = input.credentials.base_url_or(DEFAULT_BASE_URL);

        let hash_fields = HashFields {
            txnid: txnid_for(&input.transaction_id),
            amount: format!("{:.2}", input.amount.round_dp(2)),
            productinfo: input
                .meta
                .get("productInfo")
                .and_then(|v| v.as_str())
                .unwrap_or("Payment")
                .to_string(),
            firstname: input
                .customer
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Customer".to_string()),
            email: input.customer.email.clone(),
            udf: [
                input.transaction_id.clone(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
            ],
        };
        let hash = request_hash(key, salt, &hash_fields);

        let redirect = &input.redirect;
        let surl = non_empty(&redirect.notify_url).or(non_empty(&redirect.success_url));
        let furl = non_empty(&redirect.notify_url).or(non_empty(&redirect.failure_url));

        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), key.to_string());
        fields.insert("txnid".to_string(), hash_fields.txnid.clone());
        fields.insert("amount".to_string(), hash_fields.amount.clone());
        fields.insert("productinfo".to_string(), hash_fields.productinfo.clone());
        fields.insert("firstname".to_string(), hash_fields.firstname.clone());
        fields.insert("email".to_string(), hash_fields.email.clone());
        fields.insert(
            "phone".to_string(),
            input.customer.phone.clone().unwrap_or_default(),
        );
        fields.insert("udf1".to_string(), input.transaction_id.clone());
        fields.insert("surl".to_string(), surl.unwrap_or_default().to_string());
        fields.insert("furl".to_string(), furl.unwrap_or_default().to_string());
        fields.insert("hash".to_string(), hash);

        tracing::debug!(txnid = %hash_fields.txnid, "payu form prepared");

        Ok(InitiateData {
            action: CompletionAction::FormPost {
                url: format!("{base_url}/_payment"),
                fields,
            },
            refs: GatewayRefs {
                gateway_order_id: hash_fields.txnid,
                ..Default::default()
            },
            raw: json!({ "txnid": txnid_for(&input.transaction_id) }),
        })
    }

    async fn verify_payment(&self, input: VerifyInput) -> GatewayOutcome<VerifiedPayment> {
        let (key, salt) = input.credentials.require(GatewayKind::Payu)?;
        let payload = &input.payload;

        let (Some(provider_status), Some(provided_hash)) =
            (payload.get(&["status"]), payload.get(&["hash"]))
        else {
            return Err(GatewayFailure::invalid_payload(
                "Missing PayU status or hash in callback",
            ));
        };
        let fields = response_fields(payload);
        if fields.txnid.is_empty() {
            return Err(GatewayFailure::invalid_payload("Missing txnid in callback"));
        }

        let additional_charges = payload.get(&["additionalCharges"]);
        let expected = response_hash(
            key,
            salt,
            &provider_status,
            &fields,
            additional_charges.as_deref(),
        );
        if !digest_matches(&expected, &provided_hash) {
            tracing::warn!(
                gateway = "payu",
                txnid = %fields.txnid,
                provided_prefix = %redact(&provided_hash),
                "response hash mismatch"
            );
            return Err(GatewayFailure::invalid_signature("Invalid PayU response hash"));
        }

        let status = normalize_status(&provider_status);
        let confirmed_amount = if status == PaymentStatus::Paid {
            Decimal::from_str(&fields.amount).ok()
        } else {
            None
        };
        let [correlation_id, ..] = fields.udf;

        Ok(VerifiedPayment {
            status,
            provider_status,
            correlation_id: Some(correlation_id).filter(|c| !c.is_empty()),
            gateway_payment_id: payload.get(&["mihpayid"]),
            gateway_order_id: Some(fields.txnid),
            confirmed_amount,
        })
    }

    async fn refund_payment(&self, input: RefundInput) -> GatewayOutcome<RefundData> {
        let (key, salt) = input.credentials.require(GatewayKind::Payu)?;
        let Some(mihpayid) = input.gateway_payment_id.as_deref().filter(|p| !p.is_empty()) else {
            return Err(GatewayFailure::invalid_payload(
                "PayU refunds require the gateway payment id",
            ));
        };
        let base_url = input.credentials.base_url_or(DEFAULT_BASE_URL);

        let command = "cancel_refund_transaction";
        let token = format!("rf{}", chrono::Utc::now().timestamp_millis());
        let amount = format!("{:.2}", input.amount.round_dp(2));
        let hash = sha512_hex(&format!("{key}|{command}|{mihpayid}|{salt}"));

        let form = [
            ("key", key),
            ("command", command),
            ("var1", mihpayid),
            ("var2", token.as_str()),
            ("var3", amount.as_str()),
            ("hash", hash.as_str()),
        ];
        let body = serde_urlencoded::to_string(form)
            .map_err(|e| GatewayFailure::invalid_payload(format!("refund form encoding: {e}")))?;

        let resp = self
            .client
            .post(format!("{base_url}/merchant/postservice.php?form=2"))
            .header("content-type", "application/x-www-form-urlencoded")
            .body(body)
            .timeout(self.timeout)
            .send()
            .await;
        let raw = read_json_response(GatewayKind::Payu, resp).await?;

        if raw.get("status").and_then(|v| v.as_i64()) != Some(1) {
            let message = raw
                .get("msg")
                .and_then(|v| v.as_str())
                .unwrap_or("PayU refund rejected")
                .to_string();
            return Err(GatewayFailure::upstream(message, Some(raw)));
        }

        let refund_id = raw.get("request_id").and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        // PayU queues refunds; settlement arrives out of band.
        Ok(RefundData {
            status: PaymentStatus::Processing,
            refund_id,
            amount: input.amount,
            raw,
        })
    }
}
