use crate::domain::payment::{Customer, GatewayKind, PaymentStatus, RedirectUrls};
use crate::domain::transaction::GatewayRefs;
use axum::http::HeaderMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

pub mod cashfree;
pub mod payu;
pub mod razorpay;
pub mod registry;
pub mod signature;

/// Credentials and endpoint for one provider, resolved per tenant.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderCredentials {
    /// Fails fast with a configuration error when the key pair is missing.
    pub fn require(&self, gateway: GatewayKind) -> GatewayOutcome<(&str, &str)> {
        match (non_empty(&self.key_id), non_empty(&self.key_secret)) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(GatewayFailure::configuration(format!(
                "{gateway} credentials are not configured"
            ))),
        }
    }

    pub fn base_url_or(&self, default: &str) -> String {
        non_empty(&self.base_url)
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }

    /// Field-wise merge: values present in `other` win.
    pub fn overlay(mut self, other: &ProviderCredentials) -> Self {
        if non_empty(&other.key_id).is_some() {
            self.key_id = other.key_id.clone();
        }
        if non_empty(&other.key_secret).is_some() {
            self.key_secret = other.key_secret.clone();
        }
        if non_empty(&other.webhook_secret).is_some() {
            self.webhook_secret = other.webhook_secret.clone();
        }
        if non_empty(&other.base_url).is_some() {
            self.base_url = other.base_url.clone();
        }
        self
    }
}

pub(crate) fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct InitiateInput {
    /// Ledger id embedded in the provider request for correlation.
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub customer: Customer,
    pub redirect: RedirectUrls,
    pub meta: serde_json::Value,
    pub credentials: ProviderCredentials,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPrefill {
    pub name: String,
    pub email: String,
    pub contact: String,
}

/// What the client must do to complete payment.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionAction {
    Popup {
        key: String,
        order_id: String,
        amount_minor: i64,
        currency: String,
        prefill: CheckoutPrefill,
    },
    Redirect {
        url: String,
    },
    FormPost {
        url: String,
        fields: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone)]
pub struct InitiateData {
    pub action: CompletionAction,
    pub refs: GatewayRefs,
    pub raw: serde_json::Value,
}

/// Inbound callback or webhook, exactly as received.
#[derive(Debug, Clone, Default)]
pub struct CallbackPayload {
    /// Union of query parameters and the decoded body; query wins on clashes.
    pub fields: serde_json::Value,
    pub raw_body: Vec<u8>,
    pub headers: HeaderMap,
}

impl CallbackPayload {
    pub fn from_fields(fields: serde_json::Value) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// String value at a nested path; numbers are rendered as strings.
    pub fn get(&self, path: &[&str]) -> Option<String> {
        let mut cur = &self.fields;
        for key in path {
            cur = cur.get(*key)?;
        }
        match cur {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn first_of(&self, paths: &[&[&str]]) -> Option<String> {
        paths.iter().find_map(|p| self.get(p))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub payload: CallbackPayload,
    pub credentials: ProviderCredentials,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    pub status: PaymentStatus,
    pub provider_status: String,
    /// Ledger id echoed back by the provider. Only set from signed or
    /// server-fetched data.
    pub correlation_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_order_id: Option<String>,
    pub confirmed_amount: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct RefundInput {
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub amount: Decimal,
    pub reason: String,
    pub credentials: ProviderCredentials,
}

#[derive(Debug, Clone)]
pub struct RefundData {
    pub status: PaymentStatus,
    pub refund_id: Option<String>,
    pub amount: Decimal,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    Configuration,
    InvalidSignature,
    InvalidPayload,
    Upstream,
}

/// Expected adapter failure. Adapters return these instead of erroring out so
/// the orchestrator decides the ledger effect.
#[derive(Debug, Clone)]
pub struct GatewayFailure {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub raw: Option<serde_json::Value>,
}

impl GatewayFailure {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Configuration,
            message: message.into(),
            raw: None,
        }
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::InvalidSignature,
            message: message.into(),
            raw: None,
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::InvalidPayload,
            message: message.into(),
            raw: None,
        }
    }

    pub fn upstream(message: impl Into<String>, raw: Option<serde_json::Value>) -> Self {
        Self {
            kind: GatewayErrorKind::Upstream,
            message: message.into(),
            raw,
        }
    }
}

pub type GatewayOutcome<T> = Result<T, GatewayFailure>;

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    /// Gateway-specific customer checks, run before any ledger write.
    fn prepare_customer(&self, customer: Customer) -> Result<Customer, String> {
        Ok(customer)
    }

    async fn initiate_payment(&self, input: InitiateInput) -> GatewayOutcome<InitiateData>;

    async fn verify_payment(&self, input: VerifyInput) -> GatewayOutcome<VerifiedPayment>;

    async fn refund_payment(&self, input: RefundInput) -> GatewayOutcome<RefundData>;
}

/// Collapses a provider HTTP exchange into JSON or a typed upstream failure.
pub(crate) async fn read_json_response(
    gateway: GatewayKind,
    resp: Result<reqwest::Response, reqwest::Error>,
) -> GatewayOutcome<serde_json::Value> {
    match resp {
        Ok(r) if r.status().is_success() => r.json::<serde_json::Value>().await.map_err(|e| {
            GatewayFailure::upstream(format!("{gateway} returned an unreadable body: {e}"), None)
        }),
        Ok(r) => {
            let status = r.status();
            let body = r.text().await.unwrap_or_default();
            let raw = serde_json::from_str::<serde_json::Value>(&body)
                .unwrap_or_else(|_| serde_json::Value::String(body.chars().take(500).collect()));
            let message = provider_error_message(&raw)
                .unwrap_or_else(|| format!("{gateway} responded with HTTP {}", status.as_u16()));
            Err(GatewayFailure::upstream(message, Some(raw)))
        }
        Err(e) if e.is_timeout() => Err(GatewayFailure::upstream(
            format!("{gateway} request timed out"),
            None,
        )),
        Err(e) => Err(GatewayFailure::upstream(
            format!("{gateway} request failed"),
            Some(serde_json::Value::String(e.to_string())),
        )),
    }
}

fn provider_error_message(raw: &serde_json::Value) -> Option<String> {
    raw.pointer("/error/description")
        .or_else(|| raw.get("message"))
        .or_else(|| raw.get("msg"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
