use crate::domain::payment::{Customer, GatewayKind, PaymentStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// One payment attempt. Only the initiate, reconcile and refund paths write to it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_id: Option<String>,
    pub user_id: String,
    pub project_id: Uuid,
    pub gateway: GatewayKind,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_link_id: Option<String>,
    pub gateway_secondary_order_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub customer: Customer,
    pub status: PaymentStatus,
    pub meta: serde_json::Value,
    pub failure_reason: Option<String>,
    pub callback_payload: Option<serde_json::Value>,
    pub webhook_payload: Option<serde_json::Value>,
    pub webhook_received: bool,
    pub refund_id: Option<String>,
    pub refund_status: Option<String>,
    pub refunded_amount: Option<Decimal>,
    pub initiated_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub project_id: Uuid,
    pub gateway: GatewayKind,
    pub amount: Decimal,
    pub currency: String,
    pub customer: Customer,
    pub meta: serde_json::Value,
}

impl NewTransaction {
    pub fn into_pending(self, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            transaction_id: None,
            user_id: self.user_id,
            project_id: self.project_id,
            gateway: self.gateway,
            gateway_order_id: None,
            gateway_payment_id: None,
            gateway_link_id: None,
            gateway_secondary_order_id: None,
            amount: self.amount,
            currency: self.currency,
            customer: self.customer,
            status: PaymentStatus::Pending,
            meta: self.meta,
            failure_reason: None,
            callback_payload: None,
            webhook_payload: None,
            webhook_received: false,
            refund_id: None,
            refund_status: None,
            refunded_amount: None,
            initiated_at: now,
            verified_at: None,
            refunded_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Provider identifiers assigned by a successful initiate call.
#[derive(Debug, Clone, Default)]
pub struct GatewayRefs {
    pub gateway_order_id: String,
    pub link_id: Option<String>,
    pub secondary_order_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryChannel {
    Callback,
    Webhook,
}

#[derive(Debug, Clone)]
pub struct VerificationUpdate {
    pub status: PaymentStatus,
    pub gateway_payment_id: Option<String>,
    pub confirmed_amount: Option<Decimal>,
    pub failure_reason: Option<String>,
    pub channel: DeliveryChannel,
    pub raw_payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct AppliedVerification {
    pub transaction: Transaction,
    pub previous_status: PaymentStatus,
    pub applied: bool,
}

#[derive(Debug, Clone)]
pub struct RefundRecord {
    pub status: PaymentStatus,
    pub refund_id: Option<String>,
    pub refund_status: String,
    pub amount: Decimal,
}

/// Reference field searched by the reconciliation lookup, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupField {
    Id,
    GatewayOrderId,
    TransactionId,
    GatewayPaymentId,
}

impl LookupField {
    pub const PRECEDENCE: [LookupField; 4] = [
        LookupField::Id,
        LookupField::GatewayOrderId,
        LookupField::TransactionId,
        LookupField::GatewayPaymentId,
    ];
}

/// The in-memory twin of the guarded SQL update in the Postgres ledger.
pub fn apply_verification(
    tx: &mut Transaction,
    update: &VerificationUpdate,
    now: DateTime<Utc>,
) -> AppliedVerification {
    let previous_status = tx.status;
    let applied = previous_status.can_transition_to(update.status);

    if applied {
        tx.status = update.status;
        if let Some(payment_id) = &update.gateway_payment_id {
            tx.gateway_payment_id = Some(payment_id.clone());
        }
        if let Some(amount) = update.confirmed_amount {
            tx.amount = amount;
        }
        if update.status == PaymentStatus::Failed {
            tx.failure_reason = update.failure_reason.clone();
        }
        if tx.verified_at.is_none() {
            tx.verified_at = Some(now);
        }
    } else if tx.gateway_payment_id.is_none() {
        tx.gateway_payment_id = update.gateway_payment_id.clone();
    }

    match update.channel {
        DeliveryChannel::Callback => tx.callback_payload = Some(update.raw_payload.clone()),
        DeliveryChannel::Webhook => {
            tx.webhook_payload = Some(update.raw_payload.clone());
            tx.webhook_received = true;
        }
    }
    tx.updated_at = now;

    AppliedVerification {
        transaction: tx.clone(),
        previous_status,
        applied,
    }
}

pub fn apply_refund(tx: &mut Transaction, record: &RefundRecord, now: DateTime<Utc>) {
    if record.status == PaymentStatus::Refunded && tx.status.can_transition_to(PaymentStatus::Refunded) {
        tx.status = PaymentStatus::Refunded;
        if tx.refunded_at.is_none() {
            tx.refunded_at = Some(now);
        }
    }
    tx.refund_id = record.refund_id.clone().or(tx.refund_id.take());
    tx.refund_status = Some(record.refund_status.clone());
    tx.refunded_amount = Some(record.amount);
    tx.updated_at = now;
}
