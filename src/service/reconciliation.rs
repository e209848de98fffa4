use crate::domain::payment::{GatewayKind, PaymentStatus, VerificationOutcome};
use crate::domain::project::Project;
use crate::domain::transaction::{DeliveryChannel, LookupField, Transaction, VerificationUpdate};
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::{CallbackPayload, VerifiedPayment, VerifyInput};
use crate::repo::store::GatewayLogEntry;
use crate::service::payment_service::PaymentService;
use serde_json::json;
use url::Url;
use uuid::Uuid;

const PRIMARY_REFERENCE_PATHS: &[&[&str]] = &[
    &["ORDERID"],
    &["orderId"],
    &["order_id"],
    &["razorpay_order_id"],
    &["txnid"],
    &["transactionId"],
    &["token"],
    &["link_id"],
    &["data", "order_id"],
    &["data", "order", "order_id"],
    &["data", "link_id"],
    &["payload", "payment", "entity", "order_id"],
    &["gatewayOrderId"],
];

const SECONDARY_REFERENCE_PATHS: &[&[&str]] = &[
    &["data", "order", "order_tags", "link_id"],
    &["data", "order", "order_tags", "cf_link_id"],
    &["cf_link_id"],
    &["data", "link_notes", "transactionId"],
    &["udf1"],
];

/// The primary reference is the first populated provider field; the secondary
/// one is only kept when it differs.
pub fn extract_references(payload: &CallbackPayload) -> (Option<String>, Option<String>) {
    let primary = payload.first_of(PRIMARY_REFERENCE_PATHS);
    let secondary = payload
        .first_of(SECONDARY_REFERENCE_PATHS)
        .filter(|s| Some(s) != primary.as_ref());
    (primary, secondary)
}

/// Result of one inbound delivery, with enough context to pick a redirect
/// even when reconciliation failed.
pub struct ReconcileReport {
    pub transaction: Option<Transaction>,
    pub project: Option<Project>,
    pub result: PaymentResult<VerificationOutcome>,
}

impl ReconcileReport {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(outcome) if outcome.status.is_success())
    }

    /// Tenant success/failure URL, falling back to the frontend pages, with the
    /// ledger id and status as query parameters.
    pub fn redirect_location(&self, frontend_base: &str) -> String {
        let success = self.succeeded();
        let configured = self.project.as_ref().and_then(|p| {
            if success {
                p.success_url.clone()
            } else {
                p.failure_url.clone()
            }
        });
        let fallback = format!(
            "{frontend_base}/payments/{}",
            if success { "success" } else { "failure" }
        );
        let target = configured.filter(|u| !u.trim().is_empty()).unwrap_or(fallback);

        let Ok(mut url) = Url::parse(&target) else {
            return target;
        };
        {
            let mut query = url.query_pairs_mut();
            if let Some(tx) = &self.transaction {
                query.append_pair("txnid", &tx.id.to_string());
            }
            match &self.result {
                Ok(outcome) => {
                    query.append_pair("status", outcome.status.as_str());
                }
                Err(_) => {
                    query.append_pair("status", "failed");
                }
            }
        }
        url.to_string()
    }
}

impl PaymentService {
    /// Strict precedence: each reference in turn, each field in turn; the
    /// first hit wins. Every lookup is scoped to the named gateway.
    pub async fn locate(
        &self,
        gateway: GatewayKind,
        references: &[&str],
    ) -> PaymentResult<Option<Transaction>> {
        for reference in references {
            for field in LookupField::PRECEDENCE {
                if field == LookupField::Id && Uuid::parse_str(reference).is_err() {
                    continue;
                }
                if let Some(tx) = self
                    .transactions
                    .find_by_field(Some(gateway), field, reference)
                    .await?
                {
                    tracing::debug!(
                        transaction_id = %tx.id,
                        field = ?field,
                        "ledger row located"
                    );
                    return Ok(Some(tx));
                }
            }
        }
        Ok(None)
    }

    /// Verify-then-apply for one inbound callback or webhook.
    pub async fn reconcile(
        &self,
        gateway_name: &str,
        payload: CallbackPayload,
        channel: DeliveryChannel,
    ) -> ReconcileReport {
        let mut transaction = None;
        let mut project = None;
        let (primary, secondary) = extract_references(&payload);
        let raw_fields = payload.fields.clone();
        let result = self
            .reconcile_inner(gateway_name, payload, channel, &mut transaction, &mut project)
            .await;

        // Rejections after a row was located are audited inside reconcile_inner.
        if let (Err(e), None) = (&result, &transaction) {
            let entry = GatewayLogEntry::new(
                None,
                gateway_name.trim().to_lowercase(),
                "verify",
                false,
                e.to_string(),
            )
            .with_bodies(
                json!({
                    "references": [primary, secondary],
                    "channel": channel_name(channel),
                    "code": e.code(),
                }),
                raw_fields,
            );
            self.audit(entry).await;
        }

        ReconcileReport {
            transaction,
            project,
            result,
        }
    }

    async fn reconcile_inner(
        &self,
        gateway_name: &str,
        payload: CallbackPayload,
        channel: DeliveryChannel,
        located: &mut Option<Transaction>,
        located_project: &mut Option<Project>,
    ) -> PaymentResult<VerificationOutcome> {
        let (kind, adapter) = self.resolve_gateway(gateway_name)?;

        let (primary, secondary) = extract_references(&payload);
        let references: Vec<&str> = [primary.as_deref(), secondary.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if references.is_empty() {
            return Err(PaymentError::validation("Missing transaction reference"));
        }

        let Some(tx) = self.locate(kind, &references).await? else {
            tracing::warn!(gateway = %kind, references = ?references, "no ledger row for callback");
            return Err(PaymentError::not_found("Transaction not found"));
        };
        *located = Some(tx.clone());

        let project = self.projects.find_project(tx.project_id).await?;
        *located_project = project.clone();
        let credentials = self.credentials_for(kind, project.as_ref(), None);

        let raw_payload = payload.fields.clone();
        let verified = adapter
            .verify_payment(VerifyInput {
                payload,
                credentials,
            })
            .await;

        let verified = match verified {
            Ok(v) => v,
            Err(failure) => {
                tracing::warn!(
                    transaction_id = %tx.id,
                    gateway = %kind,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "verification rejected"
                );
                let entry =
                    GatewayLogEntry::new(Some(tx.id), kind.as_str(), "verify", false, failure.message.clone())
                        .with_bodies(
                            json!({ "references": references, "channel": channel_name(channel) }),
                            failure.raw.clone().unwrap_or_default(),
                        );
                self.audit(entry).await;
                return Err(failure.into());
            }
        };

        if !belongs_to(&tx, &verified) {
            tracing::warn!(
                transaction_id = %tx.id,
                gateway = %kind,
                verified_order = ?verified.gateway_order_id,
                "verified payment references a different transaction"
            );
            let entry = GatewayLogEntry::new(
                Some(tx.id),
                kind.as_str(),
                "verify",
                false,
                "Verified payment does not belong to the located transaction",
            )
            .with_bodies(json!({ "references": references }), json!({
                "gatewayOrderId": verified.gateway_order_id,
                "correlationId": verified.correlation_id,
            }));
            self.audit(entry).await;
            return Err(PaymentError::InvalidSignature(
                "Payment reference does not match the signed payload".to_string(),
            ));
        }

        let failure_reason = (verified.status == PaymentStatus::Failed)
            .then(|| format!("{kind} reported status {}", verified.provider_status));
        let update = VerificationUpdate {
            status: verified.status,
            gateway_payment_id: verified.gateway_payment_id.clone(),
            confirmed_amount: verified.confirmed_amount,
            failure_reason,
            channel,
            raw_payload,
        };

        let applied = self
            .transactions
            .apply_verification(tx.id, &update)
            .await?
            .ok_or_else(|| PaymentError::not_found("Transaction not found"))?;

        if applied.applied {
            tracing::info!(
                transaction_id = %tx.id,
                gateway = %kind,
                from = %applied.previous_status,
                to = %applied.transaction.status,
                channel = channel_name(channel),
                "transaction reconciled"
            );
        } else {
            tracing::info!(
                transaction_id = %tx.id,
                gateway = %kind,
                current = %applied.transaction.status,
                reported = %verified.status,
                "delivery did not change status"
            );
        }

        *located = Some(applied.transaction.clone());
        Ok(VerificationOutcome {
            transaction_id: applied.transaction.id,
            status: applied.transaction.status,
            gateway_payment_id: applied.transaction.gateway_payment_id,
            applied: applied.applied,
        })
    }
}

/// The signed identifiers must point at the row the unsigned references located.
/// A signed ledger id decides on its own; otherwise the signed order id must be
/// one the row already knows.
fn belongs_to(tx: &Transaction, verified: &VerifiedPayment) -> bool {
    let id = tx.id.to_string();
    if let Some(correlation_id) = verified.correlation_id.as_deref() {
        return correlation_id == id;
    }
    let Some(order_id) = verified.gateway_order_id.as_deref() else {
        return true;
    };
    let known = [
        tx.gateway_order_id.as_deref(),
        tx.gateway_link_id.as_deref(),
        tx.gateway_secondary_order_id.as_deref(),
        tx.transaction_id.as_deref(),
        Some(id.as_str()),
    ];
    let matched = known.into_iter().flatten().any(|k| k == order_id);
    matched
}

fn channel_name(channel: DeliveryChannel) -> &'static str {
    match channel {
        DeliveryChannel::Callback => "callback",
        DeliveryChannel::Webhook => "webhook",
    }
}
