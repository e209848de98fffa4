use crate::config::AppConfig;
use crate::domain::context::CallerContext;
use crate::domain::payment::{
    CredentialsOverride, GatewayKind, InitiatePaymentRequest, InitiatePaymentResponse, PaymentStatus,
    RedirectUrls, RefundOutcome, RefundRequest,
};
use crate::domain::project::Project;
use crate::domain::transaction::{LookupField, NewTransaction, RefundRecord, Transaction};
use crate::error::{PaymentError, PaymentResult};
use crate::gateways::registry::GatewayRegistry;
use crate::gateways::{InitiateInput, PaymentGateway, ProviderCredentials, RefundInput};
use crate::repo::store::{GatewayLogEntry, GatewayLogStore, ProjectStore, TransactionStore};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

const LIST_LIMIT: i64 = 200;

fn to_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Orchestrates the payment lifecycle over the ledger and the gateway adapters.
#[derive(Clone)]
pub struct PaymentService {
    pub transactions: Arc<dyn TransactionStore>,
    pub projects: Arc<dyn ProjectStore>,
    pub gateway_logs: Arc<dyn GatewayLogStore>,
    pub registry: GatewayRegistry,
    pub config: Arc<AppConfig>,
}

impl PaymentService {
    pub(crate) fn resolve_gateway(
        &self,
        name: &str,
    ) -> PaymentResult<(GatewayKind, Arc<dyn PaymentGateway>)> {
        self.registry
            .resolve(name)
            .ok_or_else(|| PaymentError::validation(format!("Unsupported gateway: {}", name.trim())))
    }

    /// Environment defaults, then the project's stored settings, then any
    /// per-request override. Blank values never replace present ones.
    pub(crate) fn credentials_for(
        &self,
        kind: GatewayKind,
        project: Option<&Project>,
        request_override: Option<&CredentialsOverride>,
    ) -> ProviderCredentials {
        let mut creds = self.config.default_credentials(kind);
        if let Some(pg) = project.and_then(|p| p.gateway(kind)) {
            creds = creds.overlay(&ProviderCredentials {
                key_id: pg.key_id.clone(),
                key_secret: pg.key_secret.clone(),
                webhook_secret: pg.webhook_secret.clone(),
                base_url: pg.base_url.clone(),
            });
        }
        if let Some(o) = request_override {
            creds = creds.overlay(&ProviderCredentials {
                key_id: o.key_id.clone(),
                key_secret: o.key_secret.clone(),
                webhook_secret: None,
                base_url: o.base_url.clone(),
            });
        }
        creds
    }

    async fn load_project(&self, id: Uuid) -> PaymentResult<Option<Project>> {
        Ok(self.projects.find_project(id).await?)
    }

    pub(crate) async fn audit(&self, entry: GatewayLogEntry) {
        if let Err(e) = self.gateway_logs.append(entry).await {
            tracing::error!(error = %e, "failed to write gateway log");
        }
    }

    pub async fn initiate(
        &self,
        caller: &CallerContext,
        req: InitiatePaymentRequest,
    ) -> PaymentResult<InitiatePaymentResponse> {
        let project_id = req
            .project_id
            .ok_or_else(|| PaymentError::validation("projectId is required for payment"))?;
        if req.gateway.trim().is_empty() {
            return Err(PaymentError::validation("gateway is required"));
        }
        // Money is stored with two decimals; sub-cent amounts round to zero.
        let amount = match req.amount.map(to_money) {
            Some(a) if a > Decimal::ZERO => a,
            Some(_) => return Err(PaymentError::validation("amount must be at least 0.01")),
            None => return Err(PaymentError::validation("amount is required")),
        };
        if req.customer.email.trim().is_empty() {
            return Err(PaymentError::validation("customer.email is required"));
        }

        let (kind, adapter) = self.resolve_gateway(&req.gateway)?;

        let project = self
            .load_project(project_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Project not found"))?;
        if !caller.can_manage(&project.owner_id) {
            return Err(PaymentError::Forbidden(
                "You do not have access to this project".to_string(),
            ));
        }
        if !project.gateway_enabled(kind) {
            return Err(PaymentError::validation(format!(
                "{kind} is not enabled for this project"
            )));
        }

        let customer = adapter
            .prepare_customer(req.customer)
            .map_err(PaymentError::Validation)?;
        let credentials = self.credentials_for(kind, Some(&project), None);
        credentials.require(kind)?;

        let currency = req
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| project.default_currency.clone())
            .trim()
            .to_uppercase();
        let redirect = self.resolve_redirects(&project, req.redirect);
        let meta = req.meta.unwrap_or_else(|| json!({}));

        let tx = NewTransaction {
            user_id: caller.user_id.clone(),
            project_id,
            gateway: kind,
            amount,
            currency: currency.clone(),
            customer: customer.clone(),
            meta: meta.clone(),
        }
        .into_pending(chrono::Utc::now());
        self.transactions.insert(&tx).await?;

        tracing::info!(
            transaction_id = %tx.id,
            gateway = %kind,
            project_id = %project_id,
            amount = %amount,
            "transaction created"
        );

        let outcome = adapter
            .initiate_payment(InitiateInput {
                transaction_id: tx.id.to_string(),
                amount,
                currency,
                customer,
                redirect,
                meta,
                credentials,
            })
            .await;

        let data = match outcome {
            Ok(data) => data,
            Err(failure) => {
                tracing::warn!(
                    transaction_id = %tx.id,
                    gateway = %kind,
                    error = %failure.message,
                    "gateway initiate failed"
                );
                self.transactions.mark_failed(tx.id, &failure.message).await?;
                return Err(failure.into());
            }
        };

        let stored = self
            .transactions
            .record_initiation(tx.id, &data.refs)
            .await?
            .ok_or_else(|| PaymentError::Internal(anyhow::anyhow!("transaction {} vanished", tx.id)))?;

        tracing::info!(
            transaction_id = %tx.id,
            gateway = %kind,
            gateway_order_id = %data.refs.gateway_order_id,
            "gateway order created"
        );

        Ok(InitiatePaymentResponse {
            transaction_id: stored.id,
            gateway: kind,
            gateway_order_id: data.refs.gateway_order_id,
            status: stored.status,
            action: data.action,
        })
    }

    fn resolve_redirects(&self, project: &Project, requested: RedirectUrls) -> RedirectUrls {
        let frontend = &self.config.frontend_base;
        RedirectUrls {
            success_url: requested
                .success_url
                .filter(|u| !u.trim().is_empty())
                .or_else(|| project.success_url.clone())
                .or_else(|| Some(format!("{frontend}/payments/success"))),
            failure_url: requested
                .failure_url
                .filter(|u| !u.trim().is_empty())
                .or_else(|| project.failure_url.clone())
                .or_else(|| Some(format!("{frontend}/payments/failure"))),
            notify_url: requested.notify_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub async fn refund(
        &self,
        caller: &CallerContext,
        req: RefundRequest,
    ) -> PaymentResult<RefundOutcome> {
        let raw_id = req.transaction_id.trim();
        if raw_id.is_empty() {
            return Err(PaymentError::validation("transactionId is required"));
        }
        let Ok(id) = Uuid::parse_str(raw_id) else {
            return Err(PaymentError::not_found("Transaction not found"));
        };
        let tx = self
            .transactions
            .find_by_id(id)
            .await?
            .ok_or_else(|| PaymentError::not_found("Transaction not found"))?;

        let project = self.load_project(tx.project_id).await?;
        self.authorize(caller, &tx, project.as_ref())?;

        if tx.status != PaymentStatus::Paid {
            return Err(PaymentError::validation(format!(
                "Only paid transactions can be refunded (current status: {})",
                tx.status
            )));
        }
        let amount = to_money(req.amount.unwrap_or(tx.amount));
        if amount <= Decimal::ZERO || amount > tx.amount {
            return Err(PaymentError::validation(format!(
                "Refund amount must be greater than 0 and at most {}",
                tx.amount
            )));
        }

        let (kind, adapter) = self.resolve_gateway(tx.gateway.as_str())?;
        let credentials = self.credentials_for(kind, project.as_ref(), req.config.as_ref());
        let reason = req
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Customer requested refund".to_string());
        let gateway_order_id = tx
            .gateway_link_id
            .clone()
            .or_else(|| tx.gateway_order_id.clone())
            .unwrap_or_default();

        let request_log = json!({
            "transactionId": tx.id,
            "amount": amount,
            "reason": reason,
        });

        let outcome = adapter
            .refund_payment(RefundInput {
                gateway_order_id,
                gateway_payment_id: tx.gateway_payment_id.clone(),
                amount,
                reason,
                credentials,
            })
            .await;

        let data = match outcome {
            Ok(data) => data,
            Err(failure) => {
                tracing::warn!(
                    transaction_id = %tx.id,
                    gateway = %kind,
                    error = %failure.message,
                    "refund rejected by gateway"
                );
                self.audit(
                    GatewayLogEntry::new(Some(tx.id), kind.as_str(), "refund", false, failure.message.clone())
                        .with_bodies(request_log, failure.raw.clone().unwrap_or_default()),
                )
                .await;
                return Err(failure.into());
            }
        };

        self.audit(
            GatewayLogEntry::new(Some(tx.id), kind.as_str(), "refund", true, "Refund processed")
                .with_bodies(request_log, data.raw.clone()),
        )
        .await;

        let record = RefundRecord {
            status: data.status,
            refund_id: data.refund_id.clone(),
            refund_status: data.status.as_str().to_string(),
            amount: data.amount,
        };
        let updated = self
            .transactions
            .record_refund(tx.id, &record)
            .await?
            .ok_or_else(|| PaymentError::not_found("Transaction not found"))?;

        tracing::info!(
            transaction_id = %tx.id,
            gateway = %kind,
            refund_status = %data.status,
            "refund recorded"
        );

        Ok(RefundOutcome {
            transaction_id: updated.id,
            status: data.status,
            refund_id: data.refund_id,
            amount: data.amount,
        })
    }

    fn authorize(
        &self,
        caller: &CallerContext,
        tx: &Transaction,
        project: Option<&Project>,
    ) -> PaymentResult<()> {
        let owns_project = project.map(|p| caller.can_manage(&p.owner_id)).unwrap_or(false);
        if caller.is_admin || tx.user_id == caller.user_id || owns_project {
            Ok(())
        } else {
            Err(PaymentError::Forbidden(
                "You do not have access to this transaction".to_string(),
            ))
        }
    }

    /// Accepts the internal id or a provider order id.
    pub async fn get_transaction(
        &self,
        caller: &CallerContext,
        id: &str,
    ) -> PaymentResult<Transaction> {
        let id = id.trim();
        let found = match Uuid::parse_str(id) {
            Ok(uuid) => self.transactions.find_by_id(uuid).await?,
            Err(_) => {
                self.transactions
                    .find_by_field(None, LookupField::GatewayOrderId, id)
                    .await?
            }
        };
        let tx = found.ok_or_else(|| PaymentError::not_found("Transaction not found"))?;
        let project = self.load_project(tx.project_id).await?;
        self.authorize(caller, &tx, project.as_ref())?;
        Ok(tx)
    }

    pub async fn list_transactions(&self, caller: &CallerContext) -> PaymentResult<Vec<Transaction>> {
        let scope = (!caller.is_admin).then_some(caller.user_id.as_str());
        Ok(self.transactions.list(scope, LIST_LIMIT).await?)
    }

    pub async fn readiness(&self) -> bool {
        self.transactions.ping().await.is_ok()
    }
}
