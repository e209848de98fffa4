use crate::domain::payment::{GatewayKind, PaymentStatus};
use crate::domain::project::Project;
use crate::domain::transaction::{
    apply_refund, apply_verification, AppliedVerification, GatewayRefs, LookupField, RefundRecord,
    Transaction, VerificationUpdate,
};
use crate::repo::store::{GatewayLogEntry, GatewayLogStore, ProjectStore, TransactionStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local ledger. Each mutation runs under the write lock, which
/// gives the same per-row atomicity as the guarded SQL updates.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
    projects: Arc<RwLock<HashMap<Uuid, Project>>>,
    logs: Arc<RwLock<Vec<GatewayLogEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_project(&self, project: Project) {
        self.projects.write().await.insert(project.id, project);
    }

    pub async fn gateway_logs(&self) -> Vec<GatewayLogEntry> {
        self.logs.read().await.clone()
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }
}

fn field_matches(tx: &Transaction, field: LookupField, value: &str) -> bool {
    match field {
        LookupField::Id => Uuid::parse_str(value).map(|id| id == tx.id).unwrap_or(false),
        LookupField::GatewayOrderId => tx.gateway_order_id.as_deref() == Some(value),
        LookupField::TransactionId => tx.transaction_id.as_deref() == Some(value),
        LookupField::GatewayPaymentId => tx.gateway_payment_id.as_deref() == Some(value),
    }
}

#[async_trait::async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert(&self, tx: &Transaction) -> anyhow::Result<()> {
        let mut rows = self.transactions.write().await;
        if rows.contains_key(&tx.id) {
            anyhow::bail!("transaction {} already exists", tx.id);
        }
        rows.insert(tx.id, tx.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Transaction>> {
        Ok(self.transactions.read().await.get(&id).cloned())
    }

    async fn find_by_field(
        &self,
        gateway: Option<GatewayKind>,
        field: LookupField,
        value: &str,
    ) -> anyhow::Result<Option<Transaction>> {
        let rows = self.transactions.read().await;
        let mut hits: Vec<&Transaction> = rows
            .values()
            .filter(|tx| gateway.map(|g| g == tx.gateway).unwrap_or(true))
            .filter(|tx| field_matches(tx, field, value))
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits.first().map(|tx| (*tx).clone()))
    }

    async fn record_initiation(
        &self,
        id: Uuid,
        refs: &GatewayRefs,
    ) -> anyhow::Result<Option<Transaction>> {
        let mut rows = self.transactions.write().await;
        let Some(tx) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if tx.gateway_order_id.is_none() {
            tx.gateway_order_id = Some(refs.gateway_order_id.clone());
            tx.gateway_link_id = refs.link_id.clone();
            tx.gateway_secondary_order_id = refs.secondary_order_id.clone();
            tx.transaction_id.get_or_insert_with(|| id.to_string());
            tx.updated_at = Utc::now();
        }
        Ok(Some(tx.clone()))
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> anyhow::Result<()> {
        let mut rows = self.transactions.write().await;
        if let Some(tx) = rows.get_mut(&id) {
            if tx.status == PaymentStatus::Pending {
                tx.status = PaymentStatus::Failed;
                tx.failure_reason = Some(reason.to_string());
                tx.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn apply_verification(
        &self,
        id: Uuid,
        update: &VerificationUpdate,
    ) -> anyhow::Result<Option<AppliedVerification>> {
        let mut rows = self.transactions.write().await;
        Ok(rows
            .get_mut(&id)
            .map(|tx| apply_verification(tx, update, Utc::now())))
    }

    async fn record_refund(
        &self,
        id: Uuid,
        record: &RefundRecord,
    ) -> anyhow::Result<Option<Transaction>> {
        let mut rows = self.transactions.write().await;
        Ok(rows.get_mut(&id).map(|tx| {
            apply_refund(tx, record, Utc::now());
            tx.clone()
        }))
    }

    async fn list(&self, user_id: Option<&str>, limit: i64) -> anyhow::Result<Vec<Transaction>> {
        let rows = self.transactions.read().await;
        let mut out: Vec<Transaction> = rows
            .values()
            .filter(|tx| user_id.map(|u| u == tx.user_id).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(out)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProjectStore for InMemoryStore {
    async fn find_project(&self, id: Uuid) -> anyhow::Result<Option<Project>> {
        Ok(self.projects.read().await.get(&id).cloned())
    }
}

#[async_trait::async_trait]
impl GatewayLogStore for InMemoryStore {
    async fn append(&self, entry: GatewayLogEntry) -> anyhow::Result<()> {
        self.logs.write().await.push(entry);
        Ok(())
    }
}
