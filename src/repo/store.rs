use crate::domain::payment::GatewayKind;
use crate::domain::project::Project;
use crate::domain::transaction::{
    AppliedVerification, GatewayRefs, LookupField, RefundRecord, Transaction, VerificationUpdate,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The ledger. Every mutating method targets one row by id and is applied
/// as a single atomic write.
#[async_trait::async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Transaction>>;

    /// Exact match on one reference column, optionally scoped to a gateway.
    async fn find_by_field(
        &self,
        gateway: Option<GatewayKind>,
        field: LookupField,
        value: &str,
    ) -> anyhow::Result<Option<Transaction>>;

    /// First gateway-id assignment after a successful initiate call. Rows
    /// that already carry an order id are left alone.
    async fn record_initiation(
        &self,
        id: Uuid,
        refs: &GatewayRefs,
    ) -> anyhow::Result<Option<Transaction>>;

    /// Moves a still-pending row to `failed`.
    async fn mark_failed(&self, id: Uuid, reason: &str) -> anyhow::Result<()>;

    async fn apply_verification(
        &self,
        id: Uuid,
        update: &VerificationUpdate,
    ) -> anyhow::Result<Option<AppliedVerification>>;

    async fn record_refund(
        &self,
        id: Uuid,
        record: &RefundRecord,
    ) -> anyhow::Result<Option<Transaction>>;

    /// Newest first. `None` lists every user's rows.
    async fn list(&self, user_id: Option<&str>, limit: i64) -> anyhow::Result<Vec<Transaction>>;

    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_project(&self, id: Uuid) -> anyhow::Result<Option<Project>>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayLogEntry {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    /// Gateway name as received; unknown names are audited too.
    pub gateway: String,
    pub action: String,
    pub ok: bool,
    pub message: String,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl GatewayLogEntry {
    pub fn new(
        transaction_id: Option<Uuid>,
        gateway: impl Into<String>,
        action: &str,
        ok: bool,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            gateway: gateway.into(),
            action: action.to_string(),
            ok,
            message: message.into(),
            request: serde_json::Value::Null,
            response: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_bodies(mut self, request: serde_json::Value, response: serde_json::Value) -> Self {
        self.request = request;
        self.response = response;
        self
    }
}

/// Append-only audit trail of provider exchanges.
#[async_trait::async_trait]
pub trait GatewayLogStore: Send + Sync {
    async fn append(&self, entry: GatewayLogEntry) -> anyhow::Result<()>;
}
