use crate::domain::payment::{Customer, GatewayKind, PaymentStatus};
use crate::domain::transaction::{
    AppliedVerification, DeliveryChannel, GatewayRefs, LookupField, RefundRecord, Transaction,
    VerificationUpdate,
};
use crate::repo::store::TransactionStore;
use anyhow::{anyhow, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct TransactionsRepo {
    pub pool: PgPool,
}

const COLUMNS: &str = r#"
    id, transaction_id, user_id, project_id, gateway, gateway_order_id, gateway_payment_id,
    gateway_link_id, gateway_secondary_order_id, amount, currency, customer_name, customer_email,
    customer_phone, status, meta, failure_reason, callback_payload, webhook_payload,
    webhook_received, refund_id, refund_status, refunded_amount, initiated_at, verified_at,
    refunded_at, created_at, updated_at
"#;

fn map_row(row: &PgRow) -> Result<Transaction> {
    let gateway: String = row.get("gateway");
    let status: String = row.get("status");
    Ok(Transaction {
        id: row.get("id"),
        transaction_id: row.get("transaction_id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        gateway: gateway.parse::<GatewayKind>().map_err(|e| anyhow!(e))?,
        gateway_order_id: row.get("gateway_order_id"),
        gateway_payment_id: row.get("gateway_payment_id"),
        gateway_link_id: row.get("gateway_link_id"),
        gateway_secondary_order_id: row.get("gateway_secondary_order_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        customer: Customer {
            name: row.get("customer_name"),
            email: row.get("customer_email"),
            phone: row.get("customer_phone"),
        },
        status: status.parse::<PaymentStatus>().map_err(|e| anyhow!(e))?,
        meta: row.get("meta"),
        failure_reason: row.get("failure_reason"),
        callback_payload: row.get("callback_payload"),
        webhook_payload: row.get("webhook_payload"),
        webhook_received: row.get("webhook_received"),
        refund_id: row.get("refund_id"),
        refund_status: row.get("refund_status"),
        refunded_amount: row.get("refunded_amount"),
        initiated_at: row.get("initiated_at"),
        verified_at: row.get("verified_at"),
        refunded_at: row.get("refunded_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl TransactionsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TransactionStore for TransactionsRepo {
    async fn insert(&self, tx: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, transaction_id, user_id, project_id, gateway, amount, currency,
                customer_name, customer_email, customer_phone, status, meta,
                initiated_at, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11, $12,
                $13, $13, $13
            )
            "#,
        )
        .bind(tx.id)
        .bind(tx.transaction_id.clone())
        .bind(&tx.user_id)
        .bind(tx.project_id)
        .bind(tx.gateway.as_str())
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.customer.name.clone())
        .bind(&tx.customer.email)
        .bind(tx.customer.phone.clone())
        .bind(tx.status.as_str())
        .bind(&tx.meta)
        .bind(tx.initiated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM transactions WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn find_by_field(
        &self,
        gateway: Option<GatewayKind>,
        field: LookupField,
        value: &str,
    ) -> Result<Option<Transaction>> {
        let gateway = gateway.map(|g| g.as_str());
        let row = match field {
            LookupField::Id => {
                let Ok(id) = Uuid::parse_str(value) else {
                    return Ok(None);
                };
                sqlx::query(&format!(
                    "SELECT {COLUMNS} FROM transactions WHERE id = $1 AND ($2::text IS NULL OR gateway = $2)"
                ))
                .bind(id)
                .bind(gateway)
                .fetch_optional(&self.pool)
                .await?
            }
            other => {
                let column = match other {
                    LookupField::GatewayOrderId => "gateway_order_id",
                    LookupField::TransactionId => "transaction_id",
                    _ => "gateway_payment_id",
                };
                sqlx::query(&format!(
                    r#"
                    SELECT {COLUMNS} FROM transactions
                    WHERE {column} = $1 AND ($2::text IS NULL OR gateway = $2)
                    ORDER BY created_at DESC
                    LIMIT 1
                    "#
                ))
                .bind(value)
                .bind(gateway)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.as_ref().map(map_row).transpose()
    }

    async fn record_initiation(&self, id: Uuid, refs: &GatewayRefs) -> Result<Option<Transaction>> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET gateway_order_id = $2,
                gateway_link_id = $3,
                gateway_secondary_order_id = $4,
                transaction_id = COALESCE(transaction_id, id::text),
                updated_at = now()
            WHERE id = $1 AND gateway_order_id IS NULL
            "#,
        )
        .bind(id)
        .bind(&refs.gateway_order_id)
        .bind(refs.link_id.clone())
        .bind(refs.secondary_order_id.clone())
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await
    }

    async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'failed', failure_reason = $2, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_verification(
        &self,
        id: Uuid,
        update: &VerificationUpdate,
    ) -> Result<Option<AppliedVerification>> {
        let allowed_from: Vec<String> = PaymentStatus::predecessors_of(update.status)
            .into_iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let channel = match update.channel {
            DeliveryChannel::Callback => "callback",
            DeliveryChannel::Webhook => "webhook",
        };

        // The locked CTE captures the status the guard is evaluated against,
        // so racing deliveries serialise on the row.
        let row = sqlx::query(&format!(
            r#"
            WITH prev AS (
                SELECT id, status FROM transactions WHERE id = $1 FOR UPDATE
            )
            UPDATE transactions t SET
                status = CASE WHEN prev.status = ANY($3) THEN $2 ELSE t.status END,
                gateway_payment_id = CASE
                    WHEN prev.status = ANY($3) THEN COALESCE($4, t.gateway_payment_id)
                    ELSE COALESCE(t.gateway_payment_id, $4)
                END,
                amount = CASE
                    WHEN prev.status = ANY($3) AND $5::numeric IS NOT NULL THEN $5::numeric
                    ELSE t.amount
                END,
                failure_reason = CASE
                    WHEN prev.status = ANY($3) AND $2 = 'failed' THEN $6
                    ELSE t.failure_reason
                END,
                verified_at = CASE
                    WHEN prev.status = ANY($3) THEN COALESCE(t.verified_at, now())
                    ELSE t.verified_at
                END,
                callback_payload = CASE WHEN $7 = 'callback' THEN $8 ELSE t.callback_payload END,
                webhook_payload = CASE WHEN $7 = 'webhook' THEN $8 ELSE t.webhook_payload END,
                webhook_received = t.webhook_received OR $7 = 'webhook',
                updated_at = now()
            FROM prev
            WHERE t.id = prev.id
            RETURNING prev.status AS previous_status, {}
            "#,
            COLUMNS
                .split(',')
                .map(|c| format!("t.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .bind(id)
        .bind(update.status.as_str())
        .bind(&allowed_from)
        .bind(update.gateway_payment_id.clone())
        .bind(update.confirmed_amount)
        .bind(update.failure_reason.clone())
        .bind(channel)
        .bind(&update.raw_payload)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let previous: String = row.get("previous_status");
        let previous_status = previous.parse::<PaymentStatus>().map_err(|e| anyhow!(e))?;

        Ok(Some(AppliedVerification {
            transaction: map_row(&row)?,
            previous_status,
            applied: previous_status.can_transition_to(update.status),
        }))
    }

    async fn record_refund(&self, id: Uuid, record: &RefundRecord) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions SET
                status = CASE WHEN $2 = 'refunded' AND status = 'paid' THEN 'refunded' ELSE status END,
                refunded_at = CASE
                    WHEN $2 = 'refunded' AND status = 'paid' THEN COALESCE(refunded_at, now())
                    ELSE refunded_at
                END,
                refund_id = COALESCE($3, refund_id),
                refund_status = $4,
                refunded_amount = $5,
                updated_at = now()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(record.status.as_str())
        .bind(record.refund_id.clone())
        .bind(&record.refund_status)
        .bind(record.amount)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn list(&self, user_id: Option<&str>, limit: i64) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM transactions
            WHERE ($1::text IS NULL OR user_id = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
