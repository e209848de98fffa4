use crate::domain::payment::GatewayKind;
use crate::domain::project::{Project, ProjectEnvironment, ProjectGateway};
use crate::repo::store::{GatewayLogEntry, GatewayLogStore, ProjectStore};
use anyhow::Result;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct ProjectsRepo {
    pub pool: PgPool,
}

impl ProjectsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProjectStore for ProjectsRepo {
    async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        let Some(row) = sqlx::query(
            r#"
            SELECT id, owner_id, name, environment, default_currency, success_url, failure_url
            FROM projects
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let gateway_rows = sqlx::query(
            r#"
            SELECT gateway, enabled, key_id, key_secret, webhook_secret, base_url
            FROM project_gateways
            WHERE project_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let gateways = gateway_rows
            .into_iter()
            .map(|r| {
                let name: String = r.get("gateway");
                ProjectGateway {
                    // Rows for providers this build does not support are kept but never match.
                    gateway: name.parse::<GatewayKind>().ok(),
                    enabled: r.get("enabled"),
                    key_id: r.get("key_id"),
                    key_secret: r.get("key_secret"),
                    webhook_secret: r.get("webhook_secret"),
                    base_url: r.get("base_url"),
                }
            })
            .collect();

        let environment: String = row.get("environment");
        Ok(Some(Project {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            name: row.get("name"),
            environment: ProjectEnvironment::parse(&environment),
            default_currency: row.get("default_currency"),
            success_url: row.get("success_url"),
            failure_url: row.get("failure_url"),
            gateways,
        }))
    }
}

#[derive(Clone)]
pub struct GatewayLogsRepo {
    pub pool: PgPool,
}

impl GatewayLogsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl GatewayLogStore for GatewayLogsRepo {
    async fn append(&self, entry: GatewayLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO gateway_logs (id, transaction_id, gateway, action, ok, message, request, response, created_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.transaction_id)
        .bind(entry.gateway.as_str())
        .bind(&entry.action)
        .bind(entry.ok)
        .bind(&entry.message)
        .bind(&entry.request)
        .bind(&entry.response)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
