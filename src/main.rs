use payments_aggregator::config::{AppConfig, LedgerBackend};
use payments_aggregator::gateways::registry::GatewayRegistry;
use payments_aggregator::http::routes::build_router;
use payments_aggregator::repo::memory::InMemoryStore;
use payments_aggregator::repo::projects_repo::{GatewayLogsRepo, ProjectsRepo};
use payments_aggregator::repo::store::{GatewayLogStore, ProjectStore, TransactionStore};
use payments_aggregator::repo::transactions_repo::TransactionsRepo;
use payments_aggregator::service::payment_service::PaymentService;
use payments_aggregator::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

type Stores = (
    Arc<dyn TransactionStore>,
    Arc<dyn ProjectStore>,
    Arc<dyn GatewayLogStore>,
);

async fn open_stores(cfg: &AppConfig) -> anyhow::Result<Stores> {
    match cfg.ledger_backend {
        LedgerBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&cfg.database_url)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            Ok((
                Arc::new(TransactionsRepo::new(pool.clone())),
                Arc::new(ProjectsRepo::new(pool.clone())),
                Arc::new(GatewayLogsRepo::new(pool)),
            ))
        }
        LedgerBackend::Memory => {
            tracing::warn!("using the in-memory ledger; data is lost on restart");
            let store = InMemoryStore::new();
            Ok((
                Arc::new(store.clone()),
                Arc::new(store.clone()),
                Arc::new(store),
            ))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Arc::new(AppConfig::from_env());
    let (transactions, projects, gateway_logs) = open_stores(&cfg).await?;

    let registry = GatewayRegistry::with_default_adapters(reqwest::Client::new(), cfg.gateway_timeout());

    let redis_client = match &cfg.redis_url {
        Some(url) => Some(redis::Client::open(url.as_str())?),
        None => None,
    };

    let payment_service = PaymentService {
        transactions,
        projects,
        gateway_logs,
        registry,
        config: cfg.clone(),
    };

    let state = AppState {
        payment_service,
        config: cfg.clone(),
        redis_client,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!(
        env = %cfg.app_env,
        timeout_ms = cfg.gateway_timeout_ms,
        "listening on {}",
        cfg.bind_addr
    );
    axum::serve(listener, app).await?;
    Ok(())
}
