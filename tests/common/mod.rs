#![allow(dead_code)]

use payments_aggregator::config::AppConfig;
use payments_aggregator::domain::context::CallerContext;
use payments_aggregator::domain::payment::{Customer, GatewayKind};
use payments_aggregator::domain::project::{Project, ProjectEnvironment, ProjectGateway};
use payments_aggregator::gateways::registry::GatewayRegistry;
use payments_aggregator::repo::memory::InMemoryStore;
use payments_aggregator::service::payment_service::PaymentService;
use payments_aggregator::AppState;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const OWNER: &str = "owner-1";
pub const RAZORPAY_SECRET: &str = "rzp_secret";
pub const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_webhook_secret";
pub const CASHFREE_SECRET: &str = "cf_secret";
pub const PAYU_KEY: &str = "payu_key";
pub const PAYU_SALT: &str = "payu_salt";

pub struct Harness {
    pub store: InMemoryStore,
    pub service: PaymentService,
    pub project: Project,
}

pub fn owner() -> CallerContext {
    CallerContext {
        user_id: OWNER.to_string(),
        is_admin: false,
    }
}

pub fn stranger() -> CallerContext {
    CallerContext {
        user_id: "someone-else".to_string(),
        is_admin: false,
    }
}

fn gateway(kind: GatewayKind, id: &str, secret: &str, webhook: Option<&str>, base_url: &str) -> ProjectGateway {
    ProjectGateway {
        gateway: Some(kind),
        enabled: true,
        key_id: Some(id.to_string()),
        key_secret: Some(secret.to_string()),
        webhook_secret: webhook.map(str::to_string),
        base_url: Some(base_url.to_string()),
    }
}

/// Project wired to every provider, all pointing at `base_url`.
pub async fn harness(base_url: &str) -> Harness {
    let store = InMemoryStore::new();
    let project = Project {
        id: Uuid::new_v4(),
        owner_id: OWNER.to_string(),
        name: "Storefront".to_string(),
        environment: ProjectEnvironment::Test,
        default_currency: "INR".to_string(),
        success_url: Some("https://shop.example.com/paid".to_string()),
        failure_url: Some("https://shop.example.com/failed".to_string()),
        gateways: vec![
            gateway(
                GatewayKind::Razorpay,
                "rzp_test_key",
                RAZORPAY_SECRET,
                Some(RAZORPAY_WEBHOOK_SECRET),
                base_url,
            ),
            gateway(GatewayKind::Cashfree, "cf_app", CASHFREE_SECRET, None, base_url),
            gateway(GatewayKind::Payu, PAYU_KEY, PAYU_SALT, None, base_url),
        ],
    };
    store.put_project(project.clone()).await;

    let service = PaymentService {
        transactions: Arc::new(store.clone()),
        projects: Arc::new(store.clone()),
        gateway_logs: Arc::new(store.clone()),
        registry: GatewayRegistry::with_default_adapters(reqwest::Client::new(), Duration::from_secs(5)),
        config: Arc::new(AppConfig::for_tests()),
    };

    Harness {
        store,
        service,
        project,
    }
}

pub fn app_state(h: &Harness) -> AppState {
    AppState {
        payment_service: h.service.clone(),
        config: h.service.config.clone(),
        redis_client: None,
    }
}

pub fn customer() -> Customer {
    Customer {
        name: Some("Asha Rao".to_string()),
        email: "asha@example.com".to_string(),
        phone: Some("+91 98765 43210".to_string()),
    }
}
