pub mod config;
pub mod domain {
    pub mod context;
    pub mod payment;
    pub mod project;
    pub mod transaction;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod callbacks;
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod caller_auth;
        pub mod rate_limit;
        pub mod raw_body;
    }
    pub mod routes;
}
pub mod repo {
    pub mod memory;
    pub mod projects_repo;
    pub mod store;
    pub mod transactions_repo;
}
pub mod service {
    pub mod payment_service;
    pub mod reconciliation;
}

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub payment_service: service::payment_service::PaymentService,
    pub config: Arc<config::AppConfig>,
    pub redis_client: Option<redis::Client>,
}
