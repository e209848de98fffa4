use crate::domain::payment::GatewayKind;
use crate::gateways::cashfree::CashfreeGateway;
use crate::gateways::payu::PayuGateway;
use crate::gateways::razorpay::RazorpayGateway;
use crate::gateways::PaymentGateway;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Name-to-adapter lookup table.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    adapters: HashMap<GatewayKind, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in adapter, sharing one HTTP client and one request timeout.
    pub fn with_default_adapters(client: reqwest::Client, timeout: Duration) -> Self {
        Self::new()
            .register(Arc::new(RazorpayGateway::new(client.clone(), timeout)))
            .register(Arc::new(CashfreeGateway::new(client.clone(), timeout)))
            .register(Arc::new(PayuGateway::new(client, timeout)))
    }

    pub fn register(mut self, adapter: Arc<dyn PaymentGateway>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    /// Lowercase-normalized lookup. Unknown or unregistered names resolve to `None`.
    pub fn resolve(&self, name: &str) -> Option<(GatewayKind, Arc<dyn PaymentGateway>)> {
        let kind = name.parse::<GatewayKind>().ok()?;
        self.adapters.get(&kind).map(|a| (kind, a.clone()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.adapters.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}
