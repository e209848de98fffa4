use crate::domain::payment::GatewayKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectEnvironment {
    Test,
    Live,
}

impl ProjectEnvironment {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("live") {
            ProjectEnvironment::Live
        } else {
            ProjectEnvironment::Test
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectEnvironment::Test => "test",
            ProjectEnvironment::Live => "live",
        }
    }
}

/// Per-tenant settings for one provider. Empty credential fields fall back to
/// the environment defaults.
#[derive(Debug, Clone, Default)]
pub struct ProjectGateway {
    pub gateway: Option<GatewayKind>,
    pub enabled: bool,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: Option<String>,
}

/// Tenant configuration. Read-only for the payment core.
#[derive(Debug, Clone)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub environment: ProjectEnvironment,
    pub default_currency: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub gateways: Vec<ProjectGateway>,
}

impl Project {
    pub fn gateway(&self, kind: GatewayKind) -> Option<&ProjectGateway> {
        self.gateways.iter().find(|g| g.gateway == Some(kind))
    }

    pub fn gateway_enabled(&self, kind: GatewayKind) -> bool {
        self.gateway(kind).map(|g| g.enabled).unwrap_or(false)
    }
}
