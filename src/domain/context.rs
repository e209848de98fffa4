use serde::{Deserialize, Serialize};

/// JWT claims issued by the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

/// Authenticated caller, threaded explicitly through the orchestrators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: String,
    pub is_admin: bool,
}

impl CallerContext {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            is_admin: claims.role.as_deref() == Some("admin"),
        }
    }

    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.is_admin || self.user_id == owner_id
    }
}
