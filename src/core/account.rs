//! Account contract consumed by resources
//!
//! Authentication happens upstream. The resource layer only needs a stable
//! identity and a role set: the render cache uses them as discriminators and
//! field access voters use them to decide visibility.

use anyhow::Result;
use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Role every unauthenticated caller carries
pub const ANONYMOUS_ROLE: &str = "anonymous user";

/// Role every authenticated caller carries
pub const AUTHENTICATED_ROLE: &str = "authenticated user";

/// A resolved account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable identity, `None` for anonymous callers
    pub id: Option<String>,

    /// Role identifiers
    pub roles: Vec<String>,
}

impl Account {
    /// The anonymous account
    pub fn anonymous() -> Self {
        Self {
            id: None,
            roles: vec![ANONYMOUS_ROLE.to_string()],
        }
    }

    /// An authenticated account with extra roles
    pub fn authenticated(id: impl Into<String>, roles: Vec<String>) -> Self {
        let mut all = vec![AUTHENTICATED_ROLE.to_string()];
        for role in roles {
            if !all.contains(&role) {
                all.push(role);
            }
        }
        Self {
            id: Some(id.into()),
            roles: all,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.id.is_none()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Identity used in per-user cache keys (`0` for anonymous)
    pub fn identity(&self) -> &str {
        self.id.as_deref().unwrap_or("0")
    }

    /// Roles sorted and de-duplicated, used in per-role cache keys
    pub fn sorted_roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.roles.iter().map(String::as_str).collect();
        roles.sort_unstable();
        roles.dedup();
        roles
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::anonymous()
    }
}

/// Resolves the caller's account from request headers
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Account>;
}

/// Resolver that treats every caller as anonymous (for development)
pub struct AnonymousResolver;

#[async_trait]
impl AccountResolver for AnonymousResolver {
    async fn resolve(&self, _headers: &HeaderMap) -> Result<Account> {
        Ok(Account::anonymous())
    }
}
