//! Session registry
//!
//! Maps opaque bearer tokens to user identities for the lifetime of the
//! process. Sessions are never persisted and never expire; a restart
//! invalidates every token. Injected into the authorization guard as a
//! dependency rather than held as module-level state.

use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-lifetime token → user map
#[derive(Debug, Default)]
pub struct SessionRegistry {
    tokens: RwLock<HashMap<String, Uuid>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh opaque token for a user
    pub async fn issue(&self, user_id: Uuid) -> String {
        let token = Uuid::new_v4().to_string();
        self.tokens.write().await.insert(token.clone(), user_id);
        token
    }

    /// Resolve a token to the user it was issued for
    pub async fn resolve(&self, token: &str) -> Option<Uuid> {
        self.tokens.read().await.get(token).copied()
    }

    /// Drop every session belonging to a user (admin user deletion)
    pub async fn revoke_user(&self, user_id: Uuid) {
        self.tokens.write().await.retain(|_, id| *id != user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_and_resolve() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();

        let token = registry.issue(user_id).await;
        assert_eq!(registry.resolve(&token).await, Some(user_id));
        assert_eq!(registry.resolve("bogus").await, None);
    }

    #[tokio::test]
    async fn test_revoke_user_drops_all_tokens() {
        let registry = SessionRegistry::new();
        let user_id = Uuid::new_v4();
        let other = Uuid::new_v4();

        let t1 = registry.issue(user_id).await;
        let t2 = registry.issue(user_id).await;
        let t3 = registry.issue(other).await;

        registry.revoke_user(user_id).await;
        assert_eq!(registry.resolve(&t1).await, None);
        assert_eq!(registry.resolve(&t2).await, None);
        assert_eq!(registry.resolve(&t3).await, Some(other));
    }
}
