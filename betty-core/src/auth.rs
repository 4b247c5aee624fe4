//! Bearer token storage.
//!
//! The mobile shell backs this with the platform keychain; the workspace
//! ships an in-memory store for the console binary and tests.

use async_trait::async_trait;
use secrecy::Secret;
use tokio::sync::RwLock;

use crate::error::ErrorKind;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current access token, if the user is signed in.
    async fn token(&self) -> Option<Secret<String>>;

    async fn set_token(&self, token: Secret<String>);

    /// Forget the token, e.g. after the backend rejected it.
    async fn clear(&self);
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<Secret<String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(Secret::new(token.into()))),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn token(&self) -> Option<Secret<String>> {
        self.token.read().await.clone()
    }

    async fn set_token(&self, token: Secret<String>) {
        *self.token.write().await = Some(token);
    }

    async fn clear(&self) {
        *self.token.write().await = None;
        tracing::info!("Access token cleared");
    }
}

/// Drop the stored token when a call failed with an error that needs a new
/// sign-in. Returns `true` if the token was cleared.
pub async fn forget_rejected_token(tokens: &dyn TokenStore, kind: ErrorKind) -> bool {
    if !kind.requires_reauth() {
        return false;
    }
    tracing::warn!(kind = %kind, "Backend rejected the access token");
    tokens.clear().await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn test_set_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.token().await.is_none());

        store.set_token(Secret::new("abc".to_string())).await;
        assert_eq!(store.token().await.unwrap().expose_secret(), "abc");

        store.clear().await;
        assert!(store.token().await.is_none());
    }

    #[tokio::test]
    async fn test_with_token() {
        let store = MemoryTokenStore::with_token("seeded");
        assert_eq!(store.token().await.unwrap().expose_secret(), "seeded");
    }

    #[tokio::test]
    async fn test_auth_error_clears_token() {
        let store = MemoryTokenStore::with_token("expired");

        assert!(forget_rejected_token(&store, ErrorKind::Auth).await);
        assert!(store.token().await.is_none());
    }

    #[tokio::test]
    async fn test_other_errors_keep_token() {
        let store = MemoryTokenStore::with_token("valid");

        for kind in [
            ErrorKind::Network,
            ErrorKind::Validation,
            ErrorKind::Server,
            ErrorKind::RateLimited,
            ErrorKind::NotFound,
            ErrorKind::Unknown,
        ] {
            assert!(!forget_rejected_token(&store, kind).await, "{kind} cleared the token");
        }
        assert_eq!(store.token().await.unwrap().expose_secret(), "valid");
    }
}
