//! Bearer credentials for the notification channel.
//!
//! The manager asks its [`AuthTokenProvider`] for a token before *every*
//! connect attempt, including automatic retries, so a token refreshed between
//! attempts is picked up without restarting anything.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

/// Supplies the bearer token for the next connect attempt.
///
/// Returning `None` makes an anonymous attempt, which the hub rejects.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync + 'static {
    async fn access_token(&self) -> Option<String>;
}

/// Never supplies a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl AuthTokenProvider for Anonymous {
    async fn access_token(&self) -> Option<String> {
        None
    }
}

/// A token fixed at construction time.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AuthTokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Shared, updatable token slot written by a login / refresh flow.
///
/// Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    /// Replace the stored token (e.g. after a refresh).
    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Forget the stored token (e.g. on logout).
    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

#[async_trait]
impl AuthTokenProvider for TokenStore {
    async fn access_token(&self) -> Option<String> {
        self.token.read().clone()
    }
}
