//! Bearer token cache.
//!
//! Concurrent map from [`Identity`] to the last token issued for it. Safe to share between
//! the connection setup path and the background renewal task without external locking.

use dashmap::DashMap;

use super::types::Identity;

/// Thread-safe token cache keyed by identity.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: DashMap<Identity, String>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Get the cached token for an identity.
    pub fn get(&self, identity: &Identity) -> Option<String> {
        self.tokens.get(identity).map(|entry| entry.value().clone())
    }

    /// Store a token, replacing any previous one (last write wins).
    pub fn set(&self, identity: Identity, token: String) {
        self.tokens.insert(identity, token);
    }

    /// Remove the token for an identity, returning it if present.
    pub fn remove(&self, identity: &Identity) -> Option<String> {
        self.tokens.remove(identity).map(|(_, token)| token)
    }

    #[inline]
    pub fn contains(&self, identity: &Identity) -> bool {
        self.tokens.contains_key(identity)
    }

    /// Drop every cached token.
    pub fn clear(&self) {
        self.tokens.clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
