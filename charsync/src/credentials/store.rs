//! Server configuration store abstraction.
//!
//! The server list (auth mode, secret key, OAuth2 token) is owned by the host application.
//! The credential core reads it and writes back renewed OAuth2 refresh tokens.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::error::CredentialError;
use super::types::ServerAuthConfig;

#[async_trait]
pub trait ServerConfigStore: Send + Sync {
    /// The currently selected server, if any.
    fn current_server(&self) -> Option<ServerAuthConfig>;

    /// Persist a renewed OAuth2 refresh token, or clear it with `None`.
    async fn update_oauth_token(
        &self,
        server_uri: &str,
        token: Option<String>,
    ) -> Result<(), CredentialError>;
}

/// Process-local store holding a single active server.
#[derive(Debug, Default)]
pub struct InMemoryServerConfigStore {
    current: RwLock<Option<ServerAuthConfig>>,
}

impl InMemoryServerConfigStore {
    pub fn new(server: ServerAuthConfig) -> Self {
        Self {
            current: RwLock::new(Some(server)),
        }
    }

    /// Replace (or clear) the active server.
    pub fn set_current(&self, server: Option<ServerAuthConfig>) {
        *self.current.write() = server;
    }
}

#[async_trait]
impl ServerConfigStore for InMemoryServerConfigStore {
    fn current_server(&self) -> Option<ServerAuthConfig> {
        self.current.read().clone()
    }

    async fn update_oauth_token(
        &self,
        server_uri: &str,
        token: Option<String>,
    ) -> Result<(), CredentialError> {
        let mut guard = self.current.write();
        match guard.as_mut() {
            Some(server) if server.server_uri == server_uri => {
                server.oauth_token = token;
                Ok(())
            }
            _ => Err(CredentialError::Store(format!(
                "server {server_uri} is not configured"
            ))),
        }
    }
}
