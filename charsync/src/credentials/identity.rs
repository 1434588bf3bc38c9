//! Identity resolver.
//!
//! Derives the token cache key from the current player context and the active server.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::context::PlayerContextProvider;
use super::store::ServerConfigStore;
use super::types::Identity;

/// Resolves the identity used to key cached tokens.
///
/// Resolution never fails: when the game client is transiently unready the last
/// successfully resolved identity is returned instead.
pub struct IdentityResolver {
    player: Arc<dyn PlayerContextProvider>,
    servers: Arc<dyn ServerConfigStore>,
    last_known: RwLock<Option<Identity>>,
}

impl IdentityResolver {
    pub fn new(player: Arc<dyn PlayerContextProvider>, servers: Arc<dyn ServerConfigStore>) -> Self {
        Self {
            player,
            servers,
            last_known: RwLock::new(None),
        }
    }

    /// Resolve the current identity, falling back to the last known one.
    pub fn resolve(&self) -> Option<Identity> {
        match self.try_resolve() {
            Some(identity) => {
                let mut last = self.last_known.write();
                if last.as_ref() != Some(&identity) {
                    debug!(identity = %identity, "Resolved new identity");
                    *last = Some(identity.clone());
                }
                Some(identity)
            }
            None => {
                let last = self.last_known.read().clone();
                if let Some(identity) = &last {
                    debug!(identity = %identity, "Identity unavailable, using last known");
                }
                last
            }
        }
    }

    /// The last successfully resolved identity.
    pub fn last_known(&self) -> Option<Identity> {
        self.last_known.read().clone()
    }

    /// Discard the last known identity (login/logout).
    pub fn forget(&self) {
        *self.last_known.write() = None;
    }

    fn try_resolve(&self) -> Option<Identity> {
        let server = self.servers.current_server()?;
        let player = self.player.current()?;

        let server_api_url = match server.api_base_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "Cannot derive API url for current server");
                return None;
            }
        };

        let Some(credential) = server.credential() else {
            debug!(server = %server.server_uri, "No credential configured for current server");
            return None;
        };

        let uid = if credential.is_oauth() {
            let uid = server.uid.filter(|u| !u.trim().is_empty());
            if uid.is_none() {
                debug!(server = %server.server_uri, "No UID assigned for OAuth2 server");
                return None;
            }
            uid
        } else {
            None
        };

        Some(Identity {
            server_api_url,
            character_hash: player.character_hash,
            uid,
            credential,
            name_world_hash: player.name_world_hash,
        })
    }
}
