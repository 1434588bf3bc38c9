//! Core credential types.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::CredentialError;

/// The credential a server is configured with.
///
/// The variant also selects the authentication flow.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AuthCredential {
    /// Shared secret key (hashed before it leaves the client).
    SecretKey(String),
    /// OAuth2 refresh token issued by the service.
    OAuthToken(String),
}

impl AuthCredential {
    #[inline]
    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuthToken(_))
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecretKey(_) => f.write_str("SecretKey(<redacted>)"),
            Self::OAuthToken(_) => f.write_str("OAuthToken(<redacted>)"),
        }
    }
}

/// Composite cache key identifying a (server, character, credential) tuple.
///
/// Equality and hashing cover every field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    /// HTTP(S) base URL of the server's API.
    pub server_api_url: String,
    /// Hash of the player's character identity.
    pub character_hash: String,
    /// Account UID (OAuth2 flow only).
    pub uid: Option<String>,
    /// Secret key or OAuth2 token.
    pub credential: AuthCredential,
    /// Hash of player name + home world.
    pub name_world_hash: String,
}

impl Identity {
    #[inline]
    pub fn uses_oauth(&self) -> bool {
        self.credential.is_oauth()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = |s: &str| s.chars().take(8).collect::<String>();
        write!(
            f,
            "{}|{}|{}",
            self.server_api_url,
            short(&self.character_hash),
            if self.uses_oauth() { "oauth2" } else { "secret" }
        )?;
        if let Some(uid) = &self.uid {
            write!(f, "|{}", uid)?;
        }
        Ok(())
    }
}

/// Per-server authentication settings, owned by the server configuration store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAuthConfig {
    /// Realtime transport URI (`wss://` or `ws://`).
    pub server_uri: String,
    /// Whether the OAuth2 flow is used instead of the shared secret.
    pub use_oauth2: bool,
    /// Shared secret key (secret flow).
    pub secret_key: Option<String>,
    /// OAuth2 refresh token (OAuth2 flow).
    pub oauth_token: Option<String>,
    /// Account UID bound to the current character (OAuth2 flow).
    pub uid: Option<String>,
}

impl ServerAuthConfig {
    /// Config for the shared secret flow.
    pub fn secret(server_uri: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            server_uri: server_uri.into(),
            use_oauth2: false,
            secret_key: Some(secret_key.into()),
            oauth_token: None,
            uid: None,
        }
    }

    /// Config for the OAuth2 flow.
    pub fn oauth2(
        server_uri: impl Into<String>,
        oauth_token: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            server_uri: server_uri.into(),
            use_oauth2: true,
            secret_key: None,
            oauth_token: Some(oauth_token.into()),
            uid: Some(uid.into()),
        }
    }

    /// HTTP base URL of the API, derived from the transport URI.
    ///
    /// `wss://` maps to `https://` and `ws://` to `http://`; plain http(s) URIs pass through.
    pub fn api_base_url(&self) -> Result<String, CredentialError> {
        let rewritten = if let Some(rest) = self.server_uri.strip_prefix("wss://") {
            format!("https://{rest}")
        } else if let Some(rest) = self.server_uri.strip_prefix("ws://") {
            format!("http://{rest}")
        } else {
            self.server_uri.clone()
        };

        let url = Url::parse(&rewritten).map_err(|e| {
            CredentialError::Configuration(format!("invalid server uri {}: {e}", self.server_uri))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CredentialError::Configuration(format!(
                "unsupported scheme in server uri {}",
                self.server_uri
            )));
        }

        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    /// The credential matching the configured auth mode, if present.
    pub fn credential(&self) -> Option<AuthCredential> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        if self.use_oauth2 {
            non_empty(&self.oauth_token).map(AuthCredential::OAuthToken)
        } else {
            non_empty(&self.secret_key).map(AuthCredential::SecretKey)
        }
    }
}

impl fmt::Debug for ServerAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAuthConfig")
            .field("server_uri", &self.server_uri)
            .field("use_oauth2", &self.use_oauth2)
            .field("has_secret_key", &self.secret_key.is_some())
            .field("has_oauth_token", &self.oauth_token.is_some())
            .field("uid", &self.uid)
            .finish()
    }
}

/// Hashed player context supplied by the game client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerContext {
    pub character_hash: String,
    pub name_world_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn identity(credential: AuthCredential) -> Identity {
        Identity {
            server_api_url: "https://sync.example.net".to_string(),
            character_hash: "ABCDEF0123".to_string(),
            uid: None,
            credential,
            name_world_hash: "FEDCBA".to_string(),
        }
    }

    #[test]
    fn test_api_base_url_rewrites_websocket_schemes() {
        let secure = ServerAuthConfig::secret("wss://sync.example.net", "key");
        assert_eq!(secure.api_base_url().unwrap(), "https://sync.example.net");

        let plain = ServerAuthConfig::secret("ws://127.0.0.1:6000/", "key");
        assert_eq!(plain.api_base_url().unwrap(), "http://127.0.0.1:6000");

        let bad = ServerAuthConfig::secret("ftp://example.net", "key");
        assert!(matches!(
            bad.api_base_url(),
            Err(CredentialError::Configuration(_))
        ));
    }

    #[test]
    fn test_credential_follows_auth_mode() {
        let mut config = ServerAuthConfig::oauth2("wss://a", "refresh", "UID1");
        config.secret_key = Some("secret".to_string());
        assert_eq!(
            config.credential(),
            Some(AuthCredential::OAuthToken("refresh".to_string()))
        );

        config.use_oauth2 = false;
        assert_eq!(
            config.credential(),
            Some(AuthCredential::SecretKey("secret".to_string()))
        );

        config.secret_key = Some("  ".to_string());
        assert_eq!(config.credential(), None);
    }

    #[test]
    fn test_identity_equality_covers_all_fields() {
        let a = identity(AuthCredential::SecretKey("k".to_string()));
        let b = identity(AuthCredential::SecretKey("k".to_string()));
        let c = identity(AuthCredential::OAuthToken("k".to_string()));
        let mut d = a.clone();
        d.name_world_hash = "OTHER".to_string();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<Identity> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let id = identity(AuthCredential::SecretKey("hunter2".to_string()));
        let rendered = format!("{:?} {}", id, id);
        assert!(!rendered.contains("hunter2"));

        let config = ServerAuthConfig::secret("wss://a", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
