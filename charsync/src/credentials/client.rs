//! Token acquisition client.
//!
//! Performs the HTTP exchanges with the sync server's auth endpoints:
//! - `POST {base}/auth`: shared secret login
//! - `POST {base}/auth/oauth`: OAuth2 login
//! - `GET {base}/auth/renew`: bearer token renewal
//! - `POST {base}/oauth/renewToken`: OAuth2 refresh token renewal

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::context::{Hasher, MachineIdentityProvider};
use super::error::CredentialError;
use super::types::{AuthCredential, Identity, ServerAuthConfig};

const AUTH_PATH: &str = "/auth";
const OAUTH_PATH: &str = "/auth/oauth";
const RENEW_PATH: &str = "/auth/renew";
const OAUTH_RENEW_PATH: &str = "/oauth/renewToken";

/// Performs token exchanges against the auth endpoints.
pub struct TokenAcquisitionClient {
    client: Client,
    hasher: Arc<dyn Hasher>,
    machine: Arc<dyn MachineIdentityProvider>,
}

impl TokenAcquisitionClient {
    pub fn new(
        client: Client,
        hasher: Arc<dyn Hasher>,
        machine: Arc<dyn MachineIdentityProvider>,
    ) -> Self {
        Self {
            client,
            hasher,
            machine,
        }
    }

    /// Acquire a bearer token for `identity`.
    ///
    /// With `renewal = Some(current)` the current token is exchanged for a fresh one,
    /// regardless of the identity's auth flow. Otherwise the identity's credential selects
    /// the shared secret or the OAuth2 login.
    ///
    /// # Returns
    /// * `Ok(token)` - Raw bearer token from the response body
    /// * `Err(AuthRejected)` - HTTP 401
    /// * `Err(ValidationRejected)` - HTTP 400, carrying the server message
    /// * `Err(Network | UnexpectedStatus)` - Transient failure
    /// * `Err(Cancelled)` - `cancel` fired before the exchange completed
    #[instrument(skip(self, identity, renewal, cancel), fields(identity = %identity, renewal = renewal.is_some()))]
    pub async fn acquire(
        &self,
        identity: &Identity,
        renewal: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let request = match renewal {
            Some(current) => self.renewal_request(identity, current),
            None => match &identity.credential {
                AuthCredential::SecretKey(secret) => self.secret_request(identity, secret),
                AuthCredential::OAuthToken(oauth) => self.oauth_request(identity, oauth)?,
            },
        };

        let token = self.execute(request, cancel).await?;
        debug!("Token exchange completed");
        Ok(token)
    }

    /// Exchange the stored OAuth2 refresh token for a new one.
    #[instrument(skip(self, server, oauth_token, cancel), fields(server = %server.server_uri))]
    pub async fn renew_oauth_token(
        &self,
        server: &ServerAuthConfig,
        oauth_token: &str,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let url = format!("{}{}", server.api_base_url()?, OAUTH_RENEW_PATH);
        let request = self.client.post(url).bearer_auth(oauth_token);
        self.execute(request, cancel).await
    }

    fn secret_request(&self, identity: &Identity, secret: &str) -> RequestBuilder {
        let url = format!("{}{}", identity.server_api_url, AUTH_PATH);
        let hashed = self.hasher.hash(secret);
        debug!(%url, "Requesting token with shared secret");

        self.client.post(url).form(&[
            ("auth", hashed.as_str()),
            ("charaIdent", identity.character_hash.as_str()),
        ])
    }

    fn oauth_request(
        &self,
        identity: &Identity,
        oauth_token: &str,
    ) -> Result<RequestBuilder, CredentialError> {
        let uid = identity
            .uid
            .as_deref()
            .ok_or(CredentialError::MissingCredential("uid"))?;
        let url = format!("{}{}", identity.server_api_url, OAUTH_PATH);
        let machine_id = self.hasher.hash(&self.machine.machine_id());
        debug!(%url, %uid, "Requesting token with OAuth2");

        Ok(self.client.post(url).bearer_auth(oauth_token).form(&[
            ("uid", uid),
            ("charaIdent", identity.character_hash.as_str()),
            ("nameWithWorld", identity.name_world_hash.as_str()),
            ("machineId", machine_id.as_str()),
        ]))
    }

    fn renewal_request(&self, identity: &Identity, current: &str) -> RequestBuilder {
        let url = format!("{}{}", identity.server_api_url, RENEW_PATH);
        debug!(%url, "Requesting token renewal");
        self.client.get(url).bearer_auth(current)
    }

    /// Send the request and map the response, aborting on cancellation.
    async fn execute(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, CredentialError>((status, body))
        };

        let (status, body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Token exchange cancelled");
                return Err(CredentialError::Cancelled);
            }
            result = exchange => result?,
        };

        map_response(status, body)
    }
}

fn map_response(status: StatusCode, body: String) -> Result<String, CredentialError> {
    if status.is_success() {
        let token = body.trim();
        if token.is_empty() {
            return Err(CredentialError::InvalidToken(
                "empty token in response".to_string(),
            ));
        }
        return Ok(token.to_string());
    }

    let message = body.trim().to_string();
    match status {
        StatusCode::UNAUTHORIZED => {
            warn!(status = %status, "Server rejected credentials");
            Err(CredentialError::AuthRejected { message })
        }
        StatusCode::BAD_REQUEST => {
            warn!(status = %status, %message, "Server rejected auth request");
            Err(CredentialError::ValidationRejected { message })
        }
        _ => {
            warn!(status = %status, "Unexpected auth response");
            Err(CredentialError::UnexpectedStatus {
                status: status.as_u16(),
                body: message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_response_success_trims_body() {
        let token = map_response(StatusCode::OK, "  eyJ.token.sig\n".to_string()).unwrap();
        assert_eq!(token, "eyJ.token.sig");

        let err = map_response(StatusCode::OK, "   ".to_string()).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidToken(_)));
    }

    #[test]
    fn test_map_response_status_classes() {
        assert!(matches!(
            map_response(StatusCode::UNAUTHORIZED, String::new()),
            Err(CredentialError::AuthRejected { .. })
        ));

        match map_response(StatusCode::BAD_REQUEST, "Your account is banned".to_string()) {
            Err(CredentialError::ValidationRejected { message }) => {
                assert_eq!(message, "Your account is banned")
            }
            other => panic!("unexpected result: {other:?}"),
        }

        match map_response(StatusCode::SERVICE_UNAVAILABLE, "busy".to_string()) {
            Err(e @ CredentialError::UnexpectedStatus { status: 503, .. }) => {
                assert!(e.is_transient())
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
