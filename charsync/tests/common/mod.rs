//! Shared fixtures: a scripted auth server, a manual clock and token minting.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::routing::{get, post};
use charsync::config::AuthConfig;
use charsync::credentials::{
    Clock, IdentityResolver, InMemoryServerConfigStore, MachineIdentityProvider, PlayerContext,
    ServerAuthConfig, Sha256Hasher, StaticPlayerContext, TokenAcquisitionClient,
    TokenLifecycleCoordinator,
};
use charsync::events::{ClientEvent, EventBus};
use charsync::utils::http_client::build_http_client;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub const SECRET_KEY: &str = "0123456789ABCDEF";
pub const MACHINE_ID: &str = "test-host|Linux|6.1";

/// A request as seen by the scripted server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub authorization: Option<String>,
    pub form: HashMap<String, String>,
}

#[derive(Default)]
struct ServerState {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<(StatusCode, String)>>,
    delay: Mutex<Option<StdDuration>>,
}

/// Local HTTP server answering the auth endpoints from a scripted queue.
pub struct MockAuthServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl MockAuthServer {
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/auth", post(handle))
            .route("/auth/oauth", post(handle))
            .route("/auth/renew", get(handle))
            .route("/oauth/renewToken", post(handle))
            .with_state(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Transport URI as the host would configure it.
    pub fn ws_uri(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn respond(&self, status: StatusCode, body: impl Into<String>) {
        self.state.responses.lock().push_back((status, body.into()));
    }

    pub fn respond_token(&self, token: &str) {
        self.respond(StatusCode::OK, token);
    }

    pub fn set_delay(&self, delay: StdDuration) {
        *self.state.delay.lock() = Some(delay);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().len()
    }
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let form = url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();

    state.requests.lock().push(RecordedRequest {
        method,
        path: uri.path().to_string(),
        authorization,
        form,
    });

    let delay = *state.delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let scripted = state.responses.lock().pop_front();
    scripted.unwrap_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "no scripted response".to_string(),
    ))
}

/// Controllable time source.
#[derive(Clone)]
pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(start)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }

    pub fn as_clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock())
    }
}

pub struct FixedMachine;

impl MachineIdentityProvider for FixedMachine {
    fn machine_id(&self) -> String {
        MACHINE_ID.to_string()
    }
}

/// Mint a server-style token expiring at `exp`.
pub fn mint_token(subject: &str, exp: DateTime<Utc>) -> String {
    encode(
        &Header::default(),
        &json!({
            "sub": subject,
            "exp": exp.timestamp(),
            "expiration_date": exp.timestamp().to_string(),
        }),
        &EncodingKey::from_secret(b"server-signing-key"),
    )
    .unwrap()
}

/// Mint a token carrying only the secondary `expiration_date` claim.
pub fn mint_token_without_exp(subject: &str, expiration_date: DateTime<Utc>) -> String {
    encode(
        &Header::default(),
        &json!({
            "sub": subject,
            "expiration_date": expiration_date.timestamp().to_string(),
        }),
        &EncodingKey::from_secret(b"server-signing-key"),
    )
    .unwrap()
}

pub fn player() -> PlayerContext {
    PlayerContext {
        character_hash: "CHARAHASH".to_string(),
        name_world_hash: "NAMEWORLDHASH".to_string(),
    }
}

pub struct Harness {
    pub server: MockAuthServer,
    pub store: Arc<InMemoryServerConfigStore>,
    pub events: EventBus,
    pub receiver: broadcast::Receiver<ClientEvent>,
    pub clock: ManualClock,
    pub coordinator: Arc<TokenLifecycleCoordinator>,
}

impl Harness {
    /// Shared secret server with the default token contract.
    pub async fn secret() -> Self {
        Self::build(|uri| ServerAuthConfig::secret(uri, SECRET_KEY), AuthConfig::default()).await
    }

    /// Shared secret server whose tokens live `lifetime`.
    pub async fn secret_with_lifetime(lifetime: Duration) -> Self {
        let config = AuthConfig {
            clock_skew_offset: lifetime,
            ..AuthConfig::default()
        };
        Self::build(|uri| ServerAuthConfig::secret(uri, SECRET_KEY), config).await
    }

    pub async fn oauth(oauth_token: &str) -> Self {
        let token = oauth_token.to_string();
        Self::build(
            move |uri| ServerAuthConfig::oauth2(uri, token, "UID-42"),
            AuthConfig::default(),
        )
        .await
    }

    pub async fn build(
        server_config: impl FnOnce(String) -> ServerAuthConfig,
        config: AuthConfig,
    ) -> Self {
        Self::build_with_player(server_config, config, StaticPlayerContext::new(player())).await
    }

    pub async fn build_with_player(
        server_config: impl FnOnce(String) -> ServerAuthConfig,
        config: AuthConfig,
        player_context: StaticPlayerContext,
    ) -> Self {
        let server = MockAuthServer::start().await;
        let store = Arc::new(InMemoryServerConfigStore::new(server_config(server.ws_uri())));
        let events = EventBus::new();
        let receiver = events.subscribe();
        let clock = ManualClock::new(Utc::now());

        let http = build_http_client(StdDuration::from_secs(10)).unwrap();
        let client = TokenAcquisitionClient::new(http, Arc::new(Sha256Hasher), Arc::new(FixedMachine));
        let resolver = IdentityResolver::new(Arc::new(player_context), store.clone());
        let coordinator = TokenLifecycleCoordinator::new(
            resolver,
            client,
            store.clone(),
            events.clone(),
            config,
        )
        .with_clock(clock.as_clock());

        Self {
            server,
            store,
            events,
            receiver,
            clock,
            coordinator: Arc::new(coordinator),
        }
    }

    /// Drain every event published so far.
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}
