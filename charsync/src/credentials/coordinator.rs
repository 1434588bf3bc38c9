//! Token lifecycle coordinator.
//!
//! Public entry point of the credential core: resolves the identity, serves cached
//! tokens, drives acquisition and renewal, and turns fatal auth outcomes into
//! notifications, cache purges and forced disconnects.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, instrument, warn};

use crate::config::AuthConfig;
use crate::events::{ClientEvent, EventBus, Notification};

use super::cache::TokenCache;
use super::client::TokenAcquisitionClient;
use super::error::CredentialError;
use super::identity::IdentityResolver;
use super::store::ServerConfigStore;
use super::types::{Identity, ServerAuthConfig};
use super::validator::TokenValidator;

/// Source of the current time.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Orchestrates identity resolution, caching, acquisition and validation of bearer tokens.
pub struct TokenLifecycleCoordinator {
    resolver: IdentityResolver,
    cache: TokenCache,
    client: TokenAcquisitionClient,
    validator: TokenValidator,
    servers: Arc<dyn ServerConfigStore>,
    events: EventBus,
    config: AuthConfig,
    clock: Clock,
    /// Per-identity locks to prevent concurrent acquisitions
    acquire_locks: DashMap<Identity, Arc<Mutex<()>>>,
}

impl TokenLifecycleCoordinator {
    pub fn new(
        resolver: IdentityResolver,
        client: TokenAcquisitionClient,
        servers: Arc<dyn ServerConfigStore>,
        events: EventBus,
        config: AuthConfig,
    ) -> Self {
        Self {
            resolver,
            cache: TokenCache::new(),
            client,
            validator: TokenValidator::from_config(&config),
            servers,
            events,
            config,
            clock: Arc::new(Utc::now),
            acquire_locks: DashMap::new(),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Token cache (for inspection by the transport layer and tests).
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Identity resolver.
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    #[inline]
    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Return the cached token for the current identity without touching the network.
    ///
    /// # Returns
    /// * `Ok(Some(token))` - Cached token
    /// * `Ok(None)` - No identity could be resolved
    /// * `Err(NoTokenPresent)` - Identity resolved but nothing cached; call
    ///   [`get_or_update_token`](Self::get_or_update_token) first
    pub fn get_token(&self) -> Result<Option<String>, CredentialError> {
        let Some(identity) = self.resolver.resolve() else {
            return Ok(None);
        };

        self.cache
            .get(&identity)
            .map(Some)
            .ok_or(CredentialError::NoTokenPresent)
    }

    /// Return a usable token for the current identity, acquiring or renewing it when needed.
    ///
    /// A cached token with more than the renewal margin left is returned without any
    /// network call. Otherwise a renewal (when a token is cached) or a fresh login is
    /// performed, validated against the local clock and stored.
    ///
    /// # Returns
    /// * `Ok(Some(token))` - Usable token
    /// * `Ok(None)` - No identity could be resolved
    /// * `Err(...)` - Acquisition failed; fatal errors are already notified
    pub async fn get_or_update_token(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, CredentialError> {
        let Some(identity) = self.resolver.resolve() else {
            debug!("No identity available, skipping token update");
            return Ok(None);
        };

        if let Some(token) = self.usable_cached(&identity) {
            return Ok(Some(token));
        }

        // Acquire lock for this identity
        let lock = self.acquire_lock(&identity);
        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            guard = lock.lock() => guard,
        };

        // Double-check after acquiring lock (another task may have renewed)
        if let Some(token) = self.usable_cached(&identity) {
            return Ok(Some(token));
        }

        let current = self.cache.get(&identity);
        self.acquire_and_store(&identity, current.as_deref(), cancel)
            .await
            .map(Some)
    }

    /// Like [`get_or_update_token`](Self::get_or_update_token), for callers that cannot
    /// proceed without a token (connection setup).
    ///
    /// # Returns
    /// * `Err(IdentityUnavailable)` - No identity could be resolved; retry later
    pub async fn require_token(&self, cancel: &CancellationToken) -> Result<String, CredentialError> {
        self.get_or_update_token(cancel)
            .await?
            .ok_or(CredentialError::IdentityUnavailable)
    }

    /// Cached token for `identity` if it is not due for renewal.
    fn usable_cached(&self, identity: &Identity) -> Option<String> {
        let token = self.cache.get(identity)?;
        let now = self.now();

        match self.validator.parse(&token) {
            Ok(claims) if !claims.needs_renewal(now, self.config.renewal_margin) => Some(token),
            Ok(claims) => {
                debug!(
                    identity = %identity,
                    expires_at = ?claims.expiry(),
                    now = %now,
                    "Cached token requires renewal"
                );
                None
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Cached token is unreadable, renewing");
                None
            }
        }
    }

    #[instrument(skip(self, identity, current, cancel), fields(identity = %identity, renewal = current.is_some()))]
    async fn acquire_and_store(
        &self,
        identity: &Identity,
        current: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, CredentialError> {
        let is_renewal = current.is_some();

        let token = match self.client.acquire(identity, current, cancel).await {
            Ok(token) => token,
            Err(e) => {
                self.handle_acquire_failure(identity, is_renewal, &e);
                return Err(e);
            }
        };

        let claims = match self.validator.validate(&token, self.now()) {
            Ok(claims) => claims,
            Err(e) => {
                self.handle_validation_failure(identity, is_renewal, &e);
                return Err(e);
            }
        };

        self.cache.set(identity.clone(), token.clone());
        info!(expires_at = ?claims.expiry(), "Token stored");
        Ok(token)
    }

    fn handle_acquire_failure(&self, identity: &Identity, is_renewal: bool, error: &CredentialError) {
        let title = failure_title(is_renewal);
        match error {
            CredentialError::AuthRejected { .. } => {
                self.cache.remove(identity);
                error!(error = %error, "Token request unauthorized");
                let message = if is_renewal {
                    "Your authentication token could not be renewed. Try reconnecting manually."
                } else {
                    "Your authentication token could not be generated. Check your secret key or OAuth2 login."
                };
                let notification = Notification::error(title, message);
                self.events.publish(ClientEvent::Notification(notification));
                self.events.publish(ClientEvent::Disconnected);
            }
            CredentialError::ValidationRejected { message } => {
                self.cache.remove(identity);
                error!(error = %error, "Token request rejected");
                self.events
                    .publish(ClientEvent::Notification(Notification::error(title, message)));
            }
            CredentialError::InvalidToken(_) => {
                self.cache.remove(identity);
                warn!(error = %error, "Server returned an unusable token");
                self.publish_invalid_token(title);
            }
            CredentialError::Cancelled => debug!("Token request cancelled, cache untouched"),
            _ => warn!(error = %error, "Token request failed"),
        }
    }

    fn handle_validation_failure(&self, identity: &Identity, is_renewal: bool, error: &CredentialError) {
        self.cache.remove(identity);

        if let CredentialError::ClockSkew { adjusted, now } = error {
            error!(%adjusted, %now, "Issued token does not match local time");
            self.events.publish(ClientEvent::Notification(Notification::error(
                "Invalid system clock",
                "The clock of your computer is invalid. Set your system time and timezone to be synchronized automatically, then reconnect.",
            )));
        } else {
            warn!(error = %error, "Issued token could not be validated");
            self.publish_invalid_token(failure_title(is_renewal));
        }
    }

    fn publish_invalid_token(&self, title: &str) {
        self.events.publish(ClientEvent::Notification(Notification::error(
            title,
            "The server returned an invalid authentication token. Try reconnecting later.",
        )));
    }

    /// Maintain the long-lived OAuth2 refresh token of `server`.
    ///
    /// # Returns
    /// * `true` - Token is still fresh, or was renewed and persisted
    /// * `false` - No token, token already expired, or renewal failed (token cleared)
    #[instrument(skip(self, server), fields(server = %server.server_uri))]
    pub async fn try_update_oauth2_refresh_token(
        &self,
        server: &ServerAuthConfig,
        forced: bool,
    ) -> bool {
        let Some(oauth_token) = server.oauth_token.as_deref().filter(|t| !t.is_empty()) else {
            debug!("No OAuth2 token stored");
            return false;
        };

        if !forced {
            let claims = match self.validator.parse(oauth_token) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!(error = %e, "Stored OAuth2 token is unreadable");
                    return false;
                }
            };

            let now = self.now();
            match claims.expiry() {
                None => return true,
                Some(expiry) if expiry - self.config.oauth_refresh_window > now => {
                    debug!(%expiry, "OAuth2 token still fresh");
                    return true;
                }
                Some(expiry) if expiry < now => {
                    warn!(%expiry, "OAuth2 token expired, re-login required");
                    return false;
                }
                Some(_) => {}
            }
        }

        let cancel = CancellationToken::new();
        match self.client.renew_oauth_token(server, oauth_token, &cancel).await {
            Ok(renewed) => {
                if let Err(e) = self
                    .servers
                    .update_oauth_token(&server.server_uri, Some(renewed))
                    .await
                {
                    error!(error = %e, "Failed to persist renewed OAuth2 token");
                    return false;
                }
                info!("OAuth2 token renewed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Could not renew OAuth2 token, clearing it");
                if let Err(store_err) = self
                    .servers
                    .update_oauth_token(&server.server_uri, None)
                    .await
                {
                    warn!(error = %store_err, "Failed to clear OAuth2 token");
                }
                false
            }
        }
    }

    /// Drop every cached token and the last known identity.
    pub fn flush(&self) {
        self.cache.clear();
        self.acquire_locks.clear();
        self.resolver.forget();
        info!("Token cache flushed");
    }

    /// React to a host event. Login and logout flush the cache.
    pub fn handle_event(&self, event: &ClientEvent) {
        if event.is_session_change() {
            debug!(event = %event.description(), "Session changed");
            self.flush();
        }
    }

    /// Subscribe to login/logout signals.
    ///
    /// The listener runs until the returned subscription is dropped or unsubscribed.
    pub fn subscribe_signals(self: &Arc<Self>) -> SignalSubscription {
        let mut receiver = self.events.subscribe();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let coordinator: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    event = receiver.recv() => event,
                };

                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };

                match event {
                    Ok(event) => coordinator.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        // A login/logout may have been among the skipped events
                        warn!(skipped, "Signal listener lagged, flushing token cache");
                        coordinator.flush();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Signal listener stopped");
        });

        SignalSubscription {
            guard: cancel.drop_guard(),
            handle,
        }
    }

    /// Periodically refresh the current identity's token until `cancel` fires.
    pub fn spawn_renewal_task(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        let period = self.config.renewal_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Token renewal task shutting down");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };

                match coordinator.get_or_update_token(&cancel).await {
                    Ok(_) | Err(CredentialError::Cancelled) => {}
                    Err(e) if e.is_fatal() => debug!(error = %e, "Background renewal hit a fatal error"),
                    Err(e) => warn!(error = %e, "Background renewal failed, will retry"),
                }
            }
        })
    }

    fn acquire_lock(&self, identity: &Identity) -> Arc<Mutex<()>> {
        self.acquire_locks
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn failure_title(is_renewal: bool) -> &'static str {
    if is_renewal {
        "Error refreshing token"
    } else {
        "Error generating token"
    }
}

/// Handle to the login/logout listener; dropping it stops the listener.
pub struct SignalSubscription {
    guard: DropGuard,
    handle: JoinHandle<()>,
}

impl SignalSubscription {
    /// Stop listening and wait for the listener task to finish.
    pub async fn unsubscribe(self) {
        let Self { guard, handle } = self;
        drop(guard);
        if let Err(e) = handle.await {
            warn!(error = %e, "Signal listener task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
