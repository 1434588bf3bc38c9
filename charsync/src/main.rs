use std::sync::Arc;

use charsync::config::{AuthConfig, ClientSettings};
use charsync::credentials::{
    CredentialError, IdentityResolver, InMemoryServerConfigStore, ServerConfigStore, Sha256Hasher,
    StaticPlayerContext, SystemMachineIdentity, TokenAcquisitionClient, TokenLifecycleCoordinator,
};
use charsync::events::{EventBus, log_events};
use charsync::{logging, utils::http_client};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = ClientSettings::from_env()?;
    let _log_guard = logging::init_logging(settings.log_dir.as_deref())?;
    let auth_config = AuthConfig::from_env();

    let hasher = Arc::new(Sha256Hasher);
    let store = Arc::new(InMemoryServerConfigStore::new(settings.server.clone()));
    let player = Arc::new(StaticPlayerContext::from_character(
        hasher.as_ref(),
        &settings.character_name,
        settings.world_id,
    ));
    let events = EventBus::new();

    let http = http_client::build_http_client(auth_config.request_timeout)?;
    let client = TokenAcquisitionClient::new(http, hasher, Arc::new(SystemMachineIdentity));
    let resolver = IdentityResolver::new(player, store.clone());
    let coordinator = Arc::new(TokenLifecycleCoordinator::new(
        resolver,
        client,
        store.clone(),
        events.clone(),
        auth_config,
    ));

    let event_log = events.subscribe();
    let shutdown = CancellationToken::new();
    let signals = coordinator.subscribe_signals();

    tokio::spawn(log_events(event_log, shutdown.clone()));

    if settings.server.use_oauth2 {
        let server = store.current_server().unwrap_or(settings.server.clone());
        if !coordinator.try_update_oauth2_refresh_token(&server, false).await {
            error!("OAuth2 login is no longer valid, please log in again");
        }
    }

    match coordinator.require_token(&shutdown).await {
        Ok(_) => info!("Authenticated with sync server"),
        Err(CredentialError::IdentityUnavailable) => warn!("No identity available yet"),
        Err(e) => error!(error = %e, "Initial authentication failed"),
    }

    let renewal = coordinator.spawn_renewal_task(shutdown.clone());
    info!("charsync running, press Ctrl-C to exit");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    shutdown.cancel();
    signals.unsubscribe().await;
    if let Err(e) = renewal.await {
        warn!(error = %e, "Renewal task failed");
    }

    Ok(())
}
