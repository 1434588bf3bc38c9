//! Credential lifecycle management.
//!
//! This module derives the client identity, acquires and renews bearer tokens
//! against the sync server, caches them per identity and detects local clock skew.
//!
//! # Architecture
//!
//! - [`IdentityResolver`]: Derives the cache key from player and server context
//! - [`TokenCache`]: Concurrent identity to token map
//! - [`TokenAcquisitionClient`]: HTTP exchanges for login, renewal and OAuth2 refresh
//! - [`TokenValidator`]: Claim parsing and clock-skew detection
//! - [`TokenLifecycleCoordinator`]: Orchestrates the flow and reacts to login/logout

mod cache;
mod client;
mod context;
mod coordinator;
mod error;
mod identity;
mod store;
mod types;
mod validator;

pub use cache::TokenCache;
pub use client::TokenAcquisitionClient;
pub use context::{
    Hasher, MachineIdentityProvider, PlayerContextProvider, Sha256Hasher, StaticPlayerContext,
    SystemMachineIdentity,
};
pub use coordinator::{Clock, SignalSubscription, TokenLifecycleCoordinator};
pub use error::CredentialError;
pub use identity::IdentityResolver;
pub use store::{InMemoryServerConfigStore, ServerConfigStore};
pub use types::{AuthCredential, Identity, PlayerContext, ServerAuthConfig};
pub use validator::{TokenClaims, TokenValidator};
