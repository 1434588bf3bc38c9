//! Host-supplied context: player identity, machine identity and hashing.

use sha2::{Digest, Sha256};
use sysinfo::System;

use super::types::PlayerContext;

/// Supplies the hashed identity of the logged-in character.
///
/// Returns `None` while the game client is not ready (login screen, zone transitions).
pub trait PlayerContextProvider: Send + Sync {
    fn current(&self) -> Option<PlayerContext>;
}

/// Supplies a stable description of the local machine.
pub trait MachineIdentityProvider: Send + Sync {
    fn machine_id(&self) -> String;
}

/// Deterministic one-way hash, hex encoded.
pub trait Hasher: Send + Sync {
    fn hash(&self, input: &str) -> String;
}

/// SHA-256, uppercase hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        hex::encode_upper(hasher.finalize())
    }
}

/// Machine identity built from host and OS information.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMachineIdentity;

impl MachineIdentityProvider for SystemMachineIdentity {
    fn machine_id(&self) -> String {
        [
            System::host_name(),
            System::name(),
            System::os_version(),
            System::kernel_version(),
        ]
        .into_iter()
        .map(|part| part.unwrap_or_default())
        .collect::<Vec<_>>()
        .join("|")
    }
}

/// Player context fixed at construction (CLI usage, tests).
#[derive(Debug, Clone)]
pub struct StaticPlayerContext {
    context: Option<PlayerContext>,
}

impl StaticPlayerContext {
    pub fn new(context: PlayerContext) -> Self {
        Self {
            context: Some(context),
        }
    }

    /// Hash a character name and home world into a player context.
    pub fn from_character(hasher: &dyn Hasher, name: &str, world_id: u16) -> Self {
        Self::new(PlayerContext {
            character_hash: hasher.hash(&format!("{name}{world_id}")),
            name_world_hash: hasher.hash(&format!("{name}@{world_id}")),
        })
    }

    /// A context that never resolves.
    pub fn unavailable() -> Self {
        Self { context: None }
    }
}

impl PlayerContextProvider for StaticPlayerContext {
    fn current(&self) -> Option<PlayerContext> {
        self.context.clone()
    }
}
