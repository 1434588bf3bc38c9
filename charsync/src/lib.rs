//! charsync library crate.
//!
//! Credential lifecycle core of the character data synchronization client.

pub mod config;
pub mod credentials;
pub mod events;
pub mod logging;
pub mod utils;
pub mod error;

pub use error::{Error, Result};
