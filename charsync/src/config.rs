//! Runtime configuration.
//!
//! Everything is read from environment variables (a `.env` file is honoured by the binary),
//! falling back to defaults that match the sync server's token contract.

use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::warn;

use crate::credentials::ServerAuthConfig;
use crate::{Error, Result};

/// Token lifecycle tuning.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Renew cached tokens once they have less than this left (default: 5 minutes).
    pub renewal_margin: Duration,
    /// Subtracted from a fresh token's expiry before the clock check (default: 6 hours).
    ///
    /// Matches the lifetime the auth server stamps on issued tokens.
    pub clock_skew_offset: Duration,
    /// Allowed distance between the adjusted expiry and local time (default: 10 minutes).
    pub clock_skew_tolerance: Duration,
    /// OAuth2 refresh tokens are renewed once they have less than this left (default: 7 days).
    pub oauth_refresh_window: Duration,
    /// HTTP request timeout (default: 30 seconds).
    pub request_timeout: StdDuration,
    /// Interval of the background renewal task (default: 30 seconds).
    pub renewal_interval: StdDuration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            renewal_margin: Duration::minutes(5),
            clock_skew_offset: Duration::hours(6),
            clock_skew_tolerance: Duration::minutes(10),
            oauth_refresh_window: Duration::days(7),
            request_timeout: StdDuration::from_secs(30),
            renewal_interval: StdDuration::from_secs(30),
        }
    }
}

impl AuthConfig {
    /// Create AuthConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CHARSYNC_RENEWAL_MARGIN_SECS` (default: 300)
    /// - `CHARSYNC_CLOCK_SKEW_OFFSET_SECS` (default: 21600)
    /// - `CHARSYNC_CLOCK_SKEW_TOLERANCE_SECS` (default: 600)
    /// - `CHARSYNC_OAUTH_REFRESH_WINDOW_SECS` (default: 604800)
    /// - `CHARSYNC_REQUEST_TIMEOUT_SECS` (default: 30)
    /// - `CHARSYNC_RENEWAL_INTERVAL_SECS` (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            renewal_margin: env_duration("CHARSYNC_RENEWAL_MARGIN_SECS", defaults.renewal_margin),
            clock_skew_offset: env_duration(
                "CHARSYNC_CLOCK_SKEW_OFFSET_SECS",
                defaults.clock_skew_offset,
            ),
            clock_skew_tolerance: env_duration(
                "CHARSYNC_CLOCK_SKEW_TOLERANCE_SECS",
                defaults.clock_skew_tolerance,
            ),
            oauth_refresh_window: env_duration(
                "CHARSYNC_OAUTH_REFRESH_WINDOW_SECS",
                defaults.oauth_refresh_window,
            ),
            request_timeout: env_secs("CHARSYNC_REQUEST_TIMEOUT_SECS")
                .map(|s| StdDuration::from_secs(s as u64))
                .unwrap_or(defaults.request_timeout),
            renewal_interval: env_secs("CHARSYNC_RENEWAL_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(|s| StdDuration::from_secs(s as u64))
                .unwrap_or(defaults.renewal_interval),
        }
    }
}

/// Upper bound for durations compared against wall-clock instants (ten years).
const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn env_duration(key: &str, default: Duration) -> Duration {
    parse_duration_secs(key, std::env::var(key).ok().as_deref(), default)
}

/// Parse a whole number of seconds, falling back to `default` on bad or out-of-range input.
fn parse_duration_secs(key: &str, raw: Option<&str>, default: Duration) -> Duration {
    let Some(raw) = raw else {
        return default;
    };

    let parsed = raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|secs| (0..=MAX_DURATION_SECS).contains(secs))
        .and_then(Duration::try_seconds);

    match parsed {
        Some(duration) => duration,
        None => {
            warn!(key, value = raw, "Invalid duration in environment, using default");
            default
        }
    }
}

fn env_secs(key: &str) -> Option<i64> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|s| *s >= 0)
}

/// Settings for the standalone client binary.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server: ServerAuthConfig,
    pub character_name: String,
    pub world_id: u16,
    pub log_dir: Option<String>,
}

impl ClientSettings {
    /// Load client settings from the environment.
    ///
    /// Environment variables:
    /// - `CHARSYNC_SERVER_URI` (required): realtime transport URI
    /// - `CHARSYNC_OAUTH_TOKEN` + `CHARSYNC_UID`: selects the OAuth2 flow
    /// - `CHARSYNC_SECRET_KEY`: shared secret flow (used when no OAuth2 token is set)
    /// - `CHARSYNC_CHARACTER_NAME` (required), `CHARSYNC_WORLD_ID` (required)
    /// - `CHARSYNC_LOG_DIR`: enables file logging
    pub fn from_env() -> Result<Self> {
        let server_uri = required("CHARSYNC_SERVER_URI")?;
        let oauth_token = optional("CHARSYNC_OAUTH_TOKEN");
        let secret_key = optional("CHARSYNC_SECRET_KEY");

        let server = match (oauth_token, secret_key) {
            (Some(token), secret) => {
                let uid = required("CHARSYNC_UID")?;
                let mut server = ServerAuthConfig::oauth2(server_uri, token, uid);
                server.secret_key = secret;
                server
            }
            (None, Some(secret)) => ServerAuthConfig::secret(server_uri, secret),
            (None, None) => {
                return Err(Error::config(
                    "either CHARSYNC_OAUTH_TOKEN or CHARSYNC_SECRET_KEY must be set",
                ));
            }
        };

        let world_id = required("CHARSYNC_WORLD_ID")?
            .parse::<u16>()
            .map_err(|e| Error::config(format!("CHARSYNC_WORLD_ID: {e}")))?;

        Ok(Self {
            server,
            character_name: required("CHARSYNC_CHARACTER_NAME")?,
            world_id,
            log_dir: optional("CHARSYNC_LOG_DIR"),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn required(key: &str) -> Result<String> {
    optional(key).ok_or_else(|| Error::config(format!("{key} is not set")))
}
