//! Token claim parsing and clock-skew detection.
//!
//! Tokens are decoded without signature verification: the client never holds the signing
//! key, it only needs the expiry to schedule renewals and to sanity-check the local clock.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AuthConfig;

use super::error::CredentialError;

/// Maximum tolerated disagreement between `exp` and `expiration_date`.
const EXPIRY_CROSS_CHECK_TOLERANCE: Duration = Duration::minutes(1);

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    exp: Option<Value>,
    #[serde(default)]
    expiration_date: Option<Value>,
}

/// Expiry information extracted from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    /// Standard `exp` claim.
    pub expires_at: Option<DateTime<Utc>>,
    /// Application `expiration_date` claim, only cross-checked against `exp`.
    pub expiration_date: Option<DateTime<Utc>>,
}

impl TokenClaims {
    /// Authoritative expiry (`exp`).
    #[inline]
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Validity left at `now`. `None` for tokens without `exp`.
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry().map(|exp| exp - now)
    }

    /// Whether the token is within `margin` of expiring (or already expired).
    ///
    /// Tokens without `exp` are always due.
    pub fn needs_renewal(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.remaining(now).is_none_or(|left| left <= margin)
    }
}

/// Parses tokens and checks them against the local clock.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    skew_offset: Duration,
    skew_tolerance: Duration,
}

impl TokenValidator {
    /// Create a validator.
    ///
    /// # Arguments
    /// * `skew_offset` - Subtracted from the token expiry before comparing with local time
    /// * `skew_tolerance` - Allowed distance between the adjusted expiry and local time
    pub fn new(skew_offset: Duration, skew_tolerance: Duration) -> Self {
        Self {
            skew_offset,
            skew_tolerance,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.clock_skew_offset, config.clock_skew_tolerance)
    }

    /// Decode the expiry claims of a token.
    pub fn parse(&self, token: &str) -> Result<TokenClaims, CredentialError> {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<RawClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| CredentialError::InvalidToken(e.to_string()))?;

        let claims = TokenClaims {
            expires_at: data.claims.exp.as_ref().and_then(parse_timestamp),
            expiration_date: data.claims.expiration_date.as_ref().and_then(parse_timestamp),
        };

        if let (Some(exp), Some(secondary)) = (claims.expires_at, claims.expiration_date)
            && (exp - secondary).abs() > EXPIRY_CROSS_CHECK_TOLERANCE
        {
            warn!(
                exp = %exp,
                expiration_date = %secondary,
                "Token expiry claims disagree"
            );
        }

        Ok(claims)
    }

    /// Verify that the token's adjusted expiry lies within `[now - tolerance, now + tolerance]`.
    ///
    /// A failure means the local clock (or timezone) is wrong, not the token. Tokens
    /// without `exp` are rejected as invalid.
    pub fn check_clock_skew(
        &self,
        claims: &TokenClaims,
        now: DateTime<Utc>,
    ) -> Result<(), CredentialError> {
        let Some(expiry) = claims.expiry() else {
            debug!("Token carries no exp claim");
            return Err(CredentialError::InvalidToken(
                "token carries no exp claim".to_string(),
            ));
        };

        let adjusted = expiry - self.skew_offset;
        let lower = now - self.skew_tolerance;
        let upper = now + self.skew_tolerance;

        if adjusted < lower || adjusted > upper {
            return Err(CredentialError::ClockSkew { adjusted, now });
        }

        Ok(())
    }

    /// Parse a freshly issued token and run the clock check on it.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, CredentialError> {
        let claims = self.parse(token)?;
        self.check_clock_skew(&claims, now)?;
        Ok(claims)
    }
}

impl Default for TokenValidator {
    fn default() -> Self {
        Self::from_config(&AuthConfig::default())
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                return DateTime::from_timestamp(secs, 0);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}
