use std::{sync::OnceLock, time::Duration};

use tracing::debug;

use crate::credentials::CredentialError;

/// User agent sent with every auth request.
pub const USER_AGENT: &str = concat!("charsync/", env!("CARGO_PKG_VERSION"));

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the `reqwest::Client` used for the auth endpoints.
///
/// A zero `request_timeout` disables the timeout.
pub fn build_http_client(request_timeout: Duration) -> Result<reqwest::Client, CredentialError> {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder
        .build()
        .map_err(|e| CredentialError::Configuration(format!("failed to build HTTP client: {e}")))
}
