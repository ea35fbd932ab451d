//! Shared HTTP client construction for consistent timeout and TLS configuration.

use std::time::Duration;

use crate::error::LlmError;

/// Create an HTTP client with the standard quire configuration.
///
/// Config: 30s connect timeout, caller-supplied request timeout, rustls TLS,
/// `quire/{version}` user-agent, redirect limit 10.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(request_timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(request_timeout)
        .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(LlmError::Http)
}
