use reqwest::Client;
use std::time::Duration;

/// Completions can take minutes to finish streaming.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Select the ring TLS backend for the process. Later calls are no-ops.
pub fn install_crypto_provider() {
    // Err only means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Pooled client shared by every provider call in the process.
pub fn build_provider_client() -> Client {
    build_provider_client_with_timeout(DEFAULT_REQUEST_TIMEOUT_SECS)
}

pub fn build_provider_client_with_timeout(timeout_secs: u64) -> Client {
    install_crypto_provider();
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!("falling back to default HTTP client: {error}");
            Client::new()
        })
}
