//! Web search collaborators used to ground answers.

use crate::config::SearchConfig;
use crate::core::SearchResult;
use crate::error::{ChatError, Result};
use crate::providers::http_client::install_crypto_provider;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const SEARCH_TIMEOUT_SECS: u64 = 20;

pub trait SearchProvider: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>>> + Send + 'a>>;
}

/// Queries a SearXNG instance through its JSON API.
#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoint: url::Url,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
}

impl SearxngSearchProvider {
    pub fn new(endpoint: &str, max_results: usize) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint)
            .map_err(|error| ChatError::Configuration(format!("search endpoint {endpoint}: {error}")))?;
        install_crypto_provider();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
            .user_agent(concat!("relaychat/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            max_results,
        })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Self::new(&config.endpoint, config.max_results)
    }
}

impl SearchProvider for SearxngSearchProvider {
    fn search<'a>(
        &'a self,
        query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.endpoint.clone())
                .query(&[("q", query), ("format", "json")])
                .send()
                .await
                .map_err(|error| ChatError::Upstream(format!("search request: {error}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(ChatError::Upstream(format!("search returned HTTP {status}")));
            }

            let body: SearxngResponse = response
                .json()
                .await
                .map_err(|error| ChatError::Upstream(format!("search response: {error}")))?;

            Ok(body
                .results
                .into_iter()
                .filter(|result| !result.url.is_empty())
                .take(self.max_results)
                .map(|result| SearchResult {
                    title: result.title,
                    url: result.url,
                    snippet: result.content.unwrap_or_default(),
                })
                .collect())
        })
    }
}

/// Used when search is disabled; always returns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearchProvider;

impl SearchProvider for NoopSearchProvider {
    fn search<'a>(
        &'a self,
        _query: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchResult>>> + Send + 'a>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
