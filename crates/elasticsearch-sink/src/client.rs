//! HTTP plumbing shared by the sink and the executor.

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use search_query::SearchExecutor;
use serde_json::Value;
use sync_core::RetryPolicy;
use tracing::{debug, info, warn};

use crate::config::ElasticsearchConfig;

/// A handle to one Elasticsearch cluster. Cheap to clone.
#[derive(Clone)]
pub struct ElasticsearchClient {
    http: Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl std::fmt::Debug for ElasticsearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchClient {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build Elasticsearch HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            credentials: config
                .user
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let builder = self.http.request(method, url);
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, password.as_ref()),
            None => builder,
        }
    }

    /// Send a request and return its status with the JSON body, or `Null`
    /// when the body is empty or not JSON.
    pub(crate) async fn send(&self, request: RequestBuilder) -> reqwest::Result<(u16, Value)> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        debug!("Elasticsearch answered {status}");
        Ok((status, body))
    }
}

/// Build a client and check that the cluster answers, retrying with backoff.
pub async fn connect_with_retries(
    config: &ElasticsearchConfig,
    policy: &RetryPolicy,
) -> Result<ElasticsearchClient> {
    let client = ElasticsearchClient::new(config)?;
    let attempts = policy.max_retries + 1;
    let mut attempt = 1;

    loop {
        match client.health().await {
            Ok(health) => {
                info!(
                    "Connected to Elasticsearch at {} (cluster status {})",
                    client.base_url(),
                    health.status
                );
                return Ok(client);
            }
            Err(e) if attempt < attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "Failed to reach Elasticsearch (attempt {attempt}/{attempts}): {e}. Retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Giving up on Elasticsearch at {} after {attempts} attempts",
                    client.base_url()
                )))
            }
        }
    }
}
