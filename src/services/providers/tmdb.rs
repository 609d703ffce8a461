/// TMDb API provider
///
/// Wraps every provider call in a bounded retry loop:
/// - 429 and 5xx responses, network failures and undecodable bodies are transient and are
///   retried with linear backoff (`backoff_base * attempt`) up to `max_attempts` in total.
/// - 404 is reported as [`FetchError::NotFound`] immediately.
/// - Any other 4xx is reported as [`FetchError::Unavailable`] immediately.
///
/// Each attempt carries its own request timeout, so the worst case for one call is bounded
/// by `max_attempts * timeout` plus the backoff waits.
use std::time::Duration;

use reqwest::{Client as HttpClient, StatusCode};
use serde_json::Value;

use crate::{
    config::Config,
    error::{AppResult, FetchError},
    models::{list_field, EntityKind},
    services::providers::CatalogProvider,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded linear retry schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Wait applied after `failed_attempt` (1-based) before the next attempt
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.backoff_base * failed_attempt
    }
}

/// How a provider status code is handled by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Success,
    Transient,
    NotFound,
    Rejected,
}

pub(crate) fn classify(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StatusClass::Transient
    } else if status == StatusCode::NOT_FOUND {
        StatusClass::NotFound
    } else {
        StatusClass::Rejected
    }
}

/// Result of one failed attempt
enum AttemptFailure {
    /// Worth retrying; carries a description for the logs
    Transient(String),
    /// Retrying cannot help
    Final(FetchError),
}

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    retry: RetryPolicy,
}

impl TmdbClient {
    pub fn new(
        api_key: String,
        api_url: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Client against the public TMDb API with the default timeout and retry policy
    pub fn with_defaults(api_key: String, api_url: String) -> AppResult<Self> {
        Self::new(api_key, api_url, DEFAULT_TIMEOUT, RetryPolicy::default())
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(
            config.tmdb_api_key.clone(),
            config.tmdb_api_url.clone(),
            config.request_timeout(),
            RetryPolicy {
                max_attempts: config.max_attempts,
                backoff_base: config.retry_backoff(),
            },
        )
    }

    /// GET `endpoint` with `params` plus the API key, retrying transient failures
    pub async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.api_url, endpoint);
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=self.retry.max_attempts {
            match self.attempt(&url, params).await {
                Ok(payload) => {
                    tracing::debug!(endpoint = %endpoint, attempt, "Provider request succeeded");
                    return Ok(payload);
                }
                Err(AttemptFailure::Final(error)) => {
                    tracing::warn!(endpoint = %endpoint, attempt, error = %error, "Provider request failed");
                    return Err(error);
                }
                Err(AttemptFailure::Transient(reason)) => {
                    if attempt < self.retry.max_attempts {
                        let wait = self.retry.delay_after(attempt);
                        tracing::warn!(
                            endpoint = %endpoint,
                            attempt,
                            reason = %reason,
                            wait_ms = wait.as_millis() as u64,
                            "Transient provider failure, retrying"
                        );
                        tokio::time::sleep(wait).await;
                    }
                    last_failure = reason;
                }
            }
        }

        tracing::error!(
            endpoint = %endpoint,
            attempts = self.retry.max_attempts,
            reason = %last_failure,
            "Provider request failed after all attempts"
        );

        Err(FetchError::Unavailable {
            endpoint: endpoint.to_string(),
            reason: format!(
                "gave up after {} attempts: {}",
                self.retry.max_attempts, last_failure
            ),
        })
    }

    async fn attempt(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, AttemptFailure> {
        let response = self
            .http_client
            .get(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transient(describe_network_error(&e)))?;

        let status = response.status();
        match classify(status) {
            StatusClass::Success => response.json::<Value>().await.map_err(|e| {
                AttemptFailure::Transient(format!("undecodable response body: {}", e))
            }),
            StatusClass::Transient => Err(AttemptFailure::Transient(format!("HTTP {}", status))),
            StatusClass::NotFound => Err(AttemptFailure::Final(FetchError::NotFound {
                endpoint: endpoint_of(url, &self.api_url),
            })),
            StatusClass::Rejected => {
                let body = response.text().await.unwrap_or_default();
                Err(AttemptFailure::Final(FetchError::Unavailable {
                    endpoint: endpoint_of(url, &self.api_url),
                    reason: format!("HTTP {}: {}", status, body),
                }))
            }
        }
    }

    async fn fetch_list(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        key: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let payload = self.fetch(endpoint, params).await?;
        Ok(list_field(&payload, key))
    }
}

fn describe_network_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timed out: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        format!("request failed: {}", error)
    }
}

fn endpoint_of(url: &str, api_url: &str) -> String {
    url.strip_prefix(api_url).unwrap_or(url).to_string()
}

#[async_trait::async_trait]
impl CatalogProvider for TmdbClient {
    async fn details(&self, kind: EntityKind, tmdb_id: i64) -> Result<Value, FetchError> {
        self.fetch(&format!("/{}/{}", kind, tmdb_id), &[]).await
    }

    async fn trending(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError> {
        self.fetch_list(&format!("/trending/{}/week", kind), &[], "results")
            .await
    }

    async fn top_rated(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError> {
        self.fetch_list(&format!("/{}/top_rated", kind), &[], "results")
            .await
    }

    async fn search(&self, kind: EntityKind, query: &str) -> Result<Vec<Value>, FetchError> {
        let results = self
            .fetch_list(&format!("/search/{}", kind), &[("query", query)], "results")
            .await?;

        tracing::info!(
            query = %query,
            kind = %kind,
            results = results.len(),
            provider = self.name(),
            "Title search completed"
        );

        Ok(results)
    }

    async fn recommendations(
        &self,
        kind: EntityKind,
        tmdb_id: i64,
    ) -> Result<Vec<Value>, FetchError> {
        self.fetch_list(
            &format!("/{}/{}/recommendations", kind, tmdb_id),
            &[],
            "results",
        )
        .await
    }

    async fn discover(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError> {
        self.fetch_list(&format!("/discover/{}", kind), &[], "results")
            .await
    }

    async fn genre_list(&self, kind: EntityKind) -> Result<Vec<Value>, FetchError> {
        self.fetch_list(&format!("/genre/{}/list", kind), &[], "genres")
            .await
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_success() {
        assert_eq!(classify(StatusCode::OK), StatusClass::Success);
    }

    #[test]
    fn test_classify_rate_limit_and_server_errors_are_transient() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), StatusClass::Transient);
        assert_eq!(classify(StatusCode::INTERNAL_SERVER_ERROR), StatusClass::Transient);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), StatusClass::Transient);
        assert_eq!(classify(StatusCode::SERVICE_UNAVAILABLE), StatusClass::Transient);
    }

    #[test]
    fn test_classify_client_errors() {
        assert_eq!(classify(StatusCode::NOT_FOUND), StatusClass::NotFound);
        assert_eq!(classify(StatusCode::UNAUTHORIZED), StatusClass::Rejected);
        assert_eq!(classify(StatusCode::BAD_REQUEST), StatusClass::Rejected);
    }

    #[test]
    fn test_retry_delays_are_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert!(policy.delay_after(2) >= policy.delay_after(1));
    }

    #[test]
    fn test_endpoint_of_strips_base_url() {
        assert_eq!(
            endpoint_of("https://api.themoviedb.org/3/movie/550", "https://api.themoviedb.org/3"),
            "/movie/550"
        );
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let client =
            TmdbClient::with_defaults("key".to_string(), "http://test.local/3/".to_string())
                .unwrap();
        assert_eq!(client.api_url, "http://test.local/3");
        assert_eq!(client.name(), "tmdb");
    }
}
