//! Songtrax backend client implementation.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use songtrax_core::{Error, HttpError, Result};
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;

/// Maximum number of attempts for a request.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_RETRY_DELAY_MS: u64 = 500;

/// Songtrax REST API client.
#[derive(Clone)]
pub struct SongtraxClient {
    /// HTTP client for making requests.
    http: reqwest::Client,
    /// Connection settings.
    config: ApiConfig,
}

impl SongtraxClient {
    /// Create a new client with default settings.
    pub fn new() -> Result<Self> {
        Self::with_config(ApiConfig::default())
    }

    /// Create a new client with specific settings.
    pub fn with_config(config: ApiConfig) -> Result<Self> {
        // Reject a bad base URL up front rather than on the first request.
        Url::parse(&config.base_url)
            .map_err(|e| Error::Http(HttpError::InvalidUrl(format!("{}: {e}", config.base_url))))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Connection settings in use.
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Build the URL for a resource path, e.g. `location` or `sample/12`.
    ///
    /// The backend expects a trailing slash before the query string.
    pub(crate) fn resource_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url> {
        let raw = format!(
            "{}/{}/",
            self.config.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        );
        let mut url =
            Url::parse(&raw).map_err(|e| Error::Http(HttpError::InvalidUrl(format!("{raw}: {e}"))))?;

        let pairs: Vec<(&str, &str)> = self
            .config
            .api_key
            .as_deref()
            .map(|key| ("api_key", key))
            .into_iter()
            .chain(query.iter().map(|(name, value)| (*name, value.as_str())))
            .collect();

        // An untouched query_pairs_mut() would still leave a bare `?` behind.
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }

        Ok(url)
    }

    /// GET a resource and decode the JSON body, retrying transient failures.
    pub(crate) async fn get<R>(&self, path: &str, query: &[(&str, String)]) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let url = self.resource_url(path, query)?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(BASE_RETRY_DELAY_MS * 2u64.pow(attempt - 1));
                tokio::time::sleep(delay).await;
                debug!("Retry attempt {attempt} for {path} after {delay:?}");
            }

            match self.do_request(&url).await {
                Ok(body) => {
                    return serde_json::from_slice(&body)
                        .map_err(|e| Error::Parse(format!("Failed to parse {path} response: {e}")));
                }
                Err(e) => {
                    warn!("Request to {path} failed (attempt {attempt}): {e}");

                    // Don't retry non-retryable errors
                    if !e.is_retryable() {
                        return Err(e);
                    }

                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Network("Request failed".to_string())))
    }

    async fn do_request(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Http(HttpError::Timeout)
            } else if e.is_connect() {
                Error::Http(HttpError::ConnectionFailed(e.to_string()))
            } else {
                Error::Network(e.to_string())
            }
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.path().to_string()));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Http(HttpError::StatusError {
                status: status.as_u16(),
                message,
            }));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Network(format!("Failed to read response body: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SongtraxClient::new().unwrap();
        assert_eq!(client.config().base_url, crate::config::DEFAULT_BASE_URL);
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = SongtraxClient::with_config(ApiConfig::default().with_base_url("not a url"));
        assert!(matches!(result, Err(Error::Http(HttpError::InvalidUrl(_)))));
    }

    #[test]
    fn test_resource_url_layout() {
        let client = SongtraxClient::with_config(
            ApiConfig::default()
                .with_base_url("https://example.com/api/")
                .with_api_key("k3y"),
        )
        .unwrap();

        let url = client
            .resource_url("sampletolocation", &[("location_id", "4".to_string())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/api/sampletolocation/?api_key=k3y&location_id=4"
        );

        let url = client.resource_url("/sample/12/", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/sample/12/?api_key=k3y");
    }

    #[test]
    fn test_resource_url_without_key() {
        let client = SongtraxClient::new().unwrap();
        let url = client.resource_url("location", &[]).unwrap();
        assert_eq!(url.path(), "/api/location/");
        assert!(!url.as_str().contains("api_key"));
    }
}
