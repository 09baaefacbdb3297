//! Backend connection settings.

use std::time::Duration;

use tracing::warn;

/// Default backend root.
pub const DEFAULT_BASE_URL: &str = "https://comp2140.uqcloud.net/api";

/// Default timeout for requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding [`ApiConfig::base_url`].
pub const ENV_BASE_URL: &str = "SONGTRAX_API_URL";
/// Environment variable providing [`ApiConfig::api_key`].
pub const ENV_API_KEY: &str = "SONGTRAX_API_KEY";
/// Environment variable overriding [`ApiConfig::timeout`], in whole seconds.
pub const ENV_TIMEOUT_SECS: &str = "SONGTRAX_API_TIMEOUT_SECS";

/// Connection settings for [`crate::SongtraxClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Root URL every resource path is appended to.
    pub base_url: String,
    /// Key sent as the `api_key` query parameter, if any.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Defaults overridden by whatever `SONGTRAX_*` variables are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url;
        }
        config.api_key = lookup(ENV_API_KEY).filter(|v| !v.trim().is_empty());
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => warn!("Ignoring invalid {ENV_TIMEOUT_SECS}={raw:?}"),
            }
        }

        config
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
