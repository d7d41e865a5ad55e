//! Connection settings for the upstream registry.

use std::time::Duration;

use api_client::{BasicAuth, Secret};
use serde::Deserialize;
use url::Url;

use crate::error::RegistryError;

/// Registry used when `REGISTRY_URL` is unset or empty.
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:5000";

/// Number of entries requested per listing page when the caller does not say.
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Connection parameters for a registry.
///
/// Resolved once (usually from the environment) and then treated as immutable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the registry, possibly with a mount path.
    pub url: String,

    /// Username for Basic authentication.
    pub username: Option<String>,

    /// Password for Basic authentication.
    pub password: Option<Secret>,

    /// Per-request timeout.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY_URL)
    }
}

impl RegistryConfig {
    /// Anonymous access to the registry at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: None,
        }
    }

    /// Read `REGISTRY_URL`, `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`, treating empty values as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        Self {
            url: var("REGISTRY_URL").unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_owned()),
            username: var("REGISTRY_USERNAME"),
            password: var("REGISTRY_PASSWORD").map(Secret::from),
            timeout: None,
        }
    }

    /// Authenticate with a username and password.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Fail requests which take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Basic credentials, only when both a username and a password are set.
    pub fn credentials(&self) -> Option<BasicAuth> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BasicAuth::new(username.clone(), password.clone()))
            }
            _ => None,
        }
    }

    /// Parse the configured URL.
    pub fn base_url(&self) -> Result<Url, RegistryError> {
        api_client::uri::parse_base(&self.url).map_err(|source| RegistryError::Configuration {
            url: self.url.clone(),
            source,
        })
    }

    /// A short label for the registry: `host[:port]`, the origin when there is
    /// no host, or the raw URL when it does not parse.
    pub fn endpoint_label(&self) -> String {
        let Ok(url) = Url::parse(&self.url) else {
            return self.url.clone();
        };

        match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => url.origin().ascii_serialization(),
        }
    }
}
