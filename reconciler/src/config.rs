use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("at least one memcached server must be configured")]
    NoCacheNodes,

    #[error("duplicate memcached server: {0}")]
    DuplicateCacheNode(String),

    #[error("loop_interval must be at least 1 second")]
    InvalidLoopInterval,

    #[error("{0} cannot be 0")]
    InvalidTimeout(&'static str),
}

fn default_cache_timeout_ms() -> u64 {
    2000
}

fn default_http_timeout_secs() -> u64 {
    30
}

/// Reconciler configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Cache nodes sharing the incident namespace, as `host:port`.
    /// The first entry is the primary node for fetch and delete.
    pub memcached_servers: Vec<String>,
    /// Incident API. Links are posted to `<api_endpoint>/link`.
    pub api_endpoint: Url,
    /// Seconds to sleep between reconciliation passes
    pub loop_interval: u64,
    /// Disables TLS certificate verification towards the API
    #[serde(default)]
    pub insecure_skip_verify: bool,
    /// Injected into every payload sent to the API
    pub auth_token: String,
    /// Upper bound for a single operation against one cache node
    #[serde(default = "default_cache_timeout_ms")]
    pub cache_timeout_ms: u64,
    /// Upper bound for a single API request
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.memcached_servers.is_empty() {
            return Err(ValidationError::NoCacheNodes);
        }

        let mut seen = HashSet::new();
        for server in &self.memcached_servers {
            if !seen.insert(server) {
                return Err(ValidationError::DuplicateCacheNode(server.clone()));
            }
        }

        if self.loop_interval == 0 {
            return Err(ValidationError::InvalidLoopInterval);
        }
        if self.cache_timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout("cache_timeout_ms"));
        }
        if self.http_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("http_timeout_secs"));
        }

        Ok(())
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_secs(self.loop_interval)
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
