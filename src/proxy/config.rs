use std::time::Duration;

use super::cache::CacheConfig;
use super::rate_limit::RateLimitConfig;

/// Runtime settings for the lookup proxy, built from the persisted
/// [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    pub allow_lan_access: bool,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub upstream: UpstreamConfig,
    pub sweep_interval: Duration,
    pub detailed_errors: bool,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Extra attempts after a timeout or transport failure.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: crate::constants::DEFAULT_REGISTRY_URL.to_string(),
            timeout: Duration::from_secs(10),
            retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 8045,
            allow_lan_access: true,
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
            sweep_interval: Duration::from_secs(5 * 60),
            detailed_errors: false,
        }
    }
}

impl ProxyConfig {
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }
}
