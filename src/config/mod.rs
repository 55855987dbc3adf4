use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::proxy::cache::CacheConfig;
use crate::proxy::config::{ProxyConfig, UpstreamConfig};
use crate::proxy::rate_limit::RateLimitConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub limits: LimitsSection,
    pub cache: CacheSection,
    pub upstream: UpstreamSection,
    /// `production` hides internal error details from clients.
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub allow_lan_access: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub per_ip_per_minute: u32,
    pub per_cnpj_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub max_entries: usize,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub base_url: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8045,
            allow_lan_access: true,
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            per_ip_per_minute: 10,
            per_cnpj_per_minute: 3,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            ttl_secs: 60 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            base_url: crate::constants::DEFAULT_REGISTRY_URL.to_string(),
            timeout_secs: 10,
            retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self, vars: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn parse<T: std::str::FromStr>(name: &str, value: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {:?}", name, value))
        }

        if let Some(v) = vars("CNPJ_PROXY_PORT") {
            self.server.port = parse("CNPJ_PROXY_PORT", v)?;
        }
        if let Some(v) = vars("CNPJ_PROXY_ALLOW_LAN") {
            self.server.allow_lan_access = parse("CNPJ_PROXY_ALLOW_LAN", v)?;
        }
        if let Some(v) = vars("RATE_LIMIT_PER_IP") {
            self.limits.per_ip_per_minute = parse("RATE_LIMIT_PER_IP", v)?;
        }
        if let Some(v) = vars("RATE_LIMIT_PER_CNPJ") {
            self.limits.per_cnpj_per_minute = parse("RATE_LIMIT_PER_CNPJ", v)?;
        }
        if let Some(v) = vars("CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse("CACHE_MAX_ENTRIES", v)?;
        }
        if let Some(v) = vars("CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse("CACHE_TTL_SECS", v)?;
        }
        if let Some(v) = vars("CACHE_SWEEP_SECS") {
            self.cache.sweep_interval_secs = parse("CACHE_SWEEP_SECS", v)?;
        }
        if let Some(v) = vars("UPSTREAM_BASE_URL") {
            self.upstream.base_url = v;
        }
        if let Some(v) = vars("UPSTREAM_TIMEOUT_SECS") {
            self.upstream.timeout_secs = parse("UPSTREAM_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = vars("UPSTREAM_RETRIES") {
            self.upstream.retries = parse("UPSTREAM_RETRIES", v)?;
        }
        if let Some(v) = vars("UPSTREAM_RETRY_DELAY_MS") {
            self.upstream.retry_delay_ms = parse("UPSTREAM_RETRY_DELAY_MS", v)?;
        }
        if let Some(v) = vars("APP_ENV") {
            self.environment = v;
        }

        Ok(())
    }

    pub fn to_proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            port: self.server.port,
            allow_lan_access: self.server.allow_lan_access,
            rate_limit: RateLimitConfig {
                per_client: self.limits.per_ip_per_minute,
                per_identifier: self.limits.per_cnpj_per_minute,
                ..RateLimitConfig::default()
            },
            cache: CacheConfig {
                max_entries: self.cache.max_entries,
                ttl: Duration::from_secs(self.cache.ttl_secs),
            },
            upstream: UpstreamConfig {
                base_url: self.upstream.base_url.clone(),
                timeout: Duration::from_secs(self.upstream.timeout_secs),
                retries: self.upstream.retries,
                retry_delay: Duration::from_millis(self.upstream.retry_delay_ms),
            },
            sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs.max(1)),
            detailed_errors: !self.is_production(),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    let config_dir = home.join(".cnpj-proxy");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    }

    Ok(config_dir)
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Read the config file (writing defaults on first run), then apply `.env`
/// and process environment overrides.
pub fn load_config() -> Result<Config> {
    let config_path = get_config_path()?;

    let mut config = if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?
    } else {
        let config = Config::default();
        save_config(&config)?;
        config
    };

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!("Loaded environment from {}", path.display());
    }
    config.apply_env(|name| std::env::var(name).ok())?;

    Ok(config)
}

pub fn save_config(config: &Config) -> Result<()> {
    let config_path = get_config_path()?;
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(())
}
