use std::sync::Arc;

use super::cache::{CacheStats, ResultCache};
use super::client::{HttpRegistryClient, RegistryClient, RegistryError};
use super::config::{ProxyConfig, UpstreamConfig};
use super::error::LookupError;
use super::mapper;
use super::models::{CompanyRecord, RawCompany};
use super::rate_limit::{Admission, RateLimitTracker, Subject};
use crate::clock::{Clock, SystemClock};
use crate::cnpj::{self, Cnpj};

#[derive(Debug, Clone)]
pub struct LookupOutcome {
    pub record: CompanyRecord,
    pub cached: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub cache_entries_removed: usize,
    pub rate_subjects_removed: usize,
}

pub struct LookupService {
    cache: ResultCache<CompanyRecord>,
    limiter: RateLimitTracker,
    registry: Arc<dyn RegistryClient>,
    upstream: UpstreamConfig,
    detailed_errors: bool,
}

impl LookupService {
    pub fn from_config(config: &ProxyConfig) -> anyhow::Result<Self> {
        let registry =
            HttpRegistryClient::new(config.upstream.base_url.clone(), config.upstream.timeout)?;
        Ok(Self::new(config, Arc::new(registry)))
    }

    pub fn new(config: &ProxyConfig, registry: Arc<dyn RegistryClient>) -> Self {
        Self::with_clock(config, registry, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &ProxyConfig,
        registry: Arc<dyn RegistryClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: ResultCache::with_clock(config.cache.clone(), clock.clone()),
            limiter: RateLimitTracker::with_clock(config.rate_limit.clone(), clock),
            registry,
            upstream: config.upstream.clone(),
            detailed_errors: config.detailed_errors,
        }
    }

    pub fn detailed_errors(&self) -> bool {
        self.detailed_errors
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn lookup(
        &self,
        client_addr: &str,
        raw: Option<&str>,
    ) -> Result<LookupOutcome, LookupError> {
        if let Admission::Denied { retry_after, .. } =
            self.limiter.admit(&[Subject::client(client_addr)])
        {
            tracing::warn!("Rate limit exceeded for client {}", client_addr);
            return Err(LookupError::RateLimited { retry_after });
        }

        let raw = raw
            .filter(|value| !value.trim().is_empty())
            .ok_or(LookupError::MissingCnpj)?;

        let cnpj = cnpj::validate(raw).map_err(|reason| {
            tracing::info!("Rejected CNPJ {:?}: {}", raw, reason.code());
            LookupError::from(reason)
        })?;

        self.resolve(&cnpj).await
    }

    /// Cache, then upstream. Skips client admission; the CLI uses this
    /// directly.
    pub async fn resolve(&self, cnpj: &Cnpj) -> Result<LookupOutcome, LookupError> {
        if let Some(record) = self.cache.get(cnpj.as_str()) {
            tracing::info!("Cache hit for {}", cnpj);
            return Ok(LookupOutcome {
                record,
                cached: true,
            });
        }

        // Upstream-bound requests are also limited per CNPJ.
        if let Admission::Denied { retry_after, .. } =
            self.limiter.admit(&[Subject::identifier(cnpj.as_str())])
        {
            tracing::warn!("Rate limit exceeded for CNPJ {}", cnpj);
            return Err(LookupError::RateLimited { retry_after });
        }

        tracing::info!("Cache miss for {}, querying registry", cnpj);
        // a failed upstream call also sweeps stale entries
        match self.fetch_record(cnpj).await {
            Ok(record) => {
                self.cache.set(cnpj.as_str(), record.clone());
                Ok(LookupOutcome {
                    record,
                    cached: false,
                })
            }
            Err(err) => {
                let swept = self.cache.sweep();
                tracing::error!("Lookup for {} failed: {:?} (swept {} stale entries)", cnpj, err, swept);
                Err(err)
            }
        }
    }

    async fn fetch_record(&self, cnpj: &Cnpj) -> Result<CompanyRecord, LookupError> {
        let raw = self.fetch_with_retry(cnpj).await?;
        let record = mapper::map_company(&raw);

        if record.tax_id.is_empty() {
            return Err(LookupError::internal("registry payload has no CNPJ"));
        }
        Ok(record)
    }

    async fn fetch_with_retry(&self, cnpj: &Cnpj) -> Result<RawCompany, RegistryError> {
        let max_attempts = self.upstream.retries.saturating_add(1);
        let mut attempt = 1;

        loop {
            match self.registry.fetch(cnpj).await {
                Ok(raw) => return Ok(raw),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    tracing::warn!(
                        "Registry attempt {}/{} for {} failed: {}, retrying",
                        attempt,
                        max_attempts,
                        cnpj,
                        err
                    );
                    attempt += 1;
                    tokio::time::sleep(self.upstream.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Reclaim expired cache entries and idle rate-limit subjects.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            cache_entries_removed: self.cache.sweep(),
            rate_subjects_removed: self.limiter.gc(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::proxy::cache::CacheConfig;
    use crate::proxy::mock::MockRegistry;
    use crate::proxy::rate_limit::RateLimitConfig;
    use serde_json::json;
    use std::time::Duration;

    const VALID: &str = "12345678000195";

    fn test_config() -> ProxyConfig {
        ProxyConfig {
            rate_limit: RateLimitConfig {
                per_client: 100,
                per_identifier: 100,
                ..RateLimitConfig::default()
            },
            cache: CacheConfig {
                max_entries: 10,
                ttl: Duration::from_secs(60),
            },
            upstream: UpstreamConfig {
                retries: 2,
                retry_delay: Duration::ZERO,
                ..UpstreamConfig::default()
            },
            ..ProxyConfig::default()
        }
    }

    fn service_with(config: ProxyConfig, registry: Arc<MockRegistry>) -> (LookupService, MockClock) {
        let clock = MockClock::new();
        let service = LookupService::with_clock(&config, registry, Arc::new(clock.clone()));
        (service, clock)
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let registry = Arc::new(MockRegistry::new());
        let (service, _) = service_with(test_config(), registry.clone());

        let first = service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.record.tax_id, VALID);

        let second = service.lookup("1.1.1.1", Some("12.345.678/0001-95")).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.record, first.record);
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test]
    async fn expired_entry_goes_back_upstream() {
        let registry = Arc::new(MockRegistry::new());
        let (service, clock) = service_with(test_config(), registry.clone());

        service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        clock.advance(Duration::from_secs(61));
        let outcome = service.lookup("1.1.1.1", Some(VALID)).await.unwrap();

        assert!(!outcome.cached);
        assert_eq!(registry.calls(), 2);
    }

    #[tokio::test]
    async fn rejects_before_touching_registry() {
        let registry = Arc::new(MockRegistry::new());
        let (service, _) = service_with(test_config(), registry.clone());

        assert!(matches!(
            service.lookup("1.1.1.1", None).await,
            Err(LookupError::MissingCnpj)
        ));
        assert!(matches!(
            service.lookup("1.1.1.1", Some("  ")).await,
            Err(LookupError::MissingCnpj)
        ));
        assert!(matches!(
            service.lookup("1.1.1.1", Some("12345678000194")).await,
            Err(LookupError::InvalidCnpj(cnpj::CnpjError::BadCheckDigit))
        ));
        assert_eq!(registry.calls(), 0);
    }

    #[tokio::test]
    async fn client_rate_limit_applies_before_validation() {
        let mut config = test_config();
        config.rate_limit.per_client = 2;
        let registry = Arc::new(MockRegistry::new());
        let (service, clock) = service_with(config, registry.clone());

        assert!(service.lookup("9.9.9.9", Some("123")).await.is_err());
        assert!(service.lookup("9.9.9.9", Some(VALID)).await.is_ok());
        assert!(matches!(
            service.lookup("9.9.9.9", Some(VALID)).await,
            Err(LookupError::RateLimited { .. })
        ));
        assert!(service.lookup("8.8.8.8", Some(VALID)).await.is_ok());

        clock.advance(Duration::from_secs(61));
        assert!(service.lookup("9.9.9.9", Some(VALID)).await.is_ok());
    }

    #[tokio::test]
    async fn identifier_limit_only_counts_upstream_lookups() {
        let mut config = test_config();
        config.rate_limit.per_identifier = 1;
        config.cache.max_entries = 0;
        let registry = Arc::new(MockRegistry::new());
        let (service, _) = service_with(config, registry.clone());

        assert!(service.lookup("1.1.1.1", Some(VALID)).await.is_ok());
        assert!(matches!(
            service.lookup("2.2.2.2", Some(VALID)).await,
            Err(LookupError::RateLimited { .. })
        ));
        assert!(service.lookup("2.2.2.2", Some("11222333000181")).await.is_ok());
        assert_eq!(registry.calls(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let registry = Arc::new(MockRegistry::with_script(vec![
            Err(RegistryError::Timeout(Duration::from_secs(10))),
            Err(RegistryError::Transport("connection reset".into())),
        ]));
        let (service, _) = service_with(test_config(), registry.clone());

        let outcome = service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        assert_eq!(outcome.record.tax_id, VALID);
        assert_eq!(registry.calls(), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let registry = Arc::new(MockRegistry::with_script(vec![
            Err(RegistryError::Timeout(Duration::from_secs(10))),
            Err(RegistryError::Timeout(Duration::from_secs(10))),
            Err(RegistryError::Timeout(Duration::from_secs(10))),
        ]));
        let (service, _) = service_with(test_config(), registry.clone());

        assert!(matches!(
            service.lookup("1.1.1.1", Some(VALID)).await,
            Err(LookupError::Timeout)
        ));
        assert_eq!(registry.calls(), 3);
    }

    #[tokio::test]
    async fn max_retry_setting_does_not_overflow() {
        let mut config = test_config();
        config.upstream.retries = u32::MAX;
        let registry = Arc::new(MockRegistry::with_script(vec![Err(
            RegistryError::Transport("connection reset".into()),
        )]));
        let (service, _) = service_with(config, registry.clone());

        let outcome = service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        assert_eq!(outcome.record.tax_id, VALID);
        assert_eq!(registry.calls(), 2);
    }

    #[tokio::test]
    async fn definitive_upstream_errors_are_not_retried() {
        let registry = Arc::new(MockRegistry::with_script(vec![Err(RegistryError::Upstream {
            status: 404,
        })]));
        let (service, _) = service_with(test_config(), registry.clone());

        assert!(matches!(
            service.lookup("1.1.1.1", Some(VALID)).await,
            Err(LookupError::NotFound)
        ));
        assert_eq!(registry.calls(), 1);
    }

    #[tokio::test]
    async fn record_without_tax_id_is_internal_and_not_cached() {
        let registry = Arc::new(MockRegistry::with_script(vec![Ok(json!({
            "razao_social": "SEM CNPJ",
            "estabelecimento": {}
        }))]));
        let (service, _) = service_with(test_config(), registry.clone());

        assert!(matches!(
            service.lookup("1.1.1.1", Some(VALID)).await,
            Err(LookupError::Internal { .. })
        ));
        assert_eq!(service.cache_len(), 0);

        let outcome = service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        assert!(!outcome.cached);
    }

    #[tokio::test]
    async fn failure_sweeps_stale_entries() {
        let registry = Arc::new(MockRegistry::with_script(vec![
            Ok(MockRegistry::company_payload(VALID)),
            Err(RegistryError::Upstream { status: 500 }),
        ]));
        let (service, clock) = service_with(test_config(), registry.clone());

        service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        assert_eq!(service.cache_len(), 1);

        clock.advance(Duration::from_secs(61));
        assert!(service.lookup("1.1.1.1", Some("11222333000181")).await.is_err());
        assert_eq!(service.cache_len(), 0);
    }

    #[tokio::test]
    async fn sweep_reports_both_tables() {
        let registry = Arc::new(MockRegistry::new());
        let (service, clock) = service_with(test_config(), registry);

        service.lookup("1.1.1.1", Some(VALID)).await.unwrap();
        clock.advance(Duration::from_secs(61));

        let report = service.sweep();
        assert_eq!(report.cache_entries_removed, 1);
        // client subject plus identifier subject
        assert_eq!(report.rate_subjects_removed, 2);
    }
}
