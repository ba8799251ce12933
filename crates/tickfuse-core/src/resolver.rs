//! Priority-ordered source resolution.
//!
//! [`SourceResolver`] walks the [`PriorityTable`] chain for an endpoint, retries
//! each source through the [`RetryExecutor`], and accepts the first record that
//! matches the requested code and carries at least one measurement. When every
//! source fails, the result is a degraded record with the per-source failures
//! attached; resolution itself never returns an error.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapters::{EastmoneyAdapter, SinaAdapter, YahooAdapter};
use crate::config::ResolverConfig;
use crate::data_source::{
    BreadthRecord, DataSource, Endpoint, IndexRecord, QuoteRecord, SectorRecord, SourceError,
    SourceFuture, SourceRecord,
};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::normalize;
use crate::overview::ExternalSnapshot;
use crate::provider_policy::ProviderPolicy;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::throttling::Throttle;
use crate::{
    ConfigError, IndexKey, IndexSnapshot, InstrumentCode, InstrumentQuote, MarketStatistics,
    ProviderId, Provenance, SectorRankings,
};

/// Source order per endpoint: a default chain plus optional overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
    default: Vec<ProviderId>,
    overrides: BTreeMap<Endpoint, Vec<ProviderId>>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new(ProviderId::ALL.to_vec())
    }
}

impl PriorityTable {
    pub fn new(default: Vec<ProviderId>) -> Self {
        Self {
            default: dedupe_chain(&default),
            overrides: BTreeMap::new(),
        }
    }

    pub fn with_override(mut self, endpoint: Endpoint, order: Vec<ProviderId>) -> Self {
        self.overrides.insert(endpoint, dedupe_chain(&order));
        self
    }

    pub fn chain(&self, endpoint: Endpoint) -> &[ProviderId] {
        self.overrides
            .get(&endpoint)
            .unwrap_or(&self.default)
            .as_slice()
    }
}

/// One source that did not produce an accepted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub provider: ProviderId,
    pub error: SourceError,
    /// Adapter calls made; zero when the source was skipped.
    pub attempts: u32,
}

/// Outcome of one resolution. Always carries a record; when every source
/// failed the record is the degraded form and `provenance` is
/// [`Provenance::Unresolved`].
#[derive(Debug, Clone)]
pub struct Resolution<T> {
    pub record: T,
    pub provenance: Provenance,
    pub source_chain: Vec<ProviderId>,
    pub failures: Vec<SourceFailure>,
    pub latency_ms: u64,
}

impl<T> Resolution<T> {
    pub fn is_degraded(&self) -> bool {
        self.provenance == Provenance::Unresolved
    }

    /// True when a lower-priority source won after earlier ones failed.
    pub fn used_fallback(&self) -> bool {
        self.provenance.provider().is_some() && !self.failures.is_empty()
    }
}

struct ChainOutcome<T> {
    record: Option<SourceRecord<T>>,
    source_chain: Vec<ProviderId>,
    failures: Vec<SourceFailure>,
    started: Instant,
}

impl<T> ChainOutcome<T> {
    fn finish<R>(
        self,
        label: &str,
        normalize: impl FnOnce(SourceRecord<T>) -> R,
        degraded: impl FnOnce() -> R,
    ) -> Resolution<R> {
        let (record, provenance) = match self.record {
            Some(record) => {
                let provenance = Provenance::Provider(record.provider);
                (normalize(record), provenance)
            }
            None => {
                warn!(
                    label,
                    sources = self.source_chain.len(),
                    "all sources exhausted, returning degraded record"
                );
                (degraded(), Provenance::Unresolved)
            }
        };

        Resolution {
            record,
            provenance,
            source_chain: self.source_chain,
            failures: self.failures,
            latency_ms: elapsed_ms(self.started),
        }
    }
}

/// Walks the priority chain for each endpoint, running every adapter call
/// through the retry executor and accepting the first valid record.
pub struct SourceResolver {
    adapters: HashMap<ProviderId, Arc<dyn DataSource>>,
    priority: PriorityTable,
    retry: RetryExecutor,
}

impl SourceResolver {
    pub fn new(
        adapters: Vec<Arc<dyn DataSource>>,
        priority: PriorityTable,
        retry: RetryConfig,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.id(), adapter))
            .collect();
        Self {
            adapters,
            priority,
            retry: RetryExecutor::new(retry),
        }
    }

    pub fn priority(&self) -> &PriorityTable {
        &self.priority
    }

    pub fn retry_config(&self) -> &RetryConfig {
        self.retry.config()
    }

    pub fn registered_sources(&self) -> Vec<ProviderId> {
        let mut providers = self.adapters.keys().copied().collect::<Vec<_>>();
        providers.sort();
        providers
    }

    /// Resolves one index. A caller-supplied snapshot wins without any
    /// adapter call.
    pub async fn resolve_index(
        &self,
        key: &IndexKey,
        external: Option<&ExternalSnapshot>,
    ) -> Resolution<IndexSnapshot> {
        if let Some(external) = external {
            debug!(code = %key.code, "using external snapshot");
            return Resolution {
                record: normalize::index_snapshot_from_external(key, external),
                provenance: Provenance::External,
                source_chain: Vec::new(),
                failures: Vec::new(),
                latency_ms: 0,
            };
        }

        let label = format!("index {}", key.code);
        let code = &key.code;
        self.run_chain(
            Endpoint::IndexSnapshot,
            &label,
            |source| source.index_snapshot(code),
            |record: &IndexRecord| {
                check_identity(code, &record.code)?;
                require_measurements(record.has_measurements(), &label)
            },
        )
        .await
        .finish(
            &label,
            |record| normalize::index_snapshot_from_record(key, record),
            || IndexSnapshot::degraded(key),
        )
    }

    pub async fn resolve_quote(&self, code: &InstrumentCode) -> Resolution<InstrumentQuote> {
        let label = format!("quote {code}");
        self.run_chain(
            Endpoint::InstrumentQuote,
            &label,
            |source| source.quote(code),
            |record: &QuoteRecord| {
                check_identity(code, &record.code)?;
                require_measurements(record.has_measurements(), &label)
            },
        )
        .await
        .finish(&label, normalize::quote_from_record, || {
            InstrumentQuote::degraded(code.clone())
        })
    }

    pub async fn resolve_breadth(&self) -> Resolution<MarketStatistics> {
        let label = "market breadth";
        self.run_chain(
            Endpoint::MarketBreadth,
            label,
            |source| source.market_breadth(),
            |record: &BreadthRecord| require_measurements(record.has_measurements(), label),
        )
        .await
        .finish(
            label,
            normalize::statistics_from_breadth,
            MarketStatistics::degraded,
        )
    }

    /// Resolves industry boards and keeps the `limit` best and worst.
    pub async fn resolve_sectors(&self, limit: usize) -> Resolution<SectorRankings> {
        let label = "sector rankings";
        self.run_chain(
            Endpoint::SectorRanking,
            label,
            |source| source.sector_rankings(),
            |records: &Vec<SectorRecord>| require_measurements(!records.is_empty(), label),
        )
        .await
        .finish(
            label,
            |record| normalize::rankings_from_sectors(record, limit),
            SectorRankings::degraded,
        )
    }

    async fn run_chain<'a, T, F, V>(
        &'a self,
        endpoint: Endpoint,
        label: &str,
        mut invoke: F,
        validate: V,
    ) -> ChainOutcome<T>
    where
        F: FnMut(&'a dyn DataSource) -> SourceFuture<'a, T>,
        V: Fn(&T) -> Result<(), SourceError>,
    {
        let started = Instant::now();
        let planned_chain = self.priority.chain(endpoint);
        let mut source_chain = Vec::with_capacity(planned_chain.len());
        let mut failures = Vec::new();

        for &provider in planned_chain {
            source_chain.push(provider);
            let Some(adapter) = self.adapters.get(&provider) else {
                debug!(label, provider = provider.as_str(), "source not registered, skipping");
                failures.push(SourceFailure {
                    provider,
                    error: SourceError::adapter_not_registered(provider),
                    attempts: 0,
                });
                continue;
            };

            if !adapter.capabilities().supports(endpoint) {
                debug!(label, provider = provider.as_str(), "endpoint unsupported, skipping");
                failures.push(SourceFailure {
                    provider,
                    error: SourceError::unsupported_endpoint(endpoint),
                    attempts: 0,
                });
                continue;
            }

            let adapter: &'a dyn DataSource = adapter.as_ref();
            let attempt_label = format!("{label} via {provider}");
            let mut calls = 0_u32;
            let result = self
                .retry
                .execute(&attempt_label, || {
                    calls += 1;
                    invoke(adapter)
                })
                .await;

            let failure = match result {
                Ok(data) => match validate(&data) {
                    Ok(()) => {
                        if failures.is_empty() {
                            info!(label, provider = provider.as_str(), "source accepted");
                        } else {
                            info!(
                                label,
                                provider = provider.as_str(),
                                failed_sources = failures.len(),
                                "fallback source accepted"
                            );
                        }
                        return ChainOutcome {
                            record: Some(SourceRecord::new(provider, data)),
                            source_chain,
                            failures,
                            started,
                        };
                    }
                    Err(error) => SourceFailure {
                        provider,
                        error,
                        attempts: calls,
                    },
                },
                Err(exhausted) => SourceFailure {
                    provider,
                    attempts: exhausted.attempt_count(),
                    error: exhausted.last_error,
                },
            };

            warn!(
                label,
                provider = provider.as_str(),
                attempts = failure.attempts,
                error = %failure.error,
                "source failed, trying next"
            );
            failures.push(failure);
        }

        ChainOutcome {
            record: None,
            source_chain,
            failures,
            started,
        }
    }
}

/// Builds a [`SourceResolver`] with the default adapters wired from a
/// [`ResolverConfig`].
///
/// All default adapters share one HTTP client. Custom sources registered
/// through [`with_adapter`](Self::with_adapter) replace the default adapter
/// with the same id.
///
/// ```rust,no_run
/// use tickfuse_core::{ResolverConfig, SourceResolverBuilder};
///
/// let mut config = ResolverConfig::default();
/// config.apply_env_overrides()?;
/// let resolver = SourceResolverBuilder::new(config).build()?;
/// # Ok::<(), tickfuse_core::ConfigError>(())
/// ```
pub struct SourceResolverBuilder {
    config: ResolverConfig,
    http_client: Option<Arc<dyn HttpClient>>,
    custom: Vec<Arc<dyn DataSource>>,
}

impl SourceResolverBuilder {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            http_client: None,
            custom: Vec::new(),
        }
    }

    /// Replaces the shared reqwest client used by default adapters.
    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn DataSource>) -> Self {
        self.custom.push(adapter);
        self
    }

    pub fn build(self) -> Result<SourceResolver, ConfigError> {
        self.config.validate()?;

        let http_client = self
            .http_client
            .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
        let timeout = self.config.call_timeout();

        let mut adapters: HashMap<ProviderId, Arc<dyn DataSource>> = HashMap::new();
        for provider in ProviderId::ALL {
            let mut policy = ProviderPolicy::default_for(provider);
            if let Some(delay) = self.config.pre_call_delay(provider) {
                policy = policy.with_pre_call_delay(delay);
            }
            let throttle = Throttle::from_policy(&policy);
            let http_client = Arc::clone(&http_client);

            let adapter: Arc<dyn DataSource> = match provider {
                ProviderId::Eastmoney => Arc::new(
                    EastmoneyAdapter::new(http_client)
                        .with_throttle(throttle)
                        .with_timeout(timeout),
                ),
                ProviderId::Sina => Arc::new(
                    SinaAdapter::new(http_client)
                        .with_throttle(throttle)
                        .with_timeout(timeout),
                ),
                ProviderId::Yahoo => Arc::new(
                    YahooAdapter::new(http_client)
                        .with_throttle(throttle)
                        .with_timeout(timeout),
                ),
            };
            adapters.insert(provider, adapter);
        }

        for adapter in self.custom {
            adapters.insert(adapter.id(), adapter);
        }

        Ok(SourceResolver {
            adapters,
            priority: self.config.priority_table(),
            retry: RetryExecutor::new(self.config.retry_config()),
        })
    }
}

fn check_identity(
    requested: &InstrumentCode,
    reported: &InstrumentCode,
) -> Result<(), SourceError> {
    if requested == reported {
        Ok(())
    } else {
        Err(SourceError::malformed(format!(
            "source reported {reported} for requested {requested}"
        )))
    }
}

fn require_measurements(present: bool, label: &str) -> Result<(), SourceError> {
    if present {
        Ok(())
    } else {
        Err(SourceError::empty(format!("{label}: record has no values")))
    }
}

fn dedupe_chain(chain: &[ProviderId]) -> Vec<ProviderId> {
    let mut seen = HashSet::new();
    let mut output = Vec::with_capacity(chain.len());

    for provider in chain {
        if seen.insert(*provider) {
            output.push(*provider);
        }
    }

    output
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_dedupes_and_overrides() {
        let table = PriorityTable::new(vec![
            ProviderId::Sina,
            ProviderId::Eastmoney,
            ProviderId::Sina,
        ])
        .with_override(Endpoint::SectorRanking, vec![ProviderId::Eastmoney]);

        assert_eq!(
            table.chain(Endpoint::IndexSnapshot),
            &[ProviderId::Sina, ProviderId::Eastmoney]
        );
        assert_eq!(table.chain(Endpoint::SectorRanking), &[ProviderId::Eastmoney]);
    }

    #[test]
    fn identity_mismatch_is_malformed() {
        let requested = InstrumentCode::parse("sh000001").expect("valid");
        let reported = InstrumentCode::parse("sz000001").expect("valid");
        let error = check_identity(&requested, &reported).expect_err("codes differ");
        assert_eq!(error.kind(), crate::SourceErrorKind::MalformedPayload);
    }

    #[test]
    fn builder_registers_every_default_source() {
        let resolver = SourceResolverBuilder::new(ResolverConfig::default())
            .build()
            .expect("default config is valid");
        assert_eq!(resolver.registered_sources(), ProviderId::ALL.to_vec());
        assert_eq!(resolver.retry_config().max_attempts, 2);
    }

    #[test]
    fn builder_rejects_invalid_config() {
        let config = ResolverConfig {
            max_attempts: 0,
            ..ResolverConfig::default()
        };
        assert!(matches!(
            SourceResolverBuilder::new(config).build(),
            Err(ConfigError::Invalid { field: "max_attempts", .. })
        ));
    }
}
