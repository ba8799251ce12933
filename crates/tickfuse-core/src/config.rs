//! Resolver configuration.
//!
//! [`ResolverConfig`] is a plain serde struct: every field has a default, so
//! an empty document is a valid configuration. Both `snake_case` keys and
//! the camelCase spellings (`priorityOrder`, `maxAttempts`,
//! `backoffCapSeconds`, `callTimeoutSeconds`, ...) are accepted.
//!
//! ```yaml
//! priority_order: [eastmoney, sina, yahoo]
//! endpoint_priority:
//!   index_snapshot: [sina, eastmoney, yahoo]
//! max_attempts: 2
//! backoff_cap_seconds: 5
//! call_timeout_seconds: 10
//! pre_call_delay_seconds:
//!   sina: 0.5
//! tracked_indices:
//!   - { code: sh000001, name: 上证指数 }
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TICKFUSE_PRIORITY_ORDER` | `priority_order` (comma-separated) |
//! | `TICKFUSE_MAX_ATTEMPTS` | `max_attempts` |
//! | `TICKFUSE_BACKOFF_CAP_SECONDS` | `backoff_cap_seconds` |
//! | `TICKFUSE_CALL_TIMEOUT_SECONDS` | `call_timeout_seconds` |

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::data_source::Endpoint;
use crate::resolver::PriorityTable;
use crate::retry::{Backoff, RetryConfig};
use crate::{ConfigError, IndexKey, ProviderId};

pub const ENV_PRIORITY_ORDER: &str = "TICKFUSE_PRIORITY_ORDER";
pub const ENV_MAX_ATTEMPTS: &str = "TICKFUSE_MAX_ATTEMPTS";
pub const ENV_BACKOFF_CAP_SECONDS: &str = "TICKFUSE_BACKOFF_CAP_SECONDS";
pub const ENV_CALL_TIMEOUT_SECONDS: &str = "TICKFUSE_CALL_TIMEOUT_SECONDS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Default source order for every endpoint.
    #[serde(alias = "priorityOrder")]
    pub priority_order: Vec<ProviderId>,
    /// Per-endpoint source order replacing `priority_order`. Defaults to
    /// sina first for index snapshots; a document that sets this map
    /// replaces the default entirely.
    #[serde(alias = "endpointPriority")]
    pub endpoint_priority: BTreeMap<Endpoint, Vec<ProviderId>>,
    /// Attempts per source, including the first.
    #[serde(alias = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(alias = "backoffCapSeconds")]
    pub backoff_cap_seconds: f64,
    #[serde(alias = "backoffJitter")]
    pub backoff_jitter: bool,
    #[serde(alias = "callTimeoutSeconds")]
    pub call_timeout_seconds: f64,
    /// Overrides of each provider's politeness delay.
    #[serde(alias = "preCallDelaySeconds")]
    pub pre_call_delay_seconds: BTreeMap<ProviderId, f64>,
    #[serde(alias = "marketUtcOffsetHours")]
    pub market_utc_offset_hours: i8,
    #[serde(alias = "sectorRankingLimit")]
    pub sector_ranking_limit: usize,
    #[serde(alias = "trackedIndices")]
    pub tracked_indices: Vec<IndexKey>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            priority_order: ProviderId::ALL.to_vec(),
            endpoint_priority: default_endpoint_priority(),
            max_attempts: 2,
            backoff_cap_seconds: 5.0,
            backoff_jitter: false,
            call_timeout_seconds: 10.0,
            pre_call_delay_seconds: BTreeMap::new(),
            market_utc_offset_hours: 8,
            sector_ranking_limit: 5,
            tracked_indices: IndexKey::main_indices(),
        }
    }
}

impl ResolverConfig {
    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.json` files as JSON and anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_yaml_str(&contents)
        }
    }

    /// Applies `TICKFUSE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_PRIORITY_ORDER) {
            self.priority_order = value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::parse::<ProviderId>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| ConfigError::Env {
                    var: ENV_PRIORITY_ORDER,
                    value: value.clone(),
                })?;
        }

        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_attempts = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_MAX_ATTEMPTS,
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(ENV_BACKOFF_CAP_SECONDS) {
            self.backoff_cap_seconds = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_BACKOFF_CAP_SECONDS,
                value: value.clone(),
            })?;
        }

        if let Some(value) = lookup(ENV_CALL_TIMEOUT_SECONDS) {
            self.call_timeout_seconds = value.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_CALL_TIMEOUT_SECONDS,
                value: value.clone(),
            })?;
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if self.priority_order.is_empty() {
            return Err(ConfigError::invalid(
                "priority_order",
                "must name at least one source",
            ));
        }
        if let Some((endpoint, _)) = self
            .endpoint_priority
            .iter()
            .find(|(_, order)| order.is_empty())
        {
            return Err(ConfigError::invalid(
                "endpoint_priority",
                format!("order for '{endpoint}' must name at least one source"),
            ));
        }
        if !self.backoff_cap_seconds.is_finite() || self.backoff_cap_seconds < 0.0 {
            return Err(ConfigError::invalid(
                "backoff_cap_seconds",
                format!("must be a non-negative number, got {}", self.backoff_cap_seconds),
            ));
        }
        if !self.call_timeout_seconds.is_finite() || self.call_timeout_seconds <= 0.0 {
            return Err(ConfigError::invalid(
                "call_timeout_seconds",
                format!("must be positive, got {}", self.call_timeout_seconds),
            ));
        }
        if let Some((provider, delay)) = self
            .pre_call_delay_seconds
            .iter()
            .find(|(_, delay)| !delay.is_finite() || **delay < 0.0)
        {
            return Err(ConfigError::invalid(
                "pre_call_delay_seconds",
                format!("delay for '{provider}' must be non-negative, got {delay}"),
            ));
        }
        if !(-12..=14).contains(&self.market_utc_offset_hours) {
            return Err(ConfigError::invalid(
                "market_utc_offset_hours",
                format!("must be within -12..=14, got {}", self.market_utc_offset_hours),
            ));
        }
        if self.sector_ranking_limit == 0 {
            return Err(ConfigError::invalid(
                "sector_ranking_limit",
                "must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for key in &self.tracked_indices {
            if key.name.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "tracked_indices",
                    format!("index '{}' has an empty name", key.code),
                ));
            }
            if !seen.insert(&key.code) {
                return Err(ConfigError::invalid(
                    "tracked_indices",
                    format!("index '{}' is listed twice", key.code),
                ));
            }
        }

        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            backoff: Backoff::Exponential {
                unit: Duration::from_secs(1),
                factor: 2.0,
                max: seconds(self.backoff_cap_seconds, Duration::ZERO),
                jitter: self.backoff_jitter,
            },
        }
    }

    pub fn call_timeout(&self) -> Duration {
        seconds(self.call_timeout_seconds, Duration::from_secs(10))
    }

    pub fn pre_call_delay(&self, provider: ProviderId) -> Option<Duration> {
        self.pre_call_delay_seconds
            .get(&provider)
            .map(|value| seconds(*value, Duration::ZERO))
    }

    pub fn priority_for(&self, endpoint: Endpoint) -> &[ProviderId] {
        self.endpoint_priority
            .get(&endpoint)
            .map(Vec::as_slice)
            .unwrap_or(&self.priority_order)
    }

    pub fn priority_table(&self) -> PriorityTable {
        self.endpoint_priority.iter().fold(
            PriorityTable::new(self.priority_order.clone()),
            |table, (endpoint, order)| table.with_override(*endpoint, order.clone()),
        )
    }

    pub fn market_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.market_utc_offset_hours, 0, 0).unwrap_or(UtcOffset::UTC)
    }
}

/// Index snapshots go to sina first: the eastmoney index endpoint reports
/// only point and change, with no session range or previous close.
fn default_endpoint_priority() -> BTreeMap<Endpoint, Vec<ProviderId>> {
    BTreeMap::from([(
        Endpoint::IndexSnapshot,
        vec![ProviderId::Sina, ProviderId::Eastmoney, ProviderId::Yahoo],
    )])
}

fn seconds(value: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(fallback)
}
