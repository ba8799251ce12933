//! Market overview assembly.
//!
//! [`OverviewAssembler`] fixes the trading date first, then resolves each
//! tracked index in caller order, followed by market breadth and sector
//! rankings. Failures surface as degraded sections plus human-readable
//! warnings on the [`MarketOverview`](crate::MarketOverview).

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use time::UtcOffset;
use tracing::{info, warn};

use crate::resolver::{Resolution, SourceResolver, SourceResolverBuilder};
use crate::{ConfigError, IndexKey, MarketOverview, ResolverConfig, TradingDate};

/// Pre-fetched index value supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExternalSnapshot {
    pub point: f64,
    #[serde(alias = "changeRate")]
    pub change_rate: f64,
}

/// Caller-supplied snapshots keyed by index display name or by canonical
/// code (`sh000001`).
pub type ExternalSnapshots = HashMap<String, ExternalSnapshot>;

/// Builds a [`MarketOverview`] by resolving every tracked index, then market
/// breadth, then sector rankings. Calls are awaited one after another.
pub struct OverviewAssembler {
    resolver: SourceResolver,
    tracked: Vec<IndexKey>,
    sector_limit: usize,
    utc_offset: UtcOffset,
}

impl OverviewAssembler {
    pub fn new(
        resolver: SourceResolver,
        tracked: Vec<IndexKey>,
        sector_limit: usize,
        utc_offset: UtcOffset,
    ) -> Self {
        Self {
            resolver,
            tracked,
            sector_limit,
            utc_offset,
        }
    }

    /// Wires the default adapters from `config`.
    pub fn from_config(config: ResolverConfig) -> Result<Self, ConfigError> {
        let tracked = config.tracked_indices.clone();
        let sector_limit = config.sector_ranking_limit;
        let utc_offset = config.market_offset();
        let resolver = SourceResolverBuilder::new(config).build()?;
        Ok(Self::new(resolver, tracked, sector_limit, utc_offset))
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn tracked(&self) -> &[IndexKey] {
        &self.tracked
    }

    /// Overview of the configured tracked indices.
    pub async fn fetch_overview(&self, external: Option<&ExternalSnapshots>) -> MarketOverview {
        self.assemble(&self.tracked, external).await
    }

    /// Overview of `keys` in the given order. Never fails: sources that all
    /// fail yield degraded entries plus a warning.
    pub async fn assemble(
        &self,
        keys: &[IndexKey],
        external: Option<&ExternalSnapshots>,
    ) -> MarketOverview {
        let date = TradingDate::today_in(self.utc_offset);
        let mut warnings = Vec::new();
        let mut seen = HashSet::with_capacity(keys.len());
        let mut indices = Vec::with_capacity(keys.len());

        for key in keys {
            if !seen.insert(&key.code) {
                warn!(code = %key.code, name = %key.name, "duplicate index key dropped");
                warnings.push(format!(
                    "{} ({}): duplicate index key dropped",
                    key.name, key.code
                ));
                continue;
            }

            let snapshot = external.and_then(|snapshots| lookup_external(snapshots, key));
            let resolution = self.resolver.resolve_index(key, snapshot).await;
            note_resolution(&mut warnings, &format!("{} ({})", key.name, key.code), &resolution);
            indices.push(resolution.record);
        }

        let breadth = self.resolver.resolve_breadth().await;
        note_resolution(&mut warnings, "market breadth", &breadth);

        let sectors = self.resolver.resolve_sectors(self.sector_limit).await;
        note_resolution(&mut warnings, "sector rankings", &sectors);

        let overview = MarketOverview {
            date,
            indices,
            statistics: breadth.record,
            sector_rankings: sectors.record,
            warnings,
        };

        info!(
            date = %overview.date,
            indices = overview.indices.len(),
            degraded = overview.degraded_indices().count(),
            warnings = overview.warnings.len(),
            "market overview assembled"
        );
        overview
    }
}

fn lookup_external<'a>(
    snapshots: &'a ExternalSnapshots,
    key: &IndexKey,
) -> Option<&'a ExternalSnapshot> {
    snapshots
        .get(&key.name)
        .or_else(|| snapshots.get(&key.code.prefixed()))
}

fn note_resolution<T>(warnings: &mut Vec<String>, subject: &str, resolution: &Resolution<T>) {
    if resolution.is_degraded() {
        let tried = resolution
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.provider, failure.error.code()))
            .collect::<Vec<_>>()
            .join(", ");
        warnings.push(format!("{subject}: all sources failed ({tried}), degraded"));
    } else if resolution.used_fallback() {
        warnings.push(format!(
            "{subject}: served by fallback source {}",
            resolution.provenance
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_lookup_prefers_name_then_code() {
        let key = IndexKey::parse("sh000001", "上证指数").expect("valid key");
        let mut snapshots = ExternalSnapshots::new();
        snapshots.insert(
            "sh000001".to_owned(),
            ExternalSnapshot {
                point: 1.0,
                change_rate: 0.0,
            },
        );
        assert_eq!(lookup_external(&snapshots, &key).map(|s| s.point), Some(1.0));

        snapshots.insert(
            "上证指数".to_owned(),
            ExternalSnapshot {
                point: 2.0,
                change_rate: 0.0,
            },
        );
        assert_eq!(lookup_external(&snapshots, &key).map(|s| s.point), Some(2.0));
    }

    #[test]
    fn external_snapshot_accepts_camel_case() {
        let snapshots: ExternalSnapshots =
            serde_json::from_str(r#"{"上证指数":{"point":3050.12,"changeRate":0.85}}"#)
                .expect("valid json");
        assert_eq!(snapshots["上证指数"].change_rate, 0.85);
    }
}
