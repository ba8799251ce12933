use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{InstrumentCode, ProviderId, TradingDate, UtcDateTime, ValidationError};

/// Where a canonical record's values came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "provider", rename_all = "snake_case")]
pub enum Provenance {
    /// Pre-fetched snapshot supplied by the caller.
    External,
    /// A configured source adapter.
    Provider(ProviderId),
    /// Every source failed; the record is zero-filled.
    Unresolved,
}

impl Provenance {
    pub const fn provider(self) -> Option<ProviderId> {
        match self {
            Self::Provider(provider) => Some(provider),
            Self::External | Self::Unresolved => None,
        }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::External => f.write_str("external"),
            Self::Provider(provider) => f.write_str(provider.as_str()),
            Self::Unresolved => f.write_str("unresolved"),
        }
    }
}

/// Logical key of a tracked index: its code and display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexKey {
    pub code: InstrumentCode,
    pub name: String,
}

impl IndexKey {
    pub fn new(code: InstrumentCode, name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyIndexName {
                code: code.prefixed(),
            });
        }
        Ok(Self { code, name })
    }

    pub fn parse(code: &str, name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(InstrumentCode::parse(code)?, name)
    }

    /// Six main indices tracked by default.
    pub fn main_indices() -> Vec<Self> {
        [
            (InstrumentCode::shanghai("000001"), "上证指数"),
            (InstrumentCode::shenzhen("399001"), "深证成指"),
            (InstrumentCode::shenzhen("399006"), "创业板指"),
            (InstrumentCode::shanghai("000688"), "科创50"),
            (InstrumentCode::shanghai("000016"), "上证50"),
            (InstrumentCode::shanghai("000300"), "沪深300"),
        ]
        .into_iter()
        .map(|(code, name)| Self {
            code,
            name: name.to_owned(),
        })
        .collect()
    }
}

/// Canonical per-instrument quote.
///
/// Numeric fields the winning source did not report stay `None`.
/// `market_cap` is in hundred-million currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentQuote {
    pub code: InstrumentCode,
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub change_rate: Option<f64>,
    pub change_amount: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
    pub updated_at: UtcDateTime,
    pub provenance: Provenance,
    pub degraded: bool,
}

impl InstrumentQuote {
    /// Zero-filled quote returned when every source failed.
    pub fn degraded(code: InstrumentCode) -> Self {
        Self {
            code,
            close: Some(0.0),
            open: Some(0.0),
            high: Some(0.0),
            low: Some(0.0),
            change_rate: Some(0.0),
            change_amount: Some(0.0),
            volume: Some(0.0),
            market_cap: Some(0.0),
            updated_at: UtcDateTime::now(),
            provenance: Provenance::Unresolved,
            degraded: true,
        }
    }
}

/// Canonical index snapshot.
///
/// Numeric fields default to `0.0` when the winning source did not report
/// them; `amplitude` stays `None` unless it can be computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub code: InstrumentCode,
    pub name: String,
    pub current: f64,
    pub change: f64,
    pub change_pct: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: f64,
    pub amount: f64,
    pub amplitude: Option<f64>,
    pub provenance: Provenance,
    pub degraded: bool,
}

impl IndexSnapshot {
    /// Zero-filled snapshot returned when every source failed.
    pub fn degraded(key: &IndexKey) -> Self {
        Self {
            code: key.code.clone(),
            name: key.name.clone(),
            current: 0.0,
            change: 0.0,
            change_pct: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            prev_close: 0.0,
            volume: 0.0,
            amount: 0.0,
            amplitude: None,
            provenance: Provenance::Unresolved,
            degraded: true,
        }
    }
}

/// Intraday range as a percentage of the previous close.
///
/// Returns `None` when `prev_close` is not positive; a zero amplitude would
/// read as a real flat session.
pub fn compute_amplitude(high: f64, low: f64, prev_close: f64) -> Option<f64> {
    if prev_close > 0.0 && high.is_finite() && low.is_finite() {
        Some((high - low) / prev_close * 100.0)
    } else {
        None
    }
}

/// Advance/decline breadth across both exchanges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatistics {
    pub up_count: u32,
    pub down_count: u32,
    pub flat_count: u32,
    /// Summed turnover of the Shanghai and Shenzhen composite indices.
    pub total_amount: f64,
    pub provenance: Provenance,
    pub degraded: bool,
}

impl MarketStatistics {
    pub fn degraded() -> Self {
        Self {
            up_count: 0,
            down_count: 0,
            flat_count: 0,
            total_amount: 0.0,
            provenance: Provenance::Unresolved,
            degraded: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRanking {
    pub name: String,
    pub change_pct: f64,
}

/// Best and worst industry boards of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRankings {
    pub top: Vec<SectorRanking>,
    pub bottom: Vec<SectorRanking>,
    pub provenance: Provenance,
    pub degraded: bool,
}

impl SectorRankings {
    pub fn degraded() -> Self {
        Self {
            top: Vec::new(),
            bottom: Vec::new(),
            provenance: Provenance::Unresolved,
            degraded: true,
        }
    }
}

/// One market snapshot assembled from every tracked index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOverview {
    pub date: TradingDate,
    pub indices: Vec<IndexSnapshot>,
    pub statistics: MarketStatistics,
    pub sector_rankings: SectorRankings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl MarketOverview {
    pub fn index(&self, code: &InstrumentCode) -> Option<&IndexSnapshot> {
        self.indices.iter().find(|snapshot| &snapshot.code == code)
    }

    pub fn degraded_indices(&self) -> impl Iterator<Item = &IndexSnapshot> {
        self.indices.iter().filter(|snapshot| snapshot.degraded)
    }

    /// True when any part of the overview fell back to zero-filled data.
    pub fn is_degraded(&self) -> bool {
        self.statistics.degraded
            || self.sector_rankings.degraded
            || self.indices.iter().any(|snapshot| snapshot.degraded)
    }
}
