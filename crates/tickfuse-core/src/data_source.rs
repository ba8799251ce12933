//! Data source trait and provider record types.
//!
//! This module defines the adapter contract (`DataSource`) every provider
//! implements, the provider-neutral records adapters return, and the
//! structured error used by retry and fallback decisions.
//!
//! # Endpoints
//!
//! | Endpoint | Method | Record | Description |
//! |----------|--------|--------|-------------|
//! | IndexSnapshot | [`DataSource::index_snapshot`] | [`IndexRecord`] | Index level and session range |
//! | InstrumentQuote | [`DataSource::quote`] | [`QuoteRecord`] | Single-instrument quote |
//! | MarketBreadth | [`DataSource::market_breadth`] | [`BreadthRecord`] | Advance/decline counts |
//! | SectorRanking | [`DataSource::sector_rankings`] | [`SectorRecord`] | Industry board performance |
//!
//! # Error classification
//!
//! | Kind | Retried | Resolver reaction |
//! |------|---------|-------------------|
//! | `Transient` | yes | retry, then next source |
//! | `RateLimited` | yes | retry, then next source |
//! | `MalformedPayload` | no | next source |
//! | `EmptyResult` | no | next source |
//! | `UnsupportedEndpoint` | no | skip source |
//! | `InvalidRequest` | no | next source |
//! | `AdapterNotRegistered` | no | skip source |
//! | `Internal` | no | next source |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::{InstrumentCode, ProviderId};

/// Data endpoint type used for routing and capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    IndexSnapshot,
    InstrumentQuote,
    MarketBreadth,
    SectorRanking,
}

impl Endpoint {
    pub const ALL: [Self; 4] = [
        Self::IndexSnapshot,
        Self::InstrumentQuote,
        Self::MarketBreadth,
        Self::SectorRanking,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IndexSnapshot => "index_snapshot",
            Self::InstrumentQuote => "instrument_quote",
            Self::MarketBreadth => "market_breadth",
            Self::SectorRanking => "sector_ranking",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported endpoint matrix for a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub index_snapshot: bool,
    pub instrument_quote: bool,
    pub market_breadth: bool,
    pub sector_ranking: bool,
}

impl CapabilitySet {
    pub const fn new(
        index_snapshot: bool,
        instrument_quote: bool,
        market_breadth: bool,
        sector_ranking: bool,
    ) -> Self {
        Self {
            index_snapshot,
            instrument_quote,
            market_breadth,
            sector_ranking,
        }
    }

    pub const fn full() -> Self {
        Self::new(true, true, true, true)
    }

    /// Index snapshots and instrument quotes only.
    pub const fn quotes_only() -> Self {
        Self::new(true, true, false, false)
    }

    pub const fn supports(self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::IndexSnapshot => self.index_snapshot,
            Endpoint::InstrumentQuote => self.instrument_quote,
            Endpoint::MarketBreadth => self.market_breadth,
            Endpoint::SectorRanking => self.sector_ranking,
        }
    }

    pub fn supported_endpoints(self) -> Vec<Endpoint> {
        Endpoint::ALL
            .into_iter()
            .filter(|endpoint| self.supports(*endpoint))
            .collect()
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    /// Network failure or timeout.
    Transient,
    /// Provider asked us to slow down.
    RateLimited,
    /// Transport succeeded but the payload did not have the expected shape.
    MalformedPayload,
    /// Provider does not know the requested symbol or returned no data.
    EmptyResult,
    UnsupportedEndpoint,
    InvalidRequest,
    AdapterNotRegistered,
    Internal,
}

/// Structured source error used by retry and fallback decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Transient,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::MalformedPayload,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::EmptyResult,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unsupported_endpoint(endpoint: Endpoint) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedEndpoint,
            message: format!("endpoint '{endpoint}' is not supported by this source"),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn adapter_not_registered(provider: ProviderId) -> Self {
        Self {
            kind: SourceErrorKind::AdapterNotRegistered,
            message: format!("source adapter '{provider}' is not registered"),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Transient => "source.transient",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::MalformedPayload => "source.malformed_payload",
            SourceErrorKind::EmptyResult => "source.empty_result",
            SourceErrorKind::UnsupportedEndpoint => "source.unsupported_endpoint",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::AdapterNotRegistered => "source.adapter_not_registered",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Index fields as reported by one provider. Absent fields stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub code: InstrumentCode,
    pub name: Option<String>,
    pub current: Option<f64>,
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub prev_close: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
}

impl IndexRecord {
    pub fn new(code: InstrumentCode) -> Self {
        Self {
            code,
            name: None,
            current: None,
            change: None,
            change_pct: None,
            open: None,
            high: None,
            low: None,
            prev_close: None,
            volume: None,
            amount: None,
        }
    }

    /// True when the provider reported at least one numeric field.
    pub fn has_measurements(&self) -> bool {
        [
            self.current,
            self.change,
            self.change_pct,
            self.open,
            self.high,
            self.low,
            self.prev_close,
            self.volume,
            self.amount,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// Instrument fields as reported by one provider. `market_cap` is already
/// converted to hundred-million currency units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub code: InstrumentCode,
    pub close: Option<f64>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub change_rate: Option<f64>,
    pub change_amount: Option<f64>,
    pub volume: Option<f64>,
    pub market_cap: Option<f64>,
}

impl QuoteRecord {
    pub fn new(code: InstrumentCode) -> Self {
        Self {
            code,
            close: None,
            open: None,
            high: None,
            low: None,
            change_rate: None,
            change_amount: None,
            volume: None,
            market_cap: None,
        }
    }

    pub fn has_measurements(&self) -> bool {
        [
            self.close,
            self.open,
            self.high,
            self.low,
            self.change_rate,
            self.change_amount,
            self.volume,
            self.market_cap,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// Advance/decline breadth as reported by one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreadthRecord {
    pub up_count: Option<u32>,
    pub down_count: Option<u32>,
    pub flat_count: Option<u32>,
    pub total_amount: Option<f64>,
}

impl BreadthRecord {
    pub fn has_measurements(&self) -> bool {
        self.up_count.is_some()
            || self.down_count.is_some()
            || self.flat_count.is_some()
            || self.total_amount.is_some()
    }
}

/// One industry board and its session change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorRecord {
    pub name: String,
    pub change_pct: f64,
}

/// Provider payload tagged with the adapter that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord<T> {
    pub provider: ProviderId,
    pub data: T,
}

impl<T> SourceRecord<T> {
    pub fn new(provider: ProviderId, data: T) -> Self {
        Self { provider, data }
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Adapters are capability-equivalent entries of one priority list; the
/// resolver never needs to know which concrete provider it talks to.
///
/// # Required Methods
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](DataSource::id) | Unique provider identifier |
/// | [`capabilities`](DataSource::capabilities) | Supported endpoints |
/// | [`index_snapshot`](DataSource::index_snapshot) | Fetch one index |
/// | [`quote`](DataSource::quote) | Fetch one instrument |
/// | [`market_breadth`](DataSource::market_breadth) | Fetch breadth counts |
/// | [`sector_rankings`](DataSource::sector_rankings) | Fetch industry boards |
///
/// # Contract
///
/// - Return only fields the provider actually reported, with unit
///   conversions already applied.
/// - Honor the adapter's politeness delay before every network call.
/// - Report failures as [`SourceError`]; never return wrongly typed values.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` as they may be shared across tasks.
pub trait DataSource: Send + Sync {
    /// Returns the unique provider identifier.
    fn id(&self) -> ProviderId;

    /// Returns the set of supported endpoints.
    fn capabilities(&self) -> CapabilitySet;

    /// Fetches a snapshot of one index.
    fn index_snapshot<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, IndexRecord>;

    /// Fetches a quote for one instrument.
    fn quote<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, QuoteRecord>;

    /// Fetches advance/decline breadth for both exchanges.
    fn market_breadth<'a>(&'a self) -> SourceFuture<'a, BreadthRecord>;

    /// Fetches every industry board with its session change.
    fn sector_rankings<'a>(&'a self) -> SourceFuture<'a, Vec<SectorRecord>>;
}
