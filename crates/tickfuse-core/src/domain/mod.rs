//! # Domain Models
//!
//! Canonical domain types for tickfuse market data.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`InstrumentCode`] | Exchange-qualified six-digit code (`sh600519`) |
//! | [`IndexKey`] | Tracked index: code plus display name |
//! | [`InstrumentQuote`] | Per-instrument quote with nullable fields |
//! | [`IndexSnapshot`] | Index snapshot with `0.0` defaults and derived amplitude |
//! | [`MarketStatistics`] | Advance/decline breadth |
//! | [`SectorRankings`] | Best and worst industry boards |
//! | [`MarketOverview`] | One assembled market snapshot |
//! | [`Provenance`] | Which source produced a record |
//! | [`TradingDate`] | Calendar day in the market time zone |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Degraded records
//!
//! Every canonical record carries a `degraded` flag. A degraded record keeps
//! its identity fields and zero-fills its measurements so consumers can
//! render, suppress or alert on it instead of mistaking zero for data:
//!
//! ```rust
//! use tickfuse_core::{IndexKey, IndexSnapshot, Provenance};
//!
//! let key = IndexKey::parse("sh000001", "上证指数").unwrap();
//! let snapshot = IndexSnapshot::degraded(&key);
//! assert!(snapshot.degraded);
//! assert_eq!(snapshot.provenance, Provenance::Unresolved);
//! ```

mod code;
mod models;
mod timestamp;

pub use code::{Exchange, InstrumentCode};
pub use models::{
    compute_amplitude, IndexKey, IndexSnapshot, InstrumentQuote, MarketOverview,
    MarketStatistics, Provenance, SectorRanking, SectorRankings,
};
pub use timestamp::{TradingDate, UtcDateTime};
