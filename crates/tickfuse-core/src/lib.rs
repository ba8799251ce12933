//! # Tickfuse Core
//!
//! Multi-source A-share quote and index aggregation.
//!
//! ## Overview
//!
//! Three unreliable public sources (the eastmoney push API, the sina quote
//! feed and the yahoo chart API) are queried in a configured priority order.
//! Every call is throttled, bounded by a timeout and retried with capped
//! exponential backoff; the first valid record wins and is normalized into
//! one canonical schema. When every source fails the caller still gets a
//! record, zero-filled and flagged `degraded`.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Source adapters (eastmoney, sina, yahoo) |
//! | [`config`] | Resolver configuration (YAML/JSON, environment overrides) |
//! | [`data_source`] | Data source trait, provider records and source errors |
//! | [`domain`] | Canonical models (codes, quotes, snapshots, overview) |
//! | [`error`] | Validation and configuration errors |
//! | [`http_client`] | HTTP client abstraction |
//! | [`normalize`] | Provider record to canonical record mapping |
//! | [`overview`] | Market overview assembly |
//! | [`provider_policy`] | Per-provider politeness defaults |
//! | [`resolver`] | Priority-ordered source resolution |
//! | [`retry`] | Retry executor with capped exponential backoff |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Per-adapter throttle |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tickfuse_core::{OverviewAssembler, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ResolverConfig::default();
//!     config.apply_env_overrides()?;
//!
//!     let assembler = OverviewAssembler::from_config(config)?;
//!     let overview = assembler.fetch_overview(None).await;
//!
//!     for index in &overview.indices {
//!         println!("{} {:.2} ({})", index.name, index.current, index.provenance);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │ Overview Assembler  │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐     ┌──────────────────┐
//! │  Source Resolver    │────▶│ Retry Executor   │
//! └──────────┬──────────┘     └──────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐     ┌──────────────────┐
//! │ Data Source         │────▶│ Throttle +       │
//! │ (Adapter Trait)     │     │ HTTP Client      │
//! └──────────┬──────────┘     └──────────────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ Normalizer          │
//! │ (canonical records) │
//! └─────────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Adapters fail with a [`SourceError`]; only its retryable kinds are tried
//! again:
//!
//! ```rust
//! use tickfuse_core::{SourceError, SourceErrorKind};
//!
//! fn handle_error(error: SourceError) {
//!     match error.kind() {
//!         SourceErrorKind::Transient | SourceErrorKind::RateLimited => {
//!             // Retried with backoff
//!         }
//!         SourceErrorKind::MalformedPayload | SourceErrorKind::EmptyResult => {
//!             // Next source in the priority order
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod normalize;
pub mod overview;
pub mod provider_policy;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{EastmoneyAdapter, SinaAdapter, YahooAdapter};

// Configuration
pub use config::ResolverConfig;

// Data source trait and types
pub use data_source::{
    BreadthRecord, CapabilitySet, DataSource, Endpoint, IndexRecord, QuoteRecord, SectorRecord,
    SourceError, SourceErrorKind, SourceFuture, SourceRecord,
};

// Domain models
pub use domain::{
    compute_amplitude, Exchange, IndexKey, IndexSnapshot, InstrumentCode, InstrumentQuote,
    MarketOverview, MarketStatistics, Provenance, SectorRanking, SectorRankings, TradingDate,
    UtcDateTime,
};

// Error types
pub use error::{ConfigError, ValidationError};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Overview assembly
pub use overview::{ExternalSnapshot, ExternalSnapshots, OverviewAssembler};

// Provider policies
pub use provider_policy::ProviderPolicy;

// Resolution
pub use resolver::{
    PriorityTable, Resolution, SourceFailure, SourceResolver, SourceResolverBuilder,
};

// Retry logic
pub use retry::{AttemptRecord, Backoff, ExhaustedFailure, RetryConfig, RetryExecutor};

// Source identifiers
pub use source::ProviderId;

// Throttling
pub use throttling::{Throttle, ThrottlePermit};
