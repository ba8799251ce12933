//! Scripted data sources shared by the behavior tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tickfuse_core::{
    BreadthRecord, CapabilitySet, DataSource, Endpoint, IndexKey, IndexRecord, InstrumentCode,
    ProviderId, QuoteRecord, SectorRecord, SourceError, SourceFuture,
};
use tokio::time::Instant;

pub fn code(value: &str) -> InstrumentCode {
    InstrumentCode::parse(value).expect("valid code")
}

pub fn key(value: &str, name: &str) -> IndexKey {
    IndexKey::parse(value, name).expect("valid key")
}

pub fn index_record(value: &str, current: f64, prev_close: f64) -> IndexRecord {
    IndexRecord {
        current: Some(current),
        prev_close: Some(prev_close),
        high: Some(current.max(prev_close) + 10.0),
        low: Some(current.min(prev_close) - 10.0),
        ..IndexRecord::new(code(value))
    }
}

pub fn quote_record(value: &str, close: f64) -> QuoteRecord {
    QuoteRecord {
        close: Some(close),
        ..QuoteRecord::new(code(value))
    }
}

pub fn sectors(entries: &[(&str, f64)]) -> Vec<SectorRecord> {
    entries
        .iter()
        .map(|(name, change_pct)| SectorRecord {
            name: (*name).to_owned(),
            change_pct: *change_pct,
        })
        .collect()
}

/// Queue of outcomes; once drained, `fallback` repeats forever.
struct Script<T> {
    queue: VecDeque<Result<T, SourceError>>,
    fallback: Option<Result<T, SourceError>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: None,
        }
    }
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> Result<T, SourceError> {
        self.queue
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(SourceError::internal("scripted source has no outcome left")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub endpoint: Endpoint,
    pub code: Option<InstrumentCode>,
    pub at: Instant,
}

/// In-memory [`DataSource`] answering from per-endpoint scripts and
/// recording every call with its (virtual) time.
pub struct ScriptedSource {
    id: ProviderId,
    capabilities: CapabilitySet,
    index: Mutex<HashMap<InstrumentCode, Script<IndexRecord>>>,
    quotes: Mutex<HashMap<InstrumentCode, Script<QuoteRecord>>>,
    breadth: Mutex<Script<BreadthRecord>>,
    sectors: Mutex<Script<Vec<SectorRecord>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedSource {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            capabilities: CapabilitySet::full(),
            index: Mutex::new(HashMap::new()),
            quotes: Mutex::new(HashMap::new()),
            breadth: Mutex::new(Script::default()),
            sectors: Mutex::new(Script::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queues one index outcome for `value`.
    pub fn index(self, value: &str, outcome: Result<IndexRecord, SourceError>) -> Self {
        self.index
            .lock()
            .expect("index lock")
            .entry(code(value))
            .or_default()
            .queue
            .push_back(outcome);
        self
    }

    /// Answers every remaining index call for `value` with `outcome`.
    pub fn index_always(self, value: &str, outcome: Result<IndexRecord, SourceError>) -> Self {
        self.index
            .lock()
            .expect("index lock")
            .entry(code(value))
            .or_default()
            .fallback = Some(outcome);
        self
    }

    pub fn quote_always(self, value: &str, outcome: Result<QuoteRecord, SourceError>) -> Self {
        self.quotes
            .lock()
            .expect("quotes lock")
            .entry(code(value))
            .or_default()
            .fallback = Some(outcome);
        self
    }

    pub fn breadth_always(self, outcome: Result<BreadthRecord, SourceError>) -> Self {
        self.breadth.lock().expect("breadth lock").fallback = Some(outcome);
        self
    }

    pub fn sectors_always(self, outcome: Result<Vec<SectorRecord>, SourceError>) -> Self {
        self.sectors.lock().expect("sectors lock").fallback = Some(outcome);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    pub fn calls_for(&self, endpoint: Endpoint) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .count()
    }

    pub fn index_calls(&self, value: &str) -> usize {
        let wanted = code(value);
        self.calls()
            .iter()
            .filter(|call| call.endpoint == Endpoint::IndexSnapshot)
            .filter(|call| call.code.as_ref() == Some(&wanted))
            .count()
    }

    fn record_call(&self, endpoint: Endpoint, code: Option<&InstrumentCode>) {
        self.calls.lock().expect("calls lock").push(Call {
            endpoint,
            code: code.cloned(),
            at: Instant::now(),
        });
    }
}

impl DataSource for ScriptedSource {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn index_snapshot<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, IndexRecord> {
        self.record_call(Endpoint::IndexSnapshot, Some(code));
        let outcome = self
            .index
            .lock()
            .expect("index lock")
            .entry(code.clone())
            .or_default()
            .next();
        Box::pin(async move { outcome })
    }

    fn quote<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, QuoteRecord> {
        self.record_call(Endpoint::InstrumentQuote, Some(code));
        let outcome = self
            .quotes
            .lock()
            .expect("quotes lock")
            .entry(code.clone())
            .or_default()
            .next();
        Box::pin(async move { outcome })
    }

    fn market_breadth<'a>(&'a self) -> SourceFuture<'a, BreadthRecord> {
        self.record_call(Endpoint::MarketBreadth, None);
        let outcome = self.breadth.lock().expect("breadth lock").next();
        Box::pin(async move { outcome })
    }

    fn sector_rankings<'a>(&'a self) -> SourceFuture<'a, Vec<SectorRecord>> {
        self.record_call(Endpoint::SectorRanking, None);
        let outcome = self.sectors.lock().expect("sectors lock").next();
        Box::pin(async move { outcome })
    }
}
