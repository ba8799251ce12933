//! Mapping from provider records to canonical records.
//!
//! Index snapshots default absent numbers to `0.0`; quotes keep them as
//! `None`. Derived values (`change`, `change_pct`, `amplitude`) only ever use
//! fields of the one record being normalized.

use std::cmp::Ordering;

use crate::data_source::{BreadthRecord, IndexRecord, QuoteRecord, SectorRecord, SourceRecord};
use crate::overview::ExternalSnapshot;
use crate::{
    compute_amplitude, IndexKey, IndexSnapshot, InstrumentQuote, MarketStatistics, Provenance,
    SectorRanking, SectorRankings, UtcDateTime,
};

pub fn index_snapshot_from_record(
    key: &IndexKey,
    record: SourceRecord<IndexRecord>,
) -> IndexSnapshot {
    let SourceRecord { provider, data } = record;

    let change = data.change.or_else(|| match (data.current, data.prev_close) {
        (Some(current), Some(prev_close)) => Some(current - prev_close),
        _ => None,
    });
    let change_pct = data.change_pct.or_else(|| match (change, data.prev_close) {
        (Some(change), Some(prev_close)) if prev_close > 0.0 => Some(change / prev_close * 100.0),
        _ => None,
    });
    let amplitude = match (data.high, data.low, data.prev_close) {
        (Some(high), Some(low), Some(prev_close)) => compute_amplitude(high, low, prev_close),
        _ => None,
    };

    IndexSnapshot {
        code: key.code.clone(),
        name: key.name.clone(),
        current: data.current.unwrap_or(0.0),
        change: change.unwrap_or(0.0),
        change_pct: change_pct.unwrap_or(0.0),
        open: data.open.unwrap_or(0.0),
        high: data.high.unwrap_or(0.0),
        low: data.low.unwrap_or(0.0),
        prev_close: data.prev_close.unwrap_or(0.0),
        volume: data.volume.unwrap_or(0.0),
        amount: data.amount.unwrap_or(0.0),
        amplitude,
        provenance: Provenance::Provider(provider),
        degraded: false,
    }
}

/// Caller-supplied point and change rate; every other field is `0.0`.
pub fn index_snapshot_from_external(key: &IndexKey, external: &ExternalSnapshot) -> IndexSnapshot {
    IndexSnapshot {
        current: external.point,
        change_pct: external.change_rate,
        provenance: Provenance::External,
        degraded: false,
        ..IndexSnapshot::degraded(key)
    }
}

pub fn quote_from_record(record: SourceRecord<QuoteRecord>) -> InstrumentQuote {
    let SourceRecord { provider, data } = record;
    InstrumentQuote {
        code: data.code,
        close: data.close,
        open: data.open,
        high: data.high,
        low: data.low,
        change_rate: data.change_rate,
        change_amount: data.change_amount,
        volume: data.volume,
        market_cap: data.market_cap,
        updated_at: UtcDateTime::now(),
        provenance: Provenance::Provider(provider),
        degraded: false,
    }
}

pub fn statistics_from_breadth(record: SourceRecord<BreadthRecord>) -> MarketStatistics {
    let SourceRecord { provider, data } = record;
    MarketStatistics {
        up_count: data.up_count.unwrap_or(0),
        down_count: data.down_count.unwrap_or(0),
        flat_count: data.flat_count.unwrap_or(0),
        total_amount: data.total_amount.unwrap_or(0.0),
        provenance: Provenance::Provider(provider),
        degraded: false,
    }
}

/// Best `limit` boards descending and worst `limit` boards ascending.
pub fn rankings_from_sectors(
    record: SourceRecord<Vec<SectorRecord>>,
    limit: usize,
) -> SectorRankings {
    let SourceRecord { provider, data } = record;

    let mut sectors = data
        .into_iter()
        .filter(|sector| sector.change_pct.is_finite())
        .map(|sector| SectorRanking {
            name: sector.name,
            change_pct: sector.change_pct,
        })
        .collect::<Vec<_>>();
    sectors.sort_by(|left, right| {
        right
            .change_pct
            .partial_cmp(&left.change_pct)
            .unwrap_or(Ordering::Equal)
            .then_with(|| left.name.cmp(&right.name))
    });

    let top = sectors.iter().take(limit).cloned().collect();
    let bottom = sectors.iter().rev().take(limit).cloned().collect();

    SectorRankings {
        top,
        bottom,
        provenance: Provenance::Provider(provider),
        degraded: false,
    }
}
