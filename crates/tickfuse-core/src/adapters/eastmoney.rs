use std::sync::Arc;
use std::time::Duration;

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{fetch_text, parse_json};
use crate::data_source::{
    BreadthRecord, CapabilitySet, DataSource, IndexRecord, QuoteRecord, SectorRecord,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::Throttle;
use crate::{InstrumentCode, ProviderId};

const DEFAULT_BASE_URL: &str = "https://push2.eastmoney.com";
const MARKET_CAP_UNIT: f64 = 100_000_000.0;
/// Shanghai composite and Shenzhen component: their breadth fields cover each exchange.
const BREADTH_SECIDS: &str = "1.000001,0.399001";
/// Industry boards.
const SECTOR_FILTER: &str = "m:90+t:2";

/// Adapter for the push quote API.
///
/// Requests ask for decimal values (`fltt=2`); the API reports a missing
/// field as the string `"-"`, which maps to an absent value.
#[derive(Clone)]
pub struct EastmoneyAdapter {
    http_client: Arc<dyn HttpClient>,
    throttle: Throttle,
    base_url: String,
    timeout: Duration,
}

impl Default for EastmoneyAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl EastmoneyAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            throttle: Throttle::from_policy(&ProviderPolicy::eastmoney_default()),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn get_data<T: serde::de::DeserializeOwned>(
        &self,
        path_and_query: String,
        what: &str,
    ) -> Result<T, SourceError> {
        let request = HttpRequest::get(format!("{}{}", self.base_url, path_and_query))
            .with_header("referer", "https://quote.eastmoney.com/")
            .with_timeout(self.timeout);
        let body = fetch_text(
            ProviderId::Eastmoney,
            &self.throttle,
            self.http_client.as_ref(),
            request,
        )
        .await?;

        let envelope: PushEnvelope<T> = parse_json(ProviderId::Eastmoney, &body)?;
        envelope
            .data
            .ok_or_else(|| SourceError::empty(format!("eastmoney returned no data for {what}")))
    }

    async fn fetch_index(&self, code: &InstrumentCode) -> Result<IndexRecord, SourceError> {
        let data: PushIndexData = self
            .get_data(
                format!(
                    "/api/qt/index/get?secid={}&fltt=2&fields=f43,f47,f57,f58",
                    urlencoding::encode(&code.secid())
                ),
                &code.prefixed(),
            )
            .await?;

        Ok(IndexRecord {
            name: data.name.filter(|name| !name.trim().is_empty()),
            current: data.current,
            change_pct: data.change_pct,
            ..IndexRecord::new(reported_code(code, data.code.as_deref())?)
        })
    }

    async fn fetch_quote(&self, code: &InstrumentCode) -> Result<QuoteRecord, SourceError> {
        let data: PushQuoteData = self
            .get_data(
                format!(
                    "/api/qt/stock/get?secid={}&fltt=2&fields=f43,f44,f45,f46,f47,f48,f51,f57,f168",
                    urlencoding::encode(&code.secid())
                ),
                &code.prefixed(),
            )
            .await?;

        Ok(QuoteRecord {
            close: data.close,
            open: data.open,
            high: data.high,
            low: data.low,
            change_rate: data.change_rate,
            change_amount: data.change_amount,
            volume: data.volume,
            market_cap: data.market_cap.map(|raw| raw / MARKET_CAP_UNIT),
            ..QuoteRecord::new(reported_code(code, data.code.as_deref())?)
        })
    }

    async fn fetch_breadth(&self) -> Result<BreadthRecord, SourceError> {
        let data: PushList<PushBreadthRow> = self
            .get_data(
                format!(
                    "/api/qt/ulist.np/get?secids={BREADTH_SECIDS}&fltt=2&fields=f6,f104,f105,f106"
                ),
                "market breadth",
            )
            .await?;

        if data.diff.is_empty() {
            return Err(SourceError::empty("eastmoney breadth list is empty"));
        }

        let mut record = BreadthRecord::default();
        for row in &data.diff {
            record.up_count = add_count(record.up_count, row.up)?;
            record.down_count = add_count(record.down_count, row.down)?;
            record.flat_count = add_count(record.flat_count, row.flat)?;
            record.total_amount = match (record.total_amount, row.amount) {
                (Some(total), Some(amount)) => Some(total + amount),
                (total, amount) => total.or(amount),
            };
        }
        Ok(record)
    }

    async fn fetch_sectors(&self) -> Result<Vec<SectorRecord>, SourceError> {
        let data: PushList<PushSectorRow> = self
            .get_data(
                format!(
                    "/api/qt/clist/get?pn=1&pz=200&po=1&np=1&fltt=2&fid=f3&fs={}&fields=f3,f14",
                    urlencoding::encode(SECTOR_FILTER)
                ),
                "sector rankings",
            )
            .await?;

        let sectors = data
            .diff
            .into_iter()
            .filter_map(|row| match (row.name, row.change_pct) {
                (Some(name), Some(change_pct)) if !name.trim().is_empty() => {
                    Some(SectorRecord { name, change_pct })
                }
                _ => None,
            })
            .collect::<Vec<_>>();

        if sectors.is_empty() {
            return Err(SourceError::empty("eastmoney sector list is empty"));
        }
        Ok(sectors)
    }
}

impl DataSource for EastmoneyAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Eastmoney
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::full()
    }

    fn index_snapshot<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, IndexRecord> {
        Box::pin(self.fetch_index(code))
    }

    fn quote<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, QuoteRecord> {
        Box::pin(self.fetch_quote(code))
    }

    fn market_breadth<'a>(&'a self) -> SourceFuture<'a, BreadthRecord> {
        Box::pin(self.fetch_breadth())
    }

    fn sector_rankings<'a>(&'a self) -> SourceFuture<'a, Vec<SectorRecord>> {
        Box::pin(self.fetch_sectors())
    }
}

/// Uses the digits the provider echoed, on the requested exchange.
fn reported_code(
    requested: &InstrumentCode,
    reported: Option<&str>,
) -> Result<InstrumentCode, SourceError> {
    match reported.map(str::trim).filter(|digits| !digits.is_empty()) {
        Some(digits) => InstrumentCode::new(requested.exchange(), digits).map_err(|e| {
            SourceError::malformed(format!("eastmoney reported invalid code: {e}"))
        }),
        None => Ok(requested.clone()),
    }
}

fn add_count(total: Option<u32>, value: Option<f64>) -> Result<Option<u32>, SourceError> {
    let Some(value) = value else {
        return Ok(total);
    };
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(SourceError::malformed(format!(
            "eastmoney breadth count out of range: {value}"
        )));
    }
    Ok(Some(total.unwrap_or(0).saturating_add(value as u32)))
}

#[derive(Debug, Deserialize)]
struct PushEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct PushIndexData {
    #[serde(rename = "f43", default, deserialize_with = "push_number")]
    current: Option<f64>,
    #[serde(rename = "f47", default, deserialize_with = "push_number")]
    change_pct: Option<f64>,
    #[serde(rename = "f57", default, deserialize_with = "push_text")]
    code: Option<String>,
    #[serde(rename = "f58", default, deserialize_with = "push_text")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushQuoteData {
    #[serde(rename = "f43", default, deserialize_with = "push_number")]
    close: Option<f64>,
    #[serde(rename = "f44", default, deserialize_with = "push_number")]
    open: Option<f64>,
    #[serde(rename = "f45", default, deserialize_with = "push_number")]
    high: Option<f64>,
    #[serde(rename = "f46", default, deserialize_with = "push_number")]
    low: Option<f64>,
    #[serde(rename = "f47", default, deserialize_with = "push_number")]
    change_rate: Option<f64>,
    #[serde(rename = "f48", default, deserialize_with = "push_number")]
    change_amount: Option<f64>,
    #[serde(rename = "f51", default, deserialize_with = "push_number")]
    volume: Option<f64>,
    #[serde(rename = "f57", default, deserialize_with = "push_text")]
    code: Option<String>,
    #[serde(rename = "f168", default, deserialize_with = "push_number")]
    market_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct PushList<T> {
    #[serde(default)]
    diff: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PushBreadthRow {
    #[serde(rename = "f6", default, deserialize_with = "push_number")]
    amount: Option<f64>,
    #[serde(rename = "f104", default, deserialize_with = "push_number")]
    up: Option<f64>,
    #[serde(rename = "f105", default, deserialize_with = "push_number")]
    down: Option<f64>,
    #[serde(rename = "f106", default, deserialize_with = "push_number")]
    flat: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PushSectorRow {
    #[serde(rename = "f3", default, deserialize_with = "push_number")]
    change_pct: Option<f64>,
    #[serde(rename = "f14", default, deserialize_with = "push_text")]
    name: Option<String>,
}

/// Number, `null` or the `"-"` placeholder.
fn push_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("number out of range")),
        Some(Value::String(text)) if text.trim() == "-" => Ok(None),
        Some(other) => Err(D::Error::custom(format!(
            "expected number or '-', found {other}"
        ))),
    }
}

/// String, `null` or the `"-"` placeholder.
fn push_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim() == "-" => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(D::Error::custom(format!("expected string, found {other}"))),
    }
}
