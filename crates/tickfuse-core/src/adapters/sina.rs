use std::sync::Arc;
use std::time::Duration;

use super::fetch_text;
use crate::data_source::{
    BreadthRecord, CapabilitySet, DataSource, Endpoint, IndexRecord, QuoteRecord, SectorRecord,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::Throttle;
use crate::{InstrumentCode, ProviderId};

const DEFAULT_BASE_URL: &str = "https://hq.sinajs.cn";
/// The feed rejects requests without a finance-site referer.
const REFERER: &str = "https://finance.sina.com.cn";
const MIN_FIELDS: usize = 10;

/// Adapter for the `hq.sinajs.cn` quote feed.
///
/// The feed answers with one JavaScript assignment per symbol:
///
/// ```text
/// var hq_str_sh000001="上证指数,3040.0,3038.2,3050.1,3061.8,3030.4,0,0,312345678,401234567890,...";
/// ```
///
/// Fields are name, open, previous close, current, high, low, bid, ask,
/// volume and amount. An unknown symbol yields an empty string. Suspended
/// instruments and pre-auction rows report `0.000` prices, which are read as
/// absent; a row without a trade price is an empty result.
#[derive(Clone)]
pub struct SinaAdapter {
    http_client: Arc<dyn HttpClient>,
    throttle: Throttle,
    base_url: String,
    timeout: Duration,
}

impl Default for SinaAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl SinaAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            throttle: Throttle::from_policy(&ProviderPolicy::sina_default()),
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

    async fn fetch_line(&self, code: &InstrumentCode) -> Result<SinaLine, SourceError> {
        let request = HttpRequest::get(format!("{}/list={}", self.base_url, code.prefixed()))
            .with_header("referer", REFERER)
            .with_timeout(self.timeout);
        let body = fetch_text(
            ProviderId::Sina,
            &self.throttle,
            self.http_client.as_ref(),
            request,
        )
        .await?;

        parse_line(code, &body)
    }

    async fn fetch_index(&self, code: &InstrumentCode) -> Result<IndexRecord, SourceError> {
        let line = self.fetch_line(code).await?;
        Ok(IndexRecord {
            name: line.name,
            current: line.current,
            open: line.open,
            high: line.high,
            low: line.low,
            prev_close: line.prev_close,
            volume: line.volume,
            amount: line.amount,
            ..IndexRecord::new(line.code)
        })
    }

    async fn fetch_quote(&self, code: &InstrumentCode) -> Result<QuoteRecord, SourceError> {
        let line = self.fetch_line(code).await?;
        let change_amount = match (line.current, line.prev_close) {
            (Some(current), Some(prev_close)) => Some(current - prev_close),
            _ => None,
        };
        let change_rate = match (change_amount, line.prev_close) {
            (Some(change), Some(prev_close)) if prev_close > 0.0 => {
                Some(change / prev_close * 100.0)
            }
            _ => None,
        };

        Ok(QuoteRecord {
            close: line.current,
            open: line.open,
            high: line.high,
            low: line.low,
            change_rate,
            change_amount,
            volume: line.volume,
            ..QuoteRecord::new(line.code)
        })
    }
}

impl DataSource for SinaAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Sina
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::quotes_only()
    }

    fn index_snapshot<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, IndexRecord> {
        Box::pin(self.fetch_index(code))
    }

    fn quote<'a>(&'a self, code: &'a InstrumentCode) -> SourceFuture<'a, QuoteRecord> {
        Box::pin(self.fetch_quote(code))
    }

    fn market_breadth<'a>(&'a self) -> SourceFuture<'a, BreadthRecord> {
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::MarketBreadth)) })
    }

    fn sector_rankings<'a>(&'a self) -> SourceFuture<'a, Vec<SectorRecord>> {
        Box::pin(async { Err(SourceError::unsupported_endpoint(Endpoint::SectorRanking)) })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SinaLine {
    code: InstrumentCode,
    name: Option<String>,
    open: Option<f64>,
    prev_close: Option<f64>,
    current: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    volume: Option<f64>,
    amount: Option<f64>,
}

fn parse_line(requested: &InstrumentCode, body: &str) -> Result<SinaLine, SourceError> {
    let line = body
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("var hq_str_"))
        .ok_or_else(|| SourceError::malformed("sina payload has no hq_str assignment"))?;

    let (lhs, rhs) = line
        .split_once('=')
        .ok_or_else(|| SourceError::malformed("sina assignment has no '='"))?;
    let symbol = lhs.trim_start_matches("var hq_str_").trim();
    let code = InstrumentCode::parse(symbol)
        .map_err(|e| SourceError::malformed(format!("sina reported invalid symbol: {e}")))?;

    let quoted = rhs.trim().trim_end_matches(';');
    let values = quoted
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| SourceError::malformed("sina value is not a quoted string"))?;

    if values.trim().is_empty() {
        return Err(SourceError::empty(format!(
            "sina has no data for {}",
            requested.prefixed()
        )));
    }

    let fields = values.split(',').collect::<Vec<_>>();
    if fields.len() < MIN_FIELDS {
        return Err(SourceError::malformed(format!(
            "sina line has {} fields, expected at least {MIN_FIELDS}",
            fields.len()
        )));
    }

    let current = price(fields[3], "current")?;
    if current.is_none() {
        return Err(SourceError::empty(format!(
            "sina has no trade price for {}",
            requested.prefixed()
        )));
    }

    let name = Some(fields[0].trim().to_owned()).filter(|name| !name.is_empty());
    Ok(SinaLine {
        code,
        name,
        open: price(fields[1], "open")?,
        prev_close: price(fields[2], "prev_close")?,
        current,
        high: price(fields[4], "high")?,
        low: price(fields[5], "low")?,
        volume: number(fields[8], "volume")?,
        amount: number(fields[9], "amount")?,
    })
}

/// Like [`number`], but a zero price means "not traded".
fn price(raw: &str, field: &str) -> Result<Option<f64>, SourceError> {
    Ok(number(raw, field)?.filter(|value| *value > 0.0))
}

fn number(raw: &str, field: &str) -> Result<Option<f64>, SourceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| {
            SourceError::malformed(format!("sina field {field} is not a number: '{trimmed}'"))
        })
}
