use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{fetch_text, parse_json};
use crate::data_source::{
    BreadthRecord, CapabilitySet, DataSource, Endpoint, IndexRecord, QuoteRecord, SectorRecord,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::Throttle;
use crate::{InstrumentCode, ProviderId};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Global-markets fallback built on the v8 chart endpoint.
///
/// Mainland codes map to `{digits}.SS` / `{digits}.SZ` tickers. The chart
/// endpoint does not need the cookie/crumb handshake of the quote API.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    throttle: Throttle,
    base_url: String,
    timeout: Duration,
}

impl Default for YahooAdapter {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            throttle: Throttle::from_policy(&ProviderPolicy::yahoo_default()),
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

    async fn fetch_chart(&self, code: &InstrumentCode) -> Result<ChartSnapshot, SourceError> {
        let ticker = code.global_ticker();
        let endpoint = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url,
            urlencoding::encode(&ticker)
        );
        let request = HttpRequest::get(endpoint)
            .with_header("referer", "https://finance.yahoo.com/")
            .with_timeout(self.timeout);

        let body = fetch_text(
            ProviderId::Yahoo,
            &self.throttle,
            self.http_client.as_ref(),
            request,
        )
        .await?;

        let chart_response: YahooChartResponse = parse_json(ProviderId::Yahoo, &body)?;

        if let Some(error) = chart_response.chart.error {
            return Err(SourceError::empty(format!(
                "yahoo chart error for {ticker}: {} {}",
                error.code.unwrap_or_default(),
                error.description.unwrap_or_default()
            )));
        }

        let result = chart_response
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::empty(format!("yahoo returned no chart for {ticker}")))?;

        let reported = match result.meta.symbol.as_deref() {
            Some(symbol) => InstrumentCode::parse(symbol).map_err(|e| {
                SourceError::malformed(format!("yahoo reported invalid symbol: {e}"))
            })?,
            None => code.clone(),
        };

        let open = result
            .indicators
            .and_then(|indicators| indicators.quote.into_iter().next())
            .and_then(|quote| quote.open.into_iter().flatten().next());

        Ok(ChartSnapshot {
            code: reported,
            name: result.meta.short_name.or(result.meta.long_name),
            current: result.meta.regular_market_price,
            prev_close: result
                .meta
                .chart_previous_close
                .or(result.meta.previous_close),
            open,
            high: result.meta.regular_market_day_high,
            low: result.meta.regular_market_day_low,
            volume: result.meta.regular_market_volume,
        })
    }

    async fn fetch_index(&self, code: &InstrumentCode) -> Result<IndexRecord, SourceError> {
        let chart = self.fetch_chart(code).await?;
        Ok(IndexRecord {
            name: chart.name,
            current: chart.current,
            open: chart.open,
            high: chart.high,
            low: chart.low,
            prev_close: chart.prev_close,
            volume: chart.volume,
            ..IndexRecord::new(chart.code)
        })
    }

    async fn fetch_quote(&self, code: &InstrumentCode) -> Result<QuoteRecord, SourceError> {
        let chart = self.fetch_chart(code).await?;
        let change_amount = match (chart.current, chart.prev_close) {
            (Some(current), Some(prev_close)) => Some(current - prev_close),
            _ => None,
        };
        let change_rate = match (change_amount, chart.prev_close) {
            (Some(change), Some(prev_close)) if prev_close > 0.0 => {
                Some(change / prev_close * 100.0)
            }
            _ => None,
        };

        Ok(QuoteRecord {
            close: chart.current,
            open: chart.open,
            high: chart.high,
            low: chart.low,
            change_rate,
            change_amount,
            volume: chart.volume,
            ..QuoteRecord::new(chart.code)
        })
    }
}

impl DataSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
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

struct ChartSnapshot {
    code: InstrumentCode,
    name: Option<String>,
    current: Option<f64>,
    prev_close: Option<f64>,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    volume: Option<f64>,
}

// Yahoo Finance chart response structures
#[derive(Debug, Clone, Deserialize)]
struct YahooChartResponse {
    chart: YahooChartData,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartData {
    #[serde(default)]
    result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    error: Option<YahooChartError>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartResult {
    meta: YahooChartMeta,
    #[serde(default)]
    indicators: Option<YahooChartIndicators>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooChartMeta {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    regular_market_price: Option<f64>,
    #[serde(default)]
    chart_previous_close: Option<f64>,
    #[serde(default)]
    previous_close: Option<f64>,
    #[serde(default)]
    regular_market_day_high: Option<f64>,
    #[serde(default)]
    regular_market_day_low: Option<f64>,
    #[serde(default)]
    regular_market_volume: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartIndicators {
    #[serde(default)]
    quote: Vec<YahooChartQuote>,
}

#[derive(Debug, Clone, Deserialize)]
struct YahooChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
}
