//! Contract tests run against every production adapter.
//!
//! Adapters talk to a fixture HTTP client, so these tests pin down how each
//! provider's wire format maps onto provider records and source errors
//! without touching the network.

use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tickfuse_core::http_client::HttpFuture;
use tickfuse_core::{
    CapabilitySet, DataSource, EastmoneyAdapter, HttpClient, HttpError, HttpRequest, HttpResponse,
    IndexKey, InstrumentCode, Provenance, ProviderId, ResolverConfig, SinaAdapter, SourceErrorKind,
    SourceResolverBuilder, Throttle, YahooAdapter,
};
use tokio::time::Instant;

/// Answers by URL substring and records each request with its time.
#[derive(Default)]
struct FixtureHttpClient {
    routes: Vec<(String, u16, String)>,
    requests: Mutex<Vec<(String, Instant)>>,
}

impl FixtureHttpClient {
    fn route(mut self, url_part: &str, status: u16, body: &str) -> Self {
        self.routes.push((url_part.to_owned(), status, body.to_owned()));
        self
    }

    fn requests(&self) -> Vec<(String, Instant)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.requests
            .lock()
            .expect("requests lock")
            .push((request.url.clone(), Instant::now()));
        let response = self
            .routes
            .iter()
            .find(|(url_part, _, _)| request.url.contains(url_part.as_str()))
            .map(|(_, status, body)| Ok(HttpResponse::with_status(*status, body.clone())))
            .unwrap_or_else(|| Err(HttpError::new(format!("no fixture for {}", request.url))));
        Box::pin(async move { response })
    }
}

/// Never answers.
struct StalledHttpClient;

impl HttpClient for StalledHttpClient {
    fn execute<'a>(&'a self, _request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(pending())
    }
}

fn code(value: &str) -> InstrumentCode {
    InstrumentCode::parse(value).expect("valid code")
}

fn open_throttle(provider: ProviderId) -> Throttle {
    Throttle::new(provider, Duration::ZERO, Duration::from_secs(60), 100)
}

fn adapters(client: Arc<dyn HttpClient>) -> Vec<Arc<dyn DataSource>> {
    vec![
        Arc::new(
            EastmoneyAdapter::new(Arc::clone(&client))
                .with_throttle(open_throttle(ProviderId::Eastmoney)),
        ),
        Arc::new(
            SinaAdapter::new(Arc::clone(&client)).with_throttle(open_throttle(ProviderId::Sina)),
        ),
        Arc::new(YahooAdapter::new(client).with_throttle(open_throttle(ProviderId::Yahoo))),
    ]
}

const EASTMONEY_INDEX: &str =
    r#"{"rc":0,"data":{"f43":3050.12,"f47":0.85,"f57":"000001","f58":"上证指数"}}"#;
const SINA_INDEX: &str =
    "var hq_str_sh000001=\"上证指数,3040.000,3038.200,3050.120,3061.800,3030.400,0,0,312345678,401234567890,0,0,2024-03-05,15:30:39,00,\";";
const YAHOO_INDEX: &str =
    r#"{"chart":{"result":[{"meta":{"symbol":"000001.SS","regularMarketPrice":3050.12,"chartPreviousClose":3038.2},"indicators":{"quote":[{"open":[3040.0]}]}}],"error":null}}"#;

fn index_fixtures() -> FixtureHttpClient {
    FixtureHttpClient::default()
        .route("push2.eastmoney.com", 200, EASTMONEY_INDEX)
        .route("hq.sinajs.cn", 200, SINA_INDEX)
        .route("query1.finance.yahoo.com", 200, YAHOO_INDEX)
}

// =============================================================================
// Identity and capabilities
// =============================================================================

#[test]
fn adapters_report_identity_and_capabilities() {
    let expected = [
        (ProviderId::Eastmoney, CapabilitySet::full()),
        (ProviderId::Sina, CapabilitySet::quotes_only()),
        (ProviderId::Yahoo, CapabilitySet::quotes_only()),
    ];

    for (adapter, (id, capabilities)) in adapters(Arc::new(FixtureHttpClient::default()))
        .iter()
        .zip(expected)
    {
        assert_eq!(adapter.id(), id);
        assert_eq!(adapter.capabilities(), capabilities, "provider '{id}'");
    }
}

#[tokio::test]
async fn every_adapter_returns_the_requested_index() {
    let requested = code("sh000001");

    for adapter in adapters(Arc::new(index_fixtures())) {
        let record = adapter
            .index_snapshot(&requested)
            .await
            .unwrap_or_else(|error| panic!("provider '{}' index failed: {error}", adapter.id()));

        assert_eq!(record.code, requested, "provider '{}': code", adapter.id());
        assert_eq!(
            record.current,
            Some(3050.12),
            "provider '{}': current",
            adapter.id()
        );
        assert!(record.has_measurements());
    }
}

#[tokio::test]
async fn quotes_only_adapters_refuse_breadth_and_sectors_without_network() {
    let client = Arc::new(FixtureHttpClient::default());

    for adapter in adapters(client.clone()).into_iter().skip(1) {
        let breadth = adapter.market_breadth().await.expect_err("unsupported");
        assert_eq!(breadth.kind(), SourceErrorKind::UnsupportedEndpoint);
        let sectors = adapter.sector_rankings().await.expect_err("unsupported");
        assert_eq!(sectors.kind(), SourceErrorKind::UnsupportedEndpoint);
    }
    assert!(client.requests().is_empty());
}

// =============================================================================
// Payload mapping
// =============================================================================

#[tokio::test]
async fn eastmoney_quote_converts_market_cap_to_hundred_millions() {
    let client = Arc::new(FixtureHttpClient::default().route(
        "/api/qt/stock/get",
        200,
        r#"{"rc":0,"data":{"f43":1683.0,"f44":1670.0,"f45":1690.0,"f46":1660.0,"f47":2.0,"f48":33.0,"f51":32000.0,"f57":"600519","f168":2114000000000.0}}"#,
    ));
    let adapter =
        EastmoneyAdapter::new(client).with_throttle(open_throttle(ProviderId::Eastmoney));

    let record = adapter.quote(&code("sh600519")).await.expect("quote parses");

    assert_eq!(record.code, code("sh600519"));
    assert_eq!(record.close, Some(1683.0));
    assert_eq!(record.market_cap, Some(21_140.0));
}

#[tokio::test]
async fn eastmoney_placeholder_dash_is_absent_not_an_error() {
    let client = Arc::new(FixtureHttpClient::default().route(
        "/api/qt/stock/get",
        200,
        r#"{"rc":0,"data":{"f43":"-","f44":"-","f45":"-","f46":"-","f47":"-","f48":"-","f51":0,"f57":"600519","f168":"-"}}"#,
    ));
    let adapter =
        EastmoneyAdapter::new(client).with_throttle(open_throttle(ProviderId::Eastmoney));

    let record = adapter.quote(&code("sh600519")).await.expect("quote parses");

    assert_eq!(record.close, None);
    assert_eq!(record.market_cap, None);
    assert_eq!(record.volume, Some(0.0));
}

#[tokio::test]
async fn eastmoney_breadth_sums_both_exchanges() {
    let client = Arc::new(FixtureHttpClient::default().route(
        "/api/qt/ulist.np/get",
        200,
        r#"{"rc":0,"data":{"total":2,"diff":[
            {"f6":401234567890.0,"f104":1500,"f105":700,"f106":90},
            {"f6":501234567890.0,"f104":1620,"f105":950,"f106":120}
        ]}}"#,
    ));
    let adapter =
        EastmoneyAdapter::new(client).with_throttle(open_throttle(ProviderId::Eastmoney));

    let record = adapter.market_breadth().await.expect("breadth parses");

    assert_eq!(record.up_count, Some(3120));
    assert_eq!(record.down_count, Some(1650));
    assert_eq!(record.flat_count, Some(210));
    assert_eq!(record.total_amount, Some(902_469_135_780.0));
}

#[tokio::test]
async fn null_data_and_empty_lines_are_empty_results() {
    let client: Arc<dyn HttpClient> = Arc::new(
        FixtureHttpClient::default()
            .route("push2.eastmoney.com", 200, r#"{"rc":0,"data":null}"#)
            .route("hq.sinajs.cn", 200, "var hq_str_sh000001=\"\";")
            .route(
                "query1.finance.yahoo.com",
                200,
                r#"{"chart":{"result":[],"error":null}}"#,
            ),
    );

    for adapter in adapters(client) {
        let error = adapter
            .index_snapshot(&code("sh000001"))
            .await
            .expect_err("no data must fail");
        assert_eq!(
            error.kind(),
            SourceErrorKind::EmptyResult,
            "provider '{}'",
            adapter.id()
        );
        assert!(!error.retryable());
    }
}

#[tokio::test]
async fn undecodable_bodies_are_malformed() {
    let client: Arc<dyn HttpClient> = Arc::new(
        FixtureHttpClient::default()
            .route("push2.eastmoney.com", 200, r#"{"rc":0,"data":{"f43":true}}"#)
            .route("hq.sinajs.cn", 200, "<html>blocked</html>")
            .route("query1.finance.yahoo.com", 200, "not json"),
    );

    for adapter in adapters(client) {
        let error = adapter
            .index_snapshot(&code("sh000001"))
            .await
            .expect_err("garbage must fail");
        assert_eq!(
            error.kind(),
            SourceErrorKind::MalformedPayload,
            "provider '{}'",
            adapter.id()
        );
    }
}

#[tokio::test]
async fn sina_suspended_row_is_empty_result() {
    let client = Arc::new(FixtureHttpClient::default().route(
        "hq.sinajs.cn",
        200,
        "var hq_str_sh600519=\"贵州茅台,0.000,1650.00,0.000,0.000,0.000,0.000,0.000,0,0.000,0,0,2024-03-05,09:20:00,00,\";",
    ));
    let adapter = SinaAdapter::new(client).with_throttle(open_throttle(ProviderId::Sina));

    let error = adapter
        .quote(&code("sh600519"))
        .await
        .expect_err("zero price must not be a quote");

    assert_eq!(error.kind(), SourceErrorKind::EmptyResult);
    assert!(!error.retryable());
}

// =============================================================================
// Default wiring
// =============================================================================

#[tokio::test(start_paused = true)]
async fn default_configuration_serves_indices_with_a_full_session_row() {
    // Given: Default adapters; eastmoney's index payload has point and change only
    let client = Arc::new(index_fixtures());
    let resolver = SourceResolverBuilder::new(ResolverConfig::default())
        .with_http_client(Arc::clone(&client) as Arc<dyn HttpClient>)
        .build()
        .expect("default config is valid");
    let key = IndexKey::parse("sh000001", "上证指数").expect("valid key");

    // When
    let resolution = resolver.resolve_index(&key, None).await;

    // Then: The first source answers with the session range and previous close
    let snapshot = &resolution.record;
    assert_eq!(resolution.provenance, Provenance::Provider(ProviderId::Sina));
    assert!(!resolution.used_fallback());
    assert!(!snapshot.degraded);
    assert_eq!(snapshot.open, 3040.0);
    assert_eq!(snapshot.high, 3061.8);
    assert_eq!(snapshot.low, 3030.4);
    assert_eq!(snapshot.prev_close, 3038.2);
    assert!(snapshot.amplitude.is_some_and(|amplitude| amplitude > 0.0));
    assert!(client
        .requests()
        .iter()
        .all(|(url, _)| url.contains("hq.sinajs.cn")));
}

// =============================================================================
// Transport behavior
// =============================================================================

#[tokio::test]
async fn http_status_codes_map_onto_error_kinds() {
    let cases = [
        (429, SourceErrorKind::RateLimited, true),
        (503, SourceErrorKind::Transient, true),
        (408, SourceErrorKind::Transient, true),
        (404, SourceErrorKind::EmptyResult, false),
        (403, SourceErrorKind::InvalidRequest, false),
    ];

    for (status, kind, retryable) in cases {
        let client = Arc::new(FixtureHttpClient::default().route("hq.sinajs.cn", status, ""));
        let adapter = SinaAdapter::new(client).with_throttle(open_throttle(ProviderId::Sina));

        let error = adapter
            .index_snapshot(&code("sh000001"))
            .await
            .expect_err("non-2xx must fail");
        assert_eq!(error.kind(), kind, "status {status}");
        assert_eq!(error.retryable(), retryable, "status {status}");
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_call_times_out_as_transient() {
    let adapter = YahooAdapter::new(Arc::new(StalledHttpClient))
        .with_throttle(open_throttle(ProviderId::Yahoo))
        .with_timeout(Duration::from_secs(2));
    let started = Instant::now();

    let error = adapter
        .index_snapshot(&code("sh000001"))
        .await
        .expect_err("stalled call must time out");

    assert_eq!(error.kind(), SourceErrorKind::Transient);
    assert!(error.retryable());
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn default_throttle_delays_every_call() {
    // Given: A sina adapter with its default 500 ms politeness delay
    let client = Arc::new(FixtureHttpClient::default().route("hq.sinajs.cn", 200, SINA_INDEX));
    let adapter = SinaAdapter::new(client.clone());
    let started = Instant::now();

    // When: Two calls are made back to back
    for _ in 0..2 {
        adapter
            .index_snapshot(&code("sh000001"))
            .await
            .expect("index parses");
    }

    // Then: Each request went out only after the delay
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].1 - started >= Duration::from_millis(500));
    assert!(requests[1].1 - requests[0].1 >= Duration::from_millis(500));
}
