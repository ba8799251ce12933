//! Provider adapters.
//!
//! | Adapter | Provider | Endpoints |
//! |---------|----------|-----------|
//! | [`EastmoneyAdapter`] | `push2.eastmoney.com` | index, quote, breadth, sectors |
//! | [`SinaAdapter`] | `hq.sinajs.cn` | index, quote |
//! | [`YahooAdapter`] | `query1.finance.yahoo.com` | index, quote |
//!
//! Every adapter funnels its network calls through [`fetch_text`], which
//! holds the adapter's throttle permit for the whole call, bounds the call
//! with the configured timeout and maps HTTP status codes onto
//! [`SourceError`] kinds.

mod eastmoney;
mod sina;
mod yahoo;

pub use eastmoney::EastmoneyAdapter;
pub use sina::SinaAdapter;
pub use yahoo::YahooAdapter;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::data_source::SourceError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::throttling::Throttle;
use crate::ProviderId;

/// Issues one throttled, time-bounded GET and returns the body of a 2xx reply.
pub(crate) async fn fetch_text(
    provider: ProviderId,
    throttle: &Throttle,
    http_client: &dyn HttpClient,
    request: HttpRequest,
) -> Result<String, SourceError> {
    let _permit = throttle.acquire().await;

    let timeout = request.timeout();
    debug!(provider = provider.as_str(), url = %request.url, "calling provider");

    let response = match tokio::time::timeout(timeout, http_client.execute(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(error)) if error.is_timeout() => {
            return Err(SourceError::transient(format!(
                "{provider} request timed out: {}",
                error.message()
            )));
        }
        Ok(Err(error)) => {
            return Err(SourceError::transient(format!(
                "{provider} transport error: {}",
                error.message()
            )));
        }
        Err(_) => {
            return Err(SourceError::transient(format!(
                "{provider} call exceeded {} ms",
                timeout.as_millis()
            )));
        }
    };

    classify_status(provider, &response)?;
    Ok(response.body)
}

fn classify_status(provider: ProviderId, response: &HttpResponse) -> Result<(), SourceError> {
    if response.is_success() {
        return Ok(());
    }

    let status = response.status;
    Err(match status {
        429 => SourceError::rate_limited(format!("{provider} returned status 429")),
        408 | 500..=599 => SourceError::transient(format!("{provider} returned status {status}")),
        404 => SourceError::empty(format!("{provider} returned status 404")),
        _ => SourceError::invalid_request(format!("{provider} returned status {status}")),
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    provider: ProviderId,
    body: &str,
) -> Result<T, SourceError> {
    serde_json::from_str(body)
        .map_err(|e| SourceError::malformed(format!("failed to parse {provider} payload: {e}")))
}
