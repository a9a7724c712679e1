pub mod bybit;
pub mod coinbase;
pub mod hyperliquid;
pub mod transport;

pub use transport::{HttpResponse, HttpTransport, Transport};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Candle, CandleInterval};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited after retries")]
    RateLimited,
    #[error("network error: {0}")]
    Network(String),
    #[error("{exchange} does not support interval {interval}")]
    UnsupportedInterval { exchange: String, interval: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Upstream candle source. One dispatch point at `fetch_candles`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Bybit,
    Hyperliquid,
    Coinbase,
    CoinbasePerp,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Bybit => "bybit",
            DataSource::Hyperliquid => "hyperliquid",
            DataSource::Coinbase => "coinbase",
            DataSource::CoinbasePerp => "coinbase_perp",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bybit" => Some(DataSource::Bybit),
            "hyperliquid" => Some(DataSource::Hyperliquid),
            "coinbase" => Some(DataSource::Coinbase),
            "coinbase_perp" => Some(DataSource::CoinbasePerp),
            _ => None,
        }
    }

    /// Default pause between paginated requests.
    pub fn inter_request_delay(&self) -> Duration {
        match self {
            DataSource::Bybit => Duration::from_millis(200),
            DataSource::Hyperliquid => Duration::from_millis(250),
            DataSource::Coinbase | DataSource::CoinbasePerp => Duration::from_millis(300),
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            DataSource::Bybit => "https://api.bybit.com",
            DataSource::Hyperliquid => "https://api.hyperliquid.xyz",
            DataSource::Coinbase | DataSource::CoinbasePerp => {
                "https://api.exchange.coinbase.com"
            }
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-call client knobs; None falls back to per-source defaults.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub base_url: Option<String>,
    pub inter_request_delay: Option<Duration>,
}

/// The normalized fetcher contract: bars sorted ascending by `t`, deduped
/// on `t`.
#[async_trait]
pub trait CandleFetcher: Send + Sync {
    async fn fetch_candles(
        &self,
        coin: &str,
        interval: CandleInterval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, ClientError>;
}

/// A source adapter bound to a transport.
pub struct CandleClient {
    source: DataSource,
    transport: Arc<dyn Transport>,
    opts: ClientOptions,
}

impl CandleClient {
    pub fn new(source: DataSource, opts: ClientOptions) -> Self {
        Self { source, transport: Arc::new(HttpTransport::new()), opts }
    }

    pub fn with_transport(
        source: DataSource,
        transport: Arc<dyn Transport>,
        opts: ClientOptions,
    ) -> Self {
        Self { source, transport, opts }
    }

    pub fn source(&self) -> DataSource {
        self.source
    }

    pub(crate) fn base_url(&self) -> String {
        self.opts
            .base_url
            .clone()
            .unwrap_or_else(|| self.source.default_base_url().to_string())
    }

    pub(crate) fn page_delay(&self) -> Duration {
        self.opts
            .inter_request_delay
            .unwrap_or_else(|| self.source.inter_request_delay())
    }
}

#[async_trait]
impl CandleFetcher for CandleClient {
    async fn fetch_candles(
        &self,
        coin: &str,
        interval: CandleInterval,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, ClientError> {
        debug!(source = %self.source, coin, %interval, start_ms, end_ms, "fetching candles");
        let mut candles = match self.source {
            DataSource::Bybit => bybit::fetch(self, coin, interval, start_ms, end_ms).await?,
            DataSource::Hyperliquid => {
                hyperliquid::fetch(self, coin, interval, start_ms, end_ms).await?
            }
            DataSource::Coinbase => {
                coinbase::fetch(self, coin, interval, start_ms, end_ms, false).await?
            }
            DataSource::CoinbasePerp => {
                coinbase::fetch(self, coin, interval, start_ms, end_ms, true).await?
            }
        };

        candles.retain(|c| c.t >= start_ms && c.t <= end_ms);
        candles.sort_by_key(|c| c.t);
        candles.dedup_by_key(|c| c.t);
        debug!(source = %self.source, coin, count = candles.len(), "fetch complete");
        Ok(candles)
    }
}

pub(crate) enum UpstreamRequest {
    Get(String),
    PostJson(String, serde_json::Value),
}

const MAX_RETRIES: u32 = 3;
const BACKOFF_STEP: Duration = Duration::from_secs(2);

/// Sends one request with the shared rate-limit policy: HTTP 429 or a
/// body-level "rate limit" marker retries up to 3 times with 2s/4s/6s linear
/// backoff; any other HTTP error fails fast.
pub(crate) async fn request_with_retry(
    transport: &dyn Transport,
    request: &UpstreamRequest,
) -> Result<HttpResponse, ClientError> {
    let mut attempt: u32 = 0;
    loop {
        let resp = match request {
            UpstreamRequest::Get(url) => transport.get(url).await?,
            UpstreamRequest::PostJson(url, body) => transport.post_json(url, body.clone()).await?,
        };

        let rate_limited =
            resp.status == 429 || resp.body.to_ascii_lowercase().contains("rate limit");
        if rate_limited {
            attempt += 1;
            if attempt > MAX_RETRIES {
                return Err(ClientError::RateLimited);
            }
            let delay = BACKOFF_STEP * attempt;
            warn!(attempt, delay_s = delay.as_secs(), "rate limited, backing off");
            tokio::time::sleep(delay).await;
            continue;
        }

        if resp.status >= 400 {
            return Err(ClientError::Http { status: resp.status, body: resp.body });
        }
        return Ok(resp);
    }
}

#[cfg(test)]
mod tests {
    use super::transport::MockTransport;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ok_body(body: &str) -> HttpResponse {
        HttpResponse { status: 200, body: body.to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_on_429_with_linear_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_mock = Arc::clone(&calls);

        let mut mock = MockTransport::new();
        mock.expect_get().returning(move |_| {
            let n = calls_in_mock.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(HttpResponse { status: 429, body: "slow down".to_string() })
            } else {
                Ok(ok_body("{\"ok\":true}"))
            }
        });

        let started = tokio::time::Instant::now();
        let resp = request_with_retry(&mock, &UpstreamRequest::Get("http://x".to_string()))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(resp.status, 200);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two backoffs: 2s then 4s.
        assert!(elapsed >= Duration::from_secs(6), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(6_500), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_retries() {
        let mut mock = MockTransport::new();
        mock.expect_get()
            .times(4)
            .returning(|_| Ok(HttpResponse { status: 429, body: String::new() }));

        let err = request_with_retry(&mock, &UpstreamRequest::Get("http://x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::RateLimited));
    }

    #[tokio::test]
    async fn body_level_rate_limit_marker_triggers_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_mock = Arc::clone(&calls);

        let mut mock = MockTransport::new();
        mock.expect_get().returning(move |_| {
            let n = calls_in_mock.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(ok_body("{\"retCode\":10006,\"retMsg\":\"Rate limit exceeded\"}"))
            } else {
                Ok(ok_body("[]"))
            }
        });

        tokio::time::pause();
        let resp = request_with_retry(&mock, &UpstreamRequest::Get("http://x".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.body, "[]");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_rate_limit_http_errors_fail_fast() {
        let mut mock = MockTransport::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Ok(HttpResponse { status: 500, body: "boom".to_string() }));

        let err = request_with_retry(&mock, &UpstreamRequest::Get("http://x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Http { status: 500, .. }));
    }

    #[test]
    fn data_source_roundtrip() {
        for source in [
            DataSource::Bybit,
            DataSource::Hyperliquid,
            DataSource::Coinbase,
            DataSource::CoinbasePerp,
        ] {
            assert_eq!(DataSource::from_str(source.as_str()), Some(source));
        }
        assert_eq!(DataSource::from_str("kraken"), None);
    }
}
