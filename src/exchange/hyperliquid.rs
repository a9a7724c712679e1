use serde::Deserialize;

use crate::types::{Candle, CandleInterval};

use super::{request_with_retry, CandleClient, ClientError, UpstreamRequest};

const PAGE_LIMIT: usize = 5000;

/// Hyperliquid speaks the canonical interval names directly.
fn interval_code(interval: CandleInterval) -> &'static str {
    interval.as_str()
}

/// Candle row: ms timestamps, string-encoded numerics, trade count present.
#[derive(Debug, Deserialize)]
struct HlCandle {
    t: i64,
    o: String,
    h: String,
    l: String,
    c: String,
    v: String,
    #[serde(default)]
    n: u64,
}

impl HlCandle {
    fn into_candle(self) -> Result<Candle, ClientError> {
        let parse = |s: &str, name: &str| -> Result<f64, ClientError> {
            s.parse::<f64>()
                .map_err(|_| ClientError::Malformed(format!("bad {} value {:?}", name, s)))
        };
        Ok(Candle {
            t: self.t,
            o: parse(&self.o, "open")?,
            h: parse(&self.h, "high")?,
            l: parse(&self.l, "low")?,
            c: parse(&self.c, "close")?,
            v: parse(&self.v, "volume")?,
            n: self.n,
        })
    }
}

/// Ascending cursor: fetch forward from `start_ms`, advancing past the last
/// bar of each page; stop on a short or empty page or once the cursor passes
/// `end_ms`.
pub(crate) async fn fetch(
    client: &CandleClient,
    coin: &str,
    interval: CandleInterval,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<Candle>, ClientError> {
    let url = format!("{}/info", client.base_url());
    let mut all = Vec::new();
    let mut current_start = start_ms;
    let mut first_page = true;

    while current_start <= end_ms {
        if !first_page {
            tokio::time::sleep(client.page_delay()).await;
        }
        first_page = false;

        let body = serde_json::json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval_code(interval),
                "startTime": current_start,
                "endTime": end_ms,
            }
        });
        let resp =
            request_with_retry(client.transport.as_ref(), &UpstreamRequest::PostJson(url.clone(), body))
                .await?;

        let rows: Vec<HlCandle> = serde_json::from_str(&resp.body)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        if rows.is_empty() {
            break;
        }

        let page_len = rows.len();
        let page: Vec<Candle> =
            rows.into_iter().map(HlCandle::into_candle).collect::<Result<_, _>>()?;
        let last_t = page.last().map(|c| c.t).unwrap_or(end_ms);
        all.extend(page);

        if page_len < PAGE_LIMIT {
            break;
        }
        current_start = last_t + 1;
    }

    Ok(all)
}
