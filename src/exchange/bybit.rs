use serde_json::Value;

use crate::types::{Candle, CandleInterval};

use super::{request_with_retry, CandleClient, ClientError, UpstreamRequest};

const PAGE_LIMIT: usize = 1000;

/// Bybit's kline interval dialect. 8h and 3d have no upstream equivalent.
fn interval_code(interval: CandleInterval) -> Option<&'static str> {
    match interval {
        CandleInterval::M1 => Some("1"),
        CandleInterval::M3 => Some("3"),
        CandleInterval::M5 => Some("5"),
        CandleInterval::M15 => Some("15"),
        CandleInterval::M30 => Some("30"),
        CandleInterval::H1 => Some("60"),
        CandleInterval::H2 => Some("120"),
        CandleInterval::H4 => Some("240"),
        CandleInterval::H12 => Some("720"),
        CandleInterval::D1 => Some("D"),
        CandleInterval::W1 => Some("W"),
        CandleInterval::Mo1 => Some("M"),
        CandleInterval::H8 | CandleInterval::D3 => None,
    }
}

/// Newest-first API: descending cursor from `end_ms`, each page reversed to
/// oldest-first before appending.
pub(crate) async fn fetch(
    client: &CandleClient,
    coin: &str,
    interval: CandleInterval,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<Candle>, ClientError> {
    let code = interval_code(interval).ok_or_else(|| ClientError::UnsupportedInterval {
        exchange: "bybit".to_string(),
        interval: interval.to_string(),
    })?;
    let symbol = format!("{}USDT", coin.to_uppercase());

    let mut all = Vec::new();
    let mut current_end = end_ms;
    let mut first_page = true;

    while current_end >= start_ms {
        if !first_page {
            tokio::time::sleep(client.page_delay()).await;
        }
        first_page = false;

        let url = format!(
            "{}/v5/market/kline?category=linear&symbol={}&interval={}&start={}&end={}&limit={}",
            client.base_url(),
            symbol,
            code,
            start_ms,
            current_end,
            PAGE_LIMIT
        );
        let resp = request_with_retry(client.transport.as_ref(), &UpstreamRequest::Get(url)).await?;

        let json: Value = serde_json::from_str(&resp.body)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        let ret_code = json.get("retCode").and_then(|v| v.as_i64()).unwrap_or(0);
        if ret_code != 0 {
            let msg = json.get("retMsg").and_then(|v| v.as_str()).unwrap_or("unknown");
            return Err(ClientError::Malformed(format!("retCode {}: {}", ret_code, msg)));
        }
        let list = json
            .pointer("/result/list")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ClientError::Malformed("missing result.list".to_string()))?;

        if list.is_empty() {
            break;
        }

        let page_len = list.len();
        let mut page: Vec<Candle> = list.iter().map(parse_row).collect::<Result<_, _>>()?;
        page.reverse();
        let oldest = page.first().map(|c| c.t).unwrap_or(start_ms);
        all.extend(page);

        if page_len < PAGE_LIMIT {
            break;
        }
        current_end = oldest - 1;
    }

    Ok(all)
}

/// Row shape: `[start_ms_str, open, high, low, close, volume, turnover]`,
/// every field string-encoded.
fn parse_row(row: &Value) -> Result<Candle, ClientError> {
    let arr = row
        .as_array()
        .ok_or_else(|| ClientError::Malformed("kline row is not an array".to_string()))?;
    let field = |i: usize| -> Result<f64, ClientError> {
        arr.get(i)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| ClientError::Malformed(format!("bad kline field {}", i)))
    };
    let t = arr
        .first()
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ClientError::Malformed("bad kline timestamp".to_string()))?;

    Ok(Candle {
        t,
        o: field(1)?,
        h: field(2)?,
        l: field(3)?,
        c: field(4)?,
        v: field(5)?,
        n: 0,
    })
}
