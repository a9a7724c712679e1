use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::types::{Candle, CandleInterval};

use super::{request_with_retry, CandleClient, ClientError, UpstreamRequest};

const MAX_CANDLES_PER_PAGE: i64 = 300;

/// Coinbase granularities are a fixed set of seconds.
fn granularity_secs(interval: CandleInterval) -> Option<i64> {
    match interval {
        CandleInterval::M1 => Some(60),
        CandleInterval::M5 => Some(300),
        CandleInterval::M15 => Some(900),
        CandleInterval::H1 => Some(3600),
        CandleInterval::D1 => Some(86400),
        _ => None,
    }
}

fn product_id(coin: &str, perp: bool) -> String {
    if perp {
        format!("{}-PERP-INTX", coin.to_uppercase())
    } else {
        format!("{}-USD", coin.to_uppercase())
    }
}

fn iso(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Fixed-window batching: at most 300 candles per request, windows walked
/// forward from `start_ms`.
pub(crate) async fn fetch(
    client: &CandleClient,
    coin: &str,
    interval: CandleInterval,
    start_ms: i64,
    end_ms: i64,
    perp: bool,
) -> Result<Vec<Candle>, ClientError> {
    let source = if perp { "coinbase_perp" } else { "coinbase" };
    let granularity = granularity_secs(interval).ok_or_else(|| ClientError::UnsupportedInterval {
        exchange: source.to_string(),
        interval: interval.to_string(),
    })?;
    let product = product_id(coin, perp);
    let window_ms = MAX_CANDLES_PER_PAGE * interval.millis();

    let mut all = Vec::new();
    let mut current_start = start_ms;
    let mut first_page = true;

    while current_start <= end_ms {
        if !first_page {
            tokio::time::sleep(client.page_delay()).await;
        }
        first_page = false;

        let window_end = (current_start + window_ms).min(end_ms);
        let url = format!(
            "{}/products/{}/candles?granularity={}&start={}&end={}",
            client.base_url(),
            product,
            granularity,
            iso(current_start),
            iso(window_end)
        );
        let resp = request_with_retry(client.transport.as_ref(), &UpstreamRequest::Get(url)).await?;

        let rows: Vec<Value> = serde_json::from_str(&resp.body)
            .map_err(|e| ClientError::Malformed(e.to_string()))?;
        for row in &rows {
            all.push(parse_row(row)?);
        }

        current_start = window_end + interval.millis();
    }

    Ok(all)
}

/// Row shape: `[time_seconds, low, high, open, close, volume]`. Seconds are
/// promoted to milliseconds.
fn parse_row(row: &Value) -> Result<Candle, ClientError> {
    let arr = row
        .as_array()
        .ok_or_else(|| ClientError::Malformed("candle row is not an array".to_string()))?;
    let num = |i: usize| -> Result<f64, ClientError> {
        arr.get(i)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ClientError::Malformed(format!("bad candle field {}", i)))
    };
    let t_secs = arr
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ClientError::Malformed("bad candle timestamp".to_string()))?;

    Ok(Candle {
        t: t_secs * 1000,
        l: num(1)?,
        h: num(2)?,
        o: num(3)?,
        c: num(4)?,
        v: num(5)?,
        n: 0,
    })
}
