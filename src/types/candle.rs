#![allow(dead_code)]
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable OHLCV bar. Timestamp is milliseconds since epoch, aligned to the
/// start of its interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: i64,
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
    /// Trade count; 0 when the source omits it.
    pub n: u64,
}

impl Candle {
    pub fn open_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.t).single().unwrap_or_default()
    }

    pub fn body_size(&self) -> f64 {
        (self.c - self.o).abs()
    }

    pub fn range(&self) -> f64 {
        self.h - self.l
    }

    pub fn is_bullish(&self) -> bool {
        self.c > self.o
    }

    pub fn is_bearish(&self) -> bool {
        self.c < self.o
    }

    /// Price invariants: low is the floor, high the ceiling.
    pub fn is_valid(&self) -> bool {
        self.l <= self.o
            && self.l <= self.c
            && self.o <= self.h
            && self.c <= self.h
            && self.h >= self.l
    }
}

/// The closed set of supported bar intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
    #[serde(rename = "1M")]
    Mo1,
}

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

impl CandleInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandleInterval::M1 => "1m",
            CandleInterval::M3 => "3m",
            CandleInterval::M5 => "5m",
            CandleInterval::M15 => "15m",
            CandleInterval::M30 => "30m",
            CandleInterval::H1 => "1h",
            CandleInterval::H2 => "2h",
            CandleInterval::H4 => "4h",
            CandleInterval::H8 => "8h",
            CandleInterval::H12 => "12h",
            CandleInterval::D1 => "1d",
            CandleInterval::D3 => "3d",
            CandleInterval::W1 => "1w",
            CandleInterval::Mo1 => "1M",
        }
    }

    /// Bar length in milliseconds. 1M is treated as 30 days for aggregation
    /// arithmetic.
    pub fn millis(&self) -> i64 {
        match self {
            CandleInterval::M1 => MINUTE_MS,
            CandleInterval::M3 => 3 * MINUTE_MS,
            CandleInterval::M5 => 5 * MINUTE_MS,
            CandleInterval::M15 => 15 * MINUTE_MS,
            CandleInterval::M30 => 30 * MINUTE_MS,
            CandleInterval::H1 => HOUR_MS,
            CandleInterval::H2 => 2 * HOUR_MS,
            CandleInterval::H4 => 4 * HOUR_MS,
            CandleInterval::H8 => 8 * HOUR_MS,
            CandleInterval::H12 => 12 * HOUR_MS,
            CandleInterval::D1 => DAY_MS,
            CandleInterval::D3 => 3 * DAY_MS,
            CandleInterval::W1 => 7 * DAY_MS,
            CandleInterval::Mo1 => 30 * DAY_MS,
        }
    }

    pub fn all() -> Vec<CandleInterval> {
        vec![
            CandleInterval::M1,
            CandleInterval::M3,
            CandleInterval::M5,
            CandleInterval::M15,
            CandleInterval::M30,
            CandleInterval::H1,
            CandleInterval::H2,
            CandleInterval::H4,
            CandleInterval::H8,
            CandleInterval::H12,
            CandleInterval::D1,
            CandleInterval::D3,
            CandleInterval::W1,
            CandleInterval::Mo1,
        ]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|i| i.as_str() == s)
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_roundtrip() {
        for interval in CandleInterval::all() {
            assert_eq!(CandleInterval::from_str(interval.as_str()), Some(interval));
        }
        assert_eq!(CandleInterval::from_str("7m"), None);
    }

    #[test]
    fn interval_millis() {
        assert_eq!(CandleInterval::M1.millis(), 60_000);
        assert_eq!(CandleInterval::H4.millis(), 4 * 3_600_000);
        assert_eq!(CandleInterval::W1.millis(), 7 * 86_400_000);
        assert_eq!(CandleInterval::Mo1.millis(), 30 * 86_400_000);
    }

    #[test]
    fn candle_validity() {
        let good = Candle { t: 0, o: 10.0, h: 12.0, l: 9.0, c: 11.0, v: 1.0, n: 5 };
        assert!(good.is_valid());

        let bad = Candle { t: 0, o: 10.0, h: 9.5, l: 9.0, c: 11.0, v: 1.0, n: 5 };
        assert!(!bad.is_valid());
    }
}
