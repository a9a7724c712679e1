#![allow(dead_code)]
use super::Indicator;

/// Average True Range with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    prev_close: Option<f64>,
    true_ranges: Vec<f64>,
    value: Option<f64>,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            prev_close: None,
            true_ranges: Vec::with_capacity(period),
            value: None,
        }
    }

    pub fn update(&mut self, high: f64, low: f64, close: f64) -> Option<f64> {
        let tr = self.true_range(high, low);
        self.prev_close = Some(close);

        self.true_ranges.push(tr);

        if self.true_ranges.len() < self.period {
            return None;
        }

        if self.true_ranges.len() == self.period && self.value.is_none() {
            let sum: f64 = self.true_ranges.iter().sum();
            self.value = Some(sum / self.period as f64);
        } else if let Some(prev_atr) = self.value {
            let period = self.period as f64;
            self.value = Some((prev_atr * (period - 1.0) + tr) / period);
        }

        if self.true_ranges.len() > self.period {
            self.true_ranges.remove(0);
        }

        self.value
    }

    fn true_range(&self, high: f64, low: f64) -> f64 {
        let hl = high - low;

        match self.prev_close {
            Some(prev_close) => {
                let hc = (high - prev_close).abs();
                let lc = (low - prev_close).abs();
                hl.max(hc).max(lc)
            }
            None => hl,
        }
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn stop_price(&self, entry_price: f64, multiplier: f64, is_long: bool) -> Option<f64> {
        self.value.map(|atr| {
            let distance = atr * multiplier;
            if is_long {
                entry_price - distance
            } else {
                entry_price + distance
            }
        })
    }
}

impl Indicator for Atr {
    fn name(&self) -> &'static str {
        "ATR"
    }

    fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.true_ranges.clear();
        self.value = None;
    }
}
