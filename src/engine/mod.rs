pub mod backtest;
pub mod orders;
pub mod position;
pub mod results;

pub use backtest::*;
pub use orders::*;
pub use position::*;
pub use results::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::risk::RiskLimits;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),
    #[error("invalid candle data: {0}")]
    InvalidData(String),
}

/// How entry size is derived from a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// Size = risk_per_trade_usd / stop distance.
    Risk,
    /// Size = cash_per_trade / entry price.
    Cash,
}

/// Fill-model parameters shared by the order book and the end-of-data close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    pub slippage_bps: f64,
    pub commission_pct: f64,
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self { slippage_bps: 5.0, commission_pct: 0.05 }
    }
}

impl ExecutionParams {
    /// Worst-cases a base price by the slippage rate: buys pay up, sells
    /// receive less. Limit fills bypass this.
    pub fn apply_slippage(&self, base: f64, side: crate::types::Side) -> f64 {
        let rate = self.slippage_bps / 10_000.0;
        match side {
            crate::types::Side::Buy => base * (1.0 + rate),
            crate::types::Side::Sell => base * (1.0 - rate),
        }
    }

    pub fn commission(&self, price: f64, size: f64) -> f64 {
        (price * size).abs() * self.commission_pct / 100.0
    }
}

/// Immutable per-run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub sizing: SizingMode,
    pub risk_per_trade_usd: f64,
    pub cash_per_trade: f64,
    pub execution: ExecutionParams,
    pub limits: RiskLimits,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            sizing: SizingMode::Risk,
            risk_per_trade_usd: 100.0,
            cash_per_trade: 1_000.0,
            execution: ExecutionParams::default(),
            limits: RiskLimits::default(),
        }
    }
}
