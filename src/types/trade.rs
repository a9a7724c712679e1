use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Sign applied to (exit - entry) when computing PnL.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a trade (or a partial slice of one) was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit(u8),
    Trail,
    Signal,
    EndOfData,
}

impl ExitReason {
    pub fn label(&self) -> String {
        match self {
            ExitReason::StopLoss => "sl".to_string(),
            ExitReason::TakeProfit(n) => format!("tp{}", n),
            ExitReason::Trail => "trail".to_string(),
            ExitReason::Signal => "signal".to_string(),
            ExitReason::EndOfData => "eod".to_string(),
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Immutable record produced when a position (or a partial slice) closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub held_bars: usize,
    pub size: f64,
    /// Net of commission and slippage, quote currency.
    pub pnl: f64,
    pub pnl_pct: f64,
    /// PnL normalized by initial risk (stop distance * size); 0 when the
    /// stop distance was 0.
    pub r_multiple: f64,
    pub commission: f64,
    pub slippage: f64,
    pub exit_reason: ExitReason,
    pub entry_comment: String,
    pub exit_comment: String,
}

/// Point on the running equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub t: i64,
    pub bar: usize,
    pub equity: f64,
    pub peak_equity: f64,
    pub drawdown_pct: f64,
}
