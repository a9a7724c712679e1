pub mod breakout;
pub mod timeframe;

pub use breakout::BreakoutStrategy;
pub use timeframe::aggregate_candles;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::types::{Candle, CandleInterval, Direction};

/// A declared, tunable strategy parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub optimizable: bool,
    pub description: String,
}

impl ParamSpec {
    pub fn new(value: f64, min: f64, max: f64, step: f64, description: &str) -> Self {
        Self { value, min, max, step, optimizable: true, description: description.to_string() }
    }

    pub fn fixed(value: f64, description: &str) -> Self {
        Self { value, min: value, max: value, step: 0.0, optimizable: false, description: description.to_string() }
    }
}

/// One take-profit target: price plus the fraction of the position it closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitTarget {
    pub price: f64,
    pub pct_of_position: f64,
}

/// Strategy output for an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySignal {
    pub direction: Direction,
    /// None means enter at market; Some(px) arms a stop entry at px.
    pub entry_price: Option<f64>,
    pub stop_loss: f64,
    pub take_profits: Vec<TakeProfitTarget>,
    pub comment: String,
}

/// Strategy-initiated close, filled at the next bar's open.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyExit {
    pub comment: String,
}

/// Read-only view of the open position handed to `should_exit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionView {
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_bar: usize,
}

/// Per-bar view handed to the strategy. Strategies must be pure functions of
/// the bar prefix up to and including `index`.
pub struct StrategyContext<'a> {
    pub candles: &'a [Candle],
    pub index: usize,
    pub candle: &'a Candle,
    pub position: Option<PositionView>,
    pub htf_candles: &'a HashMap<CandleInterval, Vec<Candle>>,
    pub daily_pnl: f64,
    pub trades_today: u32,
    pub bars_since_exit: u32,
    pub consecutive_losses: u32,
}

/// The contract the engine consumes. `on_candle` is only invoked while flat;
/// `should_exit` only while a position is open.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Declared parameters with current values and tuning bounds.
    fn params(&self) -> BTreeMap<String, ParamSpec>;

    /// Higher timeframes the strategy wants pre-aggregated (default: none).
    fn required_timeframes(&self) -> Vec<CandleInterval> {
        Vec::new()
    }

    /// One-shot hook before the run for indicator pre-computation.
    fn init(&mut self, _candles: &[Candle], _htf: &HashMap<CandleInterval, Vec<Candle>>) {}

    fn on_candle(&mut self, ctx: &StrategyContext) -> Option<EntrySignal>;

    fn should_exit(&mut self, _ctx: &StrategyContext) -> Option<StrategyExit> {
        None
    }
}

/// Instantiates a registered strategy by factory name, applying parameter
/// overrides on top of its declared defaults.
pub fn create_strategy(
    factory: &str,
    overrides: &BTreeMap<String, f64>,
) -> Option<Box<dyn Strategy>> {
    match factory {
        "breakout" => Some(Box::new(BreakoutStrategy::with_overrides(overrides))),
        _ => None,
    }
}

/// Number of optimizable parameters a strategy declares; feeds the
/// complexity component of the optimization score.
pub fn optimizable_param_count(strategy: &dyn Strategy) -> usize {
    strategy.params().values().filter(|p| p.optimizable).count()
}
