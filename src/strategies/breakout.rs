use std::collections::{BTreeMap, HashMap};

use crate::indicators::{highest, lowest, Atr};
use crate::types::{Candle, CandleInterval, Direction};

use super::{EntrySignal, ParamSpec, Strategy, StrategyContext, StrategyExit, TakeProfitTarget};

/// Donchian-channel breakout with an ATR-scaled stop.
///
/// Enters long when the close clears the highest high of the lookback window,
/// short when it breaks the lowest low. One partial take-profit at a fixed
/// R-multiple; a strategy exit fires when price falls back through the
/// channel midline.
pub struct BreakoutStrategy {
    lookback: usize,
    atr_period: usize,
    atr_stop_mult: f64,
    tp1_r_mult: f64,
    tp1_pct: f64,
    /// Pre-computed per-bar ATR, filled in `init`.
    atr_by_bar: Vec<Option<f64>>,
}

impl BreakoutStrategy {
    pub fn new() -> Self {
        Self {
            lookback: 20,
            atr_period: 14,
            atr_stop_mult: 2.0,
            tp1_r_mult: 1.5,
            tp1_pct: 0.5,
            atr_by_bar: Vec::new(),
        }
    }

    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Self {
        let mut strategy = Self::new();
        for (name, value) in overrides {
            match name.as_str() {
                "lookback" => strategy.lookback = *value as usize,
                "atrPeriod" => strategy.atr_period = *value as usize,
                "atrStopMult" => strategy.atr_stop_mult = *value,
                "tp1RMult" => strategy.tp1_r_mult = *value,
                "tp1Pct" => strategy.tp1_pct = *value,
                _ => {}
            }
        }
        strategy
    }

    fn channel(&self, candles: &[Candle], index: usize) -> Option<(f64, f64)> {
        if index < self.lookback {
            return None;
        }
        // Window ends on the previous bar so the breakout bar itself is not
        // part of the channel.
        let highs: Vec<f64> = candles[index - self.lookback..index].iter().map(|c| c.h).collect();
        let lows: Vec<f64> = candles[index - self.lookback..index].iter().map(|c| c.l).collect();
        let upper = highest(&highs, self.lookback)?;
        let lower = lowest(&lows, self.lookback)?;
        Some((upper, lower))
    }
}

impl Default for BreakoutStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for BreakoutStrategy {
    fn name(&self) -> &str {
        "breakout"
    }

    fn params(&self) -> BTreeMap<String, ParamSpec> {
        BTreeMap::from([
            (
                "lookback".to_string(),
                ParamSpec::new(self.lookback as f64, 10.0, 60.0, 5.0, "Donchian channel lookback bars"),
            ),
            (
                "atrPeriod".to_string(),
                ParamSpec::fixed(self.atr_period as f64, "ATR smoothing period"),
            ),
            (
                "atrStopMult".to_string(),
                ParamSpec::new(self.atr_stop_mult, 0.5, 5.0, 0.25, "Stop distance in ATR multiples"),
            ),
            (
                "tp1RMult".to_string(),
                ParamSpec::new(self.tp1_r_mult, 0.5, 4.0, 0.25, "First take-profit in R multiples"),
            ),
            (
                "tp1Pct".to_string(),
                ParamSpec::new(self.tp1_pct, 0.1, 1.0, 0.1, "Fraction of position closed at tp1"),
            ),
        ])
    }

    fn init(&mut self, candles: &[Candle], _htf: &HashMap<CandleInterval, Vec<Candle>>) {
        let mut atr = Atr::new(self.atr_period);
        self.atr_by_bar = candles
            .iter()
            .map(|c| atr.update(c.h, c.l, c.c))
            .collect();
    }

    fn on_candle(&mut self, ctx: &StrategyContext) -> Option<EntrySignal> {
        let (upper, lower) = self.channel(ctx.candles, ctx.index)?;
        let atr = self.atr_by_bar.get(ctx.index).copied().flatten()?;
        let close = ctx.candle.c;
        let stop_distance = atr * self.atr_stop_mult;
        if stop_distance <= 0.0 {
            return None;
        }

        let (direction, stop_loss, tp1) = if close > upper {
            let sl = close - stop_distance;
            (Direction::Long, sl, close + stop_distance * self.tp1_r_mult)
        } else if close < lower {
            let sl = close + stop_distance;
            (Direction::Short, sl, close - stop_distance * self.tp1_r_mult)
        } else {
            return None;
        };

        Some(EntrySignal {
            direction,
            entry_price: None,
            stop_loss,
            take_profits: vec![TakeProfitTarget { price: tp1, pct_of_position: self.tp1_pct }],
            comment: format!("{} breakout of {}-bar channel", direction, self.lookback),
        })
    }

    fn should_exit(&mut self, ctx: &StrategyContext) -> Option<StrategyExit> {
        let position = ctx.position?;
        let (upper, lower) = self.channel(ctx.candles, ctx.index)?;
        let midline = (upper + lower) / 2.0;

        let faded = match position.direction {
            Direction::Long => ctx.candle.c < midline,
            Direction::Short => ctx.candle.c > midline,
        };

        if faded {
            Some(StrategyExit { comment: "Close crossed channel midline".to_string() })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let px = 100.0 + i as f64;
                Candle {
                    t: i as i64 * 60_000,
                    o: px,
                    h: px + 1.5,
                    l: px - 1.5,
                    c: px + 1.0,
                    v: 10.0,
                    n: 1,
                }
            })
            .collect()
    }

    fn flat_ctx<'a>(
        candles: &'a [Candle],
        index: usize,
        htf: &'a HashMap<CandleInterval, Vec<Candle>>,
    ) -> StrategyContext<'a> {
        StrategyContext {
            candles,
            index,
            candle: &candles[index],
            position: None,
            htf_candles: htf,
            daily_pnl: 0.0,
            trades_today: 0,
            bars_since_exit: 10,
            consecutive_losses: 0,
        }
    }

    #[test]
    fn signals_long_on_upward_breakout() {
        let candles = trending_candles(60);
        let htf = HashMap::new();
        let mut strategy = BreakoutStrategy::new();
        strategy.init(&candles, &htf);

        // Steady uptrend: every bar past warmup closes above the prior
        // channel high.
        let ctx = flat_ctx(&candles, 40, &htf);
        let signal = strategy.on_candle(&ctx).expect("breakout expected");
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.stop_loss < candles[40].c);
        assert_eq!(signal.take_profits.len(), 1);
        assert!(signal.take_profits[0].price > candles[40].c);
    }

    #[test]
    fn no_signal_before_warmup() {
        let candles = trending_candles(60);
        let htf = HashMap::new();
        let mut strategy = BreakoutStrategy::new();
        strategy.init(&candles, &htf);

        let ctx = flat_ctx(&candles, 5, &htf);
        assert!(strategy.on_candle(&ctx).is_none());
    }

    #[test]
    fn exits_long_when_close_falls_through_midline() {
        let mut candles = trending_candles(60);
        // Crash the last bar well below the channel midline.
        let last = candles.len() - 1;
        candles[last].o = 100.0;
        candles[last].c = 80.0;
        candles[last].l = 79.0;
        candles[last].h = 101.0;

        let htf = HashMap::new();
        let mut strategy = BreakoutStrategy::new();
        strategy.init(&candles, &htf);

        let mut ctx = flat_ctx(&candles, last, &htf);
        ctx.position = Some(super::super::PositionView {
            direction: Direction::Long,
            entry_price: 140.0,
            entry_bar: 40,
        });
        assert!(strategy.should_exit(&ctx).is_some());
    }
}
