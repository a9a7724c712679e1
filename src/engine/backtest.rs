use std::collections::HashMap;

use tracing::{debug, info};

use crate::risk::TradeGuard;
use crate::strategies::{aggregate_candles, EntrySignal, PositionView, Strategy, StrategyContext};
use crate::types::{
    Candle, CandleInterval, CompletedTrade, Direction, EquityPoint, ExitReason, Fill, Order,
    OrderIdGen, OrderTag, Side,
};

use super::{BacktestConfig, BacktestResult, EngineError, OrderManager, PositionTracker, SizingMode};

/// Bar-driven simulator. Strictly single-threaded and synchronous: bars are
/// processed in sequence with no suspension points.
pub struct BacktestEngine {
    config: BacktestConfig,
    strategy: Box<dyn Strategy>,
    orders: OrderManager,
    position: PositionTracker,
    guard: TradeGuard,
    id_gen: OrderIdGen,
    htf_candles: HashMap<CandleInterval, Vec<Candle>>,
    equity_curve: Vec<EquityPoint>,
    realized_pnl: f64,
    peak_equity: f64,
    max_drawdown_pct: f64,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, strategy: Box<dyn Strategy>) -> Self {
        let orders = OrderManager::new(config.execution);
        let peak_equity = config.initial_capital;
        Self {
            config,
            strategy,
            orders,
            position: PositionTracker::new(),
            guard: TradeGuard::new(),
            id_gen: OrderIdGen::new(),
            htf_candles: HashMap::new(),
            equity_curve: Vec::new(),
            realized_pnl: 0.0,
            peak_equity,
            max_drawdown_pct: 0.0,
        }
    }

    /// Runs the simulation over the full candle sequence.
    pub fn run(
        &mut self,
        candles: &[Candle],
        interval: CandleInterval,
    ) -> Result<BacktestResult, EngineError> {
        self.validate_candles(candles)?;

        info!(
            strategy = self.strategy.name(),
            bars = candles.len(),
            "starting backtest"
        );

        self.htf_candles = self
            .strategy
            .required_timeframes()
            .into_iter()
            .map(|target| (target, aggregate_candles(candles, interval, target)))
            .collect();
        self.strategy.init(candles, &self.htf_candles);

        for (i, candle) in candles.iter().enumerate() {
            self.process_bar(candles, i, candle)?;
        }

        // Anything still open is force-closed on the last bar's close.
        if let Some(last_index) = candles.len().checked_sub(1) {
            self.force_close_eod(&candles[last_index], last_index);
        }

        let final_equity = self.config.initial_capital + self.realized_pnl;
        let result = BacktestResult {
            initial_capital: self.config.initial_capital,
            final_equity,
            total_pnl: self.realized_pnl,
            max_drawdown_pct: self.max_drawdown_pct,
            bars_processed: candles.len(),
            trades: self.position.completed_trades().to_vec(),
            equity_curve: self.equity_curve.clone(),
        };

        info!(
            trades = result.trades.len(),
            pnl = result.total_pnl,
            "backtest complete"
        );
        Ok(result)
    }

    fn validate_candles(&self, candles: &[Candle]) -> Result<(), EngineError> {
        for (i, candle) in candles.iter().enumerate() {
            if !candle.is_valid() {
                return Err(EngineError::InvalidData(format!(
                    "candle {} violates price bounds (t={})",
                    i, candle.t
                )));
            }
            if i > 0 && candle.t <= candles[i - 1].t {
                return Err(EngineError::InvalidData(format!(
                    "timestamps not strictly increasing at index {}",
                    i
                )));
            }
        }
        Ok(())
    }

    fn process_bar(
        &mut self,
        candles: &[Candle],
        i: usize,
        candle: &Candle,
    ) -> Result<(), EngineError> {
        // Step A: daily reset on UTC calendar-day change.
        self.guard.roll_day(candle.t);

        // Step B: match resting orders against this bar.
        let check = self.orders.check_orders(candle);
        for (fill, comment) in check.fills {
            self.apply_fill(fill, &comment, i);
        }

        // Step C: mark-to-market at the close.
        self.position.update_mtm(candle.c);

        // Step D: strategy-driven exit, deferred to the next bar's open.
        if let Some(view) = self.position_view() {
            let exit = {
                let ctx = Self::make_ctx(candles, i, candle, Some(view), &self.htf_candles, &self.guard);
                self.strategy.should_exit(&ctx)
            };
            if let Some(exit) = exit {
                // The strategy's close overrides standing SL/TP.
                self.orders.clear_orders();
                let size = self.position.position().map(|p| p.size).unwrap_or(0.0);
                let side = match view.direction {
                    Direction::Long => Side::Sell,
                    Direction::Short => Side::Buy,
                };
                let order = Order::market(self.id_gen.next_id(), side, size, true, OrderTag::Signal);
                debug!(bar = i, "deferred exit queued for next open");
                self.orders.add_order(order, exit.comment);
            }
        }

        // Step E: entry, only while flat.
        if self.position.is_flat() {
            self.guard.bars_since_exit += 1;
            let waiting_on_entry = !self.orders.is_empty();
            if !waiting_on_entry && self.guard.can_trade(&self.config.limits, self.config.initial_capital) {
                let signal = {
                    let ctx = Self::make_ctx(candles, i, candle, None, &self.htf_candles, &self.guard);
                    self.strategy.on_candle(&ctx)
                };
                if let Some(signal) = signal {
                    self.enqueue_entry(&signal, candle)?;
                }
            }
        }

        // Step F: one equity point per bar, zero delta included.
        self.record_equity(candle.t, i);
        Ok(())
    }

    fn apply_fill(&mut self, fill: Fill, comment: &str, bar: usize) {
        match fill.tag {
            OrderTag::Entry => {
                let stop_distance = self
                    .orders
                    .stop_loss_trigger()
                    .map(|px| (fill.price - px).abs())
                    .unwrap_or(0.0);
                let direction = match fill.side {
                    Side::Buy => Direction::Long,
                    Side::Sell => Direction::Short,
                };
                self.position.open_position(direction, &fill, stop_distance, bar, comment);
            }
            OrderTag::Signal => {
                if let Some(trade) =
                    self.position.close_position(&fill, bar, ExitReason::Signal, comment)
                {
                    self.settle_full_close(&trade);
                }
            }
            OrderTag::StopLoss | OrderTag::TakeProfit(_) | OrderTag::Trail => {
                let reason = match fill.tag {
                    OrderTag::StopLoss => ExitReason::StopLoss,
                    OrderTag::TakeProfit(n) => ExitReason::TakeProfit(n),
                    _ => ExitReason::Trail,
                };
                let full_close = self
                    .position
                    .position()
                    .map(|p| fill.size >= p.size)
                    .unwrap_or(false);
                if full_close {
                    if let Some(trade) = self.position.close_position(&fill, bar, reason, comment) {
                        self.settle_full_close(&trade);
                    }
                } else if let Some(trade) = self.position.partial_close(&fill, bar, reason, comment)
                {
                    // Partial: remaining SL/TP stay active, streak untouched.
                    self.realized_pnl += trade.pnl;
                    self.guard.record_close(trade.pnl);
                }
            }
            OrderTag::EndOfData => {}
        }
    }

    fn settle_full_close(&mut self, trade: &CompletedTrade) {
        self.realized_pnl += trade.pnl;
        self.guard.record_close(trade.pnl);
        self.guard.record_full_exit(trade.pnl);
        self.orders.clear_orders();
    }

    fn enqueue_entry(&mut self, signal: &EntrySignal, candle: &Candle) -> Result<(), EngineError> {
        let tp_total: f64 = signal.take_profits.iter().map(|t| t.pct_of_position).sum();
        if tp_total > 1.0 + 1e-9 {
            return Err(EngineError::InvalidStrategy(format!(
                "take-profit fractions sum to {:.4} (> 1.0)",
                tp_total
            )));
        }

        // Market entries fill on the next open; the decision bar's close is
        // the sizing reference.
        let entry_ref = signal.entry_price.unwrap_or(candle.c);
        let stop_distance = (entry_ref - signal.stop_loss).abs();
        let size = match self.config.sizing {
            SizingMode::Risk if stop_distance > 0.0 => {
                self.config.risk_per_trade_usd / stop_distance
            }
            SizingMode::Cash if entry_ref > 0.0 => self.config.cash_per_trade / entry_ref,
            _ => 0.0,
        };
        if size <= 0.0 || !size.is_finite() {
            debug!("entry skipped: non-positive size");
            return Ok(());
        }

        let (entry_side, exit_side) = match signal.direction {
            Direction::Long => (Side::Buy, Side::Sell),
            Direction::Short => (Side::Sell, Side::Buy),
        };

        let entry_order = match signal.entry_price {
            None => Order::market(self.id_gen.next_id(), entry_side, size, false, OrderTag::Entry),
            Some(px) => Order::stop(self.id_gen.next_id(), entry_side, px, size, false, OrderTag::Entry),
        };
        self.orders.add_order(entry_order, signal.comment.clone());

        let sl = Order::stop(
            self.id_gen.next_id(),
            exit_side,
            signal.stop_loss,
            size,
            true,
            OrderTag::StopLoss,
        );
        self.orders.add_order(sl, "Stop loss");

        for (idx, tp) in signal.take_profits.iter().enumerate() {
            let tag = OrderTag::TakeProfit(idx as u8 + 1);
            let order = Order::limit(
                self.id_gen.next_id(),
                exit_side,
                tp.price,
                size * tp.pct_of_position,
                true,
                tag,
            );
            self.orders.add_order(order, format!("Take profit {}", idx + 1));
        }

        self.guard.trades_today += 1;
        debug!(
            direction = %signal.direction,
            size,
            stop = signal.stop_loss,
            "entry queued"
        );
        Ok(())
    }

    fn force_close_eod(&mut self, last: &Candle, last_index: usize) {
        let Some(position) = self.position.position() else {
            return;
        };
        let side = match position.direction {
            Direction::Long => Side::Sell,
            Direction::Short => Side::Buy,
        };
        let size = position.size;
        let base = last.c;
        let price = self.config.execution.apply_slippage(base, side);
        let fill = Fill {
            order_id: self.id_gen.next_id(),
            price,
            size,
            side,
            fee: self.config.execution.commission(price, size),
            slippage: (price - base).abs() * size,
            t: last.t,
            tag: OrderTag::EndOfData,
        };
        if let Some(trade) =
            self.position.close_position(&fill, last_index, ExitReason::EndOfData, "End of data")
        {
            self.settle_full_close(&trade);
        }
        self.record_equity(last.t, last_index);
    }

    fn position_view(&self) -> Option<PositionView> {
        self.position.position().map(|p| PositionView {
            direction: p.direction,
            entry_price: p.entry_price,
            entry_bar: p.entry_bar,
        })
    }

    fn make_ctx<'a>(
        candles: &'a [Candle],
        index: usize,
        candle: &'a Candle,
        position: Option<PositionView>,
        htf_candles: &'a HashMap<CandleInterval, Vec<Candle>>,
        guard: &TradeGuard,
    ) -> StrategyContext<'a> {
        StrategyContext {
            candles,
            index,
            candle,
            position,
            htf_candles,
            daily_pnl: guard.daily_pnl,
            trades_today: guard.trades_today,
            bars_since_exit: guard.bars_since_exit,
            consecutive_losses: guard.consecutive_losses,
        }
    }

    fn record_equity(&mut self, t: i64, bar: usize) {
        let unrealized = self
            .position
            .position()
            .map(|p| p.unrealized_pnl)
            .unwrap_or(0.0);
        let equity = self.config.initial_capital + self.realized_pnl + unrealized;
        self.peak_equity = self.peak_equity.max(equity);
        let drawdown_pct = if self.peak_equity > 0.0 {
            (self.peak_equity - equity) / self.peak_equity * 100.0
        } else {
            0.0
        };
        self.max_drawdown_pct = self.max_drawdown_pct.max(drawdown_pct);
        self.equity_curve.push(EquityPoint {
            t,
            bar,
            equity,
            peak_equity: self.peak_equity,
            drawdown_pct,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskLimits;
    use crate::strategies::{ParamSpec, StrategyExit, TakeProfitTarget};
    use std::collections::BTreeMap;

    const HOUR_MS: i64 = 3_600_000;

    /// Enters long on every allowed bar, SL a fixed offset below the close.
    struct AlwaysLong {
        sl_offset: f64,
        take_profits: Vec<TakeProfitTarget>,
    }

    impl AlwaysLong {
        fn new(sl_offset: f64) -> Self {
            Self { sl_offset, take_profits: Vec::new() }
        }
    }

    impl Strategy for AlwaysLong {
        fn name(&self) -> &str {
            "always-long"
        }

        fn params(&self) -> BTreeMap<String, ParamSpec> {
            BTreeMap::new()
        }

        fn on_candle(&mut self, ctx: &StrategyContext) -> Option<EntrySignal> {
            Some(EntrySignal {
                direction: Direction::Long,
                entry_price: None,
                stop_loss: ctx.candle.c - self.sl_offset,
                take_profits: self.take_profits.clone(),
                comment: "always long".to_string(),
            })
        }
    }

    /// Enters once at a fixed decision bar; optionally exits by signal at
    /// another bar.
    struct OneShot {
        decide_at: usize,
        stop_loss: f64,
        take_profits: Vec<TakeProfitTarget>,
        exit_at: Option<usize>,
        fired: bool,
    }

    impl Strategy for OneShot {
        fn name(&self) -> &str {
            "one-shot"
        }

        fn params(&self) -> BTreeMap<String, ParamSpec> {
            BTreeMap::new()
        }

        fn on_candle(&mut self, ctx: &StrategyContext) -> Option<EntrySignal> {
            if self.fired || ctx.index != self.decide_at {
                return None;
            }
            self.fired = true;
            Some(EntrySignal {
                direction: Direction::Long,
                entry_price: None,
                stop_loss: self.stop_loss,
                take_profits: self.take_profits.clone(),
                comment: "one shot entry".to_string(),
            })
        }

        fn should_exit(&mut self, ctx: &StrategyContext) -> Option<StrategyExit> {
            match self.exit_at {
                Some(bar) if ctx.index == bar => {
                    Some(StrategyExit { comment: "signal exit".to_string() })
                }
                _ => None,
            }
        }
    }

    fn flat_bar(i: usize, px: f64) -> Candle {
        Candle { t: i as i64 * HOUR_MS, o: px, h: px + 1.0, l: px - 1.0, c: px, v: 10.0, n: 1 }
    }

    fn rising_bars(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 10_000.0 + 5.0 * i as f64;
                Candle {
                    t: i as i64 * HOUR_MS,
                    o: c - 2.5,
                    h: c + 1.0,
                    l: c - 5.0,
                    c,
                    v: 100.0,
                    n: 10,
                }
            })
            .collect()
    }

    fn frictionless(limits: RiskLimits) -> BacktestConfig {
        BacktestConfig {
            initial_capital: 10_000.0,
            sizing: SizingMode::Risk,
            risk_per_trade_usd: 10.0,
            cash_per_trade: 1_000.0,
            execution: super::super::ExecutionParams { slippage_bps: 0.0, commission_pct: 0.0 },
            limits,
        }
    }

    fn relaxed_limits() -> RiskLimits {
        RiskLimits {
            cooldown_bars: 1,
            max_consecutive_losses: 100,
            max_daily_loss_r: 100.0,
            max_trades_per_day: 1_000,
            max_global_trades_day: 1_000,
        }
    }

    #[test]
    fn always_long_trending_up() {
        // Scenario: close rising linearly, risk sizing, no take-profits.
        let candles = rising_bars(100);
        let config = frictionless(relaxed_limits());
        let mut engine = BacktestEngine::new(config, Box::new(AlwaysLong::new(50.0)));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        assert!(!result.trades.is_empty());
        for trade in &result.trades {
            assert!((trade.size - 0.2).abs() < 1e-9, "size was {}", trade.size);
        }
        let total: f64 = result.trades.iter().map(|t| t.pnl).sum();
        assert!((result.final_equity - (result.initial_capital + total)).abs() < 0.5);
    }

    #[test]
    fn equity_matches_ledger_exactly() {
        let candles = rising_bars(100);
        let mut config = frictionless(relaxed_limits());
        config.execution.commission_pct = 0.1;
        config.execution.slippage_bps = 5.0;
        let mut engine = BacktestEngine::new(config, Box::new(AlwaysLong::new(50.0)));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        let total: f64 = result.trades.iter().map(|t| t.pnl).sum();
        assert!((result.final_equity - (result.initial_capital + total)).abs() < 1e-6);
    }

    #[test]
    fn runs_are_deterministic() {
        let candles = rising_bars(100);
        let run = || {
            let mut engine = BacktestEngine::new(
                frictionless(relaxed_limits()),
                Box::new(AlwaysLong::new(50.0)),
            );
            engine.run(&candles, CandleInterval::H1).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(
            serde_json::to_string(&a.trades).unwrap(),
            serde_json::to_string(&b.trades).unwrap()
        );
        assert_eq!(a.final_equity, b.final_equity);
    }

    #[test]
    fn equity_bar_indices_are_monotonic() {
        let candles = rising_bars(100);
        let mut engine = BacktestEngine::new(
            frictionless(relaxed_limits()),
            Box::new(AlwaysLong::new(50.0)),
        );
        let result = engine.run(&candles, CandleInterval::H1).unwrap();
        for pair in result.equity_curve.windows(2) {
            assert!(pair[1].bar >= pair[0].bar);
        }
    }

    #[test]
    fn sl_wins_over_tp_on_wide_bar() {
        // Entry decided at bar 4, filled at bar 5 (open = close = 100).
        // Bar 8 spans both SL (90) and TP (120): only the SL trade may appear.
        let mut candles: Vec<Candle> = (0..10).map(|i| flat_bar(i, 100.0)).collect();
        candles[8] = Candle { t: 8 * HOUR_MS, o: 100.0, h: 125.0, l: 85.0, c: 110.0, v: 10.0, n: 1 };
        // Keep the tail quiet so nothing re-triggers.
        candles[9] = flat_bar(9, 100.0);

        let strategy = OneShot {
            decide_at: 4,
            stop_loss: 90.0,
            take_profits: vec![TakeProfitTarget { price: 120.0, pct_of_position: 1.0 }],
            exit_at: None,
            fired: false,
        };
        let config = frictionless(relaxed_limits());
        let mut engine = BacktestEngine::new(config, Box::new(strategy));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_price, 90.0);
        assert_eq!(trade.exit_bar, 8);
        assert!(result
            .trades
            .iter()
            .all(|t| !matches!(t.exit_reason, ExitReason::TakeProfit(_))));
    }

    #[test]
    fn deferred_exit_fills_next_open() {
        // Entry decided at bar 5, market fill at bar 6 open = 200. Strategy
        // exit decided at bar 8; fill must land on bar 9's open = 300.
        let mut candles: Vec<Candle> = (0..11).map(|i| flat_bar(i, 200.0)).collect();
        candles[8] = Candle { t: 8 * HOUR_MS, o: 200.0, h: 201.0, l: 160.0, c: 165.0, v: 10.0, n: 1 };
        candles[9] = Candle { t: 9 * HOUR_MS, o: 300.0, h: 305.0, l: 295.0, c: 300.0, v: 10.0, n: 1 };
        candles[10] = flat_bar(10, 300.0);

        let strategy = OneShot {
            decide_at: 5,
            stop_loss: 100.0,
            take_profits: Vec::new(),
            exit_at: Some(8),
            fired: false,
        };
        let config = frictionless(relaxed_limits());
        let mut engine = BacktestEngine::new(config, Box::new(strategy));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.exit_reason, ExitReason::Signal);
        assert_eq!(trade.entry_price, 200.0);
        assert_eq!(trade.exit_price, 300.0);
        assert_eq!(trade.entry_bar, 6);
        assert_eq!(trade.exit_bar, 9);
        assert_eq!(trade.exit_comment, "signal exit");
    }

    #[test]
    fn no_same_bar_reentry_after_signal_exit() {
        struct ChurnStrategy;
        impl Strategy for ChurnStrategy {
            fn name(&self) -> &str {
                "churn"
            }
            fn params(&self) -> BTreeMap<String, ParamSpec> {
                BTreeMap::new()
            }
            fn on_candle(&mut self, ctx: &StrategyContext) -> Option<EntrySignal> {
                Some(EntrySignal {
                    direction: Direction::Long,
                    entry_price: None,
                    stop_loss: ctx.candle.c - 1_000.0,
                    take_profits: Vec::new(),
                    comment: "enter".to_string(),
                })
            }
            fn should_exit(&mut self, _ctx: &StrategyContext) -> Option<StrategyExit> {
                Some(StrategyExit { comment: "out".to_string() })
            }
        }

        let candles: Vec<Candle> = (0..30).map(|i| flat_bar(i, 100.0)).collect();
        let mut limits = relaxed_limits();
        limits.cooldown_bars = 0;
        let mut engine = BacktestEngine::new(frictionless(limits), Box::new(ChurnStrategy));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        let signal_trades: Vec<(usize, usize)> = result
            .trades
            .iter()
            .enumerate()
            .filter(|(_, t)| t.exit_reason == ExitReason::Signal)
            .map(|(k, t)| (k, t.exit_bar))
            .collect();
        assert!(!signal_trades.is_empty());
        for (k, exit_bar) in signal_trades {
            for later in &result.trades[k + 1..] {
                assert_ne!(later.entry_bar, exit_bar, "re-entry on a signal-exit bar");
            }
        }
    }

    #[test]
    fn open_position_is_force_closed_at_end_of_data() {
        let candles = rising_bars(40);
        let mut engine = BacktestEngine::new(
            frictionless(relaxed_limits()),
            Box::new(AlwaysLong::new(50.0)),
        );
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        let eod: Vec<_> = result
            .trades
            .iter()
            .filter(|t| t.exit_reason == ExitReason::EndOfData)
            .collect();
        assert_eq!(eod.len(), 1);
        assert_eq!(eod[0].exit_bar, candles.len() - 1);
        assert_eq!(eod[0].exit_comment, "End of data");
    }

    #[test]
    fn partial_take_profit_keeps_stop_active() {
        // TP1 closes half at 110 on bar 6; the wide bar 8 then stops out the
        // remaining half at 90.
        let mut candles: Vec<Candle> = (0..10).map(|i| flat_bar(i, 100.0)).collect();
        candles[6] = Candle { t: 6 * HOUR_MS, o: 100.0, h: 112.0, l: 99.0, c: 105.0, v: 10.0, n: 1 };
        candles[8] = Candle { t: 8 * HOUR_MS, o: 100.0, h: 101.0, l: 85.0, c: 90.0, v: 10.0, n: 1 };

        let strategy = OneShot {
            decide_at: 4,
            stop_loss: 90.0,
            take_profits: vec![TakeProfitTarget { price: 110.0, pct_of_position: 0.5 }],
            exit_at: None,
            fired: false,
        };
        let mut engine = BacktestEngine::new(frictionless(relaxed_limits()), Box::new(strategy));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].exit_reason, ExitReason::TakeProfit(1));
        assert!((result.trades[0].size - 0.5).abs() < 1e-9);
        assert_eq!(result.trades[1].exit_reason, ExitReason::StopLoss);
        assert!((result.trades[1].size - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unserved_cooldown_blocks_all_entries() {
        // barsSinceExit can never exceed a cooldown longer than the data.
        let candles = rising_bars(60);
        let mut limits = relaxed_limits();
        limits.cooldown_bars = 1_000;
        let mut engine =
            BacktestEngine::new(frictionless(limits), Box::new(AlwaysLong::new(50.0)));
        let result = engine.run(&candles, CandleInterval::H1).unwrap();
        assert!(result.trades.is_empty());
        // Equity still gets one flat point per bar.
        assert_eq!(result.equity_curve.len(), candles.len());
        assert!(result.equity_curve.iter().all(|p| p.equity == 10_000.0));
    }

    #[test]
    fn invalid_candles_are_rejected() {
        let mut candles = rising_bars(10);
        candles[4].h = candles[4].l - 1.0;
        let mut engine = BacktestEngine::new(
            frictionless(relaxed_limits()),
            Box::new(AlwaysLong::new(50.0)),
        );
        let err = engine.run(&candles, CandleInterval::H1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidData(_)));
    }

    #[test]
    fn oversized_tp_fractions_are_an_invalid_strategy() {
        let strategy = OneShot {
            decide_at: 2,
            stop_loss: 90.0,
            take_profits: vec![
                TakeProfitTarget { price: 110.0, pct_of_position: 0.7 },
                TakeProfitTarget { price: 120.0, pct_of_position: 0.7 },
            ],
            exit_at: None,
            fired: false,
        };
        let candles: Vec<Candle> = (0..10).map(|i| flat_bar(i, 100.0)).collect();
        let mut engine = BacktestEngine::new(frictionless(relaxed_limits()), Box::new(strategy));
        let err = engine.run(&candles, CandleInterval::H1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidStrategy(_)));
    }
}
