#![allow(dead_code)]
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use crate::types::{CompletedTrade, Direction, ExitReason, Fill};

/// The single open position of a run.
#[derive(Debug, Clone)]
pub struct Position {
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    /// Absolute distance from entry to the initial stop-loss.
    pub stop_distance: f64,
    /// Realized PnL accumulated by partial closes.
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub entry_bar: usize,
    pub entry_t: i64,
    pub entry_comment: String,
    entry_fee: f64,
    entry_slippage: f64,
}

impl Position {
    fn entry_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.entry_t).single().unwrap_or_default()
    }
}

/// Owns at most one open position and the accumulating trade ledger.
///
/// Entry commission and slippage are charged once, on the final closing
/// slice; each partial slice carries only its own exit-fill costs, so the
/// ledger sums to realized equity without double counting.
#[derive(Debug, Default)]
pub struct PositionTracker {
    position: Option<Position>,
    trades: Vec<CompletedTrade>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn completed_trades(&self) -> &[CompletedTrade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<CompletedTrade> {
        self.trades
    }

    pub fn open_position(
        &mut self,
        direction: Direction,
        fill: &Fill,
        stop_distance: f64,
        entry_bar: usize,
        entry_comment: impl Into<String>,
    ) {
        debug_assert!(self.position.is_none(), "position already open");
        debug!(
            direction = %direction,
            price = fill.price,
            size = fill.size,
            stop_distance,
            "opening position"
        );
        self.position = Some(Position {
            direction,
            entry_price: fill.price,
            size: fill.size,
            stop_distance,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            entry_bar,
            entry_t: fill.t,
            entry_comment: entry_comment.into(),
            entry_fee: fill.fee,
            entry_slippage: fill.slippage,
        });
    }

    pub fn update_mtm(&mut self, price: f64) {
        if let Some(position) = self.position.as_mut() {
            position.unrealized_pnl =
                position.direction.sign() * (price - position.entry_price) * position.size;
        }
    }

    /// Closes a slice of the position, emitting a trade for just that slice.
    /// Returns the trade, or None when flat.
    pub fn partial_close(
        &mut self,
        fill: &Fill,
        exit_bar: usize,
        exit_reason: ExitReason,
        exit_comment: &str,
    ) -> Option<CompletedTrade> {
        let position = self.position.as_mut()?;
        let slice = fill.size.min(position.size);

        let gross = position.direction.sign() * (fill.price - position.entry_price) * slice;
        let pnl = gross - fill.fee - fill.slippage;

        let trade = Self::make_trade(
            position, slice, fill, pnl, fill.fee, fill.slippage, exit_bar, exit_reason,
            exit_comment,
        );

        position.size -= slice;
        position.realized_pnl += pnl;
        debug!(remaining = position.size, pnl, "partial close");

        self.trades.push(trade.clone());
        Some(trade)
    }

    /// Closes the full remaining position. The final slice absorbs the
    /// entry-side costs. Returns the trade, or None when flat.
    pub fn close_position(
        &mut self,
        fill: &Fill,
        exit_bar: usize,
        exit_reason: ExitReason,
        exit_comment: &str,
    ) -> Option<CompletedTrade> {
        let position = self.position.take()?;
        let slice = position.size;

        let gross = position.direction.sign() * (fill.price - position.entry_price) * slice;
        let commission = position.entry_fee + fill.fee;
        let slippage = position.entry_slippage + fill.slippage;
        let pnl = gross - commission - slippage;

        let trade = Self::make_trade(
            &position, slice, fill, pnl, commission, slippage, exit_bar, exit_reason,
            exit_comment,
        );

        debug!(pnl, exit = %exit_reason, "position closed");
        self.trades.push(trade.clone());
        Some(trade)
    }

    #[allow(clippy::too_many_arguments)]
    fn make_trade(
        position: &Position,
        slice: f64,
        fill: &Fill,
        pnl: f64,
        commission: f64,
        slippage: f64,
        exit_bar: usize,
        exit_reason: ExitReason,
        exit_comment: &str,
    ) -> CompletedTrade {
        let pnl_pct = if position.entry_price != 0.0 {
            position.direction.sign() * (fill.price - position.entry_price)
                / position.entry_price
                * 100.0
        } else {
            0.0
        };
        let r_multiple = if position.stop_distance > 0.0 {
            pnl / (position.stop_distance * slice)
        } else {
            0.0
        };

        CompletedTrade {
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price: fill.price,
            entry_time: position.entry_time(),
            exit_time: Utc.timestamp_millis_opt(fill.t).single().unwrap_or_default(),
            entry_bar: position.entry_bar,
            exit_bar,
            held_bars: exit_bar.saturating_sub(position.entry_bar),
            size: slice,
            pnl,
            pnl_pct,
            r_multiple,
            commission,
            slippage,
            exit_reason,
            entry_comment: position.entry_comment.clone(),
            exit_comment: exit_comment.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderTag, Side};

    fn fill(price: f64, size: f64, side: Side, fee: f64, tag: OrderTag) -> Fill {
        Fill { order_id: 1, price, size, side, fee, slippage: 0.0, t: 60_000, tag }
    }

    fn open_long(tracker: &mut PositionTracker, entry: f64, size: f64, stop_distance: f64) {
        let entry_fill = fill(entry, size, Side::Buy, 0.0, OrderTag::Entry);
        tracker.open_position(Direction::Long, &entry_fill, stop_distance, 3, "entry");
    }

    #[test]
    fn long_pnl_and_r_multiple() {
        let mut tracker = PositionTracker::new();
        open_long(&mut tracker, 100.0, 2.0, 5.0);
        assert!(!tracker.is_flat());

        let exit = fill(110.0, 2.0, Side::Sell, 0.0, OrderTag::Signal);
        let trade = tracker
            .close_position(&exit, 8, ExitReason::Signal, "exit")
            .unwrap();

        assert_eq!(trade.pnl, 20.0);
        assert_eq!(trade.held_bars, 5);
        assert!((trade.r_multiple - 2.0).abs() < 1e-9); // 20 / (5 * 2)
        assert!(tracker.is_flat());
        assert_eq!(tracker.completed_trades().len(), 1);
    }

    #[test]
    fn short_pnl_sign() {
        let mut tracker = PositionTracker::new();
        let entry_fill = fill(100.0, 1.0, Side::Sell, 0.0, OrderTag::Entry);
        tracker.open_position(Direction::Short, &entry_fill, 10.0, 0, "short");

        let exit = fill(90.0, 1.0, Side::Buy, 0.0, OrderTag::StopLoss);
        let trade = tracker
            .close_position(&exit, 4, ExitReason::StopLoss, "sl")
            .unwrap();
        assert_eq!(trade.pnl, 10.0);
        assert!((trade.pnl_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn entry_costs_land_on_the_final_slice_only() {
        let mut tracker = PositionTracker::new();
        let entry_fill = Fill {
            order_id: 1,
            price: 100.0,
            size: 2.0,
            side: Side::Buy,
            fee: 4.0,
            slippage: 1.0,
            t: 0,
            tag: OrderTag::Entry,
        };
        tracker.open_position(Direction::Long, &entry_fill, 5.0, 0, "entry");

        let tp = fill(110.0, 1.0, Side::Sell, 2.0, OrderTag::TakeProfit(1));
        let partial = tracker
            .partial_close(&tp, 2, ExitReason::TakeProfit(1), "tp1")
            .unwrap();
        // Slice gross 10, minus its own exit fee only.
        assert_eq!(partial.pnl, 8.0);
        assert_eq!(partial.commission, 2.0);
        assert!(!tracker.is_flat());
        assert_eq!(tracker.position().unwrap().size, 1.0);

        let final_exit = fill(120.0, 1.0, Side::Sell, 3.0, OrderTag::StopLoss);
        let closed = tracker
            .close_position(&final_exit, 5, ExitReason::StopLoss, "sl")
            .unwrap();
        // Gross 20, minus exit fee 3, entry fee 4 and entry slippage 1.
        assert_eq!(closed.pnl, 12.0);
        assert_eq!(closed.commission, 7.0);
        assert_eq!(closed.slippage, 1.0);
        assert!(tracker.is_flat());

        // Ledger total equals what equity actually moved by.
        let total: f64 = tracker.completed_trades().iter().map(|t| t.pnl).sum();
        assert_eq!(total, 20.0);
    }

    #[test]
    fn zero_stop_distance_r_is_sentinel() {
        let mut tracker = PositionTracker::new();
        open_long(&mut tracker, 100.0, 1.0, 0.0);
        let exit = fill(105.0, 1.0, Side::Sell, 0.0, OrderTag::Signal);
        let trade = tracker
            .close_position(&exit, 1, ExitReason::Signal, "exit")
            .unwrap();
        assert_eq!(trade.r_multiple, 0.0);
    }

    #[test]
    fn partial_clamps_to_remaining_size() {
        let mut tracker = PositionTracker::new();
        open_long(&mut tracker, 100.0, 1.0, 5.0);
        let oversize = fill(110.0, 3.0, Side::Sell, 0.0, OrderTag::TakeProfit(1));
        let trade = tracker
            .partial_close(&oversize, 1, ExitReason::TakeProfit(1), "tp1")
            .unwrap();
        assert_eq!(trade.size, 1.0);
        assert_eq!(tracker.position().unwrap().size, 0.0);
    }
}
