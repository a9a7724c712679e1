#![allow(dead_code)]
use tracing::debug;

use crate::types::{Candle, Fill, Order, OrderTag, OrderType, Side};

use super::ExecutionParams;

/// Outcome of evaluating the pending book against one bar.
#[derive(Debug, Default)]
pub struct OrderCheck {
    /// Fills in book order, each with the comment its order was queued with.
    pub fills: Vec<(Fill, String)>,
    /// Take-profit orders cancelled by the same-bar SL-wins rule.
    pub cancelled_ids: Vec<u64>,
}

/// The pending-order book for one engine run. Orders never escape: they are
/// consumed into fills or cancelled when the position closes.
#[derive(Debug)]
pub struct OrderManager {
    pending: Vec<(Order, String)>,
    params: ExecutionParams,
}

impl OrderManager {
    pub fn new(params: ExecutionParams) -> Self {
        Self { pending: Vec::new(), params }
    }

    pub fn add_order(&mut self, order: Order, comment: impl Into<String>) {
        self.pending.push((order, comment.into()));
    }

    pub fn remove_orders_by_tag(&mut self, tag: OrderTag) {
        self.pending.retain(|(o, _)| o.tag != tag);
    }

    pub fn clear_orders(&mut self) {
        self.pending.clear();
    }

    pub fn pending_orders(&self) -> &[(Order, String)] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Trigger price of the resting stop-loss order, if one is pending.
    pub fn stop_loss_trigger(&self) -> Option<f64> {
        self.pending
            .iter()
            .find(|(o, _)| o.tag == OrderTag::StopLoss)
            .and_then(|(o, _)| o.trigger_px)
    }

    /// Evaluates every pending order against one bar.
    ///
    /// Triggering is pessimistic: intra-bar ordering is unknown, so when the
    /// bar reaches both the stop-loss and a take-profit, the SL fill wins and
    /// the TP orders are cancelled. Triggered and cancelled orders leave the
    /// book; the rest stay pending.
    pub fn check_orders(&mut self, candle: &Candle) -> OrderCheck {
        let mut triggered: Vec<(Order, String, f64)> = Vec::new();
        let mut remaining: Vec<(Order, String)> = Vec::new();

        for (order, comment) in self.pending.drain(..) {
            match Self::trigger_price(&order, candle) {
                Some(base) => triggered.push((order, comment, base)),
                None => remaining.push((order, comment)),
            }
        }

        let sl_hit = triggered.iter().any(|(o, _, _)| o.tag == OrderTag::StopLoss);
        let tp_hit = triggered.iter().any(|(o, _, _)| o.tag.is_take_profit());

        let mut check = OrderCheck::default();

        for (order, comment, base) in triggered {
            if sl_hit && order.tag.is_take_profit() {
                debug!(order_id = order.id, "TP cancelled: SL triggered on the same bar");
                check.cancelled_ids.push(order.id);
                continue;
            }
            if sl_hit && tp_hit && order.tag == OrderTag::StopLoss {
                debug!(order_id = order.id, "SL and TP on one bar, taking the SL");
            }

            let price = match order.order_type {
                // Limit fills execute at the trigger with no slippage.
                OrderType::Limit => base,
                OrderType::Market | OrderType::Stop => self.params.apply_slippage(base, order.side),
            };
            let fill = Fill {
                order_id: order.id,
                price,
                size: order.size,
                side: order.side,
                fee: self.params.commission(price, order.size),
                slippage: (price - base).abs() * order.size,
                t: candle.t,
                tag: order.tag,
            };
            check.fills.push((fill, comment));
        }

        self.pending = remaining;
        check
    }

    /// Base fill price when the order triggers on this bar, None otherwise.
    fn trigger_price(order: &Order, candle: &Candle) -> Option<f64> {
        match order.order_type {
            OrderType::Market => Some(candle.o),
            OrderType::Stop => {
                let trigger = order.trigger_px?;
                match order.side {
                    Side::Buy if candle.h >= trigger => Some(trigger),
                    Side::Sell if candle.l <= trigger => Some(trigger),
                    _ => None,
                }
            }
            OrderType::Limit => {
                let trigger = order.trigger_px?;
                match order.side {
                    Side::Buy if candle.l <= trigger => Some(trigger),
                    Side::Sell if candle.h >= trigger => Some(trigger),
                    _ => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle { t: 1_000, o, h, l, c, v: 1.0, n: 1 }
    }

    fn manager(slippage_bps: f64, commission_pct: f64) -> OrderManager {
        OrderManager::new(ExecutionParams { slippage_bps, commission_pct })
    }

    #[test]
    fn market_fills_at_open_with_slippage() {
        let mut om = manager(10.0, 0.0);
        om.add_order(Order::market(1, Side::Buy, 2.0, false, OrderTag::Entry), "enter");

        let check = om.check_orders(&bar(100.0, 101.0, 99.0, 100.5));
        assert_eq!(check.fills.len(), 1);
        let (fill, comment) = &check.fills[0];
        assert_eq!(comment, "enter");
        assert!((fill.price - 100.0 * 1.001).abs() < 1e-9);
        assert!((fill.slippage - 0.1 * 2.0).abs() < 1e-9);
        assert!(om.is_empty());
    }

    #[test]
    fn stop_triggers_on_the_correct_extreme() {
        let mut om = manager(0.0, 0.0);
        om.add_order(Order::stop(1, Side::Buy, 105.0, 1.0, false, OrderTag::Entry), "");
        om.add_order(Order::stop(2, Side::Sell, 95.0, 1.0, true, OrderTag::StopLoss), "");

        // High only reaches 104: nothing triggers.
        let check = om.check_orders(&bar(100.0, 104.0, 96.0, 100.0));
        assert!(check.fills.is_empty());
        assert_eq!(om.pending_orders().len(), 2);

        // High tags the buy stop, low stays above the sell stop.
        let check = om.check_orders(&bar(100.0, 105.5, 96.0, 100.0));
        assert_eq!(check.fills.len(), 1);
        assert_eq!(check.fills[0].0.order_id, 1);
        assert_eq!(check.fills[0].0.price, 105.0);
        assert_eq!(om.pending_orders().len(), 1);
    }

    #[test]
    fn limit_fills_without_slippage() {
        let mut om = manager(25.0, 0.1);
        om.add_order(Order::limit(1, Side::Sell, 110.0, 1.5, true, OrderTag::TakeProfit(1)), "");

        let check = om.check_orders(&bar(100.0, 111.0, 99.0, 110.5));
        let (fill, _) = &check.fills[0];
        assert_eq!(fill.price, 110.0);
        assert_eq!(fill.slippage, 0.0);
        assert!((fill.fee - 110.0 * 1.5 * 0.001).abs() < 1e-9);
    }

    #[test]
    fn sl_wins_over_tp_on_the_same_bar() {
        let mut om = manager(0.0, 0.0);
        om.add_order(Order::stop(1, Side::Sell, 90.0, 1.0, true, OrderTag::StopLoss), "");
        om.add_order(Order::limit(2, Side::Sell, 120.0, 0.5, true, OrderTag::TakeProfit(1)), "");
        om.add_order(Order::limit(3, Side::Sell, 130.0, 0.5, true, OrderTag::TakeProfit(2)), "");

        // Wide bar touches both sides.
        let check = om.check_orders(&bar(100.0, 135.0, 85.0, 110.0));
        assert_eq!(check.fills.len(), 1);
        assert_eq!(check.fills[0].0.tag, OrderTag::StopLoss);
        assert_eq!(check.fills[0].0.price, 90.0);
        assert_eq!(check.cancelled_ids, vec![2, 3]);
        assert!(om.is_empty());
    }

    #[test]
    fn tp_alone_fills_when_sl_untouched() {
        let mut om = manager(0.0, 0.0);
        om.add_order(Order::stop(1, Side::Sell, 90.0, 1.0, true, OrderTag::StopLoss), "");
        om.add_order(Order::limit(2, Side::Sell, 120.0, 0.5, true, OrderTag::TakeProfit(1)), "");

        let check = om.check_orders(&bar(110.0, 125.0, 105.0, 118.0));
        assert_eq!(check.fills.len(), 1);
        assert_eq!(check.fills[0].0.tag, OrderTag::TakeProfit(1));
        assert!(check.cancelled_ids.is_empty());
        // SL stays pending for the remainder.
        assert_eq!(om.pending_orders().len(), 1);
        assert_eq!(om.stop_loss_trigger(), Some(90.0));
    }

    #[test]
    fn remove_by_tag_and_clear() {
        let mut om = manager(0.0, 0.0);
        om.add_order(Order::limit(1, Side::Sell, 120.0, 0.5, true, OrderTag::TakeProfit(1)), "");
        om.add_order(Order::limit(2, Side::Sell, 125.0, 0.5, true, OrderTag::TakeProfit(1)), "");
        om.add_order(Order::stop(3, Side::Sell, 90.0, 1.0, true, OrderTag::StopLoss), "");

        om.remove_orders_by_tag(OrderTag::TakeProfit(1));
        assert_eq!(om.pending_orders().len(), 1);

        om.clear_orders();
        assert!(om.is_empty());
    }
}
