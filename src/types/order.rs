#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Stop,
    Limit,
}

/// What an order is for. TakeProfit carries its 1-based target index so the
/// ledger can distinguish tp1 from tp2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTag {
    Entry,
    StopLoss,
    TakeProfit(u8),
    Trail,
    Signal,
    EndOfData,
}

impl OrderTag {
    pub fn is_take_profit(&self) -> bool {
        matches!(self, OrderTag::TakeProfit(_))
    }

    pub fn label(&self) -> String {
        match self {
            OrderTag::Entry => "entry".to_string(),
            OrderTag::StopLoss => "sl".to_string(),
            OrderTag::TakeProfit(n) => format!("tp{}", n),
            OrderTag::Trail => "trail".to_string(),
            OrderTag::Signal => "signal".to_string(),
            OrderTag::EndOfData => "eod".to_string(),
        }
    }
}

impl fmt::Display for OrderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub side: Side,
    pub order_type: OrderType,
    /// Required for stop and limit orders, absent for market.
    pub trigger_px: Option<f64>,
    pub size: f64,
    pub reduce_only: bool,
    pub tag: OrderTag,
}

impl Order {
    pub fn market(id: u64, side: Side, size: f64, reduce_only: bool, tag: OrderTag) -> Self {
        Self { id, side, order_type: OrderType::Market, trigger_px: None, size, reduce_only, tag }
    }

    pub fn stop(id: u64, side: Side, trigger_px: f64, size: f64, reduce_only: bool, tag: OrderTag) -> Self {
        Self { id, side, order_type: OrderType::Stop, trigger_px: Some(trigger_px), size, reduce_only, tag }
    }

    pub fn limit(id: u64, side: Side, trigger_px: f64, size: f64, reduce_only: bool, tag: OrderTag) -> Self {
        Self { id, side, order_type: OrderType::Limit, trigger_px: Some(trigger_px), size, reduce_only, tag }
    }
}

/// The executed transaction resulting from a triggered order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: u64,
    pub price: f64,
    pub size: f64,
    pub side: Side,
    pub fee: f64,
    /// Cost of slippage in quote currency, |exec - base| * size.
    pub slippage: f64,
    pub t: i64,
    pub tag: OrderTag,
}

/// Process-local monotonic order id source, resettable for deterministic
/// tests. Owned by the engine instance; there is no global state.
#[derive(Debug, Default)]
pub struct OrderIdGen {
    next: u64,
}

impl OrderIdGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn next_id(&mut self) -> u64 {
        self.next += 1;
        self.next
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
