use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::CompletedTrade;

/// Headline metrics over a trade ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_pnl: f64,
    pub num_trades: usize,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// +inf with no losses, 0.0 with no wins, None on an empty ledger.
    pub profit_factor: Option<f64>,
    pub win_rate: Option<f64>,
    pub avg_r: Option<f64>,
    pub max_drawdown_pct: f64,
}

pub fn compute_metrics(trades: &[CompletedTrade], max_drawdown_pct: f64) -> Metrics {
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let num_trades = trades.len();
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl.abs()).sum();

    let (profit_factor, win_rate, avg_r) = if num_trades == 0 {
        (None, None, None)
    } else {
        let pf = if gross_loss == 0.0 {
            if gross_profit > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            gross_profit / gross_loss
        };
        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        let wr = 100.0 * wins as f64 / num_trades as f64;
        let avg_r = trades.iter().map(|t| t.r_multiple).sum::<f64>() / num_trades as f64;
        (Some(pf), Some(wr), Some(avg_r))
    };

    Metrics {
        total_pnl,
        num_trades,
        gross_profit,
        gross_loss,
        profit_factor,
        win_rate,
        avg_r,
        max_drawdown_pct,
    }
}

/// Per-bucket statistics for one dimension slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub count: usize,
    pub pnl: f64,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
}

impl BucketStats {
    fn from_trades<'a>(trades: impl Iterator<Item = &'a CompletedTrade>) -> Self {
        let trades: Vec<&CompletedTrade> = trades.collect();
        let count = trades.len();
        let pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        if count == 0 {
            return Self { count, pnl, win_rate: None, profit_factor: None };
        }
        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
        let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl.abs()).sum();
        let profit_factor = if gross_loss == 0.0 {
            if gross_profit > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            gross_profit / gross_loss
        };
        Self {
            count,
            pnl,
            win_rate: Some(100.0 * wins as f64 / count as f64),
            profit_factor: Some(profit_factor),
        }
    }
}

/// Counterfactual "what if this bucket's trades had been excluded".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSimulation {
    pub bucket: String,
    pub trades_removed: usize,
    pub pnl_delta: f64,
    pub pnl_after: f64,
    pub trades_after: usize,
}

/// 70/30 in-order split with a test/train profit-factor ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSplit {
    pub train_pf: Option<f64>,
    pub test_pf: Option<f64>,
    pub ratio: Option<f64>,
    pub overfit: bool,
}

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAnalysis {
    pub by_direction: BTreeMap<String, BucketStats>,
    pub by_exit: BTreeMap<String, BucketStats>,
    pub by_day_of_week: BTreeMap<String, BucketStats>,
    pub by_hour: BTreeMap<u32, BucketStats>,
    /// Hours ranked by PnL, best first / worst first.
    pub best_hours: Vec<u32>,
    pub worst_hours: Vec<u32>,
    pub by_session: BTreeMap<String, BucketStats>,
    pub best_trades: Vec<CompletedTrade>,
    pub worst_trades: Vec<CompletedTrade>,
    pub avg_bars_held_winners: Option<f64>,
    pub avg_bars_held_losers: Option<f64>,
    pub filter_simulations: Vec<FilterSimulation>,
    pub walk_forward: Option<WalkForwardSplit>,
}

fn session_name(hour: u32) -> &'static str {
    match hour {
        0..=7 => "Asia",
        8..=12 => "London",
        13..=20 => "NY",
        _ => "Off-peak",
    }
}

fn entry_hour(trade: &CompletedTrade) -> u32 {
    trade.entry_time.hour()
}

fn pf_of(trades: &[&CompletedTrade]) -> Option<f64> {
    if trades.is_empty() {
        return None;
    }
    let gross_profit: f64 = trades.iter().filter(|t| t.pnl > 0.0).map(|t| t.pnl).sum();
    let gross_loss: f64 = trades.iter().filter(|t| t.pnl < 0.0).map(|t| t.pnl.abs()).sum();
    Some(if gross_loss == 0.0 {
        if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        gross_profit / gross_loss
    })
}

/// Splits the ledger 70/30 in order and compares out-of-sample PF to
/// in-sample PF. A ratio under 0.5 flags likely overfit.
pub fn walk_forward_split(trades: &[CompletedTrade]) -> Option<WalkForwardSplit> {
    if trades.len() < 5 {
        return None;
    }
    let cut = (trades.len() as f64 * 0.7).floor() as usize;
    let train: Vec<&CompletedTrade> = trades[..cut].iter().collect();
    let test: Vec<&CompletedTrade> = trades[cut..].iter().collect();

    let train_pf = pf_of(&train);
    let test_pf = pf_of(&test);
    let ratio = match (train_pf, test_pf) {
        (Some(train), Some(test)) if train > 0.0 && train.is_finite() => Some(test / train),
        _ => None,
    };
    let overfit = ratio.map(|r| r < 0.5).unwrap_or(false);

    Some(WalkForwardSplit { train_pf, test_pf, ratio, overfit })
}

/// Aggregates a trade ledger into by-dimension statistics.
pub fn analyze_trades(trades: &[CompletedTrade]) -> TradeAnalysis {
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

    let mut by_direction = BTreeMap::new();
    for key in ["long", "short"] {
        let stats = BucketStats::from_trades(
            trades.iter().filter(|t| t.direction.as_str() == key),
        );
        if stats.count > 0 {
            by_direction.insert(key.to_string(), stats);
        }
    }

    let mut by_exit: BTreeMap<String, BucketStats> = BTreeMap::new();
    let exit_labels: Vec<String> = {
        let mut labels: Vec<String> = trades.iter().map(|t| t.exit_reason.label()).collect();
        labels.sort();
        labels.dedup();
        labels
    };
    for label in &exit_labels {
        by_exit.insert(
            label.clone(),
            BucketStats::from_trades(trades.iter().filter(|t| &t.exit_reason.label() == label)),
        );
    }

    let mut by_day_of_week = BTreeMap::new();
    for (dow, name) in DAY_NAMES.iter().enumerate() {
        let stats = BucketStats::from_trades(trades.iter().filter(|t| {
            t.entry_time.weekday().num_days_from_sunday() as usize == dow
        }));
        if stats.count > 0 {
            by_day_of_week.insert((*name).to_string(), stats);
        }
    }

    let mut by_hour = BTreeMap::new();
    for hour in 0..24u32 {
        let stats = BucketStats::from_trades(trades.iter().filter(|t| entry_hour(t) == hour));
        if stats.count > 0 {
            by_hour.insert(hour, stats);
        }
    }

    let mut hours_ranked: Vec<(u32, f64)> =
        by_hour.iter().map(|(h, s)| (*h, s.pnl)).collect();
    hours_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let best_hours: Vec<u32> = hours_ranked.iter().take(3).map(|(h, _)| *h).collect();
    let worst_hours: Vec<u32> = hours_ranked.iter().rev().take(3).map(|(h, _)| *h).collect();

    let mut by_session = BTreeMap::new();
    for name in ["Asia", "London", "NY", "Off-peak"] {
        let stats = BucketStats::from_trades(
            trades.iter().filter(|t| session_name(entry_hour(t)) == name),
        );
        if stats.count > 0 {
            by_session.insert(name.to_string(), stats);
        }
    }

    let mut ranked: Vec<&CompletedTrade> = trades.iter().collect();
    ranked.sort_by(|a, b| b.pnl.partial_cmp(&a.pnl).unwrap_or(std::cmp::Ordering::Equal));
    let best_trades: Vec<CompletedTrade> = ranked.iter().take(3).map(|t| (*t).clone()).collect();
    let worst_trades: Vec<CompletedTrade> =
        ranked.iter().rev().take(3).map(|t| (*t).clone()).collect();

    let winners: Vec<&CompletedTrade> = trades.iter().filter(|t| t.pnl > 0.0).collect();
    let losers: Vec<&CompletedTrade> = trades.iter().filter(|t| t.pnl < 0.0).collect();
    let avg_bars = |set: &[&CompletedTrade]| {
        if set.is_empty() {
            None
        } else {
            Some(set.iter().map(|t| t.held_bars as f64).sum::<f64>() / set.len() as f64)
        }
    };

    // Counterfactuals: drop each hour bucket, each weekday bucket, and the
    // whole stop-loss bucket.
    let mut filter_simulations = Vec::new();
    for (hour, stats) in &by_hour {
        filter_simulations.push(FilterSimulation {
            bucket: format!("hour:{}", hour),
            trades_removed: stats.count,
            pnl_delta: -stats.pnl,
            pnl_after: total_pnl - stats.pnl,
            trades_after: trades.len() - stats.count,
        });
    }
    for (day, stats) in &by_day_of_week {
        filter_simulations.push(FilterSimulation {
            bucket: format!("day:{}", day),
            trades_removed: stats.count,
            pnl_delta: -stats.pnl,
            pnl_after: total_pnl - stats.pnl,
            trades_after: trades.len() - stats.count,
        });
    }
    if let Some(sl) = by_exit.get("sl") {
        filter_simulations.push(FilterSimulation {
            bucket: "exit:sl".to_string(),
            trades_removed: sl.count,
            pnl_delta: -sl.pnl,
            pnl_after: total_pnl - sl.pnl,
            trades_after: trades.len() - sl.count,
        });
    }

    TradeAnalysis {
        by_direction,
        by_exit,
        by_day_of_week,
        by_hour,
        best_hours,
        worst_hours,
        by_session,
        best_trades,
        worst_trades,
        avg_bars_held_winners: avg_bars(&winners),
        avg_bars_held_losers: avg_bars(&losers),
        filter_simulations,
        walk_forward: walk_forward_split(trades),
    }
}
