use serde::{Deserialize, Serialize};

use crate::analytics::Metrics;

/// Acceptance thresholds a run must clear to stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Criteria {
    pub min_trades: usize,
    pub min_profit_factor: f64,
    pub max_drawdown_pct: f64,
    pub min_win_rate: f64,
    pub min_avg_r: f64,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            min_trades: 30,
            min_profit_factor: 1.3,
            max_drawdown_pct: 20.0,
            min_win_rate: 35.0,
            min_avg_r: 0.1,
        }
    }
}

/// Partial threshold set; a present field overrides the tier below it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CriteriaOverride {
    pub min_trades: Option<usize>,
    pub min_profit_factor: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub min_win_rate: Option<f64>,
    pub min_avg_r: Option<f64>,
}

impl CriteriaOverride {
    pub fn apply(&self, base: &mut Criteria) {
        if let Some(v) = self.min_trades {
            base.min_trades = v;
        }
        if let Some(v) = self.min_profit_factor {
            base.min_profit_factor = v;
        }
        if let Some(v) = self.max_drawdown_pct {
            base.max_drawdown_pct = v;
        }
        if let Some(v) = self.min_win_rate {
            base.min_win_rate = v;
        }
        if let Some(v) = self.min_avg_r {
            base.min_avg_r = v;
        }
    }
}

/// Three-tier merge: global, then asset class, then strategy profile;
/// rightmost present field wins.
pub fn resolve_criteria(
    global: &Criteria,
    asset_class: Option<&CriteriaOverride>,
    strategy_profile: Option<&CriteriaOverride>,
) -> Criteria {
    let mut merged = global.clone();
    if let Some(class) = asset_class {
        class.apply(&mut merged);
    }
    if let Some(profile) = strategy_profile {
        profile.apply(&mut merged);
    }
    merged
}

impl Criteria {
    /// All thresholds must hold, including positive total PnL.
    pub fn met(&self, metrics: &Metrics) -> bool {
        metrics.total_pnl > 0.0
            && metrics.num_trades >= self.min_trades
            && metrics.profit_factor.map_or(false, |pf| pf >= self.min_profit_factor)
            && metrics.max_drawdown_pct <= self.max_drawdown_pct
            && metrics.win_rate.map_or(false, |wr| wr >= self.min_win_rate)
            && metrics.avg_r.map_or(false, |r| r >= self.min_avg_r)
    }

    /// Human-readable list of the thresholds a metrics set fails.
    pub fn unmet(&self, metrics: &Metrics) -> Vec<String> {
        let mut unmet = Vec::new();
        if metrics.total_pnl <= 0.0 {
            unmet.push(format!("totalPnl {:.2} <= 0", metrics.total_pnl));
        }
        if metrics.num_trades < self.min_trades {
            unmet.push(format!("numTrades {} < {}", metrics.num_trades, self.min_trades));
        }
        if !metrics.profit_factor.map_or(false, |pf| pf >= self.min_profit_factor) {
            unmet.push(format!(
                "profitFactor {:?} < {}",
                metrics.profit_factor, self.min_profit_factor
            ));
        }
        if metrics.max_drawdown_pct > self.max_drawdown_pct {
            unmet.push(format!(
                "maxDrawdown {:.2}% > {:.2}%",
                metrics.max_drawdown_pct, self.max_drawdown_pct
            ));
        }
        if !metrics.win_rate.map_or(false, |wr| wr >= self.min_win_rate) {
            unmet.push(format!("winRate {:?} < {}", metrics.win_rate, self.min_win_rate));
        }
        if !metrics.avg_r.map_or(false, |r| r >= self.min_avg_r) {
            unmet.push(format!("avgR {:?} < {}", metrics.avg_r, self.min_avg_r));
        }
        unmet
    }
}
