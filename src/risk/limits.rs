use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Per-run trade permission limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Bars that must elapse after an exit before the next entry.
    pub cooldown_bars: u32,
    pub max_consecutive_losses: u32,
    /// Daily loss limit expressed in R relative to initial capital.
    pub max_daily_loss_r: f64,
    pub max_trades_per_day: u32,
    /// Global cap across strategies sharing the account.
    pub max_global_trades_day: u32,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            cooldown_bars: 1,
            max_consecutive_losses: 3,
            max_daily_loss_r: 0.03,
            max_trades_per_day: 5,
            max_global_trades_day: 10,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_consecutive_losses == 0 {
            return Err("Max consecutive losses must be > 0".to_string());
        }
        if self.max_daily_loss_r < 0.0 {
            return Err("Max daily loss (R) must be >= 0".to_string());
        }
        if self.max_trades_per_day == 0 || self.max_global_trades_day == 0 {
            return Err("Daily trade caps must be > 0".to_string());
        }
        Ok(())
    }
}

/// Rolling counters behind the engine's entry gate. Daily fields reset on
/// UTC calendar-day change.
#[derive(Debug, Clone, Default)]
pub struct TradeGuard {
    pub daily_pnl: f64,
    pub trades_today: u32,
    pub bars_since_exit: u32,
    pub consecutive_losses: u32,
    last_day: Option<NaiveDate>,
}

impl TradeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rolls the UTC day forward; returns true when a new day started and
    /// daily counters were zeroed.
    pub fn roll_day(&mut self, t_ms: i64) -> bool {
        let day = Utc
            .timestamp_millis_opt(t_ms)
            .single()
            .unwrap_or_default()
            .date_naive();
        if self.last_day != Some(day) {
            self.last_day = Some(day);
            self.daily_pnl = 0.0;
            self.trades_today = 0;
            self.consecutive_losses = 0;
            return true;
        }
        false
    }

    pub fn record_close(&mut self, pnl: f64) {
        self.daily_pnl += pnl;
    }

    pub fn record_full_exit(&mut self, pnl: f64) {
        self.bars_since_exit = 0;
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// The trade-permission gate evaluated before every entry attempt.
    pub fn can_trade(&self, limits: &RiskLimits, initial_capital: f64) -> bool {
        self.bars_since_exit > limits.cooldown_bars
            && self.consecutive_losses < limits.max_consecutive_losses
            && self.daily_pnl > -limits.max_daily_loss_r * initial_capital
            && self.trades_today < limits.max_trades_per_day
            && self.trades_today < limits.max_global_trades_day
    }
}
