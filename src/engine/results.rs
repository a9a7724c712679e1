use serde::{Deserialize, Serialize};

use crate::types::{CompletedTrade, EquityPoint};

/// Everything one engine run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_equity: f64,
    pub total_pnl: f64,
    pub max_drawdown_pct: f64,
    pub bars_processed: usize,
    pub trades: Vec<CompletedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestResult {
    /// Pretty print to console.
    pub fn print_summary(&self) {
        let wins = self.trades.iter().filter(|t| t.pnl > 0.0).count();
        let losses = self.trades.iter().filter(|t| t.pnl < 0.0).count();
        let fees: f64 = self.trades.iter().map(|t| t.commission).sum();
        let slippage: f64 = self.trades.iter().map(|t| t.slippage).sum();

        println!("\n{}", "=".repeat(60));
        println!("                    BACKTEST RESULTS");
        println!("{}", "=".repeat(60));
        println!("Initial Capital:    ${:.2}", self.initial_capital);
        println!("Final Equity:       ${:.2}", self.final_equity);
        println!("Total PnL:          ${:.2}", self.total_pnl);
        println!("Max Drawdown:       {:.2}%", self.max_drawdown_pct);
        println!("Bars Processed:     {}", self.bars_processed);
        println!("{}", "-".repeat(60));
        println!("TRADES");
        println!("  Total:            {}", self.trades.len());
        println!("  Winners:          {}", wins);
        println!("  Losers:           {}", losses);
        println!("  Commission Paid:  ${:.2}", fees);
        println!("  Slippage Paid:    ${:.2}", slippage);
        println!("{}", "-".repeat(60));
        for trade in &self.trades {
            println!(
                "  {} {:.4} @ {:.2} -> {:.2} [{}] PnL ${:.2} ({:.2}R)",
                trade.direction,
                trade.size,
                trade.entry_price,
                trade.exit_price,
                trade.exit_reason,
                trade.pnl,
                trade.r_multiple
            );
        }
        println!("{}", "=".repeat(60));
    }
}
