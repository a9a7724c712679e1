use serde::{Deserialize, Serialize};

use crate::analytics::Metrics;

/// Component weights of the multi-objective score; they sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreWeights {
    pub pf: f64,
    pub avg_r: f64,
    pub wr: f64,
    pub dd: f64,
    pub complexity: f64,
    pub sample_confidence: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { pf: 25.0, avg_r: 20.0, wr: 10.0, dd: 15.0, complexity: 10.0, sample_confidence: 20.0 }
    }
}

/// Multi-objective score out of 100, rounded to 2 decimals.
pub fn compute_score(metrics: &Metrics, optimizable_params: usize, weights: &ScoreWeights) -> f64 {
    let pf = metrics.profit_factor.unwrap_or(0.0);
    let avg_r = metrics.avg_r.unwrap_or(0.0);
    let wr = metrics.win_rate.unwrap_or(0.0);

    let pf_score = (pf / 2.0).min(1.0);
    let avg_r_score = (avg_r / 0.5).min(1.0);
    let wr_score = (wr / 40.0).min(1.0);
    let dd_score = (1.0 - metrics.max_drawdown_pct / 15.0).max(0.0);
    let complexity_score = (1.0 - (optimizable_params as f64 - 5.0) / 15.0).clamp(0.0, 1.0);
    let sample_score = (metrics.num_trades as f64 / 150.0).min(1.0);

    let score = pf_score * weights.pf
        + avg_r_score * weights.avg_r
        + wr_score * weights.wr
        + dd_score * weights.dd
        + complexity_score * weights.complexity
        + sample_score * weights.sample_confidence;

    (score * 100.0).round() / 100.0
}

/// Iteration-over-iteration verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Accept,
    Reject,
    Neutral,
}

/// Accept above +2%, reject below -15%, neutral in between. A non-positive
/// previous score accepts any positive newcomer.
pub fn compare_scores(new: f64, old: f64) -> Verdict {
    if old <= 0.0 {
        return if new > 0.0 { Verdict::Accept } else { Verdict::Neutral };
    }
    if new > old * 1.02 {
        Verdict::Accept
    } else if new < old * 0.85 {
        Verdict::Reject
    } else {
        Verdict::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(pf: f64, avg_r: f64, wr: f64, dd: f64, trades: usize) -> Metrics {
        Metrics {
            total_pnl: 100.0,
            num_trades: trades,
            gross_profit: 0.0,
            gross_loss: 0.0,
            profit_factor: Some(pf),
            win_rate: Some(wr),
            avg_r: Some(avg_r),
            max_drawdown_pct: dd,
        }
    }

    #[test]
    fn perfect_components_hit_100() {
        let m = metrics(2.0, 0.5, 40.0, 0.0, 150);
        let score = compute_score(&m, 5, &ScoreWeights::default());
        assert_eq!(score, 100.0);
    }

    #[test]
    fn score_is_monotonic_in_profit_factor() {
        let weights = ScoreWeights::default();
        let mut last = f64::MIN;
        for pf10 in 0..30 {
            let pf = pf10 as f64 / 10.0;
            let score = compute_score(&metrics(pf, 0.2, 30.0, 5.0, 60), 5, &weights);
            assert!(score >= last, "pf {} dropped the score", pf);
            last = score;
        }
        // Saturation at pf >= 2.0.
        let at_cap = compute_score(&metrics(2.0, 0.2, 30.0, 5.0, 60), 5, &weights);
        let beyond = compute_score(&metrics(5.0, 0.2, 30.0, 5.0, 60), 5, &weights);
        assert_eq!(at_cap, beyond);
    }

    #[test]
    fn infinite_pf_saturates() {
        let mut m = metrics(0.0, 0.5, 40.0, 0.0, 150);
        m.profit_factor = Some(f64::INFINITY);
        assert_eq!(compute_score(&m, 5, &ScoreWeights::default()), 100.0);
    }

    #[test]
    fn parameter_bloat_costs_complexity() {
        let weights = ScoreWeights::default();
        let lean = compute_score(&metrics(2.0, 0.5, 40.0, 0.0, 150), 5, &weights);
        let bloated = compute_score(&metrics(2.0, 0.5, 40.0, 0.0, 150), 20, &weights);
        assert_eq!(lean - bloated, weights.complexity);
    }

    #[test]
    fn drawdown_erodes_its_component() {
        let weights = ScoreWeights::default();
        let calm = compute_score(&metrics(2.0, 0.5, 40.0, 0.0, 150), 5, &weights);
        let rough = compute_score(&metrics(2.0, 0.5, 40.0, 15.0, 150), 5, &weights);
        assert_eq!(calm - rough, weights.dd);
        // Past 15% the component floors at zero.
        let extreme = compute_score(&metrics(2.0, 0.5, 40.0, 60.0, 150), 5, &weights);
        assert_eq!(rough, extreme);
    }

    #[test]
    fn verdict_bands() {
        assert_eq!(compare_scores(60.0, 50.0), Verdict::Accept);
        assert_eq!(compare_scores(51.5, 50.0), Verdict::Accept); // > 2%
        assert_eq!(compare_scores(50.5, 50.0), Verdict::Neutral);
        assert_eq!(compare_scores(45.0, 50.0), Verdict::Neutral);
        assert_eq!(compare_scores(42.0, 50.0), Verdict::Reject); // < 85%
    }

    #[test]
    fn verdict_with_non_positive_previous() {
        assert_eq!(compare_scores(10.0, 0.0), Verdict::Accept);
        assert_eq!(compare_scores(0.0, 0.0), Verdict::Neutral);
        assert_eq!(compare_scores(-1.0, -5.0), Verdict::Neutral);
    }
}
