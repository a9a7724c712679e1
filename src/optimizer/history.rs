#![allow(dead_code)]
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::analytics::Metrics;

use super::checkpoint::atomic_write;
use super::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeScale {
    Parametric,
    Structural,
}

/// The change an iteration applied, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub param: String,
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub scale: ChangeScale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationVerdict {
    Pending,
    Improved,
    Degraded,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iter: u32,
    /// UTC calendar date the iteration ran.
    pub date: String,
    pub change: Option<AppliedChange>,
    pub metrics_before: Option<Metrics>,
    pub metrics_after: Option<Metrics>,
    pub verdict: IterationVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeverWorkedEntry {
    pub param: String,
    pub value: f64,
    pub iter: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    pub text: String,
    pub iter: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproachVerdict {
    Active,
    Exhausted,
    Promising,
}

/// A named strategy variant the loop has tried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approach {
    pub id: u32,
    pub name: String,
    pub verdict: ApproachVerdict,
}

const HYPOTHESIS_TTL_ITERS: u32 = 5;
const IMPROVED_PCT: f64 = 5.0;
const DEGRADED_PCT: f64 = -5.0;
const NEVER_WORKED_PCT: f64 = -15.0;

/// The persistent journal across iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterHistory {
    pub records: Vec<IterationRecord>,
    /// Param name to the distinct values already tested.
    pub explored_ranges: BTreeMap<String, Vec<f64>>,
    pub never_worked: Vec<NeverWorkedEntry>,
    pub pending_hypotheses: Vec<Hypothesis>,
    pub approaches: Vec<Approach>,
    pub current_phase: Phase,
    pub phase_start_iter: u32,
}

impl Default for ParameterHistory {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            explored_ranges: BTreeMap::new(),
            never_worked: Vec::new(),
            pending_hypotheses: Vec::new(),
            approaches: Vec::new(),
            current_phase: Phase::Init,
            phase_start_iter: 0,
        }
    }
}

impl ParameterHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_or_default(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())
    }

    /// Appends this iteration's record, still pending its outcome.
    pub fn append_record(
        &mut self,
        iter: u32,
        date: &str,
        change: Option<AppliedChange>,
        metrics_before: &Metrics,
    ) {
        if let Some(change) = &change {
            if let Some(to) = change.to {
                self.record_explored(&change.param, to);
            }
        }
        self.records.push(IterationRecord {
            iter,
            date: date.to_string(),
            change,
            metrics_before: Some(metrics_before.clone()),
            metrics_after: None,
            verdict: IterationVerdict::Pending,
        });
    }

    pub fn record_explored(&mut self, param: &str, value: f64) {
        let values = self.explored_ranges.entry(param.to_string()).or_default();
        if !values.iter().any(|v| (v - value).abs() < 1e-12) {
            values.push(value);
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        }
    }

    pub fn was_explored(&self, param: &str, value: f64) -> bool {
        self.explored_ranges
            .get(param)
            .map(|values| values.iter().any(|v| (v - value).abs() < 1e-12))
            .unwrap_or(false)
    }

    /// Back-fills the newest pending record with the next iteration's
    /// metrics and a verdict, and ages out stale hypotheses.
    pub fn backfill_previous(&mut self, metrics_after: &Metrics, current_iter: u32) {
        if let Some(record) = self
            .records
            .iter_mut()
            .rev()
            .find(|r| r.verdict == IterationVerdict::Pending)
        {
            let before = record.metrics_before.as_ref();
            let pnl_before = before.map(|m| m.total_pnl).unwrap_or(0.0);
            let trades_before = before.map(|m| m.num_trades).unwrap_or(0);

            let delta_pct = if pnl_before.abs() > f64::EPSILON {
                (metrics_after.total_pnl - pnl_before) / pnl_before.abs() * 100.0
            } else if metrics_after.total_pnl > 0.0 {
                f64::INFINITY
            } else if metrics_after.total_pnl < 0.0 {
                f64::NEG_INFINITY
            } else {
                0.0
            };

            let verdict = if delta_pct > IMPROVED_PCT {
                IterationVerdict::Improved
            } else if delta_pct < DEGRADED_PCT {
                IterationVerdict::Degraded
            } else {
                IterationVerdict::Neutral
            };
            record.metrics_after = Some(metrics_after.clone());
            record.verdict = verdict;
            debug!(iter = record.iter, ?verdict, delta_pct, "iteration verdict back-filled");

            let change = record.change.clone();
            let record_iter = record.iter;
            match verdict {
                IterationVerdict::Degraded if delta_pct < NEVER_WORKED_PCT => {
                    if let Some(change) = change {
                        if let Some(value) = change.to {
                            self.never_worked.push(NeverWorkedEntry {
                                param: change.param,
                                value,
                                iter: record_iter,
                                reason: "pnl_degraded".to_string(),
                            });
                        }
                    }
                }
                IterationVerdict::Neutral if metrics_after.num_trades == trades_before => {
                    if let Some(change) = change {
                        if let Some(value) = change.to {
                            self.never_worked.push(NeverWorkedEntry {
                                param: change.param,
                                value,
                                iter: record_iter,
                                reason: "no_trade_impact".to_string(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        self.pending_hypotheses
            .retain(|h| current_iter.saturating_sub(h.iter) <= HYPOTHESIS_TTL_ITERS);
    }

    pub fn add_hypothesis(&mut self, text: &str, iter: u32) {
        self.pending_hypotheses.push(Hypothesis { text: text.to_string(), iter });
    }

    /// Marks the active approach exhausted and opens a successor.
    pub fn rotate_approach(&mut self, name: &str) -> u32 {
        for approach in &mut self.approaches {
            if approach.verdict == ApproachVerdict::Active {
                approach.verdict = ApproachVerdict::Exhausted;
            }
        }
        let id = self.approaches.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        self.approaches.push(Approach {
            id,
            name: name.to_string(),
            verdict: ApproachVerdict::Active,
        });
        id
    }

    pub fn set_phase(&mut self, phase: Phase, iter: u32) {
        self.current_phase = phase;
        self.phase_start_iter = iter;
    }
}
