use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::scoring::Verdict;

/// Where the loop currently is. `Init` exists only until the first
/// iteration starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Refine,
    Research,
    Restructure,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Refine => "refine",
            Phase::Research => "research",
            Phase::Restructure => "restructure",
            Phase::Done => "done",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhaseEvent {
    IterStart,
    Verdict(Verdict),
    NoChange,
    ChangeApplied { structural: bool },
    CompileError,
    TransientError,
    BacktestOk { score: f64 },
    CheckpointSaved { score: f64, pnl: f64, iter: u32 },
    CriteriaMet,
    Escalate,
    PhaseTimeout,
}

/// The loop's state machine and its context record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseMachine {
    pub phase: Phase,
    pub phase_iter_count: u32,
    pub neutral_streak: u32,
    pub no_change_count: u32,
    pub fix_attempts: u32,
    pub transient_failures: u32,
    pub phase_cycles: u32,
    pub max_cycles: u32,
    pub best_score: f64,
    pub best_pnl: f64,
    pub best_iter: u32,
    pub current_score: f64,
    pub needs_rebuild: bool,
    pub research_brief_path: Option<PathBuf>,
}

impl PhaseMachine {
    pub fn new(max_cycles: u32) -> Self {
        Self {
            phase: Phase::Init,
            phase_iter_count: 0,
            neutral_streak: 0,
            no_change_count: 0,
            fix_attempts: 0,
            transient_failures: 0,
            phase_cycles: 0,
            max_cycles,
            best_score: 0.0,
            best_pnl: 0.0,
            best_iter: 0,
            current_score: 0.0,
            needs_rebuild: false,
            research_brief_path: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Applies one event; returns the (from, to) pair when the phase moved.
    pub fn apply(&mut self, event: PhaseEvent) -> Option<(Phase, Phase)> {
        match event {
            PhaseEvent::IterStart => {
                let moved = if self.phase == Phase::Init {
                    Some(self.transition(Phase::Refine))
                } else {
                    None
                };
                self.phase_iter_count += 1;
                moved
            }
            PhaseEvent::Verdict(verdict) => {
                if verdict == Verdict::Neutral {
                    self.neutral_streak += 1;
                } else {
                    self.neutral_streak = 0;
                }
                None
            }
            PhaseEvent::NoChange => {
                self.no_change_count += 1;
                None
            }
            PhaseEvent::ChangeApplied { structural } => {
                self.no_change_count = 0;
                if structural {
                    self.needs_rebuild = true;
                }
                None
            }
            PhaseEvent::CompileError => {
                self.fix_attempts += 1;
                self.needs_rebuild = true;
                None
            }
            PhaseEvent::TransientError => {
                self.transient_failures += 1;
                None
            }
            PhaseEvent::BacktestOk { score } => {
                self.fix_attempts = 0;
                self.transient_failures = 0;
                self.needs_rebuild = false;
                self.current_score = score;
                None
            }
            PhaseEvent::CheckpointSaved { score, pnl, iter } => {
                self.best_score = score;
                self.best_pnl = pnl;
                self.best_iter = iter;
                None
            }
            PhaseEvent::CriteriaMet => Some(self.transition(Phase::Done)),
            PhaseEvent::Escalate => self.escalate(false),
            PhaseEvent::PhaseTimeout => self.escalate(true),
        }
    }

    /// Phase escalation. `forced` (PHASE_TIMEOUT) skips the per-phase
    /// trigger conditions but follows the same routes.
    fn escalate(&mut self, forced: bool) -> Option<(Phase, Phase)> {
        match self.phase {
            Phase::Refine => {
                let triggered = self.neutral_streak >= 3 || self.no_change_count >= 2;
                if forced || (triggered && self.phase_cycles < self.max_cycles) {
                    return Some(self.transition(Phase::Research));
                }
                None
            }
            Phase::Research => {
                if forced || self.no_change_count >= 2 {
                    return Some(self.transition(Phase::Restructure));
                }
                None
            }
            Phase::Restructure => {
                if forced || self.no_change_count >= 2 {
                    if self.phase_cycles + 1 < self.max_cycles {
                        self.phase_cycles += 1;
                        self.research_brief_path = None;
                        return Some(self.transition(Phase::Refine));
                    }
                    return Some(self.transition(Phase::Done));
                }
                None
            }
            Phase::Init | Phase::Done => None,
        }
    }

    fn transition(&mut self, to: Phase) -> (Phase, Phase) {
        let from = self.phase;
        info!(from = %from, to = %to, "phase transition");
        self.phase = to;
        self.phase_iter_count = 0;
        self.neutral_streak = 0;
        self.no_change_count = 0;
        (from, to)
    }
}
