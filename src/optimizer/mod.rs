pub mod checkpoint;
pub mod compiler;
pub mod criteria;
pub mod events;
pub mod guardrails;
pub mod history;
pub mod lock;
pub mod oracle;
pub mod phase;
pub mod scoring;

pub use checkpoint::{atomic_write, Checkpoint, CheckpointStore};
pub use compiler::{AcceptAllCompiler, CommandCompiler, StrategyCompiler};
pub use criteria::{resolve_criteria, Criteria, CriteriaOverride};
pub use events::{EventSink, RunEvent};
pub use guardrails::{GuardrailViolation, Guardrails};
pub use history::{AppliedChange, ChangeScale, ParameterHistory};
pub use lock::AssetLock;
pub use oracle::{Oracle, OracleContext, OracleDecision, ScriptedOracle};
pub use phase::{Phase, PhaseEvent, PhaseMachine};
pub use scoring::{compare_scores, compute_score, ScoreWeights, Verdict};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::analytics::{analyze_trades, compute_metrics, Metrics};
use crate::cache::{CacheError, CandleCache};
use crate::config::{OptimizerConfig, PhaseConfig, StrategyBinding};
use crate::engine::{BacktestEngine, EngineError};
use crate::exchange::CandleFetcher;
use crate::strategies::{create_strategy, optimizable_param_count};

const WARMUP_BARS: i64 = 200;
const MAX_FIX_ATTEMPTS: u32 = 3;
const MAX_TRANSIENT_FAILURES: u32 = 3;
const LIVE_SOURCE_FILE: &str = "strategy.ts";
const HISTORY_FILE: &str = "parameter-history.json";

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("asset {0} is already being optimized")]
    AssetLocked(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("transient failures exhausted: {0}")]
    Transient(String),
    #[error("integrity error: {0}")]
    Integrity(String),
    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    CriteriaMet,
    BudgetExhausted,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::CriteriaMet => 0,
            RunOutcome::BudgetExhausted => 2,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::CriteriaMet => "criteria_met",
            RunOutcome::BudgetExhausted => "budget_exhausted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub iterations: u32,
    pub best_iter: u32,
    pub best_score: f64,
    pub best_metrics: Option<Metrics>,
}

fn budget_for(phases: &PhaseConfig, phase: Phase) -> u32 {
    match phase {
        Phase::Refine => phases.refine.max_iter,
        Phase::Research => phases.research.max_iter,
        Phase::Restructure => phases.restructure.max_iter,
        Phase::Init | Phase::Done => u32::MAX,
    }
}

/// Drives repeated backtests against one (asset, strategy) binding until the
/// acceptance criteria hold or the phase budget runs out.
pub struct Orchestrator {
    config: OptimizerConfig,
    asset: String,
    strategy_key: String,
    oracle: Box<dyn Oracle>,
    compiler: Box<dyn StrategyCompiler>,
    cache: CandleCache,
    fetcher: Box<dyn CandleFetcher>,
    events: EventSink,
    work_dir: PathBuf,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OptimizerConfig,
        asset: impl Into<String>,
        strategy_key: impl Into<String>,
        oracle: Box<dyn Oracle>,
        compiler: Box<dyn StrategyCompiler>,
        cache: CandleCache,
        fetcher: Box<dyn CandleFetcher>,
        events: EventSink,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            asset: asset.into(),
            strategy_key: strategy_key.into(),
            oracle,
            compiler,
            cache,
            fetcher,
            events,
            work_dir: work_dir.into(),
        }
    }

    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<RunSummary, OptimizerError> {
        let binding = self
            .config
            .binding(&self.asset, &self.strategy_key)
            .map_err(|e| OptimizerError::Config(e.to_string()))?
            .clone();
        let criteria = self.config.criteria_for(&self.asset, &binding);
        let (start_ms, end_ms) = self
            .config
            .date_range_for(&binding, now)
            .map_err(|e| OptimizerError::Config(e.to_string()))?;

        std::fs::create_dir_all(&self.work_dir)?;
        let _lock = AssetLock::acquire(&self.work_dir, &self.asset)?
            .ok_or_else(|| OptimizerError::AssetLocked(self.asset.clone()))?;

        info!(
            asset = %self.asset,
            strategy = %self.strategy_key,
            factory = %binding.strategy_factory,
            "optimization run starting"
        );

        let candles = self.load_candles(&binding, start_ms, end_ms).await?;
        if candles.is_empty() {
            return Err(OptimizerError::Integrity(format!(
                "no candles cached for {} {} in the requested window",
                binding.coin, binding.interval
            )));
        }

        let checkpoints = CheckpointStore::new(self.work_dir.join("checkpoints"));
        let history_path = self.work_dir.join(HISTORY_FILE);
        let live_source_path = self.work_dir.join(LIVE_SOURCE_FILE);
        let mut history = ParameterHistory::load_or_default(&history_path);
        let mut strategy_source =
            std::fs::read_to_string(&live_source_path).unwrap_or_default();

        let mut machine = PhaseMachine::new(self.config.phases.max_cycles);
        let mut overrides: BTreeMap<String, f64> = BTreeMap::new();
        if let Some(best) = checkpoints.load()? {
            overrides = best.params.clone();
            machine.apply(PhaseEvent::CheckpointSaved {
                score: best.metrics.score,
                pnl: best.metrics.metrics.total_pnl,
                iter: best.metrics.iter,
            });
        }

        let oracle_timeout = Duration::from_millis(self.config.research.timeout_ms);
        let date = now.format("%Y-%m-%d").to_string();
        let weights = self.config.scoring.weights.clone();
        let phases = self.config.phases.clone();
        // Guardrails cap what any run may risk, whatever the engine config says.
        let mut engine_config = self.config.backtest.clone();
        engine_config.risk_per_trade_usd = engine_config
            .risk_per_trade_usd
            .min(self.config.guardrails.max_risk_trade_usd);
        engine_config.limits.max_global_trades_day = engine_config
            .limits
            .max_global_trades_day
            .min(self.config.guardrails.global_max_trades_day);
        let hard_cap = (phases.refine.max_iter + phases.research.max_iter
            + phases.restructure.max_iter)
            * phases.max_cycles
            + 8;

        let mut iter: u32 = 0;
        while !machine.is_done() && iter < hard_cap {
            iter += 1;
            if let Some((from, to)) = machine.apply(PhaseEvent::IterStart) {
                self.events.emit(&RunEvent::PhaseTransition { from, to, iter });
                history.set_phase(machine.phase, iter);
            }
            self.events.emit(&RunEvent::IterStart { iter, phase: machine.phase });

            // Phase ran out of its iteration budget.
            if machine.phase_iter_count > budget_for(&phases, machine.phase) {
                if let Some((from, to)) = machine.apply(PhaseEvent::PhaseTimeout) {
                    self.events.emit(&RunEvent::PhaseTransition { from, to, iter });
                    history.set_phase(machine.phase, iter);
                }
                if machine.is_done() {
                    break;
                }
            }

            // Structural edits must typecheck before the backtest runs.
            if machine.needs_rebuild {
                if let Err(message) = self.compiler.check(&strategy_source).await {
                    machine.apply(PhaseEvent::CompileError);
                    self.events.emit(&RunEvent::Error {
                        kind: "compile".to_string(),
                        message: message.clone(),
                    });
                    if let Some(best) = checkpoints.rollback(&live_source_path)? {
                        strategy_source = best.source_text;
                        overrides = best.params;
                        self.events.emit(&RunEvent::Rollback { to_iter: best.metrics.iter });
                    }
                    if machine.fix_attempts >= MAX_FIX_ATTEMPTS {
                        if let Some((from, to)) = machine.apply(PhaseEvent::PhaseTimeout) {
                            self.events.emit(&RunEvent::PhaseTransition { from, to, iter });
                            history.set_phase(machine.phase, iter);
                        }
                    }
                    history.save(&history_path)?;
                    continue;
                }
            }

            // Instantiate and simulate.
            let strategy =
                create_strategy(&binding.strategy_factory, &overrides).ok_or_else(|| {
                    OptimizerError::InvalidStrategy(format!(
                        "unknown strategy factory {:?}",
                        binding.strategy_factory
                    ))
                })?;
            let params = strategy.params();
            let param_count = optimizable_param_count(strategy.as_ref());

            let mut engine = BacktestEngine::new(engine_config.clone(), strategy);
            let result = engine.run(&candles, binding.interval)?;
            let metrics = compute_metrics(&result.trades, result.max_drawdown_pct);
            let analysis = analyze_trades(&result.trades);
            let score = compute_score(&metrics, param_count, &weights);

            let prev_score = machine.current_score;
            machine.apply(PhaseEvent::BacktestOk { score });
            history.backfill_previous(&metrics, iter);

            let verdict = compare_scores(score, prev_score);
            machine.apply(PhaseEvent::Verdict(verdict));
            self.events.emit(&RunEvent::IterEnd { iter, score, verdict });

            // A hard regression restores the best snapshot before moving on.
            if verdict == Verdict::Reject {
                if let Some(best) = checkpoints.rollback(&live_source_path)? {
                    overrides = best.params;
                    strategy_source = best.source_text;
                    self.events.emit(&RunEvent::Rollback { to_iter: best.metrics.iter });
                }
            }

            if score > machine.best_score {
                checkpoints.save(&strategy_source, &overrides, &metrics, iter, score)?;
                machine.apply(PhaseEvent::CheckpointSaved {
                    score,
                    pnl: metrics.total_pnl,
                    iter,
                });
                self.events.emit(&RunEvent::CheckpointSaved { iter, score });
            }

            if criteria.met(&metrics) {
                machine.apply(PhaseEvent::CriteriaMet);
                if let Some(best) = checkpoints.rollback(&live_source_path)? {
                    overrides = best.params;
                }
                history.save(&history_path)?;
                self.events.emit(&RunEvent::Summary {
                    outcome: RunOutcome::CriteriaMet.as_str().to_string(),
                    best_iter: machine.best_iter,
                    best_score: machine.best_score,
                    metrics: Some(metrics.clone()),
                });
                info!(iter, score, "acceptance criteria met");
                return Ok(RunSummary {
                    outcome: RunOutcome::CriteriaMet,
                    iterations: iter,
                    best_iter: machine.best_iter,
                    best_score: machine.best_score,
                    best_metrics: Some(metrics),
                });
            }

            // Ask the oracle for the next move.
            let ctx = OracleContext {
                phase: machine.phase,
                iter,
                metrics: metrics.clone(),
                analysis,
                score,
                unmet_criteria: criteria.unmet(&metrics),
                params: params.clone(),
                overrides: overrides.clone(),
                history: history.clone(),
            };
            match oracle::propose_with_timeout(self.oracle.as_ref(), &ctx, oracle_timeout).await {
                Err(message) => {
                    machine.apply(PhaseEvent::TransientError);
                    warn!(iter, "oracle failure: {}", message);
                    self.events.emit(&RunEvent::Error {
                        kind: "transient".to_string(),
                        message: message.clone(),
                    });
                    if machine.transient_failures >= MAX_TRANSIENT_FAILURES {
                        history.save(&history_path)?;
                        return Err(OptimizerError::Transient(message));
                    }
                }
                Ok(OracleDecision::ParamChange { overrides: proposed }) => {
                    match self.config.guardrails.validate_param_change(&params, &proposed) {
                        Err(violation) => {
                            warn!(iter, %violation, "guardrail rejected parameter change");
                            self.events.emit(&RunEvent::Error {
                                kind: "guardrail".to_string(),
                                message: violation.to_string(),
                            });
                            machine.apply(PhaseEvent::NoChange);
                            history.append_record(iter, &date, None, &metrics);
                        }
                        Ok(()) => {
                            let change = proposed.iter().next().map(|(name, to)| AppliedChange {
                                param: name.clone(),
                                from: params.get(name).map(|s| s.value),
                                to: Some(*to),
                                scale: ChangeScale::Parametric,
                            });
                            for (name, value) in &proposed {
                                history.record_explored(name, *value);
                            }
                            overrides.extend(proposed);
                            machine.apply(PhaseEvent::ChangeApplied { structural: false });
                            history.append_record(iter, &date, change, &metrics);
                        }
                    }
                }
                Ok(OracleDecision::SourceEdit { new_text }) => {
                    match self.compiler.check(&new_text).await {
                        Ok(()) => {
                            atomic_write(&live_source_path, new_text.as_bytes())?;
                            strategy_source = new_text;
                            machine.apply(PhaseEvent::ChangeApplied { structural: true });
                            history.append_record(
                                iter,
                                &date,
                                Some(AppliedChange {
                                    param: "strategySource".to_string(),
                                    from: None,
                                    to: None,
                                    scale: ChangeScale::Structural,
                                }),
                                &metrics,
                            );
                        }
                        Err(message) => {
                            machine.apply(PhaseEvent::CompileError);
                            self.events.emit(&RunEvent::Error {
                                kind: "compile".to_string(),
                                message,
                            });
                            machine.apply(PhaseEvent::NoChange);
                            history.append_record(iter, &date, None, &metrics);
                        }
                    }
                }
                Ok(OracleDecision::NoChange) => {
                    machine.apply(PhaseEvent::NoChange);
                    history.append_record(iter, &date, None, &metrics);
                }
                Ok(OracleDecision::ResearchBrief { suggested_approaches }) => {
                    let brief_path = self.work_dir.join("research-brief.md");
                    let brief = suggested_approaches
                        .iter()
                        .map(|a| format!("- {}", a))
                        .collect::<Vec<_>>()
                        .join("\n");
                    atomic_write(&brief_path, brief.as_bytes())?;
                    machine.research_brief_path = Some(brief_path);
                    for approach in &suggested_approaches {
                        history.add_hypothesis(approach, iter);
                    }
                    machine.apply(PhaseEvent::NoChange);
                    history.append_record(iter, &date, None, &metrics);
                }
            }

            if let Some((from, to)) = machine.apply(PhaseEvent::Escalate) {
                self.events.emit(&RunEvent::PhaseTransition { from, to, iter });
                history.set_phase(machine.phase, iter);
            }

            history.save(&history_path)?;
        }

        // Out of budget: leave the best snapshot live.
        if let Some(best) = checkpoints.rollback(&live_source_path)? {
            self.events.emit(&RunEvent::Rollback { to_iter: best.metrics.iter });
        }
        let best_metrics = checkpoints.load()?.map(|c| c.metrics.metrics);
        self.events.emit(&RunEvent::Summary {
            outcome: RunOutcome::BudgetExhausted.as_str().to_string(),
            best_iter: machine.best_iter,
            best_score: machine.best_score,
            metrics: best_metrics.clone(),
        });
        info!(
            iterations = iter,
            best_iter = machine.best_iter,
            best_score = machine.best_score,
            "optimization budget exhausted"
        );
        Ok(RunSummary {
            outcome: RunOutcome::BudgetExhausted,
            iterations: iter,
            best_iter: machine.best_iter,
            best_score: machine.best_score,
            best_metrics,
        })
    }

    /// Syncs the cache (stale tails included) and loads the run window plus
    /// indicator warmup.
    async fn load_candles(
        &self,
        binding: &StrategyBinding,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<crate::types::Candle>, OptimizerError> {
        let load_start = start_ms - WARMUP_BARS * binding.interval.millis();
        self.cache
            .sync(
                self.fetcher.as_ref(),
                binding.data_source,
                &binding.coin,
                binding.interval,
                load_start,
                end_ms,
            )
            .await?;
        Ok(self
            .cache
            .get_candles(binding.data_source, &binding.coin, binding.interval, load_start, end_ms)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetConfig, DateRangeSpec};
    use crate::exchange::{ClientError, DataSource};
    use crate::types::{Candle, CandleInterval};
    use async_trait::async_trait;
    use chrono::TimeZone;

    const HOUR_MS: i64 = 3_600_000;

    struct NullFetcher;

    #[async_trait]
    impl CandleFetcher for NullFetcher {
        async fn fetch_candles(
            &self,
            _coin: &str,
            _interval: CandleInterval,
            _start_ms: i64,
            _end_ms: i64,
        ) -> Result<Vec<Candle>, ClientError> {
            Ok(Vec::new())
        }
    }

    fn rising_candles(start_ms: i64, end_ms: i64) -> Vec<Candle> {
        let mut out = Vec::new();
        let mut t = start_ms;
        let mut i = 0;
        while t <= end_ms {
            let c = 10_000.0 + 5.0 * i as f64;
            out.push(Candle { t, o: c - 2.5, h: c + 1.5, l: c - 4.0, c, v: 50.0, n: 5 });
            t += HOUR_MS;
            i += 1;
        }
        out
    }

    fn test_config() -> OptimizerConfig {
        let mut config = OptimizerConfig::default();
        config.phases.refine.max_iter = 2;
        config.phases.research.max_iter = 2;
        config.phases.restructure.max_iter = 2;
        config.phases.max_cycles = 1;
        config.date_range = Some(DateRangeSpec::Explicit {
            start: "2025-03-01".to_string(),
            end: "2025-03-20".to_string(),
        });

        let binding = StrategyBinding {
            coin: "BTC".to_string(),
            data_source: DataSource::Bybit,
            interval: CandleInterval::H1,
            strategy_factory: "breakout".to_string(),
            date_range: None,
            profile: None,
        };
        let mut asset = AssetConfig::default();
        asset.strategies.insert("breakout-1h".to_string(), binding);
        config.assets.insert("BTC".to_string(), asset);
        config
    }

    async fn seeded_cache(config: &OptimizerConfig) -> CandleCache {
        let cache = CandleCache::in_memory().await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let binding = config.binding("BTC", "breakout-1h").unwrap();
        let (start, end) = config.date_range_for(binding, now).unwrap();
        let load_start = start - WARMUP_BARS * HOUR_MS;
        let candles = rising_candles(load_start, end);
        cache
            .insert_candles(DataSource::Bybit, "BTC", CandleInterval::H1, &candles)
            .await
            .unwrap();
        cache
    }

    fn orchestrator(
        config: OptimizerConfig,
        cache: CandleCache,
        oracle: Box<dyn Oracle>,
        work_dir: std::path::PathBuf,
    ) -> Orchestrator {
        Orchestrator::new(
            config,
            "BTC",
            "breakout-1h",
            oracle,
            Box::new(AcceptAllCompiler),
            cache,
            Box::new(NullFetcher),
            EventSink::null(),
            work_dir,
        )
    }

    fn run_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn declining_oracle_walks_every_phase_then_exhausts() {
        let config = test_config();
        let cache = seeded_cache(&config).await;
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(
            config,
            cache,
            Box::new(ScriptedOracle::new(Vec::new())),
            dir.path().to_path_buf(),
        );

        let summary = orchestrator.run(run_now()).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::BudgetExhausted);
        assert_eq!(summary.outcome.exit_code(), 2);
        // NoChange twice per phase escalates refine -> research ->
        // restructure -> done within the single allowed cycle.
        assert!(summary.iterations <= 8, "took {} iterations", summary.iterations);
        assert!(summary.best_score > 0.0);
        assert!(summary.best_metrics.is_some());

        // Journal persisted with one record per iteration.
        let history = ParameterHistory::load_or_default(&dir.path().join(HISTORY_FILE));
        assert_eq!(history.records.len(), summary.iterations as usize);
    }

    #[tokio::test]
    async fn lenient_criteria_met_on_first_iteration() {
        let mut config = test_config();
        config.criteria = Criteria {
            min_trades: 1,
            min_profit_factor: 0.0,
            max_drawdown_pct: 100.0,
            min_win_rate: 0.0,
            min_avg_r: -10.0,
        };
        let cache = seeded_cache(&config).await;
        let dir = tempfile::tempdir().unwrap();
        let mut orchestrator = orchestrator(
            config,
            cache,
            Box::new(ScriptedOracle::new(Vec::new())),
            dir.path().to_path_buf(),
        );

        let summary = orchestrator.run(run_now()).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::CriteriaMet);
        assert_eq!(summary.outcome.exit_code(), 0);
        assert_eq!(summary.iterations, 1);

        // Checkpoint exists and holds the winning metrics.
        let best = CheckpointStore::new(dir.path().join("checkpoints"))
            .load()
            .unwrap()
            .unwrap();
        assert!(best.metrics.metrics.total_pnl > 0.0);
    }

    #[tokio::test]
    async fn guardrail_violations_never_reach_the_overrides() {
        let config = test_config();
        let cache = seeded_cache(&config).await;
        let dir = tempfile::tempdir().unwrap();

        // atrStopMult 99 violates both the ATR clamp and the declared range.
        let oracle = ScriptedOracle::new(vec![OracleDecision::ParamChange {
            overrides: BTreeMap::from([("atrStopMult".to_string(), 99.0)]),
        }]);
        let mut orchestrator =
            orchestrator(config, cache, Box::new(oracle), dir.path().to_path_buf());

        let summary = orchestrator.run(run_now()).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::BudgetExhausted);

        let history = ParameterHistory::load_or_default(&dir.path().join(HISTORY_FILE));
        assert!(!history.explored_ranges.contains_key("atrStopMult"));
        assert!(history.records.iter().all(|r| r.change.is_none()));

        // Best params on disk never picked up the rejected value.
        let best = CheckpointStore::new(dir.path().join("checkpoints"))
            .load()
            .unwrap()
            .unwrap();
        assert!(!best.params.contains_key("atrStopMult"));
    }

    #[tokio::test]
    async fn accepted_param_change_lands_in_history_and_overrides() {
        let config = test_config();
        let cache = seeded_cache(&config).await;
        let dir = tempfile::tempdir().unwrap();

        let oracle = ScriptedOracle::new(vec![OracleDecision::ParamChange {
            overrides: BTreeMap::from([("lookback".to_string(), 30.0)]),
        }]);
        let mut orchestrator =
            orchestrator(config, cache, Box::new(oracle), dir.path().to_path_buf());

        orchestrator.run(run_now()).await.unwrap();

        let history = ParameterHistory::load_or_default(&dir.path().join(HISTORY_FILE));
        assert_eq!(history.explored_ranges["lookback"], vec![30.0]);
        let change = history.records[0].change.as_ref().unwrap();
        assert_eq!(change.param, "lookback");
        assert_eq!(change.to, Some(30.0));
        assert_eq!(change.scale, ChangeScale::Parametric);
        // The first record got back-filled by the second iteration.
        assert_ne!(history.records[0].verdict, history::IterationVerdict::Pending);
    }

    #[tokio::test]
    async fn concurrent_run_on_the_same_asset_is_refused() {
        let config = test_config();
        let cache = seeded_cache(&config).await;
        let dir = tempfile::tempdir().unwrap();

        let _held = AssetLock::acquire(dir.path(), "BTC").unwrap().unwrap();
        let mut orchestrator = orchestrator(
            config,
            cache,
            Box::new(ScriptedOracle::new(Vec::new())),
            dir.path().to_path_buf(),
        );

        let err = orchestrator.run(run_now()).await.unwrap_err();
        assert!(matches!(err, OptimizerError::AssetLocked(_)));
    }

    #[tokio::test]
    async fn source_edit_flows_through_the_compile_gate() {
        let config = test_config();
        let cache = seeded_cache(&config).await;
        let dir = tempfile::tempdir().unwrap();

        let oracle = ScriptedOracle::new(vec![OracleDecision::SourceEdit {
            new_text: "export const strategy = improved();".to_string(),
        }]);
        let mut orchestrator =
            orchestrator(config, cache, Box::new(oracle), dir.path().to_path_buf());

        orchestrator.run(run_now()).await.unwrap();

        let history = ParameterHistory::load_or_default(&dir.path().join(HISTORY_FILE));
        let structural = history.records[0].change.as_ref().unwrap();
        assert_eq!(structural.scale, ChangeScale::Structural);
        assert_eq!(structural.param, "strategySource");

        // The run ends by restoring the best checkpoint, so the live source
        // matches the snapshot, not the last edit.
        let live = std::fs::read_to_string(dir.path().join(LIVE_SOURCE_FILE)).unwrap();
        let best = CheckpointStore::new(dir.path().join("checkpoints"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(live, best.source_text);
    }
}
