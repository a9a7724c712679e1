use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::BacktestConfig;
use crate::exchange::DataSource;
use crate::optimizer::{Criteria, CriteriaOverride, Guardrails, ScoreWeights};
use crate::types::CandleInterval;

/// The single JSON configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerConfig {
    /// Global acceptance thresholds.
    pub criteria: Criteria,
    /// Class-level criteria overrides.
    pub asset_classes: BTreeMap<String, CriteriaOverride>,
    /// Strategy-level criteria overrides.
    pub strategy_profiles: BTreeMap<String, CriteriaOverride>,
    pub assets: BTreeMap<String, AssetConfig>,
    /// Global fallback when a strategy binding has no range of its own.
    pub date_range: Option<DateRangeSpec>,
    pub guardrails: Guardrails,
    pub phases: PhaseConfig,
    pub scoring: ScoringConfig,
    pub research: ResearchConfig,
    pub model_routing: ModelRouting,
    /// Engine settings shared by every run.
    pub backtest: BacktestConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetConfig {
    pub class: Option<String>,
    pub strategies: BTreeMap<String, StrategyBinding>,
}

/// One optimizable (asset, strategy) pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyBinding {
    pub coin: String,
    pub data_source: DataSource,
    pub interval: CandleInterval,
    pub strategy_factory: String,
    #[serde(default)]
    pub date_range: Option<DateRangeSpec>,
    #[serde(default)]
    pub profile: Option<String>,
}

/// Either an explicit `{start, end}` or a preset string
/// (`last<N>` / `custom:YYYY-MM-DD:YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateRangeSpec {
    Preset(String),
    Explicit { start: String, end: String },
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow!("invalid date {:?}, expected YYYY-MM-DD", s))
}

fn day_start_ms(day: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).expect("midnight"))
        .timestamp_millis()
}

fn day_end_ms(day: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&day.and_hms_opt(23, 59, 59).expect("day end"))
        .timestamp_millis()
}

impl DateRangeSpec {
    /// Resolves to a `[start_ms, end_ms]` window. `now` is injected so
    /// presets are deterministic.
    pub fn resolve(&self, now: DateTime<Utc>) -> Result<(i64, i64)> {
        match self {
            DateRangeSpec::Explicit { start, end } => {
                let start = day_start_ms(parse_day(start)?);
                let end = day_end_ms(parse_day(end)?);
                if end <= start {
                    return Err(anyhow!("date range end must be after start"));
                }
                Ok((start, end))
            }
            DateRangeSpec::Preset(preset) => {
                if let Some(days) = preset.strip_prefix("last") {
                    let days: i64 = days
                        .parse()
                        .map_err(|_| anyhow!("invalid preset {:?}", preset))?;
                    if days <= 0 {
                        return Err(anyhow!("preset day count must be positive"));
                    }
                    let end = now.timestamp_millis();
                    Ok((end - days * 86_400_000, end))
                } else if let Some(rest) = preset.strip_prefix("custom:") {
                    let (start, end) = rest
                        .split_once(':')
                        .ok_or_else(|| anyhow!("invalid custom range {:?}", preset))?;
                    DateRangeSpec::Explicit {
                        start: start.to_string(),
                        end: end.to_string(),
                    }
                    .resolve(now)
                } else {
                    Err(anyhow!("unrecognized date range {:?}", preset))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseBudget {
    pub max_iter: u32,
}

impl Default for PhaseBudget {
    fn default() -> Self {
        Self { max_iter: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseConfig {
    pub refine: PhaseBudget,
    pub research: PhaseBudget,
    pub restructure: PhaseBudget,
    pub max_cycles: u32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            refine: PhaseBudget { max_iter: 12 },
            research: PhaseBudget { max_iter: 6 },
            restructure: PhaseBudget { max_iter: 8 },
            max_cycles: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchConfig {
    pub enabled: bool,
    pub model: String,
    pub max_searches_per_iter: u32,
    pub timeout_ms: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "default".to_string(),
            max_searches_per_iter: 3,
            timeout_ms: 60_000,
        }
    }
}

/// Which oracle model serves which duty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelRouting {
    pub optimize: String,
    pub fix: String,
    pub plan: String,
}

impl Default for ModelRouting {
    fn default() -> Self {
        Self {
            optimize: "default".to_string(),
            fix: "default".to_string(),
            plan: "default".to_string(),
        }
    }
}

impl OptimizerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {:?}", path))?;
        let config: OptimizerConfig =
            serde_json::from_str(&text).with_context(|| format!("parsing config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.backtest
            .limits
            .validate()
            .map_err(|e| anyhow!("risk limits: {}", e))?;
        if self.phases.max_cycles == 0 {
            return Err(anyhow!("phases.maxCycles must be > 0"));
        }
        for (asset, asset_config) in &self.assets {
            if let Some(class) = &asset_config.class {
                if !self.asset_classes.contains_key(class) {
                    return Err(anyhow!("asset {} references unknown class {:?}", asset, class));
                }
            }
            for (name, binding) in &asset_config.strategies {
                if let Some(profile) = &binding.profile {
                    if !self.strategy_profiles.contains_key(profile) {
                        return Err(anyhow!(
                            "strategy {}/{} references unknown profile {:?}",
                            asset,
                            name,
                            profile
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn binding(&self, asset: &str, strategy: &str) -> Result<&StrategyBinding> {
        self.assets
            .get(asset)
            .and_then(|a| a.strategies.get(strategy))
            .ok_or_else(|| anyhow!("no strategy {:?} configured for asset {:?}", strategy, asset))
    }

    /// Criteria for one binding: global, then asset class, then profile.
    pub fn criteria_for(&self, asset: &str, binding: &StrategyBinding) -> Criteria {
        let class_override = self
            .assets
            .get(asset)
            .and_then(|a| a.class.as_ref())
            .and_then(|class| self.asset_classes.get(class));
        let profile_override = binding
            .profile
            .as_ref()
            .and_then(|profile| self.strategy_profiles.get(profile));
        crate::optimizer::resolve_criteria(&self.criteria, class_override, profile_override)
    }

    /// The effective date range: binding-level beats global; missing both
    /// falls back to the last 90 days.
    pub fn date_range_for(
        &self,
        binding: &StrategyBinding,
        now: DateTime<Utc>,
    ) -> Result<(i64, i64)> {
        if let Some(range) = &binding.date_range {
            return range.resolve(now);
        }
        if let Some(range) = &self.date_range {
            return range.resolve(now);
        }
        DateRangeSpec::Preset("last90".to_string()).resolve(now)
    }
}
