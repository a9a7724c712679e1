use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::analytics::{Metrics, TradeAnalysis};
use crate::strategies::ParamSpec;

use super::history::ParameterHistory;
use super::phase::Phase;

/// Full diagnostic context handed to the oracle once per iteration.
#[derive(Debug, Clone, Serialize)]
pub struct OracleContext {
    pub phase: Phase,
    pub iter: u32,
    pub metrics: Metrics,
    pub analysis: TradeAnalysis,
    pub score: f64,
    pub unmet_criteria: Vec<String>,
    pub params: BTreeMap<String, ParamSpec>,
    pub overrides: BTreeMap<String, f64>,
    pub history: ParameterHistory,
}

/// What the oracle proposed for this iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OracleDecision {
    ParamChange { overrides: BTreeMap<String, f64> },
    SourceEdit { new_text: String },
    NoChange,
    ResearchBrief { suggested_approaches: Vec<String> },
}

/// The external agent that proposes changes: a remote LLM in production, a
/// deterministic stub in tests. The core only sees this interface.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn propose(&self, ctx: &OracleContext) -> anyhow::Result<OracleDecision>;
}

/// Runs the oracle under a deadline; elapsing is a transient failure the
/// caller counts.
pub async fn propose_with_timeout(
    oracle: &dyn Oracle,
    ctx: &OracleContext,
    timeout: Duration,
) -> Result<OracleDecision, String> {
    match tokio::time::timeout(timeout, oracle.propose(ctx)).await {
        Ok(Ok(decision)) => Ok(decision),
        Ok(Err(e)) => Err(format!("oracle error: {}", e)),
        Err(_) => Err(format!("oracle timed out after {:?}", timeout)),
    }
}

/// Production oracle: spawns a configured command, feeds it the diagnostic
/// context as JSON on stdin and parses one decision from stdout. The command
/// is typically a thin shim around a remote LLM.
pub struct CommandOracle {
    pub command: String,
    pub args: Vec<String>,
}

#[async_trait]
impl Oracle for CommandOracle {
    async fn propose(&self, ctx: &OracleContext) -> anyhow::Result<OracleDecision> {
        use tokio::io::AsyncWriteExt;

        let mut child = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()?;

        let payload = serde_json::to_vec(ctx)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&payload).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            anyhow::bail!(
                "oracle command {} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

/// Test/stub oracle that replays a scripted decision sequence, then keeps
/// answering NoChange.
pub struct ScriptedOracle {
    decisions: std::sync::Mutex<std::collections::VecDeque<OracleDecision>>,
}

impl ScriptedOracle {
    pub fn new(decisions: Vec<OracleDecision>) -> Self {
        Self { decisions: std::sync::Mutex::new(decisions.into()) }
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn propose(&self, _ctx: &OracleContext) -> anyhow::Result<OracleDecision> {
        let mut decisions = self.decisions.lock().expect("oracle script lock");
        Ok(decisions.pop_front().unwrap_or(OracleDecision::NoChange))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowOracle;

    #[async_trait]
    impl Oracle for SlowOracle {
        async fn propose(&self, _ctx: &OracleContext) -> anyhow::Result<OracleDecision> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(OracleDecision::NoChange)
        }
    }

    fn ctx() -> OracleContext {
        OracleContext {
            phase: Phase::Refine,
            iter: 1,
            metrics: crate::analytics::compute_metrics(&[], 0.0),
            analysis: crate::analytics::analyze_trades(&[]),
            score: 0.0,
            unmet_criteria: Vec::new(),
            params: BTreeMap::new(),
            overrides: BTreeMap::new(),
            history: ParameterHistory::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_a_transient_failure() {
        let err = propose_with_timeout(&SlowOracle, &ctx(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn scripted_oracle_replays_then_declines() {
        let oracle = ScriptedOracle::new(vec![OracleDecision::ParamChange {
            overrides: BTreeMap::from([("lookback".to_string(), 25.0)]),
        }]);

        let first = oracle.propose(&ctx()).await.unwrap();
        assert!(matches!(first, OracleDecision::ParamChange { .. }));
        let second = oracle.propose(&ctx()).await.unwrap();
        assert_eq!(second, OracleDecision::NoChange);
    }

    #[test]
    fn decision_json_shape() {
        let decision = OracleDecision::ParamChange {
            overrides: BTreeMap::from([("atrStopMult".to_string(), 2.5)]),
        };
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"kind\":\"paramChange\""));

        let parsed: OracleDecision =
            serde_json::from_str("{\"kind\":\"noChange\"}").unwrap();
        assert_eq!(parsed, OracleDecision::NoChange);
    }
}
