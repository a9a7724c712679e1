use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Typecheck hook for structural strategy edits. Rust cannot evaluate the
/// strategy source in-process, so validation is delegated: production shells
/// out to a build command, tests stub the answer.
#[async_trait]
pub trait StrategyCompiler: Send + Sync {
    /// Ok when the source compiles/typechecks; Err carries the tool output.
    async fn check(&self, source: &str) -> Result<(), String>;
}

/// Runs a configured command with the candidate source on a temp path as its
/// last argument. Non-zero exit means rejection.
pub struct CommandCompiler {
    pub command: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
}

#[async_trait]
impl StrategyCompiler for CommandCompiler {
    async fn check(&self, source: &str) -> Result<(), String> {
        let candidate = self.work_dir.join("candidate-strategy.ts");
        tokio::fs::write(&candidate, source)
            .await
            .map_err(|e| format!("failed to stage candidate source: {}", e))?;

        debug!(command = %self.command, "running strategy typecheck");
        let output = tokio::process::Command::new(&self.command)
            .args(&self.args)
            .arg(&candidate)
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {}", self.command, e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).into_owned())
        }
    }
}

/// Accepts every edit; the default when no build command is configured and
/// the workhorse for tests.
pub struct AcceptAllCompiler;

#[async_trait]
impl StrategyCompiler for AcceptAllCompiler {
    async fn check(&self, _source: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects every edit with a fixed message; for exercising the compile-error
/// path in tests.
pub struct RejectAllCompiler {
    pub message: String,
}

#[async_trait]
impl StrategyCompiler for RejectAllCompiler {
    async fn check(&self, _source: &str) -> Result<(), String> {
        Err(self.message.clone())
    }
}
