#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::analytics::Metrics;

const SOURCE_FILE: &str = "best-strategy.ts.bak";
const PARAMS_FILE: &str = "best-params.json";
const METRICS_FILE: &str = "best-metrics.json";

/// Metrics snapshot persisted alongside the best iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub metrics: Metrics,
    pub iter: u32,
    pub score: f64,
    pub timestamp: DateTime<Utc>,
}

/// A fully-loaded best checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub source_text: String,
    pub params: BTreeMap<String, f64>,
    pub metrics: CheckpointMetrics,
}

/// Best-iteration snapshot under a per-strategy directory. Exactly one
/// "best" exists; every save overwrites it atomically.
pub struct CheckpointStore {
    dir: PathBuf,
}

/// Write-temp, fsync, rename.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save(
        &self,
        source_text: &str,
        params: &BTreeMap<String, f64>,
        metrics: &Metrics,
        iter: u32,
        score: f64,
    ) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        atomic_write(&self.dir.join(SOURCE_FILE), source_text.as_bytes())?;

        let params_json = serde_json::to_string_pretty(params)?;
        atomic_write(&self.dir.join(PARAMS_FILE), params_json.as_bytes())?;

        let snapshot = CheckpointMetrics {
            metrics: metrics.clone(),
            iter,
            score,
            timestamp: Utc::now(),
        };
        let metrics_json = serde_json::to_string_pretty(&snapshot)?;
        atomic_write(&self.dir.join(METRICS_FILE), metrics_json.as_bytes())?;

        info!(iter, score, "checkpoint saved");
        Ok(())
    }

    /// Loads the best checkpoint, or None when no save has happened yet.
    pub fn load(&self) -> io::Result<Option<Checkpoint>> {
        let source_path = self.dir.join(SOURCE_FILE);
        if !source_path.exists() {
            return Ok(None);
        }
        let source_text = fs::read_to_string(source_path)?;
        let params: BTreeMap<String, f64> =
            serde_json::from_str(&fs::read_to_string(self.dir.join(PARAMS_FILE))?)?;
        let metrics: CheckpointMetrics =
            serde_json::from_str(&fs::read_to_string(self.dir.join(METRICS_FILE))?)?;
        Ok(Some(Checkpoint { source_text, params, metrics }))
    }

    /// Restores the checkpointed source over the live strategy file.
    /// Returns the checkpoint so the caller can also restore overrides.
    pub fn rollback(&self, live_source_path: &Path) -> io::Result<Option<Checkpoint>> {
        let Some(checkpoint) = self.load()? else {
            return Ok(None);
        };
        atomic_write(live_source_path, checkpoint.source_text.as_bytes())?;
        info!(iter = checkpoint.metrics.iter, "rolled back to best checkpoint");
        Ok(Some(checkpoint))
    }
}
