#![allow(dead_code)]
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::analytics::Metrics;

use super::phase::Phase;
use super::scoring::Verdict;

/// One line of the user-visible NDJSON run stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    PhaseTransition { from: Phase, to: Phase, iter: u32 },
    IterStart { iter: u32, phase: Phase },
    IterEnd { iter: u32, score: f64, verdict: Verdict },
    CheckpointSaved { iter: u32, score: f64 },
    Rollback { to_iter: u32 },
    Error { kind: String, message: String },
    Warning { message: String },
    Summary { outcome: String, best_iter: u32, best_score: f64, metrics: Option<Metrics> },
}

#[derive(Serialize)]
struct Envelope<'a> {
    run_id: &'a str,
    ts: String,
    #[serde(flatten)]
    event: &'a RunEvent,
}

/// NDJSON sink: one event per line, flushed as it happens.
#[derive(Clone)]
pub struct EventSink {
    run_id: String,
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl EventSink {
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(io::stdout()))
    }

    pub fn to_file(path: &Path) -> io::Result<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    /// Swallows everything; for tests and quiet runs.
    pub fn null() -> Self {
        Self::from_writer(Box::new(io::sink()))
    }

    fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            out: Arc::new(Mutex::new(writer)),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emits one event; write failures are deliberately not fatal to a run.
    pub fn emit(&self, event: &RunEvent) {
        let envelope = Envelope {
            run_id: &self.run_id,
            ts: Utc::now().to_rfc3339(),
            event,
        };
        if let Ok(line) = serde_json::to_string(&envelope) {
            if let Ok(mut out) = self.out.lock() {
                let _ = writeln!(out, "{}", line);
                let _ = out.flush();
            }
        }
    }
}
