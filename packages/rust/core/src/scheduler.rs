//! Run-scoped task ledger.
//!
//! Every stage task is submitted here, awaited to completion and recorded with
//! its outcome. Nothing runs detached: when [`Scheduler::submit`] returns, the
//! task is finished and in the ledger.

use std::future::Future;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, warn};

use hashstack_artifacts::{BundleSummary, SuperBundleSummary, Unit};
use hashstack_shared::Result;

/// Pipeline stage a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Unit,
    Bundle,
    SuperBundle,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bundle => "bundle",
            Self::SuperBundle => "super-bundle",
            Self::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { hash: String },
    Failed { error: String },
    Skipped { reason: String },
}

/// One ledger line.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub stage: Stage,
    /// e.g. `bundle_0003` or `bundle_0003/unit_07`.
    pub label: String,
    pub outcome: TaskOutcome,
    pub elapsed_ms: u128,
}

/// Task output that carries a hash worth recording.
pub trait Attested {
    fn attested_hash(&self) -> &str;
}

impl Attested for Unit {
    fn attested_hash(&self) -> &str {
        self.hash()
    }
}

impl Attested for BundleSummary {
    fn attested_hash(&self) -> &str {
        &self.bundle_hash
    }
}

impl Attested for SuperBundleSummary {
    fn attested_hash(&self) -> &str {
        &self.super_hash
    }
}

#[derive(Debug, Default)]
pub struct Scheduler {
    records: Vec<TaskRecord>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` to completion and record its outcome.
    ///
    /// Returns the task output on success; on failure the error is logged,
    /// recorded and swallowed so later tasks still run.
    pub async fn submit<T, F>(
        &mut self,
        stage: Stage,
        label: impl Into<String>,
        task: F,
    ) -> Option<T>
    where
        T: Attested,
        F: Future<Output = Result<T>>,
    {
        let label = label.into();
        let start = Instant::now();
        let result = task.await;
        let elapsed_ms = start.elapsed().as_millis();

        match result {
            Ok(value) => {
                debug!(%stage, %label, hash = value.attested_hash(), elapsed_ms, "task completed");
                let outcome = TaskOutcome::Completed {
                    hash: value.attested_hash().to_string(),
                };
                self.push(stage, label, outcome, elapsed_ms);
                Some(value)
            }
            Err(e) => {
                error!(%stage, %label, error = %e, "task failed");
                let outcome = TaskOutcome::Failed {
                    error: e.to_string(),
                };
                self.push(stage, label, outcome, elapsed_ms);
                None
            }
        }
    }

    /// Record a task that was never started.
    pub fn skip(&mut self, stage: Stage, label: impl Into<String>, reason: impl Into<String>) {
        let label = label.into();
        let reason = reason.into();
        warn!(%stage, %label, %reason, "task skipped");
        self.push(stage, label, TaskOutcome::Skipped { reason }, 0);
    }

    /// Record an outcome produced outside [`Scheduler::submit`].
    pub fn record(&mut self, stage: Stage, label: impl Into<String>, outcome: TaskOutcome) {
        self.push(stage, label.into(), outcome, 0);
    }

    fn push(&mut self, stage: Stage, label: String, outcome: TaskOutcome, elapsed_ms: u128) {
        self.records.push(TaskRecord {
            stage,
            label,
            outcome,
            elapsed_ms,
        });
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TaskRecord> {
        self.records
    }
}
