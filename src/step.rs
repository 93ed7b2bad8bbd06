//! Step definitions for the deliverables pipeline.
//!
//! This module provides:
//! - `StepKind` and the fixed execution sequence
//! - `StepResult` / `Artifact` produced by work units
//! - The `StepUnit` trait that content generators implement
//! - `execute_with_timeout`, which races a unit against its time budget

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::context::RunContext;
use crate::errors::StepError;

/// One stage of the fixed pipeline sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Repository analysis: file census, language breakdown, metadata.
    Analyze,
    /// README documentation draft.
    Docs,
    /// Demo preview page.
    Demo,
    /// Pitch outline.
    Pitch,
    /// Terminal step: assemble deliverables and describe the outward change.
    Publish,
}

/// The full pipeline order. `Publish` only runs after gate approval.
pub const SEQUENCE: [StepKind; 5] = [
    StepKind::Analyze,
    StepKind::Docs,
    StepKind::Demo,
    StepKind::Pitch,
    StepKind::Publish,
];

/// The content-generation prefix of the sequence, run before the gate opens.
pub const CONTENT_STEPS: [StepKind; 4] = [
    StepKind::Analyze,
    StepKind::Docs,
    StepKind::Demo,
    StepKind::Pitch,
];

impl StepKind {
    /// Position of this step in the fixed sequence.
    pub fn index(&self) -> usize {
        SEQUENCE
            .iter()
            .position(|k| k == self)
            .expect("every StepKind appears in SEQUENCE")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Analyze => "analyze",
            StepKind::Docs => "docs",
            StepKind::Demo => "demo",
            StepKind::Pitch => "pitch",
            StepKind::Publish => "publish",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analyze" => Ok(StepKind::Analyze),
            "docs" => Ok(StepKind::Docs),
            "demo" => Ok(StepKind::Demo),
            "pitch" => Ok(StepKind::Pitch),
            "publish" => Ok(StepKind::Publish),
            other => Err(format!("unknown step kind: {other}")),
        }
    }
}

/// Per-kind execution time budgets.
///
/// Defaults reflect how long each stage is allowed to take: deployment is
/// the slowest, the pitch the most latency-sensitive.
#[derive(Debug, Clone)]
pub struct StepBudgets {
    pub analyze: Duration,
    pub docs: Duration,
    pub demo: Duration,
    pub pitch: Duration,
    pub publish: Duration,
}

impl Default for StepBudgets {
    fn default() -> Self {
        Self {
            analyze: Duration::from_secs(60),
            docs: Duration::from_secs(90),
            demo: Duration::from_secs(180),
            pitch: Duration::from_secs(45),
            publish: Duration::from_secs(60),
        }
    }
}

impl StepBudgets {
    pub fn for_kind(&self, kind: StepKind) -> Duration {
        match kind {
            StepKind::Analyze => self.analyze,
            StepKind::Docs => self.docs,
            StepKind::Demo => self.demo,
            StepKind::Pitch => self.pitch,
            StepKind::Publish => self.publish,
        }
    }
}

/// Outcome status of a single step slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

/// An opaque artifact produced by a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    /// Short identifier, e.g. "analysis" or "readme"
    pub name: String,
    /// MIME-ish content type, e.g. "application/json" or "text/markdown"
    pub content_type: String,
    /// Artifact payload
    pub data: serde_json::Value,
}

impl Artifact {
    pub fn json(name: &str, data: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            content_type: "application/json".to_string(),
            data,
        }
    }

    pub fn markdown(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content_type: "text/markdown".to_string(),
            data: serde_json::Value::String(content.to_string()),
        }
    }
}

/// Result of one step invocation. Immutable once written into a workflow
/// slot; a regenerate replaces the slot wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub kind: StepKind,
    pub status: StepStatus,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl StepResult {
    pub fn completed(kind: StepKind, artifacts: Vec<Artifact>, duration: Duration) -> Self {
        Self {
            kind,
            status: StepStatus::Completed,
            artifacts,
            error: None,
            duration_ms: duration.as_millis() as u64,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn failed(kind: StepKind, error: &str, duration: Duration) -> Self {
        Self {
            kind,
            status: StepStatus::Failed,
            artifacts: Vec::new(),
            error: Some(error.to_string()),
            duration_ms: duration.as_millis() as u64,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn skipped(kind: StepKind, cause: &str) -> Self {
        Self {
            kind,
            status: StepStatus::Skipped,
            artifacts: Vec::new(),
            error: Some(cause.to_string()),
            duration_ms: 0,
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Structural validation of a unit-produced result.
    ///
    /// A completed result must carry at least one artifact; a failed result
    /// must name its error. Units never return `Skipped` themselves; that
    /// status is assigned by the supervisor.
    pub fn validate(&self) -> Result<(), String> {
        match self.status {
            StepStatus::Completed if self.artifacts.is_empty() => {
                Err("completed result has no artifacts".to_string())
            }
            StepStatus::Failed if self.error.is_none() => {
                Err("failed result has no error message".to_string())
            }
            StepStatus::Skipped => Err("unit returned skipped status".to_string()),
            _ => Ok(()),
        }
    }
}

/// Context passed to every step unit.
///
/// Carries the run identity plus the accumulated results of all previously
/// executed steps, so later steps can read earlier outputs (e.g. the demo
/// preview URL feeding into the pitch).
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Repository, credentials and mode for this run.
    pub run: RunContext,
    /// Results of the steps executed so far, in sequence order.
    pub prior: Vec<StepResult>,
    /// Per-run output directory all units write beneath.
    pub output_dir: PathBuf,
    /// Cancellation signal: set when the step's budget expires. Units that
    /// spawn work must propagate it so the loser of the race actually stops.
    pub cancel: CancellationToken,
}

impl StepContext {
    pub fn new(run: RunContext, output_dir: PathBuf) -> Self {
        Self {
            run,
            prior: Vec::new(),
            output_dir,
            cancel: CancellationToken::new(),
        }
    }

    /// Result of a previously executed step, if any.
    pub fn prior_result(&self, kind: StepKind) -> Option<&StepResult> {
        self.prior.iter().find(|r| r.kind == kind)
    }

    /// First artifact with the given name across all prior results.
    pub fn prior_artifact(&self, name: &str) -> Option<&Artifact> {
        self.prior
            .iter()
            .flat_map(|r| r.artifacts.iter())
            .find(|a| a.name == name)
    }
}

/// A unit of work in the pipeline. Implementations are content generators;
/// they produce a `StepResult` and nothing else, no direct persistence.
#[async_trait]
pub trait StepUnit: Send + Sync {
    /// The step this unit implements.
    fn kind(&self) -> StepKind;

    /// Execute the unit. Errors are normalized into failed results by the
    /// supervisor; units should return `Err` rather than panic.
    async fn execute(&self, ctx: &StepContext) -> Result<StepResult, StepError>;
}

/// Race a unit against its time budget.
///
/// On expiry the context's cancellation token is triggered so in-flight work
/// is signalled to stop, and a failed `StepResult` carrying a timeout error
/// is synthesized, so the supervisor never sees a dangling operation.
pub async fn execute_with_timeout(
    unit: &dyn StepUnit,
    ctx: &StepContext,
    budget: Duration,
) -> StepResult {
    let kind = unit.kind();
    let start = Instant::now();

    match tokio::time::timeout(budget, unit.execute(ctx)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            tracing::warn!(step = %kind, error = %err, "step unit returned error");
            StepResult::failed(kind, &err.to_string(), start.elapsed())
        }
        Err(_) => {
            ctx.cancel.cancel();
            let err = StepError::Timeout {
                kind,
                budget_ms: budget.as_millis() as u64,
            };
            tracing::warn!(step = %kind, budget_ms = budget.as_millis() as u64, "step timed out");
            StepResult::failed(kind, &err.to_string(), start.elapsed())
        }
    }
}
