//! Persisted record types: sessions, workflows and approval gates.
//!
//! A `WorkflowRecord` is mutated exclusively by the supervisor after each
//! step transition and carries one slot per step kind. `ApprovalGate` is
//! resolved at most once; the first response wins. All records carry a
//! version counter for the store's compare-and-swap updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::context::{Credential, Repository, RunContext};
use crate::errors::WorkflowError;
use crate::policy::Mode;
use crate::step::{Artifact, SEQUENCE, StepKind, StepResult, StepStatus};

/// Maximum regenerate attempts per step before `can_retry` refuses.
pub const MAX_STEP_RETRIES: u32 = 3;

/// Overall workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    WaitingApproval,
    Completed,
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::WaitingApproval => "waiting_approval",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The persisted state of one pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: String,
    pub session_id: String,
    pub mode: Mode,
    /// One slot per step kind, in [`SEQUENCE`] order. `None` until executed.
    pub steps: Vec<Option<StepResult>>,
    pub current_step: Option<StepKind>,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Gate currently blocking this workflow, if suspended.
    #[serde(default)]
    pub gate_id: Option<String>,
    /// Free-form timestamp log keyed by event name. Retry counts are
    /// derived from `retry:<step>:<n>` keys.
    #[serde(default)]
    pub timeline: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl WorkflowRecord {
    pub fn new(session_id: &str, mode: Mode) -> Self {
        Self {
            id: format!("wf-{}", Uuid::new_v4()),
            session_id: session_id.to_string(),
            mode,
            steps: vec![None; SEQUENCE.len()],
            current_step: None,
            status: WorkflowStatus::Pending,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            gate_id: None,
            timeline: BTreeMap::new(),
            version: 0,
        }
    }

    /// The slot for a step, if populated.
    pub fn step_result(&self, kind: StepKind) -> Option<&StepResult> {
        self.steps[kind.index()].as_ref()
    }

    /// Replace a step's slot. A retry produces a new result that replaces
    /// the slot wholesale; results are never edited in place.
    pub fn set_step_result(&mut self, result: StepResult) {
        let idx = result.kind.index();
        self.steps[idx] = Some(result);
    }

    /// Clear a step's slot ahead of a regenerate.
    pub fn clear_step_result(&mut self, kind: StepKind) {
        self.steps[kind.index()] = None;
    }

    /// Record a named event in the timeline.
    pub fn mark_event(&mut self, name: &str) {
        self.timeline.insert(name.to_string(), Utc::now());
    }

    /// Record one retry of a step in the timeline.
    pub fn record_retry(&mut self, kind: StepKind) {
        let n = self.retry_count(kind) + 1;
        self.mark_event(&format!("retry:{kind}:{n}"));
    }

    /// Number of retries recorded for a step, derived from the timeline.
    pub fn retry_count(&self, kind: StepKind) -> u32 {
        let prefix = format!("retry:{kind}:");
        self.timeline
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .count() as u32
    }

    /// Whether another retry of this step is allowed. Always false once
    /// [`MAX_STEP_RETRIES`] is reached, regardless of recoverability.
    pub fn can_retry(&self, kind: StepKind) -> bool {
        self.retry_count(kind) < MAX_STEP_RETRIES
    }

    /// All artifacts across populated slots, in sequence order.
    pub fn combined_artifacts(&self) -> Vec<Artifact> {
        self.steps
            .iter()
            .flatten()
            .flat_map(|r| r.artifacts.iter().cloned())
            .collect()
    }

    /// Human-readable summary of skipped steps, if the run was degraded.
    pub fn skip_summary(&self) -> Option<String> {
        let skipped: Vec<String> = self
            .steps
            .iter()
            .flatten()
            .filter(|r| r.status == StepStatus::Skipped)
            .map(|r| {
                format!(
                    "{} ({})",
                    r.kind,
                    r.error.as_deref().unwrap_or("no cause recorded")
                )
            })
            .collect();

        if skipped.is_empty() {
            None
        } else {
            Some(format!("skipped: {}", skipped.join(", ")))
        }
    }

    /// Completed and failed are absorbing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::Completed | WorkflowStatus::Failed
        )
    }
}

/// What an approval gate is reviewing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateKind {
    /// Review of one step's generated content; rejection regenerates it.
    Content { step: StepKind },
    /// Review of the outward publication; rejection abandons the workflow.
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pending,
    Approved,
    Rejected,
}

impl GateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStatus::Pending => "pending",
            GateStatus::Approved => "approved",
            GateStatus::Rejected => "rejected",
        }
    }
}

/// A suspension point requiring an external human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGate {
    pub id: String,
    pub workflow_id: String,
    pub kind: GateKind,
    pub status: GateStatus,
    /// The artifacts under review.
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl ApprovalGate {
    pub fn new(workflow_id: &str, kind: GateKind, artifacts: Vec<Artifact>) -> Self {
        Self {
            id: format!("gate-{}", Uuid::new_v4()),
            workflow_id: workflow_id.to_string(),
            kind,
            status: GateStatus::Pending,
            artifacts,
            feedback: None,
            created_at: Utc::now(),
            responded_at: None,
            version: 0,
        }
    }

    /// Apply a human response. The first response wins; anything after the
    /// gate is resolved is rejected.
    pub fn respond(&mut self, approved: bool, feedback: Option<String>) -> Result<(), WorkflowError> {
        if self.status != GateStatus::Pending {
            return Err(WorkflowError::GateAlreadyResolved {
                id: self.id.clone(),
                status: self.status.as_str().to_string(),
            });
        }

        self.status = if approved {
            GateStatus::Approved
        } else {
            GateStatus::Rejected
        };
        self.feedback = feedback;
        self.responded_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.status != GateStatus::Pending
    }
}

/// A user session: the repository reference, credential handle and chosen
/// mode a workflow is created under. Lifecycle is independent of the
/// workflow record; the session is created first and referenced by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub repository: Repository,
    pub credential: Credential,
    pub mode: Mode,
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl SessionRecord {
    pub fn new(repository: Repository, credential: Credential, mode: Mode, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            id: format!("sess-{}", Uuid::new_v4()),
            repository,
            credential,
            mode,
            workflow_id: None,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs as i64),
            version: 0,
        }
    }

    /// Rebuild the run context this session was created with.
    pub fn run_context(&self) -> RunContext {
        RunContext::new(
            self.repository.clone(),
            self.credential.clone(),
            self.mode,
        )
    }
}
