//! The pipeline supervisor: a strictly sequential state machine.
//!
//! Content steps run in fixed order, each raced against its time budget and
//! validated. Failures are classified through the mode policy: a critical
//! failure halts the pipeline, an optional one is recorded as skipped. Every
//! transition is persisted before the next step begins and pushed to the
//! event channel. After the content steps the supervisor opens an approval
//! gate and suspends; a human response resumes it toward publication,
//! regeneration or abandonment.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::{StepError, WorkflowError};
use crate::orchestrator::events::{EventChannel, WorkflowEvent};
use crate::policy;
use crate::records::{
    ApprovalGate, GateKind, SessionRecord, WorkflowRecord, WorkflowStatus,
};
use crate::step::{
    CONTENT_STEPS, StepBudgets, StepContext, StepKind, StepResult, StepStatus, StepUnit,
    execute_with_timeout,
};
use crate::store::Persistence;

/// Registry of work units, one per step kind.
pub type UnitRegistry = HashMap<StepKind, Arc<dyn StepUnit>>;

/// Supervisor tunables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-step time budgets.
    pub budgets: StepBudgets,
    /// When set, a content-review gate for this step opens before the
    /// publish gate; rejecting it regenerates the step.
    pub content_review: Option<StepKind>,
    /// Root directory for per-run deliverable output.
    pub output_root: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            budgets: StepBudgets::default(),
            content_review: None,
            output_root: std::env::temp_dir().join("shipyard"),
        }
    }
}

enum StepOutcome {
    /// The slot was filled (completed or skipped); move on.
    Advanced,
    /// A critical step failed; the workflow is now terminal.
    Halted,
}

/// Composes step units, the mode policy, the retry engine and the state
/// store into the full sequential workflow machine.
pub struct Orchestrator {
    units: UnitRegistry,
    persistence: Persistence,
    events: EventChannel,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        units: UnitRegistry,
        persistence: Persistence,
        events: EventChannel,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            units,
            persistence,
            events,
            config,
        }
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    /// Start a workflow under a session and drive it through the content
    /// steps until it either fails on a critical step or suspends on an
    /// approval gate. The returned record is in `Failed` or
    /// `WaitingApproval` state.
    pub async fn start(
        &self,
        session: &mut SessionRecord,
    ) -> Result<WorkflowRecord, WorkflowError> {
        if session.version == 0 {
            self.persistence.save_session(session).await?;
        }

        let mut wf = WorkflowRecord::new(&session.id, session.mode);
        wf.mark_event("workflow:created");
        self.persistence.save_workflow(&mut wf).await?;
        self.persistence.link_workflow(&session.id, &wf.id).await?;
        session.workflow_id = Some(wf.id.clone());

        tracing::info!(workflow_id = %wf.id, mode = %wf.mode, repo = %session.repository.name, "workflow started");
        self.events.emit(WorkflowEvent::WorkflowStarted {
            workflow_id: wf.id.clone(),
            mode: wf.mode.to_string(),
        });

        let mut ctx = self.context_for(session, &wf, None);
        for kind in CONTENT_STEPS {
            match self.run_step(&mut wf, &mut ctx, kind).await? {
                StepOutcome::Advanced => {}
                StepOutcome::Halted => return Ok(wf),
            }
        }

        let gate_kind = match self.config.content_review {
            Some(step) => GateKind::Content { step },
            None => GateKind::Publish,
        };
        self.open_gate(&mut wf, gate_kind).await?;

        Ok(wf)
    }

    /// Apply a human response to an approval gate and resume the workflow.
    ///
    /// The first response wins: a second response to the same gate fails
    /// with `GateAlreadyResolved`, and concurrent responders are serialized
    /// by the store's version check.
    pub async fn respond(
        &self,
        gate_id: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> Result<WorkflowRecord, WorkflowError> {
        let mut gate = self
            .persistence
            .load_gate(gate_id)
            .await?
            .ok_or_else(|| WorkflowError::GateNotFound(gate_id.to_string()))?;

        if gate.is_resolved() {
            return Err(WorkflowError::GateAlreadyResolved {
                id: gate.id.clone(),
                status: gate.status.as_str().to_string(),
            });
        }

        let mut wf = self
            .persistence
            .load_workflow(&gate.workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(gate.workflow_id.clone()))?;

        if wf.status != WorkflowStatus::WaitingApproval {
            return Err(WorkflowError::InvalidState {
                id: wf.id.clone(),
                status: wf.status.to_string(),
                expected: WorkflowStatus::WaitingApproval.to_string(),
            });
        }

        gate.respond(approved, feedback)?;
        self.persistence.save_gate(&mut gate).await?;

        tracing::info!(gate_id = %gate.id, workflow_id = %wf.id, approved, "approval response received");
        self.events.emit(WorkflowEvent::ApprovalReceived {
            workflow_id: wf.id.clone(),
            gate_id: gate.id.clone(),
            approved,
        });
        wf.mark_event(if approved {
            "gate:approved"
        } else {
            "gate:rejected"
        });

        let session = self
            .persistence
            .load_session(&wf.session_id)
            .await?
            .ok_or_else(|| WorkflowError::SessionNotFound(wf.session_id.clone()))?;

        if approved {
            match gate.kind {
                GateKind::Content { .. } => {
                    // Content cleared review; publication still needs its
                    // own approval.
                    self.open_gate(&mut wf, GateKind::Publish).await?;
                }
                GateKind::Publish => {
                    self.run_publication(&mut wf, &session).await?;
                }
            }
        } else {
            match gate.kind {
                GateKind::Content { step } => {
                    self.regenerate(&mut wf, &session, step).await?;
                }
                GateKind::Publish => {
                    self.fail_workflow(&mut wf, None, "rejected by reviewer")
                        .await?;
                }
            }
        }

        Ok(wf)
    }

    /// The gate currently blocking a workflow, if it is suspended.
    pub async fn pending_gate(
        &self,
        wf: &WorkflowRecord,
    ) -> Result<Option<ApprovalGate>, WorkflowError> {
        match &wf.gate_id {
            Some(id) => Ok(self.persistence.load_gate(id).await?),
            None => Ok(None),
        }
    }

    pub async fn load_workflow(&self, id: &str) -> Result<WorkflowRecord, WorkflowError> {
        self.persistence
            .load_workflow(id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(id.to_string()))
    }

    /// Execute one step: persist the transition, race the unit against its
    /// budget, validate the output (one regenerate on invalid), classify
    /// any failure through the mode policy, persist and emit.
    async fn run_step(
        &self,
        wf: &mut WorkflowRecord,
        ctx: &mut StepContext,
        kind: StepKind,
    ) -> Result<StepOutcome, WorkflowError> {
        let unit = self
            .units
            .get(&kind)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no unit registered for step {kind}"))?;

        wf.current_step = Some(kind);
        wf.status = WorkflowStatus::Running;
        wf.mark_event(&format!("step:{kind}:started"));
        self.persistence.save_workflow(wf).await?;
        self.events.emit(WorkflowEvent::StepStarted {
            workflow_id: wf.id.clone(),
            step: kind,
        });

        let budget = self.config.budgets.for_kind(kind);
        ctx.cancel = CancellationToken::new();
        let mut result = execute_with_timeout(unit.as_ref(), ctx, budget).await;

        if let Err(reason) = result.validate() {
            // Exactly one regenerate attempt for structurally invalid
            // output; a second invalid result is a hard step failure.
            wf.record_retry(kind);
            self.persistence.save_workflow(wf).await?;
            let attempt = wf.retry_count(kind);
            tracing::warn!(workflow_id = %wf.id, step = %kind, %reason, attempt, "invalid step output, regenerating");
            self.events.emit(WorkflowEvent::StepRetried {
                workflow_id: wf.id.clone(),
                step: kind,
                attempt,
            });

            ctx.cancel = CancellationToken::new();
            result = execute_with_timeout(unit.as_ref(), ctx, budget).await;
            if let Err(reason) = result.validate() {
                let err = StepError::InvalidOutput { kind, reason };
                result = StepResult::failed(kind, &err.to_string(), std::time::Duration::ZERO);
            }
        }

        match result.status {
            StepStatus::Completed => {
                wf.mark_event(&format!("step:{kind}:completed"));
                ctx.prior.push(result.clone());
                let duration_ms = result.duration_ms;
                let artifact_count = result.artifacts.len();
                wf.set_step_result(result);
                self.persistence.save_workflow(wf).await?;
                self.events.emit(WorkflowEvent::StepCompleted {
                    workflow_id: wf.id.clone(),
                    step: kind,
                    duration_ms,
                    artifact_count,
                });
                Ok(StepOutcome::Advanced)
            }
            StepStatus::Failed => {
                let cause = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_string());

                if policy::is_critical(wf.mode, kind) {
                    wf.set_step_result(result);
                    self.fail_workflow(wf, Some(kind), &cause).await?;
                    Ok(StepOutcome::Halted)
                } else {
                    let skipped = StepResult::skipped(kind, &cause);
                    wf.mark_event(&format!("step:{kind}:skipped"));
                    ctx.prior.push(skipped.clone());
                    wf.set_step_result(skipped);
                    self.persistence.save_workflow(wf).await?;
                    tracing::warn!(workflow_id = %wf.id, step = %kind, %cause, "optional step skipped");
                    self.events.emit(WorkflowEvent::StepSkipped {
                        workflow_id: wf.id.clone(),
                        step: kind,
                        cause,
                    });
                    Ok(StepOutcome::Advanced)
                }
            }
            StepStatus::Skipped => unreachable!("validation rejects unit-produced skips"),
        }
    }

    /// Run the terminal publish step and complete the workflow.
    async fn run_publication(
        &self,
        wf: &mut WorkflowRecord,
        session: &SessionRecord,
    ) -> Result<(), WorkflowError> {
        wf.gate_id = None;
        let mut ctx = self.context_for(session, wf, None);
        match self.run_step(wf, &mut ctx, StepKind::Publish).await? {
            StepOutcome::Halted => Ok(()),
            StepOutcome::Advanced => {
                wf.status = WorkflowStatus::Completed;
                wf.current_step = None;
                wf.finished_at = Some(chrono::Utc::now());
                wf.mark_event("workflow:completed");
                self.persistence.save_workflow(wf).await?;

                let branch = wf
                    .step_result(StepKind::Publish)
                    .and_then(|r| r.artifacts.first())
                    .and_then(|a| a.data.get("branch"))
                    .and_then(|b| b.as_str())
                    .map(str::to_string);

                tracing::info!(workflow_id = %wf.id, branch = branch.as_deref().unwrap_or("-"), "workflow completed");
                self.events.emit(WorkflowEvent::WorkflowCompleted {
                    workflow_id: wf.id.clone(),
                    branch,
                });
                Ok(())
            }
        }
    }

    /// Clear and re-run a content step after a rejected content review,
    /// then re-open the gate on the regenerated output.
    async fn regenerate(
        &self,
        wf: &mut WorkflowRecord,
        session: &SessionRecord,
        step: StepKind,
    ) -> Result<(), WorkflowError> {
        wf.clear_step_result(step);
        wf.gate_id = None;
        wf.status = WorkflowStatus::Running;
        wf.mark_event(&format!("step:{step}:regenerate"));
        self.persistence.save_workflow(wf).await?;

        let mut ctx = self.context_for(session, wf, Some(step));
        match self.run_step(wf, &mut ctx, step).await? {
            StepOutcome::Halted => Ok(()),
            StepOutcome::Advanced => {
                self.open_gate(wf, GateKind::Content { step }).await?;
                Ok(())
            }
        }
    }

    async fn open_gate(
        &self,
        wf: &mut WorkflowRecord,
        kind: GateKind,
    ) -> Result<ApprovalGate, WorkflowError> {
        let artifacts = match kind {
            GateKind::Content { step } => wf
                .step_result(step)
                .map(|r| r.artifacts.clone())
                .unwrap_or_default(),
            GateKind::Publish => wf.combined_artifacts(),
        };

        let mut gate = ApprovalGate::new(&wf.id, kind, artifacts);
        self.persistence.save_gate(&mut gate).await?;

        wf.gate_id = Some(gate.id.clone());
        wf.current_step = None;
        wf.status = WorkflowStatus::WaitingApproval;
        wf.mark_event("gate:opened");
        self.persistence.save_workflow(wf).await?;

        tracing::info!(workflow_id = %wf.id, gate_id = %gate.id, "workflow suspended on approval gate");
        self.events.emit(WorkflowEvent::AwaitingApproval {
            workflow_id: wf.id.clone(),
            gate_id: gate.id.clone(),
            artifact_count: gate.artifacts.len(),
        });

        Ok(gate)
    }

    async fn fail_workflow(
        &self,
        wf: &mut WorkflowRecord,
        step: Option<StepKind>,
        cause: &str,
    ) -> Result<(), WorkflowError> {
        wf.status = WorkflowStatus::Failed;
        wf.error = Some(match step {
            Some(kind) => format!("step {kind} failed: {cause}"),
            None => cause.to_string(),
        });
        wf.finished_at = Some(chrono::Utc::now());
        wf.gate_id = None;
        wf.mark_event("workflow:failed");
        self.persistence.save_workflow(wf).await?;

        tracing::error!(workflow_id = %wf.id, step = %step.map(|s| s.to_string()).unwrap_or_default(), cause, "pipeline failed");
        self.events.emit(WorkflowEvent::PipelineFailed {
            workflow_id: wf.id.clone(),
            step,
            error: wf.error.clone().unwrap_or_default(),
        });
        Ok(())
    }

    /// Build a step context from a session, carrying the results of the
    /// steps executed so far. `before` limits the carried results to steps
    /// earlier in the sequence; used when regenerating a mid-sequence step.
    fn context_for(
        &self,
        session: &SessionRecord,
        wf: &WorkflowRecord,
        before: Option<StepKind>,
    ) -> StepContext {
        let mut ctx = StepContext::new(
            session.run_context(),
            self.config.output_root.join(&wf.id),
        );

        let limit = before.map(|k| k.index()).unwrap_or(usize::MAX);
        ctx.prior = wf
            .steps
            .iter()
            .flatten()
            .filter(|r| r.kind.index() < limit)
            .cloned()
            .collect();
        ctx
    }
}
