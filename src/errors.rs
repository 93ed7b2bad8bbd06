//! Typed error hierarchy for the Shipyard pipeline.
//!
//! Three top-level enums cover the three subsystems:
//! - `StepError` — failures of a single work unit invocation
//! - `StoreError` — state store read/write failures
//! - `WorkflowError` — supervisor and approval-gate failures

use thiserror::Error;

use crate::step::StepKind;

/// Errors from a single step-unit invocation.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Step {kind} exceeded its {budget_ms}ms budget")]
    Timeout { kind: StepKind, budget_ms: u64 },

    #[error("Step {kind} failed: {message}")]
    Execution { kind: StepKind, message: String },

    #[error("Step {kind} produced an invalid result: {reason}")]
    InvalidOutput { kind: StepKind, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record {kind}/{id} not found")]
    NotFound { kind: String, id: String },

    #[error("Version conflict on {kind}/{id}: expected {expected}, found {found}")]
    VersionConflict {
        kind: String,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Errors from the workflow supervisor and approval gates.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Critical step {kind} failed: {cause}")]
    CriticalStep { kind: StepKind, cause: String },

    #[error("Workflow {0} not found")]
    WorkflowNotFound(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Approval gate {0} not found")]
    GateNotFound(String),

    #[error("Approval gate {id} already resolved as {status}")]
    GateAlreadyResolved { id: String, status: String },

    #[error("Workflow {id} is {status}, expected {expected}")]
    InvalidState {
        id: String,
        status: String,
        expected: String,
    },

    #[error("Failed to persist workflow state: {0}")]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
