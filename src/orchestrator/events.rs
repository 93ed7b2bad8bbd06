//! One-directional push notification of pipeline state changes.
//!
//! Events fan out over a tokio broadcast channel to any number of
//! subscribers (terminal UI, dashboard WebSocket). Delivery is best-effort:
//! `emit` never blocks, and a send with no receivers or a lagging receiver
//! is simply dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::step::StepKind;

/// Events emitted by the supervisor during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A workflow has started executing.
    WorkflowStarted { workflow_id: String, mode: String },
    /// A step has started.
    StepStarted { workflow_id: String, step: StepKind },
    /// A step completed successfully.
    StepCompleted {
        workflow_id: String,
        step: StepKind,
        duration_ms: u64,
        artifact_count: usize,
    },
    /// A step produced invalid output and is being re-invoked.
    StepRetried {
        workflow_id: String,
        step: StepKind,
        attempt: u32,
    },
    /// An optional step failed and was recorded as skipped.
    StepSkipped {
        workflow_id: String,
        step: StepKind,
        cause: String,
    },
    /// A critical step failed; the pipeline halted.
    PipelineFailed {
        workflow_id: String,
        step: Option<StepKind>,
        error: String,
    },
    /// The workflow suspended on an approval gate.
    AwaitingApproval {
        workflow_id: String,
        gate_id: String,
        artifact_count: usize,
    },
    /// A human responded to a gate.
    ApprovalReceived {
        workflow_id: String,
        gate_id: String,
        approved: bool,
    },
    /// The terminal step ran and the workflow completed.
    WorkflowCompleted {
        workflow_id: String,
        branch: Option<String>,
    },
}

/// An event with its emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: WorkflowEvent,
}

/// Fire-and-forget broadcast channel for [`WorkflowEvent`]s.
#[derive(Clone)]
pub struct EventChannel {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event. Never blocks; absent receivers are fine.
    pub fn emit(&self, event: WorkflowEvent) {
        let envelope = EventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to all events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}
