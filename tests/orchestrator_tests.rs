//! End-to-end supervisor tests with scripted work units.
//!
//! These drive the full state machine — sequencing, timeout enforcement,
//! validation, critical/optional classification and the approval gate
//! protocol — without touching any real content generator.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use shipyard::context::{Credential, Repository};
use shipyard::errors::{StepError, WorkflowError};
use shipyard::orchestrator::{
    EventChannel, Orchestrator, OrchestratorConfig, UnitRegistry, WorkflowEvent,
};
use shipyard::policy::Mode;
use shipyard::records::{GateKind, GateStatus, SessionRecord, WorkflowStatus};
use shipyard::retry::RetryPolicy;
use shipyard::step::{
    Artifact, CONTENT_STEPS, StepContext, StepKind, StepResult, StepStatus, StepUnit,
};
use shipyard::store::{MemoryStore, Persistence, TtlConfig};

/// What a scripted unit does on one invocation.
#[derive(Clone)]
enum Behavior {
    /// Return a completed result with one artifact.
    Succeed,
    /// Return an execution error.
    Fail(&'static str),
    /// Never resolve; only the budget ends it.
    Hang,
    /// Return a structurally invalid result (completed, no artifacts).
    Invalid,
}

struct ScriptedUnit {
    kind: StepKind,
    script: Mutex<VecDeque<Behavior>>,
    invocations: AtomicU32,
}

impl ScriptedUnit {
    fn new(kind: StepKind, script: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into()),
            invocations: AtomicU32::new(0),
        })
    }

    fn always_ok(kind: StepKind) -> Arc<Self> {
        Self::new(kind, Vec::new())
    }

    fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepUnit for ScriptedUnit {
    fn kind(&self) -> StepKind {
        self.kind
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<StepResult, StepError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => Ok(StepResult::completed(
                self.kind,
                vec![Artifact::json(
                    self.kind.as_str(),
                    serde_json::json!({"ok": true, "branch": "shipyard/launch-test"}),
                )],
                Duration::from_millis(3),
            )),
            Behavior::Fail(message) => Err(StepError::Execution {
                kind: self.kind,
                message: message.to_string(),
            }),
            Behavior::Hang => futures::future::pending().await,
            Behavior::Invalid => Ok(StepResult::completed(
                self.kind,
                Vec::new(),
                Duration::from_millis(3),
            )),
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    units: Vec<Arc<ScriptedUnit>>,
    events: EventChannel,
    _output: tempfile::TempDir,
}

impl Harness {
    /// Build a harness where every unit succeeds except those overridden.
    fn new(overrides: Vec<Arc<ScriptedUnit>>, content_review: Option<StepKind>) -> Self {
        let output = tempfile::tempdir().unwrap();
        let mut units: Vec<Arc<ScriptedUnit>> = Vec::new();

        let mut registry = UnitRegistry::new();
        for kind in shipyard::step::SEQUENCE {
            let unit = overrides
                .iter()
                .find(|u| u.kind == kind)
                .cloned()
                .unwrap_or_else(|| ScriptedUnit::always_ok(kind));
            units.push(unit.clone());
            registry.insert(kind, unit as Arc<dyn StepUnit>);
        }

        let events = EventChannel::default();
        let persistence = Persistence::new(
            Arc::new(MemoryStore::new()),
            TtlConfig::default(),
            RetryPolicy::none(),
        );
        let orchestrator = Orchestrator::new(
            registry,
            persistence,
            events.clone(),
            OrchestratorConfig {
                content_review,
                output_root: output.path().to_path_buf(),
                ..OrchestratorConfig::default()
            },
        );

        Self {
            orchestrator,
            units,
            events,
            _output: output,
        }
    }

    fn unit(&self, kind: StepKind) -> &Arc<ScriptedUnit> {
        self.units.iter().find(|u| u.kind == kind).unwrap()
    }

    fn session(&self, mode: Mode) -> SessionRecord {
        SessionRecord::new(
            Repository::local("demo", std::env::temp_dir()),
            Credential::anonymous(),
            mode,
            3600,
        )
    }
}

// =========================================================================
// Failure classification
// =========================================================================

#[tokio::test]
async fn scenario_docs_fails_twice_aborts_workflow() {
    // docs produces invalid output, is regenerated once, and fails again:
    // a critical failure in every mode.
    let harness = Harness::new(
        vec![ScriptedUnit::new(
            StepKind::Docs,
            vec![Behavior::Invalid, Behavior::Invalid],
        )],
        None,
    );
    let mut session = harness.session(Mode::Placement);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();

    assert_eq!(wf.status, WorkflowStatus::Failed);
    assert!(wf.error.as_deref().unwrap().contains("docs"));
    assert_eq!(harness.unit(StepKind::Docs).invocations(), 2);
    assert_eq!(wf.retry_count(StepKind::Docs), 1);

    // No subsequent step ran or was slotted.
    assert_eq!(harness.unit(StepKind::Demo).invocations(), 0);
    assert!(wf.step_result(StepKind::Demo).is_none());
    assert!(wf.step_result(StepKind::Pitch).is_none());
}

#[tokio::test]
async fn scenario_optional_demo_failure_skips_and_continues() {
    // In placement mode the demo is below the critical threshold.
    let harness = Harness::new(
        vec![ScriptedUnit::new(
            StepKind::Demo,
            vec![Behavior::Fail("deploy quota exceeded")],
        )],
        None,
    );
    let mut session = harness.session(Mode::Placement);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();

    assert_eq!(wf.status, WorkflowStatus::WaitingApproval);
    let demo = wf.step_result(StepKind::Demo).unwrap();
    assert_eq!(demo.status, StepStatus::Skipped);
    assert!(demo.error.as_deref().unwrap().contains("deploy quota exceeded"));

    // The pipeline went on to the pitch.
    assert_eq!(harness.unit(StepKind::Pitch).invocations(), 1);
    assert!(wf.skip_summary().unwrap().contains("demo"));
}

#[tokio::test(start_paused = true)]
async fn scenario_pitch_timeout_is_critical_in_hackathon_mode() {
    let harness = Harness::new(
        vec![ScriptedUnit::new(StepKind::Pitch, vec![Behavior::Hang])],
        None,
    );
    let mut session = harness.session(Mode::Hackathon);

    let started = tokio::time::Instant::now();
    let wf = harness.orchestrator.start(&mut session).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(wf.status, WorkflowStatus::Failed);
    let error = wf.error.as_deref().unwrap();
    assert!(error.contains("pitch"), "error names the step: {error}");
    assert!(error.contains("45000ms"), "error names the budget: {error}");

    // The failure landed within the budget (plus scheduling slack), and
    // the workflow never reached the approval gate.
    assert!(elapsed >= Duration::from_millis(45_000));
    assert!(elapsed < Duration::from_millis(46_000));
    assert!(wf.gate_id.is_none());
    assert_eq!(harness.unit(StepKind::Publish).invocations(), 0);
}

#[tokio::test(start_paused = true)]
async fn same_timeout_is_survivable_where_pitch_is_optional() {
    let harness = Harness::new(
        vec![ScriptedUnit::new(StepKind::Pitch, vec![Behavior::Hang])],
        None,
    );
    let mut session = harness.session(Mode::OpenSource);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();

    assert_eq!(wf.status, WorkflowStatus::WaitingApproval);
    assert_eq!(
        wf.step_result(StepKind::Pitch).unwrap().status,
        StepStatus::Skipped
    );
}

#[tokio::test]
async fn invalid_output_recovers_on_regenerate() {
    let harness = Harness::new(
        vec![ScriptedUnit::new(
            StepKind::Docs,
            vec![Behavior::Invalid, Behavior::Succeed],
        )],
        None,
    );
    let mut session = harness.session(Mode::Hackathon);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();

    assert_eq!(wf.status, WorkflowStatus::WaitingApproval);
    assert_eq!(harness.unit(StepKind::Docs).invocations(), 2);
    assert_eq!(wf.retry_count(StepKind::Docs), 1);
    assert_eq!(
        wf.step_result(StepKind::Docs).unwrap().status,
        StepStatus::Completed
    );
}

// =========================================================================
// Sequencing
// =========================================================================

#[tokio::test]
async fn executed_slots_form_a_prefix_of_the_sequence() {
    let harness = Harness::new(
        vec![ScriptedUnit::new(
            StepKind::Analyze,
            vec![Behavior::Fail("clone failed")],
        )],
        None,
    );
    let mut session = harness.session(Mode::Hackathon);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();

    assert_eq!(wf.status, WorkflowStatus::Failed);
    // Only the first slot is populated; everything after is untouched.
    let populated: Vec<bool> = wf.steps.iter().map(Option::is_some).collect();
    assert_eq!(populated, vec![true, false, false, false, false]);

    for kind in CONTENT_STEPS.iter().skip(1) {
        assert_eq!(harness.unit(*kind).invocations(), 0, "{kind} must not run");
    }
}

#[tokio::test]
async fn happy_path_fills_every_slot_in_order() {
    let harness = Harness::new(Vec::new(), None);
    let mut session = harness.session(Mode::Hackathon);
    let mut rx = harness.events.subscribe();

    let wf = harness.orchestrator.start(&mut session).await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::WaitingApproval);

    let gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();
    assert_eq!(gate.kind, GateKind::Publish);
    assert!(!gate.artifacts.is_empty());

    let wf = harness.orchestrator.respond(&gate.id, true, None).await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
    assert!(wf.steps.iter().all(Option::is_some));
    assert!(wf.finished_at.is_some());

    // Step events arrive in sequence order.
    let mut started = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if let WorkflowEvent::StepStarted { step, .. } = envelope.event {
            started.push(step);
        }
    }
    assert_eq!(
        started,
        vec![
            StepKind::Analyze,
            StepKind::Docs,
            StepKind::Demo,
            StepKind::Pitch,
            StepKind::Publish
        ]
    );
}

#[tokio::test]
async fn workflow_state_is_persisted_across_transitions() {
    let harness = Harness::new(Vec::new(), None);
    let mut session = harness.session(Mode::Startup);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();

    // An observer reading the store sees the same suspended state.
    let stored = harness.orchestrator.load_workflow(&wf.id).await.unwrap();
    assert_eq!(stored.status, WorkflowStatus::WaitingApproval);
    assert_eq!(stored.version, wf.version);
    assert_eq!(stored.gate_id, wf.gate_id);
    assert_eq!(stored.session_id, session.id);
    assert_eq!(session.workflow_id.as_deref(), Some(wf.id.as_str()));
}

// =========================================================================
// Approval protocol
// =========================================================================

#[tokio::test]
async fn publish_rejection_fails_the_workflow() {
    let harness = Harness::new(Vec::new(), None);
    let mut session = harness.session(Mode::Hackathon);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();
    let gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();

    let wf = harness
        .orchestrator
        .respond(&gate.id, false, Some("not good enough".into()))
        .await
        .unwrap();

    assert_eq!(wf.status, WorkflowStatus::Failed);
    assert!(wf.error.as_deref().unwrap().contains("rejected by reviewer"));
    assert_eq!(harness.unit(StepKind::Publish).invocations(), 0);
}

#[tokio::test]
async fn first_gate_response_wins() {
    let harness = Harness::new(Vec::new(), None);
    let mut session = harness.session(Mode::Hackathon);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();
    let gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();

    harness.orchestrator.respond(&gate.id, true, None).await.unwrap();

    // A late rejection bounces off the resolved gate...
    let err = harness
        .orchestrator
        .respond(&gate.id, false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::GateAlreadyResolved { .. }));

    // ...and the original approval stands.
    let wf = harness.orchestrator.load_workflow(&wf.id).await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn responding_to_unknown_gate_fails() {
    let harness = Harness::new(Vec::new(), None);
    let err = harness
        .orchestrator
        .respond("gate-unknown", true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::GateNotFound(_)));
}

#[tokio::test]
async fn scenario_content_rejection_regenerates_the_step() {
    let harness = Harness::new(Vec::new(), Some(StepKind::Pitch));
    let mut session = harness.session(Mode::Hackathon);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();
    let gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();
    assert_eq!(gate.kind, GateKind::Content { step: StepKind::Pitch });

    // Rejecting content review clears and re-runs the pitch, then
    // suspends again on a fresh content gate.
    let wf = harness
        .orchestrator
        .respond(&gate.id, false, Some("too dry".into()))
        .await
        .unwrap();

    assert_eq!(wf.status, WorkflowStatus::WaitingApproval);
    assert_eq!(harness.unit(StepKind::Pitch).invocations(), 2);
    assert!(wf.timeline.contains_key("step:pitch:regenerate"));

    let second_gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();
    assert_ne!(second_gate.id, gate.id);
    assert_eq!(second_gate.kind, GateKind::Content { step: StepKind::Pitch });
    assert_eq!(second_gate.status, GateStatus::Pending);

    // Approving content review leads to the publish gate, and approving
    // that completes the workflow.
    let wf = harness
        .orchestrator
        .respond(&second_gate.id, true, None)
        .await
        .unwrap();
    assert_eq!(wf.status, WorkflowStatus::WaitingApproval);
    let publish_gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();
    assert_eq!(publish_gate.kind, GateKind::Publish);

    let wf = harness
        .orchestrator
        .respond(&publish_gate.id, true, None)
        .await
        .unwrap();
    assert_eq!(wf.status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn rejected_gate_records_feedback() {
    let harness = Harness::new(Vec::new(), None);
    let mut session = harness.session(Mode::Placement);

    let wf = harness.orchestrator.start(&mut session).await.unwrap();
    let gate = harness.orchestrator.pending_gate(&wf).await.unwrap().unwrap();

    harness
        .orchestrator
        .respond(&gate.id, false, Some("missing screenshots".into()))
        .await
        .unwrap();

    // The resolved gate is still readable until its TTL, with the
    // feedback attached.
    let wf = harness.orchestrator.load_workflow(&wf.id).await.unwrap();
    assert_eq!(wf.status, WorkflowStatus::Failed);
}
