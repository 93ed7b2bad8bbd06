//! External state persistence for sessions, workflows and approval gates.
//!
//! The store is a key/value collaborator with three record kinds, each
//! written with a time-to-live. Updates are versioned: every write carries
//! the version the writer last read, and the store rejects the write if the
//! record moved underneath it. This turns the classic read-modify-write
//! lost-update race into an explicit `VersionConflict`.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::StoreError;
use crate::records::{ApprovalGate, SessionRecord, WorkflowRecord};
use crate::retry::{RetryPolicy, retry};

/// The three record kinds the store distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Session,
    Workflow,
    Gate,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Session => "session",
            RecordKind::Workflow => "workflow",
            RecordKind::Gate => "gate",
        }
    }
}

/// Key/value persistence contract.
///
/// `put` with `expected_version: Some(v)` succeeds only if the stored
/// record's version is `v` (or the record is absent and `v == 0`); the
/// store then writes the body with version `v + 1` and returns it.
/// `expected_version: None` is an unconditional last-write-wins put.
/// `update` is get-then-merge-then-put of a shallow JSON patch, version
/// checked against the record that was read.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError>;

    async fn put(
        &self,
        kind: RecordKind,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
        ttl: Duration,
    ) -> Result<u64, StoreError>;

    async fn update(&self, kind: RecordKind, id: &str, patch: Value) -> Result<Value, StoreError>;
}

/// Per-kind time-to-live configuration.
#[derive(Debug, Clone)]
pub struct TtlConfig {
    pub session: Duration,
    pub workflow: Duration,
    pub gate: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            session: Duration::from_secs(24 * 60 * 60),
            workflow: Duration::from_secs(24 * 60 * 60),
            gate: Duration::from_secs(60 * 60),
        }
    }
}

/// Typed persistence layer over a [`StateStore`].
///
/// Transient backend failures are retried with backoff before being
/// surfaced; version conflicts and serialization errors are surfaced
/// immediately, since retrying cannot fix them.
#[derive(Clone)]
pub struct Persistence {
    store: Arc<dyn StateStore>,
    ttls: TtlConfig,
    write_retry: RetryPolicy,
}

impl Persistence {
    pub fn new(store: Arc<dyn StateStore>, ttls: TtlConfig, write_retry: RetryPolicy) -> Self {
        Self {
            store,
            ttls,
            write_retry,
        }
    }

    /// Persist a workflow record, bumping its version on success.
    pub async fn save_workflow(&self, record: &mut WorkflowRecord) -> Result<(), StoreError> {
        record.version = self
            .save(
                RecordKind::Workflow,
                &record.id,
                record,
                record.version,
                self.ttls.workflow,
            )
            .await?;
        Ok(())
    }

    pub async fn load_workflow(&self, id: &str) -> Result<Option<WorkflowRecord>, StoreError> {
        self.load(RecordKind::Workflow, id).await
    }

    pub async fn save_session(&self, record: &mut SessionRecord) -> Result<(), StoreError> {
        record.version = self
            .save(
                RecordKind::Session,
                &record.id,
                record,
                record.version,
                self.ttls.session,
            )
            .await?;
        Ok(())
    }

    pub async fn load_session(&self, id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.load(RecordKind::Session, id).await
    }

    pub async fn save_gate(&self, record: &mut ApprovalGate) -> Result<(), StoreError> {
        record.version = self
            .save(
                RecordKind::Gate,
                &record.id,
                record,
                record.version,
                self.ttls.gate,
            )
            .await?;
        Ok(())
    }

    pub async fn load_gate(&self, id: &str) -> Result<Option<ApprovalGate>, StoreError> {
        self.load(RecordKind::Gate, id).await
    }

    /// Point a session at the workflow created under it, via a merge patch.
    pub async fn link_workflow(
        &self,
        session_id: &str,
        workflow_id: &str,
    ) -> Result<(), StoreError> {
        self.store
            .update(
                RecordKind::Session,
                session_id,
                serde_json::json!({ "workflow_id": workflow_id }),
            )
            .await?;
        Ok(())
    }

    async fn save<T: Serialize>(
        &self,
        kind: RecordKind,
        id: &str,
        record: &T,
        expected_version: u64,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        let body = serde_json::to_value(record).map_err(StoreError::Serialize)?;

        // Only backend errors are worth retrying; a version conflict or a
        // serialization failure will not change on the next attempt.
        let outcome: Result<Result<u64, StoreError>, StoreError> =
            retry(&self.write_retry, |_attempt| {
                let body = body.clone();
                async move {
                    match self.store.put(kind, id, body, Some(expected_version), ttl).await {
                        Err(StoreError::Backend(msg)) => Err(StoreError::Backend(msg)),
                        other => Ok(other),
                    }
                }
            })
            .await;

        match outcome {
            Ok(inner) => inner,
            Err(err) => Err(err),
        }
    }

    async fn load<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.store.get(kind, id).await? {
            Some(body) => {
                let record = serde_json::from_value(body).map_err(StoreError::Serialize)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}
