//! In-memory state store with TTL eviction and versioned writes.
//!
//! The default backend for single-process runs and for tests. Records are
//! evicted lazily: an expired entry is treated as absent on read and
//! overwritten on write.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{RecordKind, StateStore};
use crate::errors::StoreError;

struct Entry {
    body: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn version(&self) -> u64 {
        self.body
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

/// Thread-safe in-memory [`StateStore`].
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(RecordKind, String), Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Reads already ignore expired records;
    /// this reclaims their memory.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    /// Number of live (unexpired) records, for diagnostics.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Value>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(kind, id.to_string()))
            .filter(|e| !e.is_expired(now))
            .map(|e| e.body.clone()))
    }

    async fn put(
        &self,
        kind: RecordKind,
        id: &str,
        mut body: Value,
        expected_version: Option<u64>,
        ttl: Duration,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let key = (kind, id.to_string());

        let current = entries.get(&key).filter(|e| !e.is_expired(now));
        let current_version = current.map(Entry::version).unwrap_or(0);

        if let Some(expected) = expected_version
            && expected != current_version
        {
            return Err(StoreError::VersionConflict {
                kind: kind.as_str().to_string(),
                id: id.to_string(),
                expected,
                found: current_version,
            });
        }

        let new_version = current_version + 1;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("version".to_string(), Value::from(new_version));
        }

        entries.insert(
            key,
            Entry {
                body,
                expires_at: now + ttl,
            },
        );

        tracing::debug!(kind = kind.as_str(), id, version = new_version, "record stored");
        Ok(new_version)
    }

    async fn update(&self, kind: RecordKind, id: &str, patch: Value) -> Result<Value, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let key = (kind, id.to_string());

        let entry = entries
            .get_mut(&key)
            .filter(|e| !e.is_expired(now))
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.as_str().to_string(),
                id: id.to_string(),
            })?;

        let obj = entry.body.as_object_mut().ok_or_else(|| {
            StoreError::Backend(format!("record {}/{} is not an object", kind.as_str(), id))
        })?;

        if let Some(patch_obj) = patch.as_object() {
            for (k, v) in patch_obj {
                obj.insert(k.clone(), v.clone());
            }
        }

        let version = obj.get("version").and_then(Value::as_u64).unwrap_or(0) + 1;
        obj.insert("version".to_string(), Value::from(version));

        Ok(entry.body.clone())
    }
}
