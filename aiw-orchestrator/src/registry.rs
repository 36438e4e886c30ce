//! Storage for workspace records.
//!
//! The registry is the only place records are mutated. Every state change
//! goes through [`WorkspaceRegistry::transition`], which checks the expected
//! state and the lifecycle graph atomically with the write.

use crate::error::{OrchestratorError, Result};
use crate::workspace::{apply_transition, WorkspaceRecord, WorkspaceState};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Field updates applied as part of a transition.
///
/// A registry may apply it more than once when a concurrent write forces it
/// to retry against a fresh copy of the record.
pub type Mutator = Box<dyn Fn(&mut WorkspaceRecord) + Send + Sync>;

/// A mutator that only changes the state.
pub fn unchanged() -> Mutator {
    Box::new(|_| {})
}

#[async_trait]
pub trait WorkspaceRegistry: Send + Sync {
    /// Insert a `pending` record. Fails with `DuplicateId` if `id` exists.
    async fn create(
        &self,
        id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<WorkspaceRecord>;

    async fn get(&self, id: &str) -> Result<WorkspaceRecord>;

    /// Move `id` to `next` if its current state is one of `expected`.
    async fn transition(
        &self,
        id: &str,
        expected: &[WorkspaceState],
        next: WorkspaceState,
        mutator: Mutator,
    ) -> Result<WorkspaceRecord>;

    /// Advance `last_activity_at` to now. Never moves it backwards.
    async fn touch(&self, id: &str) -> Result<()>;

    /// Set or clear `last_error` without changing state.
    async fn record_error(&self, id: &str, message: Option<String>) -> Result<()>;

    async fn list(&self) -> Result<Vec<WorkspaceRecord>>;

    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-local registry. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: Mutex<HashMap<String, WorkspaceRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, WorkspaceRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkspaceRegistry for MemoryRegistry {
    async fn create(
        &self,
        id: &str,
        name: &str,
        description: Option<String>,
    ) -> Result<WorkspaceRecord> {
        let mut records = self.records();
        if records.contains_key(id) {
            return Err(OrchestratorError::DuplicateId(id.to_string()));
        }

        let record = WorkspaceRecord::new(id, name, description, Utc::now());
        records.insert(id.to_string(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<WorkspaceRecord> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))
    }

    async fn transition(
        &self,
        id: &str,
        expected: &[WorkspaceState],
        next: WorkspaceState,
        mutator: Mutator,
    ) -> Result<WorkspaceRecord> {
        let mut records = self.records();
        let current = records
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;

        let mut updated = current.clone();
        apply_transition(&mut updated, expected, next, |r| mutator(r))?;
        *current = updated.clone();
        Ok(updated)
    }

    async fn touch(&self, id: &str) -> Result<()> {
        let mut records = self.records();
        let record = records
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        record.last_activity_at = record.last_activity_at.max(Utc::now());
        Ok(())
    }

    async fn record_error(&self, id: &str, message: Option<String>) -> Result<()> {
        let mut records = self.records();
        let record = records
            .get_mut(id)
            .ok_or_else(|| OrchestratorError::NotFound(id.to_string()))?;
        record.last_error = message;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WorkspaceRecord>> {
        Ok(self.records().values().cloned().collect())
    }
}
