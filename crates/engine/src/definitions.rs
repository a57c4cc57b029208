//! Definition store contract and in-memory implementation.
//!
//! The store owns [`ReportDefinition`] persistence; the engine reads
//! definitions and writes back only schedule bookkeeping (`next_run_at`,
//! `last_run_at`, `run_count`) and lifecycle changes.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use reportflow_core::{EngineError, EngineResult, ReportId};
use reportflow_domain::{ReportDefinition, ReportLifecycle};

pub trait DefinitionStore: Send + Sync {
    /// Fetch one definition. Absence is an explicit `NotFound` error, not a
    /// null to branch on.
    fn get(&self, id: ReportId) -> EngineResult<ReportDefinition>;

    fn list(&self) -> Vec<ReportDefinition>;

    fn upsert(&self, definition: ReportDefinition);

    /// Write back bookkeeping after a completed run: bumps `run_count`,
    /// stamps `last_run_at`, stores the freshly computed next run.
    /// `run_count` moves only through this call, so it only ever increases.
    fn record_run(
        &self,
        id: ReportId,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> EngineResult<()>;

    fn set_lifecycle(&self, id: ReportId, lifecycle: ReportLifecycle) -> EngineResult<()>;

    fn set_next_run(&self, id: ReportId, next_run_at: Option<DateTime<Utc>>) -> EngineResult<()>;
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    definitions: RwLock<HashMap<ReportId, ReportDefinition>>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn update<F>(&self, id: ReportId, apply: F) -> EngineResult<()>
    where
        F: FnOnce(&mut ReportDefinition),
    {
        let mut definitions = self.definitions.write().unwrap();
        let definition = definitions
            .get_mut(&id)
            .ok_or_else(|| EngineError::not_found(format!("report {id}")))?;
        apply(definition);
        Ok(())
    }
}

impl DefinitionStore for InMemoryDefinitionStore {
    fn get(&self, id: ReportId) -> EngineResult<ReportDefinition> {
        self.definitions
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("report {id}")))
    }

    fn list(&self) -> Vec<ReportDefinition> {
        self.definitions.read().unwrap().values().cloned().collect()
    }

    fn upsert(&self, definition: ReportDefinition) {
        self.definitions
            .write()
            .unwrap()
            .insert(definition.id, definition);
    }

    fn record_run(
        &self,
        id: ReportId,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> EngineResult<()> {
        self.update(id, |definition| {
            definition.run_count += 1;
            definition.last_run_at = Some(last_run_at);
            definition.next_run_at = next_run_at;
        })
    }

    fn set_lifecycle(&self, id: ReportId, lifecycle: ReportLifecycle) -> EngineResult<()> {
        self.update(id, |definition| definition.lifecycle = lifecycle)
    }

    fn set_next_run(&self, id: ReportId, next_run_at: Option<DateTime<Utc>>) -> EngineResult<()> {
        self.update(id, |definition| definition.next_run_at = next_run_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_definition_is_an_explicit_not_found() {
        let store = InMemoryDefinitionStore::new();
        assert!(matches!(
            store.get(ReportId::new()),
            Err(EngineError::NotFound(_))
        ));
        assert!(matches!(
            store.set_lifecycle(ReportId::new(), ReportLifecycle::Paused),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn record_run_bumps_count_and_stamps_times() {
        let store = InMemoryDefinitionStore::new();
        let definition = ReportDefinition::new("bookkeeping");
        let id = definition.id;
        store.upsert(definition);

        let ran_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let next = ran_at + chrono::Duration::days(1);
        store.record_run(id, ran_at, Some(next)).unwrap();
        store.record_run(id, ran_at, Some(next)).unwrap();

        let stored = store.get(id).unwrap();
        assert_eq!(stored.run_count, 2);
        assert_eq!(stored.last_run_at, Some(ran_at));
        assert_eq!(stored.next_run_at, Some(next));
    }
}
