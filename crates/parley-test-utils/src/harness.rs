// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` assembles an [`Engine`] over an in-memory state store
//! (wrapped in a [`FlakyStore`]) and either an in-memory record log or a
//! temp SQLite database.

use std::sync::Arc;
use std::time::Duration;

use parley_config::model::{EngineConfig, StorageConfig};
use parley_core::{DialogId, ParleyError, RecordStore, UserId};
use parley_engine::{Engine, MatchOutcome, SearchOutcome};
use parley_state::MemoryStore;
use parley_storage::{MemoryRecords, RecordEvent, SqliteRecords};

use crate::flaky_store::FlakyStore;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    engine: EngineConfig,
    sqlite: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            engine: EngineConfig::default(),
            sqlite: false,
        }
    }

    /// Replace the whole engine configuration.
    pub fn with_engine_config(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.engine.search_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_dialog_inactivity(mut self, inactivity: Duration) -> Self {
        self.engine.dialog_inactivity_secs = inactivity.as_secs();
        self
    }

    /// Record into a temp SQLite database instead of the in-memory log.
    pub fn with_sqlite_records(mut self) -> Self {
        self.sqlite = true;
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ParleyError> {
        let store = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));

        let mut log = None;
        let mut temp_dir = None;
        let records: Arc<dyn RecordStore> = if self.sqlite {
            let dir = tempfile::TempDir::new().map_err(ParleyError::storage)?;
            let db_path = dir.path().join("parley-test.db");
            let sqlite = SqliteRecords::new(StorageConfig {
                database_path: db_path.to_string_lossy().to_string(),
                wal_mode: true,
            });
            sqlite.initialize().await?;
            temp_dir = Some(dir);
            Arc::new(sqlite)
        } else {
            let memory = Arc::new(MemoryRecords::new());
            log = Some(memory.clone());
            memory
        };

        let engine = Engine::new(self.engine.clone(), store.clone(), records.clone());

        Ok(TestHarness {
            engine,
            store,
            records,
            log,
            config: self.engine,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine over test backends.
pub struct TestHarness {
    /// The engine under test.
    pub engine: Engine,
    /// Live state; toggle failures with [`FlakyStore::set_failing`].
    pub store: Arc<FlakyStore>,
    /// Durable records, whichever backend was chosen.
    pub records: Arc<dyn RecordStore>,
    /// The in-memory record log, unless SQLite was requested.
    pub log: Option<Arc<MemoryRecords>>,
    /// The engine configuration in effect.
    pub config: EngineConfig,
    /// Temp directory kept alive for the SQLite file.
    _temp_dir: Option<tempfile::TempDir>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Default configuration with in-memory records.
    pub async fn new() -> Result<Self, ParleyError> {
        Self::builder().build().await
    }

    /// Writes received by the in-memory record log, empty under SQLite.
    pub fn recorded(&self) -> Vec<RecordEvent> {
        self.log.as_ref().map(|log| log.events()).unwrap_or_default()
    }

    /// Queues `a` then `b` and pairs them through the queue.
    pub async fn pair(&self, a: UserId, b: UserId) -> Result<DialogId, ParleyError> {
        for user in [a, b] {
            let outcome = self.engine.begin_search(user).await?;
            if outcome != SearchOutcome::Queued {
                return Err(ParleyError::Internal(format!(
                    "{user} could not search: {outcome:?}"
                )));
            }
        }
        match self.engine.try_match(b).await? {
            MatchOutcome::Matched { dialog_id, partner } if partner == a => Ok(dialog_id),
            other => Err(ParleyError::Internal(format!(
                "{a} and {b} did not pair: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::UserState;

    #[tokio::test]
    async fn pair_forms_a_dialog() {
        let harness = TestHarness::new().await.unwrap();
        let dialog_id = harness.pair(UserId(1), UserId(2)).await.unwrap();

        assert_eq!(harness.engine.state(UserId(1)).await.unwrap(), UserState::InDialog);
        assert!(harness.engine.dialog(&dialog_id).await.unwrap().is_some());
        assert!(
            harness
                .recorded()
                .iter()
                .any(|e| matches!(e, RecordEvent::DialogStarted(d) if d.dialog_id == dialog_id))
        );
    }

    #[tokio::test]
    async fn sqlite_records_build() {
        let harness = TestHarness::builder()
            .with_sqlite_records()
            .build()
            .await
            .unwrap();
        harness.pair(UserId(1), UserId(2)).await.unwrap();
        assert!(harness.log.is_none());
        assert!(harness.recorded().is_empty());
    }
}
