// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the RecordStore trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use parley_config::model::StorageConfig;
use parley_core::{
    Backend, BackendKind, Dialog, DialogId, EndReason, HealthStatus, ParleyError, RecordStore,
    ReportRecord, Topic, TopicId, TopicRetirement, UserId,
};

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed record store.
///
/// The database is opened by [`RecordStore::initialize`]; every other call
/// fails until then.
pub struct SqliteRecords {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteRecords {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// The underlying database, for read-side tooling such as `parley status`.
    pub fn database(&self) -> Result<&Database, ParleyError> {
        self.db.get().ok_or_else(|| ParleyError::Storage {
            source: "record store not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl Backend for SqliteRecords {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::RecordStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        let Some(db) = self.db.get() else {
            return Ok(HealthStatus::Unhealthy("not initialized".to_string()));
        };
        db.connection()
            .call(|conn| conn.execute_batch("SELECT 1;"))
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecords {
    async fn initialize(&self) -> Result<(), ParleyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ParleyError::Storage {
            source: "record store already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite record store initialized");
        Ok(())
    }

    async fn record_user_seen(&self, user: UserId, at: DateTime<Utc>) -> Result<(), ParleyError> {
        queries::users::touch_user(self.database()?, user, at).await
    }

    async fn record_dialog_started(&self, dialog: &Dialog) -> Result<(), ParleyError> {
        queries::dialogs::insert_dialog(self.database()?, dialog).await
    }

    async fn record_dialog_ended(
        &self,
        dialog_id: &DialogId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<(), ParleyError> {
        let closed = queries::dialogs::close_dialog(self.database()?, dialog_id, reason, at).await?;
        if !closed {
            debug!(dialog_id = %dialog_id, "no open dialog record to close");
        }
        Ok(())
    }

    async fn record_topic_created(&self, topic: &Topic) -> Result<(), ParleyError> {
        queries::topics::insert_topic(self.database()?, topic).await
    }

    async fn record_topic_retired(
        &self,
        topic_id: &TopicId,
        reason: TopicRetirement,
    ) -> Result<(), ParleyError> {
        queries::topics::retire_topic(self.database()?, topic_id, reason).await?;
        Ok(())
    }

    async fn record_report(&self, report: &ReportRecord) -> Result<(), ParleyError> {
        let id = queries::reports::insert_report(self.database()?, report).await?;
        debug!(report_id = id, target = %report.target, "report recorded");
        Ok(())
    }

    async fn record_ban(&self, user: UserId, until: DateTime<Utc>) -> Result<(), ParleyError> {
        queries::users::set_ban(self.database()?, user, until).await
    }

    async fn deactivate_expired_topics(&self, now: DateTime<Utc>) -> Result<usize, ParleyError> {
        queries::topics::deactivate_expired(self.database()?, now).await
    }
}
