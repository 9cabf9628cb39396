// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory record store for tests and ephemeral deployments.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use parley_core::{
    Backend, BackendKind, Dialog, DialogId, EndReason, HealthStatus, ParleyError, RecordStore,
    ReportRecord, Topic, TopicId, TopicRetirement, UserId,
};

/// One write received by [`MemoryRecords`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    UserSeen(UserId),
    DialogStarted(Dialog),
    DialogEnded(DialogId, EndReason),
    TopicCreated(Topic),
    TopicRetired(TopicId, TopicRetirement),
    Report(ReportRecord),
    Ban(UserId, DateTime<Utc>),
}

/// [`RecordStore`] that keeps every write in a vector.
///
/// [`MemoryRecords::set_failing`] makes every write fail with a storage
/// error, to exercise error paths.
#[derive(Debug, Default)]
pub struct MemoryRecords {
    events: Mutex<Vec<RecordEvent>>,
    failing: AtomicBool,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all writes so far.
    pub fn events(&self) -> Vec<RecordEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<ReportRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RecordEvent::Report(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: RecordEvent) -> Result<(), ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ParleyError::storage(std::io::Error::other(
                "record store unavailable",
            )));
        }
        self.events
            .lock()
            .map_err(|_| ParleyError::Internal("record log poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryRecords {
    fn name(&self) -> &str {
        "memory-records"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::RecordStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            Ok(HealthStatus::Unhealthy("failing".to_string()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn initialize(&self) -> Result<(), ParleyError> {
        Ok(())
    }

    async fn record_user_seen(&self, user: UserId, _at: DateTime<Utc>) -> Result<(), ParleyError> {
        self.push(RecordEvent::UserSeen(user))
    }

    async fn record_dialog_started(&self, dialog: &Dialog) -> Result<(), ParleyError> {
        self.push(RecordEvent::DialogStarted(dialog.clone()))
    }

    async fn record_dialog_ended(
        &self,
        dialog_id: &DialogId,
        reason: EndReason,
        _at: DateTime<Utc>,
    ) -> Result<(), ParleyError> {
        self.push(RecordEvent::DialogEnded(dialog_id.clone(), reason))
    }

    async fn record_topic_created(&self, topic: &Topic) -> Result<(), ParleyError> {
        self.push(RecordEvent::TopicCreated(topic.clone()))
    }

    async fn record_topic_retired(
        &self,
        topic_id: &TopicId,
        reason: TopicRetirement,
    ) -> Result<(), ParleyError> {
        self.push(RecordEvent::TopicRetired(topic_id.clone(), reason))
    }

    async fn record_report(&self, report: &ReportRecord) -> Result<(), ParleyError> {
        self.push(RecordEvent::Report(report.clone()))
    }

    async fn record_ban(&self, user: UserId, until: DateTime<Utc>) -> Result<(), ParleyError> {
        self.push(RecordEvent::Ban(user, until))
    }

    async fn deactivate_expired_topics(&self, _now: DateTime<Utc>) -> Result<usize, ParleyError> {
        Ok(0)
    }
}
