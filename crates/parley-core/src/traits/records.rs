// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable record store: append-only audit trail of terminal events.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ParleyError;
use crate::traits::backend::Backend;
use crate::types::{Dialog, DialogId, EndReason, ReportRecord, Topic, TopicId, TopicRetirement, UserId};

/// ACID store the engine mirrors terminal events into.
///
/// The engine writes to it but never reads it to make live decisions.
#[async_trait]
pub trait RecordStore: Backend {
    /// Opens connections and applies pending schema migrations.
    async fn initialize(&self) -> Result<(), ParleyError>;

    /// Creates the user row on first sight and bumps `last_seen_at`.
    async fn record_user_seen(&self, user: UserId, at: DateTime<Utc>) -> Result<(), ParleyError>;

    async fn record_dialog_started(&self, dialog: &Dialog) -> Result<(), ParleyError>;

    async fn record_dialog_ended(
        &self,
        dialog_id: &DialogId,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<(), ParleyError>;

    async fn record_topic_created(&self, topic: &Topic) -> Result<(), ParleyError>;

    async fn record_topic_retired(
        &self,
        topic_id: &TopicId,
        reason: TopicRetirement,
    ) -> Result<(), ParleyError>;

    async fn record_report(&self, report: &ReportRecord) -> Result<(), ParleyError>;

    async fn record_ban(&self, user: UserId, until: DateTime<Utc>) -> Result<(), ParleyError>;

    /// Marks topics past their expiry inactive; returns how many changed.
    async fn deactivate_expired_topics(&self, now: DateTime<Utc>) -> Result<usize, ParleyError>;
}
