// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic advertisement records.

use chrono::{DateTime, Utc};
use parley_core::{ParleyError, Topic, TopicId, TopicRetirement};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{timestamp, TopicRow};

pub async fn insert_topic(db: &Database, topic: &Topic) -> Result<(), ParleyError> {
    let id = topic.topic_id.0.clone();
    let owner = topic.owner.0;
    let text = topic.text.clone();
    let created_at = timestamp(topic.created_at);
    let expires_at = timestamp(topic.expires_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO topics (id, owner, text, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, owner, text, created_at, expires_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Deactivate one topic. Returns false if it was unknown or already inactive.
pub async fn retire_topic(
    db: &Database,
    id: &TopicId,
    reason: TopicRetirement,
) -> Result<bool, ParleyError> {
    let id = id.0.clone();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE topics SET is_active = 0, retired_reason = ?2
                 WHERE id = ?1 AND is_active = 1",
                params![id, reason],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Deactivate every active topic whose expiry is at or before `now`.
pub async fn deactivate_expired(db: &Database, now: DateTime<Utc>) -> Result<usize, ParleyError> {
    let now = timestamp(now);
    let reason = TopicRetirement::Expired.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE topics SET is_active = 0, retired_reason = ?2
                 WHERE is_active = 1 AND expires_at <= ?1",
                params![now, reason],
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_topic(db: &Database, id: &TopicId) -> Result<Option<TopicRow>, ParleyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, owner, text, created_at, expires_at, is_active, retired_reason
                 FROM topics WHERE id = ?1",
                params![id],
                |row| {
                    Ok(TopicRow {
                        id: row.get(0)?,
                        owner: row.get(1)?,
                        text: row.get(2)?,
                        created_at: row.get(3)?,
                        expires_at: row.get(4)?,
                        is_active: row.get(5)?,
                        retired_reason: row.get(6)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
