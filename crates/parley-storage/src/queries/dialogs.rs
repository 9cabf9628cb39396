// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialog start/end records.

use chrono::{DateTime, Utc};
use parley_core::{Dialog, DialogId, EndReason, ParleyError};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{timestamp, DialogRow};

/// Record a dialog start. Replays of the same dialog are ignored.
pub async fn insert_dialog(db: &Database, dialog: &Dialog) -> Result<(), ParleyError> {
    let id = dialog.dialog_id.0.clone();
    let (user1, user2) = (dialog.user1.0, dialog.user2.0);
    let topic_id = dialog.topic_id.as_ref().map(|t| t.0.clone());
    let started_at = timestamp(dialog.started_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO dialogs (id, user1, user2, topic_id, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, user1, user2, topic_id, started_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp the end of a dialog. Returns false when the dialog is unknown or
/// already closed.
pub async fn close_dialog(
    db: &Database,
    id: &DialogId,
    reason: EndReason,
    at: DateTime<Utc>,
) -> Result<bool, ParleyError> {
    let id = id.0.clone();
    let reason = reason.to_string();
    let at = timestamp(at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE dialogs SET ended_at = ?2, ended_reason = ?3
                 WHERE id = ?1 AND ended_at IS NULL",
                params![id, at, reason],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_dialog(db: &Database, id: &DialogId) -> Result<Option<DialogRow>, ParleyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, user1, user2, topic_id, started_at, ended_at, ended_reason
                 FROM dialogs WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DialogRow {
                        id: row.get(0)?,
                        user1: row.get(1)?,
                        user2: row.get(2)?,
                        topic_id: row.get(3)?,
                        started_at: row.get(4)?,
                        ended_at: row.get(5)?,
                        ended_reason: row.get(6)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Total recorded dialogs and how many of them never got an end record.
pub async fn count_dialogs(db: &Database) -> Result<(u64, u64), ParleyError> {
    db.connection()
        .call(|conn| {
            conn.query_row(
                "SELECT COUNT(*), COUNT(*) FILTER (WHERE ended_at IS NULL) FROM dialogs",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{TopicId, UserId};

    #[tokio::test]
    async fn dialog_closes_once() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("d.db").to_str().unwrap(), true)
            .await
            .unwrap();
        let now = DateTime::from_timestamp(100, 0).unwrap();
        let dialog = Dialog::open(
            UserId(1),
            UserId(2),
            Some(TopicId("t".into())),
            now,
            chrono::Duration::seconds(30),
        );

        insert_dialog(&db, &dialog).await.unwrap();
        insert_dialog(&db, &dialog).await.unwrap();
        assert_eq!(count_dialogs(&db).await.unwrap(), (1, 1));

        assert!(close_dialog(&db, &dialog.dialog_id, EndReason::Report, now).await.unwrap());
        assert!(!close_dialog(&db, &dialog.dialog_id, EndReason::Expired, now).await.unwrap());

        let row = get_dialog(&db, &dialog.dialog_id).await.unwrap().unwrap();
        assert_eq!(row.ended_reason.as_deref(), Some("report"));
        assert_eq!(row.topic_id.as_deref(), Some("t"));
        assert_eq!(count_dialogs(&db).await.unwrap(), (1, 0));
    }
}
