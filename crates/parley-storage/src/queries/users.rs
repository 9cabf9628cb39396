// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Last-seen and ban bookkeeping per user.

use chrono::{DateTime, Utc};
use parley_core::{ParleyError, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{timestamp, UserRow};

/// Insert the user on first sight, otherwise bump `last_seen_at`.
pub async fn touch_user(db: &Database, user: UserId, at: DateTime<Utc>) -> Result<(), ParleyError> {
    let at = timestamp(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, created_at, last_seen_at) VALUES (?1, ?2, ?2)
                 ON CONFLICT(id) DO UPDATE SET last_seen_at = excluded.last_seen_at",
                params![user.0, at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a ban, creating the user row if needed.
pub async fn set_ban(db: &Database, user: UserId, until: DateTime<Utc>) -> Result<(), ParleyError> {
    let until = timestamp(until);
    let now = timestamp(Utc::now());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, created_at, last_seen_at, ban_until) VALUES (?1, ?2, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET ban_until = excluded.ban_until",
                params![user.0, now, until],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_user(db: &Database, user: UserId) -> Result<Option<UserRow>, ParleyError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, created_at, last_seen_at, ban_until FROM users WHERE id = ?1",
                params![user.0],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        last_seen_at: row.get(2)?,
                        ban_until: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap(), true)
            .await
            .unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn touch_keeps_created_at() {
        let (_dir, db) = db().await;
        let first = DateTime::from_timestamp(1_000, 0).unwrap();
        let later = DateTime::from_timestamp(2_000, 0).unwrap();
        touch_user(&db, UserId(5), first).await.unwrap();
        touch_user(&db, UserId(5), later).await.unwrap();

        let row = get_user(&db, UserId(5)).await.unwrap().unwrap();
        assert_eq!(row.created_at, timestamp(first));
        assert_eq!(row.last_seen_at, timestamp(later));
        assert_eq!(row.ban_until, None);
    }

    #[tokio::test]
    async fn ban_creates_missing_user() {
        let (_dir, db) = db().await;
        let until = DateTime::from_timestamp(9_000, 0).unwrap();
        set_ban(&db, UserId(8), until).await.unwrap();
        let row = get_user(&db, UserId(8)).await.unwrap().unwrap();
        assert_eq!(row.ban_until, Some(timestamp(until)));
        assert!(get_user(&db, UserId(9)).await.unwrap().is_none());
    }
}
