// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Abuse reports.

use parley_core::{ParleyError, ReportRecord, UserId};
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{timestamp, ReportRow};

/// Append a report. Returns its row id.
pub async fn insert_report(db: &Database, report: &ReportRecord) -> Result<i64, ParleyError> {
    let from = report.from.0;
    let target = report.target.0;
    let dialog_id = report.dialog_id.0.clone();
    let reason = report.reason.clone();
    let created_at = timestamp(report.created_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO reports (from_id, target_id, dialog_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![from, target, dialog_id, reason, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Reports filed against `target`, oldest first.
pub async fn reports_against(db: &Database, target: UserId) -> Result<Vec<ReportRow>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, from_id, target_id, dialog_id, reason, created_at
                 FROM reports WHERE target_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![target.0], |row| {
                    Ok(ReportRow {
                        id: row.get(0)?,
                        from_id: row.get(1)?,
                        target_id: row.get(2)?,
                        dialog_id: row.get(3)?,
                        reason: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::DialogId;

    #[tokio::test]
    async fn reports_listed_per_target() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("r.db").to_str().unwrap(), true)
            .await
            .unwrap();
        let report = |from, target, reason: &str| ReportRecord {
            from: UserId(from),
            target: UserId(target),
            dialog_id: DialogId("d1".into()),
            reason: reason.to_string(),
            created_at: chrono::Utc::now(),
        };
        let first = insert_report(&db, &report(1, 2, "spam")).await.unwrap();
        let second = insert_report(&db, &report(3, 2, "abuse")).await.unwrap();
        insert_report(&db, &report(2, 1, "spam")).await.unwrap();
        assert!(second > first);

        let rows = reports_against(&db, UserId(2)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reason, "spam");
        assert_eq!(rows[1].from_id, 3);
    }
}
