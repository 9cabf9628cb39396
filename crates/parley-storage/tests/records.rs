// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SqliteRecords through the RecordStore trait.

use chrono::Utc;
use parley_config::model::StorageConfig;
use parley_core::{
    Backend, Dialog, DialogId, EndReason, HealthStatus, RecordStore, ReportRecord, Topic,
    TopicRetirement, UserId,
};
use parley_storage::{queries, SqliteRecords};

fn config(dir: &tempfile::TempDir) -> StorageConfig {
    StorageConfig {
        database_path: dir.path().join("parley.db").display().to_string(),
        wal_mode: true,
    }
}

#[tokio::test]
async fn uninitialized_store_reports_unhealthy() {
    let dir = tempfile::tempdir().unwrap();
    let records = SqliteRecords::new(config(&dir));
    assert!(matches!(
        records.health_check().await.unwrap(),
        HealthStatus::Unhealthy(_)
    ));
    let err = records.record_user_seen(UserId(1), Utc::now()).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn double_initialize_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let records = SqliteRecords::new(config(&dir));
    records.initialize().await.unwrap();
    assert!(records.initialize().await.is_err());
}

#[tokio::test]
async fn full_dialog_lifecycle_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let records = SqliteRecords::new(config(&dir));
    records.initialize().await.unwrap();
    assert_eq!(records.health_check().await.unwrap(), HealthStatus::Healthy);

    let now = Utc::now();
    let topic = Topic::open(UserId(2), "late night talk".into(), now, chrono::Duration::hours(1));
    records.record_topic_created(&topic).await.unwrap();

    let dialog = Dialog::open(
        UserId(1),
        UserId(2),
        Some(topic.topic_id.clone()),
        now,
        chrono::Duration::minutes(30),
    );
    records.record_dialog_started(&dialog).await.unwrap();
    records
        .record_topic_retired(&topic.topic_id, TopicRetirement::Consumed)
        .await
        .unwrap();
    records
        .record_report(&ReportRecord {
            from: UserId(1),
            target: UserId(2),
            dialog_id: dialog.dialog_id.clone(),
            reason: "spam".into(),
            created_at: now,
        })
        .await
        .unwrap();
    records
        .record_ban(UserId(2), now + chrono::Duration::hours(1))
        .await
        .unwrap();
    records
        .record_dialog_ended(&dialog.dialog_id, EndReason::Report, now)
        .await
        .unwrap();
    // closing an unknown dialog is tolerated
    records
        .record_dialog_ended(&DialogId("missing".into()), EndReason::Expired, now)
        .await
        .unwrap();

    let db = records.database().unwrap();
    let row = queries::dialogs::get_dialog(db, &dialog.dialog_id).await.unwrap().unwrap();
    assert_eq!(row.ended_reason.as_deref(), Some("report"));
    let topic_row = queries::topics::get_topic(db, &topic.topic_id).await.unwrap().unwrap();
    assert_eq!(topic_row.retired_reason.as_deref(), Some("consumed"));
    assert_eq!(queries::reports::reports_against(db, UserId(2)).await.unwrap().len(), 1);
    assert!(queries::users::get_user(db, UserId(2)).await.unwrap().unwrap().ban_until.is_some());

    records.shutdown().await.unwrap();
}
