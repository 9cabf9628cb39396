// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types read back from the record database.
//!
//! Timestamps stay as the RFC 3339 text they are stored as.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: i64,
    pub created_at: String,
    pub last_seen_at: String,
    pub ban_until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRow {
    pub id: String,
    pub user1: i64,
    pub user2: i64,
    pub topic_id: Option<String>,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub ended_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRow {
    pub id: String,
    pub owner: i64,
    pub text: String,
    pub created_at: String,
    pub expires_at: String,
    pub is_active: bool,
    pub retired_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub id: i64,
    pub from_id: i64,
    pub target_id: i64,
    pub dialog_id: String,
    pub reason: String,
    pub created_at: String,
}

/// Canonical text form of a timestamp in the record database.
pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
