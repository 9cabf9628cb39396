// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the state store, record store and engine.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Stable numeric identity of an anonymous user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

/// Opaque unique token naming one dialog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DialogId(pub String);

impl DialogId {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        DialogId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque unique token naming one topic advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicId(pub String);

impl TopicId {
    /// Generates a fresh random token.
    pub fn generate() -> Self {
        TopicId(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-user session state.
///
/// `DialogEnded`, `TopicCreated` and `BrowsingTopics` only exist so the
/// presentation layer can render the right menu; for pairing they behave
/// like `Idle`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserState {
    Idle,
    Searching,
    InDialog,
    DialogEnded,
    BrowsingTopics,
    TopicCreated,
    Banned,
}

impl UserState {
    /// Every state, in declaration order.
    pub const ALL: [UserState; 7] = [
        UserState::Idle,
        UserState::Searching,
        UserState::InDialog,
        UserState::DialogEnded,
        UserState::BrowsingTopics,
        UserState::TopicCreated,
        UserState::Banned,
    ];

    /// States from which a user may start searching.
    pub const SEARCH_ENTRY: [UserState; 4] = [
        UserState::Idle,
        UserState::DialogEnded,
        UserState::TopicCreated,
        UserState::BrowsingTopics,
    ];

    /// Informational states the presentation layer may set directly.
    pub const INFORMATIONAL: [UserState; 4] = [
        UserState::Idle,
        UserState::DialogEnded,
        UserState::BrowsingTopics,
        UserState::TopicCreated,
    ];

    /// Whether the state is operationally equivalent to `Idle`.
    pub fn is_idle_like(self) -> bool {
        matches!(
            self,
            UserState::Idle | UserState::DialogEnded | UserState::TopicCreated
        )
    }

    /// Only `Idle` and `Searching` users are polled by the matchmaker.
    pub fn is_poll_eligible(self) -> bool {
        matches!(self, UserState::Idle | UserState::Searching)
    }

    /// Stored string form of a set of states, for store guards.
    pub fn names(states: &[UserState]) -> Vec<String> {
        states.iter().map(|s| s.to_string()).collect()
    }
}

/// Why a dialog ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    EndedByUser,
    Report,
    Expired,
}

/// Why a topic left the active set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TopicRetirement {
    Deleted,
    Consumed,
    Expired,
}

/// Health status reported by backend health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is fully operational.
    Healthy,
    /// Backend is operational but experiencing issues.
    Degraded(String),
    /// Backend is not operational.
    Unhealthy(String),
}

/// Identifies the role a backend plays.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum BackendKind {
    StateStore,
    RecordStore,
}

/// Consolidated view of one user's live state, read in a single round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub state: UserState,
    pub current_dialog_id: Option<DialogId>,
    pub active_topic_id: Option<TopicId>,
    pub ban_until: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A user nobody has seen before.
    pub fn fresh(id: UserId) -> Self {
        Self {
            id,
            state: UserState::Idle,
            current_dialog_id: None,
            active_topic_id: None,
            ban_until: None,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.ban_until.is_some()
    }
}

/// One anonymous two-party conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub dialog_id: DialogId,
    pub user1: UserId,
    pub user2: UserId,
    pub topic_id: Option<TopicId>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_reason: Option<EndReason>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Dialog {
    /// Hash field holding the terminal reason; absent while the dialog is live.
    pub const ENDED_REASON_FIELD: &'static str = "ended_reason";
    pub const ENDED_AT_FIELD: &'static str = "ended_at";
    pub const EXPIRES_AT_FIELD: &'static str = "expires_at";

    /// A new live dialog between two users.
    pub fn open(
        user1: UserId,
        user2: UserId,
        topic_id: Option<TopicId>,
        now: DateTime<Utc>,
        inactivity: chrono::Duration,
    ) -> Self {
        // Stored timestamps have second precision.
        let now = now.trunc_subsecs(0);
        Self {
            dialog_id: DialogId::generate(),
            user1,
            user2,
            topic_id,
            started_at: now,
            expires_at: now + inactivity,
            ended_reason: None,
            ended_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.ended_reason.is_none()
    }

    /// The participant that is not `user`, if `user` takes part at all.
    pub fn partner_of(&self, user: UserId) -> Option<UserId> {
        if self.user1 == user {
            Some(self.user2)
        } else if self.user2 == user {
            Some(self.user1)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.user1, self.user2]
    }

    /// Encodes the record as store hash fields. Unset options are omitted.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("dialog_id".to_string(), self.dialog_id.0.clone()),
            ("user1".to_string(), self.user1.to_string()),
            ("user2".to_string(), self.user2.to_string()),
            ("started_at".to_string(), self.started_at.timestamp().to_string()),
            (
                Self::EXPIRES_AT_FIELD.to_string(),
                self.expires_at.timestamp().to_string(),
            ),
        ];
        if let Some(topic) = &self.topic_id {
            fields.push(("topic_id".to_string(), topic.0.clone()));
        }
        if let Some(reason) = self.ended_reason {
            fields.push((Self::ENDED_REASON_FIELD.to_string(), reason.to_string()));
        }
        if let Some(ended_at) = self.ended_at {
            fields.push((Self::ENDED_AT_FIELD.to_string(), ended_at.timestamp().to_string()));
        }
        fields
    }

    /// Decodes a record read from the store hash at `key`.
    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> Result<Self, ParleyError> {
        let reader = FieldReader { key, fields };
        Ok(Self {
            dialog_id: DialogId(reader.required("dialog_id")?.to_string()),
            user1: reader.parse("user1")?,
            user2: reader.parse("user2")?,
            topic_id: reader.optional("topic_id").map(|t| TopicId(t.to_string())),
            started_at: reader.timestamp("started_at")?,
            expires_at: reader.timestamp(Self::EXPIRES_AT_FIELD)?,
            ended_reason: reader.optional_parse(Self::ENDED_REASON_FIELD)?,
            ended_at: reader.optional_timestamp(Self::ENDED_AT_FIELD)?,
        })
    }
}

/// A user-authored advertisement used for directed pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub topic_id: TopicId,
    pub owner: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    pub view_count: i64,
}

impl Topic {
    pub const VIEW_COUNT_FIELD: &'static str = "view_count";

    pub fn open(owner: UserId, text: String, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        let now = now.trunc_subsecs(0);
        Self {
            topic_id: TopicId::generate(),
            owner,
            text,
            created_at: now,
            expires_at: now + ttl,
            active: true,
            view_count: 0,
        }
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("topic_id".to_string(), self.topic_id.0.clone()),
            ("owner".to_string(), self.owner.to_string()),
            ("text".to_string(), self.text.clone()),
            ("created_at".to_string(), self.created_at.timestamp().to_string()),
            ("expires_at".to_string(), self.expires_at.timestamp().to_string()),
            ("active".to_string(), if self.active { "1" } else { "0" }.to_string()),
            (Self::VIEW_COUNT_FIELD.to_string(), self.view_count.to_string()),
        ]
    }

    pub fn from_fields(key: &str, fields: &HashMap<String, String>) -> Result<Self, ParleyError> {
        let reader = FieldReader { key, fields };
        Ok(Self {
            topic_id: TopicId(reader.required("topic_id")?.to_string()),
            owner: reader.parse("owner")?,
            text: reader.required("text")?.to_string(),
            created_at: reader.timestamp("created_at")?,
            expires_at: reader.timestamp("expires_at")?,
            active: reader.optional("active").is_none_or(|v| v == "1"),
            view_count: reader.optional_parse(Self::VIEW_COUNT_FIELD)?.unwrap_or(0),
        })
    }
}

/// An abuse report filed by one dialog participant against the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub from: UserId,
    pub target: UserId,
    pub dialog_id: DialogId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

struct FieldReader<'a> {
    key: &'a str,
    fields: &'a HashMap<String, String>,
}

impl FieldReader<'_> {
    fn corrupt(&self, detail: String) -> ParleyError {
        ParleyError::Corrupt {
            key: self.key.to_string(),
            detail,
        }
    }

    fn optional(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    fn required(&self, field: &str) -> Result<&str, ParleyError> {
        self.optional(field)
            .ok_or_else(|| self.corrupt(format!("missing field {field}")))
    }

    fn parse<T: FromStr>(&self, field: &str) -> Result<T, ParleyError> {
        let raw = self.required(field)?;
        raw.parse()
            .map_err(|_| self.corrupt(format!("invalid {field}: {raw}")))
    }

    fn optional_parse<T: FromStr>(&self, field: &str) -> Result<Option<T>, ParleyError> {
        match self.optional(field) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| self.corrupt(format!("invalid {field}: {raw}"))),
        }
    }

    fn timestamp(&self, field: &str) -> Result<DateTime<Utc>, ParleyError> {
        let secs: i64 = self.parse(field)?;
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| self.corrupt(format!("{field} out of range: {secs}")))
    }

    fn optional_timestamp(&self, field: &str) -> Result<Option<DateTime<Utc>>, ParleyError> {
        match self.optional_parse::<i64>(field)? {
            None => Ok(None),
            Some(secs) => DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| self.corrupt(format!("{field} out of range: {secs}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn user_state_uses_screaming_snake_case() {
        assert_eq!(UserState::InDialog.to_string(), "IN_DIALOG");
        assert_eq!(UserState::from_str("TOPIC_CREATED").unwrap(), UserState::TopicCreated);
        for state in UserState::ALL {
            assert_eq!(UserState::from_str(&state.to_string()).unwrap(), state);
        }
    }

    #[test]
    fn idle_like_states() {
        assert!(UserState::Idle.is_idle_like());
        assert!(UserState::DialogEnded.is_idle_like());
        assert!(UserState::TopicCreated.is_idle_like());
        assert!(!UserState::Searching.is_idle_like());
        assert!(!UserState::Banned.is_idle_like());
        assert!(UserState::Searching.is_poll_eligible());
        assert!(!UserState::TopicCreated.is_poll_eligible());
    }

    #[test]
    fn end_reason_strings() {
        assert_eq!(EndReason::EndedByUser.to_string(), "ended_by_user");
        assert_eq!(EndReason::from_str("report").unwrap(), EndReason::Report);
        assert_eq!(EndReason::Expired.to_string(), "expired");
    }

    #[test]
    fn live_dialog_omits_terminal_fields() {
        let dialog = Dialog::open(UserId(1), UserId(2), None, at(1_000), chrono::Duration::seconds(60));
        let fields: HashMap<_, _> = dialog.to_fields().into_iter().collect();
        assert!(!fields.contains_key(Dialog::ENDED_REASON_FIELD));
        assert!(!fields.contains_key("topic_id"));
        assert_eq!(fields["expires_at"], "1060");

        let decoded = Dialog::from_fields("dialog:x", &fields).unwrap();
        assert_eq!(decoded, dialog);
        assert!(decoded.is_live());
    }

    #[test]
    fn ended_dialog_decodes_reason() {
        let mut dialog = Dialog::open(
            UserId(1),
            UserId(2),
            Some(TopicId("t".into())),
            at(10),
            chrono::Duration::seconds(5),
        );
        dialog.ended_reason = Some(EndReason::Report);
        dialog.ended_at = Some(at(12));
        let fields: HashMap<_, _> = dialog.to_fields().into_iter().collect();
        let decoded = Dialog::from_fields("dialog:x", &fields).unwrap();
        assert_eq!(decoded.ended_reason, Some(EndReason::Report));
        assert_eq!(decoded.topic_id, Some(TopicId("t".into())));
        assert!(!decoded.is_live());
    }

    #[test]
    fn partner_of_resolves_either_side() {
        let dialog = Dialog::open(UserId(7), UserId(9), None, at(0), chrono::Duration::seconds(1));
        assert_eq!(dialog.partner_of(UserId(7)), Some(UserId(9)));
        assert_eq!(dialog.partner_of(UserId(9)), Some(UserId(7)));
        assert_eq!(dialog.partner_of(UserId(8)), None);
    }

    #[test]
    fn corrupt_dialog_is_reported_with_key() {
        let mut fields = HashMap::new();
        fields.insert("dialog_id".to_string(), "d".to_string());
        fields.insert("user1".to_string(), "abc".to_string());
        let err = Dialog::from_fields("dialog:d", &fields).unwrap_err();
        assert!(matches!(err, ParleyError::Corrupt { ref key, .. } if key == "dialog:d"));
    }

    #[test]
    fn topic_view_count_defaults_to_zero() {
        let topic = Topic::open(UserId(3), "rust".into(), at(0), chrono::Duration::seconds(30));
        let mut fields: HashMap<_, _> = topic.to_fields().into_iter().collect();
        fields.remove(Topic::VIEW_COUNT_FIELD);
        let decoded = Topic::from_fields("topic:x", &fields).unwrap();
        assert_eq!(decoded.view_count, 0);
        assert_eq!(decoded.owner, UserId(3));
        assert!(decoded.active);
    }
}
