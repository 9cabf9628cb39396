// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user session state machine.
//!
//! Every mutation is a guarded [`AtomicUnit`]: a transition whose source
//! state no longer holds is refused by the store and reported as "nothing
//! to do" rather than as an error. `BANNED` is left only once the ban flag
//! has expired, which is noticed lazily on read.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use parley_core::keys;
use parley_core::{
    AtomicUnit, DialogId, Guard, Op, ParleyError, RecordStore, StateStore, TopicId, UserId,
    UserRecord, UserState,
};

use crate::chrono_span;

/// Reads and transitions user state.
#[derive(Clone)]
pub struct SessionMachine {
    store: Arc<dyn StateStore>,
    records: Arc<dyn RecordStore>,
}

impl SessionMachine {
    pub fn new(store: Arc<dyn StateStore>, records: Arc<dyn RecordStore>) -> Self {
        Self { store, records }
    }

    /// Current state, lifting an expired ban.
    pub async fn state(&self, user: UserId) -> Result<UserState, ParleyError> {
        let state = self.stored_state(user).await?;
        if state == UserState::Banned && !self.is_banned(user).await? {
            return self.lift_expired_ban(user).await;
        }
        Ok(state)
    }

    /// Full record of the user from a single multi-key read.
    pub async fn snapshot(&self, user: UserId) -> Result<UserRecord, ParleyError> {
        let state_key = keys::user_state(user);
        let ban_key = keys::ban(user);
        let request = [
            state_key.clone(),
            keys::user_dialog(user),
            keys::user_topic(user),
            ban_key.clone(),
        ];
        let values = self.store.get_many(&request).await?;
        let [state, dialog, topic, ban]: [Option<String>; 4] =
            values.try_into().map_err(|values: Vec<Option<String>>| {
                ParleyError::Internal(format!(
                    "state store returned {} values for 4 keys",
                    values.len()
                ))
            })?;

        let mut record = UserRecord {
            id: user,
            state: parse_state(&state_key, state.as_deref())?,
            current_dialog_id: dialog.map(DialogId),
            active_topic_id: topic.map(TopicId),
            ban_until: parse_ban(&ban_key, ban.as_deref())?,
        };
        if record.state == UserState::Banned && record.ban_until.is_none() {
            record.state = self.lift_expired_ban(user).await?;
        }
        Ok(record)
    }

    /// Entry point when a user reappears.
    ///
    /// Mirrors last-seen to the record store and parks an idle user that
    /// carries a live ban in `BANNED`.
    pub async fn check_in(&self, user: UserId) -> Result<UserRecord, ParleyError> {
        if let Err(e) = self.records.record_user_seen(user, Utc::now()).await {
            warn!(%user, error = %e, "failed to mirror last-seen");
        }

        let mut record = self.snapshot(user).await?;
        if record.is_banned() && UserState::INFORMATIONAL.contains(&record.state) {
            let unit = AtomicUnit::new()
                .guard(state_in(user, &UserState::INFORMATIONAL))
                .guard(Guard::exists(keys::ban(user)))
                .op(set_state(user, UserState::Banned));
            if self.store.execute(unit).await? {
                debug!(%user, "banned user parked");
                record.state = UserState::Banned;
            }
        }
        Ok(record)
    }

    /// Guarded informational transition requested by the presentation layer.
    ///
    /// Only moves between `IDLE`, `DIALOG_ENDED`, `BROWSING_TOPICS` and
    /// `TOPIC_CREATED`. Returns whether it applied.
    pub async fn transition(
        &self,
        user: UserId,
        from: UserState,
        to: UserState,
    ) -> Result<bool, ParleyError> {
        if !UserState::INFORMATIONAL.contains(&from) || !UserState::INFORMATIONAL.contains(&to) {
            debug!(%user, %from, %to, "transition outside informational states ignored");
            return Ok(false);
        }
        let unit = AtomicUnit::new()
            .guard(state_is(user, from))
            .op(set_state(user, to));
        self.store.execute(unit).await
    }

    /// `BROWSING_TOPICS` back to `TOPIC_CREATED` if the user still owns a
    /// topic, else `IDLE`. Returns the resulting state.
    pub async fn leave_browsing(&self, user: UserId) -> Result<UserState, ParleyError> {
        let topic_key = keys::user_topic(user);

        let with_topic = AtomicUnit::new()
            .guard(state_is(user, UserState::BrowsingTopics))
            .guard(Guard::exists(&topic_key))
            .op(set_state(user, UserState::TopicCreated));
        if self.store.execute(with_topic).await? {
            return Ok(UserState::TopicCreated);
        }

        let without_topic = AtomicUnit::new()
            .guard(state_is(user, UserState::BrowsingTopics))
            .guard(Guard::absent(&topic_key))
            .op(set_state(user, UserState::Idle));
        if self.store.execute(without_topic).await? {
            return Ok(UserState::Idle);
        }
        self.state(user).await
    }

    /// Sets the ban flag for `duration`; returns when it lapses.
    pub async fn ban(&self, user: UserId, duration: Duration) -> Result<DateTime<Utc>, ParleyError> {
        let until = Utc::now() + chrono_span(duration);
        self.store
            .set(&keys::ban(user), &until.timestamp().to_string(), Some(duration))
            .await?;
        info!(%user, %until, "user banned");
        Ok(until)
    }

    pub async fn is_banned(&self, user: UserId) -> Result<bool, ParleyError> {
        self.store.exists(&keys::ban(user)).await
    }

    pub async fn ban_until(&self, user: UserId) -> Result<Option<DateTime<Utc>>, ParleyError> {
        let key = keys::ban(user);
        let raw = self.store.get(&key).await?;
        parse_ban(&key, raw.as_deref())
    }

    /// Claims the cooldown window. `true` means the action may proceed.
    pub async fn throttle(&self, user: UserId, window: Duration) -> Result<bool, ParleyError> {
        let key = keys::cooldown(user);
        let unit = AtomicUnit::new()
            .guard(Guard::absent(&key))
            .op(Op::set_with_ttl(&key, "1", window));
        self.store.execute(unit).await
    }

    async fn stored_state(&self, user: UserId) -> Result<UserState, ParleyError> {
        let key = keys::user_state(user);
        let raw = self.store.get(&key).await?;
        parse_state(&key, raw.as_deref())
    }

    async fn lift_expired_ban(&self, user: UserId) -> Result<UserState, ParleyError> {
        let unit = AtomicUnit::new()
            .guard(state_is(user, UserState::Banned))
            .guard(Guard::absent(keys::ban(user)))
            .op(set_state(user, UserState::Idle));
        if self.store.execute(unit).await? {
            info!(%user, "ban expired, user back to idle");
            return Ok(UserState::Idle);
        }
        self.stored_state(user).await
    }
}

/// Guard: the user's state is one of `states`. A missing state reads as `IDLE`.
pub(crate) fn state_in(user: UserId, states: &[UserState]) -> Guard {
    let idle = UserState::Idle.to_string();
    Guard::value_in(keys::user_state(user), UserState::names(states), Some(idle.as_str()))
}

pub(crate) fn state_is(user: UserId, state: UserState) -> Guard {
    state_in(user, &[state])
}

pub(crate) fn set_state(user: UserId, state: UserState) -> Op {
    Op::set(keys::user_state(user), state.to_string())
}

/// A missing state reads as `IDLE`.
pub(crate) fn parse_state(key: &str, raw: Option<&str>) -> Result<UserState, ParleyError> {
    match raw {
        None => Ok(UserState::Idle),
        Some(raw) => UserState::from_str(raw).map_err(|_| ParleyError::Corrupt {
            key: key.to_string(),
            detail: format!("unknown state {raw}"),
        }),
    }
}

fn parse_ban(key: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ParleyError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(Some)
        .ok_or_else(|| ParleyError::Corrupt {
            key: key.to_string(),
            detail: format!("invalid ban timestamp {raw}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_state::MemoryStore;
    use parley_storage::{MemoryRecords, RecordEvent};

    fn machine() -> (SessionMachine, Arc<MemoryStore>, Arc<MemoryRecords>) {
        let store = Arc::new(MemoryStore::new());
        let records = Arc::new(MemoryRecords::new());
        (
            SessionMachine::new(store.clone(), records.clone()),
            store,
            records,
        )
    }

    #[tokio::test]
    async fn unknown_user_is_idle() {
        let (sessions, _, _) = machine();
        let record = sessions.snapshot(UserId(1)).await.unwrap();
        assert_eq!(record, UserRecord::fresh(UserId(1)));
    }

    #[tokio::test]
    async fn garbage_state_is_corrupt() {
        let (sessions, store, _) = machine();
        store.set("user:1:state", "DANCING", None).await.unwrap();
        let err = sessions.state(UserId(1)).await.unwrap_err();
        assert!(matches!(err, ParleyError::Corrupt { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn banned_state_decays_once_flag_expires() {
        let (sessions, _, _) = machine();
        let user = UserId(5);
        sessions.ban(user, Duration::from_secs(60)).await.unwrap();

        let record = sessions.check_in(user).await.unwrap();
        assert_eq!(record.state, UserState::Banned);
        assert!(record.ban_until.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(sessions.state(user).await.unwrap(), UserState::Idle);
        assert!(!sessions.is_banned(user).await.unwrap());
    }

    #[tokio::test]
    async fn check_in_mirrors_last_seen() {
        let (sessions, _, records) = machine();
        sessions.check_in(UserId(9)).await.unwrap();
        assert_eq!(records.events(), vec![RecordEvent::UserSeen(UserId(9))]);
    }

    #[tokio::test]
    async fn check_in_survives_record_store_outage() {
        let (sessions, _, records) = machine();
        records.set_failing(true);
        let record = sessions.check_in(UserId(9)).await.unwrap();
        assert_eq!(record.state, UserState::Idle);
    }

    #[tokio::test]
    async fn informational_transitions_are_guarded() {
        let (sessions, _, _) = machine();
        let user = UserId(2);
        assert!(
            sessions
                .transition(user, UserState::Idle, UserState::DialogEnded)
                .await
                .unwrap()
        );
        // Source no longer holds.
        assert!(
            !sessions
                .transition(user, UserState::Idle, UserState::BrowsingTopics)
                .await
                .unwrap()
        );
        // Targets outside the informational set are refused outright.
        assert!(
            !sessions
                .transition(user, UserState::DialogEnded, UserState::Searching)
                .await
                .unwrap()
        );
        assert_eq!(sessions.state(user).await.unwrap(), UserState::DialogEnded);
    }

    #[tokio::test]
    async fn leave_browsing_restores_topic_owner() {
        let (sessions, store, _) = machine();
        let user = UserId(3);
        store
            .set("user:3:state", "BROWSING_TOPICS", None)
            .await
            .unwrap();
        store.set("user:3:topic_id", "t1", None).await.unwrap();
        assert_eq!(
            sessions.leave_browsing(user).await.unwrap(),
            UserState::TopicCreated
        );

        store
            .set("user:3:state", "BROWSING_TOPICS", None)
            .await
            .unwrap();
        store.delete("user:3:topic_id").await.unwrap();
        assert_eq!(sessions.leave_browsing(user).await.unwrap(), UserState::Idle);

        // Not browsing: nothing changes.
        store.set("user:3:state", "SEARCHING", None).await.unwrap();
        assert_eq!(
            sessions.leave_browsing(user).await.unwrap(),
            UserState::Searching
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_claims_window_once() {
        let (sessions, _, _) = machine();
        let user = UserId(4);
        let window = Duration::from_secs(1);
        assert!(sessions.throttle(user, window).await.unwrap());
        assert!(!sessions.throttle(user, window).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(sessions.throttle(user, window).await.unwrap());
    }

    #[tokio::test]
    async fn ban_until_round_trips_through_flag() {
        let (sessions, _, _) = machine();
        let until = sessions.ban(UserId(8), Duration::from_secs(3600)).await.unwrap();
        assert_eq!(
            sessions.ban_until(UserId(8)).await.unwrap(),
            Some(DateTime::from_timestamp(until.timestamp(), 0).unwrap())
        );
        assert_eq!(sessions.ban_until(UserId(99)).await.unwrap(), None);
    }
}
