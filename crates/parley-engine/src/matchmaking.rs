// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO pairing queue and the pairing protocol.
//!
//! `try_match` pops candidates from the head of `search:queue` and claims
//! one with a single guarded unit that re-validates both users. Two
//! concurrent scans can pop different candidates but never pair the same
//! user twice: whichever unit commits first flips the shared state cells,
//! and the other is refused.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use parley_core::keys;
use parley_core::{
    AtomicUnit, Dialog, DialogId, Guard, Op, ParleyError, RecordStore, StateStore, UserId,
    UserState,
};

use crate::dialogs::{formation_guards, formation_ops};
use crate::events::{EngineEvent, EventBus};
use crate::recording;
use crate::session::{SessionMachine, set_state, state_in, state_is};

/// Result of asking to enter the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The user is `SEARCHING` with exactly one queue entry.
    Queued,
    Banned,
    /// The user's state does not allow searching.
    Busy(UserState),
}

/// Result of one pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched { dialog_id: DialogId, partner: UserId },
    NoMatch,
}

/// Queue owner and pair former.
#[derive(Clone)]
pub struct Matchmaker {
    store: Arc<dyn StateStore>,
    records: Arc<dyn RecordStore>,
    sessions: SessionMachine,
    events: EventBus,
    inactivity: Duration,
}

impl Matchmaker {
    pub fn new(
        store: Arc<dyn StateStore>,
        records: Arc<dyn RecordStore>,
        sessions: SessionMachine,
        events: EventBus,
        inactivity: Duration,
    ) -> Self {
        Self {
            store,
            records,
            sessions,
            events,
            inactivity,
        }
    }

    /// Moves an idle-equivalent user into the queue.
    ///
    /// Idempotent for a user already `SEARCHING`: any earlier entry is
    /// replaced by one at the tail.
    pub async fn begin_search(&self, user: UserId) -> Result<SearchOutcome, ParleyError> {
        let entry = user.to_string();
        let mut eligible = UserState::SEARCH_ENTRY.to_vec();
        eligible.push(UserState::Searching);

        // A second attempt covers a lazily lifted ban between unit and snapshot.
        for _ in 0..2 {
            let unit = AtomicUnit::new()
                .guard(state_in(user, &eligible))
                .guard(Guard::absent(keys::ban(user)))
                .op(Op::ListRemove {
                    key: keys::SEARCH_QUEUE.to_string(),
                    value: entry.clone(),
                })
                .op(set_state(user, UserState::Searching))
                .op(Op::ListPushBack {
                    key: keys::SEARCH_QUEUE.to_string(),
                    value: entry.clone(),
                });
            if self.store.execute(unit).await? {
                recording::record_search_started();
                info!(%user, "search started");
                return Ok(SearchOutcome::Queued);
            }

            let record = self.sessions.snapshot(user).await?;
            if record.is_banned() || record.state == UserState::Banned {
                return Ok(SearchOutcome::Banned);
            }
            if !eligible.contains(&record.state) {
                return Ok(SearchOutcome::Busy(record.state));
            }
        }
        Ok(SearchOutcome::Busy(self.sessions.state(user).await?))
    }

    /// One pairing attempt on behalf of a `SEARCHING` user.
    pub async fn try_match(&self, user: UserId) -> Result<MatchOutcome, ParleyError> {
        if !self.can_pair(user).await? {
            return Ok(MatchOutcome::NoMatch);
        }

        let mut set_aside = Vec::new();
        let scan = self.scan(user, &mut set_aside).await;
        let requeue = self.requeue(&set_aside).await;
        let outcome = scan?;
        requeue?;

        if let MatchOutcome::Matched { dialog_id, partner } = &outcome {
            info!(%user, %partner, %dialog_id, "users paired");
        }
        Ok(outcome)
    }

    /// Pops candidates until one pairs or the queue runs dry. Entries that
    /// must go back to the queue are collected in `set_aside`, in pop order.
    async fn scan(
        &self,
        user: UserId,
        set_aside: &mut Vec<String>,
    ) -> Result<MatchOutcome, ParleyError> {
        let caller = user.to_string();
        let mut stale = 0u64;
        let outcome = loop {
            let Some(entry) = self.store.list_pop_front(keys::SEARCH_QUEUE).await? else {
                break MatchOutcome::NoMatch;
            };
            if entry == caller {
                set_aside.push(entry);
                continue;
            }
            let Ok(candidate) = entry.parse::<UserId>() else {
                warn!(%entry, "discarding malformed queue entry");
                stale += 1;
                continue;
            };

            // Until the candidate is judged, the entry is ours to restore.
            set_aside.push(entry);
            let record = self.sessions.snapshot(candidate).await?;
            if record.state != UserState::Searching || record.is_banned() {
                debug!(%candidate, state = %record.state, "discarding stale queue entry");
                set_aside.pop();
                stale += 1;
                continue;
            }

            let dialog = Dialog::open(
                user,
                candidate,
                None,
                Utc::now(),
                crate::chrono_span(self.inactivity),
            );
            let unit = AtomicUnit::new()
                .guard(state_is(user, UserState::Searching))
                .guard(state_is(candidate, UserState::Searching))
                .guards(formation_guards(user, candidate))
                .ops(formation_ops(&dialog));
            if self.store.execute(unit).await? {
                set_aside.pop();
                self.after_match(&dialog).await;
                break MatchOutcome::Matched {
                    dialog_id: dialog.dialog_id,
                    partner: candidate,
                };
            }

            // Refused on the caller's side: the candidate keeps its place.
            if !self.can_pair(user).await? {
                debug!(%user, "caller can no longer pair, stopping scan");
                break MatchOutcome::NoMatch;
            }
            set_aside.pop();
            stale += 1;
        };
        recording::record_stale_entries(stale);
        Ok(outcome)
    }

    /// Whether `user` may be paired right now: searching, not banned and
    /// not pointing at a dialog.
    async fn can_pair(&self, user: UserId) -> Result<bool, ParleyError> {
        let record = self.sessions.snapshot(user).await?;
        Ok(record.state == UserState::Searching
            && !record.is_banned()
            && record.current_dialog_id.is_none())
    }

    /// Restores set-aside entries to the head in their original order,
    /// skipping users that are no longer searching.
    async fn requeue(&self, set_aside: &[String]) -> Result<(), ParleyError> {
        for entry in set_aside.iter().rev() {
            let Ok(owner) = entry.parse::<UserId>() else {
                continue;
            };
            let unit = AtomicUnit::new()
                .guard(state_is(owner, UserState::Searching))
                .op(Op::ListRemove {
                    key: keys::SEARCH_QUEUE.to_string(),
                    value: entry.clone(),
                })
                .op(Op::ListPushFront {
                    key: keys::SEARCH_QUEUE.to_string(),
                    value: entry.clone(),
                });
            self.store.execute(unit).await?;
        }
        Ok(())
    }

    async fn after_match(&self, dialog: &Dialog) {
        recording::record_match("queue");
        if let Err(e) = self.records.record_dialog_started(dialog).await {
            warn!(dialog_id = %dialog.dialog_id, error = %e, "failed to mirror dialog start");
        }
        self.events.emit(EngineEvent::Matched {
            dialog_id: dialog.dialog_id.clone(),
            users: dialog.participants(),
            topic_id: None,
        });
    }

    /// Leaves the queue. The state is forced to `IDLE` unless the user is
    /// already in a dialog. Returns whether a queue entry was removed.
    pub async fn cancel_search(&self, user: UserId) -> Result<bool, ParleyError> {
        let removed = self
            .store
            .list_remove(keys::SEARCH_QUEUE, &user.to_string())
            .await?
            > 0;
        let leavable: Vec<UserState> = UserState::ALL
            .into_iter()
            .filter(|s| *s != UserState::InDialog)
            .collect();
        let unit = AtomicUnit::new()
            .guard(state_in(user, &leavable))
            .op(set_state(user, UserState::Idle));
        self.store.execute(unit).await?;
        debug!(%user, removed, "search cancelled");
        Ok(removed)
    }

    /// Timeout path: the entry always goes; the state reverts only if the
    /// user is still searching. Returns whether the state reverted.
    pub async fn expire_search(&self, user: UserId) -> Result<bool, ParleyError> {
        self.store
            .list_remove(keys::SEARCH_QUEUE, &user.to_string())
            .await?;
        let unit = AtomicUnit::new()
            .guard(state_is(user, UserState::Searching))
            .op(set_state(user, UserState::Idle));
        self.store.execute(unit).await
    }

    /// Queue contents, head first.
    pub async fn queue_snapshot(&self) -> Result<Vec<UserId>, ParleyError> {
        Ok(self
            .store
            .list_range(keys::SEARCH_QUEUE)
            .await?
            .iter()
            .filter_map(|entry| entry.parse().ok())
            .collect())
    }

    pub async fn queue_len(&self) -> Result<usize, ParleyError> {
        self.store.list_len(keys::SEARCH_QUEUE).await
    }
}
