// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user search timer task.
//!
//! While a user is `SEARCHING`, a task polls `try_match` on a fixed
//! interval until a partner is found, the user leaves the search, or the
//! deadline passes. The task always leaves the queue clean: a timeout
//! removes the entry unconditionally and cancellation removes it too.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{DialogId, ParleyError, UserId, UserState};

use crate::dialogs::DialogManager;
use crate::events::{EngineEvent, EventBus};
use crate::matchmaking::{MatchOutcome, Matchmaker};
use crate::recording;
use crate::session::SessionMachine;

/// How a search task finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchResult {
    Matched { dialog_id: DialogId, partner: UserId },
    /// The user left `SEARCHING`, or the search was cancelled.
    Cancelled,
    TimedOut,
    /// A newer search for the same user took over; state was left alone.
    Superseded,
}

/// Caller-side handle of a running search task.
#[derive(Debug)]
pub struct SearchHandle {
    user: UserId,
    cancel: CancellationToken,
    task: JoinHandle<SearchResult>,
}

impl SearchHandle {
    pub fn user(&self) -> UserId {
        self.user
    }

    /// Stops the search and takes the user out of the queue.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the task to finish.
    pub async fn join(self) -> Result<SearchResult, ParleyError> {
        self.task
            .await
            .map_err(|e| ParleyError::Internal(format!("search task failed: {e}")))
    }
}

struct SearchSlot {
    generation: u64,
    stop: CancellationToken,
}

/// Spawns search tasks and keeps at most one running per user.
#[derive(Clone)]
pub(crate) struct SearchTasks {
    matchmaker: Matchmaker,
    sessions: SessionMachine,
    dialogs: DialogManager,
    events: EventBus,
    timeout: Duration,
    poll_interval: Duration,
    running: Arc<DashMap<UserId, SearchSlot>>,
    generations: Arc<AtomicU64>,
}

impl SearchTasks {
    pub(crate) fn new(
        matchmaker: Matchmaker,
        sessions: SessionMachine,
        dialogs: DialogManager,
        events: EventBus,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            matchmaker,
            sessions,
            dialogs,
            events,
            timeout,
            poll_interval,
            running: Arc::new(DashMap::new()),
            generations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts the timer task for `user`, superseding any task already running.
    pub(crate) fn spawn(&self, user: UserId) -> SearchHandle {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let stop = CancellationToken::new();

        let slot = SearchSlot {
            generation,
            stop: stop.clone(),
        };
        if let Some(previous) = self.running.insert(user, slot) {
            debug!(%user, "superseding running search");
            previous.stop.cancel();
        }

        let tasks = self.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let result = tasks.run(user, task_cancel, stop).await;
            tasks
                .running
                .remove_if(&user, |_, slot| slot.generation == generation);
            result
        });

        SearchHandle { user, cancel, task }
    }

    /// Ends the running task without touching the user's state.
    pub(crate) fn stop(&self, user: UserId) -> bool {
        match self.running.remove(&user) {
            Some((_, slot)) => {
                slot.stop.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn stop_all(&self) {
        self.running.retain(|_, slot| {
            slot.stop.cancel();
            false
        });
    }

    pub(crate) fn running(&self) -> usize {
        self.running.len()
    }

    async fn run(
        &self,
        user: UserId,
        cancel: CancellationToken,
        stop: CancellationToken,
    ) -> SearchResult {
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!(%user, "search task superseded");
                    return SearchResult::Superseded;
                }
                _ = cancel.cancelled() => {
                    if let Err(e) = self.matchmaker.cancel_search(user).await {
                        warn!(%user, error = %e, "failed to leave queue on cancel");
                    }
                    return SearchResult::Cancelled;
                }
                _ = &mut deadline => {
                    return self.time_out(user).await;
                }
                _ = ticker.tick() => {
                    match self.poll(user).await {
                        Ok(Some(result)) => {
                            if matches!(result, SearchResult::Matched { .. }) {
                                recording::record_search_wait(started.elapsed().as_secs_f64());
                            }
                            return result;
                        }
                        Ok(None) => {}
                        Err(e) => warn!(%user, error = %e, "search poll failed, retrying"),
                    }
                }
            }
        }
    }

    /// One tick: finished if someone else paired the user, or the user
    /// left the search; otherwise one pairing attempt.
    async fn poll(&self, user: UserId) -> Result<Option<SearchResult>, ParleyError> {
        match self.sessions.state(user).await? {
            UserState::Searching => Ok(match self.matchmaker.try_match(user).await? {
                MatchOutcome::Matched { dialog_id, partner } => {
                    Some(SearchResult::Matched { dialog_id, partner })
                }
                MatchOutcome::NoMatch => None,
            }),
            UserState::InDialog => Ok(Some(match self.dialogs.resolve_partner(user).await? {
                Some(active) => SearchResult::Matched {
                    dialog_id: active.dialog_id,
                    partner: active.partner,
                },
                None => SearchResult::Cancelled,
            })),
            _ => Ok(Some(SearchResult::Cancelled)),
        }
    }

    async fn time_out(&self, user: UserId) -> SearchResult {
        match self.matchmaker.expire_search(user).await {
            Ok(true) => {
                recording::record_search_timeout();
                info!(%user, "search timed out");
                self.events.emit(EngineEvent::SearchTimedOut { user });
                SearchResult::TimedOut
            }
            // Paired or cancelled in the final instant.
            Ok(false) => match self.poll(user).await {
                Ok(Some(result)) => result,
                _ => SearchResult::Cancelled,
            },
            Err(e) => {
                warn!(%user, error = %e, "failed to expire search");
                SearchResult::TimedOut
            }
        }
    }
}
