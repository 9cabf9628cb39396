// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matchmaking and session-lifecycle engine for Parley.
//!
//! The [`Engine`] is the facade the transport and presentation layers call:
//! - queues users and pairs them ([`matchmaking`], [`search`])
//! - tracks per-user state ([`session`])
//! - ends, reports and expires dialogs ([`dialogs`])
//! - publishes and consumes topics ([`topics`])
//! - announces everything worth telling a user on an [`EngineEvent`] stream
//!
//! All live state goes through the injected [`StateStore`]; terminal events
//! are mirrored into the injected [`RecordStore`].

pub mod dialogs;
pub mod events;
pub mod matchmaking;
pub mod recording;
pub mod search;
pub mod session;
pub mod shutdown;
pub mod sweeper;
pub mod topics;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use parley_config::model::EngineConfig;
use parley_core::{
    Backend, Dialog, DialogId, EndReason, HealthStatus, ParleyError, RecordStore, StateStore, Topic,
    TopicId, UserId, UserRecord, UserState,
};

pub use dialogs::{ActiveDialog, DialogManager, DialogSweep};
pub use events::{EngineEvent, EventBus};
pub use matchmaking::{MatchOutcome, Matchmaker, SearchOutcome};
pub use search::{SearchHandle, SearchResult};
pub use session::SessionMachine;
pub use shutdown::install_signal_handler;
pub use sweeper::{ExpirySweeper, SweepReport};
pub use topics::{CreateTopicOutcome, JoinOutcome, TopicManager};

use search::SearchTasks;

/// Result of [`Engine::start_search`].
#[derive(Debug)]
pub enum SearchStart {
    /// Queued, with the timer task running.
    Searching(SearchHandle),
    /// Not queued; the outcome says why.
    Rejected(SearchOutcome),
}

/// Converts a config duration into a timestamp offset, saturating.
pub(crate) fn chrono_span(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// The engine facade.
///
/// Cheap to clone; clones share the stores, the event stream and the
/// search task registry.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn StateStore>,
    records: Arc<dyn RecordStore>,
    events: EventBus,
    sessions: SessionMachine,
    matchmaker: Matchmaker,
    dialogs: DialogManager,
    topics: TopicManager,
    searches: SearchTasks,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn StateStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let events = EventBus::new(config.event_buffer);
        let sessions = SessionMachine::new(store.clone(), records.clone());
        let matchmaker = Matchmaker::new(
            store.clone(),
            records.clone(),
            sessions.clone(),
            events.clone(),
            config.dialog_inactivity(),
        );
        let dialogs = DialogManager::new(
            store.clone(),
            records.clone(),
            sessions.clone(),
            events.clone(),
            &config,
        );
        let topics = TopicManager::new(
            store.clone(),
            records.clone(),
            sessions.clone(),
            events.clone(),
            &config,
        );
        let searches = SearchTasks::new(
            matchmaker.clone(),
            sessions.clone(),
            dialogs.clone(),
            events.clone(),
            config.search_timeout(),
            config.search_poll_interval(),
        );
        Self {
            config,
            store,
            records,
            events,
            sessions,
            matchmaker,
            dialogs,
            topics,
            searches,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn sessions(&self) -> &SessionMachine {
        &self.sessions
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn dialogs(&self) -> &DialogManager {
        &self.dialogs
    }

    pub fn topics(&self) -> &TopicManager {
        &self.topics
    }

    /// A sweeper over this engine's managers.
    pub fn sweeper(&self, interval: Duration) -> ExpirySweeper {
        ExpirySweeper::new(
            self.store.clone(),
            self.dialogs.clone(),
            self.topics.clone(),
            self.matchmaker.clone(),
            interval,
        )
    }

    // --- session ---

    pub async fn check_in(&self, user: UserId) -> Result<UserRecord, ParleyError> {
        self.sessions.check_in(user).await
    }

    /// Snapshot of the user's live state.
    pub async fn user(&self, user: UserId) -> Result<UserRecord, ParleyError> {
        self.sessions.snapshot(user).await
    }

    pub async fn state(&self, user: UserId) -> Result<UserState, ParleyError> {
        self.sessions.state(user).await
    }

    pub async fn transition(
        &self,
        user: UserId,
        from: UserState,
        to: UserState,
    ) -> Result<bool, ParleyError> {
        self.sessions.transition(user, from, to).await
    }

    pub async fn leave_browsing(&self, user: UserId) -> Result<UserState, ParleyError> {
        self.sessions.leave_browsing(user).await
    }

    /// Claims the configured cooldown window for `user`.
    pub async fn throttle(&self, user: UserId) -> Result<bool, ParleyError> {
        self.sessions.throttle(user, self.config.cooldown()).await
    }

    // --- matchmaking ---

    pub async fn begin_search(&self, user: UserId) -> Result<SearchOutcome, ParleyError> {
        self.matchmaker.begin_search(user).await
    }

    pub async fn try_match(&self, user: UserId) -> Result<MatchOutcome, ParleyError> {
        self.matchmaker.try_match(user).await
    }

    /// Queues `user` and starts the timer task that pairs them or gives up
    /// at the deadline.
    pub async fn start_search(&self, user: UserId) -> Result<SearchStart, ParleyError> {
        match self.matchmaker.begin_search(user).await? {
            SearchOutcome::Queued => Ok(SearchStart::Searching(self.searches.spawn(user))),
            rejected => Ok(SearchStart::Rejected(rejected)),
        }
    }

    /// Stops the user's search task, if any, and leaves the queue.
    pub async fn cancel_search(&self, user: UserId) -> Result<bool, ParleyError> {
        self.searches.stop(user);
        self.matchmaker.cancel_search(user).await
    }

    pub async fn queue_snapshot(&self) -> Result<Vec<UserId>, ParleyError> {
        self.matchmaker.queue_snapshot().await
    }

    pub async fn queue_len(&self) -> Result<usize, ParleyError> {
        self.matchmaker.queue_len().await
    }

    /// Number of search tasks currently running in this process.
    pub fn running_searches(&self) -> usize {
        self.searches.running()
    }

    // --- dialogs ---

    pub async fn resolve_partner(&self, user: UserId) -> Result<Option<ActiveDialog>, ParleyError> {
        self.dialogs.resolve_partner(user).await
    }

    pub async fn end_dialog(&self, user: UserId) -> Result<Option<UserId>, ParleyError> {
        self.dialogs.end_dialog(user, EndReason::EndedByUser).await
    }

    pub async fn report_partner(
        &self,
        user: UserId,
        reason: &str,
    ) -> Result<Option<UserId>, ParleyError> {
        self.dialogs.report_partner(user, reason).await
    }

    /// Refreshes the inactivity deadline; call on every forwarded message.
    pub async fn touch_dialog(&self, user: UserId) -> Result<bool, ParleyError> {
        self.dialogs.touch(user).await
    }

    pub async fn dialog(&self, dialog_id: &DialogId) -> Result<Option<Dialog>, ParleyError> {
        self.dialogs.dialog(dialog_id).await
    }

    // --- topics ---

    pub async fn create_topic(
        &self,
        owner: UserId,
        text: &str,
    ) -> Result<CreateTopicOutcome, ParleyError> {
        self.topics.create_topic(owner, text).await
    }

    pub async fn browse(&self, user: UserId) -> Result<Option<Topic>, ParleyError> {
        self.topics.browse(user).await
    }

    pub async fn delete_topic(&self, owner: UserId) -> Result<bool, ParleyError> {
        self.topics.delete_topic(owner).await
    }

    pub async fn start_dialog_from_topic(
        &self,
        user: UserId,
        topic_id: &TopicId,
    ) -> Result<JoinOutcome, ParleyError> {
        self.topics.start_dialog_from_topic(user, topic_id).await
    }

    pub async fn topic(&self, topic_id: &TopicId) -> Result<Option<Topic>, ParleyError> {
        self.topics.topic(topic_id).await
    }

    // --- lifecycle ---

    /// Health of both stores, keyed by backend name.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut report = Vec::with_capacity(2);
        let state = self
            .store
            .health_check()
            .await
            .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
        report.push((self.store.name().to_string(), state));
        let records = self
            .records
            .health_check()
            .await
            .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
        report.push((self.records.name().to_string(), records));
        report
    }

    /// Stops every search task and shuts both stores down.
    pub async fn shutdown(&self) -> Result<(), ParleyError> {
        self.searches.stop_all();
        self.store.shutdown().await?;
        self.records.shutdown().await?;
        info!("engine shut down");
        Ok(())
    }
}
