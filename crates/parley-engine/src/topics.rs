// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topic advertisements: publish, browse, withdraw, and join.
//!
//! An owner has at most one active topic, enforced by the
//! `user:{id}:topic_id` pointer that shares the topic's TTL. Joining a
//! topic retires it and forms the dialog in the same unit, so a topic is
//! consumed by at most one joiner.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use parley_config::model::EngineConfig;
use parley_core::keys;
use parley_core::{
    AtomicUnit, Dialog, DialogId, Guard, Op, ParleyError, RecordStore, StateStore, Topic,
    TopicId, TopicRetirement, UserId, UserState,
};

use crate::dialogs::{formation_guards, formation_ops};
use crate::events::{EngineEvent, EventBus};
use crate::recording;
use crate::session::{SessionMachine, set_state, state_in, state_is};

/// Result of publishing a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTopicOutcome {
    Created(Topic),
    /// The owner already advertises this topic.
    AlreadyActive(TopicId),
    Banned,
    Busy(UserState),
    /// Empty after trimming, or too long.
    InvalidText,
}

/// Result of joining a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Started { dialog_id: DialogId, owner: UserId },
    /// Deleted, expired, or taken by someone else.
    TopicGone,
    OwnTopic,
    /// The owner is searching, in a dialog, banned, or otherwise busy.
    OwnerUnavailable,
    /// The caller is not in a state that can start a dialog.
    Unavailable,
}

/// Owner states from which a topic can be joined.
const JOINABLE_OWNER: [UserState; 2] = [UserState::Idle, UserState::TopicCreated];

/// Topic lifecycle manager.
#[derive(Clone)]
pub struct TopicManager {
    store: Arc<dyn StateStore>,
    records: Arc<dyn RecordStore>,
    sessions: SessionMachine,
    events: EventBus,
    ttl: Duration,
    max_chars: usize,
    cursor_ttl: Duration,
    inactivity: Duration,
}

impl TopicManager {
    pub fn new(
        store: Arc<dyn StateStore>,
        records: Arc<dyn RecordStore>,
        sessions: SessionMachine,
        events: EventBus,
        config: &EngineConfig,
    ) -> Self {
        Self {
            store,
            records,
            sessions,
            events,
            ttl: config.topic_ttl(),
            max_chars: config.topic_max_chars,
            cursor_ttl: config.browse_cursor_ttl(),
            inactivity: config.dialog_inactivity(),
        }
    }

    pub async fn topic(&self, topic_id: &TopicId) -> Result<Option<Topic>, ParleyError> {
        let key = keys::topic(topic_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Topic::from_fields(&key, &fields).map(Some)
    }

    /// Publishes a topic for `owner`.
    pub async fn create_topic(
        &self,
        owner: UserId,
        text: &str,
    ) -> Result<CreateTopicOutcome, ParleyError> {
        let text = text.trim();
        if text.is_empty() || text.chars().count() > self.max_chars {
            return Ok(CreateTopicOutcome::InvalidText);
        }
        let pointer = keys::user_topic(owner);

        for _ in 0..2 {
            let topic = Topic::open(
                owner,
                text.to_string(),
                Utc::now(),
                crate::chrono_span(self.ttl),
            );
            let key = keys::topic(&topic.topic_id);
            let unit = AtomicUnit::new()
                .guard(Guard::absent(&pointer))
                .guard(Guard::absent(keys::ban(owner)))
                .guard(state_in(owner, &UserState::SEARCH_ENTRY))
                .op(Op::HashSet {
                    key: key.clone(),
                    fields: topic.to_fields(),
                })
                .op(Op::expire(&key, self.ttl))
                .op(Op::SetAdd {
                    key: keys::ACTIVE_TOPICS.to_string(),
                    member: topic.topic_id.to_string(),
                })
                .op(Op::set_with_ttl(&pointer, topic.topic_id.to_string(), self.ttl))
                .op(set_state(owner, UserState::TopicCreated));

            if self.store.execute(unit).await? {
                recording::record_topic_created();
                info!(%owner, topic_id = %topic.topic_id, "topic created");
                if let Err(e) = self.records.record_topic_created(&topic).await {
                    warn!(topic_id = %topic.topic_id, error = %e, "failed to mirror topic");
                }
                return Ok(CreateTopicOutcome::Created(topic));
            }

            let record = self.sessions.snapshot(owner).await?;
            if record.is_banned() || record.state == UserState::Banned {
                return Ok(CreateTopicOutcome::Banned);
            }
            if let Some(existing) = record.active_topic_id {
                return Ok(CreateTopicOutcome::AlreadyActive(existing));
            }
            if !UserState::SEARCH_ENTRY.contains(&record.state) {
                return Ok(CreateTopicOutcome::Busy(record.state));
            }
        }
        Ok(CreateTopicOutcome::Busy(self.sessions.state(owner).await?))
    }

    /// Shows `user` the next topic after their cursor, in id order,
    /// wrapping around. Expired ids are pruned along the way.
    pub async fn browse(&self, user: UserId) -> Result<Option<Topic>, ParleyError> {
        let cursor_key = keys::user_topic_cursor(user);
        let mut ids = self.store.set_members(keys::ACTIVE_TOPICS).await?;
        ids.sort();
        let cursor = self.store.get(&cursor_key).await?;
        let start = cursor
            .as_ref()
            .map_or(0, |c| ids.partition_point(|id| id <= c));
        let (after, before) = ids.split_at(start);

        for id in after.iter().chain(before) {
            let topic_id = TopicId(id.clone());
            let Some(topic) = self.load_or_prune(&topic_id).await? else {
                continue;
            };
            if topic.owner == user {
                continue;
            }

            let key = keys::topic(&topic_id);
            let view = AtomicUnit::new().guard(Guard::exists(&key)).op(Op::HashIncr {
                key,
                field: Topic::VIEW_COUNT_FIELD.to_string(),
                by: 1,
            });
            if !self.store.execute(view).await? {
                continue;
            }
            self.store.set(&cursor_key, id, Some(self.cursor_ttl)).await?;

            let enter = AtomicUnit::new()
                .guard(state_in(user, &UserState::INFORMATIONAL))
                .op(set_state(user, UserState::BrowsingTopics));
            self.store.execute(enter).await?;

            return Ok(Some(Topic {
                view_count: topic.view_count + 1,
                ..topic
            }));
        }
        Ok(None)
    }

    /// Withdraws the owner's topic. Returns whether there was one.
    pub async fn delete_topic(&self, owner: UserId) -> Result<bool, ParleyError> {
        let pointer = keys::user_topic(owner);
        let Some(raw) = self.store.get(&pointer).await? else {
            return Ok(false);
        };
        let topic_id = TopicId(raw);

        let unit = AtomicUnit::new()
            .guard(Guard::equals(&pointer, topic_id.to_string()))
            .ops(retire_ops(&topic_id))
            .op(Op::delete(&pointer));
        if !self.store.execute(unit).await? {
            return Ok(false);
        }
        self.release_owner(owner).await?;
        info!(%owner, %topic_id, "topic deleted");
        self.mirror_retired(&topic_id, TopicRetirement::Deleted).await;
        Ok(true)
    }

    /// Opens a dialog between `user` and the owner of `topic_id`, consuming
    /// the topic. On any refusal the topic is left untouched.
    pub async fn start_dialog_from_topic(
        &self,
        user: UserId,
        topic_id: &TopicId,
    ) -> Result<JoinOutcome, ParleyError> {
        let Some(topic) = self.topic(topic_id).await? else {
            return Ok(JoinOutcome::TopicGone);
        };
        if topic.owner == user {
            return Ok(JoinOutcome::OwnTopic);
        }
        let owner = topic.owner;
        let key = keys::topic(topic_id);
        let owner_pointer = keys::user_topic(owner);

        let dialog = Dialog::open(
            owner,
            user,
            Some(topic_id.clone()),
            Utc::now(),
            crate::chrono_span(self.inactivity),
        );
        let unit = AtomicUnit::new()
            .guard(Guard::exists(&key))
            .guard(Guard::equals(&owner_pointer, topic_id.to_string()))
            .guard(state_in(owner, &JOINABLE_OWNER))
            .guard(state_in(user, &UserState::SEARCH_ENTRY))
            .guards(formation_guards(owner, user))
            .ops(retire_ops(topic_id))
            .op(Op::delete(&owner_pointer))
            .ops(formation_ops(&dialog));

        if self.store.execute(unit).await? {
            recording::record_match("topic");
            info!(%owner, joiner = %user, %topic_id, dialog_id = %dialog.dialog_id, "topic consumed");
            self.mirror_retired(topic_id, TopicRetirement::Consumed).await;
            if let Err(e) = self.records.record_dialog_started(&dialog).await {
                warn!(dialog_id = %dialog.dialog_id, error = %e, "failed to mirror dialog start");
            }
            self.events.emit(EngineEvent::TopicConsumed {
                topic_id: topic_id.clone(),
                owner,
                joiner: user,
                dialog_id: dialog.dialog_id.clone(),
            });
            self.events.emit(EngineEvent::Matched {
                dialog_id: dialog.dialog_id.clone(),
                users: dialog.participants(),
                topic_id: Some(topic_id.clone()),
            });
            return Ok(JoinOutcome::Started {
                dialog_id: dialog.dialog_id,
                owner,
            });
        }

        self.classify_refusal(user, owner, topic_id).await
    }

    /// Drops index entries of topics that expired, retires topics past
    /// `now` that the store has not expired yet, and deactivates expired
    /// rows in the record store. Returns how many topics were retired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, ParleyError> {
        let mut retired = 0;
        for id in self.store.set_members(keys::ACTIVE_TOPICS).await? {
            let topic_id = TopicId(id);
            match self.load_or_prune(&topic_id).await? {
                None => retired += 1,
                Some(topic) if topic.expires_at <= now => {
                    let unit = AtomicUnit::new()
                        .guard(Guard::exists(keys::topic(&topic_id)))
                        .ops(retire_ops(&topic_id));
                    if self.store.execute(unit).await? {
                        let pointer = keys::user_topic(topic.owner);
                        let release = AtomicUnit::new()
                            .guard(Guard::equals(&pointer, topic_id.to_string()))
                            .op(Op::delete(&pointer));
                        self.store.execute(release).await?;
                        self.release_owner(topic.owner).await?;
                        retired += 1;
                    }
                }
                Some(_) => {}
            }
        }

        match self.records.deactivate_expired_topics(now).await {
            Ok(rows) if rows > 0 => debug!(rows, "deactivated expired topic rows"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to deactivate expired topic rows"),
        }
        Ok(retired)
    }

    pub async fn active_count(&self) -> Result<usize, ParleyError> {
        Ok(self.store.set_members(keys::ACTIVE_TOPICS).await?.len())
    }

    /// Loads a topic; an id whose record is gone or undecodable is removed
    /// from the index and reads as `None`.
    async fn load_or_prune(&self, topic_id: &TopicId) -> Result<Option<Topic>, ParleyError> {
        let topic = match self.topic(topic_id).await {
            Ok(topic) => topic,
            Err(ParleyError::Corrupt { key, detail }) => {
                warn!(%key, %detail, "dropping undecodable topic from index");
                None
            }
            Err(e) => return Err(e),
        };
        if topic.is_none() {
            self.store
                .set_remove(keys::ACTIVE_TOPICS, &topic_id.0)
                .await?;
            debug!(%topic_id, "pruned expired topic");
        }
        Ok(topic)
    }

    /// `TOPIC_CREATED` back to `IDLE` once the owner has no topic left.
    async fn release_owner(&self, owner: UserId) -> Result<(), ParleyError> {
        let unit = AtomicUnit::new()
            .guard(state_is(owner, UserState::TopicCreated))
            .guard(Guard::absent(keys::user_topic(owner)))
            .op(set_state(owner, UserState::Idle));
        self.store.execute(unit).await?;
        Ok(())
    }

    async fn classify_refusal(
        &self,
        user: UserId,
        owner: UserId,
        topic_id: &TopicId,
    ) -> Result<JoinOutcome, ParleyError> {
        let current = self.store.get(&keys::user_topic(owner)).await?;
        if current.as_deref() != Some(topic_id.0.as_str())
            || !self.store.exists(&keys::topic(topic_id)).await?
        {
            return Ok(JoinOutcome::TopicGone);
        }
        let caller = self.sessions.snapshot(user).await?;
        if caller.is_banned()
            || caller.current_dialog_id.is_some()
            || !UserState::SEARCH_ENTRY.contains(&caller.state)
        {
            return Ok(JoinOutcome::Unavailable);
        }
        Ok(JoinOutcome::OwnerUnavailable)
    }

    async fn mirror_retired(&self, topic_id: &TopicId, reason: TopicRetirement) {
        if let Err(e) = self.records.record_topic_retired(topic_id, reason).await {
            warn!(%topic_id, %reason, error = %e, "failed to mirror topic retirement");
        }
    }
}

fn retire_ops(topic_id: &TopicId) -> [Op; 2] {
    [
        Op::delete(keys::topic(topic_id)),
        Op::SetRemove {
            key: keys::ACTIVE_TOPICS.to_string(),
            member: topic_id.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_state::MemoryStore;
    use parley_storage::{MemoryRecords, RecordEvent};

    struct Fixture {
        topics: TopicManager,
        sessions: SessionMachine,
        store: Arc<MemoryStore>,
        records: Arc<MemoryRecords>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let records = Arc::new(MemoryRecords::new());
        let sessions = SessionMachine::new(store.clone(), records.clone());
        let topics = TopicManager::new(
            store.clone(),
            records.clone(),
            sessions.clone(),
            EventBus::new(16),
            &EngineConfig::default(),
        );
        Fixture {
            topics,
            sessions,
            store,
            records,
        }
    }

    async fn publish(f: &Fixture, owner: i64, text: &str) -> Topic {
        match f.topics.create_topic(UserId(owner), text).await.unwrap() {
            CreateTopicOutcome::Created(topic) => topic,
            other => panic!("expected a topic, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_topic_trims_and_links_owner() {
        let f = fixture();
        let topic = publish(&f, 1, "  rust lifetimes  ").await;
        assert_eq!(topic.text, "rust lifetimes");

        let record = f.sessions.snapshot(UserId(1)).await.unwrap();
        assert_eq!(record.state, UserState::TopicCreated);
        assert_eq!(record.active_topic_id, Some(topic.topic_id.clone()));
        assert_eq!(f.topics.topic(&topic.topic_id).await.unwrap(), Some(topic.clone()));
        assert_eq!(f.records.events(), vec![RecordEvent::TopicCreated(topic)]);
    }

    #[tokio::test]
    async fn create_topic_rejects_bad_text() {
        let f = fixture();
        let long = "x".repeat(201);
        for text in ["", "   ", long.as_str()] {
            assert_eq!(
                f.topics.create_topic(UserId(1), text).await.unwrap(),
                CreateTopicOutcome::InvalidText
            );
        }
        assert!(matches!(
            f.topics.create_topic(UserId(1), &"é".repeat(200)).await.unwrap(),
            CreateTopicOutcome::Created(_)
        ));
    }

    #[tokio::test]
    async fn one_active_topic_per_owner() {
        let f = fixture();
        let first = publish(&f, 1, "first").await;
        assert_eq!(
            f.topics.create_topic(UserId(1), "second").await.unwrap(),
            CreateTopicOutcome::AlreadyActive(first.topic_id)
        );
        assert_eq!(f.topics.active_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn banned_and_busy_owners_are_refused() {
        let f = fixture();
        f.sessions.ban(UserId(1), Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            f.topics.create_topic(UserId(1), "hi").await.unwrap(),
            CreateTopicOutcome::Banned
        );

        f.store.set("user:2:state", "SEARCHING", None).await.unwrap();
        assert_eq!(
            f.topics.create_topic(UserId(2), "hi").await.unwrap(),
            CreateTopicOutcome::Busy(UserState::Searching)
        );
    }

    #[tokio::test]
    async fn browse_cycles_through_other_topics() {
        let f = fixture();
        publish(&f, 1, "one").await;
        publish(&f, 2, "two").await;
        let own = publish(&f, 3, "three").await.topic_id;

        let mut seen = Vec::new();
        for _ in 0..4 {
            let topic = f.topics.browse(UserId(3)).await.unwrap().unwrap();
            assert_ne!(topic.topic_id, own);
            seen.push(topic.topic_id);
        }
        assert_ne!(seen[0], seen[1]);
        assert!(seen[0] < seen[1], "ascending id order");
        assert_eq!(seen[0], seen[2]);
        assert_eq!(seen[1], seen[3]);

        let viewed = f.topics.topic(&seen[0]).await.unwrap().unwrap();
        assert_eq!(viewed.view_count, 2);
        assert_eq!(f.sessions.state(UserId(3)).await.unwrap(), UserState::BrowsingTopics);
    }

    #[tokio::test]
    async fn browse_with_no_foreign_topics_is_empty() {
        let f = fixture();
        publish(&f, 1, "mine").await;
        assert_eq!(f.topics.browse(UserId(1)).await.unwrap(), None);
        assert_eq!(f.sessions.state(UserId(1)).await.unwrap(), UserState::TopicCreated);
    }

    #[tokio::test(start_paused = true)]
    async fn browse_prunes_expired_topics() {
        let f = fixture();
        publish(&f, 1, "short lived").await;
        tokio::time::advance(Duration::from_secs(3601)).await;

        assert_eq!(f.topics.browse(UserId(2)).await.unwrap(), None);
        assert_eq!(f.topics.active_count().await.unwrap(), 0);
        assert!(!f.store.exists("user:1:topic_id").await.unwrap());
    }

    #[tokio::test]
    async fn delete_topic_retires_and_idles_owner() {
        let f = fixture();
        let topic = publish(&f, 1, "bye").await;
        assert!(f.topics.delete_topic(UserId(1)).await.unwrap());
        assert!(!f.topics.delete_topic(UserId(1)).await.unwrap());

        assert_eq!(f.topics.topic(&topic.topic_id).await.unwrap(), None);
        assert_eq!(f.topics.active_count().await.unwrap(), 0);
        assert_eq!(f.sessions.state(UserId(1)).await.unwrap(), UserState::Idle);
        assert!(f
            .records
            .events()
            .contains(&RecordEvent::TopicRetired(topic.topic_id, TopicRetirement::Deleted)));
    }

    #[tokio::test]
    async fn joining_consumes_topic_and_forms_dialog() {
        let f = fixture();
        let topic = publish(&f, 1, "chat?").await;

        let outcome = f
            .topics
            .start_dialog_from_topic(UserId(2), &topic.topic_id)
            .await
            .unwrap();
        let JoinOutcome::Started { dialog_id, owner } = outcome else {
            panic!("expected a dialog, got {outcome:?}");
        };
        assert_eq!(owner, UserId(1));
        assert_eq!(f.topics.topic(&topic.topic_id).await.unwrap(), None);
        assert!(!f.store.exists("user:1:topic_id").await.unwrap());
        for user in [UserId(1), UserId(2)] {
            let record = f.sessions.snapshot(user).await.unwrap();
            assert_eq!(record.state, UserState::InDialog);
            assert_eq!(record.current_dialog_id.as_ref(), Some(&dialog_id));
        }

        // A second joiner finds the topic gone.
        assert_eq!(
            f.topics
                .start_dialog_from_topic(UserId(3), &topic.topic_id)
                .await
                .unwrap(),
            JoinOutcome::TopicGone
        );
    }

    #[tokio::test]
    async fn busy_owner_leaves_topic_untouched() {
        let f = fixture();
        let topic = publish(&f, 1, "later").await;
        f.store.set("user:1:state", "SEARCHING", None).await.unwrap();

        assert_eq!(
            f.topics
                .start_dialog_from_topic(UserId(2), &topic.topic_id)
                .await
                .unwrap(),
            JoinOutcome::OwnerUnavailable
        );
        assert!(f.topics.topic(&topic.topic_id).await.unwrap().is_some());
        assert_eq!(f.topics.active_count().await.unwrap(), 1);
        assert_eq!(f.sessions.state(UserId(2)).await.unwrap(), UserState::Idle);
    }

    #[tokio::test]
    async fn join_refusals_are_classified() {
        let f = fixture();
        let topic = publish(&f, 1, "x").await;
        assert_eq!(
            f.topics
                .start_dialog_from_topic(UserId(1), &topic.topic_id)
                .await
                .unwrap(),
            JoinOutcome::OwnTopic
        );

        f.store.set("user:2:state", "IN_DIALOG", None).await.unwrap();
        assert_eq!(
            f.topics
                .start_dialog_from_topic(UserId(2), &topic.topic_id)
                .await
                .unwrap(),
            JoinOutcome::Unavailable
        );

        f.sessions.ban(UserId(3), Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            f.topics
                .start_dialog_from_topic(UserId(3), &topic.topic_id)
                .await
                .unwrap(),
            JoinOutcome::Unavailable
        );

        assert_eq!(
            f.topics
                .start_dialog_from_topic(UserId(2), &TopicId("missing".into()))
                .await
                .unwrap(),
            JoinOutcome::TopicGone
        );
    }

    #[tokio::test]
    async fn sweep_retires_topics_past_deadline() {
        let f = fixture();
        let topic = publish(&f, 1, "old").await;
        assert_eq!(f.topics.sweep_expired(Utc::now()).await.unwrap(), 0);

        let later = topic.expires_at + chrono::Duration::seconds(1);
        assert_eq!(f.topics.sweep_expired(later).await.unwrap(), 1);
        assert_eq!(f.topics.active_count().await.unwrap(), 0);
        assert!(!f.store.exists("user:1:topic_id").await.unwrap());
        assert_eq!(f.sessions.state(UserId(1)).await.unwrap(), UserState::Idle);
    }
}
