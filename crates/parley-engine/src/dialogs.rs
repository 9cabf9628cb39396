// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dialog lifecycle: partner lookup, termination, reports and expiry.
//!
//! A live dialog exists iff both participants point at it and are
//! `IN_DIALOG`. Termination is one guarded unit that requires both
//! pointers to still name the dialog and `ended_reason` to be unset, so
//! concurrent end requests (user, partner, report, sweeper) resolve to
//! exactly one winner.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use parley_core::keys;
use parley_core::{
    AtomicUnit, Dialog, DialogId, EndReason, Guard, Op, ParleyError, RecordStore, ReportRecord,
    StateStore, UserId, UserState,
};

use crate::events::{EngineEvent, EventBus};
use crate::recording;
use crate::session::{SessionMachine, set_state, state_is};

/// The caller's side of a live dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDialog {
    pub dialog_id: DialogId,
    pub partner: UserId,
}

/// Outcome of one pass over `dialogs:active`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DialogSweep {
    /// Dialogs ended because their inactivity deadline passed.
    pub expired: usize,
    /// Index entries dropped because the dialog was gone or already ended.
    pub pruned: usize,
    /// Ended dialogs whose terminal record was written on a retry.
    pub persisted: usize,
}

/// Guards shared by every dialog formation: neither user is banned or
/// already points at a dialog.
pub(crate) fn formation_guards(a: UserId, b: UserId) -> Vec<Guard> {
    vec![
        Guard::absent(keys::ban(a)),
        Guard::absent(keys::ban(b)),
        Guard::absent(keys::user_dialog(a)),
        Guard::absent(keys::user_dialog(b)),
    ]
}

/// Ops that bring `dialog` to life: dequeue both users, write and index
/// the record, point both users at it and move them to `IN_DIALOG`.
pub(crate) fn formation_ops(dialog: &Dialog) -> Vec<Op> {
    let id = dialog.dialog_id.to_string();
    let mut ops = Vec::with_capacity(8);
    for user in dialog.participants() {
        ops.push(Op::ListRemove {
            key: keys::SEARCH_QUEUE.to_string(),
            value: user.to_string(),
        });
    }
    ops.push(Op::HashSet {
        key: keys::dialog(&dialog.dialog_id),
        fields: dialog.to_fields(),
    });
    ops.push(Op::SetAdd {
        key: keys::ACTIVE_DIALOGS.to_string(),
        member: id.clone(),
    });
    for user in dialog.participants() {
        ops.push(Op::set(keys::user_dialog(user), id.clone()));
        ops.push(set_state(user, UserState::InDialog));
    }
    ops
}

/// Owns dialog termination and inactivity tracking.
#[derive(Clone)]
pub struct DialogManager {
    store: Arc<dyn StateStore>,
    records: Arc<dyn RecordStore>,
    sessions: SessionMachine,
    events: EventBus,
    inactivity: Duration,
    retention: Duration,
    ban_duration: Duration,
}

impl DialogManager {
    pub fn new(
        store: Arc<dyn StateStore>,
        records: Arc<dyn RecordStore>,
        sessions: SessionMachine,
        events: EventBus,
        config: &parley_config::model::EngineConfig,
    ) -> Self {
        Self {
            store,
            records,
            sessions,
            events,
            inactivity: config.dialog_inactivity(),
            retention: config.dialog_retention(),
            ban_duration: config.ban_duration(),
        }
    }

    /// Reads a dialog record, live or recently ended.
    pub async fn dialog(&self, dialog_id: &DialogId) -> Result<Option<Dialog>, ParleyError> {
        let key = keys::dialog(dialog_id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Dialog::from_fields(&key, &fields).map(Some)
    }

    /// The user's live dialog and partner.
    ///
    /// A pointer to a dialog that is gone or already ended is cleared and the
    /// user reset to `IDLE`.
    pub async fn resolve_partner(&self, user: UserId) -> Result<Option<ActiveDialog>, ParleyError> {
        let pointer = keys::user_dialog(user);
        let Some(raw) = self.store.get(&pointer).await? else {
            return Ok(None);
        };
        let dialog_id = DialogId(raw);

        let dialog = match self.dialog(&dialog_id).await {
            Ok(dialog) => dialog,
            Err(ParleyError::Corrupt { key, detail }) => {
                warn!(%user, %key, %detail, "undecodable dialog record");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(partner) = dialog
            .filter(Dialog::is_live)
            .and_then(|d| d.partner_of(user))
        {
            return Ok(Some(ActiveDialog { dialog_id, partner }));
        }

        let heal = AtomicUnit::new()
            .guard(Guard::equals(&pointer, dialog_id.to_string()))
            .op(Op::delete(&pointer))
            .op(set_state(user, UserState::Idle));
        if self.store.execute(heal).await? {
            info!(%user, %dialog_id, "cleared dangling dialog pointer");
        }
        Ok(None)
    }

    /// Ends the caller's dialog. Returns the partner, or `None` if there was
    /// nothing to end or another request ended it first.
    pub async fn end_dialog(
        &self,
        user: UserId,
        reason: EndReason,
    ) -> Result<Option<UserId>, ParleyError> {
        let Some(active) = self.resolve_partner(user).await? else {
            self.heal_orphaned(user).await?;
            return Ok(None);
        };
        let ended = self
            .finish(&active.dialog_id, [user, active.partner], reason, Some(user))
            .await?;
        Ok(ended.then_some(active.partner))
    }

    /// Bans the caller's partner, files the report and ends the dialog.
    ///
    /// The report write is the only record-store write whose failure is
    /// returned; by then the partner is already banned.
    pub async fn report_partner(
        &self,
        user: UserId,
        reason: &str,
    ) -> Result<Option<UserId>, ParleyError> {
        let Some(active) = self.resolve_partner(user).await? else {
            return Ok(None);
        };
        let partner = active.partner;

        let until = self.sessions.ban(partner, self.ban_duration).await?;
        self.events.emit(EngineEvent::UserBanned {
            user: partner,
            until,
        });
        recording::record_report();

        let report = ReportRecord {
            from: user,
            target: partner,
            dialog_id: active.dialog_id.clone(),
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        self.records.record_report(&report).await?;
        if let Err(e) = self.records.record_ban(partner, until).await {
            warn!(%partner, error = %e, "failed to mirror ban");
        }

        self.finish(&active.dialog_id, [user, partner], EndReason::Report, Some(user))
            .await?;
        info!(reporter = %user, %partner, dialog_id = %active.dialog_id, "partner reported");
        Ok(Some(partner))
    }

    /// Pushes the inactivity deadline of the caller's live dialog forward.
    pub async fn touch(&self, user: UserId) -> Result<bool, ParleyError> {
        let pointer = keys::user_dialog(user);
        let Some(raw) = self.store.get(&pointer).await? else {
            return Ok(false);
        };
        let dialog_id = DialogId(raw);
        let key = keys::dialog(&dialog_id);
        let expires_at = Utc::now() + crate::chrono_span(self.inactivity);

        let unit = AtomicUnit::new()
            .guard(Guard::equals(&pointer, dialog_id.to_string()))
            .guard(Guard::exists(&key))
            .guard(Guard::hash_field_absent(&key, Dialog::ENDED_REASON_FIELD))
            .op(Op::HashSet {
                key,
                fields: vec![(
                    Dialog::EXPIRES_AT_FIELD.to_string(),
                    expires_at.timestamp().to_string(),
                )],
            });
        self.store.execute(unit).await
    }

    /// Ends every indexed dialog whose deadline is at or before `now` and
    /// drops index entries of dialogs that are gone or already ended.
    /// Afterwards it retries terminal records the record store refused.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<DialogSweep, ParleyError> {
        let mut sweep = DialogSweep::default();
        for member in self.store.set_members(keys::ACTIVE_DIALOGS).await? {
            let dialog_id = DialogId(member);
            let dialog = match self.dialog(&dialog_id).await {
                Ok(dialog) => dialog,
                Err(ParleyError::Corrupt { key, detail }) => {
                    warn!(%key, %detail, "dropping undecodable dialog from index");
                    None
                }
                Err(e) => return Err(e),
            };

            let Some(dialog) = dialog.filter(Dialog::is_live) else {
                self.store
                    .set_remove(keys::ACTIVE_DIALOGS, &dialog_id.0)
                    .await?;
                sweep.pruned += 1;
                continue;
            };
            if dialog.expires_at > now {
                continue;
            }

            if self
                .finish(&dialog_id, dialog.participants(), EndReason::Expired, None)
                .await?
                || self.retire_unpaired(&dialog).await?
            {
                sweep.expired += 1;
            }
        }
        sweep.persisted = self.retry_unpersisted().await?;
        if sweep != DialogSweep::default() {
            debug!(
                expired = sweep.expired,
                pruned = sweep.pruned,
                persisted = sweep.persisted,
                "dialog sweep"
            );
        }
        Ok(sweep)
    }

    /// Writes terminal records that failed earlier. Stops at the first
    /// refusal; the rest wait for the next sweep.
    async fn retry_unpersisted(&self) -> Result<usize, ParleyError> {
        let mut persisted = 0;
        for member in self.store.set_members(keys::UNPERSISTED_DIALOGS).await? {
            let dialog_id = DialogId(member);
            let ended = match self.dialog(&dialog_id).await {
                Ok(dialog) => dialog.and_then(|d| d.ended_reason.zip(d.ended_at)),
                Err(ParleyError::Corrupt { key, detail }) => {
                    warn!(%key, %detail, "dropping undecodable dialog from retry set");
                    None
                }
                Err(e) => return Err(e),
            };
            let Some((reason, at)) = ended else {
                self.store
                    .set_remove(keys::UNPERSISTED_DIALOGS, &dialog_id.0)
                    .await?;
                continue;
            };
            if let Err(e) = self.records.record_dialog_ended(&dialog_id, reason, at).await {
                warn!(%dialog_id, error = %e, "terminal record still refused");
                break;
            }
            self.release_ended(&dialog_id).await?;
            persisted += 1;
        }
        Ok(persisted)
    }

    /// Starts the retention countdown of a dialog whose terminal record is
    /// durable.
    async fn release_ended(&self, dialog_id: &DialogId) -> Result<(), ParleyError> {
        let unit = AtomicUnit::new()
            .op(Op::SetRemove {
                key: keys::UNPERSISTED_DIALOGS.to_string(),
                member: dialog_id.to_string(),
            })
            .op(Op::expire(keys::dialog(dialog_id), self.retention));
        self.store.execute(unit).await?;
        Ok(())
    }

    /// Number of dialogs that have not ended.
    pub async fn active_count(&self) -> Result<usize, ParleyError> {
        Ok(self.store.set_members(keys::ACTIVE_DIALOGS).await?.len())
    }

    /// The termination unit. Returns whether this call ended the dialog.
    async fn finish(
        &self,
        dialog_id: &DialogId,
        users: [UserId; 2],
        reason: EndReason,
        ended_by: Option<UserId>,
    ) -> Result<bool, ParleyError> {
        let now = Utc::now();
        let key = keys::dialog(dialog_id);
        let id = dialog_id.to_string();

        let mut unit = AtomicUnit::new()
            .guards(
                users
                    .iter()
                    .map(|u| Guard::equals(keys::user_dialog(*u), id.clone())),
            )
            .guard(Guard::hash_field_absent(&key, Dialog::ENDED_REASON_FIELD));
        for user in users {
            unit = unit
                .op(Op::delete(keys::user_dialog(user)))
                .op(set_state(user, UserState::Idle));
        }
        unit = unit.ops(self.closing_ops(dialog_id, reason, now));

        if !self.store.execute(unit).await? {
            debug!(%dialog_id, %reason, "dialog already ended");
            return Ok(false);
        }
        self.after_end(dialog_id, users, reason, ended_by, now).await;
        Ok(true)
    }

    /// Ends a live expired dialog whose participants no longer both point
    /// at it, releasing whichever pointer still does.
    async fn retire_unpaired(&self, dialog: &Dialog) -> Result<bool, ParleyError> {
        let now = Utc::now();
        let key = keys::dialog(&dialog.dialog_id);
        let unit = AtomicUnit::new()
            .guard(Guard::hash_field_absent(&key, Dialog::ENDED_REASON_FIELD))
            .ops(self.closing_ops(&dialog.dialog_id, EndReason::Expired, now));
        if !self.store.execute(unit).await? {
            return Ok(false);
        }
        for user in dialog.participants() {
            let pointer = keys::user_dialog(user);
            let release = AtomicUnit::new()
                .guard(Guard::equals(&pointer, dialog.dialog_id.to_string()))
                .op(Op::delete(&pointer))
                .op(set_state(user, UserState::Idle));
            self.store.execute(release).await?;
        }
        warn!(dialog_id = %dialog.dialog_id, "retired expired dialog with inconsistent pointers");
        self.after_end(
            &dialog.dialog_id,
            dialog.participants(),
            EndReason::Expired,
            None,
            now,
        )
        .await;
        Ok(true)
    }

    /// `IN_DIALOG` with no pointer is unreachable through the engine, but
    /// a partially restored store can produce it.
    async fn heal_orphaned(&self, user: UserId) -> Result<(), ParleyError> {
        let unit = AtomicUnit::new()
            .guard(state_is(user, UserState::InDialog))
            .guard(Guard::absent(keys::user_dialog(user)))
            .op(set_state(user, UserState::Idle));
        if self.store.execute(unit).await? {
            info!(%user, "reset user stuck in dialog without pointer");
        }
        Ok(())
    }

    fn closing_ops(&self, dialog_id: &DialogId, reason: EndReason, now: DateTime<Utc>) -> Vec<Op> {
        let key = keys::dialog(dialog_id);
        vec![
            Op::HashSet {
                key: key.clone(),
                fields: vec![
                    (Dialog::ENDED_REASON_FIELD.to_string(), reason.to_string()),
                    (Dialog::ENDED_AT_FIELD.to_string(), now.timestamp().to_string()),
                ],
            },
            Op::SetRemove {
                key: keys::ACTIVE_DIALOGS.to_string(),
                member: dialog_id.to_string(),
            },
            Op::SetAdd {
                key: keys::UNPERSISTED_DIALOGS.to_string(),
                member: dialog_id.to_string(),
            },
        ]
    }

    async fn after_end(
        &self,
        dialog_id: &DialogId,
        users: [UserId; 2],
        reason: EndReason,
        ended_by: Option<UserId>,
        at: DateTime<Utc>,
    ) {
        recording::record_dialog_ended(reason);
        info!(%dialog_id, %reason, "dialog ended");
        match self.records.record_dialog_ended(dialog_id, reason, at).await {
            Ok(()) => {
                if let Err(e) = self.release_ended(dialog_id).await {
                    warn!(%dialog_id, error = %e, "failed to start dialog retention");
                }
            }
            Err(e) => {
                warn!(%dialog_id, error = %e, "terminal record refused, kept live for retry");
            }
        }
        self.events.emit(EngineEvent::DialogEnded {
            dialog_id: dialog_id.clone(),
            users,
            reason,
            ended_by,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_config::model::EngineConfig;
    use parley_state::MemoryStore;
    use parley_storage::{MemoryRecords, RecordEvent};

    struct Fixture {
        dialogs: DialogManager,
        store: Arc<MemoryStore>,
        records: Arc<MemoryRecords>,
        events: EventBus,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let records = Arc::new(MemoryRecords::new());
        let events = EventBus::new(16);
        let sessions = SessionMachine::new(store.clone(), records.clone());
        let dialogs = DialogManager::new(
            store.clone(),
            records.clone(),
            sessions,
            events.clone(),
            &EngineConfig::default(),
        );
        Fixture {
            dialogs,
            store,
            records,
            events,
        }
    }

    /// Forms a dialog directly through the formation unit.
    async fn open(store: &MemoryStore, a: UserId, b: UserId) -> Dialog {
        let dialog = Dialog::open(a, b, None, Utc::now(), chrono::Duration::minutes(30));
        let unit = AtomicUnit::new()
            .guards(formation_guards(a, b))
            .ops(formation_ops(&dialog));
        assert!(store.execute(unit).await.unwrap());
        dialog
    }

    #[tokio::test]
    async fn formation_links_both_users() {
        let f = fixture();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;

        let a = f.dialogs.resolve_partner(UserId(1)).await.unwrap().unwrap();
        let b = f.dialogs.resolve_partner(UserId(2)).await.unwrap().unwrap();
        assert_eq!(a.partner, UserId(2));
        assert_eq!(b.partner, UserId(1));
        assert_eq!(a.dialog_id, dialog.dialog_id);
        assert_eq!(f.dialogs.active_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn end_dialog_releases_both_users_once() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;

        let partner = f.dialogs.end_dialog(UserId(1), EndReason::EndedByUser).await.unwrap();
        assert_eq!(partner, Some(UserId(2)));
        // The partner's own request now finds nothing to end.
        assert_eq!(
            f.dialogs.end_dialog(UserId(2), EndReason::EndedByUser).await.unwrap(),
            None
        );

        for user in [1, 2] {
            assert_eq!(f.store.get(&format!("user:{user}:state")).await.unwrap().as_deref(), Some("IDLE"));
            assert!(!f.store.exists(&format!("user:{user}:dialog_id")).await.unwrap());
        }
        let stored = f.dialogs.dialog(&dialog.dialog_id).await.unwrap().unwrap();
        assert_eq!(stored.ended_reason, Some(EndReason::EndedByUser));
        assert!(stored.ended_at.is_some());
        assert_eq!(f.dialogs.active_count().await.unwrap(), 0);

        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::DialogEnded { reason: EndReason::EndedByUser, ended_by: Some(UserId(1)), .. }
        ));
        assert!(f
            .records
            .events()
            .contains(&RecordEvent::DialogEnded(dialog.dialog_id, EndReason::EndedByUser)));
    }

    #[tokio::test(start_paused = true)]
    async fn ended_dialog_is_retained_then_dropped() {
        let f = fixture();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;
        f.dialogs.end_dialog(UserId(2), EndReason::EndedByUser).await.unwrap();

        assert!(f.dialogs.dialog(&dialog.dialog_id).await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(f.dialogs.dialog(&dialog.dialog_id).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ended_dialog_stays_live_until_its_record_is_written() {
        let f = fixture();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;
        f.records.set_failing(true);
        assert_eq!(
            f.dialogs.end_dialog(UserId(1), EndReason::EndedByUser).await.unwrap(),
            Some(UserId(2))
        );

        tokio::time::advance(Duration::from_secs(120)).await;
        let kept = f.dialogs.dialog(&dialog.dialog_id).await.unwrap().unwrap();
        assert_eq!(kept.ended_reason, Some(EndReason::EndedByUser));
        assert_eq!(f.dialogs.sweep_expired(Utc::now()).await.unwrap().persisted, 0);

        f.records.set_failing(false);
        assert_eq!(f.dialogs.sweep_expired(Utc::now()).await.unwrap().persisted, 1);
        assert!(f
            .records
            .events()
            .contains(&RecordEvent::DialogEnded(dialog.dialog_id.clone(), EndReason::EndedByUser)));
        assert!(f.store.set_members(keys::UNPERSISTED_DIALOGS).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(f.dialogs.dialog(&dialog.dialog_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dangling_pointer_heals_to_idle() {
        let f = fixture();
        f.store.set("user:3:dialog_id", "gone", None).await.unwrap();
        f.store.set("user:3:state", "IN_DIALOG", None).await.unwrap();

        assert_eq!(f.dialogs.resolve_partner(UserId(3)).await.unwrap(), None);
        assert!(!f.store.exists("user:3:dialog_id").await.unwrap());
        assert_eq!(f.store.get("user:3:state").await.unwrap().as_deref(), Some("IDLE"));
    }

    #[tokio::test]
    async fn end_without_dialog_heals_stuck_state() {
        let f = fixture();
        f.store.set("user:4:state", "IN_DIALOG", None).await.unwrap();
        assert_eq!(
            f.dialogs.end_dialog(UserId(4), EndReason::EndedByUser).await.unwrap(),
            None
        );
        assert_eq!(f.store.get("user:4:state").await.unwrap().as_deref(), Some("IDLE"));
    }

    #[tokio::test]
    async fn report_bans_partner_and_ends_dialog() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;

        let target = f.dialogs.report_partner(UserId(1), "spam").await.unwrap();
        assert_eq!(target, Some(UserId(2)));
        assert!(f.store.exists("ban:2").await.unwrap());
        assert!(!f.store.exists("ban:1").await.unwrap());

        let reports = f.records.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].target, UserId(2));
        assert_eq!(reports[0].dialog_id, dialog.dialog_id);

        let stored = f.dialogs.dialog(&dialog.dialog_id).await.unwrap().unwrap();
        assert_eq!(stored.ended_reason, Some(EndReason::Report));
        assert!(matches!(rx.recv().await.unwrap(), EngineEvent::UserBanned { user: UserId(2), .. }));
    }

    #[tokio::test]
    async fn failed_report_write_is_returned_and_dialog_stays() {
        let f = fixture();
        open(&f.store, UserId(1), UserId(2)).await;
        f.records.set_failing(true);

        let err = f.dialogs.report_partner(UserId(1), "spam").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(f.store.exists("ban:2").await.unwrap());
        assert!(f.dialogs.resolve_partner(UserId(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn touch_extends_live_dialog_only() {
        let f = fixture();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;
        let before = f.dialogs.dialog(&dialog.dialog_id).await.unwrap().unwrap().expires_at;

        assert!(f.dialogs.touch(UserId(1)).await.unwrap());
        let after = f.dialogs.dialog(&dialog.dialog_id).await.unwrap().unwrap().expires_at;
        assert!(after >= before);

        f.dialogs.end_dialog(UserId(1), EndReason::EndedByUser).await.unwrap();
        assert!(!f.dialogs.touch(UserId(1)).await.unwrap());
    }

    #[tokio::test]
    async fn sweep_ends_expired_dialogs_exactly_once() {
        let f = fixture();
        let mut rx = f.events.subscribe();
        let first = open(&f.store, UserId(1), UserId(2)).await;
        let second = open(&f.store, UserId(3), UserId(4)).await;

        let later = first.expires_at.max(second.expires_at) + chrono::Duration::seconds(1);
        assert_eq!(f.dialogs.sweep_expired(later).await.unwrap().expired, 2);
        assert_eq!(
            f.dialogs.sweep_expired(later).await.unwrap(),
            DialogSweep::default()
        );

        let stored = f.dialogs.dialog(&second.dialog_id).await.unwrap().unwrap();
        assert_eq!(stored.ended_reason, Some(EndReason::Expired));
        for _ in 0..2 {
            assert!(matches!(
                rx.recv().await.unwrap(),
                EngineEvent::DialogEnded { reason: EndReason::Expired, ended_by: None, .. }
            ));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sweep_leaves_dialogs_before_deadline() {
        let f = fixture();
        open(&f.store, UserId(1), UserId(2)).await;
        let sweep = f.dialogs.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(sweep, DialogSweep::default());
        assert_eq!(f.dialogs.active_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sweep_prunes_vanished_dialogs() {
        let f = fixture();
        f.store.set_add(keys::ACTIVE_DIALOGS, "ghost").await.unwrap();
        let sweep = f.dialogs.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(sweep.pruned, 1);
        assert_eq!(f.dialogs.active_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sweep_retires_dialog_with_inconsistent_pointers() {
        let f = fixture();
        let dialog = open(&f.store, UserId(1), UserId(2)).await;
        f.store.delete("user:2:dialog_id").await.unwrap();

        let later = dialog.expires_at + chrono::Duration::seconds(1);
        assert_eq!(f.dialogs.sweep_expired(later).await.unwrap().expired, 1);
        assert!(!f.store.exists("user:1:dialog_id").await.unwrap());
        assert_eq!(f.store.get("user:1:state").await.unwrap().as_deref(), Some("IDLE"));
        assert_eq!(f.dialogs.active_count().await.unwrap(), 0);
    }
}
