// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background expiry worker.
//!
//! Runs on a fixed interval independent of user traffic, ending inactive
//! dialogs, retiring expired topics and reclaiming expired keys from the
//! state store. Every action re-checks liveness inside its own unit, so
//! sweeps are safe to run next to request handlers and on several
//! instances at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{ParleyError, StateStore};

use crate::dialogs::{DialogManager, DialogSweep};
use crate::matchmaking::Matchmaker;
use crate::recording;
use crate::topics::TopicManager;

/// Totals of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub dialogs: DialogSweep,
    pub topics_retired: usize,
    pub keys_purged: usize,
}

/// Periodic expiry runner.
pub struct ExpirySweeper {
    store: Arc<dyn StateStore>,
    dialogs: DialogManager,
    topics: TopicManager,
    matchmaker: Matchmaker,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn StateStore>,
        dialogs: DialogManager,
        topics: TopicManager,
        matchmaker: Matchmaker,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            dialogs,
            topics,
            matchmaker,
            interval,
        }
    }

    /// Sweeps every interval until `cancel` fires. The first sweep runs
    /// immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("expiry sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        warn!(error = %e, "expiry sweep failed, retrying next tick");
                    }
                }
            }
        }
    }

    /// One pass: dialogs first, then topics, then expired keys, then gauges.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, ParleyError> {
        let dialogs = self.dialogs.sweep_expired(now).await?;
        let topics_retired = self.topics.sweep_expired(now).await?;
        let report = SweepReport {
            dialogs,
            topics_retired,
            keys_purged: self.store.purge_expired().await?,
        };

        recording::set_queue_length(self.matchmaker.queue_len().await?);
        recording::set_active_dialogs(self.dialogs.active_count().await?);

        if report != SweepReport::default() {
            debug!(
                dialogs_expired = report.dialogs.expired,
                dialogs_pruned = report.dialogs.pruned,
                topics_retired = report.topics_retired,
                keys_purged = report.keys_purged,
                "sweep complete"
            );
        }
        Ok(report)
    }
}
