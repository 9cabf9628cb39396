// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder every call is
//! a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

use parley_core::EndReason;

/// Register all Parley metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("parley_matches_total", "Dialogs formed, by pairing source");
    describe_counter!("parley_searches_started_total", "Searches entered into the queue");
    describe_counter!("parley_search_timeouts_total", "Searches that hit the deadline unmatched");
    describe_counter!("parley_dialogs_ended_total", "Dialogs terminated, by reason");
    describe_counter!("parley_reports_total", "Abuse reports filed");
    describe_counter!("parley_topics_created_total", "Topics published");
    describe_counter!(
        "parley_stale_queue_entries_total",
        "Queue entries discarded because their owner stopped searching"
    );
    describe_gauge!("parley_queue_length", "Entries in the pairing queue");
    describe_gauge!("parley_active_dialogs", "Dialogs that have not ended");
    describe_histogram!(
        "parley_search_wait_seconds",
        "Time from search start to match in seconds"
    );
}

/// Record a formed dialog. `source` is `queue` or `topic`.
pub fn record_match(source: &'static str) {
    metrics::counter!("parley_matches_total", "source" => source).increment(1);
}

pub fn record_search_started() {
    metrics::counter!("parley_searches_started_total").increment(1);
}

pub fn record_search_timeout() {
    metrics::counter!("parley_search_timeouts_total").increment(1);
}

pub fn record_dialog_ended(reason: EndReason) {
    metrics::counter!("parley_dialogs_ended_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_report() {
    metrics::counter!("parley_reports_total").increment(1);
}

pub fn record_topic_created() {
    metrics::counter!("parley_topics_created_total").increment(1);
}

/// Record queue entries dropped during a scan.
pub fn record_stale_entries(count: u64) {
    if count > 0 {
        metrics::counter!("parley_stale_queue_entries_total").increment(count);
    }
}

pub fn set_queue_length(len: usize) {
    metrics::gauge!("parley_queue_length").set(len as f64);
}

pub fn set_active_dialogs(count: usize) {
    metrics::gauge!("parley_active_dialogs").set(count as f64);
}

/// Record how long a search waited before it was matched.
pub fn record_search_wait(seconds: f64) {
    metrics::histogram!("parley_search_wait_seconds").record(seconds);
}
