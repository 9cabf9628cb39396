// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logical key layout of the live state.

use crate::types::{DialogId, TopicId, UserId};

/// FIFO pairing queue (list of user ids).
pub const SEARCH_QUEUE: &str = "search:queue";

/// Ids of topics that may still be browsed (set).
pub const ACTIVE_TOPICS: &str = "topics:active";

/// Ids of dialogs that have not ended yet (set), scanned by the sweeper.
pub const ACTIVE_DIALOGS: &str = "dialogs:active";

/// Ended dialogs whose terminal record has not reached the record store
/// yet (set). Their hashes carry no TTL until it does.
pub const UNPERSISTED_DIALOGS: &str = "dialogs:unpersisted";

pub fn user_state(user: UserId) -> String {
    format!("user:{user}:state")
}

pub fn user_dialog(user: UserId) -> String {
    format!("user:{user}:dialog_id")
}

pub fn user_topic(user: UserId) -> String {
    format!("user:{user}:topic_id")
}

/// Last topic id shown to the user by `browse`.
pub fn user_topic_cursor(user: UserId) -> String {
    format!("user:{user}:topic_cursor")
}

pub fn dialog(id: &DialogId) -> String {
    format!("dialog:{id}")
}

pub fn topic(id: &TopicId) -> String {
    format!("topic:{id}")
}

pub fn ban(user: UserId) -> String {
    format!("ban:{user}")
}

pub fn cooldown(user: UserId) -> String {
    format!("cooldown:{user}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_documented_names() {
        let u = UserId(42);
        assert_eq!(user_state(u), "user:42:state");
        assert_eq!(user_dialog(u), "user:42:dialog_id");
        assert_eq!(user_topic(u), "user:42:topic_id");
        assert_eq!(ban(u), "ban:42");
        assert_eq!(cooldown(u), "cooldown:42");
        assert_eq!(dialog(&DialogId("abc".into())), "dialog:abc");
        assert_eq!(topic(&TopicId("t1".into())), "topic:t1");
    }
}
