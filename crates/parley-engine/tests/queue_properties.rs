// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for the search queue.
//!
//! Random sequences of search, cancel, match and end requests must keep
//! the queue an exact, duplicate-free mirror of the `SEARCHING` users, and
//! every `IN_DIALOG` user paired with a partner who points back.

use proptest::prelude::*;

use parley_core::{UserId, UserState};
use parley_test_utils::TestHarness;

const USERS: i64 = 6;

#[derive(Debug, Clone, Copy)]
enum Action {
    Search(i64),
    Cancel(i64),
    Match(i64),
    End(i64),
}

fn action_strategy() -> impl Strategy<Value = Action> {
    let user = 1..=USERS;
    prop_oneof![
        3 => user.clone().prop_map(Action::Search),
        1 => user.clone().prop_map(Action::Cancel),
        3 => user.clone().prop_map(Action::Match),
        1 => user.prop_map(Action::End),
    ]
}

async fn apply(harness: &TestHarness, action: Action) {
    let engine = &harness.engine;
    match action {
        Action::Search(u) => {
            engine.begin_search(UserId(u)).await.unwrap();
        }
        Action::Cancel(u) => {
            engine.cancel_search(UserId(u)).await.unwrap();
        }
        Action::Match(u) => {
            engine.try_match(UserId(u)).await.unwrap();
        }
        Action::End(u) => {
            engine.end_dialog(UserId(u)).await.unwrap();
        }
    }
}

async fn check_invariants(harness: &TestHarness) {
    let queue = harness.engine.queue_snapshot().await.unwrap();
    let mut distinct = queue.clone();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), queue.len(), "duplicate queue entry in {queue:?}");

    for u in 1..=USERS {
        let user = UserId(u);
        let state = harness.engine.state(user).await.unwrap();
        assert_eq!(
            state == UserState::Searching,
            queue.contains(&user),
            "{user} is {state} but queue is {queue:?}"
        );
        if state == UserState::InDialog {
            let mine = harness.engine.resolve_partner(user).await.unwrap().unwrap();
            let theirs = harness
                .engine
                .resolve_partner(mine.partner)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(theirs.partner, user);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn queue_mirrors_searching_users(actions in prop::collection::vec(action_strategy(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let harness = TestHarness::new().await.unwrap();
            for action in actions {
                apply(&harness, action).await;
                check_invariants(&harness).await;
            }
        });
    }
}
