//! Property tests for dispatch semantics
//!
//! - With no effects in flight, dispatching a sequence is a fold of the reducer
//! - Replaying a recorded script on a fresh store reproduces every snapshot
//! - Merged effects deliver each action exactly once

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use proptest::prelude::*;
use serde::Serialize;
use std::time::Duration;
use unistore_core::{Effect, Reducer};
use unistore_runtime::Store;
use unistore_testing::TestStore;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
struct Ledger {
    balance: i64,
    entries: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq)]
enum LedgerAction {
    Deposit(i8),
    Withdraw(i8),
    Reset,
    /// Fan out `n` concurrent effects, each emitting `Deposit(1)`
    FanOut(u8),
}

struct LedgerReducer;

impl Reducer for LedgerReducer {
    type State = Ledger;
    type Action = LedgerAction;
    type Environment = ();

    fn reduce(&self, state: &mut Ledger, action: LedgerAction, _env: &()) -> Effect<LedgerAction> {
        match action {
            LedgerAction::Deposit(amount) => {
                state.balance += i64::from(amount);
                state.entries.push(i64::from(amount));
                Effect::none()
            },
            LedgerAction::Withdraw(amount) => {
                state.balance -= i64::from(amount);
                state.entries.push(-i64::from(amount));
                Effect::none()
            },
            LedgerAction::Reset => {
                *state = Ledger::default();
                Effect::none()
            },
            LedgerAction::FanOut(n) => Effect::merge((0..n).map(|_| {
                Effect::future(async {
                    tokio::task::yield_now().await;
                    Some(LedgerAction::Deposit(1))
                })
            })),
        }
    }
}

fn synchronous_action() -> impl Strategy<Value = LedgerAction> {
    prop_oneof![
        4 => any::<i8>().prop_map(LedgerAction::Deposit),
        4 => any::<i8>().prop_map(LedgerAction::Withdraw),
        1 => Just(LedgerAction::Reset),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

fn fold(actions: &[LedgerAction]) -> Vec<Ledger> {
    let mut state = Ledger::default();
    actions
        .iter()
        .map(|action| {
            let _ = LedgerReducer.reduce(&mut state, action.clone(), &());
            state.clone()
        })
        .collect()
}

async fn snapshots(actions: &[LedgerAction]) -> Vec<Ledger> {
    let store = Store::new(Ledger::default(), LedgerReducer, ());
    let mut seen = Vec::with_capacity(actions.len());
    for action in actions {
        store.send(action.clone()).await.unwrap();
        seen.push(store.state(Clone::clone));
    }
    seen
}

proptest! {
    #[test]
    fn prop_dispatch_is_a_fold(actions in prop::collection::vec(synchronous_action(), 0..40)) {
        let expected = fold(&actions);
        let actual = runtime().block_on(snapshots(&actions));
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_replay_reproduces_snapshots(actions in prop::collection::vec(synchronous_action(), 0..40)) {
        let runtime = runtime();
        let first = runtime.block_on(snapshots(&actions));
        let second = runtime.block_on(snapshots(&actions));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_test_store_accepts_folded_expectations(
        actions in prop::collection::vec(synchronous_action(), 1..20)
    ) {
        let expected = fold(&actions);
        runtime().block_on(async {
            let store = TestStore::new(Ledger::default(), LedgerReducer, ());
            for (action, after) in actions.iter().zip(expected) {
                store.send(action.clone(), move |s| *s = after).await;
            }
            store.finish().await;
        });
    }

    #[test]
    fn prop_merge_delivers_each_action_once(n in 1_u8..12) {
        runtime().block_on(async {
            let store = TestStore::new(Ledger::default(), LedgerReducer, ());
            store.send(LedgerAction::FanOut(n), |_| {}).await;

            for i in 1..=i64::from(n) {
                store
                    .receive_with_timeout(LedgerAction::Deposit(1), Duration::from_secs(1), move |s| {
                        s.balance = i;
                        s.entries.push(1);
                    })
                    .await;
            }
            store.finish().await;
        });
    }
}
