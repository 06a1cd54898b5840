//! Integration tests for stream effects in the Store runtime
//!
//! Tests validate that streams are executed in order, items are fed back
//! to the reducer, and streams stop when their scope is cancelled.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use futures::stream;
use std::time::Duration;
use unistore_core::{effect::Effect, reducer::Reducer};
use unistore_runtime::Store;

#[derive(Clone, Debug, Default, PartialEq)]
struct StreamState {
    items_received: Vec<String>,
    completed: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum StreamAction {
    StartStream { items: Vec<String> },
    StartTicking { interval: Duration },
    StopTicking,
    StartSequential,
    StreamItem { text: String },
    StreamComplete,
}

#[derive(Clone)]
struct StreamReducer;

impl Reducer for StreamReducer {
    type State = StreamState;
    type Action = StreamAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> Effect<Self::Action> {
        match action {
            StreamAction::StartStream { items } => Effect::stream(stream::iter(
                items
                    .into_iter()
                    .map(|text| StreamAction::StreamItem { text })
                    .chain(std::iter::once(StreamAction::StreamComplete)),
            )),
            StreamAction::StartTicking { interval } => Effect::stream(async_stream::stream! {
                let mut tick = 0_u32;
                loop {
                    tokio::time::sleep(interval).await;
                    tick += 1;
                    yield StreamAction::StreamItem { text: format!("tick{tick}") };
                }
            })
            .cancellable("ticker"),
            StreamAction::StopTicking => Effect::cancel("ticker"),
            StreamAction::StartSequential => {
                let batch = |prefix: &'static str| {
                    Effect::stream(async_stream::stream! {
                        for i in 0..3 {
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            yield StreamAction::StreamItem { text: format!("{prefix}{i}") };
                        }
                    })
                };
                Effect::concatenate([
                    batch("a"),
                    batch("b"),
                    Effect::send(StreamAction::StreamComplete),
                ])
            },
            StreamAction::StreamItem { text } => {
                state.items_received.push(text);
                Effect::none()
            },
            StreamAction::StreamComplete => {
                state.completed = true;
                Effect::none()
            },
        }
    }
}

fn new_store() -> Store<StreamState, StreamAction, (), StreamReducer> {
    Store::new(StreamState::default(), StreamReducer, ())
}

#[tokio::test]
async fn test_stream_basic_execution() {
    let store = new_store();

    let mut handle = store
        .send(StreamAction::StartStream {
            items: vec!["item1".to_string(), "item2".to_string(), "item3".to_string()],
        })
        .await
        .unwrap();
    handle.wait().await;

    let items = store.state(|s| s.items_received.clone());
    assert_eq!(items, vec!["item1", "item2", "item3"]);
    assert!(store.state(|s| s.completed));
}

#[tokio::test]
async fn test_stream_empty() {
    let store = new_store();

    let mut handle = store
        .send(StreamAction::StartStream { items: vec![] })
        .await
        .unwrap();
    handle.wait().await;

    // Only the completion marker came through
    assert!(store.state(|s| s.items_received.is_empty()));
    assert!(store.state(|s| s.completed));
}

#[tokio::test]
async fn test_stream_large_volume() {
    let store = new_store();
    let items: Vec<String> = (0..100).map(|i| format!("item{i}")).collect();

    let mut handle = store
        .send(StreamAction::StartStream {
            items: items.clone(),
        })
        .await
        .unwrap();
    handle
        .wait_with_timeout(Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(store.state(|s| s.items_received.clone()), items);
}

#[tokio::test]
async fn test_concatenated_streams_do_not_interleave() {
    let store = new_store();

    store.send(StreamAction::StartSequential).await.unwrap();
    store.wait_for_idle(Duration::from_secs(1)).await.unwrap();

    assert_eq!(
        store.state(|s| s.items_received.clone()),
        vec!["a0", "a1", "a2", "b0", "b1", "b2"]
    );
    assert!(store.state(|s| s.completed));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_stream_stops_emitting() {
    let store = new_store();

    store
        .send(StreamAction::StartTicking {
            interval: Duration::from_secs(1),
        })
        .await
        .unwrap();
    assert_eq!(store.cancellation_ids().len(), 1);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(
        store.state(|s| s.items_received.clone()),
        vec!["tick1", "tick2", "tick3"]
    );

    store.send(StreamAction::StopTicking).await.unwrap();
    store.wait_for_idle(Duration::from_secs(1)).await.unwrap();
    assert!(store.cancellation_ids().is_empty());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.state(|s| s.items_received.len()), 3);
}

#[tokio::test]
async fn test_concurrent_streams() {
    let store = new_store();

    let mut first = store
        .send(StreamAction::StartStream {
            items: vec!["x1".to_string(), "x2".to_string()],
        })
        .await
        .unwrap();
    let mut second = store
        .send(StreamAction::StartStream {
            items: vec!["y1".to_string(), "y2".to_string()],
        })
        .await
        .unwrap();
    first.wait().await;
    second.wait().await;

    let items = store.state(|s| s.items_received.clone());
    assert_eq!(items.len(), 4);
    // Each stream keeps its own order even when they interleave
    let xs: Vec<_> = items.iter().filter(|i| i.starts_with('x')).collect();
    let ys: Vec<_> = items.iter().filter(|i| i.starts_with('y')).collect();
    assert_eq!(xs, vec!["x1", "x2"]);
    assert_eq!(ys, vec!["y1", "y2"]);
}
