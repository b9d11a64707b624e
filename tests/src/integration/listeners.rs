//! # Listener Fan-Out
//!
//! Every verified reply reaches every registered listener of every client
//! on the bus, whether or not that client asked for it.

use super::support::{eventually, server_signing_key, Harness, ALICE, BOB};
use iobc_client::{Extended, ExtendedListener, IobcListener, ListenerError};
use parking_lot::Mutex;
use shared_types::{AuthenticatedMessage, ErrorDetails, InReplyTo, MessageContent, Response};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Counting(AtomicUsize);

impl Counting {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl IobcListener for Counting {
    fn accept(&self, _message: &AuthenticatedMessage) -> Result<(), ListenerError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Panicking;

impl IobcListener for Panicking {
    fn accept(&self, _message: &AuthenticatedMessage) -> Result<(), ListenerError> {
        panic!("listener bug");
    }
}

struct Failing;

impl IobcListener for Failing {
    fn accept(&self, _message: &AuthenticatedMessage) -> Result<(), ListenerError> {
        Err(ListenerError::new("rejected"))
    }
}

#[derive(Default)]
struct Outcomes {
    successes: Mutex<Vec<(InReplyTo, String, Option<MessageContent>)>>,
    failures: Mutex<Vec<(InReplyTo, ErrorDetails)>>,
}

/// Records routed outcomes into a shared `Outcomes`.
struct Recorder(Arc<Outcomes>);

impl ExtendedListener for Recorder {
    fn accept_success(
        &self,
        in_reply_to: &InReplyTo,
        message_type: &str,
        result: Option<&MessageContent>,
    ) -> Result<(), ListenerError> {
        self.0
            .successes
            .lock()
            .push((in_reply_to.clone(), message_type.to_string(), result.cloned()));
        Ok(())
    }

    fn accept_failure(
        &self,
        in_reply_to: &InReplyTo,
        _message_type: &str,
        details: &ErrorDetails,
    ) -> Result<(), ListenerError> {
        self.0.failures.lock().push((in_reply_to.clone(), details.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn test_listener_faults_do_not_affect_resolution() {
    let harness = Harness::new(WAIT);
    let counting = Arc::new(Counting::default());
    let listeners = harness.client.listeners();
    listeners.add_listener(Arc::new(Panicking));
    listeners.add_listener(Arc::new(Failing));
    listeners.add_listener(counting.clone());

    let pong = timeout(WAIT, harness.client.ping(ALICE, "still here"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pong.message, "still here");

    // Listeners run before the request is completed.
    assert_eq!(counting.count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_replies_visible_to_every_client() {
    let mut harness = Harness::new(WAIT);
    let observer = harness.second_client();
    let seen = Arc::new(Counting::default());
    observer.listeners().add_listener(seen.clone());

    harness.client.ping(ALICE, "one").await.unwrap();
    harness.client.ping(BOB, "two").await.unwrap();

    eventually("observer saw both replies", || seen.count() == 2).await;
    assert_eq!(observer.registry().pending_count(), 0);
    assert_eq!(
        observer.registry().stats().total_unrouted.load(Ordering::Relaxed),
        2
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_managed_ping_delivered_to_extended_listener() {
    let harness = Harness::new(WAIT);
    let outcomes = Arc::new(Outcomes::default());
    harness
        .client
        .listeners()
        .add_listener(Arc::new(Extended(Recorder(outcomes.clone()))));

    let key = harness.client.ping_managed(ALICE, "managed").await.unwrap();

    eventually("managed reply delivered", || !outcomes.successes.lock().is_empty()).await;
    let successes = outcomes.successes.lock();
    let (in_reply_to, message_type, result) = &successes[0];
    assert_eq!(in_reply_to, &key);
    assert_eq!(message_type, "PING");
    assert!(matches!(result, Some(MessageContent::PingReply(p)) if p.message == "managed"));
    drop(successes);

    harness.stop().await;
}

#[tokio::test]
async fn test_extended_listener_receives_placeholder_for_bare_failure() {
    let harness = Harness::without_server(WAIT);
    let outcomes = Arc::new(Outcomes::default());
    harness
        .client
        .listeners()
        .add_listener(Arc::new(Extended(Recorder(outcomes.clone()))));

    let key = InReplyTo::new(ALICE, "someone-elses-request".into());
    let mut response = Response::failure(key.clone(), ErrorDetails::placeholder());
    response.error_details = None;
    harness.publish_reply(response, &server_signing_key()).await;

    eventually("failure delivered", || !outcomes.failures.lock().is_empty()).await;
    let failures = outcomes.failures.lock();
    assert_eq!(failures[0].0, key);
    assert_eq!(failures[0].1.code, "unknown");
    drop(failures);

    harness.stop().await;
}

#[tokio::test]
async fn test_redelivered_reply_seen_once() {
    let harness = Harness::without_server(WAIT);
    let counting = Arc::new(Counting::default());
    harness.client.listeners().add_listener(counting.clone());

    let key = InReplyTo::new(ALICE, "m-1".into());
    let bytes = harness
        .publish_reply(Response::success_empty(key), &server_signing_key())
        .await;
    harness.publish_raw_reply(bytes).await;

    eventually("first copy delivered", || counting.count() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(counting.count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    let harness = Harness::new(WAIT);
    let counting = Arc::new(Counting::default());
    let handle: Arc<dyn IobcListener> = counting.clone();
    let listeners = harness.client.listeners();

    assert!(listeners.add_listener(handle.clone()));
    assert!(!listeners.add_listener(handle.clone()));
    harness.client.ping(ALICE, "a").await.unwrap();
    assert_eq!(counting.count(), 1);

    assert!(listeners.remove_listener(&handle));
    harness.client.ping(ALICE, "b").await.unwrap();
    assert_eq!(counting.count(), 1);

    harness.stop().await;
}
