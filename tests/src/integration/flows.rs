//! # Request/Reply Flows
//!
//! Full round trips through the bus:
//!
//! 1. **Success**: every signature algorithm, both built-in operations
//! 2. **Remote failure**: delegate errors, unknown types, refused signatures
//! 3. **Tampering**: forged replies never resolve a request
//! 4. **Liveness**: unanswered requests time out and leave nothing behind

use super::support::{eventually, server_signing_key, Harness, ALICE, BOB, CAROL, CHAIN, SERVER_ID};
use futures::future::join_all;
use iobc_client::{ClientError, RequestError};
use iobc_server::{INVALID_SIGNATURE_CODE, UNKNOWN_CHAIN_CODE, UNKNOWN_TYPE_CODE};
use shared_types::{
    ErrorDetails, KeySpecification, MessageContent, PingInput, PingOutput, Response,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn remote_details(err: ClientError) -> ErrorDetails {
    match err {
        ClientError::Request(RequestError::Remote(details)) => details,
        other => panic!("expected a remote failure, got {other:?}"),
    }
}

fn ping_content() -> MessageContent {
    MessageContent::Ping(PingInput {
        message: "hi".into(),
    })
}

// =============================================================================
// SUCCESS
// =============================================================================

#[tokio::test]
async fn test_ping_round_trip_for_every_algorithm() {
    let harness = Harness::new(WAIT);

    for user in [ALICE, BOB, CAROL] {
        let pong = timeout(WAIT, harness.client.ping(user, user)).await.unwrap().unwrap();
        assert_eq!(pong.message, user);
    }

    let stats = harness.client.registry().stats();
    assert_eq!(stats.total_registered.load(Ordering::Relaxed), 3);
    assert_eq!(stats.total_completed.load(Ordering::Relaxed), 3);
    assert_eq!(harness.client.registry().pending_count(), 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_block_number_round_trip() {
    let harness = Harness::new(WAIT);

    let first = harness.client.block_number(ALICE, CHAIN.0).await.unwrap();
    let second = harness.client.block_number(BOB, CHAIN.0).await.unwrap();
    assert_eq!((first, second), (CHAIN.1, CHAIN.1 + 1));

    harness.stop().await;
}

#[tokio::test]
async fn test_concurrent_requests_resolve_independently() {
    let harness = Harness::new(WAIT);

    let calls = (0..20).map(|i| {
        let client = &harness.client;
        async move { client.ping(ALICE, &format!("m{i}")).await }
    });
    let replies: Vec<_> = timeout(WAIT, join_all(calls)).await.unwrap();

    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(reply.unwrap().message, format!("m{i}"));
    }

    harness.stop().await;
}

// =============================================================================
// REMOTE FAILURE
// =============================================================================

#[tokio::test]
async fn test_delegate_error_reaches_caller() {
    let harness = Harness::new(WAIT);

    let err = harness.client.block_number(ALICE, "btc").await.unwrap_err();
    let details = remote_details(err);
    assert_eq!(details.code, UNKNOWN_CHAIN_CODE);
    assert_eq!(details.parameters["chainId"], "btc");

    harness.stop().await;
}

#[tokio::test]
async fn test_unknown_message_type_refused() {
    let harness = Harness::new(WAIT);

    let reply = harness
        .client
        .producer()
        .send_and_await::<MessageContent>(ALICE, "TRANSFER", ping_content())
        .await
        .unwrap();
    let err = timeout(WAIT, reply).await.unwrap().unwrap_err();

    assert_eq!(err.remote_details().unwrap().code, UNKNOWN_TYPE_CODE);
    harness.stop().await;
}

#[tokio::test]
async fn test_request_from_unverifiable_sender_refused() {
    let harness = Harness::new(WAIT);
    // Mallory can sign but nobody can verify her.
    harness
        .keys
        .set_signing_key("mallory", Some(KeySpecification::hmac_sha256("mallory", b"m")));

    let err = timeout(WAIT, harness.client.ping("mallory", "hi"))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(remote_details(err).code, INVALID_SIGNATURE_CODE);

    harness.stop().await;
}

#[tokio::test]
async fn test_failure_without_details_reported_as_unknown() {
    let harness = Harness::without_server(WAIT);

    let reply = harness
        .client
        .producer()
        .send_and_await::<PingOutput>(ALICE, "PING", ping_content())
        .await
        .unwrap();

    let mut response = Response::failure(reply.in_reply_to().clone(), ErrorDetails::placeholder());
    response.error_details = None;
    harness.publish_reply(response, &server_signing_key()).await;

    let err = timeout(WAIT, reply).await.unwrap().unwrap_err();
    let details = err.remote_details().unwrap();
    assert_eq!(details.code, "unknown");
    assert_eq!(details.message.as_deref(), Some("N/A"));
    assert!(details.parameters.is_empty());

    harness.stop().await;
}

// =============================================================================
// TAMPERING
// =============================================================================

#[tokio::test]
async fn test_forged_reply_does_not_resolve_request() {
    let harness = Harness::without_server(WAIT);

    let reply = harness
        .client
        .producer()
        .send_and_await::<PingOutput>(ALICE, "PING", ping_content())
        .await
        .unwrap();
    let key = reply.in_reply_to().clone();

    let forged_payload = MessageContent::PingReply(PingOutput {
        message: "forged".into(),
        time: 0,
    });
    let forger = KeySpecification::ed25519(SERVER_ID, [0x66u8; 32]);
    harness
        .publish_reply(Response::success(key.clone(), forged_payload), &forger)
        .await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.client.registry().is_pending(&key));

    let genuine = MessageContent::PingReply(PingOutput {
        message: "genuine".into(),
        time: 1,
    });
    harness
        .publish_reply(Response::success(key, genuine), &server_signing_key())
        .await;

    let pong = timeout(WAIT, reply).await.unwrap().unwrap();
    assert_eq!(pong.message, "genuine");

    harness.stop().await;
}

#[tokio::test]
async fn test_undecodable_reply_skipped() {
    let harness = Harness::without_server(WAIT);

    let reply = harness
        .client
        .producer()
        .send_and_await::<()>(ALICE, "PING", ping_content())
        .await
        .unwrap();
    let key = reply.in_reply_to().clone();

    harness.publish_raw_reply(b"{\"not\":\"an envelope\"}".to_vec()).await;
    harness
        .publish_reply(Response::success_empty(key), &server_signing_key())
        .await;

    timeout(WAIT, reply).await.unwrap().unwrap();
    harness.stop().await;
}

// =============================================================================
// LIVENESS
// =============================================================================

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let harness = Harness::without_server(Duration::from_millis(50));

    let err = timeout(WAIT, harness.client.ping(ALICE, "anyone?"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ClientError::Request(RequestError::Timeout { .. })));

    let registry = harness.client.registry();
    assert_eq!(registry.pending_count(), 0);
    assert_eq!(registry.stats().total_timeouts.load(Ordering::Relaxed), 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_unrouted() {
    let harness = Harness::without_server(Duration::from_millis(30));

    let reply = harness
        .client
        .producer()
        .send_and_await::<()>(ALICE, "PING", ping_content())
        .await
        .unwrap();
    let key = reply.in_reply_to().clone();
    assert!(timeout(WAIT, reply).await.unwrap().unwrap_err().is_timeout());

    harness
        .publish_reply(Response::success_empty(key), &server_signing_key())
        .await;

    let registry = harness.client.registry().clone();
    eventually("late reply counted as unrouted", || {
        registry.stats().total_unrouted.load(Ordering::Relaxed) == 1
    })
    .await;
    assert_eq!(registry.stats().total_completed.load(Ordering::Relaxed), 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_full_gateway_runtime_from_toml() {
    use gateway_runtime::{GatewayConfig, GatewayRuntime};

    let config = GatewayConfig::parse(&format!(
        r#"
        [chains]
        eth = 77

        [[keys]]
        user_id = "alice"
        secret = "{}"

        [[keys]]
        user_id = "iobc-server"
        algorithm = "ES256K"
        secret = "{}"
        "#,
        hex::encode(b"alice-secret"),
        hex::encode([0x42u8; 32]),
    ))
    .unwrap();
    config.validate().unwrap();

    let runtime = GatewayRuntime::new(config).unwrap();
    runtime.start().unwrap();

    let pong = timeout(WAIT, runtime.client().ping(ALICE, "via toml")).await.unwrap().unwrap();
    assert_eq!(pong.message, "via toml");
    assert_eq!(runtime.client().block_number(ALICE, "eth").await.unwrap(), 77);

    runtime.shutdown().await;
}
