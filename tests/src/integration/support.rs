//! # Test Harness
//!
//! A client and (optionally) a server on one in-memory bus, with one user
//! per supported signature algorithm.

use iobc_client::{ClientConfig, IobcClient};
use iobc_server::{
    BlockNumberDelegate, DelegateMatcher, InboundProcessor, PingDelegate, RequestConsumer,
    ServerConfig,
};
use shared_bus::{BusPublisher, InMemoryBus, OutboundRecord, OUTBOUND_TOPIC};
use shared_types::{
    AuthenticatedMessage, KeySpecification, MessageContent, Response, SimpleKeyProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Server identity used by the harness.
pub const SERVER_ID: &str = "iobc-server";

/// HMAC-SHA256 user.
pub const ALICE: &str = "alice";
/// Ed25519 user.
pub const BOB: &str = "bob";
/// secp256k1 user.
pub const CAROL: &str = "carol";

/// Chain served by the stand-in connector, and its starting height.
pub const CHAIN: (&str, u64) = ("eth", 10);

pub fn server_signing_key() -> KeySpecification {
    KeySpecification::ed25519(SERVER_ID, [0x5Au8; 32])
}

fn install(keys: &SimpleKeyProvider, signing: KeySpecification) {
    let user_id = signing.key_id().to_string();
    let verifying = signing.to_verifying_key().unwrap();
    keys.set_signing_key(user_id.clone(), Some(signing));
    keys.set_verifying_key(user_id, Some(verifying));
}

pub struct Harness {
    pub bus: Arc<InMemoryBus>,
    pub keys: Arc<SimpleKeyProvider>,
    pub client: IobcClient,
    pub server: Option<Arc<InboundProcessor>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Harness {
    /// Client and server, requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::build(timeout, true)
    }

    /// Client only. Replies must be published by the test.
    pub fn without_server(timeout: Duration) -> Self {
        Self::build(timeout, false)
    }

    fn build(timeout: Duration, with_server: bool) -> Self {
        let bus = Arc::new(InMemoryBus::new());
        let keys = Arc::new(SimpleKeyProvider::new());
        install(&keys, KeySpecification::hmac_sha256(ALICE, b"alice-secret"));
        install(&keys, KeySpecification::ed25519(BOB, [0x0Bu8; 32]));
        install(&keys, KeySpecification::es256k(CAROL, [0x0Cu8; 32]));
        install(&keys, server_signing_key());

        let (shutdown, rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let server = with_server.then(|| {
            let delegates = DelegateMatcher::new()
                .with(Arc::new(PingDelegate))
                .with(Arc::new(BlockNumberDelegate::new().with_chain(CHAIN.0, CHAIN.1)));
            Arc::new(InboundProcessor::new(
                ServerConfig::default(),
                keys.clone(),
                Arc::new(delegates),
                bus.clone(),
            ))
        });
        if let Some(server) = &server {
            tasks.extend(
                RequestConsumer::new(server.clone())
                    .start(bus.as_ref(), rx.clone())
                    .unwrap(),
            );
        }

        let client = IobcClient::new(client_config(timeout), bus.clone(), keys.clone());
        tasks.extend(client.start(bus.as_ref(), rx).unwrap());

        Self {
            bus,
            keys,
            client,
            server,
            shutdown,
            tasks,
        }
    }

    /// Another client on the same bus sharing the same keys.
    pub fn second_client(&mut self) -> IobcClient {
        let client = IobcClient::new(
            client_config(Duration::from_secs(5)),
            self.bus.clone(),
            self.keys.clone(),
        );
        self.tasks.extend(
            client
                .start(self.bus.as_ref(), self.shutdown.subscribe())
                .unwrap(),
        );
        client
    }

    /// Publish `response` on the reply topic as if the server sent it,
    /// signed with `key`.
    pub async fn publish_reply(&self, response: Response, key: &KeySpecification) -> Vec<u8> {
        let mut reply =
            AuthenticatedMessage::new(SERVER_ID, "PING", MessageContent::Response(response));
        reply.sign(key).unwrap();
        let bytes = reply.to_bytes().unwrap();
        self.publish_raw_reply(bytes.clone()).await;
        bytes
    }

    /// Publish raw bytes on the reply topic.
    pub async fn publish_raw_reply(&self, bytes: Vec<u8>) {
        self.bus
            .publish(OutboundRecord::new(OUTBOUND_TOPIC, SERVER_ID, bytes))
            .await
            .unwrap();
    }

    /// Signal shutdown and wait for every consumer.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

fn client_config(timeout: Duration) -> ClientConfig {
    ClientConfig {
        request_timeout: timeout,
        sweep_interval: Duration::from_millis(10),
        ..ClientConfig::default()
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
