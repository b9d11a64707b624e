//! # Gateway Runtime
//!
//! Puts a client and a server on one in-process bus.
//!
//! ## Startup Sequence
//!
//! 1. Build the key provider from configuration
//! 2. Create the bus, the delegate set and both protocol sides
//! 3. Subscribe the request consumer, then the reply consumer and sweep
//!
//! Consumers subscribe before anything is published, so no request sent
//! after `start` returns can be missed.

use crate::config::{ConfigError, GatewayConfig};
use iobc_client::IobcClient;
use iobc_server::{
    BlockNumberDelegate, DelegateMatcher, InboundProcessor, PingDelegate, RequestConsumer,
};
use parking_lot::Mutex;
use shared_bus::{InMemoryBus, SubscriptionError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for consumer tasks before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot subscribe: {0}")]
    Subscription(#[from] SubscriptionError),

    #[error("Runtime already started")]
    AlreadyStarted,
}

/// A running gateway.
pub struct GatewayRuntime {
    config: GatewayConfig,
    bus: Arc<InMemoryBus>,
    client: Arc<IobcClient>,
    server: Arc<InboundProcessor>,
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayRuntime {
    /// Wire a gateway from validated configuration. Nothing runs until
    /// `start`.
    pub fn new(config: GatewayConfig) -> Result<Self, RuntimeError> {
        let keys = Arc::new(config.key_provider()?);
        let bus = Arc::new(InMemoryBus::with_config(config.bus.clone()));

        let connector = config
            .chains
            .iter()
            .fold(BlockNumberDelegate::new(), |delegate, (chain, height)| {
                delegate.with_chain(chain.clone(), *height)
            });
        let delegates = Arc::new(
            DelegateMatcher::new()
                .with(Arc::new(PingDelegate))
                .with(Arc::new(connector)),
        );

        let server = Arc::new(InboundProcessor::new(
            config.server.clone(),
            keys.clone(),
            delegates,
            bus.clone(),
        ));
        let client = Arc::new(IobcClient::new(config.client.clone(), bus.clone(), keys));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            bus,
            client,
            server,
            tasks: Mutex::new(None),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Start both protocol sides.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }

        let mut handles = RequestConsumer::new(Arc::clone(&self.server))
            .start(self.bus.as_ref(), self.shutdown_rx.clone())?;
        handles.extend(self.client.start(self.bus.as_ref(), self.shutdown_rx.clone())?);

        info!(
            partitions = self.bus.config().partitions,
            server_id = %self.config.server.server_id,
            tasks = handles.len(),
            "Gateway started"
        );
        *tasks = Some(handles);
        Ok(())
    }

    /// Stop every task and close the bus.
    ///
    /// ## Shutdown Sequence
    ///
    /// 1. Signal shutdown to all consumers
    /// 2. Wait for them, up to a grace period
    /// 3. Close the bus
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }

        let handles = self.tasks.lock().take().unwrap_or_default();
        let joined = tokio::time::timeout(SHUTDOWN_GRACE, join_consumers(handles)).await;
        if joined.is_err() {
            warn!("Consumers did not stop within {:?}", SHUTDOWN_GRACE);
        }

        self.bus.close();
        info!("Shutdown complete");
    }

    /// The caller side.
    pub fn client(&self) -> &Arc<IobcClient> {
        &self.client
    }

    /// The gateway side.
    pub fn server(&self) -> &Arc<InboundProcessor> {
        &self.server
    }

    /// The bus both sides share.
    pub fn bus(&self) -> &Arc<InMemoryBus> {
        &self.bus
    }

    /// The configuration this runtime was built from.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn join_consumers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!("Consumer task failed: {}", e);
        }
    }
}
