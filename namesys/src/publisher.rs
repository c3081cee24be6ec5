use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libp2p_identity::Keypair;
use metrics::SharedMetrics;
use parking_lot::Mutex;
use record::{topic_for, Path};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    bootstrap::Bootstrapper,
    config::{eol_after, DEFAULT_RECORD_TTL_SECS},
    error::{NameError, NameResult},
    routing::PubSub,
    store::RecordStore,
};

#[async_trait]
pub trait NamePublisher: Send + Sync {
    /// Publish `value` under `key` with the publisher's default validity.
    async fn publish(&self, key: &Keypair, value: Path) -> NameResult<()>;

    async fn publish_with_eol(
        &self,
        key: &Keypair,
        value: Path,
        eol: DateTime<Utc>,
    ) -> NameResult<()>;
}

/// Publishes records by broadcasting them on the identity's gossip topic.
pub struct PubsubPublisher {
    store: Arc<RecordStore>,
    pubsub: Arc<dyn PubSub>,
    bootstrapper: Bootstrapper,
    bootstrapped: Mutex<HashSet<String>>,
    record_ttl: Duration,
    cancel: CancellationToken,
    metrics: Option<SharedMetrics>,
}

impl PubsubPublisher {
    pub fn new(
        store: Arc<RecordStore>,
        pubsub: Arc<dyn PubSub>,
        bootstrapper: Bootstrapper,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            pubsub,
            bootstrapper,
            bootstrapped: Mutex::new(HashSet::new()),
            record_ttl: Duration::from_secs(DEFAULT_RECORD_TTL_SECS),
            cancel,
            metrics: None,
        }
    }

    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stops pending bootstraps and rejects further publishes.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn ensure_bootstrapped(&self, topic: &str) {
        if !self.bootstrapped.lock().insert(topic.to_string()) {
            return;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => debug!(topic, "bootstrap cancelled"),
            _ = self.bootstrapper.bootstrap(topic) => {}
        }
    }

    async fn broadcast(&self, key: &Keypair, value: Path, eol: DateTime<Utc>) -> NameResult<u64> {
        if self.cancel.is_cancelled() {
            return Err(NameError::Closed);
        }

        let peer_id = key.public().to_peer_id();
        let record = self.store.issue(key, value, eol).await?;

        let topic = topic_for(&peer_id);
        self.ensure_bootstrapped(&topic).await;

        self.pubsub
            .publish(&topic, record.to_bytes())
            .await
            .map_err(NameError::PubSub)?;

        info!(
            name = %topic,
            value = %record.value(),
            sequence = record.sequence(),
            "published name record"
        );
        Ok(record.sequence())
    }

    fn record_outcome(&self, result: &NameResult<u64>) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_publish("pubsub", if result.is_ok() { "ok" } else { "error" });
        }
    }
}

#[async_trait]
impl NamePublisher for PubsubPublisher {
    async fn publish(&self, key: &Keypair, value: Path) -> NameResult<()> {
        self.publish_with_eol(key, value, eol_after(self.record_ttl)).await
    }

    async fn publish_with_eol(
        &self,
        key: &Keypair,
        value: Path,
        eol: DateTime<Utc>,
    ) -> NameResult<()> {
        let result = self.broadcast(key, value, eol).await;
        self.record_outcome(&result);
        result.map(|_| ())
    }
}
