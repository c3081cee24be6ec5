//! Periodic refresh of records in the durable value store.
//!
//! Value store entries expire, so every interval each locally held name is
//! re-signed with its current sequence and a fresh end of life, then put
//! back. The node identity goes first, then every keystore key by name.
//! Gossip is not involved: listeners only care about new sequences.
use std::{sync::Arc, time::Duration};

use libp2p_identity::Keypair;
use metrics::SharedMetrics;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{eol_after, DEFAULT_RECORD_LIFETIME_SECS, DEFAULT_REPUBLISH_INTERVAL_SECS},
    error::{NameError, NameResult},
    keystore::Keystore,
    routing::ValueStore,
    routing_namesys::put_record_to_routing,
    store::RecordStore,
};

pub struct Republisher {
    values: Arc<dyn ValueStore>,
    store: Arc<RecordStore>,
    identity: Keypair,
    keystore: Option<Arc<dyn Keystore>>,
    interval: Duration,
    record_lifetime: Duration,
    metrics: Option<SharedMetrics>,
}

impl Republisher {
    pub fn new(
        values: Arc<dyn ValueStore>,
        store: Arc<RecordStore>,
        identity: Keypair,
        keystore: Option<Arc<dyn Keystore>>,
    ) -> Self {
        Self {
            values,
            store,
            identity,
            keystore,
            interval: Duration::from_secs(DEFAULT_REPUBLISH_INTERVAL_SECS),
            record_lifetime: Duration::from_secs(DEFAULT_RECORD_LIFETIME_SECS),
            metrics: None,
        }
    }

    /// A zero interval is ignored and the current one kept.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if interval.is_zero() {
            warn!("ignoring zero republish interval");
        } else {
            self.interval = interval;
        }
        self
    }

    pub fn with_record_lifetime(mut self, lifetime: Duration) -> Self {
        self.record_lifetime = lifetime;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Republish every `interval` until cancelled. The first cycle runs one
    /// interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "republisher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("republisher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.republish_entries().await {
                        Ok(count) => debug!(count, "republish cycle finished"),
                        Err(err) => warn!("republish cycle aborted: {err}"),
                    }
                }
            }
        }
    }

    /// One republish cycle. Returns how many names were refreshed.
    ///
    /// The first failing key aborts the rest of the cycle.
    pub async fn republish_entries(&self) -> NameResult<usize> {
        let result = self.republish_all().await;
        if let Some(metrics) = &self.metrics {
            metrics.inc_republish(if result.is_ok() { "ok" } else { "error" });
        }
        result
    }

    async fn republish_all(&self) -> NameResult<usize> {
        let mut refreshed = usize::from(self.republish_entry(&self.identity).await?);

        if let Some(keystore) = &self.keystore {
            for name in keystore.list().map_err(NameError::Keystore)? {
                let key = keystore.get(&name).map_err(NameError::Keystore)?;
                refreshed += usize::from(self.republish_entry(&key).await?);
            }
        }
        Ok(refreshed)
    }

    /// Refresh one key. Keys that never published are skipped.
    async fn republish_entry(&self, key: &Keypair) -> NameResult<bool> {
        let peer_id = key.public().to_peer_id();
        let Some(record) = self.store.get(&peer_id)? else {
            debug!(%peer_id, "nothing to republish");
            return Ok(false);
        };

        let refreshed = record.refreshed(key, eol_after(self.record_lifetime))?;
        put_record_to_routing(self.values.as_ref(), key, &refreshed).await?;

        debug!(%peer_id, sequence = refreshed.sequence(), "republished name record");
        Ok(true)
    }
}
