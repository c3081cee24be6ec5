/// Gossip resolver
///
/// ## Overview
///
/// Each name is served from a cache fed by a gossip subscription on the
/// name's topic. The subscription is created on the first resolve of the
/// name and lives until the resolver is dropped or the name is cancelled.
///
/// ```text
///  resolve_once(name) ──► subscriptions (tokio Mutex) ◄── validation task
///          │                     ▲                             ▲
///          └── subscribe + bootstrap (first time only)         │
///                                                     gossip MessageStream
/// ```
///
/// An incoming record replaces the cached one only if it decodes, verifies
/// against the name's public key, is not yet expired, and carries a strictly
/// greater sequence. Anything else is dropped and logged.
///
/// A name that has seen no valid update yet resolves to `NotFound`, which
/// lets a `NameSystem` fall back to the durable store.
///
/// The name's public key is fetched once, when subscribing, and kept with the
/// subscription.
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use futures::StreamExt;
use libp2p_identity::PublicKey;
use metrics::SharedMetrics;
use record::{parse_name, topic_for, NameRecord, Path};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bootstrap::Bootstrapper,
    config::DEFAULT_DEPTH_LIMIT,
    error::{NameError, NameResult, Rejection},
    routing::{MessageStream, PubSub, PublicKeyFetcher},
    validator::validate_record,
};

#[async_trait]
pub trait NameResolver: Send + Sync {
    /// Resolve a single hop. The result may itself be an `/ipns/` path.
    async fn resolve_once(&self, name: &str) -> NameResult<Path>;
}

/// Follow `/ipns/` values until a non-name path is reached.
///
/// A `depth` of 0 means unlimited. Segments trailing a name are carried over
/// to the final path, so `/ipns/A/docs` with `A -> /ipfs/Qm` yields
/// `/ipfs/Qm/docs`.
pub async fn resolve_recursive<R>(resolver: &R, name: &str, depth: usize) -> NameResult<Path>
where
    R: NameResolver + ?Sized,
{
    let mut current = name.to_string();
    let mut suffix = String::new();
    let mut remaining = depth;

    loop {
        let path = resolver.resolve_once(&current).await?;
        if !path.is_ipns() {
            return path.join(&suffix).map_err(NameError::InvalidPath);
        }
        if remaining == 1 {
            return Err(NameError::DepthLimitExceeded(name.to_string()));
        }
        if remaining > 1 {
            remaining -= 1;
        }

        suffix.insert_str(0, path.remainder());
        current = path.root().to_string();
    }
}

struct Subscription {
    public_key: PublicKey,
    record: Option<NameRecord>,
    cancel: CancellationToken,
}

struct ResolverInner {
    pubsub: Arc<dyn PubSub>,
    keys: Arc<dyn PublicKeyFetcher>,
    bootstrapper: Bootstrapper,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    cancel: CancellationToken,
    metrics: Option<SharedMetrics>,
}

pub struct PubsubResolver {
    inner: Arc<ResolverInner>,
}

impl PubsubResolver {
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        keys: Arc<dyn PublicKeyFetcher>,
        bootstrapper: Bootstrapper,
        cancel: CancellationToken,
    ) -> Self {
        Self::build(pubsub, keys, bootstrapper, cancel, None)
    }

    pub fn with_metrics(
        pubsub: Arc<dyn PubSub>,
        keys: Arc<dyn PublicKeyFetcher>,
        bootstrapper: Bootstrapper,
        cancel: CancellationToken,
        metrics: SharedMetrics,
    ) -> Self {
        Self::build(pubsub, keys, bootstrapper, cancel, Some(metrics))
    }

    fn build(
        pubsub: Arc<dyn PubSub>,
        keys: Arc<dyn PublicKeyFetcher>,
        bootstrapper: Bootstrapper,
        cancel: CancellationToken,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                pubsub,
                keys,
                bootstrapper,
                subscriptions: Mutex::new(HashMap::new()),
                cancel,
                metrics,
            }),
        }
    }

    pub async fn resolve(&self, name: &str) -> NameResult<Path> {
        self.resolve_n(name, DEFAULT_DEPTH_LIMIT).await
    }

    pub async fn resolve_n(&self, name: &str, depth: usize) -> NameResult<Path> {
        resolve_recursive(self, name, depth).await
    }

    /// Names with an active subscription, sorted.
    pub async fn subscriptions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.subscriptions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tear down the subscription of `name`. Returns whether one existed.
    pub async fn cancel(&self, name: &str) -> bool {
        let Ok(peer_id) = parse_name(name) else {
            return false;
        };
        let topic = topic_for(&peer_id);

        let mut subscriptions = self.inner.subscriptions.lock().await;
        let Some(subscription) = subscriptions.remove(&topic) else {
            return false;
        };
        subscription.cancel.cancel();
        self.inner.update_subscription_gauge(subscriptions.len());
        info!(name = %topic, "cancelled name subscription");
        true
    }

    /// Stop every validation task. Further resolves fail with `Closed`.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    #[cfg(test)]
    pub(crate) async fn cached_record(&self, name: &str) -> Option<NameRecord> {
        let topic = topic_for(&parse_name(name).ok()?);
        self.inner
            .subscriptions
            .lock()
            .await
            .get(&topic)
            .and_then(|subscription| subscription.record.clone())
    }

    #[cfg(test)]
    pub(crate) async fn receive(&self, name: &str, data: &[u8]) -> Result<u64, Rejection> {
        let topic = parse_name(name)
            .map(|peer_id| topic_for(&peer_id))
            .map_err(|_| Rejection::Unsubscribed)?;
        self.inner.receive(&topic, data).await
    }

    async fn lookup(&self, name: &str) -> NameResult<Path> {
        if self.inner.cancel.is_cancelled() {
            return Err(NameError::Closed);
        }

        let peer_id = parse_name(name).map_err(|reason| NameError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        let topic = topic_for(&peer_id);

        let mut subscriptions = self.inner.subscriptions.lock().await;

        if !subscriptions.contains_key(&topic) {
            let public_key = self
                .inner
                .keys
                .public_key(&peer_id)
                .await
                .map_err(|error| NameError::PublicKey { peer: peer_id, error })?;

            let messages = self
                .inner
                .pubsub
                .subscribe(&topic)
                .await
                .map_err(NameError::PubSub)?;

            let cancel = self.inner.cancel.child_token();
            subscriptions.insert(
                topic.clone(),
                Subscription {
                    public_key,
                    record: None,
                    cancel: cancel.clone(),
                },
            );
            self.inner.update_subscription_gauge(subscriptions.len());

            tokio::spawn(Arc::clone(&self.inner).validate_updates(
                topic.clone(),
                messages,
                cancel.clone(),
            ));

            let bootstrapper = self.inner.bootstrapper.clone();
            let bootstrap_topic = topic.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = bootstrapper.bootstrap(&bootstrap_topic) => {}
                }
            });

            info!(name = %topic, "subscribed to name");
        }

        let Some(subscription) = subscriptions.get_mut(&topic) else {
            return Err(NameError::NotFound(topic));
        };

        match &subscription.record {
            None => Err(NameError::NotFound(topic)),
            Some(record) if record.is_expired() => {
                debug!(name = %topic, sequence = record.sequence(), "purging expired record");
                subscription.record = None;
                Err(NameError::NotFound(topic))
            }
            Some(record) => Ok(record.value().clone()),
        }
    }
}

#[async_trait]
impl NameResolver for PubsubResolver {
    async fn resolve_once(&self, name: &str) -> NameResult<Path> {
        let result = self.lookup(name).await;
        if let Some(metrics) = &self.inner.metrics {
            metrics.inc_resolve(match &result {
                Ok(_) => "hit",
                Err(err) if err.is_not_found() => "not_found",
                Err(_) => "error",
            });
        }
        result
    }
}

impl Drop for PubsubResolver {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl ResolverInner {
    async fn validate_updates(
        self: Arc<Self>,
        name: String,
        mut messages: MessageStream,
        cancel: CancellationToken,
    ) {
        loop {
            let data = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(%name, "validation task stopped");
                    return;
                }
                message = messages.next() => match message {
                    Some(data) => data,
                    None => {
                        warn!(%name, "gossip subscription closed");
                        return;
                    }
                },
            };

            let outcome = match self.receive(&name, &data).await {
                Ok(sequence) => {
                    debug!(%name, sequence, "accepted name record update");
                    "accepted"
                }
                Err(rejection) => {
                    debug!(%name, %rejection, "dropped name record update");
                    rejection.label()
                }
            };
            if let Some(metrics) = &self.metrics {
                metrics.inc_gossip_update(outcome);
            }
        }
    }

    async fn receive(&self, name: &str, data: &[u8]) -> Result<u64, Rejection> {
        let mut subscriptions = self.subscriptions.lock().await;
        let subscription = subscriptions.get_mut(name).ok_or(Rejection::Unsubscribed)?;

        let record = validate_record(&subscription.public_key, data)?;

        if let Some(cached) = &subscription.record {
            if record.sequence() <= cached.sequence() {
                return Err(Rejection::StaleSequence {
                    received: record.sequence(),
                    cached: cached.sequence(),
                });
            }
        }

        let sequence = record.sequence();
        subscription.record = Some(record);
        Ok(sequence)
    }

    fn update_subscription_gauge(&self, active: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_subscriptions(active as i64);
        }
    }
}
