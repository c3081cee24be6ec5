/// Topic bootstrap
///
/// Gossip only reaches peers that share a mesh with us, so before the first
/// publish on a topic, and when a topic is first subscribed, the node meets
/// other participants through content routing:
///
/// 1. Announce itself as a provider of the topic's rendezvous key
/// 2. Search for other providers of the same key, bounded in time and count
/// 3. Dial every provider found, except itself, each dial bounded in time
///
/// Every step is best effort. Failures are logged and never surface to the
/// publish or resolve that triggered the bootstrap.
use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use futures::StreamExt;
use libp2p_identity::PeerId;
use metrics::SharedMetrics;
use record::RendezvousKey;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{
    config::{
        DEFAULT_BOOTSTRAP_CONNECT_TIMEOUT_SECS, DEFAULT_BOOTSTRAP_FIND_TIMEOUT_SECS,
        DEFAULT_BOOTSTRAP_PROVIDER_LIMIT,
    },
    routing::{ContentRouting, PeerConnector},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub find_timeout: Duration,
    pub connect_timeout: Duration,
    pub provider_limit: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            find_timeout: Duration::from_secs(DEFAULT_BOOTSTRAP_FIND_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_BOOTSTRAP_CONNECT_TIMEOUT_SECS),
            provider_limit: DEFAULT_BOOTSTRAP_PROVIDER_LIMIT,
        }
    }
}

/// Outcome of one bootstrap, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    pub provided: bool,
    pub providers: usize,
    pub connected: usize,
    pub failed: usize,
}

type ConnectAttempts = JoinSet<(PeerId, Result<()>)>;

#[derive(Clone)]
pub struct Bootstrapper {
    routing: Arc<dyn ContentRouting>,
    connector: Arc<dyn PeerConnector>,
    config: BootstrapConfig,
    metrics: Option<SharedMetrics>,
}

impl Bootstrapper {
    pub fn new(
        routing: Arc<dyn ContentRouting>,
        connector: Arc<dyn PeerConnector>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            routing,
            connector,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub async fn bootstrap(&self, topic: &str) -> BootstrapReport {
        let key = RendezvousKey::for_topic(topic);
        let mut report = BootstrapReport::default();

        match self.routing.provide(&key).await {
            Ok(()) => report.provided = true,
            Err(err) => warn!(topic, %key, "failed to announce topic provider: {err:#}"),
        }

        let mut attempts = ConnectAttempts::new();
        match tokio::time::timeout(
            self.config.find_timeout,
            self.dial_providers(&key, &mut attempts),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(topic, "provider search failed: {err:#}"),
            Err(_) => debug!(topic, "provider search timed out"),
        }
        report.providers = attempts.len();

        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((peer_id, Ok(()))) => {
                    debug!(topic, %peer_id, "connected to topic provider");
                    report.connected += 1;
                    self.record_connection("ok");
                }
                Ok((peer_id, Err(err))) => {
                    debug!(topic, %peer_id, "failed to connect to topic provider: {err:#}");
                    report.failed += 1;
                    self.record_connection("error");
                }
                Err(err) => {
                    warn!(topic, "connect task failed: {err}");
                    report.failed += 1;
                    self.record_connection("error");
                }
            }
        }

        debug!(topic, ?report, "topic bootstrap finished");
        report
    }

    async fn dial_providers(&self, key: &RendezvousKey, attempts: &mut ConnectAttempts) -> Result<()> {
        let local = self.routing.local_peer_id();
        let mut providers = self
            .routing
            .find_providers(key, self.config.provider_limit)
            .await?;

        while let Some(peer_id) = providers.next().await {
            if peer_id == local {
                continue;
            }
            if attempts.len() >= self.config.provider_limit {
                break;
            }

            let connector = Arc::clone(&self.connector);
            let timeout = self.config.connect_timeout;
            attempts.spawn(async move {
                let result = match tokio::time::timeout(timeout, connector.connect(peer_id)).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("connect timed out after {timeout:?}")),
                };
                (peer_id, result)
            });
        }
        Ok(())
    }

    fn record_connection(&self, result: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_bootstrap_connection(result);
        }
    }
}
