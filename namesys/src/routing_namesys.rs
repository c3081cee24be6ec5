//! Publication and resolution through the durable value store.
use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libp2p_identity::Keypair;
use metrics::SharedMetrics;
use record::{parse_name, NameKeys, NameRecord, Path};
use tracing::{debug, info};

use crate::{
    config::{eol_after, DEFAULT_RECORD_TTL_SECS},
    error::{NameError, NameResult, Rejection},
    publisher::NamePublisher,
    resolver::NameResolver,
    routing::{PublicKeyFetcher, ValueStore},
    store::RecordStore,
    validator::{select_record, Selection},
};

/// Put `record` under the identity's `/ipns/` key and its public key under `/pk/`.
pub async fn put_record_to_routing(
    values: &dyn ValueStore,
    key: &Keypair,
    record: &NameRecord,
) -> NameResult<()> {
    let public_key = key.public();
    let keys = NameKeys::for_peer(&public_key.to_peer_id());

    values
        .put_value(&keys.ipns, record.to_bytes())
        .await
        .map_err(NameError::Routing)?;
    values
        .put_value(&keys.public_key, public_key.encode_protobuf())
        .await
        .map_err(NameError::Routing)?;
    Ok(())
}

pub struct RoutingPublisher {
    store: Arc<RecordStore>,
    values: Arc<dyn ValueStore>,
    record_ttl: Duration,
    metrics: Option<SharedMetrics>,
}

impl RoutingPublisher {
    pub fn new(store: Arc<RecordStore>, values: Arc<dyn ValueStore>) -> Self {
        Self {
            store,
            values,
            record_ttl: Duration::from_secs(DEFAULT_RECORD_TTL_SECS),
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

    async fn put(&self, key: &Keypair, value: Path, eol: DateTime<Utc>) -> NameResult<()> {
        let record = self.store.issue(key, value, eol).await?;
        put_record_to_routing(self.values.as_ref(), key, &record).await?;

        info!(
            peer_id = %key.public().to_peer_id(),
            value = %record.value(),
            sequence = record.sequence(),
            "stored name record in routing"
        );
        Ok(())
    }
}

#[async_trait]
impl NamePublisher for RoutingPublisher {
    async fn publish(&self, key: &Keypair, value: Path) -> NameResult<()> {
        self.publish_with_eol(key, value, eol_after(self.record_ttl)).await
    }

    async fn publish_with_eol(
        &self,
        key: &Keypair,
        value: Path,
        eol: DateTime<Utc>,
    ) -> NameResult<()> {
        let result = self.put(key, value, eol).await;
        if let Some(metrics) = &self.metrics {
            metrics.inc_publish("routing", if result.is_ok() { "ok" } else { "error" });
        }
        result
    }
}

pub struct RoutingResolver {
    values: Arc<dyn ValueStore>,
    keys: Arc<dyn PublicKeyFetcher>,
}

impl RoutingResolver {
    pub fn new(values: Arc<dyn ValueStore>, keys: Arc<dyn PublicKeyFetcher>) -> Self {
        Self { values, keys }
    }
}

#[async_trait]
impl NameResolver for RoutingResolver {
    async fn resolve_once(&self, name: &str) -> NameResult<Path> {
        let peer_id = parse_name(name).map_err(|reason| NameError::InvalidName {
            name: name.to_string(),
            reason,
        })?;

        let candidates = self
            .values
            .get_values(&NameKeys::for_peer(&peer_id).ipns)
            .await
            .map_err(NameError::Routing)?;
        if candidates.is_empty() {
            return Err(NameError::NotFound(name.to_string()));
        }

        let public_key = self
            .keys
            .public_key(&peer_id)
            .await
            .map_err(|error| NameError::PublicKey { peer: peer_id, error })?;

        let Selection { best, rejected } = select_record(&public_key, &candidates);
        if let Some(record) = best {
            if !rejected.is_empty() {
                debug!(%peer_id, rejected = rejected.len(), "ignored invalid routing candidates");
            }
            return Ok(record.value().clone());
        }

        // Nothing usable: surface a forged or malformed candidate, expired
        // ones just mean the name is gone.
        for rejection in rejected {
            match rejection {
                Rejection::Malformed(err) => return Err(NameError::Record(err)),
                Rejection::BadSignature => return Err(NameError::BadSignature(name.to_string())),
                other => debug!(%peer_id, %other, "routing candidate rejected"),
            }
        }
        Err(NameError::NotFound(name.to_string()))
    }
}
