//! In-memory stand-ins for the network capabilities.
use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::{channel::mpsc, stream, StreamExt};
use libp2p_identity::{Keypair, PeerId, PublicKey};
use parking_lot::Mutex;
use record::{NameRecord, Path, RendezvousKey};
use tokio_util::sync::CancellationToken;

use crate::{
    bootstrap::{BootstrapConfig, Bootstrapper},
    routing::{
        ContentRouting, KeyFetcher, MessageStream, PeerConnector, ProviderStream, PubSub,
        PublicKeyFetcher, ValueStore,
    },
    PubsubPublisher, PubsubResolver, RecordStore,
};

/// One shared network: pubsub hub, provider records, dialer and value store.
///
/// Published messages are delivered to every subscriber of the topic,
/// including subscribers owned by the publishing side.
pub struct MockNetwork {
    local: PeerId,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>>,
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub subscribe_calls: AtomicUsize,
    pub provided: Mutex<Vec<RendezvousKey>>,
    providers: Mutex<HashMap<RendezvousKey, Vec<PeerId>>>,
    pub connected: Mutex<Vec<PeerId>>,
    unreachable: Mutex<HashSet<PeerId>>,
    hanging: Mutex<HashSet<PeerId>>,
    values: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    remote_values: Mutex<HashMap<Vec<u8>, Vec<Vec<u8>>>>,
    pub put_calls: AtomicUsize,
    pub fail_publish: AtomicBool,
    pub fail_provide: AtomicBool,
    pub fail_put: AtomicBool,
}

impl MockNetwork {
    pub fn new(local: PeerId) -> Arc<Self> {
        Arc::new(Self {
            local,
            subscribers: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
            provided: Mutex::new(Vec::new()),
            providers: Mutex::new(HashMap::new()),
            connected: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            hanging: Mutex::new(HashSet::new()),
            values: Mutex::new(HashMap::new()),
            remote_values: Mutex::new(HashMap::new()),
            put_calls: AtomicUsize::new(0),
            fail_publish: AtomicBool::new(false),
            fail_provide: AtomicBool::new(false),
            fail_put: AtomicBool::new(false),
        })
    }

    /// Inject a raw message as if it arrived from a remote peer.
    pub fn deliver(&self, topic: &str, data: Vec<u8>) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(topic) else {
            return 0;
        };
        senders.retain(|sender| sender.unbounded_send(data.clone()).is_ok());
        senders.len()
    }

    /// Close every subscription stream of `topic`.
    pub fn close_topic(&self, topic: &str) {
        self.subscribers.lock().remove(topic);
    }

    pub fn add_provider(&self, topic: &str, peer_id: PeerId) {
        self.providers
            .lock()
            .entry(RendezvousKey::for_topic(topic))
            .or_default()
            .push(peer_id);
    }

    pub fn set_unreachable(&self, peer_id: PeerId) {
        self.unreachable.lock().insert(peer_id);
    }

    pub fn set_hanging(&self, peer_id: PeerId) {
        self.hanging.lock().insert(peer_id);
    }

    pub fn value(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.values.lock().get(key).cloned()
    }

    /// A copy of `key` held by some other peer, returned ahead of the local one.
    pub fn add_remote_value(&self, key: &[u8], value: Vec<u8>) {
        self.remote_values
            .lock()
            .entry(key.to_vec())
            .or_default()
            .push(value);
    }
}

#[async_trait]
impl PubSub for MockNetwork {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(sender);
        Ok(receiver.boxed())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            bail!("publish refused");
        }
        self.published.lock().push((topic.to_string(), data.clone()));
        self.deliver(topic, data);
        Ok(())
    }
}

#[async_trait]
impl ContentRouting for MockNetwork {
    fn local_peer_id(&self) -> PeerId {
        self.local
    }

    async fn provide(&self, key: &RendezvousKey) -> Result<()> {
        if self.fail_provide.load(Ordering::SeqCst) {
            bail!("provide refused");
        }
        self.provided.lock().push(key.clone());
        Ok(())
    }

    async fn find_providers(&self, key: &RendezvousKey, limit: usize) -> Result<ProviderStream> {
        let mut found = self.providers.lock().get(key).cloned().unwrap_or_default();
        if self.provided.lock().contains(key) {
            found.push(self.local);
        }
        found.truncate(limit);
        Ok(stream::iter(found).boxed())
    }
}

#[async_trait]
impl PeerConnector for MockNetwork {
    async fn connect(&self, peer_id: PeerId) -> Result<()> {
        let hanging = self.hanging.lock().contains(&peer_id);
        if hanging {
            futures::future::pending::<()>().await;
        }
        if self.unreachable.lock().contains(&peer_id) {
            bail!("peer unreachable");
        }
        self.connected.lock().push(peer_id);
        Ok(())
    }
}

#[async_trait]
impl ValueStore for MockNetwork {
    async fn get_values(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut values = self.remote_values.lock().get(key).cloned().unwrap_or_default();
        values.extend(self.value(key));
        Ok(values)
    }

    async fn put_value(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        if self.fail_put.load(Ordering::SeqCst) {
            bail!("put refused");
        }
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.values.lock().insert(key.to_vec(), value);
        Ok(())
    }
}

/// Key fetcher that counts its lookups.
#[derive(Default)]
pub struct CountingKeys {
    pub calls: AtomicUsize,
}

#[async_trait]
impl PublicKeyFetcher for CountingKeys {
    async fn public_key(&self, peer_id: &PeerId) -> Result<PublicKey> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        KeyFetcher::default().public_key(peer_id).await
    }
}

pub fn fast_bootstrap() -> BootstrapConfig {
    BootstrapConfig {
        find_timeout: Duration::from_millis(200),
        connect_timeout: Duration::from_millis(100),
        provider_limit: 10,
    }
}

pub fn bootstrapper(network: &Arc<MockNetwork>) -> Bootstrapper {
    Bootstrapper::new(network.clone(), network.clone(), fast_bootstrap())
}

pub fn publisher(network: &Arc<MockNetwork>, store: Arc<RecordStore>) -> PubsubPublisher {
    PubsubPublisher::new(
        store,
        network.clone(),
        bootstrapper(network),
        CancellationToken::new(),
    )
}

pub fn resolver(network: &Arc<MockNetwork>) -> PubsubResolver {
    PubsubResolver::new(
        network.clone(),
        Arc::new(KeyFetcher::default()),
        bootstrapper(network),
        CancellationToken::new(),
    )
}

pub fn path(value: &str) -> Path {
    Path::parse(value).unwrap()
}

pub fn signed(key: &Keypair, value: &str, sequence: u64, lifetime: chrono::Duration) -> NameRecord {
    NameRecord::create(key, path(value), sequence, Utc::now() + lifetime).unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
