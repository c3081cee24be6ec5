//! Network capabilities the name system is built on.
//!
//! The name system never talks to a swarm directly. It is handed these
//! capabilities as `Arc<dyn ...>` handles, which the networking crate
//! implements over libp2p and the tests implement in memory.
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use libp2p_identity::{PeerId, PublicKey};
use record::{NameKeys, RendezvousKey};
use tracing::debug;

use crate::validator::validate_public_key;

/// Payloads received on one topic, in arrival order.
pub type MessageStream = BoxStream<'static, Vec<u8>>;

/// Provider peers as they are discovered.
pub type ProviderStream = BoxStream<'static, PeerId>;

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream>;
    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()>;
}

#[async_trait]
pub trait ContentRouting: Send + Sync {
    fn local_peer_id(&self) -> PeerId;

    /// Announce the local peer as a provider of `key`.
    async fn provide(&self, key: &RendezvousKey) -> Result<()>;

    /// Stream at most `limit` providers of `key`.
    async fn find_providers(&self, key: &RendezvousKey, limit: usize) -> Result<ProviderStream>;
}

#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(&self, peer_id: PeerId) -> Result<()>;
}

/// Durable key/value routing, e.g. a DHT.
///
/// Several peers may hold different values for one key, so a lookup returns
/// every candidate it saw and leaves the choice to the caller.
#[async_trait]
pub trait ValueStore: Send + Sync {
    async fn get_values(&self, key: &[u8]) -> Result<Vec<Vec<u8>>>;
    async fn put_value(&self, key: &[u8], value: Vec<u8>) -> Result<()>;
}

#[async_trait]
pub trait PublicKeyFetcher: Send + Sync {
    async fn public_key(&self, peer_id: &PeerId) -> Result<PublicKey>;
}

const IDENTITY_MULTIHASH: u8 = 0x00;

/// Public key lookup.
///
/// Small keys (ed25519, secp256k1) are inlined in the peer id as an identity
/// multihash and need no network round trip. Other keys are fetched from the
/// `/pk/` routing key of the value store, when one is configured, and checked
/// against the peer id.
#[derive(Clone, Default)]
pub struct KeyFetcher {
    values: Option<Arc<dyn ValueStore>>,
}

impl KeyFetcher {
    pub fn new(values: Option<Arc<dyn ValueStore>>) -> Self {
        Self { values }
    }

    pub fn inline_key(peer_id: &PeerId) -> Option<PublicKey> {
        let bytes = peer_id.to_bytes();
        let (&code, rest) = bytes.split_first()?;
        if code != IDENTITY_MULTIHASH {
            return None;
        }
        let (&len, digest) = rest.split_first()?;
        if len >= 0x80 || usize::from(len) != digest.len() {
            return None;
        }
        PublicKey::try_decode_protobuf(digest).ok()
    }
}

#[async_trait]
impl PublicKeyFetcher for KeyFetcher {
    async fn public_key(&self, peer_id: &PeerId) -> Result<PublicKey> {
        if let Some(key) = Self::inline_key(peer_id) {
            return Ok(key);
        }

        let Some(values) = &self.values else {
            bail!("key is not inlined and no value store is configured");
        };

        debug!(%peer_id, "fetching public key from routing");
        let candidates = values
            .get_values(&NameKeys::for_peer(peer_id).public_key)
            .await?;
        if candidates.is_empty() {
            bail!("no public key published");
        }

        candidates
            .iter()
            .find_map(|bytes| validate_public_key(peer_id, bytes).ok())
            .ok_or_else(|| anyhow!("published public key does not match peer id"))
    }
}
