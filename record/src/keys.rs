/// Name keys
///
/// Every identity is addressed under several derived keys:
///
/// | Key                 | Form                                   | Used by                      |
/// |---------------------|----------------------------------------|------------------------------|
/// | gossip topic        | `/ipns/<peer-id base58>`               | pubsub subscribe/publish     |
/// | routing key         | `/ipns/` ‖ raw peer-id bytes           | durable value store          |
/// | public key key      | `/pk/` ‖ raw peer-id bytes             | durable value store          |
/// | datastore key       | `/` ‖ base32-nopad(routing key)        | local record store           |
/// | rendezvous key      | CIDv1(raw, sha256("floodsub:" ‖ topic)) | provider records             |
use std::fmt;

use data_encoding::BASE32_NOPAD;
use libp2p_identity::PeerId;
use sha2::{Digest, Sha256};

use crate::error::RecordError;

/// Prefix of names, gossip topics and routing keys.
pub const IPNS_PREFIX: &str = "/ipns/";

/// Prefix of public key routing keys.
pub const PK_PREFIX: &str = "/pk/";

/// Prefix hashed together with a topic to derive its rendezvous key.
pub const RENDEZVOUS_PREFIX: &str = "floodsub:";

const CID_VERSION_1: u8 = 0x01;
const RAW_CODEC: u8 = 0x55;
const SHA2_256_CODE: u8 = 0x12;
const SHA2_256_LEN: u8 = 0x20;

/// Gossip topic of an identity.
pub fn topic_for(peer_id: &PeerId) -> String {
    format!("{IPNS_PREFIX}{}", peer_id.to_base58())
}

/// Parse a name, with or without the `/ipns/` prefix, into its peer id.
pub fn parse_name(name: &str) -> Result<PeerId, RecordError> {
    let id = name.strip_prefix(IPNS_PREFIX).unwrap_or(name);
    id.parse::<PeerId>()
        .map_err(|err| RecordError::InvalidPeerId(format!("{id}: {err}")))
}

/// Routing keys of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameKeys {
    pub public_key: Vec<u8>,
    pub ipns: Vec<u8>,
}

impl NameKeys {
    pub fn for_peer(peer_id: &PeerId) -> Self {
        let id = peer_id.to_bytes();

        let mut public_key = PK_PREFIX.as_bytes().to_vec();
        public_key.extend_from_slice(&id);

        let mut ipns = IPNS_PREFIX.as_bytes().to_vec();
        ipns.extend_from_slice(&id);

        Self { public_key, ipns }
    }

    /// Key of this identity's entry in the local record store.
    pub fn datastore_key(&self) -> DatastoreKey {
        DatastoreKey::from_binary(&self.ipns)
    }
}

/// A routing key split back into its namespace and identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingKey {
    Name(PeerId),
    PublicKey(PeerId),
}

impl RoutingKey {
    /// `None` for other namespaces or a malformed peer id.
    pub fn parse(key: &[u8]) -> Option<Self> {
        if let Some(id) = key.strip_prefix(IPNS_PREFIX.as_bytes()) {
            return PeerId::from_bytes(id).ok().map(Self::Name);
        }
        if let Some(id) = key.strip_prefix(PK_PREFIX.as_bytes()) {
            return PeerId::from_bytes(id).ok().map(Self::PublicKey);
        }
        None
    }

    pub fn peer_id(&self) -> PeerId {
        match self {
            Self::Name(peer_id) | Self::PublicKey(peer_id) => *peer_id,
        }
    }
}

/// Binary-safe local storage key: `/` followed by unpadded base32.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatastoreKey(String);

impl DatastoreKey {
    pub fn from_binary(raw: &[u8]) -> Self {
        Self(format!("/{}", BASE32_NOPAD.encode(raw)))
    }

    pub fn parse(key: &str) -> Result<Self, RecordError> {
        let key = Self(key.to_string());
        key.to_binary()?;
        Ok(key)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>, RecordError> {
        let encoded = self
            .0
            .strip_prefix('/')
            .ok_or_else(|| RecordError::InvalidDatastoreKey(self.0.clone()))?;

        BASE32_NOPAD
            .decode(encoded.as_bytes())
            .map_err(|_| RecordError::InvalidDatastoreKey(self.0.clone()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatastoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-routing key used to find peers interested in a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RendezvousKey(Vec<u8>);

impl RendezvousKey {
    pub fn for_topic(topic: &str) -> Self {
        let digest = Sha256::digest(format!("{RENDEZVOUS_PREFIX}{topic}").as_bytes());

        let mut cid = Vec::with_capacity(4 + digest.len());
        cid.extend_from_slice(&[CID_VERSION_1, RAW_CODEC, SHA2_256_CODE, SHA2_256_LEN]);
        cid.extend_from_slice(&digest);
        Self(cid)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for RendezvousKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RendezvousKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Multibase base32 lower, as CIDv1 strings are usually rendered.
        write!(f, "b{}", BASE32_NOPAD.encode(&self.0).to_lowercase())
    }
}
