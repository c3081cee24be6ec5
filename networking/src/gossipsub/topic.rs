/// Name Topics
///
/// Every name is gossiped on its own topic:
///
/// ```text
/// /ipns/{peer_id_base58}
///
/// Example: /ipns/12D3KooWGzxzKZYveHXtpG6AsrUJBcWxHBFS2HsEoGTxrMLvKXtf
/// ```
///
/// The topic string is used verbatim as the gossipsub topic hash
/// (`IdentTopic`), so peers running any implementation of the protocol
/// meet on the same topic.
use std::fmt;

use anyhow::{Result, anyhow};
use libp2p::gossipsub::{IdentTopic, TopicHash};
use libp2p_identity::PeerId;
use record::{IPNS_PREFIX, parse_name, topic_for};

/// Gossip topic of one name.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct NameTopic {
    peer_id: PeerId,
}

impl NameTopic {
    pub fn new(peer_id: PeerId) -> Self {
        Self { peer_id }
    }

    /// Parse a topic string. Only `/ipns/<peer id>` is accepted.
    pub fn parse(topic: &str) -> Result<Self> {
        if !topic.starts_with(IPNS_PREFIX) {
            return Err(anyhow!("topic {topic:?} is not a name topic"));
        }
        let peer_id = parse_name(topic)?;
        Ok(Self { peer_id })
    }

    pub fn decode(topic: &TopicHash) -> Result<Self> {
        Self::parse(topic.as_str())
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }
}

impl fmt::Display for NameTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&topic_for(&self.peer_id))
    }
}

impl From<NameTopic> for IdentTopic {
    fn from(topic: NameTopic) -> IdentTopic {
        IdentTopic::new(topic.to_string())
    }
}

impl From<NameTopic> for TopicHash {
    fn from(topic: NameTopic) -> TopicHash {
        TopicHash::from_raw(topic.to_string())
    }
}
