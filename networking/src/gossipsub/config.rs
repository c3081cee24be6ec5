use libp2p::gossipsub::{Config, ConfigBuilder, Message, MessageId, ValidationMode};
use sha2::Digest;
use sha2::Sha256;
use std::time::Duration;

use crate::compressor::MAX_RECORD_SIZE;

#[derive(Debug, Clone)]
pub struct GossipsubConfig {
    pub config: Config,
}

impl GossipsubConfig {
    pub fn new() -> Self {
        let config = ConfigBuilder::default()
            .heartbeat_interval(Duration::from_secs(1))
            .fanout_ttl(Duration::from_secs(60))
            .history_length(5)
            .history_gossip(3)
            // Republished records carry the same bytes; keep them out of the mesh for a while.
            .duplicate_cache_time(Duration::from_secs(120))
            .mesh_n(6)
            .mesh_n_low(4)
            .mesh_n_high(12)
            .gossip_lazy(6)
            .max_transmit_size(MAX_RECORD_SIZE)
            .validation_mode(ValidationMode::Anonymous)
            .message_id_fn(compute_message_id)
            .build()
            .expect("Failed to build gossipsub config");

        GossipsubConfig { config }
    }
}

impl Default for GossipsubConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Content-addressed message id:
/// SHA256(uint64_le(len(topic)) + topic + message_data)[:20]
///
/// Anonymous messages carry no source or sequence number, so identical
/// records published by different peers share one id.
pub fn compute_message_id(message: &Message) -> MessageId {
    let topic_bytes = message.topic.as_str().as_bytes();
    let topic_len = topic_bytes.len() as u64;

    let mut digest_input = Vec::with_capacity(8 + topic_bytes.len() + message.data.len());
    digest_input.extend_from_slice(&topic_len.to_le_bytes());
    digest_input.extend_from_slice(topic_bytes);
    digest_input.extend_from_slice(&message.data);

    let hash = Sha256::digest(&digest_input);

    MessageId::from(&hash[..20])
}
