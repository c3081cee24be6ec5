use libp2p::gossipsub::{Message, TopicHash};

use crate::gossipsub::config::{GossipsubConfig, compute_message_id};

fn message(topic: &str, data: &[u8]) -> Message {
    Message {
        source: None,
        data: data.to_vec(),
        sequence_number: None,
        topic: TopicHash::from_raw(topic),
    }
}

#[test]
fn test_default_parameters() {
    let config = GossipsubConfig::new();

    assert!(config.config.mesh_n_low() < config.config.mesh_n());
    assert!(config.config.mesh_n() < config.config.mesh_n_high());
    assert!(config.config.gossip_lazy() <= config.config.mesh_n_high());
    assert!(config.config.history_gossip() <= config.config.history_length());
    assert!(config.config.heartbeat_interval() > std::time::Duration::ZERO);
    assert_eq!(config.config.max_transmit_size(), crate::compressor::MAX_RECORD_SIZE);
}

#[test]
fn test_message_id_is_twenty_bytes() {
    let id = compute_message_id(&message("/ipns/a", b"record"));
    assert_eq!(id.0.len(), 20);
}

#[test]
fn test_message_id_depends_on_topic_and_data() {
    let base = compute_message_id(&message("/ipns/a", b"record"));

    assert_eq!(base, compute_message_id(&message("/ipns/a", b"record")));
    assert_ne!(base, compute_message_id(&message("/ipns/b", b"record")));
    assert_ne!(base, compute_message_id(&message("/ipns/a", b"other")));
}

#[test]
fn test_message_id_length_prefix_separates_topic_from_data() {
    // Same concatenation, different split.
    let left = compute_message_id(&message("/ipns/ab", b"c"));
    let right = compute_message_id(&message("/ipns/a", b"bc"));

    assert_ne!(left, right);
}
