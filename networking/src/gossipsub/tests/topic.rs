use libp2p::gossipsub::{IdentTopic, TopicHash};
use libp2p_identity::Keypair;
use pretty_assertions::assert_eq;

use crate::gossipsub::topic::NameTopic;

#[test]
fn test_topic_round_trip() {
    let peer_id = Keypair::generate_ed25519().public().to_peer_id();
    let topic = NameTopic::new(peer_id);

    let text = topic.to_string();
    assert_eq!(text, format!("/ipns/{}", peer_id.to_base58()));
    assert_eq!(NameTopic::parse(&text).unwrap(), topic);
    assert_eq!(NameTopic::decode(&TopicHash::from(topic)).unwrap().peer_id(), peer_id);
}

#[test]
fn test_ident_topic_hash_is_verbatim() {
    let peer_id = Keypair::generate_ed25519().public().to_peer_id();
    let topic = NameTopic::new(peer_id);

    assert_eq!(IdentTopic::from(topic).hash().as_str(), topic.to_string());
}

#[test]
fn test_invalid_topics() {
    let peer_id = Keypair::generate_ed25519().public().to_peer_id();

    assert!(NameTopic::parse(&peer_id.to_base58()).is_err());
    assert!(NameTopic::parse("/ipfs/QmRoot").is_err());
    assert!(NameTopic::parse("/ipns/garbage").is_err());
}
