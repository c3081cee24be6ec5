use std::sync::{atomic::Ordering, Arc};

use chrono::{Duration, Utc};
use futures::future::join_all;
use libp2p_identity::Keypair;
use pretty_assertions::assert_eq;
use record::{latest_eol, topic_for, NameRecord};

use super::mocks::{path, publisher, MockNetwork};
use crate::{NameError, NamePublisher, RecordStore, SqliteDatastore};

fn published_sequences(network: &MockNetwork) -> Vec<u64> {
    network
        .published
        .lock()
        .iter()
        .map(|(_, data)| NameRecord::from_bytes(data).unwrap().sequence())
        .collect()
}

#[tokio::test]
async fn test_sequence_strictly_increases() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let store = Arc::new(RecordStore::in_memory());
    let publisher = publisher(&network, store.clone());

    for value in ["/ipfs/Qm111", "/ipfs/Qm222", "/ipfs/Qm333"] {
        publisher.publish(&key, path(value)).await.unwrap();
    }

    assert_eq!(published_sequences(&network), vec![1, 2, 3]);
    assert_eq!(store.last_sequence(&key.public().to_peer_id()).unwrap(), 3);
}

#[tokio::test]
async fn test_published_on_identity_topic() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let publisher = publisher(&network, Arc::new(RecordStore::in_memory()));
    let eol = Utc::now() + Duration::hours(1);

    publisher
        .publish_with_eol(&key, path("/ipfs/Qm111"), eol)
        .await
        .unwrap();

    let published = network.published.lock().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, topic_for(&key.public().to_peer_id()));

    let record = NameRecord::from_bytes(&published[0].1).unwrap();
    assert_eq!(record.value().as_str(), "/ipfs/Qm111");
    assert_eq!(record.validity(), eol);
    assert!(record.verify(&key.public()));
}

#[tokio::test]
async fn test_sequence_survives_restart() {
    let key = Keypair::generate_ed25519();
    let db_path = std::env::temp_dir().join(format!("namesys-restart-{}.db", rand::random::<u64>()));

    {
        let network = MockNetwork::new(key.public().to_peer_id());
        let store = Arc::new(RecordStore::new(Arc::new(SqliteDatastore::open(&db_path).unwrap())));
        let publisher = publisher(&network, store);
        publisher.publish(&key, path("/ipfs/Qm111")).await.unwrap();
        publisher.publish(&key, path("/ipfs/Qm222")).await.unwrap();
    }

    let network = MockNetwork::new(key.public().to_peer_id());
    let store = Arc::new(RecordStore::new(Arc::new(SqliteDatastore::open(&db_path).unwrap())));
    let publisher = publisher(&network, store);
    publisher.publish(&key, path("/ipfs/Qm333")).await.unwrap();

    assert_eq!(published_sequences(&network), vec![3]);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn test_record_is_persisted_even_if_broadcast_fails() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let store = Arc::new(RecordStore::in_memory());
    let publisher = publisher(&network, store.clone());

    network.fail_publish.store(true, Ordering::SeqCst);
    let result = publisher.publish(&key, path("/ipfs/Qm111")).await;
    assert!(matches!(result, Err(NameError::PubSub(_))));
    assert_eq!(store.last_sequence(&key.public().to_peer_id()).unwrap(), 1);

    network.fail_publish.store(false, Ordering::SeqCst);
    publisher.publish(&key, path("/ipfs/Qm222")).await.unwrap();
    assert_eq!(published_sequences(&network), vec![2]);
}

#[tokio::test]
async fn test_topic_is_bootstrapped_once() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let publisher = publisher(&network, Arc::new(RecordStore::in_memory()));

    publisher.publish(&key, path("/ipfs/Qm111")).await.unwrap();
    publisher.publish(&key, path("/ipfs/Qm222")).await.unwrap();

    assert_eq!(network.provided.lock().len(), 1);
}

#[tokio::test]
async fn test_failed_bootstrap_does_not_block_publish() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    network.fail_provide.store(true, Ordering::SeqCst);
    let publisher = publisher(&network, Arc::new(RecordStore::in_memory()));

    publisher.publish(&key, path("/ipfs/Qm111")).await.unwrap();

    assert_eq!(published_sequences(&network), vec![1]);
}

#[tokio::test]
async fn test_concurrent_publishes_never_share_a_sequence() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let publisher = Arc::new(publisher(&network, Arc::new(RecordStore::in_memory())));

    let publishes = (0..5).map(|i| {
        let publisher = publisher.clone();
        let key = key.clone();
        async move { publisher.publish(&key, path(&format!("/ipfs/Qm{i}"))).await }
    });
    for result in join_all(publishes).await {
        result.unwrap();
    }

    let mut sequences = published_sequences(&network);
    sequences.sort();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_publish_after_shutdown_fails() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let store = Arc::new(RecordStore::in_memory());
    let publisher = publisher(&network, store.clone());

    publisher.shutdown();

    let result = publisher.publish(&key, path("/ipfs/Qm111")).await;
    assert!(matches!(result, Err(NameError::Closed)));
    assert_eq!(store.last_sequence(&key.public().to_peer_id()).unwrap(), 0);
}

#[tokio::test]
async fn test_unrepresentable_eol_is_rejected_before_persisting() {
    let key = Keypair::generate_ed25519();
    let network = MockNetwork::new(key.public().to_peer_id());
    let store = Arc::new(RecordStore::in_memory());
    let publisher = publisher(&network, store.clone());
    let year_10000 = latest_eol() + Duration::seconds(1);

    let result = publisher
        .publish_with_eol(&key, path("/ipfs/Qm111"), year_10000)
        .await;
    assert!(matches!(result, Err(NameError::Record(_))));
    assert!(store.get(&key.public().to_peer_id()).unwrap().is_none());
    assert!(network.published.lock().is_empty());

    publisher.publish(&key, path("/ipfs/Qm222")).await.unwrap();
    assert_eq!(published_sequences(&network), vec![1]);
}
