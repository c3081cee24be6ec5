use std::sync::Arc;

use chrono::{Duration, Utc};
use libp2p_identity::Keypair;
use pretty_assertions::assert_eq;
use record::{DatastoreKey, NameKeys};
use rstest::rstest;

use super::mocks::{path, signed};
use crate::{Datastore, MemoryDatastore, NameError, RecordStore, SqliteDatastore};

fn memory() -> Arc<dyn Datastore> {
    Arc::new(MemoryDatastore::new())
}

fn sqlite() -> Arc<dyn Datastore> {
    Arc::new(SqliteDatastore::open_in_memory().unwrap())
}

#[rstest]
#[case::memory(memory())]
#[case::sqlite(sqlite())]
fn test_datastore_get_put_delete(#[case] datastore: Arc<dyn Datastore>) {
    let key = DatastoreKey::from_binary(b"/ipns/\x00\x01");

    assert_eq!(datastore.get(&key).unwrap(), None);

    datastore.put(&key, b"first").unwrap();
    datastore.put(&key, b"second").unwrap();
    assert_eq!(datastore.get(&key).unwrap(), Some(b"second".to_vec()));

    assert!(datastore.delete(&key).unwrap());
    assert!(!datastore.delete(&key).unwrap());
    assert_eq!(datastore.get(&key).unwrap(), None);
}

#[test]
fn test_sqlite_survives_reopen() {
    let db_path = std::env::temp_dir().join(format!("namesys-store-{}.db", rand::random::<u64>()));
    let key = DatastoreKey::from_binary(b"durable");

    SqliteDatastore::open(&db_path).unwrap().put(&key, b"value").unwrap();
    let reopened = SqliteDatastore::open(&db_path).unwrap();

    assert_eq!(reopened.get(&key).unwrap(), Some(b"value".to_vec()));
    let _ = std::fs::remove_file(&db_path);
}

#[rstest]
#[case::memory(memory())]
#[case::sqlite(sqlite())]
#[tokio::test]
async fn test_issue_reads_before_write(#[case] datastore: Arc<dyn Datastore>) {
    let key = Keypair::generate_ed25519();
    let peer_id = key.public().to_peer_id();
    let store = RecordStore::new(datastore.clone());
    let eol = Utc::now() + Duration::hours(1);

    assert_eq!(store.last_sequence(&peer_id).unwrap(), 0);
    let first = store.issue(&key, path("/ipfs/Qm111"), eol).await.unwrap();
    let second = store.issue(&key, path("/ipfs/Qm222"), eol).await.unwrap();

    assert_eq!((first.sequence(), second.sequence()), (1, 2));
    assert_eq!(store.get(&peer_id).unwrap(), Some(second));

    let raw_key = NameKeys::for_peer(&peer_id).datastore_key();
    assert!(datastore.get(&raw_key).unwrap().is_some());
}

#[tokio::test]
async fn test_issue_continues_after_externally_stored_record() {
    let key = Keypair::generate_ed25519();
    let peer_id = key.public().to_peer_id();
    let store = RecordStore::in_memory();

    store
        .put(&peer_id, &signed(&key, "/ipfs/QmOld", 41, Duration::hours(1)))
        .unwrap();
    let next = store
        .issue(&key, path("/ipfs/QmNew"), Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    assert_eq!(next.sequence(), 42);
}

#[test]
fn test_corrupt_entry_is_an_error() {
    let key = Keypair::generate_ed25519();
    let peer_id = key.public().to_peer_id();
    let datastore = memory();
    datastore
        .put(&NameKeys::for_peer(&peer_id).datastore_key(), b"\xff\xff\xff")
        .unwrap();

    let store = RecordStore::new(datastore);

    assert!(matches!(store.get(&peer_id), Err(NameError::Record(_))));
}
