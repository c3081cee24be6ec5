//! Checks applied to values stored under routing keys.
//!
//! A lookup in a shared value store can return several candidates for one
//! key, some stale or forged. The resolver keeps the best valid one with
//! [`select_record`], and a node asked to store a value for someone else
//! runs [`validate_put`] before accepting it.
use libp2p_identity::{PeerId, PublicKey};
use record::{NameRecord, RoutingKey};

use crate::{error::Rejection, routing::KeyFetcher};

/// `value` must be the protobuf encoding of the public key behind `peer_id`.
pub fn validate_public_key(peer_id: &PeerId, value: &[u8]) -> Result<PublicKey, Rejection> {
    let key = PublicKey::try_decode_protobuf(value).map_err(|_| Rejection::KeyMismatch)?;
    if key.to_peer_id() != *peer_id {
        return Err(Rejection::KeyMismatch);
    }
    Ok(key)
}

/// Decode a name record and check it is signed by `public_key` and live.
pub fn validate_record(public_key: &PublicKey, value: &[u8]) -> Result<NameRecord, Rejection> {
    if value.is_empty() {
        return Err(Rejection::Empty);
    }

    let record = NameRecord::from_bytes(value)?;
    if !record.verify(public_key) {
        return Err(Rejection::BadSignature);
    }
    if record.is_expired() {
        return Err(Rejection::Expired);
    }
    Ok(record)
}

/// Outcome of [`select_record`].
#[derive(Debug, Default)]
pub struct Selection {
    pub best: Option<NameRecord>,
    pub rejected: Vec<Rejection>,
}

/// Keep the valid candidate with the highest sequence, then latest EOL.
pub fn select_record<I, B>(public_key: &PublicKey, candidates: I) -> Selection
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut selection = Selection::default();

    for candidate in candidates {
        match validate_record(public_key, candidate.as_ref()) {
            Ok(record) => {
                let better = selection
                    .best
                    .as_ref()
                    .map_or(true, |best| record.supersedes(best));
                if better {
                    selection.best = Some(record);
                }
            }
            Err(rejection) => selection.rejected.push(rejection),
        }
    }
    selection
}

/// Decide whether a value a remote peer put under `key` may be stored.
///
/// `known_key` looks up a public key already held locally, for peer ids that
/// do not inline their key. `existing` is the value currently stored under
/// `key`; a name record only replaces it when it supersedes it.
pub fn validate_put<F>(
    key: &[u8],
    value: &[u8],
    existing: Option<&[u8]>,
    known_key: F,
) -> Result<(), Rejection>
where
    F: FnOnce(&PeerId) -> Option<PublicKey>,
{
    match RoutingKey::parse(key).ok_or(Rejection::UnsupportedKey)? {
        RoutingKey::PublicKey(peer_id) => validate_public_key(&peer_id, value).map(|_| ()),
        RoutingKey::Name(peer_id) => {
            let public_key = KeyFetcher::inline_key(&peer_id)
                .or_else(|| known_key(&peer_id))
                .ok_or(Rejection::UnknownKey)?;
            let record = validate_record(&public_key, value)?;

            if let Some(current) = existing.and_then(|bytes| NameRecord::from_bytes(bytes).ok()) {
                if !record.supersedes(&current) {
                    return Err(Rejection::StaleSequence {
                        received: record.sequence(),
                        cached: current.sequence(),
                    });
                }
            }
            Ok(())
        }
    }
}
