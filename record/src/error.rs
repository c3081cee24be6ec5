use thiserror::Error;

/// Errors produced while building, encoding or checking a name record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to decode record: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("invalid validity timestamp {0:?}")]
    InvalidValidity(String),

    #[error("unknown validity type {0}")]
    UnknownValidityType(i32),

    #[error("failed to sign record: {0}")]
    Signing(#[from] libp2p_identity::SigningError),

    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("invalid datastore key {0:?}")]
    InvalidDatastoreKey(String),
}
