use libp2p_identity::PeerId;
use record::RecordError;
use thiserror::Error;

pub type NameResult<T> = Result<T, NameError>;

#[derive(Debug, Error)]
pub enum NameError {
    #[error("name not found: {0}")]
    NotFound(String),

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: RecordError },

    #[error(transparent)]
    InvalidPath(RecordError),

    #[error("invalid record: {0}")]
    Record(#[from] RecordError),

    #[error("record for {0} failed signature verification")]
    BadSignature(String),

    #[error("public key of {peer} unavailable: {error:#}")]
    PublicKey { peer: PeerId, error: anyhow::Error },

    #[error("record store: {0:#}")]
    Store(anyhow::Error),

    #[error("keystore: {0:#}")]
    Keystore(anyhow::Error),

    #[error("pubsub: {0:#}")]
    PubSub(anyhow::Error),

    #[error("routing: {0:#}")]
    Routing(anyhow::Error),

    #[error("resolution of {0} exceeded the depth limit")]
    DepthLimitExceeded(String),

    #[error("already following {0}")]
    AlreadyFollowing(String),

    #[error("unknown name {0}")]
    NotFollowing(String),

    #[error("name system is shut down")]
    Closed,
}

impl NameError {
    /// `NotFound` lets callers fall through to the next resolver.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Why an incoming gossip update was dropped.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("malformed record: {0}")]
    Malformed(#[from] RecordError),

    #[error("empty message")]
    Empty,

    #[error("bad signature")]
    BadSignature,

    #[error("record already expired")]
    Expired,

    #[error("sequence {received} is not newer than cached {cached}")]
    StaleSequence { received: u64, cached: u64 },

    #[error("no active subscription")]
    Unsubscribed,

    #[error("public key does not belong to the peer id")]
    KeyMismatch,

    #[error("public key of the name is unknown")]
    UnknownKey,

    #[error("routing key outside the name namespaces")]
    UnsupportedKey,
}

impl Rejection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed(_) | Self::Empty => "malformed",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::StaleSequence { .. } => "stale_sequence",
            Self::Unsubscribed => "unsubscribed",
            Self::KeyMismatch => "key_mismatch",
            Self::UnknownKey => "unknown_key",
            Self::UnsupportedKey => "unsupported_key",
        }
    }
}
