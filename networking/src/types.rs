use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use futures::channel::mpsc as stream_mpsc;
use libp2p_identity::PeerId;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// Peer connection state.
///
/// DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTED
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests from `NetworkHandle` to the swarm task.
///
/// Each request carries its own reply channel. Streamed results
/// (gossip messages, providers) are sent until the sender is dropped.
pub enum NetworkCommand {
    Subscribe {
        topic: String,
        messages: stream_mpsc::UnboundedSender<Vec<u8>>,
        reply: Reply<()>,
    },
    Publish {
        topic: String,
        data: Vec<u8>,
        reply: Reply<()>,
    },
    Provide {
        key: Vec<u8>,
        reply: Reply<()>,
    },
    FindProviders {
        key: Vec<u8>,
        limit: usize,
        providers: stream_mpsc::UnboundedSender<PeerId>,
    },
    Connect {
        peer_id: PeerId,
        reply: Reply<()>,
    },
    /// Every value found for `key`, local copy included.
    GetValues {
        key: Vec<u8>,
        reply: Reply<Vec<Vec<u8>>>,
    },
    PutValue {
        key: Vec<u8>,
        value: Vec<u8>,
        reply: Reply<()>,
    },
}

impl fmt::Display for NetworkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribe { topic, .. } => write!(f, "Subscribe({topic})"),
            Self::Publish { topic, data, .. } => write!(f, "Publish({topic}, {} bytes)", data.len()),
            Self::Provide { .. } => write!(f, "Provide"),
            Self::FindProviders { limit, .. } => write!(f, "FindProviders(limit={limit})"),
            Self::Connect { peer_id, .. } => write!(f, "Connect({peer_id})"),
            Self::GetValues { .. } => write!(f, "GetValues"),
            Self::PutValue { value, .. } => write!(f, "PutValue({} bytes)", value.len()),
        }
    }
}

#[async_trait]
pub trait P2pRequestSource<T>: Send {
    async fn recv(&mut self) -> Option<T>;
}

#[async_trait]
impl<T: Send + 'static> P2pRequestSource<T> for mpsc::UnboundedReceiver<T> {
    async fn recv(&mut self) -> Option<T> {
        mpsc::UnboundedReceiver::recv(self).await
    }
}
