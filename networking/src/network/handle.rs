//! Capability handle over a running `NetworkService`.
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::{StreamExt, channel::mpsc as stream_mpsc};
use libp2p_identity::PeerId;
use namesys::{
    ContentRouting, MessageStream, PeerConnector, ProviderStream, PubSub, ValueStore,
};
use record::RendezvousKey;
use tokio::sync::{mpsc, oneshot};

use crate::types::{NetworkCommand, Reply};

/// Cheap, cloneable front of the swarm task.
///
/// Every call is a `NetworkCommand` sent to the task, answered on a oneshot.
/// Calls fail once the task has stopped.
#[derive(Clone)]
pub struct NetworkHandle {
    commands: mpsc::UnboundedSender<NetworkCommand>,
    local_peer_id: PeerId,
}

impl NetworkHandle {
    /// A handle and the command receiver to pass to `NetworkService`.
    pub fn channel(local_peer_id: PeerId) -> (Self, mpsc::UnboundedReceiver<NetworkCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (
            Self {
                commands,
                local_peer_id,
            },
            receiver,
        )
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> NetworkCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response
            .await
            .map_err(|_| anyhow!("network service dropped the request"))?
    }

    fn send(&self, command: NetworkCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|err| anyhow!("network service stopped: {}", err.0))
    }
}

#[async_trait]
impl PubSub for NetworkHandle {
    async fn subscribe(&self, topic: &str) -> Result<MessageStream> {
        let (messages, receiver) = stream_mpsc::unbounded();
        let topic = topic.to_string();
        self.request(|reply| NetworkCommand::Subscribe {
            topic,
            messages,
            reply,
        })
        .await?;
        Ok(receiver.boxed())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<()> {
        let topic = topic.to_string();
        self.request(|reply| NetworkCommand::Publish { topic, data, reply })
            .await
    }
}

#[async_trait]
impl ContentRouting for NetworkHandle {
    fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    async fn provide(&self, key: &RendezvousKey) -> Result<()> {
        let key = key.as_bytes().to_vec();
        self.request(|reply| NetworkCommand::Provide { key, reply })
            .await
    }

    async fn find_providers(&self, key: &RendezvousKey, limit: usize) -> Result<ProviderStream> {
        let (providers, receiver) = stream_mpsc::unbounded();
        self.send(NetworkCommand::FindProviders {
            key: key.as_bytes().to_vec(),
            limit,
            providers,
        })?;
        Ok(receiver.boxed())
    }
}

#[async_trait]
impl PeerConnector for NetworkHandle {
    async fn connect(&self, peer_id: PeerId) -> Result<()> {
        self.request(|reply| NetworkCommand::Connect { peer_id, reply })
            .await
    }
}

#[async_trait]
impl ValueStore for NetworkHandle {
    async fn get_values(&self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let key = key.to_vec();
        self.request(|reply| NetworkCommand::GetValues { key, reply })
            .await
    }

    async fn put_value(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        let key = key.to_vec();
        self.request(|reply| NetworkCommand::PutValue { key, value, reply })
            .await
    }
}
