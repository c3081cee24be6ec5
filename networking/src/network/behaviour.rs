use libp2p::{
    connection_limits, identify,
    kad::{self, store::MemoryStore},
    swarm::NetworkBehaviour,
};

use crate::gossipsub::GossipsubBehaviour;

#[derive(NetworkBehaviour)]
pub struct NameNetworkBehaviour {
    pub identify: identify::Behaviour,
    pub gossipsub: GossipsubBehaviour,
    pub kademlia: kad::Behaviour<MemoryStore>,
    pub connection_limits: connection_limits::Behaviour,
}
