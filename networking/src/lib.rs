pub mod bootnodes;
pub mod compressor;
pub mod gossipsub;
pub mod network;
pub mod types;

pub use network::{
    NameNetworkBehaviour, NameNetworkBehaviourEvent, NetworkHandle, NetworkService,
    NetworkServiceConfig,
};
pub use types::{ConnectionState, NetworkCommand, P2pRequestSource};
