use std::fs::File;

use libp2p::{Multiaddr, multiaddr::Protocol};
use libp2p_identity::PeerId;
use tracing::warn;

pub trait BootnodeSource: Send + Sync {
    fn to_multiaddrs(&self) -> Vec<Multiaddr>;
}

impl BootnodeSource for Vec<Multiaddr> {
    fn to_multiaddrs(&self) -> Vec<Multiaddr> {
        self.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticBootnodes(Vec<Multiaddr>);

impl StaticBootnodes {
    pub fn new<T: Into<Vec<Multiaddr>>>(addrs: T) -> Self {
        StaticBootnodes(addrs.into())
    }

    /// Build from CLI arguments, each a multiaddr or a YAML file listing multiaddrs.
    pub fn from_arguments<S: AsRef<str>>(args: &[S]) -> Self {
        Self(
            args.iter()
                .flat_map(|arg| parse_bootnode_argument(arg.as_ref()))
                .collect(),
        )
    }
}

impl BootnodeSource for StaticBootnodes {
    fn to_multiaddrs(&self) -> Vec<Multiaddr> {
        self.0.clone()
    }
}

/// Peer id carried in the `/p2p/` component of an address.
pub fn peer_id_of(addr: &Multiaddr) -> Option<PeerId> {
    addr.iter().find_map(|protocol| match protocol {
        Protocol::P2p(peer_id) => Some(peer_id),
        _ => None,
    })
}

fn parse_bootnode_argument(arg: &str) -> Vec<Multiaddr> {
    if let Ok(addr) = arg.parse::<Multiaddr>() {
        return vec![addr];
    }

    let Ok(file) = File::open(arg) else {
        warn!(
            "value {arg:?} provided as bootnode is not recognized - it is not valid multiaddr nor valid path to file containing bootnodes."
        );
        return Vec::new();
    };

    let entries: Vec<String> = match serde_yaml::from_reader(file) {
        Ok(value) => value,
        Err(err) => {
            warn!("failed to read bootnodes from {arg:?}: {err:?}");
            return Vec::new();
        }
    };

    if entries.is_empty() {
        warn!("provided file with bootnodes {arg:?} is empty");
    }

    entries
        .iter()
        .filter_map(|entry| match entry.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(err) => {
                warn!("skipping bootnode {entry:?} from {arg:?}: {err}");
                None
            }
        })
        .collect()
}
