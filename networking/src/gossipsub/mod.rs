pub mod config;
pub mod topic;

#[cfg(test)]
mod tests;

use crate::compressor::Compressor;
use libp2p::gossipsub::{AllowAllSubscriptionFilter, Behaviour};

pub type GossipsubBehaviour = Behaviour<Compressor, AllowAllSubscriptionFilter>;

pub use config::{GossipsubConfig, compute_message_id};
pub use topic::NameTopic;
