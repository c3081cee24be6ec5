mod behaviour;
mod handle;
mod service;

pub use behaviour::{NameNetworkBehaviour, NameNetworkBehaviourEvent};
pub use handle::NetworkHandle;
pub use service::{NetworkService, NetworkServiceConfig};
