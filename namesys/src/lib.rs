pub mod bootstrap;
pub mod config;
pub mod error;
pub mod keystore;
pub mod namecache;
pub mod publisher;
pub mod republisher;
pub mod resolver;
pub mod routing;
pub mod routing_namesys;
pub mod store;
pub mod system;
pub mod validator;

#[cfg(test)]
mod tests;

pub use bootstrap::{BootstrapConfig, BootstrapReport, Bootstrapper};
pub use config::NamesysConfig;
pub use error::{NameError, NameResult, Rejection};
pub use keystore::{FsKeystore, Keystore, MemoryKeystore};
pub use namecache::NameCache;
pub use publisher::{NamePublisher, PubsubPublisher};
pub use republisher::Republisher;
pub use resolver::{resolve_recursive, NameResolver, PubsubResolver};
pub use routing::{
    ContentRouting, KeyFetcher, MessageStream, PeerConnector, ProviderStream, PubSub,
    PublicKeyFetcher, ValueStore,
};
pub use routing_namesys::{put_record_to_routing, RoutingPublisher, RoutingResolver};
pub use store::{Datastore, MemoryDatastore, RecordStore, SqliteDatastore};
pub use system::NameSystem;
pub use validator::{select_record, validate_put, Selection};
