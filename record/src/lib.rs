pub mod entry;
pub mod error;
pub mod keys;
pub mod path;

pub use entry::{
    format_validity, latest_eol, parse_validity, IpnsEntry, NameRecord, ValidityType,
    LATEST_EOL_TIMESTAMP,
};
pub use error::RecordError;
pub use keys::{
    parse_name, topic_for, DatastoreKey, NameKeys, RendezvousKey, RoutingKey, IPNS_PREFIX, PK_PREFIX,
    RENDEZVOUS_PREFIX,
};
pub use path::Path;
