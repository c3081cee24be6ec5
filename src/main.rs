use std::fs;
use std::net::IpAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use libp2p_identity::Keypair;
use metrics::{
    Metrics, SharedMetrics,
    server::{MetricsServerConfig, run_metrics_server},
};
use namesys::{
    put_record_to_routing, Bootstrapper, ContentRouting, Datastore, FsKeystore, KeyFetcher,
    Keystore, MemoryDatastore, NameCache, NamePublisher, NameResolver, NameSystem, NamesysConfig,
    PeerConnector,
    PubSub, PublicKeyFetcher, PubsubPublisher, PubsubResolver, RecordStore, Republisher,
    RoutingResolver, SqliteDatastore, ValueStore,
};
use networking::gossipsub::GossipsubConfig;
use networking::{NetworkHandle, NetworkService, NetworkServiceConfig};
use record::Path;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Name node publishing and resolving IPNS records over gossip")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    address: IpAddr,

    #[arg(short, long, default_value_t = 4001)]
    port: u16,

    /// Bootnode multiaddrs, or a YAML file listing them
    #[arg(short, long)]
    bootnodes: Vec<String>,

    /// YAML file with name system settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite file for published records; in-memory when omitted
    #[arg(long)]
    datastore: Option<PathBuf>,

    /// Directory of named keys to republish alongside the node identity
    #[arg(long)]
    keystore: Option<PathBuf>,

    /// Protobuf-encoded node keypair, created if missing
    #[arg(long)]
    identity: Option<PathBuf>,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Path to publish under the node identity at startup
    #[arg(long)]
    publish: Option<String>,

    /// Names to resolve and follow
    #[arg(short, long)]
    watch: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => NamesysConfig::from_yaml_file(path)?,
        None => NamesysConfig::default(),
    };
    let identity = load_identity(args.identity.as_deref())?;
    let local_peer_id = identity.public().to_peer_id();
    info!(peer = %local_peer_id, "Node identity loaded");

    let metrics: SharedMetrics = Arc::new(Metrics::new());
    if let Some(metrics_port) = args.metrics_port {
        let server_config = MetricsServerConfig {
            metrics_address: args.metrics_address,
            metrics_port,
        };
        let metrics = metrics.clone();
        task::spawn(async move {
            if let Err(err) = run_metrics_server(server_config, metrics).await {
                error!(%err, "Metrics server exited with error");
            }
        });
    }

    let (network, commands) = NetworkHandle::channel(local_peer_id);
    let network = Arc::new(network);
    let network_service_config = Arc::new(NetworkServiceConfig::new(
        GossipsubConfig::new(),
        args.address,
        args.port,
        args.bootnodes.clone(),
    ));
    let mut network_service =
        NetworkService::new(network_service_config, commands, identity.clone())
            .await
            .context("Failed to create network service")?
            .with_metrics(metrics.clone());

    let network_task = task::spawn(async move {
        if let Err(err) = network_service.start().await {
            error!(%err, "Network service exited with error");
        }
    });

    let datastore: Arc<dyn Datastore> = match &args.datastore {
        Some(path) => Arc::new(SqliteDatastore::open(path)?),
        None => Arc::new(MemoryDatastore::new()),
    };
    let store = Arc::new(RecordStore::new(datastore));
    let keystore = match &args.keystore {
        Some(dir) => Some(Arc::new(FsKeystore::open(dir)?) as Arc<dyn Keystore>),
        None => None,
    };

    let pubsub: Arc<dyn PubSub> = network.clone();
    let routing: Arc<dyn ContentRouting> = network.clone();
    let connector: Arc<dyn PeerConnector> = network.clone();
    let values: Arc<dyn ValueStore> = network.clone();
    let keys: Arc<dyn PublicKeyFetcher> = Arc::new(KeyFetcher::new(Some(values.clone())));

    let cancel = CancellationToken::new();
    let bootstrapper =
        Bootstrapper::new(routing, connector, config.bootstrap()).with_metrics(metrics.clone());

    let publisher = PubsubPublisher::new(
        store.clone(),
        pubsub.clone(),
        bootstrapper.clone(),
        cancel.child_token(),
    )
    .with_record_ttl(config.record_ttl())
    .with_metrics(metrics.clone());

    let pubsub_resolver = Arc::new(PubsubResolver::with_metrics(
        pubsub,
        keys.clone(),
        bootstrapper,
        cancel.child_token(),
        metrics.clone(),
    ));
    let routing_resolver = Arc::new(RoutingResolver::new(values.clone(), keys));
    let resolvers: Vec<Arc<dyn NameResolver>> = vec![pubsub_resolver.clone(), routing_resolver];
    let name_system = Arc::new(NameSystem::new(resolvers).with_depth_limit(config.depth_limit));

    let republisher = Republisher::new(values.clone(), store.clone(), identity.clone(), keystore)
        .with_interval(config.republish_interval())
        .with_record_lifetime(config.record_lifetime())
        .with_metrics(metrics.clone())
        .spawn(cancel.child_token());

    if let Some(value) = &args.publish {
        let value = Path::parse(value)?;
        match publisher.publish(&identity, value).await {
            Ok(()) => {
                // Same record, sequence already issued by publish. The durable
                // copy would otherwise wait for the first republish tick.
                if let Some(record) = store.get(&local_peer_id)? {
                    if let Err(err) = put_record_to_routing(values.as_ref(), &identity, &record).await
                    {
                        warn!(%err, "Failed to store published record in routing");
                    }
                }
            }
            Err(err) => error!(%err, "Failed to publish name"),
        }
    }

    let name_cache = NameCache::new(name_system, cancel.child_token())
        .with_interval(config.follow_interval())
        .with_resolve_timeout(config.follow_resolve_timeout());
    for name in &args.watch {
        if let Err(err) = name_cache.follow(name) {
            warn!(%name, %err, "Failed to follow name");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    cancel.cancel();
    publisher.shutdown();
    name_cache.shutdown();
    pubsub_resolver.shutdown();
    if let Err(err) = republisher.await {
        warn!(%err, "Republisher task failed");
    }
    network_task.abort();

    info!("Name node exiting");
    Ok(())
}

fn load_identity(path: Option<&FsPath>) -> Result<Keypair> {
    let Some(path) = path else {
        return Ok(Keypair::generate_ed25519());
    };

    if path.exists() {
        let bytes = fs::read(path).with_context(|| format!("reading identity {path:?}"))?;
        return Keypair::from_protobuf_encoding(&bytes)
            .with_context(|| format!("decoding identity {path:?}"));
    }

    let keypair = Keypair::generate_ed25519();
    let bytes = keypair.to_protobuf_encoding()?;
    fs::write(path, bytes).with_context(|| format!("writing identity {path:?}"))?;
    info!(?path, "Generated new node identity");
    Ok(keypair)
}
