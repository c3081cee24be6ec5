use std::{
    collections::{HashMap, HashSet},
    net::IpAddr,
    num::{NonZeroU8, NonZeroUsize},
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::{Result, anyhow};
use futures::{StreamExt, channel::mpsc as stream_mpsc};
use libp2p::{
    Multiaddr, StreamProtocol, SwarmBuilder,
    connection_limits::{self, ConnectionLimits},
    gossipsub::{Event, IdentTopic, MessageAuthenticity, TopicHash},
    identify,
    kad::{
        self, GetProvidersOk, GetRecordError, GetRecordOk, InboundRequest, QueryId,
        QueryResult, Quorum, Record, RecordKey,
        store::{MemoryStore, RecordStore},
    },
    multiaddr::Protocol,
    swarm::{Config, Swarm, SwarmEvent},
};
use libp2p_identity::{Keypair, PeerId};
use metrics::SharedMetrics;
use namesys::validator::{validate_public_key, validate_put};
use record::NameKeys;
use parking_lot::Mutex;
use tokio::select;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, trace, warn};

use crate::{
    bootnodes::{BootnodeSource, StaticBootnodes, peer_id_of},
    compressor::Compressor,
    gossipsub::{self, config::GossipsubConfig},
    network::behaviour::{NameNetworkBehaviour, NameNetworkBehaviourEvent},
    types::{ConnectionState, NetworkCommand, P2pRequestSource, Reply},
};

/// Kademlia protocol shared with the wider IPFS network.
pub const KAD_PROTOCOL: StreamProtocol = StreamProtocol::new("/ipfs/kad/1.0.0");

const IDENTIFY_PROTOCOL_VERSION: &str = "ipfs/0.1.0";
const AGENT_VERSION: &str = concat!("ipns-node/", env!("CARGO_PKG_VERSION"));

/// Distinct values gathered by one lookup before the query is cut short.
const MAX_VALUE_CANDIDATES: usize = 16;

#[derive(Debug, Clone)]
pub struct NetworkServiceConfig {
    pub gossipsub_config: GossipsubConfig,
    pub socket_address: IpAddr,
    pub socket_port: u16,
    bootnodes: StaticBootnodes,
}

impl NetworkServiceConfig {
    pub fn new(
        gossipsub_config: GossipsubConfig,
        socket_address: IpAddr,
        socket_port: u16,
        bootnodes: Vec<String>,
    ) -> Self {
        NetworkServiceConfig {
            gossipsub_config,
            socket_address,
            socket_port,
            bootnodes: StaticBootnodes::from_arguments(&bootnodes),
        }
    }

    pub fn bootnodes(&self) -> &StaticBootnodes {
        &self.bootnodes
    }
}

/// In-flight Kademlia query and where its result goes.
enum PendingQuery {
    Provide(Reply<()>),
    FindProviders {
        providers: stream_mpsc::UnboundedSender<PeerId>,
        limit: usize,
        seen: HashSet<PeerId>,
    },
    GetValues {
        reply: Reply<Vec<Vec<u8>>>,
        values: Vec<Vec<u8>>,
    },
    PutValue(Reply<()>),
}

pub struct NetworkService<R>
where
    R: P2pRequestSource<NetworkCommand> + Send + 'static,
{
    network_config: Arc<NetworkServiceConfig>,
    swarm: Swarm<NameNetworkBehaviour>,
    peer_table: Arc<Mutex<HashMap<PeerId, ConnectionState>>>,
    peer_count: Arc<AtomicU64>,
    commands: R,
    topic_subscribers: HashMap<TopicHash, Vec<stream_mpsc::UnboundedSender<Vec<u8>>>>,
    pending_queries: HashMap<QueryId, PendingQuery>,
    pending_dials: HashMap<PeerId, Vec<Reply<()>>>,
    metrics: Option<SharedMetrics>,
}

impl<R> NetworkService<R>
where
    R: P2pRequestSource<NetworkCommand> + Send + 'static,
{
    pub async fn new(
        network_config: Arc<NetworkServiceConfig>,
        commands: R,
        local_key: Keypair,
    ) -> Result<Self> {
        Self::new_with_peer_count(network_config, commands, local_key, Arc::new(AtomicU64::new(0)))
            .await
    }

    pub async fn new_with_peer_count(
        network_config: Arc<NetworkServiceConfig>,
        commands: R,
        local_key: Keypair,
        peer_count: Arc<AtomicU64>,
    ) -> Result<Self> {
        let behaviour = Self::build_behaviour(&local_key, &network_config)?;

        let config = Config::with_tokio_executor()
            .with_notify_handler_buffer_size(NonZeroUsize::new(7).unwrap())
            .with_per_connection_event_buffer_size(4)
            .with_dial_concurrency_factor(NonZeroU8::new(1).unwrap())
            .with_idle_connection_timeout(Duration::from_secs(60));

        let multiaddr = Self::multiaddr(&network_config)?;
        let swarm = SwarmBuilder::with_existing_identity(local_key)
            .with_tokio()
            .with_quic()
            .with_behaviour(|_| behaviour)?
            .with_swarm_config(|_| config)
            .build();

        let mut service = Self {
            network_config,
            swarm,
            peer_table: Arc::new(Mutex::new(HashMap::new())),
            peer_count,
            commands,
            topic_subscribers: HashMap::new(),
            pending_queries: HashMap::new(),
            pending_dials: HashMap::new(),
            metrics: None,
        };

        service.listen(&multiaddr)?;
        service.add_bootnodes_to_routing();

        Ok(service)
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Drive the swarm until every `NetworkHandle` is dropped.
    pub async fn start(&mut self) -> Result<()> {
        // Periodic reconnect attempts to bootnodes
        let mut reconnect_interval = interval(Duration::from_secs(30));
        reconnect_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            select! {
                _ = reconnect_interval.tick() => {
                    self.connect_to_peers(self.network_config.bootnodes.to_multiaddrs());
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.dispatch_command(command),
                        None => {
                            info!("All network handles dropped, stopping network service");
                            return Ok(());
                        }
                    }
                }
                event = self.swarm.select_next_some() => {
                    self.parse_swarm_event(event);
                }
            }
        }
    }

    fn parse_swarm_event(&mut self, event: SwarmEvent<NameNetworkBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(NameNetworkBehaviourEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event)
            }
            SwarmEvent::Behaviour(NameNetworkBehaviourEvent::Kademlia(event)) => {
                self.handle_kademlia_event(event)
            }
            SwarmEvent::Behaviour(NameNetworkBehaviourEvent::Identify(event)) => {
                self.handle_identify_event(event)
            }
            SwarmEvent::Behaviour(_) => {
                // ConnectionLimits behaviour has no events
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                self.set_peer_state(peer_id, ConnectionState::Connected);
                info!(peer = %peer_id, "Connected to peer (total: {})", self.connected_peers());

                for reply in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                    let _ = reply.send(Ok(()));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    self.set_peer_state(peer_id, ConnectionState::Disconnected);
                    info!(peer = %peer_id, "Disconnected from peer (total: {})", self.connected_peers());
                }
            }
            SwarmEvent::IncomingConnection { local_addr, .. } => {
                debug!(?local_addr, "Incoming connection");
            }
            SwarmEvent::Dialing { peer_id, .. } => {
                debug!(?peer_id, "Dialing peer");
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                warn!(?peer_id, %error, "Failed to connect to peer");
                if let Some(peer_id) = peer_id {
                    if !self.swarm.is_connected(&peer_id) {
                        self.set_peer_state(peer_id, ConnectionState::Disconnected);
                    }
                    for reply in self.pending_dials.remove(&peer_id).unwrap_or_default() {
                        let _ = reply.send(Err(anyhow!("dial failed: {error}")));
                    }
                }
            }
            SwarmEvent::NewListenAddr {
                listener_id,
                address,
            } => {
                info!(?listener_id, ?address, "New listen address");
            }
            SwarmEvent::NewExternalAddrCandidate { address } => {
                info!(?address, "New external address candidate");
                self.swarm.add_external_address(address);
            }
            SwarmEvent::ExternalAddrConfirmed { address } => {
                info!(?address, "External address confirmed");
            }
            SwarmEvent::ExternalAddrExpired { address } => {
                info!(?address, "External address expired");
            }
            _ => {
                trace!(?event, "Unhandled swarm event");
            }
        }
    }

    fn handle_gossipsub_event(&mut self, event: Event) {
        match event {
            Event::Subscribed { peer_id, topic } => {
                debug!(peer = %peer_id, topic = %topic, "A peer subscribed to topic");
            }
            Event::Unsubscribed { peer_id, topic } => {
                debug!(peer = %peer_id, topic = %topic, "A peer unsubscribed from topic");
            }
            Event::Message { message, .. } => {
                let Some(subscribers) = self.topic_subscribers.get_mut(&message.topic) else {
                    trace!(topic = %message.topic, "Message on topic without local subscribers");
                    return;
                };

                subscribers.retain(|sender| sender.unbounded_send(message.data.clone()).is_ok());

                if subscribers.is_empty() {
                    self.topic_subscribers.remove(&message.topic);
                    let topic = IdentTopic::new(message.topic.as_str());
                    self.swarm.behaviour_mut().gossipsub.unsubscribe(&topic);
                    info!(topic = %message.topic, "Unsubscribed from topic without listeners");
                }
            }
            _ => {
                trace!(?event, "Unhandled gossipsub event");
            }
        }
    }

    fn handle_kademlia_event(&mut self, event: kad::Event) {
        match event {
            kad::Event::OutboundQueryProgressed {
                id, result, step, ..
            } => self.handle_query_progress(id, result, step.last),
            kad::Event::RoutingUpdated {
                peer, is_new_peer, ..
            } => {
                if is_new_peer {
                    debug!(peer = %peer, "Added peer to routing table");
                }
            }
            kad::Event::InboundRequest {
                request:
                    InboundRequest::PutRecord {
                        source,
                        record: Some(record),
                        ..
                    },
            } => self.store_inbound_record(source, record),
            kad::Event::InboundRequest {
                request:
                    InboundRequest::AddProvider {
                        record: Some(provider),
                    },
            } => {
                let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                if let Err(err) = kademlia.store_mut().add_provider(provider) {
                    debug!(?err, "Failed to store provider record");
                }
            }
            _ => {
                trace!(?event, "Unhandled kademlia event");
            }
        }
    }

    /// Keep an inbound put only if it is a valid record that does not roll
    /// back the copy already held.
    fn store_inbound_record(&mut self, source: PeerId, record: Record) {
        let store = self.swarm.behaviour_mut().kademlia.store_mut();
        let existing = store.get(&record.key).map(|current| current.value.clone());

        let outcome = validate_put(
            &record.key.to_vec(),
            &record.value,
            existing.as_deref(),
            |peer_id| {
                let pk_key = RecordKey::new(&NameKeys::for_peer(peer_id).public_key);
                store
                    .get(&pk_key)
                    .and_then(|pk| validate_public_key(peer_id, &pk.value).ok())
            },
        );

        match outcome {
            Ok(()) => {
                if let Err(err) = store.put(record) {
                    debug!(%source, ?err, "Failed to store inbound record");
                }
            }
            Err(rejection) => {
                debug!(%source, %rejection, "Refused inbound record");
            }
        }
    }

    fn handle_query_progress(&mut self, id: QueryId, result: QueryResult, last: bool) {
        let Some(pending) = self.pending_queries.remove(&id) else {
            trace!(?id, "Progress of untracked query");
            return;
        };

        match (pending, result) {
            (PendingQuery::Provide(reply), QueryResult::StartProviding(result)) => {
                let _ = reply.send(
                    result
                        .map(|_| ())
                        .map_err(|err| anyhow!("provide failed: {err:?}")),
                );
            }
            (
                PendingQuery::FindProviders {
                    providers,
                    limit,
                    mut seen,
                },
                QueryResult::GetProviders(result),
            ) => {
                match result {
                    Ok(GetProvidersOk::FoundProviders { providers: found, .. }) => {
                        for peer_id in found {
                            if seen.len() >= limit {
                                break;
                            }
                            if seen.insert(peer_id) {
                                let _ = providers.unbounded_send(peer_id);
                            }
                        }
                    }
                    Ok(GetProvidersOk::FinishedWithNoAdditionalRecord { .. }) => {}
                    Err(err) => debug!(?err, "Provider lookup failed"),
                }

                if last {
                    return;
                }
                if seen.len() >= limit || providers.is_closed() {
                    self.finish_query(id);
                } else {
                    self.pending_queries.insert(
                        id,
                        PendingQuery::FindProviders {
                            providers,
                            limit,
                            seen,
                        },
                    );
                }
            }
            (PendingQuery::GetValues { reply, mut values }, QueryResult::GetRecord(result)) => {
                match result {
                    Ok(GetRecordOk::FoundRecord(peer_record)) => {
                        let value = peer_record.record.value;
                        if !values.contains(&value) {
                            values.push(value);
                        }
                    }
                    Ok(GetRecordOk::FinishedWithNoAdditionalRecord { .. }) => {}
                    Err(GetRecordError::NotFound { .. }) => {}
                    Err(err) if values.is_empty() => {
                        let _ = reply.send(Err(anyhow!("get value failed: {err:?}")));
                        return;
                    }
                    Err(err) => debug!(?err, found = values.len(), "Value lookup ended early"),
                }

                if last {
                    let _ = reply.send(Ok(values));
                } else if values.len() >= MAX_VALUE_CANDIDATES {
                    self.finish_query(id);
                    let _ = reply.send(Ok(values));
                } else {
                    self.pending_queries
                        .insert(id, PendingQuery::GetValues { reply, values });
                }
            }
            (PendingQuery::PutValue(reply), QueryResult::PutRecord(result)) => {
                let _ = reply.send(
                    result
                        .map(|_| ())
                        .map_err(|err| anyhow!("put value failed: {err:?}")),
                );
            }
            (_, result) => {
                warn!(?id, ?result, "Query result does not match request");
            }
        }
    }

    fn handle_identify_event(&mut self, event: identify::Event) {
        match event {
            identify::Event::Received { peer_id, info, .. } => {
                debug!(
                    peer = %peer_id,
                    agent_version = %info.agent_version,
                    protocol_version = %info.protocol_version,
                    listen_addrs = info.listen_addrs.len(),
                    protocols = info.protocols.len(),
                    "Received peer info"
                );

                if info.protocols.contains(&KAD_PROTOCOL) {
                    let kademlia = &mut self.swarm.behaviour_mut().kademlia;
                    for addr in info.listen_addrs {
                        kademlia.add_address(&peer_id, addr);
                    }
                }
            }
            identify::Event::Sent { peer_id, .. } => {
                trace!(peer = %peer_id, "Sent identify info");
            }
            identify::Event::Pushed { peer_id, .. } => {
                trace!(peer = %peer_id, "Pushed identify update");
            }
            identify::Event::Error { peer_id, error, .. } => {
                warn!(peer = %peer_id, ?error, "Identify error");
            }
        }
    }

    fn dispatch_command(&mut self, command: NetworkCommand) {
        trace!(%command, "Network command");
        match command {
            NetworkCommand::Subscribe {
                topic,
                messages,
                reply,
            } => {
                let _ = reply.send(self.subscribe(topic, messages));
            }
            NetworkCommand::Publish { topic, data, reply } => {
                let _ = reply.send(self.publish_to_topic(topic, data));
            }
            NetworkCommand::Provide { key, reply } => {
                match self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .start_providing(RecordKey::new(&key))
                {
                    Ok(id) => {
                        self.pending_queries.insert(id, PendingQuery::Provide(reply));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(anyhow!("provide failed: {err:?}")));
                    }
                }
            }
            NetworkCommand::FindProviders {
                key,
                limit,
                providers,
            } => {
                let id = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .get_providers(RecordKey::new(&key));
                self.pending_queries.insert(
                    id,
                    PendingQuery::FindProviders {
                        providers,
                        limit,
                        seen: HashSet::new(),
                    },
                );
            }
            NetworkCommand::Connect { peer_id, reply } => self.connect(peer_id, reply),
            NetworkCommand::GetValues { key, reply } => {
                let id = self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .get_record(RecordKey::new(&key));
                self.pending_queries.insert(
                    id,
                    PendingQuery::GetValues {
                        reply,
                        values: Vec::new(),
                    },
                );
            }
            NetworkCommand::PutValue { key, value, reply } => {
                let record = Record::new(RecordKey::new(&key), value);
                match self
                    .swarm
                    .behaviour_mut()
                    .kademlia
                    .put_record(record, Quorum::One)
                {
                    Ok(id) => {
                        self.pending_queries.insert(id, PendingQuery::PutValue(reply));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(anyhow!("put value failed: {err:?}")));
                    }
                }
            }
        }
    }

    fn subscribe(
        &mut self,
        topic: String,
        messages: stream_mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<()> {
        let topic = IdentTopic::new(topic);
        let hash = topic.hash();

        if !self.topic_subscribers.contains_key(&hash) {
            self.swarm
                .behaviour_mut()
                .gossipsub
                .subscribe(&topic)
                .map_err(|e| anyhow!("Subscribe failed for {topic}: {e:?}"))?;
            info!(topic = %topic, "Subscribed to topic");
        }

        self.topic_subscribers.entry(hash).or_default().push(messages);
        Ok(())
    }

    fn publish_to_topic(&mut self, topic: String, data: Vec<u8>) -> Result<()> {
        match self
            .swarm
            .behaviour_mut()
            .gossipsub
            .publish(IdentTopic::new(topic.clone()), data)
        {
            Ok(_) => {
                debug!(topic = %topic, "Broadcasted name record");
                Ok(())
            }
            Err(err) => {
                // Republished records are byte-identical, and a fresh topic has no mesh yet.
                let err_str = format!("{:?}", err);
                if err_str.contains("Duplicate")
                    || err_str.contains("NoPeersSubscribedToTopic")
                    || err_str.contains("InsufficientPeers")
                {
                    debug!(topic = %topic, ?err, "Publish had no new recipients");
                    Ok(())
                } else {
                    Err(anyhow!("publish failed: {err:?}"))
                }
            }
        }
    }

    fn connect(&mut self, peer_id: PeerId, reply: Reply<()>) {
        if self.swarm.is_connected(&peer_id) {
            let _ = reply.send(Ok(()));
            return;
        }

        if let Some(waiting) = self.pending_dials.get_mut(&peer_id) {
            waiting.push(reply);
            return;
        }

        match self.swarm.dial(peer_id) {
            Ok(()) => {
                self.set_peer_state(peer_id, ConnectionState::Connecting);
                self.pending_dials.insert(peer_id, vec![reply]);
            }
            Err(err) => {
                let _ = reply.send(Err(anyhow!("dial failed: {err}")));
            }
        }
    }

    fn finish_query(&mut self, id: QueryId) {
        if let Some(mut query) = self.swarm.behaviour_mut().kademlia.query_mut(&id) {
            query.finish();
        }
    }

    fn connect_to_peers(&mut self, peers: Vec<Multiaddr>) {
        for peer in peers {
            if let Some(peer_id) = peer_id_of(&peer)
                && peer_id != self.local_peer_id()
            {
                let current_state = self.peer_table.lock().get(&peer_id).cloned();
                if !matches!(current_state, Some(ConnectionState::Disconnected) | None) {
                    trace!(?peer_id, "Already connected");
                    continue;
                }

                if let Err(err) = self.swarm.dial(peer.clone()) {
                    warn!(?err, "Failed to dial peer");
                    continue;
                }

                info!(peer = %peer_id, "Dialing bootnode");
                self.set_peer_state(peer_id, ConnectionState::Connecting);
            }
        }
    }

    fn add_bootnodes_to_routing(&mut self) {
        for addr in self.network_config.bootnodes.to_multiaddrs() {
            match peer_id_of(&addr) {
                Some(peer_id) => {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
                None => warn!(%addr, "Bootnode address has no /p2p/ component"),
            }
        }
    }

    fn set_peer_state(&self, peer_id: PeerId, state: ConnectionState) {
        self.peer_table.lock().insert(peer_id, state);

        let connected = self.connected_peers();
        self.peer_count.store(connected, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.set_peers(connected as i64);
        }
    }

    fn connected_peers(&self) -> u64 {
        self.peer_table
            .lock()
            .values()
            .filter(|s| **s == ConnectionState::Connected)
            .count() as u64
    }

    pub fn peer_table(&self) -> Arc<Mutex<HashMap<PeerId, ConnectionState>>> {
        self.peer_table.clone()
    }

    pub fn local_peer_id(&self) -> PeerId {
        *self.swarm.local_peer_id()
    }

    pub fn swarm_mut(&mut self) -> &mut Swarm<NameNetworkBehaviour> {
        &mut self.swarm
    }

    fn build_behaviour(
        local_key: &Keypair,
        cfg: &NetworkServiceConfig,
    ) -> Result<NameNetworkBehaviour> {
        let identify = Self::build_identify(local_key);
        let gossipsub = gossipsub::GossipsubBehaviour::new_with_transform(
            MessageAuthenticity::Anonymous,
            cfg.gossipsub_config.config.clone(),
            Compressor::default(),
        )
        .map_err(|err| anyhow!("Failed to create gossipsub behaviour: {err:?}"))?;

        let kademlia = Self::build_kademlia(local_key.public().to_peer_id());

        let connection_limits = connection_limits::Behaviour::new(
            ConnectionLimits::default()
                .with_max_pending_incoming(Some(16))
                .with_max_pending_outgoing(Some(32))
                .with_max_established_per_peer(Some(2)),
        );

        Ok(NameNetworkBehaviour {
            identify,
            gossipsub,
            kademlia,
            connection_limits,
        })
    }

    fn build_identify(local_key: &Keypair) -> identify::Behaviour {
        let identify_config =
            identify::Config::new(IDENTIFY_PROTOCOL_VERSION.into(), local_key.public())
                .with_agent_version(AGENT_VERSION.to_string());

        identify::Behaviour::new(identify_config)
    }

    fn build_kademlia(local_peer_id: PeerId) -> kad::Behaviour<MemoryStore> {
        let mut config = kad::Config::new(KAD_PROTOCOL);
        config.set_query_timeout(Duration::from_secs(30));
        // Inbound puts land in the store only after store_inbound_record accepts them.
        config.set_record_filtering(kad::StoreInserts::FilterBoth);

        let mut kademlia =
            kad::Behaviour::with_config(local_peer_id, MemoryStore::new(local_peer_id), config);
        kademlia.set_mode(Some(kad::Mode::Server));
        kademlia
    }

    fn multiaddr(cfg: &NetworkServiceConfig) -> Result<Multiaddr> {
        let mut addr: Multiaddr = cfg.socket_address.into();
        addr.push(Protocol::Udp(cfg.socket_port));
        addr.push(Protocol::QuicV1);
        Ok(addr)
    }

    fn listen(&mut self, addr: &Multiaddr) -> Result<()> {
        self.swarm
            .listen_on(addr.clone())
            .map_err(|e| anyhow!("Failed to listen on {addr:?}: {e:?}"))?;
        info!(?addr, "Listening on");
        Ok(())
    }
}
