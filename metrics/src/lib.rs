pub mod server;

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    peers: IntGauge,
    subscriptions: IntGauge,
    // Name system
    publish_events: IntCounterVec,
    resolve_events: IntCounterVec,
    gossip_updates: IntCounterVec,
    republish_runs: IntCounterVec,
    bootstrap_connections: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let peers = IntGauge::with_opts(Opts::new("network_peers_connected", "Number of connected peers")).unwrap();
        registry.register(Box::new(peers.clone())).unwrap();

        let subscriptions = IntGauge::with_opts(Opts::new("ipns_subscriptions_active", "Number of names with an active gossip subscription")).unwrap();
        registry.register(Box::new(subscriptions.clone())).unwrap();

        let publish_events = IntCounterVec::new(
            Opts::new("ipns_publish_total", "Total number of name publications"),
            &["transport", "result"],
        ).unwrap();
        registry.register(Box::new(publish_events.clone())).unwrap();

        let resolve_events = IntCounterVec::new(
            Opts::new("ipns_resolve_total", "Total number of single-hop name resolutions"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(resolve_events.clone())).unwrap();

        let gossip_updates = IntCounterVec::new(
            Opts::new("ipns_gossip_updates_total", "Total number of name records received over gossip"),
            &["outcome"],
        ).unwrap();
        registry.register(Box::new(gossip_updates.clone())).unwrap();

        let republish_runs = IntCounterVec::new(
            Opts::new("ipns_republish_total", "Total number of republish cycles"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(republish_runs.clone())).unwrap();

        let bootstrap_connections = IntCounterVec::new(
            Opts::new("ipns_bootstrap_connections_total", "Total number of rendezvous connection attempts"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(bootstrap_connections.clone())).unwrap();

        Self {
            registry,
            peers,
            subscriptions,
            publish_events,
            resolve_events,
            gossip_updates,
            republish_runs,
            bootstrap_connections,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_peers(&self, v: i64) {
        self.peers.set(v);
    }

    pub fn set_subscriptions(&self, v: i64) {
        self.subscriptions.set(v);
    }

    // Name system
    pub fn inc_publish(&self, transport: &str, result: &str) {
        self.publish_events.with_label_values(&[transport, result]).inc();
    }

    pub fn inc_resolve(&self, result: &str) {
        self.resolve_events.with_label_values(&[result]).inc();
    }

    pub fn inc_gossip_update(&self, outcome: &str) {
        self.gossip_updates.with_label_values(&[outcome]).inc();
    }

    pub fn inc_republish(&self, result: &str) {
        self.republish_runs.with_label_values(&[result]).inc();
    }

    pub fn inc_bootstrap_connection(&self, result: &str) {
        self.bootstrap_connections.with_label_values(&[result]).inc();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedMetrics = Arc<Metrics>;
