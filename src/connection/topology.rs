use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use parking_lot::RwLock;
use tracing::info;

use crate::protocol::messages::metadata::{MetadataResponseBroker, MetadataResponseTopic};

#[derive(Debug, Default)]
pub struct BrokerTopology {
    /// Brokers keyed by broker ID
    topology: RwLock<HashMap<i32, Broker>>,
    /// Per-partition leader metadata keyed by topic name, populated from the last
    /// `Metadata` response that mentioned that topic.
    topics: RwLock<HashMap<String, Vec<PartitionMetadata>>>,
}

/// What [`BrokerConnector::partitions_for`](super::BrokerConnector::partitions_for) and
/// [`BrokerConnector::get_leader`](super::BrokerConnector::get_leader) need from a
/// `Metadata` response, cached so repeated lookups don't round-trip to a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub partition_index: i32,
    pub leader_id: i32,
}

#[derive(Debug, Clone)]
pub struct Broker {
    /// broker ID from the topology metadata
    pub id: i32,
    host: String,
    port: i32,
}

impl Display for Broker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<'a> From<&'a MetadataResponseBroker> for Broker {
    fn from(b: &'a MetadataResponseBroker) -> Self {
        Self {
            id: b.node_id,
            host: b.host.clone(),
            port: b.port,
        }
    }
}

impl BrokerTopology {
    pub fn is_empty(&self) -> bool {
        self.topology.read().is_empty()
    }

    /// Returns the broker for the provided broker ID
    pub async fn get_broker(&self, broker_id: i32) -> Option<Broker> {
        self.topology.read().get(&broker_id).cloned()
    }

    /// Returns a list of all brokers
    pub fn get_brokers(&self) -> Vec<Broker> {
        self.topology.read().values().cloned().collect()
    }

    /// Returns the cached per-partition leader metadata for `topic`, or `None` if this
    /// topic hasn't been seen in a `Metadata` response yet (or its cache entry was
    /// explicitly invalidated).
    pub fn get_topic(&self, topic: &str) -> Option<Vec<PartitionMetadata>> {
        self.topics.read().get(topic).cloned()
    }

    /// Replaces the cached partition metadata for every topic in `topics` with what the
    /// broker just reported.
    pub fn update_topics(&self, topics: &[MetadataResponseTopic]) {
        let mut cache = self.topics.write();
        for topic in topics {
            let partitions = topic
                .partitions
                .iter()
                .map(|p| PartitionMetadata {
                    partition_index: p.partition_index,
                    leader_id: p.leader_id,
                })
                .collect();
            cache.insert(topic.name.clone(), partitions);
        }
    }

    /// Drops `topic`'s cached partition metadata, forcing the next
    /// [`BrokerConnector::partitions_for`](super::BrokerConnector::partitions_for) or
    /// [`BrokerConnector::get_leader`](super::BrokerConnector::get_leader) call to fetch
    /// fresh metadata rather than serving a potentially stale leader.
    pub fn invalidate_topic(&self, topic: &str) {
        self.topics.write().remove(topic);
    }

    /// Updates with the provided broker metadata
    pub fn update(&self, brokers: &[MetadataResponseBroker]) {
        let mut topology = self.topology.write();
        for broker in brokers {
            match topology.entry(broker.node_id) {
                Entry::Occupied(mut o) => {
                    let current = o.get_mut();
                    if current.host != broker.host || current.port != broker.port {
                        let new = Broker::from(broker);
                        info!(
                            broker=broker.node_id,
                            current=%current,
                            new=%new,
                            "Broker update",
                        );
                        *current = new;
                    }
                }
                Entry::Vacant(v) => {
                    let new = Broker::from(broker);
                    info!(
                        broker=broker.node_id,
                        new=%new,
                        "New broker",
                    );
                    v.insert(new);
                }
            }
        }
    }
}
