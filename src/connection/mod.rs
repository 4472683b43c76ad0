//! Broker connection pool and cluster metadata cache.
//!
//! [`BrokerConnector`] is the thing every higher-level client (the cluster-wide
//! [`Client`](crate::client::Client), [`PartitionClient`](crate::client::partition::PartitionClient),
//! [`ConsumerGroup`](crate::client::consumer_group::ConsumerGroup)) holds an `Arc` of. It
//! owns the set of bootstrap addresses, the live connection pool keyed by broker ID, and
//! the [`BrokerTopology`] cache built from the last `Metadata` response.

pub mod topology;
pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::messenger::{Messenger, RequestError};
use crate::protocol::api_key::ApiKey;
use crate::protocol::messages::metadata::{
    MetadataRequest, MetadataRequestTopic, MetadataResponse, API_VERSION_METADATA,
};

pub use topology::{Broker, BrokerTopology};
pub use transport::{Transport, TlsConfig};

/// A connected, framed broker connection. Cheaply cloneable: every holder shares the
/// same background read loop and in-flight correlation table.
pub type BrokerConnection = Arc<Messenger>;

/// Alias kept for symmetry with [`BrokerConnection`] at call sites that care about the
/// underlying transport type rather than the reference count.
pub type MessengerTransport = Messenger;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("no known brokers")]
    NoBrokers,

    #[error("broker {0} not found in cluster metadata")]
    BrokerNotFound(i32),

    #[error("transport error connecting to {broker}: {source}")]
    Transport {
        broker: String,
        source: transport::Error,
    },

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("topic '{0}' not found in cluster metadata")]
    TopicNotFound(String),

    #[error("partition {partition} not found for topic '{topic}'")]
    PartitionNotFound { topic: String, partition: i32 },

    #[error("partition {partition} of topic '{topic}' currently has no leader")]
    LeaderNotAvailable { topic: String, partition: i32 },
}

/// Tags a value returned by a [`BrokerCache`] with the generation it was valid for, so a
/// later `invalidate` call can tell whether the cache has already moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerCacheGeneration(u64);

impl BrokerCacheGeneration {
    pub const START: Self = Self(0);

    pub fn get(&self) -> u64 {
        self.0
    }

    fn bump(&mut self) {
        self.0 += 1;
    }

    /// Returns the next generation after this one, for callers (outside this module)
    /// that maintain their own `(connection, generation)` cache the way
    /// [`BrokerConnector`] does internally.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// A cached "current broker" for some purpose (the cluster controller, a consumer
/// group's coordinator, an arbitrary broker for metadata lookups). Implementors hand out
/// a cheaply cloneable connection and a generation token; callers that observe an I/O
/// failure call `invalidate` with that same token so a concurrent caller's success
/// doesn't stomp on a fresher connection.
#[async_trait]
pub trait BrokerCache: Send + Sync {
    type R: Send + Sync;
    type E: std::error::Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E>;

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration);
}

/// Which broker a metadata request should be sent to.
#[derive(Debug, Clone)]
pub enum MetadataLookupMode {
    /// Any currently-cached (or bootstrap) broker will do.
    ArbitraryBroker,
    /// A specific broker ID, e.g. when refreshing metadata after it pointed us at a
    /// broker that turned out to be stale.
    SpecificBroker(i32),
}

#[derive(Debug)]
pub struct BrokerConnector {
    bootstrap_brokers: Vec<String>,
    client_id: Option<Arc<str>>,
    tls_config: TlsConfig,
    connect_timeout: Option<std::time::Duration>,
    max_message_size: usize,

    pub(crate) topology: BrokerTopology,
    connections: SyncMutex<HashMap<i32, BrokerConnection>>,
    cached_arbitrary_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
    generation: AtomicU64,
}

impl BrokerConnector {
    pub fn new(
        bootstrap_brokers: Vec<String>,
        client_id: Option<Arc<str>>,
        tls_config: TlsConfig,
        max_message_size: usize,
    ) -> Self {
        Self {
            bootstrap_brokers,
            client_id,
            tls_config,
            connect_timeout: Some(std::time::Duration::from_secs(10)),
            max_message_size,
            topology: BrokerTopology::default(),
            connections: SyncMutex::new(HashMap::new()),
            cached_arbitrary_broker: Mutex::new((None, BrokerCacheGeneration::START)),
            generation: AtomicU64::new(0),
        }
    }

    /// Connects to `broker_id`, dialing fresh if there's no live connection cached.
    /// Returns `None` if `broker_id` isn't present in the cached topology.
    pub async fn connect(&self, broker_id: i32) -> Result<Option<BrokerConnection>, Error> {
        if let Some(conn) = self.connections.lock().get(&broker_id) {
            if !conn.is_poisoned() {
                return Ok(Some(Arc::clone(conn)));
            }
        }
        self.connections.lock().remove(&broker_id);

        let broker = match self.topology.get_broker(broker_id).await {
            Some(broker) => broker,
            None => return Ok(None),
        };

        let messenger = self.dial(&broker.to_string()).await?;
        let messenger = Arc::new(messenger);
        self.connections.lock().insert(broker_id, Arc::clone(&messenger));
        Ok(Some(messenger))
    }

    async fn dial(&self, addr: &str) -> Result<Messenger, Error> {
        let transport = Transport::connect(addr, self.tls_config.clone(), self.connect_timeout)
            .await
            .map_err(|source| Error::Transport {
                broker: addr.to_string(),
                source,
            })?;
        Ok(Messenger::new(transport, self.client_id.clone()))
    }

    /// Re-fetches cluster metadata from an arbitrary broker and merges it into the
    /// topology cache.
    pub async fn refresh_metadata(&self) -> Result<(), Error> {
        self.request_metadata(&MetadataLookupMode::ArbitraryBroker, None)
            .await?;
        Ok(())
    }

    /// Requests metadata for `topics` (`None` = all topics), updating the topology
    /// cache, and returns the response alongside the arbitrary-broker cache generation
    /// it was served by (for [`BrokerCache::invalidate`] on failure).
    pub async fn request_metadata(
        &self,
        mode: &MetadataLookupMode,
        topics: Option<Vec<String>>,
    ) -> Result<(MetadataResponse, BrokerCacheGeneration), Error> {
        let (broker, gen) = match mode {
            MetadataLookupMode::ArbitraryBroker => self.get().await?,
            MetadataLookupMode::SpecificBroker(id) => {
                let conn = self
                    .connect(*id)
                    .await?
                    .ok_or(Error::BrokerNotFound(*id))?;
                (conn, BrokerCacheGeneration::START)
            }
        };

        let request = MetadataRequest {
            topics: topics.map(|names| {
                names
                    .into_iter()
                    .map(|name| MetadataRequestTopic { name })
                    .collect()
            }),
        };

        let response: MetadataResponse = broker
            .request(ApiKey::Metadata, API_VERSION_METADATA, &request)
            .await?;

        self.topology.update(&response.brokers);
        self.topology.update_topics(&response.topics);
        debug!(brokers = response.brokers.len(), topics = response.topics.len(), "refreshed cluster metadata");

        Ok((response, gen))
    }

    /// Returns the partition IDs known for `topic`, consulting the cached topology
    /// first and only issuing a live `Metadata` request if the topic isn't cached yet
    /// (or was invalidated by [`Self::invalidate_topic`]).
    pub async fn partitions_for(&self, topic: &str) -> Result<Vec<i32>, Error> {
        if let Some(partitions) = self.topology.get_topic(topic) {
            return Ok(partitions.into_iter().map(|p| p.partition_index).collect());
        }

        let (response, _gen) = self
            .request_metadata(&MetadataLookupMode::ArbitraryBroker, Some(vec![topic.to_string()]))
            .await?;

        let t = response
            .topics
            .iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;

        Ok(t.partitions.iter().map(|p| p.partition_index).collect())
    }

    /// Resolves the broker ID currently leading `topic`/`partition`, consulting the
    /// cached topology first and only issuing a live `Metadata` request on a cache miss.
    /// A caller that hit a stale leader should call [`Self::invalidate_topic`] before
    /// retrying, or this will keep serving the same cached answer.
    pub async fn get_leader(&self, topic: &str, partition: i32) -> Result<i32, Error> {
        if let Some(partitions) = self.topology.get_topic(topic) {
            let p = partitions
                .iter()
                .find(|p| p.partition_index == partition)
                .ok_or_else(|| Error::PartitionNotFound {
                    topic: topic.to_string(),
                    partition,
                })?;

            if p.leader_id < 0 {
                return Err(Error::LeaderNotAvailable {
                    topic: topic.to_string(),
                    partition,
                });
            }

            return Ok(p.leader_id);
        }

        let (response, _gen) = self
            .request_metadata(&MetadataLookupMode::ArbitraryBroker, Some(vec![topic.to_string()]))
            .await?;

        let t = response
            .topics
            .iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| Error::TopicNotFound(topic.to_string()))?;

        let p = t
            .partitions
            .iter()
            .find(|p| p.partition_index == partition)
            .ok_or_else(|| Error::PartitionNotFound {
                topic: topic.to_string(),
                partition,
            })?;

        if p.leader_id < 0 {
            return Err(Error::LeaderNotAvailable {
                topic: topic.to_string(),
                partition,
            });
        }

        Ok(p.leader_id)
    }

    /// Drops `topic`'s cached partition/leader metadata, so the next
    /// [`Self::partitions_for`]/[`Self::get_leader`] call fetches fresh metadata instead
    /// of serving a stale leader. Callers invoke this after a request comes back with
    /// an error that [`invalidates_metadata`](crate::protocol::error::Error::invalidates_metadata).
    pub fn invalidate_topic(&self, topic: &str) {
        self.topology.invalidate_topic(topic);
    }

    /// Closes every cached connection. Connections reopen lazily on the next
    /// [`connect`](Self::connect).
    pub fn close_all(&self) {
        self.connections.lock().clear();
        self.cached_arbitrary_broker.try_lock().map(|mut g| g.0.take()).ok();
    }

    fn next_generation(&self) -> BrokerCacheGeneration {
        BrokerCacheGeneration(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Caches an arbitrary broker connection for metadata lookups: the topology doesn't
/// matter here, any reachable broker answers a `Metadata` request the same way.
#[async_trait]
impl BrokerCache for &BrokerConnector {
    type R = Messenger;
    type E = Error;

    async fn get(&self) -> Result<(Arc<Self::R>, BrokerCacheGeneration), Self::E> {
        let mut cached = self.cached_arbitrary_broker.lock().await;
        if let Some(conn) = &cached.0 {
            if !conn.is_poisoned() {
                return Ok((Arc::clone(conn), cached.1));
            }
        }

        // Try every known broker before falling back to the original bootstrap list.
        let candidates: Vec<String> = {
            let brokers = self.topology.get_brokers();
            if brokers.is_empty() {
                self.bootstrap_brokers.clone()
            } else {
                brokers.into_iter().map(|b| b.to_string()).collect()
            }
        };

        if candidates.is_empty() {
            return Err(Error::NoBrokers);
        }

        let mut last_err = None;
        for addr in &candidates {
            match self.dial(addr).await {
                Ok(messenger) => {
                    let messenger = Arc::new(messenger);
                    cached.0 = Some(Arc::clone(&messenger));
                    cached.1 = self.next_generation();
                    return Ok((messenger, cached.1));
                }
                Err(e) => {
                    warn!(broker = addr.as_str(), error = %e, "failed to connect, trying next broker");
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or(Error::NoBrokers))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut cached = self.cached_arbitrary_broker.lock().await;
        if cached.1 != gen {
            debug!(reason, "stale invalidation request for arbitrary broker cache");
            return;
        }

        info!(reason, "invalidating cached arbitrary broker connection");
        cached.0.take();
    }
}
