//! The cluster-wide [`Client`] and the shared retry envelope its sub-clients build on.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::backoff::{Backoff, BackoffConfig};
use crate::build_info::DEFAULT_CLIENT_ID;
use crate::client::partition::PartitionClient;
use crate::connection::{Broker, BrokerCache, BrokerCacheGeneration, BrokerConnector, MetadataLookupMode, TlsConfig};
use crate::topic::Topic;

pub mod consumer_group;
pub mod error;
pub mod offset_manager;
pub mod partition;
pub mod producer;

use self::consumer_group::ConsumerGroup;
use self::partition::UnknownTopicHandling;
use self::producer::{AsyncProducer, AsyncProducerConfig, Producer, ProducerConfig};
use crate::fetch::{FetchConfig, FetchOperation};
use error::{Error, Result};

/// Runs `f` in a loop, retrying with `backoff_config`'s envelope as long as `f` returns a
/// retriable [`Error`], invalidating `broker_cache`'s cached connection (tagged with the
/// generation `f` observed it at) between attempts.
///
/// `f` returns `Ok` on success, or `Err((error, generation))` where `generation` is
/// `Some` if the failure should invalidate whatever cached connection `broker_cache`
/// handed out for this attempt (a connection-level error), or `None` if it shouldn't
/// (e.g. a request that never reached a broker).
pub(crate) async fn maybe_retry<B, R, F, T>(
    backoff_config: &BackoffConfig,
    broker_cache: B,
    request_name: &str,
    f: R,
) -> Result<T>
where
    B: BrokerCache,
    R: Fn() -> F + Send + Sync,
    F: Future<Output = Result<T, (Error, Option<BrokerCacheGeneration>)>> + Send,
    T: Send,
{
    let mut backoff = Backoff::new(backoff_config);

    backoff
        .retry_with_backoff(request_name, || async {
            match f().await {
                Ok(value) => ControlFlow::Break(Ok(value)),
                Err((err, gen)) => {
                    if let Some(gen) = gen {
                        broker_cache.invalidate(request_name, gen).await;
                    }

                    if is_retriable(&err) {
                        ControlFlow::Continue(err)
                    } else {
                        ControlFlow::Break(Err(err))
                    }
                }
            }
        })
        .await
        .map_err(Error::from)
}

/// Whether `err` is worth retrying rather than surfacing to the caller immediately.
pub(crate) fn is_retriable(err: &Error) -> bool {
    match err {
        Error::ServerError { protocol_error, .. } => protocol_error.is_retriable(),
        Error::Connection(_) | Error::Request(_) => true,
        Error::InvalidResponse(_)
        | Error::RetryFailed(_)
        | Error::BufferOverflow(_)
        | Error::DeliveryFailed(_)
        | Error::DeliveryRejected(_, _)
        | Error::ArgumentError(_) => false,
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    bootstrap_brokers: Vec<String>,
    client_id: Option<Arc<str>>,
    max_message_size: usize,
    tls_config: TlsConfig,
    backoff_config: Arc<BackoffConfig>,
}

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] with the list of bootstrap brokers.
    pub fn new(bootstrap_brokers: Vec<String>) -> Self {
        Self {
            bootstrap_brokers,
            client_id: None,
            max_message_size: 100 * 1024 * 1024, // 100MB
            tls_config: TlsConfig::default(),
            backoff_config: Default::default(),
        }
    }

    /// Sets the client ID sent with every request.
    pub fn client_id(mut self, client_id: impl Into<Arc<str>>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the maximum size (in bytes) of message frames that can be received from a
    /// broker.
    ///
    /// Setting this larger allows bigger size limits in
    /// [`PartitionClient::fetch_records`], at the cost of per-connection memory use.
    /// Setting it too small causes failures across the board, since even metadata
    /// responses have to fit within it.
    pub fn max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Overrides the retry/backoff envelope used by every sub-client this builder
    /// produces.
    pub fn backoff_config(mut self, backoff_config: BackoffConfig) -> Self {
        self.backoff_config = Arc::new(backoff_config);
        self
    }

    /// Configures TLS for broker connections.
    #[cfg(feature = "transport-tls")]
    pub fn tls_config(mut self, tls_config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(tls_config);
        self
    }

    /// Builds the [`Client`], dialing a bootstrap broker and fetching initial cluster
    /// metadata.
    pub async fn build(self) -> Result<Client> {
        let brokers = Arc::new(BrokerConnector::new(
            self.bootstrap_brokers,
            Some(self.client_id.unwrap_or_else(|| Arc::from(DEFAULT_CLIENT_ID))),
            self.tls_config,
            self.max_message_size,
        ));
        brokers.refresh_metadata().await?;

        Ok(Client {
            brokers,
            backoff_config: self.backoff_config,
        })
    }
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder").finish_non_exhaustive()
    }
}

/// Top-level cluster-wide client.
///
/// Used to query cluster-wide metadata and to construct the task-specific sub-clients:
/// [`PartitionClient`] for a single `(topic, partition)`, and [`ConsumerGroup`] for
/// group-coordinated consumption. Must be constructed via [`ClientBuilder`].
#[derive(Debug)]
pub struct Client {
    brokers: Arc<BrokerConnector>,
    backoff_config: Arc<BackoffConfig>,
}

impl Client {
    /// Returns a client for producing/fetching/looking up offsets on a specific
    /// partition.
    pub async fn partition_client(
        &self,
        topic: impl Into<String> + Send,
        partition: i32,
        unknown_topic_handling: UnknownTopicHandling,
    ) -> Result<PartitionClient> {
        PartitionClient::new(
            topic.into(),
            partition,
            Arc::clone(&self.brokers),
            unknown_topic_handling,
            Arc::clone(&self.backoff_config),
        )
        .await
    }

    /// Joins (or creates) a consumer group subscribed to `topics`.
    pub async fn consumer_group(&self, group: String, topics: &[Topic]) -> Result<ConsumerGroup> {
        ConsumerGroup::new(
            Arc::clone(&self.brokers),
            Arc::clone(&self.backoff_config),
            group,
            topics,
        )
        .await
    }

    /// Returns a whole-topic producer, with one partition client per partition.
    pub async fn producer(&self, topic: impl Into<String> + Send, config: ProducerConfig) -> Result<Producer> {
        Producer::new(
            Arc::clone(&self.brokers),
            Arc::clone(&self.backoff_config),
            topic.into(),
            config,
        )
        .await
    }

    /// Returns a queue-fed, background-worker-driven producer for `topic`.
    pub async fn async_producer(
        &self,
        topic: impl Into<String> + Send,
        config: AsyncProducerConfig,
    ) -> Result<AsyncProducer> {
        AsyncProducer::new(
            Arc::clone(&self.brokers),
            Arc::clone(&self.backoff_config),
            topic.into(),
            config,
        )
        .await
    }

    /// Returns every broker currently known from cluster topology.
    pub fn brokers(&self) -> Vec<Broker> {
        self.brokers.topology.get_brokers()
    }

    /// Starts a fresh [`FetchOperation`] sharing this client's broker connection pool,
    /// for a consumer loop to add per-partition slots to and execute each poll cycle.
    pub fn fetch_operation(&self, config: FetchConfig) -> FetchOperation {
        FetchOperation::new(Arc::clone(&self.brokers), config)
    }

    /// Returns every (non-internal) topic in the cluster.
    pub async fn list_topics(&self) -> Result<Vec<Topic>> {
        // Deliberately bypasses the cached topology and asks for unconstrained
        // (all-topics) metadata, so a topic created moments ago by this same client
        // shows up immediately rather than waiting for the next cache refresh.
        let (response, _gen) = self
            .brokers
            .request_metadata(&MetadataLookupMode::ArbitraryBroker, None)
            .await?;

        Ok(response
            .topics
            .into_iter()
            .filter(|t| !t.is_internal)
            .map(|t| Topic {
                name: t.name,
                partitions: t.partitions.into_iter().map(|p| p.partition_index).collect(),
            })
            .collect())
    }
}
