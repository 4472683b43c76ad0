//! [`PartitionClient`]: the per-`(topic, partition)` client that the producer and
//! fetch engines are built on top of.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backoff::{Backoff, BackoffConfig};
use crate::client::error::{Error, RequestContext, Result};
use crate::connection::{BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector};
use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ProtocolError;
use crate::protocol::messages::fetch::{
    FetchRequest, FetchRequestPartition, FetchRequestTopic, API_VERSION_FETCH,
};
use crate::protocol::messages::list_offsets::{
    ListOffsetsRequest, ListOffsetsRequestPartition, ListOffsetsRequestTopic,
    API_VERSION_LIST_OFFSETS,
};
use crate::protocol::messages::produce::{
    ProduceRequest, ProduceRequestPartition, ProduceRequestTopic, API_VERSION_PRODUCE,
};
use crate::protocol::record::{Compression, MessageSet, Record};

/// What to do when a produce/fetch operation first resolves a topic that the cached
/// metadata doesn't know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownTopicHandling {
    /// Fail immediately with [`Error::InvalidResponse`].
    Error,
    /// Retry metadata resolution using the client's backoff envelope, on the
    /// assumption a topic that was just created hasn't propagated yet.
    Retry,
}

/// A message not yet sent to the broker, buffered by [`MessageBuffer`].
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: Option<i64>,
}

impl PendingMessage {
    fn size_bytes(&self) -> usize {
        self.key.as_ref().map_or(0, Vec::len) + self.value.as_ref().map_or(0, Vec::len) + 16
    }
}

/// Accumulates [`PendingMessage`]s for a single partition until the caller decides
/// it's time to flush, tracking total size so callers can bound memory use without
/// walking the buffer themselves.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    messages: Vec<PendingMessage>,
    size_bytes: usize,
}

impl MessageBuffer {
    pub fn push(&mut self, message: PendingMessage) {
        self.size_bytes += message.size_bytes();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Drains the buffer, returning everything accumulated so far.
    pub fn take(&mut self) -> Vec<PendingMessage> {
        self.size_bytes = 0;
        std::mem::take(&mut self.messages)
    }

    /// Puts previously-[`take`](Self::take)n messages back at the head of the buffer,
    /// for a delivery attempt that failed with a retriable error. Anything pushed since
    /// the `take` (there shouldn't be any, under the producer's single-flight-per-
    /// partition delivery loop, but this keeps the FIFO invariant regardless) ends up
    /// after the restored messages.
    pub fn restore(&mut self, messages: Vec<PendingMessage>) {
        let mut restored_bytes = 0;
        for m in &messages {
            restored_bytes += m.size_bytes();
        }

        let rest = std::mem::replace(&mut self.messages, messages);
        self.messages.extend(rest);
        self.size_bytes += restored_bytes;
    }
}

/// A single produce round-trip: encodes a batch of [`PendingMessage`]s into one
/// `MessageSet`, sends it, and maps the per-partition result back onto base offsets.
struct ProduceOperation<'a> {
    partition_client: &'a PartitionClient,
    messages: Vec<PendingMessage>,
}

impl ProduceOperation<'_> {
    async fn execute(
        self,
        compression: Compression,
        acks: i16,
        timeout_ms: i32,
    ) -> Result<i64> {
        let pc = self.partition_client;

        let records = MessageSet(
            self.messages
                .into_iter()
                .map(|m| Record {
                    offset: 0,
                    timestamp: m.timestamp,
                    key: m.key,
                    value: m.value,
                })
                .collect(),
        );

        let partition =
            ProduceRequestPartition::from_message_set(pc.partition, &records, compression)
                .map_err(|e| Error::ArgumentError(e.to_string()))?;

        let request = ProduceRequest {
            acks,
            timeout_ms,
            topics: vec![ProduceRequestTopic {
                name: pc.topic.clone(),
                partitions: vec![partition],
            }],
        };

        crate::client::maybe_retry(&pc.backoff_config, pc, "produce", || async {
            let (broker, gen) = pc.get().await.map_err(|e| (e, None))?;

            let response: crate::protocol::messages::produce::ProduceResponse = broker
                .request(ApiKey::Produce, API_VERSION_PRODUCE, &request)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            let partition_result = response
                .topics
                .into_iter()
                .find(|t| t.name == pc.topic)
                .and_then(|t| t.partitions.into_iter().find(|p| p.partition_index == pc.partition))
                .ok_or_else(|| {
                    (
                        Error::InvalidResponse(format!(
                            "missing partition {} of topic '{}' in produce response",
                            pc.partition, pc.topic
                        )),
                        None,
                    )
                })?;

            match partition_result.error {
                None => Ok(partition_result.base_offset),
                Some(protocol_error) => {
                    if protocol_error.invalidates_metadata() {
                        pc.brokers.invalidate_topic(&pc.topic);
                    }
                    Err((
                        Error::ServerError {
                            protocol_error,
                            error_message: None,
                            request: RequestContext::Partition {
                                topic: pc.topic.clone(),
                                partition: pc.partition,
                            },
                        },
                        Some(gen),
                    ))
                }
            }
        })
        .await
    }
}

/// Client for a single `(topic, partition)`: produce, fetch, and offset lookups all
/// target this one partition and share its cached leader connection.
#[derive(Debug)]
pub struct PartitionClient {
    topic: String,
    partition: i32,
    brokers: Arc<BrokerConnector>,
    unknown_topic_handling: UnknownTopicHandling,
    backoff_config: Arc<BackoffConfig>,
    current_broker: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

impl PartitionClient {
    pub(crate) async fn new(
        topic: String,
        partition: i32,
        brokers: Arc<BrokerConnector>,
        unknown_topic_handling: UnknownTopicHandling,
        backoff_config: Arc<BackoffConfig>,
    ) -> Result<Self> {
        let client = Self {
            topic,
            partition,
            brokers,
            unknown_topic_handling,
            backoff_config,
            current_broker: Mutex::new((None, BrokerCacheGeneration::START)),
        };

        // Resolve the leader once up front so construction fails fast for a
        // genuinely unknown topic/partition.
        match client.brokers.get_leader(&client.topic, client.partition).await {
            Ok(_) => Ok(client),
            Err(e) if client.unknown_topic_handling == UnknownTopicHandling::Retry => {
                let mut backoff = Backoff::new(&client.backoff_config);
                let topic = client.topic.clone();
                let partition = client.partition;
                let brokers = Arc::clone(&client.brokers);
                backoff
                    .retry_with_backoff("resolve partition leader", move || {
                        let topic = topic.clone();
                        let brokers = Arc::clone(&brokers);
                        async move {
                            match brokers.get_leader(&topic, partition).await {
                                Ok(_) => std::ops::ControlFlow::Break(Ok(())),
                                Err(e) => std::ops::ControlFlow::Continue(Error::Connection(e)),
                            }
                        }
                    })
                    .await?;
                Ok(client)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Produces a batch of records, returning the base offset assigned to the batch.
    pub async fn produce(
        &self,
        messages: Vec<PendingMessage>,
        compression: Compression,
        acks: i16,
        timeout_ms: i32,
    ) -> Result<i64> {
        ProduceOperation {
            partition_client: self,
            messages,
        }
        .execute(compression, acks, timeout_ms)
        .await
    }

    /// Fetches up to `max_bytes` starting at `offset`, waiting up to `max_wait_ms` for
    /// at least `min_bytes` to become available.
    pub async fn fetch_records(
        &self,
        offset: i64,
        max_bytes: i32,
        max_wait_ms: i32,
        min_bytes: i32,
    ) -> Result<(Vec<Record>, i64)> {
        let request = FetchRequest {
            replica_id: -1,
            max_wait_ms,
            min_bytes,
            topics: vec![FetchRequestTopic {
                topic: self.topic.clone(),
                partitions: vec![FetchRequestPartition {
                    partition: self.partition,
                    fetch_offset: offset,
                    partition_max_bytes: max_bytes,
                }],
            }],
        };

        let (broker, gen) = self.get().await?;
        let response: crate::protocol::messages::fetch::FetchResponse = broker
            .request(ApiKey::Fetch, API_VERSION_FETCH, &request)
            .await
            .map_err(Error::Request)?;

        let partition_result = response
            .responses
            .into_iter()
            .find(|t| t.topic == self.topic)
            .and_then(|t| t.partitions.into_iter().find(|p| p.partition_index == self.partition))
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "missing partition {} of topic '{}' in fetch response",
                    self.partition, self.topic
                ))
            })?;

        if let Some(protocol_error) = partition_result.error {
            if protocol_error.invalidates_metadata() {
                self.brokers.invalidate_topic(&self.topic);
                self.invalidate("fetch: stale leader", gen).await;
            }
            return Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Partition {
                    topic: self.topic.clone(),
                    partition: self.partition,
                },
            });
        }

        let records = partition_result
            .decode_records()
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok((records.0, partition_result.high_watermark))
    }

    /// Resolves `timestamp` (a real timestamp, or the well-known
    /// [`LATEST_TIMESTAMP`](crate::protocol::messages::list_offsets::LATEST_TIMESTAMP) /
    /// [`EARLIEST_TIMESTAMP`](crate::protocol::messages::list_offsets::EARLIEST_TIMESTAMP))
    /// to a concrete offset.
    pub async fn get_offset(&self, timestamp: i64) -> Result<i64> {
        let request = ListOffsetsRequest {
            replica_id: -1,
            topics: vec![ListOffsetsRequestTopic {
                name: self.topic.clone(),
                partitions: vec![ListOffsetsRequestPartition {
                    partition_index: self.partition,
                    timestamp,
                    max_num_offsets: 1,
                }],
            }],
        };

        let (broker, _gen) = self.get().await?;
        let response: crate::protocol::messages::list_offsets::ListOffsetsResponse = broker
            .request(ApiKey::ListOffsets, API_VERSION_LIST_OFFSETS, &request)
            .await
            .map_err(Error::Request)?;

        let partition_result = response
            .topics
            .into_iter()
            .find(|t| t.name == self.topic)
            .and_then(|t| t.partitions.into_iter().find(|p| p.partition_index == self.partition))
            .ok_or_else(|| {
                Error::InvalidResponse(format!(
                    "missing partition {} of topic '{}' in list-offsets response",
                    self.partition, self.topic
                ))
            })?;

        if let Some(protocol_error) = partition_result.error {
            return Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Partition {
                    topic: self.topic.clone(),
                    partition: self.partition,
                },
            });
        }

        partition_result
            .offsets
            .first()
            .copied()
            .ok_or_else(|| Error::InvalidResponse("empty offsets list".to_string()))
    }
}

/// Caches the leader broker connection for this partition.
#[async_trait]
impl BrokerCache for &PartitionClient {
    type R = crate::messenger::Messenger;
    type E = Error;

    async fn get(&self) -> Result<(BrokerConnection, BrokerCacheGeneration)> {
        let mut current = self.current_broker.lock().await;
        if let Some(conn) = &current.0 {
            return Ok((Arc::clone(conn), current.1));
        }

        let leader_id = self.brokers.get_leader(&self.topic, self.partition).await?;
        let broker = self
            .brokers
            .connect(leader_id)
            .await?
            .ok_or(ProtocolError::UnknownTopicOrPartition)
            .map_err(|_| {
                Error::InvalidResponse(format!(
                    "leader {leader_id} for partition {} of '{}' not found in metadata",
                    self.partition, self.topic
                ))
            })?;

        current.0 = Some(Arc::clone(&broker));
        current.1 = BrokerCacheGeneration::START;

        info!(
            topic = self.topic.as_str(),
            partition = self.partition,
            broker = leader_id,
            "resolved partition leader"
        );

        Ok((broker, current.1))
    }

    async fn invalidate(&self, reason: &'static str, _gen: BrokerCacheGeneration) {
        let mut guard = self.current_broker.lock().await;
        debug!(reason, topic = self.topic.as_str(), partition = self.partition, "invalidating cached leader connection");
        guard.0.take();
    }
}
