//! [`Producer`]: a whole-topic producer built on one [`PartitionClient`] per partition.
//!
//! The partitioner lives here rather than on [`PartitionClient`] itself, since picking a
//! partition is a whole-topic concern (it needs the partition count) while everything
//! below that -- buffering, encoding, sending, per-partition retry -- is already owned
//! by the single-partition client.

mod async_producer;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use async_producer::{AsyncProducer, AsyncProducerConfig};

use crate::backoff::BackoffConfig;
use crate::client::error::{Error, Result};
use crate::client::partition::{MessageBuffer, PartitionClient, PendingMessage, UnknownTopicHandling};
use crate::connection::BrokerConnector;
use crate::protocol::messages::produce::ACKS_LEADER;
use crate::protocol::record::Compression;

/// Configuration for [`Producer`], matching the producer configuration surface in the
/// broker client's external interface.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    /// `0` = fire-and-forget, `1` = wait for the leader, `-1` = wait for the full ISR.
    pub required_acks: i16,
    pub ack_timeout_ms: i32,
    /// How many additional attempts [`Producer::deliver_messages`] makes at a batch
    /// that still has undelivered records after a round of per-partition sends.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_buffer_size: usize,
    pub max_buffer_bytesize: usize,
    pub compression: Compression,
    /// A partition's pending batch is only compressed once its encoded size would meet
    /// this many bytes; small batches are sent uncompressed to avoid per-message codec
    /// overhead dwarfing the saving.
    pub compression_threshold: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            required_acks: ACKS_LEADER,
            ack_timeout_ms: 10_000,
            max_retries: 3,
            retry_backoff: Duration::from_millis(250),
            max_buffer_size: 10_000,
            max_buffer_bytesize: 16 * 1024 * 1024,
            compression: Compression::None,
            compression_threshold: 1,
        }
    }
}

/// The Kafka-family `murmur2` variant used to hash a partitioning key into a partition
/// index. Deterministic and stable across processes/runs -- the same key always lands
/// on the same partition for a given partition count.
pub fn murmur2(data: &[u8]) -> i32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let length = data.len();
    let mut h: u32 = SEED ^ (length as u32);

    let chunks = length / 4;
    for i in 0..chunks {
        let base = i * 4;
        let mut k = (data[base] as u32)
            | ((data[base + 1] as u32) << 8)
            | ((data[base + 2] as u32) << 16)
            | ((data[base + 3] as u32) << 24);

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks * 4;
    match length & 3 {
        3 => {
            h ^= (data[tail + 2] as u32) << 16;
            h ^= (data[tail + 1] as u32) << 8;
            h ^= data[tail] as u32;
            h = h.wrapping_mul(M);
        }
        2 => {
            h ^= (data[tail + 1] as u32) << 8;
            h ^= data[tail] as u32;
            h = h.wrapping_mul(M);
        }
        1 => {
            h ^= data[tail] as u32;
            h = h.wrapping_mul(M);
        }
        _ => {}
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h as i32
}

/// `murmur2(key) mod partition_count`, folding the hash into the non-negative range
/// first so the modulo can't land on a negative partition index.
fn partition_for_key(key: &[u8], partition_count: i32) -> i32 {
    let hash = murmur2(key) & 0x7fff_ffff;
    hash % partition_count
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// One partition of the topic this [`Producer`] was built for: its client plus the
/// records buffered for it so far.
struct Partition {
    id: i32,
    client: PartitionClient,
    buffer: Mutex<MessageBuffer>,
}

/// A producer for a whole topic: one [`PartitionClient`] per partition, a partitioner
/// that picks which one a given message lands on, and the buffering/retry envelope
/// described in the broker client's producer-core contract.
///
/// Doesn't implement the async, queue-fed variant itself -- see [`AsyncProducer`] for
/// that.
pub struct Producer {
    topic: String,
    partitions: Vec<Partition>,
    round_robin: AtomicU32,
    config: ProducerConfig,
    brokers: Arc<BrokerConnector>,
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("topic", &self.topic)
            .field("partition_count", &self.partitions.len())
            .finish_non_exhaustive()
    }
}

impl Producer {
    pub(crate) async fn new(
        brokers: Arc<BrokerConnector>,
        backoff_config: Arc<BackoffConfig>,
        topic: String,
        config: ProducerConfig,
    ) -> Result<Self> {
        let mut partition_ids = brokers.partitions_for(&topic).await?;
        partition_ids.sort_unstable();

        let mut partitions = Vec::with_capacity(partition_ids.len());
        for id in partition_ids {
            let client = PartitionClient::new(
                topic.clone(),
                id,
                Arc::clone(&brokers),
                UnknownTopicHandling::Error,
                Arc::clone(&backoff_config),
            )
            .await?;

            partitions.push(Partition {
                id,
                client,
                buffer: Mutex::new(MessageBuffer::default()),
            });
        }

        Ok(Self {
            topic,
            partitions,
            round_robin: AtomicU32::new(0),
            config,
            brokers,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    fn partition_count(&self) -> i32 {
        self.partitions.len() as i32
    }

    fn choose_partition(&self, partition: Option<i32>, partition_key: Option<&[u8]>, key: Option<&[u8]>) -> i32 {
        if let Some(p) = partition {
            return p;
        }

        match partition_key.or(key) {
            Some(hash_key) => partition_for_key(hash_key, self.partition_count()),
            None => {
                let n = self.round_robin.fetch_add(1, Ordering::Relaxed);
                (n % self.partition_count() as u32) as i32
            }
        }
    }

    fn partition_index(&self, id: i32) -> Result<usize> {
        self.partitions
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::ArgumentError(format!("partition {id} not found for topic '{}'", self.topic)))
    }

    /// Buffers `value`/`key` for later delivery, picking a partition per the contract in
    /// [`Self::choose_partition`] unless `partition` is given explicitly. Fails with
    /// [`Error::BufferOverflow`] once the target partition's buffer is at capacity.
    pub async fn produce(
        &self,
        value: Option<Vec<u8>>,
        key: Option<Vec<u8>>,
        partition: Option<i32>,
        partition_key: Option<Vec<u8>>,
    ) -> Result<()> {
        let target = self.choose_partition(partition, partition_key.as_deref(), key.as_deref());
        let index = self.partition_index(target)?;
        let p = &self.partitions[index];

        let mut buffer = p.buffer.lock().await;
        if buffer.len() >= self.config.max_buffer_size {
            return Err(Error::BufferOverflow(format!(
                "partition {target} of topic '{}' has {} buffered messages (limit {})",
                self.topic,
                buffer.len(),
                self.config.max_buffer_size
            )));
        }
        if buffer.size_bytes() >= self.config.max_buffer_bytesize {
            return Err(Error::BufferOverflow(format!(
                "partition {target} of topic '{}' has {} buffered bytes (limit {})",
                self.topic,
                buffer.size_bytes(),
                self.config.max_buffer_bytesize
            )));
        }

        buffer.push(PendingMessage {
            key,
            value,
            timestamp: Some(now_millis()),
        });
        Ok(())
    }

    /// The number of messages currently buffered across every partition.
    pub async fn buffered_message_count(&self) -> usize {
        let mut total = 0;
        for p in &self.partitions {
            total += p.buffer.lock().await.len();
        }
        total
    }

    /// Drives delivery of every partition's buffered records to completion, retrying a
    /// whole round of sends up to `max_retries` additional times (refreshing cluster
    /// metadata between attempts) if any partition still has undelivered records
    /// afterwards.
    pub async fn deliver_messages(&self) -> Result<()> {
        let mut rejected = 0usize;
        let mut last_rejection: Option<Error> = None;

        for attempt in 0..=self.config.max_retries {
            let mut pending = 0usize;

            for p in &self.partitions {
                let taken = {
                    let mut buffer = p.buffer.lock().await;
                    if buffer.is_empty() {
                        continue;
                    }
                    buffer.take()
                };
                let count = taken.len();

                if self.config.required_acks == 0 {
                    // Fire-and-forget: don't keep the records around to retry, there's
                    // nothing to retry against once acks are disabled.
                    if let Err(e) = p
                        .client
                        .produce(taken, self.config.compression, self.config.required_acks, self.config.ack_timeout_ms)
                        .await
                    {
                        debug!(topic = self.topic.as_str(), partition = p.id, error = %e, "acks=0 produce failed, dropping");
                    }
                    continue;
                }

                let restore_on_failure = taken.clone();
                match p
                    .client
                    .produce(taken, self.config.compression, self.config.required_acks, self.config.ack_timeout_ms)
                    .await
                {
                    Ok(_base_offset) => {}
                    Err(e) if crate::client::is_retriable(&e) => {
                        warn!(topic = self.topic.as_str(), partition = p.id, error = %e, "produce attempt failed, will retry");
                        let mut buffer = p.buffer.lock().await;
                        buffer.restore(restore_on_failure);
                        pending += count;
                    }
                    Err(e) => {
                        // Non-retriable: the broker will never accept these records as
                        // they are (e.g. MessageSizeTooLarge, CorruptMessage), so
                        // retrying them would just jam this partition's buffer forever.
                        // Drop them and surface the specific error instead.
                        warn!(
                            topic = self.topic.as_str(),
                            partition = p.id,
                            error = %e,
                            count,
                            "produce attempt rejected, dropping records"
                        );
                        rejected += count;
                        last_rejection = Some(e);
                    }
                }
            }

            if pending == 0 {
                break;
            }

            if attempt < self.config.max_retries {
                self.brokers.refresh_metadata().await.ok();
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        if let Some(e) = last_rejection {
            return Err(Error::DeliveryRejected(rejected, Box::new(e)));
        }

        let remaining = self.buffered_message_count().await;
        if remaining > 0 {
            return Err(Error::DeliveryFailed(remaining));
        }
        Ok(())
    }

    /// Delivers any buffered records and releases this producer's partition clients.
    /// Best-effort: a failed final delivery is logged, not propagated.
    pub async fn shutdown(self) {
        if let Err(e) = self.deliver_messages().await {
            warn!(topic = self.topic.as_str(), error = %e, "final delivery on shutdown failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn murmur2_is_deterministic() {
        assert_eq!(murmur2(b"21"), murmur2(b"21"));
        assert_ne!(murmur2(b"21"), murmur2(b"22"));
    }

    #[test]
    fn partition_for_key_is_in_range() {
        for key in [b"a".as_slice(), b"user-42", b""] {
            let p = partition_for_key(key, 8);
            assert!((0..8).contains(&p));
        }
    }
}
