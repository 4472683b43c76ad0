//! [`FetchOperation`]: groups per-partition fetch requests by leader broker and issues
//! them concurrently, for a consumer loop that holds many assigned partitions at once.
//!
//! [`PartitionClient::fetch_records`](crate::client::partition::PartitionClient::fetch_records)
//! already does this for a single partition; this is the multi-partition counterpart a
//! consumer loop builds one of per poll cycle, covering however many partitions the
//! current assignment spans, however many leaders those partitions happen to be spread
//! across.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::client::error::{Error, RequestContext, Result};
use crate::connection::BrokerConnector;
use crate::protocol::api_key::ApiKey;
use crate::protocol::messages::fetch::{
    FetchRequest, FetchRequestPartition, FetchRequestTopic, FetchResponsePartition, API_VERSION_FETCH,
};
use crate::protocol::record::Record;

/// Configuration for a [`FetchOperation`], matching the broker client's fetch
/// configuration surface.
#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    /// How long the broker may wait for `min_bytes` to accumulate before replying.
    pub max_wait_ms: i32,
    /// The broker won't reply before this many bytes are available across the
    /// partitions in the request, unless `max_wait_ms` elapses first.
    pub min_bytes: i32,
    /// Per-partition cap on bytes returned, applied to every slot added via
    /// [`FetchOperation::fetch_from_partition`] unless overridden there.
    pub max_bytes: i32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: 500,
            min_bytes: 1,
            max_bytes: 1024 * 1024,
        }
    }
}

/// A single record returned by a fetch, with the `(topic, partition)` it came from
/// carried alongside it since [`FetchOperation::execute`] returns batches from more
/// than one partition at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub create_time: Option<i64>,
}

/// The decoded result of fetching one partition: `messages` is ascending in `offset`;
/// `last_offset` is the offset of the last message, or unchanged (the partition's
/// fetch offset minus one) if the batch came back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBatch {
    pub topic: String,
    pub partition: i32,
    pub highwater_mark: i64,
    pub last_offset: i64,
    pub messages: Vec<FetchedMessage>,
}

#[derive(Debug, Clone)]
struct FetchSlot {
    topic: String,
    partition: i32,
    offset: i64,
    max_bytes: i32,
}

/// Builds up a set of `(topic, partition, offset)` slots to fetch, then executes one
/// `FetchRequest` per leader broker those slots are spread across.
#[derive(Debug)]
pub struct FetchOperation {
    brokers: Arc<BrokerConnector>,
    config: FetchConfig,
    slots: Vec<FetchSlot>,
}

impl FetchOperation {
    pub fn new(brokers: Arc<BrokerConnector>, config: FetchConfig) -> Self {
        Self {
            brokers,
            config,
            slots: Vec::new(),
        }
    }

    /// Records a request slot for `topic`/`partition` starting at `offset`, capped at
    /// `max_bytes` (or the operation's default `max_bytes` if `None`).
    pub fn fetch_from_partition(
        &mut self,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        max_bytes: Option<i32>,
    ) -> &mut Self {
        self.slots.push(FetchSlot {
            topic: topic.into(),
            partition,
            offset,
            max_bytes: max_bytes.unwrap_or(self.config.max_bytes),
        });
        self
    }

    /// Groups every recorded slot by leader broker and issues one `FetchRequest` per
    /// leader concurrently. Returns one result per slot, in the order slots were added;
    /// a partition-level failure (stale leader, corrupt batch, ...) only fails that
    /// slot's entry, never its siblings'.
    pub async fn execute(self) -> Vec<Result<FetchedBatch>> {
        let order: Vec<(String, i32)> = self.slots.iter().map(|s| (s.topic.clone(), s.partition)).collect();

        let mut by_leader: BTreeMap<i32, Vec<FetchSlot>> = BTreeMap::new();
        let mut results: HashMap<(String, i32), Result<FetchedBatch>> = HashMap::new();

        for slot in self.slots {
            match self.brokers.get_leader(&slot.topic, slot.partition).await {
                Ok(leader_id) => by_leader.entry(leader_id).or_default().push(slot),
                Err(e) => {
                    results.insert((slot.topic.clone(), slot.partition), Err(e.into()));
                }
            }
        }

        let brokers = self.brokers.as_ref();
        let config = self.config;
        let leader_futures = by_leader
            .into_iter()
            .map(|(leader_id, slots)| fetch_from_leader(brokers, leader_id, slots, config));

        for (key, result) in futures::future::join_all(leader_futures).await.into_iter().flatten() {
            results.insert(key, result);
        }

        order
            .into_iter()
            .map(|key| {
                results.remove(&key).unwrap_or_else(|| {
                    Err(Error::InvalidResponse(format!(
                        "missing partition {} of topic '{}' in fetch response",
                        key.1, key.0
                    )))
                })
            })
            .collect()
    }
}

type KeyedResult = ((String, i32), Result<FetchedBatch>);

/// Fetches every slot assigned to `leader_id` in a single request, returning one
/// keyed result per slot -- partition errors included, so a bad partition doesn't drop
/// its siblings from the same leader.
async fn fetch_from_leader(
    brokers: &BrokerConnector,
    leader_id: i32,
    slots: Vec<FetchSlot>,
    config: FetchConfig,
) -> Vec<KeyedResult> {
    let mut topics: BTreeMap<String, Vec<FetchRequestPartition>> = BTreeMap::new();
    for slot in &slots {
        topics.entry(slot.topic.clone()).or_default().push(FetchRequestPartition {
            partition: slot.partition,
            fetch_offset: slot.offset,
            partition_max_bytes: slot.max_bytes,
        });
    }

    let request = FetchRequest {
        replica_id: -1,
        max_wait_ms: config.max_wait_ms,
        min_bytes: config.min_bytes,
        topics: topics
            .into_iter()
            .map(|(topic, partitions)| FetchRequestTopic { topic, partitions })
            .collect(),
    };

    let connection = match brokers.connect(leader_id).await {
        Ok(Some(conn)) => conn,
        Ok(None) => {
            let err = Error::InvalidResponse(format!("leader {leader_id} not found in cluster metadata"));
            return keyed_errors(slots, err);
        }
        Err(e) => return keyed_errors(slots, e.into()),
    };

    let response: crate::protocol::messages::fetch::FetchResponse =
        match connection.request(ApiKey::Fetch, API_VERSION_FETCH, &request).await {
            Ok(r) => r,
            Err(e) => return keyed_errors(slots, Error::Request(e)),
        };

    let mut by_partition: HashMap<(String, i32), FetchResponsePartition> = HashMap::new();
    for topic in response.responses {
        for partition in topic.partitions {
            by_partition.insert((topic.topic.clone(), partition.partition_index), partition);
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            let key = (slot.topic.clone(), slot.partition);
            let result = match by_partition.remove(&key) {
                Some(p) => {
                    if p.error.is_some_and(|e| e.invalidates_metadata()) {
                        brokers.invalidate_topic(&slot.topic);
                    }
                    decode_batch(&slot, p)
                }
                None => Err(Error::InvalidResponse(format!(
                    "missing partition {} of topic '{}' in fetch response",
                    slot.partition, slot.topic
                ))),
            };
            (key, result)
        })
        .collect()
}

fn decode_batch(slot: &FetchSlot, partition: FetchResponsePartition) -> Result<FetchedBatch> {
    if let Some(protocol_error) = partition.error {
        return Err(Error::ServerError {
            protocol_error,
            error_message: None,
            request: RequestContext::Partition {
                topic: slot.topic.clone(),
                partition: slot.partition,
            },
        });
    }

    let decoded = partition
        .decode_records()
        .map_err(|e| Error::InvalidResponse(e.to_string()))?;

    let messages: Vec<FetchedMessage> = decoded
        .0
        .into_iter()
        .map(|Record { offset, timestamp, key, value }| FetchedMessage {
            topic: slot.topic.clone(),
            partition: slot.partition,
            offset,
            key,
            value,
            create_time: timestamp,
        })
        .collect();

    let last_offset = messages.last().map(|m| m.offset).unwrap_or(slot.offset - 1);

    Ok(FetchedBatch {
        topic: slot.topic.clone(),
        partition: slot.partition,
        highwater_mark: partition.high_watermark,
        last_offset,
        messages,
    })
}

fn keyed_errors(slots: Vec<FetchSlot>, err: Error) -> Vec<KeyedResult> {
    slots
        .into_iter()
        .map(|slot| {
            let key = (slot.topic.clone(), slot.partition);
            // Every slot on this leader failed the same way (couldn't even connect, or
            // the request round-trip itself failed); `Error` isn't `Clone`, so render
            // it to a string rather than cloning the structured variant.
            (key, Err(Error::InvalidResponse(err.to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_config_defaults_are_sane() {
        let config = FetchConfig::default();
        assert!(config.max_wait_ms > 0);
        assert!(config.min_bytes >= 1);
        assert!(config.max_bytes > 0);
    }
}
