use std::collections::BTreeSet;

/// A topic and the partition IDs a consumer group subscription or `list_topics` call
/// cares about. Leader/replica/ISR detail lives in cluster metadata
/// ([`MetadataResponseTopic`](crate::protocol::messages::metadata::MetadataResponseTopic)),
/// not here -- this is the flattened shape the consumer-group assignment algorithms and
/// `Client::list_topics` work with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// The partition IDs of this topic.
    pub partitions: BTreeSet<i32>,
}
