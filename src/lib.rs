//! An async client for a partitioned, replicated commit-log broker cluster.
//!
//! [`client::ClientBuilder`] builds the top-level [`client::Client`], which hands out
//! three task-specific sub-clients: [`client::partition::PartitionClient`] for
//! producing/fetching/looking up offsets on a single `(topic, partition)`,
//! [`client::consumer_group::ConsumerGroup`] for group-coordinated consumption, and
//! [`client::producer::Producer`] / [`client::producer::AsyncProducer`] for keyed,
//! partitioned production across a whole topic. [`client::offset_manager::OffsetManager`]
//! and [`heartbeat::Heartbeat`] sit alongside a [`ConsumerGroup`](client::consumer_group::ConsumerGroup)
//! in a consumer loop; [`fetch::FetchOperation`] groups that loop's per-partition fetch
//! requests by leader broker.
//!
//! Administrative operations (topic creation, ACLs, reassignment) are out of scope --
//! this client only talks to a cluster that already exists.

pub mod backoff;
pub mod build_info;
pub mod client;
pub mod connection;
pub mod fetch;
pub mod heartbeat;
pub mod messenger;
pub mod protocol;
pub mod topic;

pub use backoff::{Backoff, BackoffConfig, BackoffError};
pub use client::error::{Error, Result};
pub use client::offset_manager::{OffsetManager, OffsetManagerConfig};
pub use client::partition::{PartitionClient, UnknownTopicHandling};
pub use client::producer::{AsyncProducer, AsyncProducerConfig, Producer, ProducerConfig};
pub use client::{Client, ClientBuilder};
pub use connection::{Broker, TlsConfig};
pub use fetch::{FetchConfig, FetchOperation, FetchedBatch, FetchedMessage};
pub use heartbeat::Heartbeat;
pub use protocol::record::{Compression, Record};
pub use topic::Topic;
