//! [`AsyncProducer`]: a bounded queue feeding a single background worker that owns the
//! synchronous [`Producer`], so callers never block on a broker round-trip themselves.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{Producer, ProducerConfig};
use crate::backoff::BackoffConfig;
use crate::client::error::{Error, Result};
use crate::connection::BrokerConnector;
use std::sync::Arc;

/// Configuration specific to [`AsyncProducer`], layered on top of [`ProducerConfig`].
#[derive(Debug, Clone)]
pub struct AsyncProducerConfig {
    pub producer: ProducerConfig,
    /// Capacity of the bounded event queue; [`AsyncProducer::produce`] fails with
    /// [`Error::BufferOverflow`] once it's full rather than waiting for room.
    pub max_queue_size: usize,
    /// Flush once this many messages are queued for delivery.
    pub delivery_threshold: usize,
    /// Flush at least this often even if `delivery_threshold` is never reached.
    pub delivery_interval: Duration,
}

impl Default for AsyncProducerConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig::default(),
            max_queue_size: 10_000,
            delivery_threshold: 100,
            delivery_interval: Duration::from_secs(1),
        }
    }
}

struct ProduceEvent {
    value: Option<Vec<u8>>,
    key: Option<Vec<u8>>,
    partition: Option<i32>,
    partition_key: Option<Vec<u8>>,
}

enum WorkerEvent {
    Produce(ProduceEvent),
    Deliver(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<()>),
}

/// A background-worker-backed producer: [`produce`](Self::produce) only enqueues, the
/// worker task batches and flushes according to `delivery_threshold`/`delivery_interval`
/// (or an explicit [`deliver`](Self::deliver) call), and [`shutdown`](Self::shutdown)
/// drains the queue and runs one final delivery before the worker exits.
#[derive(Debug)]
pub struct AsyncProducer {
    events: mpsc::Sender<WorkerEvent>,
}

impl AsyncProducer {
    pub(crate) async fn new(
        brokers: Arc<BrokerConnector>,
        backoff_config: Arc<BackoffConfig>,
        topic: String,
        config: AsyncProducerConfig,
    ) -> Result<Self> {
        let producer = Producer::new(brokers, backoff_config, topic, config.producer.clone()).await?;
        let (tx, rx) = mpsc::channel(config.max_queue_size);

        tokio::spawn(run_worker(producer, config, rx));

        Ok(Self { events: tx })
    }

    /// Enqueues a record for later delivery. Fails immediately with
    /// [`Error::BufferOverflow`] if the worker's queue is full; never blocks waiting for
    /// room.
    pub async fn produce(
        &self,
        value: Option<Vec<u8>>,
        key: Option<Vec<u8>>,
        partition: Option<i32>,
        partition_key: Option<Vec<u8>>,
    ) -> Result<()> {
        self.events
            .try_send(WorkerEvent::Produce(ProduceEvent {
                value,
                key,
                partition,
                partition_key,
            }))
            .map_err(|_| Error::BufferOverflow("async producer queue is full".to_string()))
    }

    /// Requests an out-of-band delivery and waits for it to complete.
    pub async fn deliver(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(WorkerEvent::Deliver(tx))
            .await
            .map_err(|_| Error::ArgumentError("async producer worker has already stopped".to_string()))?;
        rx.await
            .map_err(|_| Error::ArgumentError("async producer worker dropped the delivery request".to_string()))?
    }

    /// Drains the queue, runs one final delivery, and stops the worker. Best-effort: a
    /// failed final delivery is logged, not propagated.
    pub async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self.events.send(WorkerEvent::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_worker(producer: Producer, config: AsyncProducerConfig, mut events: mpsc::Receiver<WorkerEvent>) {
    let mut interval = tokio::time::interval(config.delivery_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(WorkerEvent::Produce(e)) => {
                        if let Err(err) = producer.produce(e.value, e.key, e.partition, e.partition_key).await {
                            warn!(error = %err, "async producer: buffering a queued record failed");
                            continue;
                        }
                        if producer.buffered_message_count().await >= config.delivery_threshold {
                            if let Err(err) = producer.deliver_messages().await {
                                warn!(error = %err, "async producer: threshold-triggered delivery failed");
                            }
                        }
                    }
                    Some(WorkerEvent::Deliver(reply)) => {
                        let result = producer.deliver_messages().await;
                        let _ = reply.send(result);
                    }
                    Some(WorkerEvent::Shutdown(reply)) => {
                        producer.shutdown().await;
                        let _ = reply.send(());
                        debug!("async producer worker exiting");
                        return;
                    }
                    None => {
                        // Every sender dropped without an explicit shutdown; flush what
                        // we have and exit rather than leaking buffered records.
                        producer.shutdown().await;
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                if producer.buffered_message_count().await > 0 {
                    if let Err(err) = producer.deliver_messages().await {
                        warn!(error = %err, "async producer: interval-triggered delivery failed");
                    }
                }
            }
        }
    }
}
