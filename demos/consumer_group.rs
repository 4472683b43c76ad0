use std::sync::Arc;
use std::time::Duration;

use logbroker_client::protocol::messages::list_offsets::{EARLIEST_TIMESTAMP, LATEST_TIMESTAMP};
use logbroker_client::{ClientBuilder, FetchConfig, Heartbeat, OffsetManager, OffsetManagerConfig};
use tokio::signal::unix::SignalKind;
use tokio::sync::Notify;
use tracing::{error, info, warn};

const GROUP: &str = "demo-group";
const MAX_PARTITION_BYTES: i32 = 1024 * 1024;
const FETCH_TIMEOUT_MS: i32 = 500;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let brokers = vec!["0.0.0.0:9011".to_string()];
    let client = ClientBuilder::new(brokers).build().await.unwrap();

    let mut signal = tokio::signal::unix::signal(SignalKind::interrupt()).unwrap();
    let shutdown = Arc::new(Notify::new());
    let signal_shutdown = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = signal.recv().await;
        signal_shutdown.notify_waiters();
    });

    let topics = client
        .list_topics()
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.name.starts_with("test"))
        .collect::<Vec<_>>();
    if topics.is_empty() {
        println!("no matching topics");
        return;
    }

    let group = Arc::new(client.consumer_group(GROUP.to_string(), &topics).await.unwrap());
    let mut offset_mgr = OffsetManager::new(OffsetManagerConfig::default());
    let mut heartbeat = Heartbeat::new(Duration::from_secs(3));

    let partition_clients = {
        let mut clients = Vec::new();
        for assignment in group.assignment().await {
            for &partition in &assignment.partitions {
                let pc = client
                    .partition_client(
                        assignment.topic.clone(),
                        partition,
                        logbroker_client::UnknownTopicHandling::Error,
                    )
                    .await
                    .unwrap();

                let start = match offset_mgr.next_offset_for(&group, &assignment.topic, partition).await.unwrap() {
                    -1 => pc.get_offset(LATEST_TIMESTAMP).await.unwrap(),
                    committed => {
                        let earliest = pc.get_offset(EARLIEST_TIMESTAMP).await.unwrap();
                        committed.max(earliest)
                    }
                };

                clients.push((assignment.topic.clone(), partition, start, pc));
            }
        }
        clients
    };

    let mut next_offset: Vec<i64> = partition_clients.iter().map(|(.., start, _)| *start).collect();

    loop {
        let mut op = client.fetch_operation(FetchConfig::default());
        for ((topic, partition, _, _), offset) in partition_clients.iter().zip(next_offset.iter()) {
            op.fetch_from_partition(topic.clone(), *partition, *offset, Some(MAX_PARTITION_BYTES));
        }

        let results = tokio::select! {
            results = op.execute() => results,
            _ = shutdown.notified() => {
                if let Err(err) = group.leave().await {
                    warn!(%err, "error while leaving consumer group");
                }
                return;
            }
        };

        for (slot, result) in results.into_iter().enumerate() {
            match result {
                Ok(batch) => {
                    for message in &batch.messages {
                        let value = message
                            .value
                            .as_deref()
                            .map(String::from_utf8_lossy)
                            .unwrap_or(std::borrow::Cow::Borrowed(""));
                        info!(topic = %batch.topic, partition = batch.partition, offset = message.offset, %value, "received record");
                        offset_mgr.mark_as_processed(&batch.topic, batch.partition, message.offset);
                    }
                    if !batch.messages.is_empty() {
                        next_offset[slot] = batch.last_offset + 1;
                    }
                }
                Err(err) => error!(%err, "fetch failed"),
            }
        }

        if let Err(err) = offset_mgr.commit_offsets_if_necessary(&group).await {
            warn!(%err, "commit offsets failed");
        }
        if let Err(err) = heartbeat.trigger(&group).await {
            warn!(%err, "heartbeat failed");
        }

        tokio::time::sleep(Duration::from_millis(FETCH_TIMEOUT_MS as u64)).await;
    }
}
