use std::time::Duration;

use logbroker_client::{AsyncProducerConfig, ClientBuilder, ProducerConfig};

const TOPIC: &str = "test";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let brokers = vec!["localhost:9010".to_string(), "localhost:9011".to_string()];
    let client = ClientBuilder::new(brokers).build().await.unwrap();

    let config = AsyncProducerConfig {
        producer: ProducerConfig {
            retry_backoff: Duration::from_millis(250),
            ..ProducerConfig::default()
        },
        delivery_threshold: 128,
        delivery_interval: Duration::from_secs(5),
        ..AsyncProducerConfig::default()
    };
    let producer = client.async_producer(TOPIC, config).await.unwrap();

    let mut index = 0u64;
    loop {
        let value = format!("hello: {index}").into_bytes();
        let partition_key = format!("user-{}", index % 16).into_bytes();

        producer
            .produce(Some(value), None, None, Some(partition_key))
            .await
            .unwrap();

        index += 1;
        println!("queued record {index}");
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
