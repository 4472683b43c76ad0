use logbroker_client::ClientBuilder;

const GROUP: &str = "demo-group";

#[tokio::main]
async fn main() {
    let brokers = vec!["0.0.0.0:9011".to_string()];
    let client = ClientBuilder::new(brokers).build().await.unwrap();

    let topics = client.list_topics().await.unwrap();
    if topics.is_empty() {
        println!("no topics available");
        return;
    }

    for topic in &topics {
        println!("TOPIC: {} ({} partitions)", topic.name, topic.partitions.len());
    }

    let group = client.consumer_group(GROUP.to_string(), &topics).await.unwrap();
    println!();
    println!("GROUP:        {}", group.group());
    println!("MEMBER_ID:    {}", group.member_id().await);
    println!("GENERATION:   {}", group.generation_id().await);

    for assignment in group.assignment().await {
        println!("ASSIGNED:     {} -> {:?}", assignment.topic, assignment.partitions);
    }

    for topic in group.offsets().await.unwrap() {
        println!("TOPIC:        {}", topic.name);
        for partition in topic.partitions {
            println!("  COMMITTED:  {}/{}", partition.partition_index, partition.committed_offset);
        }
    }

    group.leave().await.unwrap();
}
