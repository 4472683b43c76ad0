//! Consumer groups coordinate partition assignment across a set of cooperating
//! consumers: the broker elects a coordinator for the group, one member is picked as
//! leader and computes the assignment, and every member (the leader included) learns
//! its own slice back through `SyncGroup`.
//!
//! [`ConsumerGroup`] drives that protocol and exposes `heartbeat`/`offsets`/`commit` on
//! top of it, but it does not consume anything itself -- fetching records and deciding
//! when progress is safe to commit is the caller's job.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::backoff::BackoffConfig;
use crate::client::error::{Error, RequestContext, Result};
use crate::client::maybe_retry;
use crate::connection::{
    BrokerCache, BrokerCacheGeneration, BrokerConnection, BrokerConnector, MessengerTransport,
};
use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ProtocolError;
use crate::protocol::messages::consumer_group::{
    ConsumerGroupMemberAssignment, ConsumerGroupMemberMetadata, PartitionAssignment,
};
use crate::protocol::messages::find_coordinator::{
    FindCoordinatorRequest, FindCoordinatorResponse, API_VERSION_FIND_COORDINATOR,
};
use crate::protocol::messages::heartbeat::{
    HeartbeatRequest, HeartbeatResponse, API_VERSION_HEARTBEAT,
};
use crate::protocol::messages::join_group::{
    JoinGroupProtocol, JoinGroupRequest, JoinGroupResponse, JoinGroupResponseMember,
    API_VERSION_JOIN_GROUP, PROTOCOL_NAME_ROUND_ROBIN, PROTOCOL_TYPE_CONSUMER,
};
use crate::protocol::messages::leave_group::{
    LeaveGroupRequest, LeaveGroupResponse, API_VERSION_LEAVE_GROUP,
};
use crate::protocol::messages::offset_commit::{
    OffsetCommitRequest, OffsetCommitResponse, TopicCommit, API_VERSION_OFFSET_COMMIT,
};
use crate::protocol::messages::offset_fetch::{
    OffsetFetchRequest, OffsetFetchResponse, OffsetFetchResponseTopic, API_VERSION_OFFSET_FETCH,
};
use crate::protocol::messages::sync_group::{
    SyncGroupRequest, SyncGroupRequestAssignment, SyncGroupResponse, API_VERSION_SYNC_GROUP,
};
use crate::protocol::traits::WriteType;
use crate::topic::Topic;

/// The coordinator considers a member dead if it doesn't hear a heartbeat within this
/// many milliseconds of the last one.
pub const DEFAULT_SESSION_TIMEOUT_MS: i32 = 10 * 1000;

pub const BALANCE_STRATEGY_ROUND_ROBIN: &str = PROTOCOL_NAME_ROUND_ROBIN;

/// A joined consumer group: membership, generation, and the partition assignment this
/// member was handed. Doesn't consume anything itself -- pair with one
/// [`PartitionClient`](crate::client::partition::PartitionClient) per assigned
/// partition, and call [`commit`](Self::commit) as progress is made.
#[derive(Debug)]
pub struct ConsumerGroup {
    group: String,
    topics: Vec<Topic>,

    backoff_config: Arc<BackoffConfig>,
    membership: Mutex<Membership>,

    brokers: Arc<BrokerConnector>,
    coordinator: Mutex<(Option<BrokerConnection>, BrokerCacheGeneration)>,
}

/// The mutable part of group membership: cleared and re-established by
/// [`ConsumerGroup::rejoin`] whenever the coordinator reports this member's generation
/// or membership is no longer valid.
#[derive(Debug)]
struct Membership {
    member_id: String,
    generation_id: i32,
    assignment: ConsumerGroupMemberAssignment,
}

impl ConsumerGroup {
    pub(crate) async fn new(
        brokers: Arc<BrokerConnector>,
        backoff_config: Arc<BackoffConfig>,
        group: String,
        topics: &[Topic],
    ) -> Result<Self> {
        let find_coordinator_req = FindCoordinatorRequest { key: group.clone() };

        let coordinator_id = maybe_retry(&backoff_config, brokers.as_ref(), "find_coordinator", || async {
            let (broker, gen) = brokers.as_ref().get().await.map_err(|e| (e.into(), None))?;

            let resp: FindCoordinatorResponse = broker
                .request(ApiKey::FindCoordinator, API_VERSION_FIND_COORDINATOR, &find_coordinator_req)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            match resp.error {
                None => Ok(resp.node_id),
                Some(protocol_error) => Err((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(group.clone()),
                    },
                    Some(gen),
                )),
            }
        })
        .await?;

        let coordinator = brokers
            .connect(coordinator_id)
            .await?
            .ok_or_else(|| Error::InvalidResponse(format!("coordinator {coordinator_id} not found in metadata")))?;

        let membership = Self::join_and_sync(&coordinator, &group, topics).await?;

        info!(
            group = group.as_str(),
            member_id = membership.member_id.as_str(),
            generation_id = membership.generation_id,
            partitions = membership.assignment.topics.iter().map(|t| t.partitions.len()).sum::<usize>(),
            "joined consumer group"
        );

        Ok(Self {
            group,
            topics: topics.to_vec(),
            backoff_config,
            membership: Mutex::new(membership),
            brokers,
            coordinator: Mutex::new((Some(coordinator), BrokerCacheGeneration::START)),
        })
    }

    /// Runs `JoinGroup` (with a blank member id, so the coordinator assigns a fresh one)
    /// followed by `SyncGroup`, shared by both first-time [`Self::new`] and
    /// [`Self::rejoin`].
    async fn join_and_sync(coordinator: &BrokerConnection, group: &str, topics: &[Topic]) -> Result<Membership> {
        let metadata = ConsumerGroupMemberMetadata {
            version: 0,
            topics: topics.iter().map(|t| t.name.clone()).collect(),
            user_data: vec![],
        };
        let mut encoded_metadata = Vec::new();
        metadata.write(&mut encoded_metadata).expect("encoding never fails");

        let join_response = {
            let mut member_id = String::new();

            loop {
                let req = JoinGroupRequest {
                    group_id: group.to_string(),
                    session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
                    member_id: member_id.clone(),
                    protocol_type: PROTOCOL_TYPE_CONSUMER.to_string(),
                    protocols: vec![JoinGroupProtocol {
                        name: BALANCE_STRATEGY_ROUND_ROBIN.to_string(),
                        metadata: encoded_metadata.clone(),
                    }],
                };

                let resp: JoinGroupResponse = coordinator
                    .request(ApiKey::JoinGroup, API_VERSION_JOIN_GROUP, &req)
                    .await
                    .map_err(Error::Request)?;

                match resp.error {
                    Some(ProtocolError::MemberIdRequired) => {
                        // The coordinator assigned us a member id but rejected the join
                        // itself; it wants us to rejoin using that id.
                        member_id = resp.member_id;
                        continue;
                    }
                    Some(protocol_error) => {
                        return Err(Error::ServerError {
                            protocol_error,
                            error_message: None,
                            request: RequestContext::Group(group.to_string()),
                        });
                    }
                    None => break resp,
                }
            }
        };

        let assignments = if join_response.is_leader() {
            let plan = match join_response.protocol_name.as_str() {
                BALANCE_STRATEGY_ROUND_ROBIN => round_robin(topics, join_response.members),
                other => {
                    return Err(Error::InvalidResponse(format!(
                        "coordinator selected unsupported protocol '{other}'"
                    )))
                }
            };

            plan.into_iter()
                .map(|(member_id, topics)| {
                    let assignment = ConsumerGroupMemberAssignment {
                        version: 0,
                        topics,
                        user_data: vec![],
                    };

                    let mut buf = Vec::new();
                    assignment.write(&mut buf).expect("encoding never fails");

                    SyncGroupRequestAssignment {
                        member_id,
                        assignment: buf,
                    }
                })
                .collect()
        } else {
            vec![]
        };

        let sync_req = SyncGroupRequest {
            group_id: group.to_string(),
            generation_id: join_response.generation_id,
            member_id: join_response.member_id.clone(),
            assignments,
        };

        let sync_resp: SyncGroupResponse = coordinator
            .request(ApiKey::SyncGroup, API_VERSION_SYNC_GROUP, &sync_req)
            .await
            .map_err(Error::Request)?;

        if let Some(protocol_error) = sync_resp.error {
            return Err(Error::ServerError {
                protocol_error,
                error_message: None,
                request: RequestContext::Group(group.to_string()),
            });
        }

        Ok(Membership {
            member_id: join_response.member_id,
            generation_id: join_response.generation_id,
            assignment: sync_resp.assignment,
        })
    }

    /// Re-runs `JoinGroup`/`SyncGroup` with a blank member id, establishing fresh
    /// membership after the coordinator reports this member's generation or identity is
    /// no longer valid (`RebalanceInProgress`, `IllegalGeneration`, `UnknownMemberId`).
    /// Resending a request under the old `member_id`/`generation_id` can never clear
    /// those errors -- only rejoining does.
    pub async fn rejoin(&self) -> Result<()> {
        let (coordinator, _gen) = self.get().await?;

        let membership = Self::join_and_sync(&coordinator, &self.group, &self.topics).await?;

        info!(
            group = self.group.as_str(),
            member_id = membership.member_id.as_str(),
            generation_id = membership.generation_id,
            partitions = membership.assignment.topics.iter().map(|t| t.partitions.len()).sum::<usize>(),
            "rejoined consumer group"
        );

        *self.membership.lock().await = membership;
        Ok(())
    }

    /// Tells the coordinator this member is still alive. Must be called more often
    /// than the group's session timeout or the coordinator will start a rebalance
    /// without this member.
    ///
    /// If the coordinator reports that this member's generation or identity is no
    /// longer valid (`RebalanceInProgress`, `IllegalGeneration`, `UnknownMemberId`),
    /// transparently [`rejoin`](Self::rejoin)s the group rather than surfacing the
    /// stale-membership error -- resending the same heartbeat would never succeed.
    pub async fn heartbeat(&self) -> Result<()> {
        let (member_id, generation_id) = {
            let membership = self.membership.lock().await;
            (membership.member_id.clone(), membership.generation_id)
        };
        let req = HeartbeatRequest {
            group_id: self.group.clone(),
            generation_id,
            member_id,
        };

        let result = maybe_retry(&self.backoff_config, self, "heartbeat", || async {
            let (broker, gen) = self.get().await.map_err(|e| (e, None))?;

            let resp: HeartbeatResponse = broker
                .request(ApiKey::Heartbeat, API_VERSION_HEARTBEAT, &req)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            match resp.error {
                None => Ok(()),
                Some(protocol_error) => Err((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(self.group.clone()),
                    },
                    Some(gen),
                )),
            }
        })
        .await;

        match result {
            Err(Error::ServerError { protocol_error, .. }) if protocol_error.requires_rejoin() => {
                info!(
                    group = self.group.as_str(),
                    %protocol_error,
                    "heartbeat rejected, rejoining group"
                );
                self.rejoin().await
            }
            other => other,
        }
    }

    /// Notifies the coordinator this member is leaving, triggering an immediate
    /// rebalance of the remaining members instead of waiting out the session timeout.
    pub async fn leave(&self) -> Result<()> {
        let member_id = self.membership.lock().await.member_id.clone();
        let req = LeaveGroupRequest {
            group_id: self.group.clone(),
            member_id,
        };

        maybe_retry(&self.backoff_config, self, "leave_group", || async {
            let (broker, gen) = self.get().await.map_err(|e| (e, None))?;

            let resp: LeaveGroupResponse = broker
                .request(ApiKey::LeaveGroup, API_VERSION_LEAVE_GROUP, &req)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            match resp.error {
                None => Ok(()),
                Some(protocol_error) => Err((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(self.group.clone()),
                    },
                    Some(gen),
                )),
            }
        })
        .await
    }

    /// Fetches this group's last committed offsets, for every topic/partition it has
    /// ever committed against.
    pub async fn offsets(&self) -> Result<Vec<OffsetFetchResponseTopic>> {
        let req = OffsetFetchRequest {
            group_id: self.group.clone(),
            topics: None,
        };

        maybe_retry(&self.backoff_config, self, "offset_fetch", || async {
            let (broker, gen) = self.get().await.map_err(|e| (e, None))?;

            let resp: OffsetFetchResponse = broker
                .request(ApiKey::OffsetFetch, API_VERSION_OFFSET_FETCH, &req)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            Ok(resp.topics)
        })
        .await
    }

    /// Commits `topics`' offsets under this member's current generation.
    pub async fn commit(&self, topics: Vec<TopicCommit>) -> Result<()> {
        let (member_id, generation_id) = {
            let membership = self.membership.lock().await;
            (membership.member_id.clone(), membership.generation_id)
        };
        let req = OffsetCommitRequest {
            group_id: self.group.clone(),
            generation_id,
            member_id,
            topics,
        };

        let (results, gen) = maybe_retry(&self.backoff_config, self, "offset_commit", || async {
            let (broker, gen) = self.get().await.map_err(|e| (e, None))?;

            let resp: OffsetCommitResponse = broker
                .request(ApiKey::OffsetCommit, API_VERSION_OFFSET_COMMIT, &req)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            Ok((resp.topics, gen))
        })
        .await?;

        for topic in results {
            for partition in topic.partitions {
                let Some(err) = partition.error else {
                    continue;
                };

                match err {
                    ProtocolError::NotLeaderForPartition
                    | ProtocolError::LeaderNotAvailable
                    | ProtocolError::CoordinatorNotAvailable
                    | ProtocolError::NotCoordinator => {
                        // The coordinator moved, or this topic's metadata is stale.
                        // Drop the cached connection so the next call re-resolves it.
                        self.invalidate("offset commit rejected by stale coordinator", gen).await;
                    }
                    ProtocolError::OffsetMetadataTooLarge | ProtocolError::InvalidCommitOffsetSize => {
                        error!(
                            topic = topic.name.as_str(),
                            partition = partition.partition_index,
                            %err,
                            "offset commit rejected, metadata exceeds the broker's limit"
                        );
                    }
                    _ if err.requires_rejoin() => {
                        info!(
                            topic = topic.name.as_str(),
                            partition = partition.partition_index,
                            %err,
                            "offset commit rejected, rejoining group"
                        );
                        self.rejoin().await?;
                    }
                    _ => {
                        self.invalidate("offset commit failed", gen).await;
                    }
                }
            }
        }

        Ok(())
    }

    /// The partitions this member was assigned by the group leader, as of its last
    /// join/rejoin. Callers should re-read this after a heartbeat or commit triggers a
    /// [`rejoin`](Self::rejoin), since the assignment can change across a rebalance.
    pub async fn assignment(&self) -> Vec<PartitionAssignment> {
        self.membership.lock().await.assignment.topics.clone()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub async fn member_id(&self) -> String {
        self.membership.lock().await.member_id.clone()
    }

    pub async fn generation_id(&self) -> i32 {
        self.membership.lock().await.generation_id
    }
}

/// Caches the coordinator broker connection for this group.
#[async_trait]
impl BrokerCache for &ConsumerGroup {
    type R = MessengerTransport;
    type E = Error;

    async fn get(&self) -> Result<(BrokerConnection, BrokerCacheGeneration)> {
        let mut current = self.coordinator.lock().await;
        if let Some(broker) = &current.0 {
            return Ok((Arc::clone(broker), current.1));
        }

        info!(group = self.group.as_str(), "re-resolving consumer group coordinator");

        let req = FindCoordinatorRequest { key: self.group.clone() };
        let coordinator_id = maybe_retry(&self.backoff_config, self.brokers.as_ref(), "find_coordinator", || async {
            let (broker, gen) = self.brokers.as_ref().get().await.map_err(|e| (e.into(), None))?;

            let resp: FindCoordinatorResponse = broker
                .request(ApiKey::FindCoordinator, API_VERSION_FIND_COORDINATOR, &req)
                .await
                .map_err(|e| (Error::Request(e), Some(gen)))?;

            match resp.error {
                None => Ok(resp.node_id),
                Some(protocol_error) => Err((
                    Error::ServerError {
                        protocol_error,
                        error_message: None,
                        request: RequestContext::Group(self.group.clone()),
                    },
                    Some(gen),
                )),
            }
        })
        .await?;

        let coordinator = self
            .brokers
            .connect(coordinator_id)
            .await?
            .ok_or_else(|| Error::InvalidResponse(format!("coordinator {coordinator_id} not found in metadata")))?;

        current.0 = Some(Arc::clone(&coordinator));
        current.1 = current.1.next();

        Ok((coordinator, current.1))
    }

    async fn invalidate(&self, reason: &'static str, gen: BrokerCacheGeneration) {
        let mut guard = self.coordinator.lock().await;

        if guard.1 != gen {
            debug!(
                reason,
                current_gen = guard.1.get(),
                request_gen = gen.get(),
                "stale invalidation request for coordinator cache"
            );
            return;
        }

        info!(reason, "invalidating cached coordinator broker connection");
        guard.0.take();
    }
}

/// Spreads every topic's partitions round-robin across the members subscribed to it,
/// in the order the coordinator reported them.
fn round_robin(
    topics: &[Topic],
    members: Vec<JoinGroupResponseMember>,
) -> BTreeMap<String, Vec<PartitionAssignment>> {
    let mut plan: BTreeMap<String, Vec<PartitionAssignment>> = BTreeMap::new();

    let mut i = 0;
    let n = members.len();
    for topic in topics {
        for partition in &topic.partitions {
            let member = loop {
                let member = &members[i % n];
                i += 1;

                if member.metadata.topics.contains(&topic.name) {
                    break &member.member_id;
                }
            };

            let assignments = plan.entry(member.clone()).or_default();
            match assignments.iter_mut().find(|a| a.topic == topic.name) {
                Some(assignment) => assignment.partitions.push(*partition),
                None => assignments.push(PartitionAssignment {
                    topic: topic.name.clone(),
                    partitions: vec![*partition],
                }),
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn topic_set(items: impl IntoIterator<Item = i32>) -> BTreeSet<i32> {
        items.into_iter().collect()
    }

    fn member(name: &str, topics: &[&str]) -> JoinGroupResponseMember {
        JoinGroupResponseMember {
            member_id: name.to_string(),
            metadata: ConsumerGroupMemberMetadata {
                version: 0,
                topics: topics.iter().map(|t| t.to_string()).collect(),
                user_data: vec![],
            },
        }
    }

    fn plan(
        want: Vec<(&str, Vec<(&str, Vec<i32>)>)>,
    ) -> BTreeMap<String, Vec<PartitionAssignment>> {
        want.into_iter()
            .map(|(member, assign)| {
                let assignment = assign
                    .into_iter()
                    .map(|(topic, partitions)| PartitionAssignment {
                        topic: topic.to_string(),
                        partitions,
                    })
                    .collect();
                (member.to_string(), assignment)
            })
            .collect()
    }

    #[test]
    fn balance_strategy_round_robin() {
        for (members, topics, want) in [
            (
                vec![("m1", vec!["t1", "t2", "t3"]), ("m2", vec!["t1", "t2", "t3"])],
                vec![("t1", vec![0]), ("t2", vec![0]), ("t3", vec![0])],
                vec![
                    ("m1", vec![("t1", vec![0]), ("t3", vec![0])]),
                    ("m2", vec![("t2", vec![0])]),
                ],
            ),
            (
                vec![("m1", vec!["t1", "t2", "t3"]), ("m2", vec!["t1", "t2", "t3"])],
                vec![("t1", vec![0]), ("t2", vec![0, 1]), ("t3", vec![0, 1, 2, 3])],
                vec![
                    ("m1", vec![("t1", vec![0]), ("t2", vec![1]), ("t3", vec![1, 3])]),
                    ("m2", vec![("t2", vec![0]), ("t3", vec![0, 2])]),
                ],
            ),
            (
                vec![("m1", vec!["t1"]), ("m2", vec!["t2"])],
                vec![("t1", vec![0])],
                vec![("m1", vec![("t1", vec![0])])],
            ),
            (
                vec![("m1", vec!["t1", "t2", "t3"])],
                vec![("t1", vec![0]), ("t2", vec![0]), ("t3", vec![0, 1, 2])],
                vec![("m1", vec![("t1", vec![0]), ("t2", vec![0]), ("t3", vec![0, 1, 2])])],
            ),
        ] {
            let topics: Vec<Topic> = topics
                .into_iter()
                .map(|(name, partitions): (&str, Vec<i32>)| Topic {
                    name: name.to_string(),
                    partitions: topic_set(partitions),
                })
                .collect();
            let members = members.iter().map(|(name, topics)| member(name, topics)).collect();
            let got = round_robin(&topics, members);
            assert_eq!(plan(want), got);
        }
    }
}
