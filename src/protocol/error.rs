//! Error codes returned by a broker in a response body.
//!
//! # References
//! - <https://kafka.apache.org/protocol#protocol_error_codes>

use std::io::{Read, Write};

use thiserror::Error;

use super::traits::{ReadError, ReadType, WriteError, WriteType};

/// A server-reported error, identified by its numeric code.
///
/// `Error::new` maps the wire-level `INT16` straight onto this enum, keeping `0` ("no
/// error") as `None` so response structs can carry `Option<Error>` the same way the wire
/// format does.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("the server experienced an unexpected error when processing the request")]
    Unknown,

    #[error("the requested offset is outside the range of offsets maintained by the broker")]
    OffsetOutOfRange,

    #[error("the message contents do not match its CRC")]
    CorruptMessage,

    #[error("this topic/partition does not exist on this broker")]
    UnknownTopicOrPartition,

    #[error("the message has a negative size")]
    InvalidFetchSize,

    #[error("there is no leader for this partition, it is unavailable for writes")]
    LeaderNotAvailable,

    #[error("the client's metadata is out of date, it sent a request to a non-leader")]
    NotLeaderForPartition,

    #[error("the request exceeded the broker's time limit")]
    RequestTimedOut,

    #[error("the broker is not alive")]
    BrokerNotAvailable,

    #[error("the replica is not available for the requested partition")]
    ReplicaNotAvailable,

    #[error("the produced message exceeds the broker's maximum message size")]
    MessageTooLarge,

    #[error("internal error: stale controller epoch")]
    StaleControllerEpoch,

    #[error("the offset metadata string is larger than the broker's configured maximum")]
    OffsetMetadataTooLarge,

    #[error("the broker disconnected before a response was received")]
    NetworkException,

    #[error("the coordinator is still loading and hasn't finished")]
    CoordinatorLoadInProgress,

    #[error("the group coordinator is not available")]
    CoordinatorNotAvailable,

    #[error("this broker is not the coordinator for this group")]
    NotCoordinator,

    #[error("the request attempted to perform an operation on an invalid topic")]
    InvalidTopicException,

    #[error("a message batch in a produce request exceeded the maximum configured segment size")]
    RecordListTooLarge,

    #[error("the number of in-sync replicas is lower than the configured minimum")]
    NotEnoughReplicas,

    #[error("the message was written to the log but with fewer in-sync replicas than required")]
    NotEnoughReplicasAfterAppend,

    #[error("the requested `acks` value is invalid")]
    InvalidRequiredAcks,

    #[error("the generation id in the request is not the current generation")]
    IllegalGeneration,

    #[error("the member's protocol type or set of protocols is incompatible with the group")]
    InconsistentGroupProtocol,

    #[error("the configured group id is invalid")]
    InvalidGroupId,

    #[error("the coordinator is not aware of this member")]
    UnknownMemberId,

    #[error("the requested session timeout is outside the broker's allowed range")]
    InvalidSessionTimeout,

    #[error("the coordinator has begun rebalancing the group, rejoin is required")]
    RebalanceInProgress,

    #[error("the offset commit was rejected because of oversized metadata")]
    InvalidCommitOffsetSize,

    #[error("the client is not authorized to access the requested topic")]
    TopicAuthorizationFailed,

    #[error("the client is not authorized to access the requested group")]
    GroupAuthorizationFailed,

    #[error("the client is not authorized to use an inter-broker or administrative API")]
    ClusterAuthorizationFailed,

    #[error("the message timestamp is out of the acceptable range")]
    InvalidTimestamp,

    #[error("the group is rebalancing, so a member id (re)join is required")]
    MemberIdRequired,

    #[error("broker error code {0} (not recognized by this client)")]
    Other(i16),
}

impl Error {
    /// Maps a wire-level error code onto `Some(Error)`, or `None` for `0` ("no error").
    pub fn new(code: i16) -> Option<Self> {
        match code {
            0 => None,
            -1 => Some(Self::Unknown),
            1 => Some(Self::OffsetOutOfRange),
            2 => Some(Self::CorruptMessage),
            3 => Some(Self::UnknownTopicOrPartition),
            4 => Some(Self::InvalidFetchSize),
            5 => Some(Self::LeaderNotAvailable),
            6 => Some(Self::NotLeaderForPartition),
            7 => Some(Self::RequestTimedOut),
            8 => Some(Self::BrokerNotAvailable),
            9 => Some(Self::ReplicaNotAvailable),
            10 => Some(Self::MessageTooLarge),
            11 => Some(Self::StaleControllerEpoch),
            12 => Some(Self::OffsetMetadataTooLarge),
            13 => Some(Self::NetworkException),
            14 => Some(Self::CoordinatorLoadInProgress),
            15 => Some(Self::CoordinatorNotAvailable),
            16 => Some(Self::NotCoordinator),
            17 => Some(Self::InvalidTopicException),
            18 => Some(Self::RecordListTooLarge),
            19 => Some(Self::NotEnoughReplicas),
            20 => Some(Self::NotEnoughReplicasAfterAppend),
            21 => Some(Self::InvalidRequiredAcks),
            22 => Some(Self::IllegalGeneration),
            23 => Some(Self::InconsistentGroupProtocol),
            24 => Some(Self::InvalidGroupId),
            25 => Some(Self::UnknownMemberId),
            26 => Some(Self::InvalidSessionTimeout),
            27 => Some(Self::RebalanceInProgress),
            28 => Some(Self::InvalidCommitOffsetSize),
            29 => Some(Self::TopicAuthorizationFailed),
            30 => Some(Self::GroupAuthorizationFailed),
            31 => Some(Self::ClusterAuthorizationFailed),
            32 => Some(Self::InvalidTimestamp),
            79 => Some(Self::MemberIdRequired),
            other => Some(Self::Other(other)),
        }
    }

    /// The wire-level error code for this variant.
    pub fn code(&self) -> i16 {
        match self {
            Self::Unknown => -1,
            Self::OffsetOutOfRange => 1,
            Self::CorruptMessage => 2,
            Self::UnknownTopicOrPartition => 3,
            Self::InvalidFetchSize => 4,
            Self::LeaderNotAvailable => 5,
            Self::NotLeaderForPartition => 6,
            Self::RequestTimedOut => 7,
            Self::BrokerNotAvailable => 8,
            Self::ReplicaNotAvailable => 9,
            Self::MessageTooLarge => 10,
            Self::StaleControllerEpoch => 11,
            Self::OffsetMetadataTooLarge => 12,
            Self::NetworkException => 13,
            Self::CoordinatorLoadInProgress => 14,
            Self::CoordinatorNotAvailable => 15,
            Self::NotCoordinator => 16,
            Self::InvalidTopicException => 17,
            Self::RecordListTooLarge => 18,
            Self::NotEnoughReplicas => 19,
            Self::NotEnoughReplicasAfterAppend => 20,
            Self::InvalidRequiredAcks => 21,
            Self::IllegalGeneration => 22,
            Self::InconsistentGroupProtocol => 23,
            Self::InvalidGroupId => 24,
            Self::UnknownMemberId => 25,
            Self::InvalidSessionTimeout => 26,
            Self::RebalanceInProgress => 27,
            Self::InvalidCommitOffsetSize => 28,
            Self::TopicAuthorizationFailed => 29,
            Self::GroupAuthorizationFailed => 30,
            Self::ClusterAuthorizationFailed => 31,
            Self::InvalidTimestamp => 32,
            Self::MemberIdRequired => 79,
            Self::Other(code) => *code,
        }
    }

    /// Whether retrying the same request against current (or refreshed) metadata is
    /// expected to eventually succeed.
    ///
    /// Used by the producer/fetch/consumer-group retry loops to decide whether a
    /// broker-reported error should trigger a backoff-and-retry or be surfaced to the
    /// caller immediately. Deliberately excludes [`Self::RebalanceInProgress`],
    /// [`Self::IllegalGeneration`] and [`Self::UnknownMemberId`]: resending the same
    /// request with the same `member_id`/`generation_id` can never clear these, only
    /// rejoining the group can, so callers must treat them as a rejoin signal rather
    /// than a retriable error (see [`Self::requires_rejoin`]).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::LeaderNotAvailable
                | Self::NotLeaderForPartition
                | Self::RequestTimedOut
                | Self::NetworkException
                | Self::CoordinatorLoadInProgress
                | Self::CoordinatorNotAvailable
                | Self::NotCoordinator
                | Self::NotEnoughReplicas
                | Self::NotEnoughReplicasAfterAppend
                | Self::UnknownTopicOrPartition
        )
    }

    /// Whether this error means the consumer group's membership is no longer valid and
    /// the member must rejoin (re-run `JoinGroup`/`SyncGroup` with a cleared
    /// `member_id`/`generation_id`) before any further group request can succeed.
    pub fn requires_rejoin(&self) -> bool {
        matches!(
            self,
            Self::RebalanceInProgress | Self::IllegalGeneration | Self::UnknownMemberId
        )
    }

    /// Whether this error means the client's cached metadata is stale and should be
    /// refreshed before retrying.
    pub fn invalidates_metadata(&self) -> bool {
        matches!(
            self,
            Self::LeaderNotAvailable
                | Self::NotLeaderForPartition
                | Self::UnknownTopicOrPartition
        )
    }
}

impl<R: Read> ReadType<R> for Option<Error> {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Error::new(i16::read(reader)?))
    }
}

impl<W: Write> WriteType<W> for Option<Error> {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        let code = self.as_ref().map(Error::code).unwrap_or(0);
        code.write(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_no_error() {
        assert_eq!(Error::new(0), None);
    }

    #[test]
    fn test_code_roundtrip() {
        for code in [-1, 1, 6, 15, 16, 27, 29, 42] {
            let err = Error::new(code).unwrap();
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_unknown_code_preserved() {
        let err = Error::new(9999).unwrap();
        assert_eq!(err.code(), 9999);
        assert_eq!(err, Error::Other(9999));
    }

    #[test]
    fn test_retriable_classification() {
        assert!(Error::NotCoordinator.is_retriable());
        assert!(!Error::TopicAuthorizationFailed.is_retriable());
    }
}
