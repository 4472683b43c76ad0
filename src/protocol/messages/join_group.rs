//! `JoinGroup` request/response: the first step of the rebalance protocol. Every
//! member of a group calls this concurrently; the coordinator picks one of them
//! (arbitrarily, the first to join the new generation) as the leader and echoes
//! the full member list only to the leader.

use std::io::{Cursor, Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::messages::consumer_group::ConsumerGroupMemberMetadata;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_JOIN_GROUP: ApiKey = ApiKey::JoinGroup;
pub const API_VERSION_JOIN_GROUP: i16 = 0;

/// The sole protocol this client ever advertises.
pub const PROTOCOL_TYPE_CONSUMER: &str = "consumer";
pub const PROTOCOL_NAME_ROUND_ROBIN: &str = "roundrobin";

#[derive(Debug, Clone)]
pub struct JoinGroupProtocol {
    /// The protocol name, e.g. `"roundrobin"`.
    pub name: String,

    /// The serialized `ConsumerGroupMemberMetadata` for this protocol.
    pub metadata: Vec<u8>,
}

impl<W: Write> WriteType<W> for JoinGroupProtocol {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.name.write(writer)?;
        self.metadata.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct JoinGroupRequest {
    /// The group identifier.
    pub group_id: String,

    /// The coordinator considers the member dead if it receives no heartbeat
    /// after this timeout, in milliseconds.
    pub session_timeout_ms: i32,

    /// The member id assigned by the group coordinator on a previous join,
    /// or the empty string for a first-time join.
    pub member_id: String,

    /// The unique name for the class of protocols implemented by the group,
    /// always [`PROTOCOL_TYPE_CONSUMER`] for this client.
    pub protocol_type: String,

    /// The protocols this member supports, in preference order.
    pub protocols: Vec<JoinGroupProtocol>,
}

impl<W: Write> WriteType<W> for JoinGroupRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.group_id.write(writer)?;
        self.session_timeout_ms.write(writer)?;
        self.member_id.write(writer)?;
        self.protocol_type.write(writer)?;
        write_array(&self.protocols, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupResponseMember {
    pub member_id: String,
    pub metadata: ConsumerGroupMemberMetadata,
}

impl<R: Read> ReadType<R> for JoinGroupResponseMember {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let member_id = String::read(reader)?;
        let raw = Vec::<u8>::read(reader)?;
        let metadata = ConsumerGroupMemberMetadata::read(&mut Cursor::new(raw))?;

        Ok(Self {
            member_id,
            metadata,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupResponse {
    pub error: Option<ApiError>,

    /// The generation ID of the group.
    pub generation_id: i32,

    /// The group protocol selected by the coordinator.
    pub protocol_name: String,

    /// The member id of the group leader.
    pub leader: String,

    /// The member id the coordinator assigned to this client.
    pub member_id: String,

    /// Every member of the group, populated only in the leader's response.
    pub members: Vec<JoinGroupResponseMember>,
}

impl JoinGroupResponse {
    pub fn is_leader(&self) -> bool {
        self.leader == self.member_id
    }
}

impl<R: Read> ReadType<R> for JoinGroupResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        Ok(Self {
            error: Option::<ApiError>::read(reader)?,
            generation_id: i32::read(reader)?,
            protocol_name: String::read(reader)?,
            leader: String::read(reader)?,
            member_id: String::read(reader)?,
            members: read_array(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_request_shape() {
        let req = JoinGroupRequest {
            group_id: "TestGroup".to_string(),
            session_timeout_ms: 100,
            member_id: "OneProtocol".to_string(),
            protocol_type: PROTOCOL_TYPE_CONSUMER.to_string(),
            protocols: vec![JoinGroupProtocol {
                name: PROTOCOL_NAME_ROUND_ROBIN.to_string(),
                metadata: vec![0x01, 0x02, 0x03],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &9i16.to_be_bytes());
        assert_eq!(&buf[11..15], &100i32.to_be_bytes());
    }

    #[test]
    fn test_response_leader() {
        let resp = JoinGroupResponse {
            error: None,
            generation_id: 66051,
            protocol_name: PROTOCOL_NAME_ROUND_ROBIN.to_string(),
            leader: "foo".to_string(),
            member_id: "foo".to_string(),
            members: vec![JoinGroupResponseMember {
                member_id: "foo".to_string(),
                metadata: ConsumerGroupMemberMetadata {
                    version: 0,
                    topics: vec!["one".into(), "two".into()],
                    user_data: vec![0x01, 0x02, 0x03],
                },
            }],
        };

        let mut buf = Vec::new();
        resp.error.write(&mut buf).unwrap();
        resp.generation_id.write(&mut buf).unwrap();
        resp.protocol_name.write(&mut buf).unwrap();
        resp.leader.write(&mut buf).unwrap();
        resp.member_id.write(&mut buf).unwrap();
        write_array(&resp.members, &mut buf).unwrap();

        let restored = JoinGroupResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, resp);
        assert!(restored.is_leader());
    }

    #[test]
    fn test_response_with_error() {
        let mut buf = Vec::new();
        Some(ApiError::InconsistentGroupProtocol)
            .write(&mut buf)
            .unwrap();
        0i32.write(&mut buf).unwrap();
        "".to_string().write(&mut buf).unwrap();
        "leader".to_string().write(&mut buf).unwrap();
        "follower".to_string().write(&mut buf).unwrap();
        write_array::<_, JoinGroupResponseMember>(&[], &mut buf).unwrap();

        let restored = JoinGroupResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored.error, Some(ApiError::InconsistentGroupProtocol));
        assert!(!restored.is_leader());
    }
}
