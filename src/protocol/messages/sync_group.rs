//! `SyncGroup` request/response: the leader distributes partition assignments
//! computed from the `JoinGroup` member list; every member (including the
//! leader) then calls this to receive its own assignment back.

use std::io::{Cursor, Read, Write};

use crate::protocol::api_key::ApiKey;
use crate::protocol::error::Error as ApiError;
use crate::protocol::messages::consumer_group::ConsumerGroupMemberAssignment;
use crate::protocol::primitives::{read_array, write_array};
use crate::protocol::traits::{ReadError, ReadType, WriteError, WriteType};

pub const API_KEY_SYNC_GROUP: ApiKey = ApiKey::SyncGroup;
pub const API_VERSION_SYNC_GROUP: i16 = 0;

#[derive(Debug, Clone)]
pub struct SyncGroupRequestAssignment {
    pub member_id: String,

    /// The serialized `ConsumerGroupMemberAssignment` for this member.
    pub assignment: Vec<u8>,
}

impl<W: Write> WriteType<W> for SyncGroupRequestAssignment {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.member_id.write(writer)?;
        self.assignment.write(writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SyncGroupRequest {
    pub group_id: String,
    pub generation_id: i32,
    pub member_id: String,

    /// The per-member assignments, populated only in the leader's request;
    /// every other member sends an empty list here.
    pub assignments: Vec<SyncGroupRequestAssignment>,
}

impl<W: Write> WriteType<W> for SyncGroupRequest {
    fn write(&self, writer: &mut W) -> Result<(), WriteError> {
        self.group_id.write(writer)?;
        self.generation_id.write(writer)?;
        self.member_id.write(writer)?;
        write_array(&self.assignments, writer)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncGroupResponse {
    pub error: Option<ApiError>,
    pub assignment: ConsumerGroupMemberAssignment,
}

impl<R: Read> ReadType<R> for SyncGroupResponse {
    fn read(reader: &mut R) -> Result<Self, ReadError> {
        let error = Option::<ApiError>::read(reader)?;
        let raw = Vec::<u8>::read(reader)?;
        let assignment = if raw.is_empty() {
            ConsumerGroupMemberAssignment::empty()
        } else {
            ConsumerGroupMemberAssignment::read(&mut Cursor::new(raw))?
        };

        Ok(Self { error, assignment })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::protocol::messages::consumer_group::PartitionAssignment;

    use super::*;

    #[test]
    fn test_request_shape() {
        let req = SyncGroupRequest {
            group_id: "foo".to_string(),
            generation_id: 66051,
            member_id: "baz".to_string(),
            assignments: vec![SyncGroupRequestAssignment {
                member_id: "baz".to_string(),
                assignment: vec![b'f', b'o', b'o'],
            }],
        };

        let mut buf = Vec::new();
        req.write(&mut buf).unwrap();
        assert_eq!(
            buf,
            vec![
                0, 3, b'f', b'o', b'o', // group id
                0x00, 0x01, 0x02, 0x03, // generation id
                0, 3, b'b', b'a', b'z', // member id
                0, 0, 0, 1, // one assignment
                0, 3, b'b', b'a', b'z', // assignment member id
                0, 0, 0, 3, b'f', b'o', b'o', // assignment bytes
            ]
        );
    }

    #[test]
    fn test_response_with_assignment() {
        let mut buf = Vec::new();
        None::<ApiError>.write(&mut buf).unwrap();
        let assignment = ConsumerGroupMemberAssignment {
            version: 0,
            topics: vec![PartitionAssignment {
                topic: "one".to_string(),
                partitions: vec![0, 2, 4],
            }],
            user_data: vec![0x01, 0x02, 0x03],
        };
        let mut inner = Vec::new();
        assignment.write(&mut inner).unwrap();
        Some(inner).write(&mut buf).unwrap();

        let resp = SyncGroupResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(resp.error, None);
        assert_eq!(resp.assignment, assignment);
    }

    #[test]
    fn test_response_with_error_has_empty_assignment() {
        let mut buf = Vec::new();
        Some(ApiError::RebalanceInProgress).write(&mut buf).unwrap();
        None::<Vec<u8>>.write(&mut buf).unwrap();

        let resp = SyncGroupResponse::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(resp.error, Some(ApiError::RebalanceInProgress));
        assert_eq!(resp.assignment, ConsumerGroupMemberAssignment::empty());
    }
}
